//! Reads poll state out of a tweet's card binding values.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollChoice {
    pub id: u32,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollInfo {
    pub endpoint: Option<String>,
    pub card_uri: Option<String>,
    pub card_name: Option<String>,
    pub choices: Vec<PollChoice>,
    pub selected_choice: Option<u32>,
    pub counts_are_final: bool,
    pub end_datetime_utc: Option<String>,
    pub last_updated_datetime_utc: Option<String>,
    pub duration_minutes: Option<u64>,
    pub total_votes: u64,
}

/// Binding values come either as `[{key, value}]` or as a plain map.
fn binding_values(card: &Value) -> HashMap<String, &Value> {
    match card.pointer("/legacy/binding_values") {
        Some(Value::Array(pairs)) => pairs
            .iter()
            .filter_map(|pair| {
                let key = pair.get("key")?.as_str()?;
                Some((key.to_string(), pair.get("value")?))
            })
            .collect(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        _ => HashMap::new(),
    }
}

fn string_value(value: Option<&&Value>) -> Option<String> {
    let value = value?;
    ["string_value", "scribe_key", "long_value"]
        .iter()
        .find_map(|key| match value.get(*key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn bool_value(value: Option<&&Value>) -> Option<bool> {
    let value = value?;
    if let Some(flag) = value.get("boolean_value").and_then(Value::as_bool) {
        return Some(flag);
    }
    match string_value(Some(value))?.as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn number_value(value: Option<&&Value>) -> Option<u64> {
    string_value(value)?.trim().parse().ok()
}

/// Poll state for `tweet`, or `None` when it carries no poll card.
pub fn extract_poll_info(tweet: &Value) -> Option<PollInfo> {
    let card = tweet.get("card")?;
    let values = binding_values(card);
    if values.is_empty() {
        return None;
    }

    let choices: Vec<PollChoice> = (1..=4u32)
        .filter_map(|id| {
            let label = string_value(values.get(&format!("choice{}_label", id)))?;
            let count = number_value(values.get(&format!("choice{}_count", id))).unwrap_or(0);
            Some(PollChoice { id, label, count })
        })
        .collect();
    if choices.is_empty() {
        return None;
    }

    let card_uri = card
        .get("rest_id")
        .and_then(Value::as_str)
        .or_else(|| card.pointer("/legacy/url").and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| string_value(values.get("card_url")));

    Some(PollInfo {
        endpoint: string_value(values.get("api")),
        card_uri,
        card_name: card
            .pointer("/legacy/name")
            .and_then(Value::as_str)
            .map(str::to_string),
        total_votes: choices.iter().map(|choice| choice.count).sum(),
        choices,
        selected_choice: number_value(values.get("selected_choice")).map(|n| n as u32),
        counts_are_final: bool_value(values.get("counts_are_final")).unwrap_or(false),
        end_datetime_utc: string_value(values.get("end_datetime_utc")),
        last_updated_datetime_utc: string_value(values.get("last_updated_datetime_utc")),
        duration_minutes: number_value(values.get("duration_minutes")),
    })
}
