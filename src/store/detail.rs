use serde_json::Value;

use super::normalize::{normalize_tweet_result, tweet_id};
use super::timeline::collect_instructions;
use super::TweetStore;

fn is_promoted(item_content: Option<&Value>) -> bool {
    item_content
        .and_then(|content| content.get("promotedMetadata"))
        .is_some_and(|meta| !meta.is_null())
}

/// Drop sponsored entries from a detail response in place.
///
/// Whole items carrying `promotedMetadata` go, as do promoted items inside
/// modules. Everything else is left untouched.
pub fn strip_promoted_entries(detail: &mut Value) {
    let Some(instructions) = detail
        .pointer_mut("/data/threaded_conversation_with_injections_v2/instructions")
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    for instruction in instructions.iter_mut() {
        let Some(entries) = instruction.get_mut("entries").and_then(Value::as_array_mut) else {
            continue;
        };
        entries.retain(|entry| {
            let Some(content) = entry.get("content") else {
                return true;
            };
            !(content.get("entryType").and_then(Value::as_str) == Some("TimelineTimelineItem")
                && is_promoted(content.get("itemContent")))
        });
        for entry in entries.iter_mut() {
            if let Some(items) = entry
                .pointer_mut("/content/items")
                .and_then(Value::as_array_mut)
            {
                items.retain(|item| !is_promoted(item.pointer("/item/itemContent")));
            }
        }
    }
}

fn result_matches(raw: &Value, id: &str) -> bool {
    normalize_tweet_result(raw)
        .into_live()
        .and_then(|(tweet, _)| tweet_id(&tweet))
        .is_some_and(|found| found == id)
}

/// The raw result for `tweet_id` in a detail response, if present.
///
/// Looks at the `tweet-<id>` entry first, then any inline item with that id,
/// then non-promoted module items.
pub fn extract_tweet_from_detail<'a>(detail: &'a Value, tweet_id: &str) -> Option<&'a Value> {
    let instructions = collect_instructions(detail);
    let entries: Vec<&Value> = instructions
        .iter()
        .filter_map(|instruction| instruction.get("entries").and_then(Value::as_array))
        .flatten()
        .collect();

    let focal_entry_id = format!("tweet-{}", tweet_id);
    let focal = entries.iter().find_map(|entry| {
        (entry.get("entryId").and_then(Value::as_str) == Some(focal_entry_id.as_str()))
            .then(|| entry.pointer("/content/itemContent/tweet_results/result"))
            .flatten()
    });
    if focal.is_some() {
        return focal;
    }

    let inline = entries.iter().find_map(|entry| {
        entry
            .pointer("/content/itemContent/tweet_results/result")
            .filter(|raw| result_matches(raw, tweet_id))
    });
    if inline.is_some() {
        return inline;
    }

    entries
        .iter()
        .filter_map(|entry| entry.pointer("/content/items").and_then(Value::as_array))
        .flatten()
        .filter(|item| !is_promoted(item.pointer("/item/itemContent")))
        .find_map(|item| {
            item.pointer("/item/itemContent/tweet_results/result")
                .filter(|raw| result_matches(raw, tweet_id))
        })
}

/// Re-store the focal tweet of `detail`, rebuilding its relations.
///
/// Returns `false` when the detail does not contain that tweet.
pub fn apply_detail_to_tweet_cache(store: &TweetStore, tweet_id: &str, detail: &Value) -> bool {
    let Some(raw) = extract_tweet_from_detail(detail, tweet_id) else {
        return false;
    };
    let Some((tweet, actions)) = normalize_tweet_result(raw).into_live() else {
        return false;
    };
    let controller_data = store.controller_data(tweet_id);
    store
        .store_tweet(&tweet, controller_data, true, actions)
        .is_some()
}
