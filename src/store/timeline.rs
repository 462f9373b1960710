//! Walks timeline-shaped GraphQL responses and feeds every tweet they carry
//! into a [`TweetStore`].

use serde_json::Value;
use tracing::debug;

use super::normalize::{normalize_tweet_result, select_controller_data, tweet_id, NormalizedResult};
use super::TweetStore;

const INSTRUCTION_PATHS: [&str; 4] = [
    "/data/home/home_timeline_urt/instructions",
    "/data/threaded_conversation_with_injections_v2/instructions",
    "/data/search_by_raw_query/search_timeline/timeline/instructions",
    "/data/user/result/timeline/timeline/instructions",
];

/// Counts returned by [`ingest_timeline`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub tweets: usize,
    pub tombstones: usize,
}

/// Every instruction array present in `response`, in path order.
pub fn collect_instructions(response: &Value) -> Vec<&Value> {
    INSTRUCTION_PATHS
        .iter()
        .filter_map(|path| response.pointer(path))
        .filter_map(Value::as_array)
        .flatten()
        .collect()
}

fn instruction_entries(instruction: &Value) -> Vec<&Value> {
    match instruction.get("type").and_then(Value::as_str) {
        Some("TimelineAddEntries") => instruction
            .get("entries")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().collect())
            .unwrap_or_default(),
        Some("TimelinePinEntry") => instruction.get("entry").into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Tweet id encoded in a `tweet-<id>` entry id.
pub fn entry_tweet_id(entry_id: &str) -> Option<&str> {
    let id = entry_id.strip_prefix("tweet-")?;
    (!id.is_empty()).then_some(id)
}

/// Tweet id encoded at the end of a module item id such as
/// `conversationthread-1-tweet-42`.
fn module_item_tweet_id(entry_id: &str) -> Option<&str> {
    let (_, id) = entry_id.rsplit_once("-tweet-")?;
    (!id.is_empty()).then_some(id)
}

struct Ingest<'a> {
    store: &'a TweetStore,
    base_tweet_id: Option<&'a str>,
    last_live: Option<String>,
    summary: IngestSummary,
}

impl Ingest<'_> {
    fn result(
        &mut self,
        raw: &Value,
        fallback_id: Option<&str>,
        controller_data: Option<String>,
        refresh: bool,
    ) {
        match normalize_tweet_result(raw) {
            NormalizedResult::Tombstone(tombstone) => {
                let Some(id) = fallback_id else {
                    debug!("tombstone without a recoverable tweet id");
                    return;
                };
                self.store
                    .store_deleted(id, tombstone, self.last_live.clone());
                self.summary.tombstones += 1;
            }
            normalized => {
                let Some((tweet, actions)) = normalized.into_live() else {
                    return;
                };
                if let Some(id) = self.store.store_tweet(&tweet, controller_data, refresh, actions) {
                    self.last_live = Some(id);
                    self.summary.tweets += 1;
                }
            }
        }
    }

    fn entry(&mut self, entry: &Value) {
        let entry_id = entry.get("entryId").and_then(Value::as_str).unwrap_or_default();
        let Some(content) = entry.get("content") else {
            return;
        };
        match content.get("entryType").and_then(Value::as_str) {
            Some("TimelineTimelineItem") => {
                let Some(raw) = content.pointer("/itemContent/tweet_results/result") else {
                    return;
                };
                let controller_data = select_controller_data(&[
                    content.get("clientEventInfo"),
                    entry.get("clientEventInfo"),
                ]);
                let id = entry_tweet_id(entry_id);
                let refresh = matches!((id, self.base_tweet_id), (Some(a), Some(b)) if a == b);
                self.result(raw, id, controller_data, refresh);
            }
            Some("TimelineTimelineModule") => {
                let items = content.get("items").and_then(Value::as_array);
                for item in items.into_iter().flatten() {
                    let Some(raw) = item.pointer("/item/itemContent/tweet_results/result") else {
                        continue;
                    };
                    let controller_data = select_controller_data(&[
                        item.pointer("/item/clientEventInfo"),
                        item.get("clientEventInfo"),
                        content.get("clientEventInfo"),
                        entry.get("clientEventInfo"),
                    ]);
                    let item_id = item
                        .get("entryId")
                        .and_then(Value::as_str)
                        .and_then(module_item_tweet_id);
                    self.result(raw, item_id, controller_data, false);
                }
            }
            _ => {}
        }
    }
}

/// Store every tweet and tombstone in a timeline response.
///
/// The entry whose id is `tweet-<base_tweet_id>` has its relations rebuilt;
/// everything else merges into what is already known. A tombstone's parent
/// is the nearest live tweet that precedes it in the scan.
pub fn ingest_timeline(
    store: &TweetStore,
    response: &Value,
    base_tweet_id: Option<&str>,
) -> IngestSummary {
    let mut ingest = Ingest {
        store,
        base_tweet_id,
        last_live: None,
        summary: IngestSummary::default(),
    };
    for instruction in collect_instructions(response) {
        for entry in instruction_entries(instruction) {
            ingest.entry(entry);
        }
    }
    debug!(
        "ingested {} tweets and {} tombstones",
        ingest.summary.tweets, ingest.summary.tombstones
    );
    ingest.summary
}

/// Id of the tweet carried by a bare tweet result, if it is one.
pub fn live_result_id(raw: &Value) -> Option<String> {
    normalize_tweet_result(raw)
        .into_live()
        .and_then(|(tweet, _)| tweet_id(&tweet))
}
