//! Derives the ordered conversation view for one tweet from whatever the
//! store currently holds.

pub mod controller;
pub mod spine;

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};

use crate::store::normalize::user_id;
use crate::store::{DeletedTweet, Relation, TweetRecord, TweetStore};

pub use controller::{SidebarController, SidebarState};
pub use spine::author_spine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    Success,
    /// Fewer related tweets are cached than the root's edges point at.
    Partial,
}

impl SnapshotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotStatus::Success => "success",
            SnapshotStatus::Partial => "partial",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AncestorEntry {
    Tweet(TweetRecord),
    Deleted(DeletedTweet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    Ancestor,
    Main,
    Reply,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemBody {
    Tweet(TweetRecord),
    Deleted(DeletedTweet),
}

/// One row of the rendered conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineItem {
    pub key: String,
    pub role: ItemRole,
    pub link_top: bool,
    pub link_bottom: bool,
    pub body: ItemBody,
}

impl TimelineItem {
    pub fn is_deleted(&self) -> bool {
        matches!(self.body, ItemBody::Deleted(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tweet: TweetRecord,
    pub relation: Option<Relation>,
    pub related: IndexMap<String, TweetRecord>,
    pub status: SnapshotStatus,
    pub ancestors: Vec<AncestorEntry>,
    pub timeline: Vec<TimelineItem>,
}

/// What the sidebar showed before, used to keep reply order stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviousView<'a> {
    pub focused: Option<&'a str>,
    pub related: Option<&'a IndexMap<String, TweetRecord>>,
}

impl<'a> From<&'a Snapshot> for PreviousView<'a> {
    fn from(snapshot: &'a Snapshot) -> Self {
        Self {
            focused: Some(snapshot.tweet.id.as_str()),
            related: Some(&snapshot.related),
        }
    }
}

/// Build the view for `tweet_id`. `None` when the tweet itself is not cached.
pub fn build_snapshot(
    store: &TweetStore,
    tweet_id: &str,
    previous: PreviousView<'_>,
) -> Option<Snapshot> {
    let tweet = store.get_tweet(tweet_id)?;
    let relation = store.get_relation(tweet_id);

    let mut related = IndexMap::new();
    if let Some(relation) = &relation {
        collect_direct(store, relation, &mut related);
        expand(store, tweet_id, relation, &mut related);
    }

    let relation = relation.map(|relation| reorder_replies(relation, previous));
    let status = compute_status(relation.as_ref(), &related);
    let ancestors = ancestor_chain(store, tweet_id, relation.as_ref(), &related);
    let timeline = timeline_items(store, &tweet, relation.as_ref(), &related, &ancestors);

    Some(Snapshot {
        tweet,
        relation,
        related,
        status,
        ancestors,
        timeline,
    })
}

fn collect_direct(
    store: &TweetStore,
    relation: &Relation,
    related: &mut IndexMap<String, TweetRecord>,
) {
    for id in relation.linked_ids() {
        if let Some(record) = store.get_tweet(&id) {
            related.insert(id, record);
        }
    }
}

/// Pull in every cached ancestor and descendant reachable through reply edges.
fn expand(
    store: &TweetStore,
    root_id: &str,
    relation: &Relation,
    related: &mut IndexMap<String, TweetRecord>,
) {
    let mut visited = HashSet::from([root_id.to_string()]);

    let mut parent = relation.reply_to.clone();
    while let Some(id) = parent.take() {
        if !visited.insert(id.clone()) {
            break;
        }
        let Some(record) = store.get_tweet(&id) else {
            break;
        };
        related.insert(id.clone(), record);
        parent = store.get_relation(&id).and_then(|r| r.reply_to);
    }

    let mut stack: Vec<String> = relation.reply_ids().into_iter().rev().collect();
    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(record) = store.get_tweet(&id) else {
            continue;
        };
        related.insert(id.clone(), record);
        if let Some(child_relation) = store.get_relation(&id) {
            stack.extend(child_relation.reply_ids().into_iter().rev());
        }
    }
}

/// Focused reply first, then replies the previous view already showed, then
/// the rest in insertion order.
fn reorder_replies(mut relation: Relation, previous: PreviousView<'_>) -> Relation {
    let Some(replies) = relation.replies.take() else {
        return relation;
    };
    let mut ordered = IndexSet::with_capacity(replies.len());
    if let Some(focused) = previous.focused.filter(|id| replies.contains(*id)) {
        ordered.insert(focused.to_string());
    }
    if let Some(shown) = previous.related {
        ordered.extend(shown.keys().filter(|id| replies.contains(*id)).cloned());
    }
    ordered.extend(replies);
    relation.replies = Some(ordered);
    relation
}

fn compute_status(
    relation: Option<&Relation>,
    related: &IndexMap<String, TweetRecord>,
) -> SnapshotStatus {
    let edges = relation.map_or(0, Relation::edge_count);
    if related.len() < edges {
        SnapshotStatus::Partial
    } else {
        SnapshotStatus::Success
    }
}

/// Parents from the thread root down to the immediate parent. Uncached
/// parents become tombstone placeholders when one was recorded.
fn ancestor_chain(
    store: &TweetStore,
    root_id: &str,
    relation: Option<&Relation>,
    related: &IndexMap<String, TweetRecord>,
) -> Vec<AncestorEntry> {
    let mut ancestors = Vec::new();
    let mut visited = HashSet::from([root_id.to_string()]);
    let mut parent = relation.and_then(|r| r.reply_to.clone());

    while let Some(id) = parent.take() {
        if !visited.insert(id.clone()) {
            break;
        }
        let cached = related.get(&id).cloned().or_else(|| store.get_tweet(&id));
        if let Some(record) = cached {
            parent = store.get_relation(&id).and_then(|r| r.reply_to);
            ancestors.push(AncestorEntry::Tweet(record));
            continue;
        }
        let Some(deleted) = store.get_deleted(&id) else {
            break;
        };
        parent = deleted.parent_tweet_id.clone();
        ancestors.push(AncestorEntry::Deleted(deleted));
    }

    ancestors.reverse();
    ancestors
}

fn timeline_items(
    store: &TweetStore,
    tweet: &TweetRecord,
    relation: Option<&Relation>,
    related: &IndexMap<String, TweetRecord>,
    ancestors: &[AncestorEntry],
) -> Vec<TimelineItem> {
    let mut items = Vec::new();

    for (index, ancestor) in ancestors.iter().enumerate() {
        let (key, body) = match ancestor {
            AncestorEntry::Tweet(record) => (record.id.clone(), ItemBody::Tweet(record.clone())),
            AncestorEntry::Deleted(deleted) => {
                (deleted.tweet_id.clone(), ItemBody::Deleted(deleted.clone()))
            }
        };
        items.push(TimelineItem {
            key,
            role: ItemRole::Ancestor,
            link_top: index > 0,
            link_bottom: true,
            body,
        });
    }

    items.push(TimelineItem {
        key: tweet.id.clone(),
        role: ItemRole::Main,
        link_top: !ancestors.is_empty(),
        link_bottom: false,
        body: ItemBody::Tweet(tweet.clone()),
    });

    let root_author = user_id(&tweet.result);
    for first in relation.map(Relation::reply_ids).unwrap_or_default() {
        let branch = author_spine(store, &first, root_author.as_deref(), related);
        let last = branch.len() - 1;
        for (index, id) in branch.iter().enumerate() {
            let body = match related.get(id) {
                Some(record) => ItemBody::Tweet(record.clone()),
                None => match store.get_deleted(id) {
                    Some(deleted) => ItemBody::Deleted(deleted),
                    None => continue,
                },
            };
            items.push(TimelineItem {
                key: id.clone(),
                role: ItemRole::Reply,
                link_top: index > 0,
                link_bottom: branch.len() > 1 && index != last,
                body,
            });
        }
    }

    items
}
