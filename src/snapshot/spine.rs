use std::collections::HashSet;

use indexmap::IndexMap;

use crate::store::normalize::user_id;
use crate::store::{TweetRecord, TweetStore};

fn children_of(store: &TweetStore, id: &str) -> Vec<String> {
    store
        .get_relation(id)
        .map(|relation| relation.reply_ids())
        .unwrap_or_default()
}

fn is_author(related: &IndexMap<String, TweetRecord>, id: &str, author: &str) -> bool {
    related
        .get(id)
        .and_then(|record| user_id(&record.result))
        .is_some_and(|found| found == author)
}

/// Linear path from `first_id` following the root author's own replies.
///
/// At each step a single direct author reply is taken. Failing that, a single
/// child whose own replies include the author is taken together with that
/// author reply. Any tie ends the walk, as does a repeated id.
pub fn author_spine(
    store: &TweetStore,
    first_id: &str,
    root_author: Option<&str>,
    related: &IndexMap<String, TweetRecord>,
) -> Vec<String> {
    let mut path = vec![first_id.to_string()];
    let Some(author) = root_author else {
        return path;
    };
    let mut seen: HashSet<String> = path.iter().cloned().collect();
    let mut current = first_id.to_string();

    loop {
        let children = children_of(store, &current);
        if children.is_empty() {
            break;
        }

        let direct: Vec<&String> = children
            .iter()
            .filter(|id| is_author(related, id, author))
            .collect();
        let next = match direct.as_slice() {
            [only] => vec![(*only).clone()],
            [] => {
                let bridges: Vec<&String> = children
                    .iter()
                    .filter(|id| {
                        children_of(store, id)
                            .iter()
                            .any(|grandchild| is_author(related, grandchild, author))
                    })
                    .collect();
                let [middle] = bridges.as_slice() else {
                    break;
                };
                let authored: Vec<String> = children_of(store, middle)
                    .into_iter()
                    .filter(|id| is_author(related, id, author))
                    .collect();
                let [reply] = authored.as_slice() else {
                    break;
                };
                vec![(*middle).clone(), reply.clone()]
            }
            _ => break,
        };

        if next.iter().any(|id| seen.contains(id)) {
            break;
        }
        seen.extend(next.iter().cloned());
        current = next[next.len() - 1].clone();
        path.extend(next);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::tweet;
    use crate::store::LimitedActionsUpdate;

    fn store_all(tweets: &[(&str, &str, Option<&str>)]) -> (TweetStore, IndexMap<String, TweetRecord>) {
        let store = TweetStore::new();
        for (id, author, parent) in tweets {
            store.store_tweet(&tweet(id, author, *parent), None, false, LimitedActionsUpdate::Keep);
        }
        let related = tweets
            .iter()
            .filter_map(|(id, _, _)| store.get_tweet(id).map(|r| (id.to_string(), r)))
            .collect();
        (store, related)
    }

    #[test]
    fn test_follows_direct_author_replies() {
        let (store, related) = store_all(&[
            ("r1", "op", Some("root")),
            ("r2", "op", Some("r1")),
            ("x", "other", Some("r1")),
            ("r3", "op", Some("r2")),
        ]);
        assert_eq!(author_spine(&store, "r1", Some("op"), &related), ["r1", "r2", "r3"]);
    }

    #[test]
    fn test_bridges_through_single_other_reply() {
        let (store, related) = store_all(&[
            ("q", "other", Some("root")),
            ("a", "op", Some("q")),
            ("b", "third", Some("a")),
            ("c", "op", Some("b")),
        ]);
        assert_eq!(author_spine(&store, "q", Some("op"), &related), ["q", "a", "b", "c"]);
    }

    #[test]
    fn test_tie_stops_branch() {
        let (store, related) = store_all(&[
            ("r1", "op", Some("root")),
            ("a", "op", Some("r1")),
            ("b", "op", Some("r1")),
        ]);
        assert_eq!(author_spine(&store, "r1", Some("op"), &related), ["r1"]);

        let (store, related) = store_all(&[
            ("r1", "x", Some("root")),
            ("m1", "y", Some("r1")),
            ("m2", "z", Some("r1")),
            ("a", "op", Some("m1")),
            ("b", "op", Some("m2")),
        ]);
        assert_eq!(author_spine(&store, "r1", Some("op"), &related), ["r1"]);
    }

    #[test]
    fn test_unknown_author_keeps_first_only() {
        let (store, related) = store_all(&[("r1", "op", Some("root")), ("r2", "op", Some("r1"))]);
        assert_eq!(author_spine(&store, "r1", None, &related), ["r1"]);
    }
}
