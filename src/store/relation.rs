use indexmap::IndexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Reply,
    Quote,
    Retweet,
}

/// Directed edges attached to one tweet id.
///
/// `quote_by` is a single id (the last quoter seen wins) while `retweet_by`
/// keeps every retweeter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relation {
    pub reply_to: Option<String>,
    pub replies: Option<IndexSet<String>>,
    pub quote: Option<String>,
    pub quote_by: Option<String>,
    pub retweet: Option<String>,
    pub retweet_by: Option<IndexSet<String>>,
}

impl Relation {
    /// Number of edges leaving this record, counting set members individually.
    pub fn edge_count(&self) -> usize {
        let singles = [&self.reply_to, &self.quote, &self.quote_by, &self.retweet]
            .iter()
            .filter(|edge| edge.is_some())
            .count();
        singles
            + self.replies.as_ref().map_or(0, IndexSet::len)
            + self.retweet_by.as_ref().map_or(0, IndexSet::len)
    }

    /// Every id this record points at, in field order.
    pub fn linked_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        ids.extend(self.quote.iter().cloned());
        ids.extend(self.quote_by.iter().cloned());
        ids.extend(self.replies.iter().flatten().cloned());
        ids.extend(self.reply_to.iter().cloned());
        ids.extend(self.retweet.iter().cloned());
        ids.extend(self.retweet_by.iter().flatten().cloned());
        ids
    }

    pub fn reply_ids(&self) -> Vec<String> {
        self.replies.iter().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_count_counts_set_members() {
        let relation = Relation {
            reply_to: Some("p".into()),
            replies: Some(["a", "b"].iter().map(|s| s.to_string()).collect()),
            quote_by: Some("q".into()),
            retweet_by: Some(["r"].iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        };
        assert_eq!(relation.edge_count(), 5);
        assert_eq!(relation.linked_ids(), vec!["q", "a", "b", "p", "r"]);
    }

    #[test]
    fn test_empty_relation_has_no_edges() {
        assert_eq!(Relation::default().edge_count(), 0);
    }
}
