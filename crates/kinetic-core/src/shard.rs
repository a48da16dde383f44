//! Shard Descriptor
//!
//! A `Shard` is one entry of a describe-stream response. Shards split and
//! merge over time; the parent links record that lineage:
//!
//! - **split**: two children both name the split shard as `parent_shard_id`
//! - **merge**: the merged child names one input as `parent_shard_id` and the
//!   other as `adjacent_parent_shard_id`
//!
//! A shard referenced as a parent by another shard in the same snapshot is
//! closed to writes. Snapshots are immutable; fetch a new one for every
//! topology decision.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard {
    /// Shard identifier, e.g. `shardId-000000000000`
    pub shard_id: String,

    /// Shard this one split or merged from
    pub parent_shard_id: Option<String>,

    /// Second input of a merge
    pub adjacent_parent_shard_id: Option<String>,
}

impl Shard {
    /// A shard with no lineage (created with the stream).
    pub fn new(shard_id: impl Into<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
            parent_shard_id: None,
            adjacent_parent_shard_id: None,
        }
    }

    pub fn with_parent(mut self, parent_shard_id: impl Into<String>) -> Self {
        self.parent_shard_id = Some(parent_shard_id.into());
        self
    }

    pub fn with_adjacent_parent(mut self, adjacent_parent_shard_id: impl Into<String>) -> Self {
        self.adjacent_parent_shard_id = Some(adjacent_parent_shard_id.into());
        self
    }

    /// Parent ids this shard references, in (parent, adjacent parent) order.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.parent_shard_id
            .as_deref()
            .into_iter()
            .chain(self.adjacent_parent_shard_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_shard_has_no_parents() {
        let shard = Shard::new("shardId-000000000000");
        assert_eq!(shard.parents().count(), 0);
    }

    #[test]
    fn test_merged_shard_lists_both_parents() {
        let shard = Shard::new("shardId-000000000003")
            .with_parent("shardId-000000000001")
            .with_adjacent_parent("shardId-000000000002");
        let parents: Vec<&str> = shard.parents().collect();
        assert_eq!(parents, vec!["shardId-000000000001", "shardId-000000000002"]);
    }
}
