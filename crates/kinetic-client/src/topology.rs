//! Shard Topology Resolution
//!
//! Computes how many shards of a stream currently accept writes. The count is
//! the basis of the dispatch pool's concurrency multiplier: roughly one
//! in-flight batch per writable shard.
//!
//! ## Open vs Closed
//!
//! ```text
//!   A (closed)              A and B closed, C open
//!   ├── B (parent = A)      A ──┐
//!   └── C (parent = A)      B ──┴── C (parent = A, adjacent parent = B)
//!   open = 2                open = 1
//! ```
//!
//! A shard is CLOSED when another descriptor of the same snapshot names it as
//! parent or adjacent parent. A parent id that is absent from the snapshot has
//! aged out of the service's shard retention and is not counted.
//!
//! ## Errors
//!
//! An empty snapshot resolves to zero; callers decide what zero means. A
//! describe call that came back without topology is reported as
//! `NilDescribeStreamResponse` / `NilStreamDescription` and never coerced to
//! zero.

use std::collections::HashSet;
use std::sync::Arc;

use kinetic_core::Shard;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::service::{DescribeStreamOutput, StreamService};

/// Open/closed classification of one shard snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTopology {
    open: Vec<String>,
    closed: Vec<String>,
}

impl ShardTopology {
    /// Classify a snapshot. Shard order is preserved in both lists and
    /// duplicate descriptors count once.
    pub fn from_shards(shards: &[Shard]) -> Self {
        let ids: HashSet<&str> = shards.iter().map(|s| s.shard_id.as_str()).collect();
        let closed_ids: HashSet<&str> = shards
            .iter()
            .flat_map(Shard::parents)
            .filter(|parent| ids.contains(parent))
            .collect();

        let mut seen = HashSet::new();
        let mut open = Vec::new();
        let mut closed = Vec::new();
        for shard in shards {
            let id = shard.shard_id.as_str();
            if !seen.insert(id) {
                continue;
            }
            if closed_ids.contains(id) {
                closed.push(id.to_string());
            } else {
                open.push(id.to_string());
            }
        }

        Self { open, closed }
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn open_shard_ids(&self) -> Vec<String> {
        self.open.clone()
    }

    pub fn closed_shard_ids(&self) -> &[String] {
        &self.closed
    }

    pub fn total(&self) -> usize {
        self.open.len() + self.closed.len()
    }
}

/// Number of writable shards in a snapshot.
pub fn open_shard_count(shards: &[Shard]) -> usize {
    ShardTopology::from_shards(shards).open_count()
}

/// Extract the shard list from a describe-stream response, rejecting nil
/// responses and nil descriptions.
pub fn shards_from_output(output: Option<DescribeStreamOutput>) -> Result<Vec<Shard>> {
    let output = output.ok_or(ClientError::NilDescribeStreamResponse)?;
    let description = output
        .stream_description
        .ok_or(ClientError::NilStreamDescription)?;
    Ok(description.shards)
}

/// Resolves a stream's open shard count from a fresh describe call.
///
/// Nothing is cached: every call fetches a new snapshot because shards may
/// split or merge between calls.
#[derive(Clone)]
pub struct ShardTopologyResolver {
    service: Arc<dyn StreamService>,
}

impl ShardTopologyResolver {
    pub fn new(service: Arc<dyn StreamService>) -> Self {
        Self { service }
    }

    /// Fetch and classify the current topology of `stream`.
    pub async fn topology(&self, stream: &str) -> Result<ShardTopology> {
        let output = self.service.describe_stream(stream).await?;
        let shards = shards_from_output(output)?;
        let topology = ShardTopology::from_shards(&shards);
        debug!(
            stream,
            open = topology.open_count(),
            closed = topology.closed_shard_ids().len(),
            "Resolved shard topology"
        );
        Ok(topology)
    }

    /// Open shard count of `stream`.
    pub async fn resolve(&self, stream: &str) -> Result<usize> {
        Ok(self.topology(stream).await?.open_count())
    }

    /// Recommended worker count: one per open shard.
    pub async fn concurrency_multiplier(&self, stream: &str) -> Result<usize> {
        self.resolve(stream).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MemoryStreamService, StreamDescription, StreamStatus};

    fn shard(id: &str) -> Shard {
        Shard::new(id)
    }

    // ==========================================================
    // Classification
    // ==========================================================

    #[test]
    fn test_empty_snapshot_is_zero() {
        assert_eq!(open_shard_count(&[]), 0);
    }

    #[test]
    fn test_no_lineage_all_open() {
        let shards = vec![shard("A"), shard("B"), shard("C")];
        assert_eq!(open_shard_count(&shards), 3);
    }

    #[test]
    fn test_split_closes_parent() {
        let shards = vec![
            shard("A"),
            shard("B").with_parent("A"),
            shard("C").with_parent("A"),
        ];
        let topology = ShardTopology::from_shards(&shards);
        assert_eq!(topology.open_count(), 2);
        assert_eq!(topology.open_shard_ids(), vec!["B", "C"]);
        assert_eq!(topology.closed_shard_ids(), &["A".to_string()]);
    }

    #[test]
    fn test_merge_closes_both_inputs() {
        let shards = vec![
            shard("A"),
            shard("B"),
            shard("C").with_parent("A").with_adjacent_parent("B"),
        ];
        assert_eq!(open_shard_count(&shards), 1);
    }

    #[test]
    fn test_aged_out_parent_not_counted() {
        let shards = vec![shard("B").with_parent("A"), shard("C").with_parent("A")];
        let topology = ShardTopology::from_shards(&shards);
        assert_eq!(topology.open_count(), 2);
        assert!(topology.closed_shard_ids().is_empty());
    }

    #[test]
    fn test_parent_referenced_twice_closed_once() {
        // split, then both children merged back together
        let shards = vec![
            shard("A"),
            shard("B").with_parent("A"),
            shard("C").with_parent("A"),
            shard("D").with_parent("B").with_adjacent_parent("C"),
        ];
        let topology = ShardTopology::from_shards(&shards);
        assert_eq!(topology.open_count(), 1);
        assert_eq!(topology.total(), 4);
    }

    // ==========================================================
    // Describe output handling
    // ==========================================================

    #[test]
    fn test_nil_response_is_missing_topology() {
        let err = shards_from_output(None).unwrap_err();
        assert!(matches!(err, ClientError::NilDescribeStreamResponse));
    }

    #[test]
    fn test_nil_description_is_missing_topology() {
        let err = shards_from_output(Some(DescribeStreamOutput {
            stream_description: None,
        }))
        .unwrap_err();
        assert!(err.is_missing_topology());
    }

    #[test]
    fn test_empty_description_is_not_an_error() {
        let shards = shards_from_output(Some(DescribeStreamOutput {
            stream_description: Some(StreamDescription {
                stream_name: "s".to_string(),
                stream_status: StreamStatus::Active,
                shards: vec![],
            }),
        }))
        .unwrap();
        assert!(shards.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_sees_fresh_topology() {
        let service = Arc::new(MemoryStreamService::new());
        service.create_stream("orders", 2).await.unwrap();
        let resolver = ShardTopologyResolver::new(service.clone());

        assert_eq!(resolver.resolve("orders").await.unwrap(), 2);

        service.split_shard("orders", "shardId-000000000000").await.unwrap();
        assert_eq!(resolver.resolve("orders").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_resolver_missing_stream() {
        let resolver = ShardTopologyResolver::new(Arc::new(MemoryStreamService::new()));
        let err = resolver.resolve("missing").await.unwrap_err();
        assert!(matches!(err, ClientError::ResourceNotFound(_)));
    }
}
