// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Collection store for Revu
//!
//! A pull request's knowledge is split into named, independently queryable
//! partitions (PR metadata, diffs, requirements, ...), each backed by
//! similarity search over chunked source material. The orchestration core
//! consumes partitions through the traits here; how the chunks were indexed
//! is somebody else's job.

pub mod disk;
pub mod lexical;

pub use disk::*;
pub use lexical::*;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// One chunk returned by a partition's retriever
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text
    pub text: String,

    /// Arbitrary metadata carried by the chunk (file name/path, timestamps)
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Retrieves the nearest chunks of one partition for a query
#[async_trait]
pub trait ChunkRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Produces a generated answer conditioned on one partition's material
#[async_trait]
pub trait PartitionQueryEngine: Send + Sync {
    async fn query(&self, text: &str) -> Result<String>;
}

/// Live query handles for one partition
#[derive(Clone)]
pub struct PartitionHandle {
    /// Top-k nearest-chunk retrieval (provenance extraction)
    pub retriever: Arc<dyn ChunkRetriever>,

    /// Answer generation over the partition's chunks
    pub engine: Arc<dyn PartitionQueryEngine>,
}

impl std::fmt::Debug for PartitionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionHandle").finish_non_exhaustive()
    }
}

/// Mapping from partition name to its live handles
pub type PartitionMap = HashMap<String, PartitionHandle>;

/// Result of loading all partitions for one pull request
pub struct LoadedPartitions {
    /// Live handles by partition name
    pub handles: PartitionMap,

    /// Partition names in load order
    pub collections: Vec<String>,
}

impl std::fmt::Debug for LoadedPartitions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPartitions")
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

/// Loads the partition set for a pull request
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn load(&self, pr_id: &str) -> Result<LoadedPartitions>;
}

/// In-memory collection store
///
/// Partitions are registered programmatically; used by tests and by
/// embedders that build handles themselves.
#[derive(Default)]
pub struct StaticCollectionStore {
    partitions: HashMap<String, Vec<(String, PartitionHandle)>>,
}

impl StaticCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a partition for a pull request
    pub fn with_partition(
        mut self,
        pr_id: impl Into<String>,
        name: impl Into<String>,
        handle: PartitionHandle,
    ) -> Self {
        self.partitions
            .entry(pr_id.into())
            .or_default()
            .push((name.into(), handle));
        self
    }
}

#[async_trait]
impl CollectionStore for StaticCollectionStore {
    async fn load(&self, pr_id: &str) -> Result<LoadedPartitions> {
        let entries = self.partitions.get(pr_id).ok_or_else(|| {
            crate::error::RevuError::IndexLoad(format!("no partitions registered for {pr_id}"))
        })?;

        let mut handles = PartitionMap::new();
        let mut collections = Vec::new();
        for (name, handle) in entries {
            collections.push(name.clone());
            handles.insert(name.clone(), handle.clone());
        }

        Ok(LoadedPartitions {
            handles,
            collections,
        })
    }
}
