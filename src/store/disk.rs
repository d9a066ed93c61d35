// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Disk-backed partition discovery
//!
//! Persisted indexes live under `<root>/<pr_id>/storage_<suffix>/`, one
//! directory per partition, each holding a `docstore.json`. The partition
//! is named `<pr_id>_<suffix>`. Opening the index format itself is
//! delegated to a [`PartitionOpener`]; this module only owns the layout
//! and the skip-on-corruption policy.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, RevuError};
use crate::store::{CollectionStore, LoadedPartitions, PartitionHandle, PartitionMap};

/// Name of the file every loadable partition directory must contain
pub const DOCSTORE_FILE: &str = "docstore.json";

/// Prefix of per-partition storage directories
const STORAGE_DIR_PREFIX: &str = "storage_";

/// Opens one partition's persisted index into live query handles
#[async_trait]
pub trait PartitionOpener: Send + Sync {
    async fn open(&self, partition_name: &str, storage_dir: &Path) -> Result<PartitionHandle>;
}

/// Collection store over a directory of persisted per-PR indexes
pub struct DiskCollectionStore {
    root: PathBuf,
    opener: Arc<dyn PartitionOpener>,
}

impl DiskCollectionStore {
    pub fn new(root: impl Into<PathBuf>, opener: Arc<dyn PartitionOpener>) -> Self {
        Self {
            root: root.into(),
            opener,
        }
    }

    /// Discover partition storage directories for a PR, sorted by name for
    /// a stable load order.
    fn discover(&self, pr_id: &str) -> Result<Vec<(String, PathBuf)>> {
        let pr_dir = self.root.join(pr_id);
        if !pr_dir.is_dir() {
            return Err(RevuError::IndexLoad(format!(
                "index directory not found for {pr_id} at {}",
                pr_dir.display()
            )));
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(&pr_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            let Some(suffix) = dir_name.strip_prefix(STORAGE_DIR_PREFIX) else {
                continue;
            };
            if suffix.is_empty() {
                continue;
            }
            found.push((format!("{pr_id}_{suffix}"), path));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }
}

#[async_trait]
impl CollectionStore for DiskCollectionStore {
    async fn load(&self, pr_id: &str) -> Result<LoadedPartitions> {
        let discovered = self.discover(pr_id)?;

        let mut handles = PartitionMap::new();
        let mut collections = Vec::new();

        for (name, storage_dir) in discovered {
            // A partition without its docstore is unavailable, not fatal.
            if !storage_dir.join(DOCSTORE_FILE).exists() {
                tracing::warn!(
                    partition = %name,
                    dir = %storage_dir.display(),
                    "storage files missing for partition, skipping"
                );
                continue;
            }

            match self.opener.open(&name, &storage_dir).await {
                Ok(handle) => {
                    tracing::debug!(partition = %name, "partition loaded");
                    collections.push(name.clone());
                    handles.insert(name, handle);
                }
                Err(e) => {
                    tracing::warn!(partition = %name, error = %e, "error loading partition, skipping");
                }
            }
        }

        if handles.is_empty() {
            return Err(RevuError::IndexLoad(format!(
                "no partitions were successfully loaded for {pr_id}"
            )));
        }

        tracing::info!(
            pr_id = %pr_id,
            count = collections.len(),
            collections = ?collections,
            "loaded partitions"
        );

        Ok(LoadedPartitions {
            handles,
            collections,
        })
    }
}
