// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Retrieval gateway
//!
//! Executes one focused query against one named partition and extracts
//! provenance from the retrieved chunks. A partition that is missing from
//! the live handle map or fails mid-query yields absence, never an error:
//! one partition's failure must not abort the overall request.

use serde::{Deserialize, Serialize};

use crate::store::{PartitionMap, RetrievedChunk};

/// One provenance entry backing an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Bounded-length preview of the chunk text
    pub text_preview: String,

    /// Whatever metadata the chunk carried (file name/path, timestamps)
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Result of querying one partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Generated answer conditioned on the partition's chunks
    pub answer: String,

    /// Provenance extracted from every retrieved chunk
    pub sources: Vec<SourceRef>,

    /// Originating partition name
    pub collection: String,
}

/// Retrieval gateway over a session's live partition handles
pub struct RetrievalGateway {
    top_k: usize,
    preview_len: usize,
}

impl Default for RetrievalGateway {
    fn default() -> Self {
        Self {
            top_k: 5,
            preview_len: 200,
        }
    }
}

impl RetrievalGateway {
    pub fn new(top_k: usize, preview_len: usize) -> Self {
        Self {
            top_k,
            preview_len,
        }
    }

    /// Query one partition with focus framing.
    ///
    /// Returns `None` when the partition is unknown or anything fails; the
    /// orchestrator proceeds with whatever results did succeed.
    pub async fn query_partition(
        &self,
        handles: &PartitionMap,
        collection_name: &str,
        query: &str,
        focus: &str,
    ) -> Option<RetrievalResult> {
        let Some(handle) = handles.get(collection_name) else {
            tracing::warn!(
                partition = %collection_name,
                "partition not found in session handles, skipping"
            );
            return None;
        };

        let focused_query = self.build_focused_query(collection_name, query, focus);
        tracing::debug!(partition = %collection_name, query = %focused_query, "querying partition");

        let chunks = match handle.retriever.retrieve(&focused_query, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(partition = %collection_name, error = %e, "chunk retrieval failed");
                return None;
            }
        };

        let answer = match handle.engine.query(&focused_query).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(partition = %collection_name, error = %e, "partition query failed");
                return None;
            }
        };

        let sources = chunks
            .iter()
            .map(|chunk| self.source_ref(chunk))
            .collect();

        Some(RetrievalResult {
            answer,
            sources,
            collection: collection_name.to_string(),
        })
    }

    /// Append focus framing, plus file targeting for source-code partitions
    /// when the query names a file.
    fn build_focused_query(&self, collection_name: &str, query: &str, focus: &str) -> String {
        let mut focused = format!("{query}\n\nFocus on: {focus}");

        if collection_name.ends_with("_source_code") && query.to_lowercase().contains("file") {
            if let Some(path) = find_file_path(query) {
                focused.push_str(&format!("\n\nSpecifically look for file: {path}"));
            }
        }

        focused
    }

    fn source_ref(&self, chunk: &RetrievedChunk) -> SourceRef {
        let text_preview = if chunk.text.chars().count() > self.preview_len {
            let truncated: String = chunk.text.chars().take(self.preview_len).collect();
            format!("{truncated}...")
        } else {
            chunk.text.clone()
        };

        SourceRef {
            text_preview,
            metadata: chunk.metadata.clone(),
        }
    }
}

/// Find the first path-like token with a known source extension.
fn find_file_path(query: &str) -> Option<&str> {
    const EXTENSIONS: &[&str] = &[
        ".yml", ".yaml", ".json", ".py", ".go", ".ts", ".js", ".java", ".cpp", ".h", ".hpp",
        ".rs",
    ];

    query
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | ',' | '?' | ')')))
        .find(|token| {
            token.contains('/') && EXTENSIONS.iter().any(|ext| token.ends_with(ext))
        })
}
