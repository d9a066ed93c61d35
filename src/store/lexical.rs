// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Lexical partition backend
//!
//! A dependency-free index backend: chunks come straight from a partition's
//! `docstore.json`, retrieval scores them with TF keyword matching
//! normalized by document length, and the query engine conditions a
//! language-model completion on the top chunks. Deployments with a real
//! vector index plug in their own [`PartitionOpener`] instead.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, RevuError};
use crate::llm::LlmProvider;
use crate::store::disk::{PartitionOpener, DOCSTORE_FILE};
use crate::store::{ChunkRetriever, PartitionHandle, PartitionQueryEngine, RetrievedChunk};

/// On-disk document store: the chunk list for one partition
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct DocStore {
    #[serde(default)]
    chunks: Vec<RetrievedChunk>,
}

/// Keyword-scored retriever over an in-memory chunk list
pub struct LexicalRetriever {
    chunks: Vec<RetrievedChunk>,
}

impl LexicalRetriever {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self { chunks }
    }

    /// Load the chunk list from a partition storage directory
    pub fn from_storage_dir(dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(dir.join(DOCSTORE_FILE))?;
        let docstore: DocStore = serde_json::from_str(&content)
            .map_err(|e| RevuError::IndexLoad(format!("corrupt docstore in {}: {e}", dir.display())))?;
        Ok(Self::new(docstore.chunks))
    }

    /// TF score normalized by document length, as in hybrid keyword search
    fn score(query_tokens: &[String], text: &str) -> f32 {
        let text_lower = text.to_lowercase();
        let mut score = 0.0f32;
        for token in query_tokens {
            let occurrences = text_lower.matches(token.as_str()).count() as f32;
            score += occurrences.ln_1p();
        }
        let doc_length = text.split_whitespace().count() as f32;
        if doc_length > 0.0 {
            score / doc_length.sqrt()
        } else {
            0.0
        }
    }
}

#[async_trait]
impl ChunkRetriever for LexicalRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let query_tokens: Vec<String> =
            query.split_whitespace().map(|s| s.to_lowercase()).collect();

        let mut scored: Vec<(f32, &RetrievedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (Self::score(&query_tokens, &chunk.text), chunk))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }
}

/// Query engine that answers by completing over the top retrieved chunks
pub struct GeneratingQueryEngine {
    retriever: Arc<dyn ChunkRetriever>,
    provider: Arc<dyn LlmProvider>,
    context_chunks: usize,
}

impl GeneratingQueryEngine {
    pub fn new(retriever: Arc<dyn ChunkRetriever>, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            retriever,
            provider,
            context_chunks: 5,
        }
    }
}

#[async_trait]
impl PartitionQueryEngine for GeneratingQueryEngine {
    async fn query(&self, text: &str) -> Result<String> {
        let chunks = self.retriever.retrieve(text, self.context_chunks).await?;
        let context = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            "Answer the question using only the context below. \
             If the context does not contain the answer, say so.\n\n\
             Context:\n{context}\n\nQuestion: {text}\n\nAnswer:"
        );
        self.provider.complete(&prompt).await
    }
}

/// Opener that builds lexical handles from a partition's docstore
pub struct LexicalPartitionOpener {
    provider: Arc<dyn LlmProvider>,
}

impl LexicalPartitionOpener {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PartitionOpener for LexicalPartitionOpener {
    async fn open(&self, _partition_name: &str, storage_dir: &Path) -> Result<PartitionHandle> {
        let retriever: Arc<dyn ChunkRetriever> =
            Arc::new(LexicalRetriever::from_storage_dir(storage_dir)?);
        let engine = Arc::new(GeneratingQueryEngine::new(
            retriever.clone(),
            self.provider.clone(),
        ));
        Ok(PartitionHandle { retriever, engine })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;

    fn chunk(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_lexical_retriever_ranks_matching_chunks_first() {
        let retriever = LexicalRetriever::new(vec![
            chunk("the config loader parses settings"),
            chunk("session history trimming logic"),
            chunk("session store creation and session lookup"),
        ]);

        let results = retriever.retrieve("session store", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].text.contains("session store"));
    }

    #[tokio::test]
    async fn test_lexical_retriever_respects_top_k() {
        let retriever = LexicalRetriever::new(vec![chunk("a"), chunk("b"), chunk("c")]);
        let results = retriever.retrieve("anything", 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_generating_engine_conditions_on_chunks() {
        let provider = MockProvider::new().with_response("grounded answer");
        let retriever: Arc<dyn ChunkRetriever> =
            Arc::new(LexicalRetriever::new(vec![chunk("diff adds retry logic")]));
        let engine = GeneratingQueryEngine::new(retriever, Arc::new(provider.clone()));

        let answer = engine.query("what changed?").await.unwrap();
        assert_eq!(answer, "grounded answer");

        let prompts = provider.recorded_prompts();
        assert!(prompts[0].contains("diff adds retry logic"));
        assert!(prompts[0].contains("what changed?"));
    }

    #[tokio::test]
    async fn test_opener_rejects_corrupt_docstore() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(DOCSTORE_FILE), "not json").unwrap();

        let opener = LexicalPartitionOpener::new(Arc::new(MockProvider::new()));
        let err = opener.open("pr_1_code", tmp.path()).await.unwrap_err();
        assert!(matches!(err, RevuError::IndexLoad(_)));
    }
}
