// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Response synthesizer
//!
//! Produces one final answer from heterogeneous partial retrieval results,
//! selecting the prompt by interaction mode. Generation failures are
//! downgraded to a user-visible apology string so that a turn never fails
//! because synthesis did.

use std::sync::Arc;

use crate::llm::LlmProvider;
use crate::prompts::{
    format_history, format_responses, CoReviewerFollowUpPrompt, InitialReviewPrompt,
    InteractivePrompt,
};
use crate::retrieval::{RetrievalResult, SourceRef};
use crate::session::{ChatMessage, Mode};

/// Answer returned when generation fails
pub const APOLOGY_ANSWER: &str = "Sorry, there was an error generating the response.";

/// Final synthesized answer plus merged provenance
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    /// The answer text
    pub answer: String,

    /// Union of provenance across all partial results
    pub sources: Vec<SourceRef>,

    /// Partitions that contributed, deduplicated, first occurrence wins
    pub collections_used: Vec<String>,
}

/// Synthesizes one answer from per-partition partial results
pub struct Synthesizer {
    provider: Arc<dyn LlmProvider>,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Produce the final answer. Never fails: provider errors degrade to an
    /// apology answer with the provenance merge intact.
    pub async fn synthesize(
        &self,
        query: &str,
        results: &[RetrievalResult],
        history: &[ChatMessage],
        mode: Mode,
        is_initial_review: bool,
    ) -> SynthesisOutcome {
        let history_str = format_history(history);
        let formatted_responses = format_responses(results);
        let (pr_metadata, file_changes) = extract_structured_context(results);

        let prompt = match (mode, is_initial_review) {
            (Mode::CoReviewer, true) => InitialReviewPrompt {
                formatted_responses: &formatted_responses,
                pr_metadata: &pr_metadata,
                file_changes: &file_changes,
            }
            .render(),
            (Mode::CoReviewer, false) => CoReviewerFollowUpPrompt {
                history: &history_str,
                formatted_responses: &formatted_responses,
                pr_metadata: &pr_metadata,
                file_changes: &file_changes,
                query,
            }
            .render(),
            // Interactive mode always answers in follow-up style.
            (Mode::InteractiveAssistant, _) => InteractivePrompt {
                history: &history_str,
                formatted_responses: &formatted_responses,
                query,
            }
            .render(),
        };

        let answer = match self.provider.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, mode = %mode, "error during synthesis completion");
                APOLOGY_ANSWER.to_string()
            }
        };

        let (sources, collections_used) = merge_provenance(results);
        SynthesisOutcome {
            answer,
            sources,
            collections_used,
        }
    }
}

/// Union of sources and deduplicated partition usage across partial results
fn merge_provenance(results: &[RetrievalResult]) -> (Vec<SourceRef>, Vec<String>) {
    let mut sources = Vec::new();
    let mut collections_used = Vec::new();
    for result in results {
        sources.extend(result.sources.iter().cloned());
        if !collections_used.contains(&result.collection) {
            collections_used.push(result.collection.clone());
        }
    }
    (sources, collections_used)
}

/// Pull PR metadata and file-change entries out of the retrieved sources.
///
/// Sources whose `file_name` starts with `pr_` carry indexed PR records:
/// their previews are parsed (best effort) and merged into one metadata
/// object. Sources carrying a `file_path` are per-file change entries.
fn extract_structured_context(results: &[RetrievalResult]) -> (String, String) {
    let mut pr_info = serde_json::Map::new();
    let mut file_changes: Vec<&SourceRef> = Vec::new();

    for result in results {
        for source in &result.sources {
            let is_pr_record = source
                .metadata
                .get("file_name")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|name| name.starts_with("pr_"));

            if is_pr_record {
                if let Ok(serde_json::Value::Object(map)) =
                    serde_json::from_str::<serde_json::Value>(&source.text_preview)
                {
                    pr_info.extend(map);
                }
            } else if source.metadata.contains_key("file_path") {
                file_changes.push(source);
            }
        }
    }

    let metadata = serde_json::to_string_pretty(&pr_info).unwrap_or_else(|_| "{}".to_string());
    let changes = serde_json::to_string_pretty(&file_changes).unwrap_or_else(|_| "[]".to_string());
    (metadata, changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;

    fn result(collection: &str, answer: &str, sources: Vec<SourceRef>) -> RetrievalResult {
        RetrievalResult {
            answer: answer.to_string(),
            sources,
            collection: collection.to_string(),
        }
    }

    fn source(preview: &str, metadata: serde_json::Value) -> SourceRef {
        SourceRef {
            text_preview: preview.to_string(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_initial_review_uses_report_prompt_and_skips_history() {
        let provider = MockProvider::new().with_response("## Initial Code Review Summary");
        let synthesizer = Synthesizer::new(Arc::new(provider.clone()));

        let history = vec![ChatMessage::user("ignored history entry")];
        let results = vec![result("pr_1_pr_data", "PR adds retry logic", vec![])];

        let outcome = synthesizer
            .synthesize("summary", &results, &history, Mode::CoReviewer, true)
            .await;

        assert!(outcome.answer.contains("Initial Code Review Summary"));
        let prompt = &provider.recorded_prompts()[0];
        assert!(prompt.contains("generating an initial review summary"));
        assert!(!prompt.contains("ignored history entry"));
    }

    #[tokio::test]
    async fn test_follow_up_prompt_includes_history() {
        let provider = MockProvider::new().with_response("conversational answer");
        let synthesizer = Synthesizer::new(Arc::new(provider.clone()));

        let history = vec![
            ChatMessage::user("what changed?"),
            ChatMessage::assistant("two files"),
        ];
        let results = vec![result("pr_1_code", "diff detail", vec![])];

        synthesizer
            .synthesize("tell me more", &results, &history, Mode::CoReviewer, false)
            .await;

        let prompt = &provider.recorded_prompts()[0];
        assert!(prompt.contains("follow-up query"));
        assert!(prompt.contains("user: what changed?"));
        assert!(prompt.contains("tell me more"));
    }

    #[tokio::test]
    async fn test_interactive_mode_stays_scoped() {
        let provider = MockProvider::new().with_response("just the answer");
        let synthesizer = Synthesizer::new(Arc::new(provider.clone()));

        synthesizer
            .synthesize(
                "which file has the parser?",
                &[],
                &[],
                Mode::InteractiveAssistant,
                false,
            )
            .await;

        let prompt = &provider.recorded_prompts()[0];
        assert!(prompt.contains("Interactive Code Assistant"));
        assert!(prompt.contains("No new information gathered."));
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_to_apology() {
        let provider = MockProvider::new().with_failure("model down");
        let synthesizer = Synthesizer::new(Arc::new(provider));

        let results = vec![result(
            "pr_1_code",
            "some answer",
            vec![source("preview", serde_json::json!({"file_path": "a.py"}))],
        )];

        let outcome = synthesizer
            .synthesize("q", &results, &[], Mode::CoReviewer, false)
            .await;

        assert_eq!(outcome.answer, APOLOGY_ANSWER);
        // Provenance merge is still intact on the degraded path.
        assert_eq!(outcome.sources.len(), 1);
        assert_eq!(outcome.collections_used, vec!["pr_1_code"]);
    }

    #[tokio::test]
    async fn test_merge_dedupes_collections_and_unions_sources() {
        let provider = MockProvider::new().with_response("ok");
        let synthesizer = Synthesizer::new(Arc::new(provider));

        let results = vec![
            result(
                "pr_1_code",
                "a",
                vec![source("s1", serde_json::json!({}))],
            ),
            result(
                "pr_1_code",
                "b",
                vec![source("s2", serde_json::json!({}))],
            ),
            result("pr_1_pr_data", "c", vec![]),
        ];

        let outcome = synthesizer
            .synthesize("q", &results, &[], Mode::InteractiveAssistant, false)
            .await;

        assert_eq!(outcome.sources.len(), 2);
        assert_eq!(outcome.collections_used, vec!["pr_1_code", "pr_1_pr_data"]);
    }

    #[tokio::test]
    async fn test_pr_metadata_extracted_into_prompt() {
        let provider = MockProvider::new().with_response("ok");
        let synthesizer = Synthesizer::new(Arc::new(provider.clone()));

        let results = vec![result(
            "pr_1_pr_data",
            "metadata",
            vec![source(
                r#"{"pr_number": 42, "author": "jordan"}"#,
                serde_json::json!({"file_name": "pr_42.json"}),
            )],
        )];

        synthesizer
            .synthesize("q", &results, &[], Mode::CoReviewer, true)
            .await;

        let prompt = &provider.recorded_prompts()[0];
        assert!(prompt.contains("\"pr_number\": 42"));
        assert!(prompt.contains("jordan"));
    }

    #[test]
    fn test_extract_structured_context_separates_file_changes() {
        let results = vec![result(
            "pr_1_code",
            "a",
            vec![
                source("diff text", serde_json::json!({"file_path": "src/app.py"})),
                source("not a record", serde_json::json!({"file_name": "readme.md"})),
            ],
        )];

        let (metadata, changes) = extract_structured_context(&results);
        assert_eq!(metadata, "{}");
        assert!(changes.contains("src/app.py"));
        assert!(!changes.contains("readme.md"));
    }
}
