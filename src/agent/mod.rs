// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Tool-calling orchestrator
//!
//! The alternative to the fixed pipeline in `crate::chat`: the model is
//! shown a closed set of capabilities and asked which to run, the chosen
//! ones execute, and a final completion synthesizes their outputs. When the
//! model declines to pick tools (or nothing it picked produced output) its
//! raw text becomes the answer.

pub mod capabilities;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::chat::{resolve_session, ChatRequest, ChatResponse};
use crate::config::Settings;
use crate::error::Result;
use crate::extract::extract_json;
use crate::llm::LlmProvider;
use crate::planner::CollectionPlanner;
use crate::prompts::{AgentRequestPrompt, AgentSynthesisPrompt, AgentSystemPrompt, INITIAL_REVIEW_QUERY};
use crate::retrieval::{RetrievalGateway, SourceRef};
use crate::session::{ChatMessage, Mode, SessionStore};
use crate::store::{CollectionStore, PartitionMap};
use crate::synthesis::{Synthesizer, APOLOGY_ANSWER};

/// One declared parameter of a capability, rendered into the system prompt
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: &'static str,
    pub description: &'static str,
}

/// Read-only view of the session a capability runs against
pub struct CapabilityContext<'a> {
    pub pr_id: &'a str,
    pub session_id: Uuid,
    pub mode: Mode,
    pub is_initial_request: bool,
    pub handles: &'a PartitionMap,
    pub collections: &'a [String],
    pub history: &'a [ChatMessage],
}

/// What one capability run produced
#[derive(Debug, Default)]
pub struct CapabilityOutput {
    /// Text blocks handed to the final synthesis
    pub responses: Vec<String>,

    /// Provenance gathered along the way
    pub sources: Vec<SourceRef>,

    /// Partitions the capability queried successfully
    pub collections_used: Vec<String>,
}

/// One tool the model may select
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> &'static [ParamSpec];

    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
        ctx: &CapabilityContext<'_>,
    ) -> Result<CapabilityOutput>;
}

/// Render the capability list the way the system prompt expects it
fn format_capabilities(capabilities: &[Arc<dyn Capability>]) -> String {
    capabilities
        .iter()
        .map(|cap| {
            let params = cap
                .parameters()
                .iter()
                .map(|p| format!("  - {} ({}): {}", p.name, p.ty, p.description))
                .collect::<Vec<_>>()
                .join("\n");
            format!("- {}: {}\n  Parameters:\n{}", cap.name(), cap.description(), params)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Tool-calling chat engine
pub struct AgentEngine {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn CollectionStore>,
    sessions: Arc<SessionStore>,
    capabilities: Vec<Arc<dyn Capability>>,
}

impl AgentEngine {
    /// Build the engine with the full capability set.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn CollectionStore>,
        sessions: Arc<SessionStore>,
        settings: &Settings,
    ) -> Self {
        let gateway = Arc::new(RetrievalGateway::new(
            settings.retrieval.top_k,
            settings.retrieval.preview_len,
        ));
        let planner = Arc::new(CollectionPlanner::new(provider.clone()));
        let synthesizer = Arc::new(Synthesizer::new(provider.clone()));

        let capabilities: Vec<Arc<dyn Capability>> = vec![
            Arc::new(capabilities::RagSearch::new(gateway.clone())),
            Arc::new(capabilities::CollectionPlan::new(planner)),
            Arc::new(capabilities::PrSummary::new(gateway.clone(), synthesizer.clone())),
            Arc::new(capabilities::FileAnalysis::new(gateway)),
            Arc::new(capabilities::ResponseSynthesis::new(synthesizer)),
        ];

        Self {
            provider,
            store,
            sessions,
            capabilities,
        }
    }

    /// Run one tool-calling turn.
    pub async fn process(&self, request: ChatRequest) -> Result<ChatResponse> {
        let (session_id, session) =
            resolve_session(self.store.as_ref(), &self.sessions, &request).await?;
        let mut guard = session.lock().await;

        let is_initial_request =
            guard.mode == Mode::CoReviewer && !guard.initial_review_generated;
        let effective_request = if is_initial_request {
            if !request.query.trim().is_empty() {
                tracing::info!(
                    discarded = %request.query,
                    "first co_reviewer turn, replacing caller text with the initial review query"
                );
            }
            guard.mark_initial_review();
            INITIAL_REVIEW_QUERY.to_string()
        } else {
            request.query.clone()
        };

        let system = AgentSystemPrompt {
            mode: guard.mode,
            capabilities_block: &format_capabilities(&self.capabilities),
        }
        .render();
        let session_id_str = session_id.to_string();
        let prompt = AgentRequestPrompt {
            system: &system,
            request: &effective_request,
            pr_id: &guard.pr_id,
            session_id: &session_id_str,
            history_exchanges: guard.history.len() / 2,
            mode: guard.mode,
            is_initial_request,
        }
        .render();

        let analysis = self.provider.complete(&prompt).await?;

        let ctx = CapabilityContext {
            pr_id: &guard.pr_id,
            session_id,
            mode: guard.mode,
            is_initial_request,
            handles: &guard.handles,
            collections: &guard.collections,
            history: &guard.history,
        };

        let mut tools_used = Vec::new();
        let mut outputs: Vec<CapabilityOutput> = Vec::new();

        if let Some(decision) = extract_json(&analysis) {
            for selection in decision
                .get("tools")
                .and_then(serde_json::Value::as_array)
                .into_iter()
                .flatten()
            {
                let Some(name) = selection.get("name").and_then(serde_json::Value::as_str)
                else {
                    tracing::warn!("tool selection without a name, skipping");
                    continue;
                };
                let Some(capability) =
                    self.capabilities.iter().find(|cap| cap.name() == name)
                else {
                    tracing::warn!(tool = %name, "model selected an unknown tool, skipping");
                    continue;
                };

                let empty = serde_json::Map::new();
                let args = selection
                    .get("parameters")
                    .and_then(serde_json::Value::as_object)
                    .unwrap_or(&empty);

                tracing::debug!(tool = %name, "executing capability");
                match capability.execute(args, &ctx).await {
                    Ok(output) => {
                        tools_used.push(name.to_string());
                        outputs.push(output);
                    }
                    Err(e) => {
                        tracing::warn!(tool = %name, error = %e, "capability failed, skipping");
                    }
                }
            }
        }

        let (answer, sources, collections_used) = if outputs.is_empty() {
            tracing::debug!("no capability output, answering with the model's own text");
            (analysis, Vec::new(), Vec::new())
        } else {
            let mut responses = Vec::new();
            let mut sources = Vec::new();
            let mut collections_used: Vec<String> = Vec::new();
            for output in outputs {
                responses.extend(output.responses);
                sources.extend(output.sources);
                for name in output.collections_used {
                    if !collections_used.contains(&name) {
                        collections_used.push(name);
                    }
                }
            }

            let synthesis_prompt = AgentSynthesisPrompt {
                request: &effective_request,
                responses: &responses,
                is_initial_request,
            }
            .render();
            let answer = match self.provider.complete(&synthesis_prompt).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "final agent synthesis failed");
                    APOLOGY_ANSWER.to_string()
                }
            };
            (answer, sources, collections_used)
        };

        guard.push(ChatMessage::user(&effective_request));
        guard.push(ChatMessage::assistant(&answer));
        guard.trim_history(self.sessions.max_history_pairs());

        let mut metadata = serde_json::Map::new();
        metadata.insert("is_initial_request".into(), is_initial_request.into());

        Ok(ChatResponse {
            session_id,
            answer,
            sources,
            collections_used,
            mode: guard.mode,
            pr_id: guard.pr_id.clone(),
            tools_used,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;
    use crate::store::{
        ChunkRetriever, PartitionHandle, PartitionQueryEngine, RetrievedChunk,
        StaticCollectionStore,
    };

    struct FixedRetriever;

    #[async_trait]
    impl ChunkRetriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>> {
            Ok(vec![RetrievedChunk {
                text: "retry logic added in client.py".to_string(),
                metadata: serde_json::Map::new(),
            }])
        }
    }

    struct FixedEngine;

    #[async_trait]
    impl PartitionQueryEngine for FixedEngine {
        async fn query(&self, _text: &str) -> Result<String> {
            Ok("the PR adds retry logic".to_string())
        }
    }

    fn store() -> StaticCollectionStore {
        let handle = PartitionHandle {
            retriever: Arc::new(FixedRetriever),
            engine: Arc::new(FixedEngine),
        };
        StaticCollectionStore::new()
            .with_partition("pr_1", "pr_1_pr_data", handle.clone())
            .with_partition("pr_1", "pr_1_source_code", handle)
    }

    fn engine(provider: MockProvider) -> AgentEngine {
        let settings = Settings::default();
        AgentEngine::new(
            Arc::new(provider),
            Arc::new(store()),
            Arc::new(SessionStore::new(settings.conversation.max_history_pairs)),
            &settings,
        )
    }

    fn request(query: &str, mode: Mode) -> ChatRequest {
        ChatRequest {
            query: query.to_string(),
            pr_id: "pr_1".to_string(),
            mode,
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_selected_capability_runs_and_synthesis_answers() {
        let provider = MockProvider::new().with_responses(vec![
            r#"{"reasoning": "need PR info", "tools": [{"name": "rag_search", "parameters": {"query": "what changed", "collections": ["pr_1_pr_data"], "focus": "changes"}}]}"#
                .to_string(),
            "synthesized agent answer".to_string(),
        ]);
        let agent = engine(provider.clone());

        let response = agent
            .process(request("what changed?", Mode::InteractiveAssistant))
            .await
            .unwrap();

        assert_eq!(response.answer, "synthesized agent answer");
        assert_eq!(response.tools_used, vec!["rag_search"]);
        assert_eq!(response.collections_used, vec!["pr_1_pr_data"]);
        assert_eq!(response.sources.len(), 1);

        let prompts = provider.recorded_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("rag_search"));
        assert!(prompts[1].contains("the PR adds retry logic"));
    }

    #[tokio::test]
    async fn test_non_json_analysis_falls_back_to_raw_text() {
        let provider = MockProvider::new()
            .with_response("I can answer directly: the PR adds retry logic.");
        let agent = engine(provider.clone());

        let response = agent
            .process(request("what changed?", Mode::InteractiveAssistant))
            .await
            .unwrap();

        assert_eq!(response.answer, "I can answer directly: the PR adds retry logic.");
        assert!(response.tools_used.is_empty());
        assert!(response.sources.is_empty());
        // Only the analysis completion went out.
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_skipped() {
        let decision =
            r#"{"reasoning": "x", "tools": [{"name": "teleport", "parameters": {}}]}"#;
        let provider = MockProvider::new().with_response(decision);
        let agent = engine(provider);

        let response = agent
            .process(request("q", Mode::InteractiveAssistant))
            .await
            .unwrap();

        // Nothing executed, so the decision text itself is the answer.
        assert!(response.tools_used.is_empty());
        assert_eq!(response.answer, decision);
    }

    #[tokio::test]
    async fn test_failed_capability_does_not_abort_turn() {
        // rag_search without its required query parameter fails; the turn
        // still completes on the raw-text path.
        let provider = MockProvider::new().with_response(
            r#"{"reasoning": "x", "tools": [{"name": "rag_search", "parameters": {}}]}"#,
        );
        let agent = engine(provider);

        let response = agent
            .process(request("q", Mode::InteractiveAssistant))
            .await
            .unwrap();
        assert!(response.tools_used.is_empty());
        assert!(!response.answer.is_empty());
    }

    #[tokio::test]
    async fn test_initial_co_reviewer_turn_substitutes_request() {
        let provider = MockProvider::new().with_response("plain analysis");
        let agent = engine(provider.clone());

        let response = agent
            .process(request("hi", Mode::CoReviewer))
            .await
            .unwrap();

        assert_eq!(
            response.metadata.get("is_initial_request").unwrap(),
            &serde_json::Value::Bool(true)
        );
        let prompts = provider.recorded_prompts();
        assert!(prompts[0].contains(INITIAL_REVIEW_QUERY));
        assert!(prompts[0].contains("Is Initial Request: true"));
        assert!(!prompts[0].contains("User Request: hi"));
    }

    #[tokio::test]
    async fn test_capability_listing_reaches_the_model() {
        let provider = MockProvider::new().with_response("ok");
        let agent = engine(provider.clone());

        agent
            .process(request("q", Mode::InteractiveAssistant))
            .await
            .unwrap();

        let prompt = &provider.recorded_prompts()[0];
        for name in [
            "rag_search",
            "collection_planner",
            "pr_summary",
            "file_analysis",
            "response_synthesis",
        ] {
            assert!(prompt.contains(name), "missing capability {name}");
        }
    }
}
