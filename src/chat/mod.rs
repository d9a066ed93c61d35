// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Chat orchestrator
//!
//! Runs the fixed review pipeline for one turn: resolve the session,
//! determine the effective query, plan which partitions to hit, fan the
//! retrieval out in parallel, synthesize one answer, and record the
//! exchange. Session-identity problems abort the turn; everything inside
//! the pipeline degrades instead of failing.

use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{Result, RevuError};
use crate::llm::LlmProvider;
use crate::planner::{CollectionPlanner, Plan, GENERIC_FOCUS};
use crate::prompts::INITIAL_REVIEW_QUERY;
use crate::retrieval::{RetrievalGateway, RetrievalResult, SourceRef};
use crate::session::{ChatMessage, Mode, SessionStore, SharedSession};
use crate::store::CollectionStore;
use crate::synthesis::Synthesizer;

/// Answer returned when no partition produced a result
pub const NO_RESULTS_ANSWER: &str =
    "I couldn't retrieve specific information for your query from the available data sources.";

/// One turn of conversation, as the caller frames it
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatRequest {
    /// What the user typed
    pub query: String,

    /// Pull request the turn is about
    pub pr_id: String,

    /// Interaction mode; must match the session's on follow-up turns
    pub mode: Mode,

    /// Present on follow-up turns, absent to start a conversation
    pub session_id: Option<Uuid>,
}

/// The orchestrator's reply for one turn
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatResponse {
    /// Session the turn ran under (fresh on first turns)
    pub session_id: Uuid,

    /// Synthesized answer text
    pub answer: String,

    /// Provenance backing the answer
    pub sources: Vec<SourceRef>,

    /// Partitions that contributed to the answer
    pub collections_used: Vec<String>,

    /// Mode the session runs in
    pub mode: Mode,

    /// Pull request the session is bound to
    pub pr_id: String,

    /// Names of agent capabilities invoked; empty on the fixed pipeline
    pub tools_used: Vec<String>,

    /// Per-turn extras (plan reasoning, initial-review marker)
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Fixed-pipeline chat engine
pub struct ChatEngine {
    store: Arc<dyn CollectionStore>,
    sessions: Arc<SessionStore>,
    planner: CollectionPlanner,
    gateway: RetrievalGateway,
    synthesizer: Synthesizer,
}

impl ChatEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn CollectionStore>,
        sessions: Arc<SessionStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            sessions,
            planner: CollectionPlanner::new(provider.clone()),
            gateway: RetrievalGateway::new(
                settings.retrieval.top_k,
                settings.retrieval.preview_len,
            ),
            synthesizer: Synthesizer::new(provider),
        }
    }

    /// Run one full turn.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let (session_id, session) = self.resolve_session(&request).await?;

        // The session lock is held for the whole turn so concurrent turns
        // on the same session serialize.
        let mut guard = session.lock().await;

        let is_initial_review =
            guard.mode == Mode::CoReviewer && !guard.initial_review_generated;
        let effective_query = if is_initial_review {
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

        let plan = self
            .plan_or_fallback(&effective_query, &guard.collections, &guard.pr_id)
            .await?;

        tracing::info!(
            session_id = %session_id,
            collections = ?plan.collections,
            initial = is_initial_review,
            "running retrieval fan-out"
        );

        let queries = plan.collections.iter().map(|name| {
            self.gateway
                .query_partition(&guard.handles, name, &effective_query, &plan.search_focus)
        });
        let results: Vec<RetrievalResult> =
            join_all(queries).await.into_iter().flatten().collect();

        let (answer, sources, collections_used) = if results.is_empty() {
            tracing::warn!(session_id = %session_id, "no partition produced a result");
            (NO_RESULTS_ANSWER.to_string(), Vec::new(), plan.collections.clone())
        } else {
            let outcome = self
                .synthesizer
                .synthesize(
                    &effective_query,
                    &results,
                    &guard.history,
                    guard.mode,
                    is_initial_review,
                )
                .await;
            (outcome.answer, outcome.sources, outcome.collections_used)
        };

        guard.push(ChatMessage::user(&effective_query));
        guard.push(ChatMessage::assistant(&answer));
        guard.trim_history(self.sessions.max_history_pairs());

        let mut metadata = serde_json::Map::new();
        metadata.insert("is_initial_review".into(), is_initial_review.into());
        metadata.insert("plan_reasoning".into(), plan.reasoning.clone().into());
        metadata.insert("search_focus".into(), plan.search_focus.clone().into());

        Ok(ChatResponse {
            session_id,
            answer,
            sources,
            collections_used,
            mode: guard.mode,
            pr_id: guard.pr_id.clone(),
            tools_used: Vec::new(),
            metadata,
        })
    }

    async fn resolve_session(&self, request: &ChatRequest) -> Result<(Uuid, SharedSession)> {
        resolve_session(self.store.as_ref(), &self.sessions, request).await
    }

    /// Plan retrieval, degrading a planner failure to the all-partitions
    /// plan rather than aborting the turn.
    async fn plan_or_fallback(
        &self,
        query: &str,
        available: &[String],
        pr_id: &str,
    ) -> Result<Plan> {
        if available.is_empty() {
            return Err(RevuError::IndexLoad(format!(
                "session for {pr_id} holds no partitions"
            )));
        }

        match self.planner.plan(query, available, pr_id).await {
            Ok(plan) => Ok(plan),
            Err(e) => {
                tracing::warn!(error = %e, "planning failed, querying all partitions");
                Ok(Plan {
                    collections: available.to_vec(),
                    reasoning: format!("Planning failed ({e}), using all available collections"),
                    search_focus: GENERIC_FOCUS.to_string(),
                })
            }
        }
    }
}

/// Continue an existing session or create a fresh one.
///
/// An existing session must match the request's PR and mode exactly;
/// mismatches abort before the session is touched. Shared by the fixed
/// pipeline and the tool-calling engine.
pub(crate) async fn resolve_session(
    store: &dyn CollectionStore,
    sessions: &SessionStore,
    request: &ChatRequest,
) -> Result<(Uuid, SharedSession)> {
    if let Some(session_id) = request.session_id {
        let session = sessions
            .get(session_id)
            .await
            .ok_or(RevuError::SessionNotFound(session_id))?;

        {
            let guard = session.lock().await;
            if guard.pr_id != request.pr_id || guard.mode != request.mode {
                return Err(RevuError::SessionConflict {
                    session_id,
                    pr_id: request.pr_id.clone(),
                    mode: request.mode.to_string(),
                });
            }
        }

        return Ok((session_id, session));
    }

    let loaded = store.load(&request.pr_id).await?;
    tracing::info!(
        pr_id = %request.pr_id,
        mode = %request.mode,
        collections = ?loaded.collections,
        "creating session"
    );
    let (session_id, session) = sessions.create(&request.pr_id, request.mode, loaded).await;
    Ok((session_id, session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::MockProvider;
    use crate::store::{
        ChunkRetriever, PartitionHandle, PartitionQueryEngine, RetrievedChunk,
        StaticCollectionStore,
    };
    use async_trait::async_trait;

    struct FixedRetriever {
        chunks: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl ChunkRetriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
            Ok(self.chunks.iter().take(top_k).cloned().collect())
        }
    }

    struct FixedEngine {
        answer: String,
    }

    #[async_trait]
    impl PartitionQueryEngine for FixedEngine {
        async fn query(&self, _text: &str) -> Result<String> {
            Ok(self.answer.clone())
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl PartitionQueryEngine for FailingEngine {
        async fn query(&self, _text: &str) -> Result<String> {
            Err(RevuError::Internal("index exploded".to_string()))
        }
    }

    fn handle(answer: &str) -> PartitionHandle {
        PartitionHandle {
            retriever: Arc::new(FixedRetriever {
                chunks: vec![RetrievedChunk {
                    text: format!("chunk behind {answer}"),
                    metadata: serde_json::Map::new(),
                }],
            }),
            engine: Arc::new(FixedEngine {
                answer: answer.to_string(),
            }),
        }
    }

    fn failing_handle() -> PartitionHandle {
        PartitionHandle {
            retriever: Arc::new(FixedRetriever { chunks: vec![] }),
            engine: Arc::new(FailingEngine),
        }
    }

    fn engine_with(
        provider: MockProvider,
        store: StaticCollectionStore,
    ) -> ChatEngine {
        let settings = Settings::default();
        ChatEngine::new(
            Arc::new(provider),
            Arc::new(store),
            Arc::new(SessionStore::new(settings.conversation.max_history_pairs)),
            &settings,
        )
    }

    fn two_partition_store() -> StaticCollectionStore {
        StaticCollectionStore::new()
            .with_partition("pr_1", "pr_1_pr_data", handle("metadata answer"))
            .with_partition("pr_1", "pr_1_code", handle("code answer"))
    }

    fn request(query: &str, mode: Mode, session_id: Option<Uuid>) -> ChatRequest {
        ChatRequest {
            query: query.to_string(),
            pr_id: "pr_1".to_string(),
            mode,
            session_id,
        }
    }

    // Planner picks everything, synthesis returns a canned answer.
    fn pipeline_provider(answer: &str) -> MockProvider {
        MockProvider::new().with_responses(vec![
            r#"{"collections": ["pr_1_pr_data", "pr_1_code"], "search_focus": "everything"}"#
                .to_string(),
            answer.to_string(),
        ])
    }

    #[tokio::test]
    async fn test_first_co_reviewer_turn_substitutes_canonical_query() {
        let provider = pipeline_provider("## Initial Code Review Summary");
        let engine = engine_with(provider.clone(), two_partition_store());

        let response = engine
            .chat(request("hello there", Mode::CoReviewer, None))
            .await
            .unwrap();

        assert!(response.answer.contains("Initial Code Review Summary"));
        assert_eq!(
            response.metadata.get("is_initial_review").unwrap(),
            &serde_json::Value::Bool(true)
        );
        // Both the planner and synthesis prompts carry the canonical query,
        // not what the caller typed.
        let prompts = provider.recorded_prompts();
        assert!(prompts[0].contains(INITIAL_REVIEW_QUERY));
        assert!(!prompts[0].contains("hello there"));
    }

    #[tokio::test]
    async fn test_second_turn_uses_caller_query() {
        let provider = MockProvider::new().with_responses(vec![
            r#"{"collections": ["pr_1_code"], "search_focus": "x"}"#.to_string(),
            "initial summary".to_string(),
            r#"{"collections": ["pr_1_code"], "search_focus": "x"}"#.to_string(),
            "follow-up answer".to_string(),
        ]);
        let engine = engine_with(provider.clone(), two_partition_store());

        let first = engine
            .chat(request("", Mode::CoReviewer, None))
            .await
            .unwrap();
        let second = engine
            .chat(request(
                "what about error handling?",
                Mode::CoReviewer,
                Some(first.session_id),
            ))
            .await
            .unwrap();

        assert_eq!(second.answer, "follow-up answer");
        assert_eq!(
            second.metadata.get("is_initial_review").unwrap(),
            &serde_json::Value::Bool(false)
        );
        let prompts = provider.recorded_prompts();
        assert!(prompts[2].contains("what about error handling?"));
    }

    #[tokio::test]
    async fn test_interactive_mode_never_substitutes() {
        let provider = pipeline_provider("narrow answer");
        let engine = engine_with(provider.clone(), two_partition_store());

        let response = engine
            .chat(request("where is the parser?", Mode::InteractiveAssistant, None))
            .await
            .unwrap();

        assert_eq!(response.answer, "narrow answer");
        let prompts = provider.recorded_prompts();
        assert!(prompts[0].contains("where is the parser?"));
        assert!(!prompts[0].contains(INITIAL_REVIEW_QUERY));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let engine = engine_with(MockProvider::new(), two_partition_store());
        let missing = Uuid::new_v4();

        let err = engine
            .chat(request("q", Mode::CoReviewer, Some(missing)))
            .await
            .unwrap_err();

        assert!(matches!(err, RevuError::SessionNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_pr_mismatch_conflicts_and_leaves_session_untouched() {
        let provider = pipeline_provider("summary");
        let engine = engine_with(provider, two_partition_store());

        let first = engine
            .chat(request("", Mode::CoReviewer, None))
            .await
            .unwrap();

        let conflicting = ChatRequest {
            query: "q".to_string(),
            pr_id: "pr_2".to_string(),
            mode: Mode::CoReviewer,
            session_id: Some(first.session_id),
        };
        let err = engine.chat(conflicting).await.unwrap_err();
        assert!(matches!(err, RevuError::SessionConflict { .. }));
        assert!(err.is_client_error());

        // The failed turn recorded nothing.
        let session = engine.sessions.get(first.session_id).await.unwrap();
        let guard = session.lock().await;
        assert_eq!(guard.history.len(), 2);
        assert!(guard.initial_review_generated);
    }

    #[tokio::test]
    async fn test_mode_mismatch_conflicts() {
        let provider = pipeline_provider("summary");
        let engine = engine_with(provider, two_partition_store());

        let first = engine
            .chat(request("", Mode::CoReviewer, None))
            .await
            .unwrap();
        let err = engine
            .chat(request("q", Mode::InteractiveAssistant, Some(first.session_id)))
            .await
            .unwrap_err();

        assert!(matches!(err, RevuError::SessionConflict { .. }));
    }

    #[tokio::test]
    async fn test_unknown_pr_surfaces_index_load_error() {
        let engine = engine_with(MockProvider::new(), StaticCollectionStore::new());
        let err = engine
            .chat(request("q", Mode::CoReviewer, None))
            .await
            .unwrap_err();
        assert!(matches!(err, RevuError::IndexLoad(_)));
    }

    #[tokio::test]
    async fn test_partition_failure_does_not_abort_turn() {
        let store = StaticCollectionStore::new()
            .with_partition("pr_1", "pr_1_pr_data", handle("metadata answer"))
            .with_partition("pr_1", "pr_1_code", failing_handle());
        let provider = pipeline_provider("partial but useful answer");
        let engine = engine_with(provider, store);

        let response = engine
            .chat(request("q", Mode::InteractiveAssistant, None))
            .await
            .unwrap();

        assert_eq!(response.answer, "partial but useful answer");
        assert_eq!(response.collections_used, vec!["pr_1_pr_data"]);
    }

    #[tokio::test]
    async fn test_all_partitions_failing_yields_fixed_answer() {
        let store = StaticCollectionStore::new()
            .with_partition("pr_1", "pr_1_pr_data", failing_handle())
            .with_partition("pr_1", "pr_1_code", failing_handle());
        let provider = MockProvider::new().with_response(
            r#"{"collections": ["pr_1_pr_data", "pr_1_code"], "search_focus": "x"}"#,
        );
        let engine = engine_with(provider.clone(), store);

        let response = engine
            .chat(request("q", Mode::InteractiveAssistant, None))
            .await
            .unwrap();

        assert_eq!(response.answer, NO_RESULTS_ANSWER);
        assert!(response.sources.is_empty());
        // Attempted partitions are still reported.
        assert_eq!(
            response.collections_used,
            vec!["pr_1_pr_data", "pr_1_code"]
        );
        // Synthesis was skipped: only the planner prompt went out.
        assert_eq!(provider.call_count(), 1);
        // The exchange was still recorded.
        let session = engine.sessions.get(response.session_id).await.unwrap();
        assert_eq!(session.lock().await.history.len(), 2);
    }

    #[tokio::test]
    async fn test_planner_failure_falls_back_to_all_partitions() {
        // First call (planner) fails, second (synthesis) succeeds. The mock
        // fails every call, so synthesis degrades to the apology answer;
        // the turn itself still completes.
        let provider = MockProvider::new().with_failure("model down");
        let engine = engine_with(provider, two_partition_store());

        let response = engine
            .chat(request("q", Mode::InteractiveAssistant, None))
            .await
            .unwrap();

        assert_eq!(response.answer, crate::synthesis::APOLOGY_ANSWER);
        assert_eq!(
            response.collections_used,
            vec!["pr_1_pr_data", "pr_1_code"]
        );
    }

    #[tokio::test]
    async fn test_history_accumulates_and_trims() {
        let mut responses = Vec::new();
        for i in 0..24 {
            responses.push(r#"{"collections": ["pr_1_code"], "search_focus": "x"}"#.to_string());
            responses.push(format!("answer {i}"));
        }
        let provider = MockProvider::new().with_responses(responses);
        let engine = engine_with(provider, two_partition_store());

        let first = engine
            .chat(request("q0", Mode::InteractiveAssistant, None))
            .await
            .unwrap();
        for i in 1..24 {
            engine
                .chat(request(
                    &format!("q{i}"),
                    Mode::InteractiveAssistant,
                    Some(first.session_id),
                ))
                .await
                .unwrap();
        }

        let session = engine.sessions.get(first.session_id).await.unwrap();
        let guard = session.lock().await;
        assert_eq!(guard.history.len(), 20);
        assert_eq!(guard.history[0].content, "q14");
        assert_eq!(guard.history[19].content, "answer 23");
    }

    #[tokio::test]
    async fn test_session_collections_match_loaded_partitions() {
        let provider = pipeline_provider("ok");
        let engine = engine_with(provider, two_partition_store());

        let response = engine
            .chat(request("q", Mode::InteractiveAssistant, None))
            .await
            .unwrap();

        let session = engine.sessions.get(response.session_id).await.unwrap();
        let guard = session.lock().await;
        assert_eq!(guard.collections, vec!["pr_1_pr_data", "pr_1_code"]);
        assert_eq!(guard.collections.len(), guard.handles.len());
    }
}
