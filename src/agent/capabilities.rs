// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! The closed capability set the tool-calling engine exposes.
//!
//! Each capability reuses the same planner / gateway / synthesizer the fixed
//! pipeline runs on, but frames its queries with mode and initial-request
//! context before executing.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Capability, CapabilityContext, CapabilityOutput, ParamSpec};
use crate::error::{Result, RevuError};
use crate::planner::CollectionPlanner;
use crate::retrieval::{RetrievalGateway, RetrievalResult};
use crate::session::Mode;
use crate::synthesis::Synthesizer;

type Args = serde_json::Map<String, serde_json::Value>;

fn required_str<'a>(args: &'a Args, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| RevuError::InvalidInput(format!("missing required parameter '{key}'")))
}

fn optional_str<'a>(args: &'a Args, key: &str, default: &'a str) -> &'a str {
    args.get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or(default)
}

fn str_array(args: &Args, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(serde_json::Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

/// Searches the session's partitions with mode-aware query framing
pub struct RagSearch {
    gateway: Arc<RetrievalGateway>,
}

impl RagSearch {
    pub fn new(gateway: Arc<RetrievalGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Capability for RagSearch {
    fn name(&self) -> &'static str {
        "rag_search"
    }

    fn description(&self) -> &'static str {
        "Search through RAG collections for relevant information about PRs, code, or requirements"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[
            ParamSpec {
                name: "query",
                ty: "string",
                description: "The search query",
            },
            ParamSpec {
                name: "collections",
                ty: "array",
                description: "List of collections to search",
            },
            ParamSpec {
                name: "focus",
                ty: "string",
                description: "What to focus on in the search",
            },
        ]
    }

    async fn execute(&self, args: &Args, ctx: &CapabilityContext<'_>) -> Result<CapabilityOutput> {
        let query = required_str(args, "query")?;
        let requested = str_array(args, "collections").unwrap_or_else(|| ctx.collections.to_vec());
        let mut focus = optional_str(args, "focus", "General information").to_string();

        let enhanced_query = match ctx.mode {
            Mode::CoReviewer if ctx.is_initial_request => {
                if focus.to_lowercase().contains("general") {
                    focus = "PR structure, key changes, potential issues, and code quality aspects"
                        .to_string();
                }
                format!("Comprehensive PR review focus - {query}")
            }
            Mode::CoReviewer => format!("Detailed code review - {query}"),
            Mode::InteractiveAssistant => format!("Specific query - {query}"),
        };

        let mut output = CapabilityOutput::default();
        for collection in &requested {
            if !ctx.collections.contains(collection) {
                tracing::warn!(collection = %collection, "requested collection not in session, skipping");
                continue;
            }
            if let Some(result) = self
                .gateway
                .query_partition(ctx.handles, collection, &enhanced_query, &focus)
                .await
            {
                output
                    .responses
                    .push(format!("From {}:\n{}", result.collection, result.answer));
                output.sources.extend(result.sources);
                output.collections_used.push(result.collection);
            }
        }
        Ok(output)
    }
}

/// Runs the collection planner with mode-aware framing
pub struct CollectionPlan {
    planner: Arc<CollectionPlanner>,
}

impl CollectionPlan {
    pub fn new(planner: Arc<CollectionPlanner>) -> Self {
        Self { planner }
    }
}

#[async_trait]
impl Capability for CollectionPlan {
    fn name(&self) -> &'static str {
        "collection_planner"
    }

    fn description(&self) -> &'static str {
        "Determine which collections to query based on the user request"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "query",
            ty: "string",
            description: "The search query",
        }]
    }

    async fn execute(&self, args: &Args, ctx: &CapabilityContext<'_>) -> Result<CapabilityOutput> {
        let query = required_str(args, "query")?;

        let enhanced_query = match ctx.mode {
            Mode::CoReviewer if ctx.is_initial_request => {
                format!("Initial PR review: {query} - Need comprehensive overview.")
            }
            Mode::CoReviewer => {
                format!("Co-reviewer follow up: {query} - Focus on detailed code review aspects.")
            }
            Mode::InteractiveAssistant => {
                format!("Interactive assistance: {query} - Focus on specific answers.")
            }
        };

        let plan = self
            .planner
            .plan(&enhanced_query, ctx.collections, ctx.pr_id)
            .await?;

        let rendered = serde_json::to_string_pretty(&plan)?;
        Ok(CapabilityOutput {
            responses: vec![format!("Collection plan:\n{rendered}")],
            sources: Vec::new(),
            collections_used: Vec::new(),
        })
    }
}

/// Queries every partition for PR context and synthesizes a summary
pub struct PrSummary {
    gateway: Arc<RetrievalGateway>,
    synthesizer: Arc<Synthesizer>,
}

impl PrSummary {
    pub fn new(gateway: Arc<RetrievalGateway>, synthesizer: Arc<Synthesizer>) -> Self {
        Self {
            gateway,
            synthesizer,
        }
    }
}

#[async_trait]
impl Capability for PrSummary {
    fn name(&self) -> &'static str {
        "pr_summary"
    }

    fn description(&self) -> &'static str {
        "Generate a summary of a pull request"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "mode",
            ty: "string",
            description: "Summary mode (initial or follow-up)",
        }]
    }

    async fn execute(&self, args: &Args, ctx: &CapabilityContext<'_>) -> Result<CapabilityOutput> {
        let summary_mode = optional_str(args, "mode", "follow-up");
        let is_initial = summary_mode == "initial" || ctx.is_initial_request;

        let (summary_query, summary_focus) = match ctx.mode {
            Mode::CoReviewer if is_initial => (
                "Generate a comprehensive initial code review summary",
                "PR structure, key changes, and potential issues",
            ),
            Mode::CoReviewer => (
                "Update PR summary with additional details",
                "PR context for follow-up questions",
            ),
            Mode::InteractiveAssistant => (
                "Get key PR information for reference",
                "PR facts and context for specific questions",
            ),
        };

        let mut results: Vec<RetrievalResult> = Vec::new();
        for collection in ctx.collections {
            if let Some(result) = self
                .gateway
                .query_partition(ctx.handles, collection, summary_query, summary_focus)
                .await
            {
                results.push(result);
            }
        }

        let outcome = self
            .synthesizer
            .synthesize(summary_query, &results, ctx.history, ctx.mode, is_initial)
            .await;

        Ok(CapabilityOutput {
            responses: vec![outcome.answer],
            sources: outcome.sources,
            collections_used: outcome.collections_used,
        })
    }
}

/// Analyzes one file by querying the source-code partitions
pub struct FileAnalysis {
    gateway: Arc<RetrievalGateway>,
}

impl FileAnalysis {
    pub fn new(gateway: Arc<RetrievalGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Capability for FileAnalysis {
    fn name(&self) -> &'static str {
        "file_analysis"
    }

    fn description(&self) -> &'static str {
        "Analyze a specific file in the PR"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[
            ParamSpec {
                name: "file_path",
                ty: "string",
                description: "Path to the file",
            },
            ParamSpec {
                name: "analysis_type",
                ty: "string",
                description: "Type of analysis to perform",
            },
        ]
    }

    async fn execute(&self, args: &Args, ctx: &CapabilityContext<'_>) -> Result<CapabilityOutput> {
        let file_path = required_str(args, "file_path")?;
        let mut analysis_type = optional_str(args, "analysis_type", "general").to_string();

        let query_prefix = match ctx.mode {
            Mode::CoReviewer => {
                if analysis_type.to_lowercase().contains("general") {
                    analysis_type =
                        "code quality, best practices, potential bugs, and improvement suggestions"
                            .to_string();
                }
                "Review and analyze file in detail: "
            }
            Mode::InteractiveAssistant => "Find specific information about file: ",
        };

        let query = format!("{query_prefix}{file_path}");
        let focus = format!("{analysis_type} aspects of the file");

        let mut output = CapabilityOutput::default();
        for collection in ctx.collections {
            if !collection.ends_with("_source_code") {
                continue;
            }
            if let Some(result) = self
                .gateway
                .query_partition(ctx.handles, collection, &query, &focus)
                .await
            {
                output
                    .responses
                    .push(format!("Analysis of {file_path}:\n{}", result.answer));
                output.sources.extend(result.sources);
                output.collections_used.push(result.collection);
            }
        }
        Ok(output)
    }
}

/// Synthesizes an answer from already-gathered response texts
pub struct ResponseSynthesis {
    synthesizer: Arc<Synthesizer>,
}

impl ResponseSynthesis {
    pub fn new(synthesizer: Arc<Synthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl Capability for ResponseSynthesis {
    fn name(&self) -> &'static str {
        "response_synthesis"
    }

    fn description(&self) -> &'static str {
        "Synthesize a final response based on multiple information sources"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        &[
            ParamSpec {
                name: "query",
                ty: "string",
                description: "Original user query",
            },
            ParamSpec {
                name: "responses",
                ty: "array",
                description: "List of RAG responses",
            },
        ]
    }

    async fn execute(&self, args: &Args, ctx: &CapabilityContext<'_>) -> Result<CapabilityOutput> {
        let query = required_str(args, "query")?;
        let gathered = str_array(args, "responses").unwrap_or_default();

        let results: Vec<RetrievalResult> = gathered
            .into_iter()
            .map(|answer| RetrievalResult {
                answer,
                sources: Vec::new(),
                collection: "gathered".to_string(),
            })
            .collect();

        let outcome = self
            .synthesizer
            .synthesize(query, &results, ctx.history, ctx.mode, ctx.is_initial_request)
            .await;

        Ok(CapabilityOutput {
            responses: vec![outcome.answer],
            sources: Vec::new(),
            collections_used: Vec::new(),
        })
    }
}
