// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Collection planner
//!
//! Decides which partitions are relevant to a query and what to focus on in
//! each. The decision is delegated to the language model; its output is
//! validated and repaired here. A malformed response is never an error,
//! it degrades to querying all available partitions.

use serde_json::Value;
use std::sync::Arc;

use crate::error::{Result, RevuError};
use crate::extract::extract_json;
use crate::llm::LlmProvider;
use crate::prompts::PlannerPrompt;

/// Focus used when the model gave none
pub const GENERIC_FOCUS: &str = "General information";

const FALLBACK_REASONING_UNVALIDATED: &str =
    "Using all available collections as no specific ones were determined or validated";
const FALLBACK_REASONING_UNPARSED: &str =
    "Could not parse LLM response for collection plan, using all available collections";

/// The planner's decision: which partitions to query and with what focus
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Plan {
    /// Partitions to query; order is advisory. Always a subset of the
    /// available set, never empty when partitions exist.
    pub collections: Vec<String>,

    /// Why these partitions were chosen
    pub reasoning: String,

    /// What to look for in each partition
    pub search_focus: String,
}

/// Plans per-partition retrieval for a query
pub struct CollectionPlanner {
    provider: Arc<dyn LlmProvider>,
}

impl CollectionPlanner {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Produce a validated plan for the query.
    ///
    /// Errors only on provider failure; anything wrong with the model's
    /// *content* falls back to the all-partitions plan.
    pub async fn plan(&self, query: &str, available: &[String], pr_id: &str) -> Result<Plan> {
        if available.is_empty() {
            return Err(RevuError::InvalidInput(
                "cannot plan over zero available partitions".to_string(),
            ));
        }

        let prompt = PlannerPrompt {
            pr_id,
            available_collections: available,
            query,
        }
        .render();

        tracing::debug!(pr_id = %pr_id, query = %query, "planning collections");
        let response = self.provider.complete(&prompt).await?;

        let plan = match extract_json(&response) {
            Some(value) => Self::validate(value, available),
            None => {
                tracing::warn!("planner output was not parsable as JSON, using default plan");
                Self::fallback(available, FALLBACK_REASONING_UNPARSED)
            }
        };

        tracing::debug!(collections = ?plan.collections, focus = %plan.search_focus, "final plan");
        Ok(plan)
    }

    /// Drop suggested names that are not available; fall back to everything
    /// when nothing valid remains.
    fn validate(value: Value, available: &[String]) -> Plan {
        let suggested: Vec<String> = value
            .get("collections")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut valid = Vec::new();
        for name in suggested {
            if available.contains(&name) {
                valid.push(name);
            } else {
                tracing::warn!(collection = %name, "planner suggested invalid collection, removing it");
            }
        }

        if valid.is_empty() {
            tracing::warn!("no valid collections in plan, using all available");
            return Self::fallback(available, FALLBACK_REASONING_UNVALIDATED);
        }

        Plan {
            collections: valid,
            reasoning: value
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            search_focus: focus_as_string(value.get("search_focus")),
        }
    }

    fn fallback(available: &[String], reasoning: &str) -> Plan {
        Plan {
            collections: available.to_vec(),
            reasoning: reasoning.to_string(),
            search_focus: GENERIC_FOCUS.to_string(),
        }
    }
}

/// The model sometimes returns a per-collection focus object instead of a
/// string; coerce anything non-string to its JSON text.
fn focus_as_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => GENERIC_FOCUS.to_string(),
        Some(Value::String(s)) if s.is_empty() => GENERIC_FOCUS.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
