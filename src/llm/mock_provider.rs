// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Mock LLM provider for testing
//!
//! Provides a configurable mock implementation of the LlmProvider trait
//! that can be used in tests without making real API calls.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{ApiError, Result, RevuError};
use crate::llm::provider::LlmProvider;

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Queued responses, consumed in order; the last one repeats
    responses: Arc<Mutex<Vec<String>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded prompts
    recorded_prompts: Arc<Mutex<Vec<String>>>,
    /// When set, every call fails with this message
    fail_with: Arc<Mutex<Option<String>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(vec!["mock response".to_string()])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_prompts: Arc::new(Mutex::new(vec![])),
            fail_with: Arc::new(Mutex::new(None)),
        }
    }

    /// Set a single response returned for every call
    pub fn with_response(self, text: impl Into<String>) -> Self {
        {
            let mut responses = self.lock_responses();
            responses.clear();
            responses.push(text.into());
        }
        self
    }

    /// Queue multiple responses (returned in order; last repeats)
    pub fn with_responses(self, texts: Vec<String>) -> Self {
        {
            let mut responses = self.lock_responses();
            *responses = texts;
        }
        self
    }

    /// Make every completion call fail
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        {
            let mut fail = match self.fail_with.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *fail = Some(message.into());
        }
        self
    }

    /// Number of completion calls made so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// All prompts sent to this provider, in order
    pub fn recorded_prompts(&self) -> Vec<String> {
        match self.recorded_prompts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.responses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("mock provider responses lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);

        {
            let mut recorded = match self.recorded_prompts.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            recorded.push(prompt.to_string());
        }

        let fail = match self.fail_with.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(message) = fail {
            return Err(RevuError::Api(ApiError::ServerError {
                status: 500,
                message,
            }));
        }

        let responses = self.lock_responses();
        if responses.is_empty() {
            return Ok(String::new());
        }
        let index = call.min(responses.len() - 1);
        Ok(responses[index].clone())
    }
}
