// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! LLM provider trait
//!
//! The orchestration core consumes language models as a black-box
//! single-turn completion capability: prompt text in, response text out.
//! No streaming, no structured-output guarantee; callers that need
//! structure parse it out themselves (see `crate::extract`).

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{Result, RevuError};

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "mock")
    fn name(&self) -> &str;

    /// Single-turn, non-streaming completion
    async fn complete(&self, prompt: &str) -> Result<String>;
}

impl std::fmt::Debug for dyn LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Build the provider configured in settings.
///
/// Fails with a configuration error when no API key resolves; missing
/// credentials are never retried or degraded.
pub fn provider_from_settings(settings: &Settings) -> Result<Arc<dyn LlmProvider>> {
    let api_key = settings.api_key().ok_or_else(|| {
        RevuError::Config(format!(
            "no API key configured (set provider.api_key or ${})",
            settings.provider.api_key_env
        ))
    })?;

    let mut provider = crate::llm::OpenAiProvider::new(api_key, &settings.provider.default_model)
        .with_timeout_secs(settings.provider.timeout_secs);
    if let Some(base_url) = &settings.provider.base_url {
        provider = provider.with_base_url(base_url);
    }
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_settings_requires_key() {
        let mut settings = Settings::default();
        settings.provider.api_key = None;
        settings.provider.api_key_env = "REVU_TEST_UNSET_KEY_VAR".to_string();

        let err = provider_from_settings(&settings).unwrap_err();
        assert!(matches!(err, RevuError::Config(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_provider_from_settings_with_key() {
        let mut settings = Settings::default();
        settings.provider.api_key = Some("sk-test".to_string());

        let provider = provider_from_settings(&settings).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
