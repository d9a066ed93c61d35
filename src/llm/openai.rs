// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! OpenAI-compatible API provider implementation
//!
//! Implements the LlmProvider trait against the chat-completions endpoint.
//! Every call carries a bounded timeout; a timeout surfaces as a retryable
//! API error rather than hanging the orchestration pass.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ApiError, Result, RevuError};
use crate::llm::provider::LlmProvider;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create a new provider for the given model
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Set a custom base URL (OpenAI-compatible endpoints, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Parse an error response body into a typed API error
    fn parse_error(&self, status: u16, body: &str) -> RevuError {
        if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            let message = error_response.error.message;
            let code = error_response.error.code.as_deref().unwrap_or("");

            return match code {
                "invalid_api_key" | "authentication_error" => {
                    RevuError::Api(ApiError::AuthenticationFailed)
                }
                "rate_limit_exceeded" => RevuError::Api(ApiError::RateLimited(60)),
                "model_not_found" => RevuError::Api(ApiError::ModelNotFound(message)),
                _ => RevuError::Api(ApiError::ServerError { status, message }),
            };
        }

        match status {
            401 | 403 => RevuError::Api(ApiError::AuthenticationFailed),
            429 => RevuError::Api(ApiError::RateLimited(60)),
            _ => RevuError::Api(ApiError::ServerError {
                status,
                message: body.chars().take(200).collect(),
            }),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RevuError::Api(ApiError::Timeout)
                } else if e.is_connect() {
                    RevuError::Api(ApiError::Network(e.to_string()))
                } else {
                    RevuError::Http(e)
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        if status >= 400 {
            return Err(self.parse_error(status, &body));
        }

        let parsed: OpenAiResponse = serde_json::from_str(&body)
            .map_err(|e| RevuError::Api(ApiError::InvalidResponse(e.to_string())))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                RevuError::Api(ApiError::InvalidResponse(
                    "response contained no choices".to_string(),
                ))
            })
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_invalid_key() {
        let provider = OpenAiProvider::new("sk-test", "gpt-4");
        let body = r#"{"error": {"message": "bad key", "code": "invalid_api_key"}}"#;
        let err = provider.parse_error(401, body);
        assert!(matches!(
            err,
            RevuError::Api(ApiError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_parse_error_rate_limited() {
        let provider = OpenAiProvider::new("sk-test", "gpt-4");
        let body = r#"{"error": {"message": "slow down", "code": "rate_limit_exceeded"}}"#;
        let err = provider.parse_error(429, body);
        assert!(matches!(err, RevuError::Api(ApiError::RateLimited(60))));
    }

    #[test]
    fn test_parse_error_unstructured_body() {
        let provider = OpenAiProvider::new("sk-test", "gpt-4");
        let err = provider.parse_error(503, "upstream unavailable");
        match err {
            RevuError::Api(ApiError::ServerError { status, message }) => {
                assert_eq!(status, 503);
                assert!(message.contains("upstream"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello there"}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test", "gpt-4")
            .with_base_url(format!("{}/v1/chat/completions", server.uri()));
        let answer = provider.complete("hi").await.unwrap();
        assert_eq!(answer, "hello there");
    }

    #[tokio::test]
    async fn test_complete_surfaces_server_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("sk-test", "gpt-4")
            .with_base_url(format!("{}/v1/chat/completions", server.uri()));
        let err = provider.complete("hi").await.unwrap_err();
        assert!(matches!(err, RevuError::Api(ApiError::ServerError { .. })));
    }
}
