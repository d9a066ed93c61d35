// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Settings management for Revu
//!
//! Handles loading and saving settings from ~/.revu/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Main settings structure, stored in ~/.revu/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Language-model provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Per-partition retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Conversation and history management settings
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Index storage settings
    #[serde(default)]
    pub index: IndexConfig,
}

/// Language-model provider configuration (OpenAI-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Default model to use
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Base URL for API (for custom endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds for completion calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Per-partition retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of nearest chunks to retrieve per partition
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum length of provenance text previews, in characters
    #[serde(default = "default_preview_len")]
    pub preview_len: usize,
}

/// Conversation and history management settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Maximum number of user/assistant exchanges kept per session
    #[serde(default = "default_max_history_pairs")]
    pub max_history_pairs: usize,
}

/// Index storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root directory holding one subdirectory of persisted partitions per PR
    #[serde(default = "default_index_root")]
    pub root: PathBuf,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_top_k() -> usize {
    5
}

fn default_preview_len() -> usize {
    200
}

fn default_max_history_pairs() -> usize {
    10
}

fn default_index_root() -> PathBuf {
    Settings::revu_home().join("indexes")
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            preview_len: default_preview_len(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_pairs: default_max_history_pairs(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: default_index_root(),
        }
    }
}

impl Settings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::revu_home().join("settings.json")
    }

    /// Load settings from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the revu home directory (~/.revu or $REVU_HOME).
    pub fn revu_home() -> PathBuf {
        if let Ok(home) = std::env::var("REVU_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".revu")
    }

    /// Resolve the provider API key: direct setting first, then the
    /// configured environment variable. A placeholder value counts as
    /// unconfigured.
    pub fn api_key(&self) -> Option<String> {
        let key = self
            .provider
            .api_key
            .clone()
            .or_else(|| std::env::var(&self.provider.api_key_env).ok())?;
        if key.is_empty() || key == "your_openai_api_key_here" {
            return None;
        }
        Some(key)
    }
}
