// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! LLM module for Revu
//!
//! Provides abstraction over language-model completion backends.

pub mod mock_provider;
pub mod openai;
pub mod provider;

pub use mock_provider::*;
pub use openai::*;
pub use provider::*;
