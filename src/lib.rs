// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Revu - conversational code-review assistant core.
//!
//! This crate exposes the retrieval-orchestration runtime used by:
//! - the `revu` CLI (`src/main.rs`)
//! - any transport layer embedding the library (HTTP, IDE plugin)
//!
//! Architecture highlights:
//! - `chat`: the fixed turn pipeline (resolve session, plan, fan out, synthesize)
//! - `agent`: the tool-calling variant over the same primitives
//! - `planner` / `retrieval` / `synthesis`: the pipeline stages
//! - `store`: partitioned per-PR indexes behind retriever/query-engine traits
//! - `session`: in-memory conversation state, one lock per session
//! - `llm`: provider abstraction (OpenAI-compatible HTTP, test mock)

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod planner;
pub mod prompts;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod synthesis;

pub use error::{Result, RevuError};
