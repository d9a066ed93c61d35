// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Revu - conversational code review from your terminal
//!
//! Opens one session against a pull request's persisted index and loops
//! queries through the orchestrator.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use uuid::Uuid;

use revu::agent::AgentEngine;
use revu::chat::{ChatEngine, ChatRequest, ChatResponse};
use revu::config::Settings;
use revu::error::Result;
use revu::llm::provider_from_settings;
use revu::session::{Mode, SessionStore};
use revu::store::{CollectionStore, DiskCollectionStore, LexicalPartitionOpener};

#[derive(Parser)]
#[command(name = "revu", version, about = "Conversational code-review assistant")]
struct Cli {
    /// Pull request to review (names the index directory)
    #[arg(long)]
    pr_id: String,

    /// Interaction mode: co_reviewer or interactive_assistant
    #[arg(long, default_value = "co_reviewer")]
    mode: Mode,

    /// Index root directory (defaults to the configured index root)
    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Route turns through the tool-calling engine instead of the fixed pipeline
    #[arg(long)]
    agent: bool,

    /// Enable debug diagnostics (RUST_LOG still takes precedence)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

enum Engine {
    Pipeline(ChatEngine),
    Agent(AgentEngine),
}

impl Engine {
    async fn turn(&self, request: ChatRequest) -> Result<ChatResponse> {
        match self {
            Engine::Pipeline(engine) => engine.chat(request).await,
            Engine::Agent(engine) => engine.process(request).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());
    if cli.verbose > 0 {
        if let Ok(directive) = "revu=debug".parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut settings = Settings::load()?;
    if let Some(dir) = cli.index_dir {
        settings.index.root = dir;
    }

    let provider = provider_from_settings(&settings)?;
    let opener = Arc::new(LexicalPartitionOpener::new(provider.clone()));
    let store: Arc<dyn CollectionStore> =
        Arc::new(DiskCollectionStore::new(settings.index.root.clone(), opener));
    let sessions = Arc::new(SessionStore::new(settings.conversation.max_history_pairs));

    let engine = if cli.agent {
        Engine::Agent(AgentEngine::new(provider, store, sessions, &settings))
    } else {
        Engine::Pipeline(ChatEngine::new(provider, store, sessions, &settings))
    };

    println!("revu - reviewing {} in {} mode", cli.pr_id, cli.mode);
    println!("Type a question, or 'exit' to quit.\n");

    let stdin = io::stdin();
    let mut session_id: Option<Uuid> = None;
    let mut first_turn = true;

    loop {
        // The first co_reviewer turn runs without input: it produces the
        // initial review summary regardless of what would be typed.
        let query = if first_turn && cli.mode == Mode::CoReviewer {
            String::new()
        } else {
            print!("revu> ");
            io::stdout().flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line == "exit" || line == "quit" {
                break;
            }
            line
        };
        first_turn = false;

        let request = ChatRequest {
            query,
            pr_id: cli.pr_id.clone(),
            mode: cli.mode,
            session_id,
        };

        match engine.turn(request).await {
            Ok(response) => {
                session_id = Some(response.session_id);
                println!("\n{}\n", response.answer);
                if !response.collections_used.is_empty() {
                    println!(
                        "[consulted: {} | sources: {}]",
                        response.collections_used.join(", "),
                        response.sources.len()
                    );
                }
                if !response.tools_used.is_empty() {
                    println!("[tools: {}]", response.tools_used.join(", "));
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                eprintln!("error: {e}");
                if session_id.is_none() {
                    // Could not even establish a session; no point looping.
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
