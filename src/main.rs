// ABOUTME: Reference CLI binary for the orchestration core — a minimal stdin/stdout wiring.
// ABOUTME: Exercises a single "cli" session; type a message to chat, "/approve <id>" or "/deny <id>" to resolve a pending tool call.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use orchestra::approval::ApprovalDecision;
use orchestra::config::Config;
use orchestra::model::{self, ModelOptions};
use orchestra::runtime::{Notifier, Runtime};
use orchestra::store::TranscriptStore;
use orchestra::tools::{EchoTool, Registry};

#[derive(Parser, Debug)]
#[command(name = "orchestra-cli", about = "Reference CLI for the agent orchestration core")]
struct Cli {
    /// Override the model for this run.
    #[arg(long)]
    model: Option<String>,

    /// Session id to chat in.
    #[arg(long, default_value = "cli_main_local")]
    session: String,
}

/// Prints outbound notifications to stdout, prefixed so they're
/// distinguishable from the raw model reply printed by the chat loop.
struct StdioNotifier;

#[async_trait]
impl Notifier for StdioNotifier {
    async fn send(&self, recipient_id: &str, content: &str) -> bool {
        println!("[notify -> {recipient_id}] {content}");
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;

    // Built eagerly once here only to fail fast on a missing API key; the
    // Runtime itself builds (and caches) adapters lazily per model id (§9).
    model::create_adapter(&config.llm, cli.model.as_deref())?;
    let registry = Registry::new();

    let notifier: Arc<dyn Notifier> = Arc::new(StdioNotifier);

    let mut runtime = Runtime::new(config.llm.clone(), registry, default_system_prompt());
    if config.storage.enabled {
        runtime = runtime
            .with_store(TranscriptStore::new(Config::sessions_dir()))
            .with_max_messages(config.storage.max_messages);
    }
    runtime = runtime.with_approval_timeout(std::time::Duration::from_millis(config.approval.default_timeout_ms));
    runtime = runtime.with_model_options(ModelOptions {
        max_tokens: config.llm.max_tokens,
        ..ModelOptions::default()
    });
    runtime = runtime.with_notifier(notifier.clone());

    let runtime = Arc::new(runtime);
    runtime.register_tool(Box::new(EchoTool::default())).await;

    println!("orchestra-cli — session '{}'. Ctrl-D to exit.", cli.session);
    println!("Type a message to chat, or '/approve <id>' / '/deny <id>' to resolve a pending tool call.");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("/approve ") {
            handle_resolution(&runtime, rest, ApprovalDecision::Approve).await;
            continue;
        }
        if let Some(rest) = line.strip_prefix("/deny ") {
            handle_resolution(&runtime, rest, ApprovalDecision::Deny).await;
            continue;
        }

        let runtime = runtime.clone();
        let notifier = notifier.clone();
        let session = cli.session.clone();
        let model = cli.model.clone();
        tokio::spawn(async move {
            match runtime.chat(&session, "cli", "local", &line, model.as_deref()).await {
                Ok(outcome) => {
                    let text = outcome.final_text.unwrap_or_else(|| "(no reply)".to_string());
                    notifier.send(&session, &text).await;
                }
                Err(e) => {
                    eprintln!("model error: {e}");
                }
            }
        });
    }

    Ok(())
}

async fn handle_resolution(runtime: &Runtime, id_str: &str, decision: ApprovalDecision) {
    match id_str.trim().parse::<uuid::Uuid>() {
        Ok(id) => {
            let resolved = runtime.resolve_approval(id, decision, "cli-operator").await;
            if !resolved {
                println!("no pending approval with id {id}");
            }
        }
        Err(_) => println!("invalid approval id: {id_str}"),
    }
}

fn default_system_prompt() -> String {
    "You are a helpful assistant operating through the orchestra core.".to_string()
}
