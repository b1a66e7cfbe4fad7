//! Line-oriented front end for the tool dispatcher.
//!
//! Reads one JSON call request (or a JSON array of them) per stdin line and
//! writes one response envelope per line to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use live_primitives::{CallId, FunctionCall, ResponseEnvelope, ToolResponse};
use live_tools::{Arguments, BuiltinConfig, PluginError, ToolManager};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dispatch-repl", about = "Serve tool calls from stdin as JSON lines")]
struct Cli {
    /// Print the declaration aggregate and exit.
    #[arg(long)]
    list: bool,

    /// Start with an empty registry instead of the built-in plugins.
    #[arg(long)]
    no_builtins: bool,
}

#[derive(Debug, Deserialize)]
struct InboundCall {
    name: String,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    id: Option<CallId>,
}

impl InboundCall {
    /// Converts the request, keeping its id so a rejection can still be
    /// correlated by the caller.
    fn into_call(self) -> Result<FunctionCall, (CallId, PluginError)> {
        let id = self.id.unwrap_or_else(CallId::random);
        match Arguments::try_from(self.args) {
            Ok(args) => Ok(FunctionCall::new(self.name, args.into_inner(), id)),
            Err(err) => Err((id, err)),
        }
    }
}

/// Splits converted calls from rejections, answering each rejection with an
/// error entry.
fn partition(calls: Vec<InboundCall>) -> (Vec<FunctionCall>, ResponseEnvelope) {
    let mut accepted = Vec::with_capacity(calls.len());
    let mut rejected = ResponseEnvelope::default();
    for inbound in calls {
        let name = inbound.name.clone();
        match inbound.into_call() {
            Ok(call) => accepted.push(call),
            Err((id, err)) => {
                warn!(tool = %name, call_id = %id, error = %err, "rejecting call arguments");
                let response = ToolResponse::error(err.to_string());
                rejected.extend(ResponseEnvelope::single(id, response));
            }
        }
    }
    (accepted, rejected)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Batch(Vec<InboundCall>),
    Single(InboundCall),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let manager = if cli.no_builtins {
        ToolManager::empty()
    } else {
        ToolManager::new(BuiltinConfig::from_env()).context("failed to seed built-in tools")?
    };
    info!(tools = ?manager.names(), "tool manager ready");

    let mut stdout = io::stdout();

    if cli.list {
        let declarations = serde_json::to_string_pretty(&manager.list_declarations())?;
        stdout.write_all(declarations.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        return Ok(());
    }

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let inbound: Inbound = match serde_json::from_str(line) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!(error = %err, "ignoring malformed call request");
                continue;
            }
        };

        let calls = match inbound {
            Inbound::Single(call) => vec![call],
            Inbound::Batch(calls) => calls,
        };
        let (calls, rejected) = partition(calls);

        let result = if rejected.responses().is_empty() {
            manager.dispatch_all(calls).await
        } else {
            Ok(rejected)
        };

        match result {
            Ok(envelope) => {
                let encoded = serde_json::to_string(&envelope)?;
                stdout.write_all(encoded.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Err(err) => error!(error = %err, "call rejected"),
        }
    }

    Ok(())
}
