use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;

use crate::analyst::Analyst;
use crate::error::AnalystError;
use crate::types::Role;

/// Ask questions about network telemetry; a model picks the tools to call.
#[derive(Debug, Parser)]
#[command(name = "netspy-analyst", version, about)]
pub struct Cli {
    /// Config file (defaults to ~/.netspy-analyst/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tool server URL
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Chat-completion model
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ask a single question
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Interactive session (default)
    Chat,
    /// List the tools discovered on the server
    Tools,
    /// Network health assessment
    Health {
        #[arg(long, default_value_t = 60)]
        duration: u32,
    },
    /// Analyze one process by name or PID, or all traffic when neither is given
    Process {
        #[arg(long, conflicts_with = "pid")]
        name: Option<String>,
        #[arg(long)]
        pid: Option<u32>,
        #[arg(long, default_value_t = 60)]
        duration: u32,
    },
    /// Analysis using every tool
    Comprehensive {
        #[arg(long, default_value_t = 300)]
        duration: u32,
    },
}

/// Cancel `token` when Ctrl-C arrives, until the returned handle is aborted.
pub fn cancel_on_ctrl_c(token: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

pub fn print_tools(analyst: &Analyst) {
    let catalog = analyst.conversation().functions().catalog();
    if catalog.is_empty() {
        println!("No tools available (tool server unreachable or empty).");
        return;
    }
    println!("Available tools:");
    for function in catalog.iter() {
        println!("  {:<26} {}", function.name, function.description);
    }
}

fn print_history(analyst: &Analyst) {
    for (i, msg) in analyst.history().iter().enumerate() {
        let summary = match msg.role {
            Role::Assistant if !msg.tool_calls.is_empty() => {
                let names: Vec<&str> = msg.tool_calls.iter().map(|c| c.name.as_str()).collect();
                format!("calls {}", names.join(", "))
            }
            _ => msg.text().lines().next().unwrap_or_default().chars().take(80).collect(),
        };
        println!("{:>3} {:<9} {}", i, msg.role.as_str(), summary);
    }
}

pub async fn run_chat_loop(mut analyst: Analyst) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("Ask about your network. /clear resets, /history shows the conversation,");
    println!("/tools lists tools, /raw <text> sends without hints, quit leaves.");
    loop {
        match rl.readline("netspy> ") {
            Ok(line) => {
                let input = line.trim().to_string();
                if input.is_empty() {
                    continue;
                }
                match input.to_lowercase().as_str() {
                    "quit" | "exit" | "/quit" | "/exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    "/clear" | "clear" => {
                        analyst.start_new_conversation();
                        println!("[Cleared]");
                        continue;
                    }
                    "/history" => {
                        print_history(&analyst);
                        continue;
                    }
                    "/tools" | "tools" => {
                        print_tools(&analyst);
                        continue;
                    }
                    _ => {}
                }
                let _ = rl.add_history_entry(&input);

                let token = CancellationToken::new();
                let watcher = cancel_on_ctrl_c(&token);
                let outcome = match input.strip_prefix("/raw ") {
                    Some(raw) => analyst.continue_conversation(raw, &token).await,
                    None => analyst.analyze(&input, &token).await,
                };
                watcher.abort();

                match outcome {
                    Ok(r) => println!("\nAnalyst > {}\n", r),
                    Err(AnalystError::Cancelled) => println!("\n[Cancelled]\n"),
                    Err(e) => println!("\n[Error: {}]\n", e),
                }
            }
            Err(_) => break,
        }
    }
    Ok(())
}
