mod analyst;
mod cli;
mod config;
mod conversation;
mod enhancer;
mod error;
mod llm;
mod tools;
mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use analyst::{Analyst, AnalystProfile, ProcessTarget};
use cli::{Cli, Command};
use config::AppConfig;
use conversation::Conversation;
use llm::openai::OpenAiProvider;
use tools::mcp::McpClient;
use tools::FunctionCallManager;

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "netspy_analyst=debug"
    } else {
        "netspy_analyst=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => {
            // Auto-generate config file on first run
            let config_path = AppConfig::config_path()?;
            if !config_path.exists() {
                let path = AppConfig::save_default()?;
                info!(path = %path.display(), "Created default config");
            }
            AppConfig::load()?
        }
    };

    if let Some(server) = &cli.server {
        config.tools.server_url = server.clone();
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    Ok(config)
}

/// Wire the transport, the tool server and the analyst profile together.
async fn build_analyst(config: &AppConfig) -> Result<Analyst> {
    let transport = OpenAiProvider::new(
        config.api_key()?,
        config.llm.api_base.clone(),
        config.llm.timeout(),
    )
    .context("Failed to build chat-completion client")?;

    let tool_server = Arc::new(
        McpClient::new(&config.tools.server_url, config.tools.timeout())
            .context("Failed to build tool server client")?,
    );
    let functions = FunctionCallManager::discover(tool_server.as_ref(), tool_server.clone())
        .await
        .with_parallel(config.tools.parallel_tool_calls);
    info!(
        server = tool_server.url(),
        tools = functions.len(),
        model = %config.llm.model,
        "Analyst ready"
    );

    let conversation = Conversation::new(Arc::new(transport), Arc::new(functions), &config.llm.model)
        .with_max_tokens(config.llm.max_tokens)
        .with_max_iterations(config.analyst.max_iterations);

    let mut profile = AnalystProfile::network(config.analyst.min_tool_calls);
    if let Some(prompt) = &config.analyst.system_prompt {
        profile.system_prompt = prompt.clone();
    }

    Ok(Analyst::new(conversation, profile).with_query_enhancement(config.analyst.enhance_queries))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let mut analyst = build_analyst(&config).await?;

    let token = CancellationToken::new();
    let watcher = cli::cancel_on_ctrl_c(&token);
    let answer = match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            // The shell installs its own Ctrl-C handling per turn.
            watcher.abort();
            println!(
                "netspy-analyst v{} ({})",
                env!("CARGO_PKG_VERSION"),
                analyst.conversation().model()
            );
            return cli::run_chat_loop(analyst).await;
        }
        Command::Tools => {
            watcher.abort();
            cli::print_tools(&analyst);
            return Ok(());
        }
        Command::Ask { query } => analyst.analyze(&query.join(" "), &token).await,
        Command::Health { duration } => analyst.network_health(duration, &token).await,
        Command::Comprehensive { duration } => {
            analyst.comprehensive_analysis(duration, &token).await
        }
        Command::Process {
            name,
            pid,
            duration,
        } => {
            let target = match (name, pid) {
                (Some(name), _) => ProcessTarget::Name(name),
                (None, Some(pid)) => ProcessTarget::Pid(pid),
                (None, None) => ProcessTarget::All,
            };
            analyst.analyze_process(&target, duration, &token).await
        }
    };
    watcher.abort();

    println!("{}", answer.context("Analysis failed")?);
    Ok(())
}
