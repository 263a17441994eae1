// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! codeweave entry point: HTTP server, one-shot task runner, session tools.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use codeweave::config::{self, CliOptions, ResolvedConfig};
use codeweave::providers::{create_provider_from_config, ReplayProvider};
use codeweave::session::{SessionId, SessionStore};
use codeweave::stream::{self, ChatRequest, StreamGateway, WireEvent};
use codeweave::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};
use codeweave::types::SharedProvider;
use codeweave::{RequestTag, VERSION};

/// Planner/Coder agent pipeline over project workspaces.
#[derive(Parser)]
#[command(name = "codeweave")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model provider
    #[arg(short, long, global = true, env = "CODEWEAVE_PROVIDER")]
    provider: Option<Provider>,

    #[arg(short, long, global = true, env = "CODEWEAVE_MODEL")]
    model: Option<String>,

    /// Base URL for the provider API
    #[arg(long, global = true, env = "CODEWEAVE_BASE_URL")]
    base_url: Option<String>,

    /// API key (falls back to the provider's usual environment variable)
    #[arg(long, global = true, env = "CODEWEAVE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Directory holding the `project_{id}` roots
    #[arg(long, global = true, env = "CODEWEAVE_PROJECTS_DIR")]
    projects_dir: Option<PathBuf>,

    /// SQLite session database
    #[arg(long, global = true, env = "CODEWEAVE_DATABASE")]
    database: Option<PathBuf>,

    /// Maximum participant turns per task
    #[arg(long, global = true)]
    max_rounds: Option<usize>,

    /// Show info-level logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show debug logs with span events
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Provider {
    /// OpenAI chat completions
    Openai,
    /// Local Ollama server
    Ollama,
    /// Any OpenAI-compatible endpoint (needs --base-url)
    OpenaiCompatible,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Openai => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
            Provider::OpenaiCompatible => write!(f, "openai-compatible"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8000
        #[arg(long, env = "CODEWEAVE_BIND")]
        bind: Option<String>,
    },

    /// Run one task and print its NDJSON event stream
    Run {
        /// Project id
        #[arg(long)]
        project: i64,

        /// Continue an existing session
        #[arg(long)]
        session: Option<SessionId>,

        /// Routing tag (simple, direct, plan, complex)
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<RequestTag>,

        /// Answer from a JSON file of scripted responses instead of a model
        #[arg(long)]
        replay: Option<PathBuf>,

        /// The request
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// Inspect stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List a project's sessions
    List {
        #[arg(long)]
        project: i64,
    },
    /// Print a session with all its messages as JSON
    Show { session: SessionId },
    /// Print messages after a given message id as JSON
    Since {
        session: SessionId,
        #[arg(long, default_value_t = 0)]
        after: i64,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete a session and its messages
    Delete { session: SessionId },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the merged configuration
    Show,
}

fn parse_tag(s: &str) -> Result<RequestTag, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry = if cli.debug {
        TelemetryConfig::development()
    } else if cli.verbose {
        TelemetryConfig::default()
    } else {
        TelemetryConfig::production()
    };
    let _guard = match init_telemetry(&telemetry) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("{} {e}", "warning: logging disabled:".yellow());
            None
        }
    };

    let cli_options = CliOptions {
        provider: cli.provider.map(|p| p.to_string()),
        model: cli.model,
        base_url: cli.base_url,
        api_key: cli.api_key,
        projects_dir: cli.projects_dir,
        database_path: cli.database,
        max_rounds: cli.max_rounds,
        bind: match &cli.command {
            Commands::Serve { bind } => bind.clone(),
            _ => None,
        },
    };
    let config = config::load_config(&std::env::current_dir()?, cli_options)?;

    match cli.command {
        Commands::Serve { .. } => serve(&config).await,
        Commands::Run {
            project,
            session,
            tags,
            replay,
            message,
        } => {
            let request = ChatRequest {
                message: message.join(" "),
                session_id: session,
                tags,
            };
            run(&config, project, request, replay).await
        }
        Commands::Sessions { action } => sessions(&config, action).await,
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        },
        Commands::Version => {
            println!("codeweave {VERSION}");
            Ok(())
        }
    }
}

async fn serve(config: &ResolvedConfig) -> anyhow::Result<()> {
    let provider = create_provider_from_config(config)?;
    let gateway = StreamGateway::from_config(config, provider)?;

    eprintln!(
        "{} http://{} ({} / {}, projects in {})",
        "codeweave listening on".green().bold(),
        config.bind,
        config.provider,
        gateway.orchestrator().roster().model(),
        config.projects_dir.display()
    );
    stream::serve(gateway, &config.bind).await?;

    eprintln!("{}", GLOBAL_METRICS.snapshot().format_report().dimmed());
    Ok(())
}

async fn run(
    config: &ResolvedConfig,
    project_id: i64,
    request: ChatRequest,
    replay: Option<PathBuf>,
) -> anyhow::Result<()> {
    request.validate().map_err(anyhow::Error::msg)?;

    let provider: SharedProvider = match replay {
        Some(path) => Arc::new(ReplayProvider::from_file(&path)?),
        None => create_provider_from_config(config)?,
    };
    let gateway = StreamGateway::from_config(config, provider)?;

    let mut frames = gateway.start(project_id, request);
    let mut stdout = std::io::stdout().lock();
    let mut failed = false;
    while let Some(frame) = frames.recv().await {
        failed |= matches!(frame.event, WireEvent::Error { .. });
        stdout.write_all(frame.to_line().as_bytes())?;
        stdout.flush()?;
    }

    if failed {
        anyhow::bail!("task failed");
    }
    Ok(())
}

async fn sessions(config: &ResolvedConfig, action: SessionsAction) -> anyhow::Result<()> {
    let store = SessionStore::open(&config.database_path)?.with_page_limit(config.page_limit);

    match action {
        SessionsAction::List { project } => {
            let sessions = store.list_sessions(project).await?;
            if sessions.is_empty() {
                println!("{}", format!("No sessions for project {project}").dimmed());
            }
            for session in sessions {
                println!(
                    "{:>6}  {}  {}",
                    session.id.to_string().bright_white(),
                    session.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    session.title
                );
            }
        }
        SessionsAction::Show { session } => match store.get(session).await? {
            Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
            None => anyhow::bail!("session {session} not found"),
        },
        SessionsAction::Since { session, after, limit } => {
            let page = store.get_since(session, after, limit).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        SessionsAction::Delete { session } => {
            if store.delete_session(session).await? {
                println!("{} session {session}", "Deleted".green());
            } else {
                anyhow::bail!("session {session} not found");
            }
        }
    }
    Ok(())
}
