#![deny(unsafe_code)]

//! aide CLI: runs the daemon and talks to it over its Unix socket.
//!
//! `search` and `index` also work without a daemon, against the configured
//! snapshot directly.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use aide_config::AppConfig;
use aide_core::ipc::{IpcClient, socket_path_from_config};
use aide_core::logging::{DEFAULT_LOG_CAPACITY, LogCollector};
use aide_core::search::{IndexProgress, SearchEngine, SearchOptions};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// aide: chat tools and local file search for the desktop assistant.
#[derive(Parser)]
#[command(name = "aide", version = aide_core::build_info::VERSION, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "aide.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the aide daemon in the foreground.
    Start,

    /// Stop a running daemon.
    Stop,

    /// Show daemon status.
    Status,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Search indexed files.
    Search {
        query: String,

        /// Maximum number of hits.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Rebuild the file index and overwrite its snapshot.
    Index,

    /// List registered tools.
    Tools,

    /// Invoke a tool on the running daemon.
    Invoke {
        name: String,

        /// Tool input as JSON.
        #[arg(default_value = "{}")]
        args: String,
    },

    /// Print the daemon's session transcript.
    History,

    /// Show recent daemon log entries.
    Logs {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Minimum level (trace, debug, info, warn, error).
        #[arg(long)]
        level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let collector = LogCollector::new(DEFAULT_LOG_CAPACITY);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(collector.clone())
        .init();

    if !found {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Start => cmd_start(config, collector).await?,
        Commands::Stop => cmd_stop(&config).await?,
        Commands::Status => cmd_status(&config).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Search { query, limit } => cmd_search(&config, &query, limit).await?,
        Commands::Index => cmd_index(&config).await?,
        Commands::Tools => cmd_tools(&config).await?,
        Commands::Invoke { name, args } => cmd_invoke(&config, &name, &args).await?,
        Commands::History => cmd_history(&config).await?,
        Commands::Logs { limit, level } => cmd_logs(&config, limit, level.as_deref()).await?,
    }

    Ok(())
}

async fn cmd_start(config: AppConfig, collector: LogCollector) -> Result<()> {
    info!("Starting aide daemon");
    let daemon = aide_core::Daemon::new(config).with_log_reader(collector.reader());
    daemon.run().await.context("daemon exited with an error")?;
    Ok(())
}

async fn cmd_stop(config: &AppConfig) -> Result<()> {
    let client = connect(config)?;
    let resp = client.stop().await?;
    println!("{}", resp.message);
    Ok(())
}

async fn cmd_status(config: &AppConfig) -> Result<()> {
    let client = connect(config)?;
    let status = client.status().await?;
    println!("aide {} ({})", status.version, status.git_hash);
    println!("  pid:       {}", status.pid);
    println!("  uptime:    {}s", status.uptime_secs);
    println!("  log level: {}", status.log_level);
    println!(
        "  tools:     {} registered, {} enabled",
        status.tools_registered, status.tools_enabled
    );
    println!(
        "  chat:      {} messages (version {})",
        status.chat_messages, status.chat_version
    );
    println!("  roots:     {}", status.search_roots.join(", "));
    println!("  search:    {}", serde_json::to_string(&status.search)?);
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to render config")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn cmd_search(config: &AppConfig, query: &str, limit: usize) -> Result<()> {
    let client = IpcClient::new(socket_path_from_config(config));
    let hits = if client.daemon_available() {
        client.search(query, Some(limit)).await?.hits
    } else {
        let engine = SearchEngine::from_config(&config.search);
        let options = SearchOptions {
            limit: Some(limit),
            prefix: true,
        };
        engine.search(query, &options).await
    };

    if hits.is_empty() {
        println!("No files matched \"{query}\".");
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{:>3}. {:<40} {:>7.3}  {}", i + 1, hit.title, hit.score, hit.id);
    }
    Ok(())
}

async fn cmd_index(config: &AppConfig) -> Result<()> {
    let client = IpcClient::new(socket_path_from_config(config));
    if client.daemon_available() {
        let resp = client.rebuild_index().await?;
        println!(
            "Daemon indexed {} of {} files ({} unreadable).",
            resp.summary.indexed, resp.summary.candidates, resp.summary.failed
        );
        return Ok(());
    }

    let engine = SearchEngine::from_config(&config.search);
    let mut report = |p: IndexProgress| {
        eprint!("\rIndexing: {:>3}% ({}/{})", p.percent, p.processed, p.total);
        let _ = std::io::stderr().flush();
    };
    let summary = engine.rebuild_with_progress(&mut report).await;
    eprintln!();
    println!(
        "Indexed {} of {} files ({} unreadable). Snapshot: {}",
        summary.indexed,
        summary.candidates,
        summary.failed,
        engine.snapshot_path().display()
    );
    Ok(())
}

async fn cmd_tools(config: &AppConfig) -> Result<()> {
    let client = connect(config)?;
    for tool in client.tools().await?.tools {
        let state = if tool.enabled { "enabled" } else { "disabled" };
        println!("{:<20} [{state}] {}", tool.name, tool.description);
    }
    Ok(())
}

async fn cmd_invoke(config: &AppConfig, name: &str, args: &str) -> Result<()> {
    let args: serde_json::Value =
        serde_json::from_str(args).context("tool arguments must be valid JSON")?;
    let client = connect(config)?;
    let result = client.invoke_tool(name, args).await?;
    println!("{}", result.text);
    for reference in &result.references {
        match &reference.link {
            Some(link) => println!("  - {} <{link}>", reference.name),
            None => println!("  - {}", reference.name),
        }
    }
    Ok(())
}

async fn cmd_history(config: &AppConfig) -> Result<()> {
    let client = connect(config)?;
    let history = client.chat_history().await?;
    println!("version {}", history.version);
    for message in history.messages {
        let marker = if message.finished { ' ' } else { '*' };
        let kind = serde_json::to_string(&message.kind)?;
        println!(
            "{marker} {} {:<6} {}",
            message.time.format("%H:%M:%S"),
            kind.trim_matches('"'),
            message.text
        );
    }
    Ok(())
}

async fn cmd_logs(config: &AppConfig, limit: usize, level: Option<&str>) -> Result<()> {
    let client = connect(config)?;
    let resp = client.logs(Some(limit), level).await?;
    for entry in resp.entries {
        let fields: Vec<_> = entry
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!(
            "{} {:>5} {}: {} {}",
            entry.time.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            entry.level,
            entry.target,
            entry.message,
            fields.join(" ")
        );
    }
    Ok(())
}

fn connect(config: &AppConfig) -> Result<IpcClient> {
    let client = IpcClient::new(socket_path_from_config(config));
    if !client.daemon_available() {
        anyhow::bail!(
            "aide daemon is not running (no socket at {})",
            client.socket_path().display()
        );
    }
    Ok(client)
}

/// Load the config file, falling back to defaults when it does not exist.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("invalid configuration at {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}
