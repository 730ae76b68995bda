//! mirrorwatch - operator CLI for the mirrorwatch agent
//!
//! This tool provides commands for:
//! - Checking agent configuration and the persisted queue
//! - Recording a manual entry
//! - Flushing logs recovered from a previous session
//! - Sending a manual page-timing record
//!
//! Uses XDG Base Directory specification for file locations:
//! - Queue mirrors: $XDG_DATA_HOME/mirrorwatch/ (~/.local/share/mirrorwatch/)
//! - Config: $XDG_CONFIG_HOME/mirrorwatch/config.toml (~/.config/mirrorwatch/config.toml)
//! - Logs: $XDG_STATE_HOME/mirrorwatch/mirrorwatch.log

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mirrorwatch_core::{
    Agent, Config, FileStore, LogEntry, LogKind, LogStore, PageContext,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mirrorwatch")]
#[command(about = "Inspect and flush the mirrorwatch error queue")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/mirrorwatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write diagnostics to the log file
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show agent configuration and the persisted queue
    Status,

    /// Record one entry in the queue
    Capture {
        /// Entry type (console-error, network-error, js-error, ...)
        #[arg(short, long, default_value = "js-error")]
        kind: LogKind,

        /// Entry message
        message: String,

        /// Report right away instead of leaving the entry queued
        #[arg(long)]
        flush: bool,
    },

    /// Report the persisted queue now
    Flush,

    /// Send a standalone page-timing record
    PageTime {
        /// Page name
        name: String,

        /// Page time in milliseconds
        millis: u64,

        /// Page URL the record is attributed to
        #[arg(long)]
        href: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    // Keep the guard alive for the whole command
    let _log_guard = if args.verbose {
        Some(
            mirrorwatch_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Capture {
            kind,
            message,
            flush,
        } => cmd_capture(config, kind, &message, flush).await,
        Command::Flush => cmd_flush(config).await,
        Command::PageTime { name, millis, href } => {
            cmd_page_time(config, &name, millis, href).await
        }
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    let agent = &config.agent;

    println!("mirrorwatch Agent Configuration");
    println!("===============================");
    println!();
    println!(
        "System ID:       {}",
        agent.system_id().unwrap_or("(not set)")
    );
    println!(
        "Collector URL:   {}",
        agent.collector_url().unwrap_or("(not set)")
    );
    println!("Environment:     {:?}", agent.environment);
    println!("Timeout:         {}ms", agent.request_timeout_ms);
    println!("Flush threshold: {}", agent.immediate_flush_threshold);
    println!("Flush delay:     {}ms", agent.delayed_flush_ms);
    println!("Max reports:     {}", agent.max_report_attempts);
    println!(
        "Console levels:  {}",
        agent
            .console_levels
            .iter()
            .map(|level| level.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if let Err(e) = agent.validate() {
        println!();
        println!("Configuration problem: {}", e);
        println!();
        println!("Set the system id in {}:", Config::config_path().display());
        println!();
        println!("  [agent]");
        println!("  system_id = \"my-app\"");
        println!("  collector_url = \"https://collector.example.com/report\"");
        return Ok(());
    }

    let Some(key) = agent.storage_key() else {
        return Ok(());
    };
    let store = FileStore::open(Config::data_dir()).context("failed to open queue store")?;
    let pending: Vec<LogEntry> = match store.load(&key).context("failed to read queue")? {
        Some(raw) => serde_json::from_str(&raw).context("persisted queue is not valid JSON")?,
        None => Vec::new(),
    };

    println!();
    println!("Queue file:      {}", store.path_for(&key).display());
    println!("Pending logs:    {}", pending.len());
    for entry in &pending {
        println!(
            "  {} [{}] {}",
            entry.created_time.format("%Y-%m-%d %H:%M:%S"),
            entry.kind.as_str(),
            entry.message
        );
    }

    Ok(())
}

fn build_agent(config: Config) -> Result<Agent> {
    if let Err(e) = config.agent.validate() {
        bail!("invalid configuration: {}", e);
    }
    Agent::init(config.agent).context("failed to start agent")
}

async fn cmd_capture(config: Config, kind: LogKind, message: &str, flush: bool) -> Result<()> {
    let agent = build_agent(config)?;
    agent.capture(LogEntry::new(kind, message));
    println!("Queued {} entry ({} pending)", kind.as_str(), agent.pending_count());

    if flush {
        report(&agent).await?;
    }
    Ok(())
}

async fn cmd_flush(config: Config) -> Result<()> {
    let agent = build_agent(config)?;
    if agent.pending_count() == 0 {
        println!("No pending logs.");
        return Ok(());
    }
    report(&agent).await
}

async fn report(agent: &Agent) -> Result<()> {
    let pending = agent.pending_count();
    let Some(handle) = agent.report() else {
        bail!("agent is not configured to report (collector_url missing)");
    };

    let delivery = handle.wait().await;
    tracing::info!(pending, outcome = %delivery, "Manual flush finished");
    println!("Report of {} logs: {}", pending, delivery);
    if !delivery.is_delivered() {
        bail!("report {}", delivery);
    }
    Ok(())
}

async fn cmd_page_time(
    config: Config,
    name: &str,
    millis: u64,
    href: Option<String>,
) -> Result<()> {
    let agent = build_agent(config)?;
    if let Some(href) = href {
        agent.set_page(PageContext::from_href(href, PageContext::default().user_agent));
    }

    let Some(handle) = agent.report_page_time(name, millis) else {
        bail!("agent is not configured to report (collector_url missing)");
    };
    let delivery = handle.wait().await;
    println!("Page time for {}: {}", name, delivery);
    if !delivery.is_delivered() {
        bail!("page time {}", delivery);
    }
    Ok(())
}
