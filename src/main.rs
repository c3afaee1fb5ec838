//! Ultra REPL: extensible request/response server for interactive
//! development tooling.
//!
//! Composes the configured extensions into a single handler chain at
//! startup and serves it over WebSocket.
//!
//! Usage:
//!   ultra-repl                          # Default port 7070
//!   ultra-repl --port 8080              # Custom port
//!   ultra-repl --no-describe            # Leave the describe op out
//!   ultra-repl --log-file               # Log to ~/.ultra-repl/logs/repl.log

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use repl_server::Router;
use repl_services::{
    CompletionExtension, CompletionStrategies, DescribeExtension, InNsExtension, NamespaceIndex,
};
use repl_transport::{TransportConfig, TransportServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ultra-repl", about = "Ultra REPL Server: extensible op dispatch over WebSocket")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7070")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "32")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.ultra-repl/logs/repl.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,

    /// Do not register the describe extension
    #[arg(long)]
    no_describe: bool,
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(log_file_arg) = &cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(());
    };

    let log_path = if log_file_arg == "DEFAULT" {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".ultra-repl/logs/repl.log")
    } else {
        PathBuf::from(log_file_arg)
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();

    eprintln!("Logging to {}", log_path.display());
    Ok(())
}

fn build_router(cli: &Cli) -> anyhow::Result<Router> {
    let index = Arc::new(NamespaceIndex::core());

    let mut builder = Router::builder()
        .extension(
            "completion",
            CompletionExtension::new(index.clone(), CompletionStrategies::builtin()),
        )
        .extension("namespace", InNsExtension::new(index));

    if !cli.no_describe {
        builder = builder.extension("describe", DescribeExtension::new());
    }

    builder.build().context("composing handler chain")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let router = build_router(&cli)?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                      Ultra REPL Server                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Port:       {}", cli.port);
    println!("  Binding:    {}", cli.hostname);
    println!("  Chain:      {}", router.chain().order().join(" → "));
    println!();

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        max_connections: Some(cli.max_connections),
    };

    let mut transport = TransportServer::start(transport_config, router.clone())
        .await
        .map_err(|e| anyhow::anyhow!("starting transport: {e}"))?;

    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Server running!");
    println!();
    println!("  WebSocket endpoint:");
    println!("    ws://{}:{}/ws", cli.hostname, transport.port());
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    router.shutdown();
    info!("Server stopped");
    println!("  Server stopped.");

    Ok(())
}
