//! telemetry-client - CLI host for the telemetry signal client
//!
//! This tool provides commands for:
//! - Checking client configuration and the pending signal snapshot
//! - Sending a single signal
//! - Flushing signals left over from earlier runs
//! - Running the scheduler and emitting signals read from stdin
//!
//! Uses XDG Base Directory specification for file locations:
//! - Snapshot: $XDG_DATA_HOME/telemetry-client/telemetrysignalcache
//! - Config: $XDG_CONFIG_HOME/telemetry-client/config.toml
//! - Logs: $XDG_STATE_HOME/telemetry-client/

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use telemetry_client_core::{
    Config, FileSnapshotStore, FlushOutcome, Payload, SnapshotStore, TelemetryManager,
};
use tokio::sync::{mpsc, Notify};

#[derive(Parser)]
#[command(name = "telemetry-client")]
#[command(about = "Buffer and deliver telemetry signals")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/telemetry-client/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output (writes a log file)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show client configuration and pending signals
    Status,

    /// Send one signal, keeping it for the next run if delivery fails
    Send {
        /// Signal type, e.g. appLaunched
        signal_type: String,

        /// User identifier (hashed before sending)
        #[arg(short, long)]
        user: Option<String>,

        /// Extra payload entry as key=value (repeatable)
        #[arg(short, long = "payload", value_parser = parse_pair)]
        payload: Vec<(String, String)>,
    },

    /// Deliver signals left over from earlier runs
    Flush,

    /// Run the delivery scheduler; read `TYPE [key=value...]` lines from stdin
    Run,
}

fn parse_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn to_payload(pairs: impl IntoIterator<Item = (String, String)>) -> Payload {
    pairs.into_iter().collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    // Initialize logging if verbose; keep the guard alive until exit
    let _log_guard = if args.verbose {
        Some(
            telemetry_client_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Send {
            signal_type,
            user,
            payload,
        } => cmd_send(config, &signal_type, user.as_deref(), to_payload(payload)).await,
        Command::Flush => cmd_flush(config).await,
        Command::Run => cmd_run(config).await,
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Telemetry Client Configuration");
    println!("==============================");
    println!();

    let client = &config.client;

    println!(
        "App ID:          {}",
        client.app_id.as_deref().unwrap_or("<not set>")
    );
    println!("API Base URL:    {}", client.api_base_url);
    println!(
        "Default User:    {}",
        if client.default_user.is_some() {
            "<set>"
        } else {
            "<not set>"
        }
    );
    println!("Debug Logs:      {}", client.show_debug_logs);
    println!("Send In Debug:   {}", client.send_signals_in_debug);
    println!("Session Signal:  {}", client.send_new_session_began_signal);
    println!("Flush Interval:  {}s", config.delivery.flush_interval().as_secs());
    println!("Timeout:         {}s", config.delivery.timeout_secs);

    let store = FileSnapshotStore::new(config.snapshot_path());
    println!();
    println!("Snapshot:        {}", store.path().display());
    if store.exists() {
        match store.load() {
            Ok(signals) => println!("Pending Signals: {}", signals.len()),
            Err(e) => println!("Pending Signals: unreadable ({})", e),
        }
    } else {
        println!("Pending Signals: 0");
    }

    println!();
    match config.validate() {
        Ok(()) => println!("Status: Ready to send"),
        Err(e) => {
            println!("Status: Not ready ({})", e);
            if client.app_id.is_none() {
                println!();
                println!("Set an app id in config.toml:");
                println!();
                println!("  [client]");
                println!("  app_id = \"00000000-0000-0000-0000-000000000000\"");
            }
        }
    }

    Ok(())
}

fn init_manager(config: Config) -> Result<TelemetryManager> {
    TelemetryManager::init(config).context("failed to initialize telemetry client")
}

async fn cmd_send(
    config: Config,
    signal_type: &str,
    user: Option<&str>,
    payload: Payload,
) -> Result<()> {
    let manager = init_manager(config)?;
    let extra = (!payload.is_empty()).then_some(&payload);

    if !manager.process_signal(signal_type, user, extra) {
        println!("Signal dropped: debug build and client.send_signals_in_debug is off");
    }

    // Also delivers anything restored from an earlier run
    deliver_and_persist(&manager).await
}

async fn cmd_flush(config: Config) -> Result<()> {
    let manager = init_manager(config)?;

    if manager.pending_count() == 0 {
        println!("No pending signals.");
        return Ok(());
    }

    deliver_and_persist(&manager).await
}

/// Flush until empty or failure, then snapshot whatever is left
async fn deliver_and_persist(manager: &TelemetryManager) -> Result<()> {
    for outcome in manager.flush_all().await {
        match outcome {
            FlushOutcome::Idle => {}
            FlushOutcome::Delivered(count) => println!("Delivered {} signals", count),
            FlushOutcome::Requeued { count, error } => {
                println!("Delivery failed for {} signals: {}", count, error)
            }
        }
    }

    let saved = manager
        .on_terminate()
        .context("failed to save pending signals")?;
    if saved > 0 {
        println!("Saved {} signals for the next run", saved);
    }

    Ok(())
}

async fn cmd_run(config: Config) -> Result<()> {
    let manager = init_manager(config)?;

    // Set up signal handler for graceful shutdown
    let interrupted = Arc::new(Notify::new());
    let notify = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        notify.notify_one();
    })
    .context("failed to set Ctrl+C handler")?;

    manager.start().context("failed to start delivery")?;
    println!(
        "Client running (flush every {}s). Enter `TYPE [key=value...]` lines; Ctrl+C to stop.",
        manager.config().delivery.flush_interval().as_secs()
    );

    let mut lines = spawn_stdin_reader();
    loop {
        tokio::select! {
            _ = interrupted.notified() => break,
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                if let Err(e) = emit_line(&manager, &line) {
                    eprintln!("{:#}", e);
                }
            }
        }
    }

    let saved = manager
        .shutdown()
        .await
        .context("failed to save pending signals")?;

    let stats = manager.stats();
    println!();
    println!("Batches sent:      {}", stats.batches_sent);
    println!("Signals delivered: {}", stats.signals_delivered);
    println!("Failed attempts:   {}", stats.failures);
    println!("Signals saved:     {}", saved);

    Ok(())
}

/// Forward stdin lines from a plain thread
///
/// A blocking read cannot be cancelled, so it must not hold up runtime
/// shutdown. The channel closes on EOF or a read error.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Parse one `TYPE [key=value...]` line and enqueue it
fn emit_line(manager: &TelemetryManager, line: &str) -> Result<()> {
    let mut parts = line.split_whitespace();
    let Some(signal_type) = parts.next() else {
        return Ok(());
    };

    let mut payload = Payload::new();
    for raw in parts {
        let (key, value) = parse_pair(raw).map_err(anyhow::Error::msg)?;
        payload.insert(key, value);
    }

    let extra = (!payload.is_empty()).then_some(&payload);
    if manager.process_signal(signal_type, None, extra) {
        println!("Queued {} ({} pending)", signal_type, manager.pending_count());
    } else {
        println!("Dropped {} (debug build)", signal_type);
    }
    Ok(())
}
