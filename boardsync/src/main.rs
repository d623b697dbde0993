//! `BoardSync` — headless sync client.
//!
//! Connects to a board backend, keeps the local store reconciled, and
//! prints the live feed and board changes to stdout. Configuration via
//! CLI flags, environment variables, or config file
//! (`~/.config/boardsync/config.toml`).
//!
//! ```bash
//! cargo run --bin boardsync -- \
//!     --gateway-url http://127.0.0.1:8000 \
//!     --channel-url ws://127.0.0.1:8000/messages/ws/1 \
//!     --user-id 1 --user-name ana
//! ```

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use boardsync::client::{self, SyncClient};
use boardsync::config::{CliArgs, ClientConfig};
use boardsync::store::StoreEvent;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("boardsync starting");

    let (sync_client, mut events) = match client::connect(&config).await {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!("boardsync: {e}");
            return ExitCode::FAILURE;
        }
    };

    print_board(&sync_client);
    for message in sync_client.store.feed() {
        println!(
            "[{}] {}: {}",
            message.created_at.format("%H:%M"),
            message.author_name,
            message.content
        );
    }

    while let Some(event) = events.recv().await {
        render_event(&sync_client, &event);
    }

    tracing::info!("boardsync exiting");
    ExitCode::SUCCESS
}

/// Initialize file-based logging.
///
/// Logs go to a file (stdout belongs to the feed). Returns a
/// [`WorkerGuard`] that must be held until shutdown so buffered entries
/// are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("boardsync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Print one line per store event, re-reading current state.
fn render_event(sync_client: &SyncClient, event: &StoreEvent) {
    match event {
        StoreEvent::MessageChanged { id } | StoreEvent::MessageReindexed { new: id, .. } => {
            if let Some(message) = sync_client.store.message(id) {
                println!(
                    "[{}] {}: {}",
                    message.created_at.format("%H:%M"),
                    message.author_name,
                    message.content
                );
            }
        }
        StoreEvent::MessageRemoved { id } => {
            println!("(message {id} deleted)");
        }
        StoreEvent::TaskChanged { .. }
        | StoreEvent::TaskRemoved { .. }
        | StoreEvent::TaskReindexed { .. } => {
            print_board(sync_client);
        }
    }
}

/// Print a one-line summary of the board partition.
fn print_board(sync_client: &SyncClient) {
    let summary: Vec<String> = sync_client
        .board
        .columns()
        .iter()
        .map(|(status, tasks)| format!("{status}: {}", tasks.len()))
        .collect();
    println!("board | {}", summary.join(" | "));
}
