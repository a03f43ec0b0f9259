//! # Vitrina Desk Library
//!
//! Command layer shared by the `vitrina-desk` binary and any frontend
//! bridge.
//!
//! ## Module Organization
//! ```text
//! vitrina_desk_lib/
//! ├── lib.rs          ◄─── You are here (startup & run)
//! ├── cli.rs          ◄─── clap subcommands → commands
//! ├── state/
//! │   └── mod.rs      ◄─── AppState (agent + service handles)
//! ├── commands/
//! │   ├── mod.rs      ◄─── Command exports
//! │   ├── customer.rs ◄─── Stock, cart, checkout, proof, tracking
//! │   ├── staff.rs    ◄─── Queue, confirm, reject
//! │   └── config.rs   ◄─── Configuration and status
//! └── error.rs        ◄─── API error type for commands
//! ```

pub mod cli;
pub mod commands;
pub mod error;
pub mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use state::AppState;
use vitrina_db::{Database, DbConfig};
use vitrina_sync::{ShopAgentBuilder, ShopConfig, TracingEmitter};

/// Parses the command line and runs one command.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                       Application Startup                               │
/// │                                                                         │
/// │  1. Initialize Logging ───────────────────────────────────────────────► │
/// │     • tracing-subscriber with env filter, to stderr                     │
/// │     • Default: info,vitrina=debug,sqlx=warn; RUST_LOG overrides         │
/// │                                                                         │
/// │  2. Load Configuration ───────────────────────────────────────────────► │
/// │     • defaults → vitrina.toml → VITRINA_* environment → --role          │
/// │                                                                         │
/// │  3. Open Local Store ─────────────────────────────────────────────────► │
/// │     • SQLite with WAL mode, pending migrations applied                  │
/// │                                                                         │
/// │  4. Build ShopAgent ──────────────────────────────────────────────────► │
/// │     • HTTP backend from [backend], events to the log                    │
/// │                                                                         │
/// │  5. Run Command ──────────────────────────────────────────────────────► │
/// │     • background tasks stopped before exit                              │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let state = open_state(&cli).await?;

    let result = cli::dispatch(&state, cli.command).await;
    state.shutdown().await;
    result
}

async fn open_state(cli: &Cli) -> anyhow::Result<AppState> {
    let mut config = match &cli.config {
        Some(path) => ShopConfig::load(Some(path.clone()))
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ShopConfig::load_or_default(None),
    };
    if let Some(role) = cli.role {
        config.device.role = role.into();
    }
    config.validate()?;

    let db_path = config.database_path();
    info!(?db_path, role = %config.role(), "Starting Vitrina desk");

    let db = Database::new(DbConfig::new(db_path))
        .await
        .context("Failed to open the local store")?;

    let agent = ShopAgentBuilder::new(config)
        .with_database(db)
        .with_emitter(Arc::new(TracingEmitter))
        .build()?;

    Ok(AppState::new(agent))
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG` when set
/// - otherwise `info`, with `debug` for the vitrina crates and `warn` for sqlx
///
/// Logs go to stderr so command output on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vitrina=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
