//! # parley-node
//!
//! Long-running Parley node.
//!
//! Opens the local database, builds the message-state engine over an
//! in-memory loopback transport and runs its background loops (retrieval,
//! resend, unmute sweep, delivery confirmations) until Ctrl+C.

mod config;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_client::{MemoryTransport, Messenger, StaticSettings};
use parley_shared::clock::SystemTimeSource;
use parley_store::Database;

use crate::config::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_client=debug,parley_store=info")),
        )
        .init();

    info!("Starting Parley node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database
    // -----------------------------------------------------------------------
    let db = match &config.db_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Database::open_at(path)?
        }
        None => Database::new("parley")?,
    };
    info!(path = ?db.path(), "Database opened");

    // -----------------------------------------------------------------------
    // 4. Build the engine
    // -----------------------------------------------------------------------
    // Loopback transport: every send is confirmed immediately.
    let (transport, confirmations) = MemoryTransport::new(true);
    let messenger = Arc::new(Messenger::new(
        config.identity,
        db,
        Arc::new(transport),
        Arc::new(StaticSettings {
            notifications_enabled: config.notifications_enabled,
        }),
        Arc::new(SystemTimeSource),
        config.messenger.clone(),
    )?);
    info!(identity = %config.identity, "Messenger ready");

    // -----------------------------------------------------------------------
    // 5. Spawn background loops
    // -----------------------------------------------------------------------
    let handles = messenger.start(confirmations);

    // -----------------------------------------------------------------------
    // 6. Run until Ctrl+C
    // -----------------------------------------------------------------------
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    messenger.shutdown();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Background task failed");
        }
    }

    Ok(())
}
