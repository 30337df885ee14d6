//! Contest Core worker boot.
//!
//! Opens the database, runs schema migration, and starts the lifecycle
//! reconciler as a background task. The join service, settlement engine,
//! and discovery cascade are library entry points invoked by callers (an
//! API layer, an admin tool, provider ingestion) rather than by this binary
//! directly — this process's only standing responsibility is the
//! reconciler tick.

use anyhow::Result;
use contest_core::config::Config;
use contest_core::db::Db;
use contest_core::lifecycle::spawn_reconciler_worker;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    info!(database_path = %config.database_path, "contest-core starting");

    let db = Db::open(&config.database_path)?;

    let reconciler = spawn_reconciler_worker(db, &config);

    match reconciler {
        Some(handle) => {
            handle.await?;
        }
        None => {
            info!("no background workers enabled; idling");
            std::future::pending::<()>().await;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contest_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
