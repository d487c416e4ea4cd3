// Re-export shared types from mediasync-core
pub use mediasync_core::*;

pub mod config;
pub mod database;
pub mod error;
pub mod hooks;
pub mod repository;
pub mod s3;
pub mod storage;
pub mod sync;

use config::Config;
use database::setup_database;
use error::Result;
use hooks::HookRegistry;
use repository::SqlStore;
use storage::LocalStorage;
use sync::SyncRunner;

/// Load configuration from the environment, connect to the database,
/// and run one migration pass with the given hooks.
pub async fn run_sync(request: SyncRequest, hooks: HookRegistry) -> Result<SyncReport> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;

    // Setup database
    let db = setup_database(&config.database_url).await?;

    // The local media root is always the transfer source; the
    // destination backend comes from configuration
    let local = LocalStorage::new(&config.media_root, &config.media_url);
    let remote = storage::from_config(&config).await?;

    tracing::info!("🚀 mediasync starting");
    tracing::info!("📁 Media root: {}", config.media_root);
    tracing::info!("☁️  Destination backend: {}", remote.tag());

    let runner = SyncRunner::new(SqlStore::new(db), local, remote, hooks);
    runner.run(&request).await
}
