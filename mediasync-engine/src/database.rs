use crate::error::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

/// Connect to the host application's database.
///
/// No migrations run here: the tool owns no schema and operates on the
/// application's existing tables.
pub async fn setup_database(database_url: &str) -> Result<DatabaseConnection> {
    tracing::info!("🔗 Connecting to database: {}", database_url);

    // Configure connection options
    let mut opt = ConnectOptions::new(database_url.to_string());
    opt.max_connections(5)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    Ok(db)
}
