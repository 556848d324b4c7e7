//! Connection pool setup shared by every sqlite-backed store in this crate.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use workflow_core::error::{CoreError, Result};

/// Open (creating if necessary) a SQLite database and run embedded migrations.
///
/// `:memory:` and `sqlite://` URLs are both accepted, matching the
/// conventions used elsewhere in this codebase's database layer.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let db_url = if database_url.starts_with(":memory:") {
        database_url.to_string()
    } else if database_url.starts_with("sqlite://") {
        database_url.to_string()
    } else {
        format!("sqlite://{database_url}")
    };

    if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
        Sqlite::create_database(&db_url)
            .await
            .map_err(|e| CoreError::Database(format!("failed to create database: {e}")))?;
        tracing::info!("state-store database created at {}", db_url);
    }

    let is_memory = db_url.contains(":memory:");
    let connect_options = if is_memory {
        SqliteConnectOptions::new()
            .filename(&db_url)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Memory)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true)
    } else {
        SqliteConnectOptions::new()
            .filename(db_url.trim_start_matches("sqlite://"))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true)
    };

    // A pooled `:memory:` connection opens a fresh, empty database per
    // connection, so every writer/reader must share the single connection
    // this pool is allowed to hand out.
    let pool_options =
        if is_memory { SqlitePoolOptions::new().max_connections(1) } else { SqlitePoolOptions::new() };

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| CoreError::Database(format!("failed to connect: {e}")))?;

    sqlx::migrate!("./migrations/sqlite")
        .run(&pool)
        .await
        .map_err(|e| CoreError::Database(format!("migration failed: {e}")))?;

    Ok(pool)
}
