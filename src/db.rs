use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::Connection;
use std::str::FromStr;

use crate::config::Config;

/// Opens a private connection for one worker (or one command).
///
/// Connections are deliberately not pooled: every crawl worker owns its
/// connection for its whole lifetime, and the task queue stays the only
/// resource shared between workers.
pub async fn connect(config: &Config) -> Result<SqliteConnection> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        // Cascading deletes in the documents trigger delete further
        // documents rows; recursive triggers make that fan out.
        .pragma("recursive_triggers", "1");

    let conn = SqliteConnection::connect_with(&options).await?;

    Ok(conn)
}
