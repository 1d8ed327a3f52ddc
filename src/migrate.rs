use anyhow::Result;
use sqlx::Connection;

use crate::config::Config;
use crate::db;

/// Creates the schema. Idempotent; safe to run before every crawl.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let mut conn = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY,
            repo TEXT NOT NULL,
            name TEXT NOT NULL,
            url TEXT UNIQUE,
            mtime INTEGER NOT NULL,
            indextime INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut conn)
    .await?;

    // Closure table: one row per (ancestor, descendant) pair, not just
    // direct parents, so descendant sweeps need no recursive queries.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents_tree (
            ancestor_id INTEGER NOT NULL,
            descendant_id INTEGER NOT NULL,
            depth INTEGER NOT NULL
        )
        "#,
    )
    .execute(&mut conn)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_repo_indextime ON documents(repo, indextime)",
    )
    .execute(&mut conn)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_mtime ON documents(mtime DESC)")
        .execute(&mut conn)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tree_ancestor ON documents_tree(ancestor_id)",
    )
    .execute(&mut conn)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tree_descendant ON documents_tree(descendant_id)",
    )
    .execute(&mut conn)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(&mut conn)
    .await?;

    if !fts_exists {
        sqlx::query("CREATE VIRTUAL TABLE documents_fts USING fts5(content)")
            .execute(&mut conn)
            .await?;
    }

    // Deleting a document takes its whole subtree, its tree rows, and its
    // FTS row with it. This is what makes both stale-GC and INSERT OR
    // REPLACE of a re-crawled root single statements: the cascade does the
    // bookkeeping. Requires PRAGMA recursive_triggers (set at connect).
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_cascade_delete
        AFTER DELETE ON documents
        BEGIN
            DELETE FROM documents_fts WHERE rowid = old.id;
            DELETE FROM documents
             WHERE id IN (SELECT descendant_id FROM documents_tree
                           WHERE ancestor_id = old.id);
            DELETE FROM documents_tree
             WHERE ancestor_id = old.id OR descendant_id = old.id;
        END
        "#,
    )
    .execute(&mut conn)
    .await?;

    conn.close().await?;
    Ok(())
}
