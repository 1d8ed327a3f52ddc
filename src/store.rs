//! Storage operations for crawled documents.
//!
//! All writers go through `INSERT OR REPLACE` keyed on the document URL.
//! Replacing a row fires the cascade delete trigger first, which removes
//! the old subtree, its closure rows, and its FTS content in one statement.
//! Concurrent workers on separate connections can still hit SQLite's write
//! lock; `retry_locked!` retries a bounded number of times before the error
//! surfaces.

use sqlx::sqlite::SqliteConnection;

pub const MAX_LOCK_RETRIES: u32 = 5;

/// True for SQLite's transient lock contention errors.
pub fn is_locked(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        _ => false,
    }
}

/// Retries the wrapped query expression while it fails with a lock error,
/// sleeping with a linear backoff between attempts. After the retry budget
/// the error surfaces unchanged.
#[macro_export]
macro_rules! retry_locked {
    ($op:expr) => {{
        let mut tries = 0u32;
        loop {
            let result = $op;
            match result {
                Err(ref err)
                    if $crate::store::is_locked(err) && tries < $crate::store::MAX_LOCK_RETRIES =>
                {
                    tries += 1;
                    tracing::debug!(tries, "database locked, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(50 * tries as u64)).await;
                }
                _ => break result,
            }
        }
    }};
}

/// Inserts or replaces one document row and rebuilds its closure rows.
/// Returns the new row id. The closure rows link every ancestor to this
/// document with the distance between them, root first.
pub async fn persist(
    conn: &mut SqliteConnection,
    repo: &str,
    name: &str,
    url: Option<&str>,
    ancestors: &[i64],
    mtime: i64,
    indextime: i64,
) -> Result<i64, sqlx::Error> {
    let result = retry_locked!(
        sqlx::query(
            "INSERT OR REPLACE INTO documents (repo, name, url, mtime, indextime)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(repo)
        .bind(name)
        .bind(url)
        .bind(mtime)
        .bind(indextime)
        .execute(&mut *conn)
        .await
    )?;
    let id = result.last_insert_rowid();

    for (i, ancestor) in ancestors.iter().enumerate() {
        let depth = (ancestors.len() - i) as i64;
        retry_locked!(
            sqlx::query(
                "INSERT INTO documents_tree (ancestor_id, descendant_id, depth)
                 VALUES (?, ?, ?)",
            )
            .bind(ancestor)
            .bind(id)
            .bind(depth)
            .execute(&mut *conn)
            .await
        )?;
    }

    Ok(id)
}

/// Whether the stored document behind `url` matches the source's current
/// modification time. Unknown URLs are never fresh.
pub async fn fresh(
    conn: &mut SqliteConnection,
    url: &str,
    mtime: i64,
) -> Result<bool, sqlx::Error> {
    let stored: Option<i64> = retry_locked!(
        sqlx::query_scalar("SELECT mtime FROM documents WHERE url = ?")
            .bind(url)
            .fetch_optional(&mut *conn)
            .await
    )?;
    Ok(stored == Some(mtime))
}

/// Marks a fresh document and its whole stored subtree as seen by this
/// run, so the stale sweep leaves them alone.
pub async fn touch(
    conn: &mut SqliteConnection,
    url: &str,
    indextime: i64,
) -> Result<(), sqlx::Error> {
    retry_locked!(
        sqlx::query("UPDATE documents SET indextime = ? WHERE url = ?")
            .bind(indextime)
            .bind(url)
            .execute(&mut *conn)
            .await
    )?;
    retry_locked!(
        sqlx::query(
            "UPDATE documents SET indextime = ?
             WHERE id IN (SELECT descendant_id FROM documents_tree
                           WHERE ancestor_id = (SELECT id FROM documents WHERE url = ?))",
        )
        .bind(indextime)
        .bind(url)
        .execute(&mut *conn)
        .await
    )?;
    Ok(())
}

/// Stores extracted text under the document's row id.
pub async fn index_text(
    conn: &mut SqliteConnection,
    row_id: i64,
    text: &str,
) -> Result<(), sqlx::Error> {
    retry_locked!(
        sqlx::query("INSERT INTO documents_fts (rowid, content) VALUES (?, ?)")
            .bind(row_id)
            .bind(text)
            .execute(&mut *conn)
            .await
    )?;
    Ok(())
}

/// Deletes every document of `repo` not seen since `cutoff`. Subtrees and
/// FTS rows follow through the cascade trigger.
pub async fn remove_stale(
    conn: &mut SqliteConnection,
    repo: &str,
    cutoff: i64,
) -> Result<u64, sqlx::Error> {
    let result = retry_locked!(
        sqlx::query("DELETE FROM documents WHERE repo = ? AND indextime < ?")
            .bind(repo)
            .bind(cutoff)
            .execute(&mut *conn)
            .await
    )?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, CrawlConfig, DbConfig, ReposConfig};
    use crate::{db, migrate};

    async fn open_store(dir: &tempfile::TempDir) -> SqliteConnection {
        let config = Config {
            db: DbConfig {
                path: dir.path().join("store.sqlite"),
            },
            crawl: CrawlConfig::default(),
            repos: ReposConfig::default(),
        };
        migrate::run_migrations(&config).await.unwrap();
        db::connect(&config).await.unwrap()
    }

    async fn count(conn: &mut SqliteConnection, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(conn).await.unwrap()
    }

    #[tokio::test]
    async fn persist_then_fresh() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut conn = open_store(&dir).await;

        let url = "https://files.example.org/a.pdf";
        persist(&mut conn, "pnt", "a.pdf", Some(url), &[], 1000, 5000)
            .await
            .unwrap();

        assert!(fresh(&mut conn, url, 1000).await.unwrap());
        assert!(!fresh(&mut conn, url, 1001).await.unwrap());
        assert!(!fresh(&mut conn, "https://elsewhere/", 1000).await.unwrap());
    }

    #[tokio::test]
    async fn closure_rows_carry_distance() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut conn = open_store(&dir).await;

        let root = persist(&mut conn, "pnt", "a.zip", Some("u://a"), &[], 1, 10)
            .await
            .unwrap();
        let mid = persist(&mut conn, "pnt", "inner.zip", None, &[root], 1, 10)
            .await
            .unwrap();
        let leaf = persist(&mut conn, "pnt", "doc.docx", None, &[root, mid], 1, 10)
            .await
            .unwrap();

        let depth: i64 = sqlx::query_scalar(
            "SELECT depth FROM documents_tree WHERE ancestor_id = ? AND descendant_id = ?",
        )
        .bind(root)
        .bind(leaf)
        .fetch_one(&mut conn)
        .await
        .unwrap();
        assert_eq!(depth, 2);
        assert_eq!(
            count(&mut conn, "SELECT COUNT(*) FROM documents_tree").await,
            3
        );
    }

    #[tokio::test]
    async fn touch_reaches_the_whole_subtree() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut conn = open_store(&dir).await;

        let root = persist(&mut conn, "pnt", "a.zip", Some("u://a"), &[], 1, 10)
            .await
            .unwrap();
        persist(&mut conn, "pnt", "doc.docx", None, &[root], 1, 10)
            .await
            .unwrap();

        touch(&mut conn, "u://a", 99).await.unwrap();
        assert_eq!(
            count(
                &mut conn,
                "SELECT COUNT(*) FROM documents WHERE indextime = 99"
            )
            .await,
            2
        );
    }

    #[tokio::test]
    async fn stale_sweep_cascades_through_subtrees() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut conn = open_store(&dir).await;

        let root = persist(&mut conn, "pnt", "a.zip", Some("u://a"), &[], 1, 10)
            .await
            .unwrap();
        let child = persist(&mut conn, "pnt", "doc.docx", None, &[root], 1, 10)
            .await
            .unwrap();
        index_text(&mut conn, child, "hello cascade").await.unwrap();
        // A surviving document from another repo.
        persist(&mut conn, "other", "keep.pdf", Some("u://k"), &[], 1, 10)
            .await
            .unwrap();

        let removed = remove_stale(&mut conn, "pnt", 50).await.unwrap();
        assert!(removed >= 1);
        assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM documents").await, 1);
        assert_eq!(
            count(&mut conn, "SELECT COUNT(*) FROM documents_tree").await,
            0
        );
        assert_eq!(
            count(&mut conn, "SELECT COUNT(*) FROM documents_fts").await,
            0
        );
    }

    #[tokio::test]
    async fn replacing_a_root_drops_its_old_subtree() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut conn = open_store(&dir).await;

        let root = persist(&mut conn, "pnt", "a.zip", Some("u://a"), &[], 1, 10)
            .await
            .unwrap();
        persist(&mut conn, "pnt", "doc.docx", None, &[root], 1, 10)
            .await
            .unwrap();
        assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM documents").await, 2);

        // Same URL, newer mtime: the old subtree must not survive.
        persist(&mut conn, "pnt", "a.zip", Some("u://a"), &[], 2, 20)
            .await
            .unwrap();
        assert_eq!(count(&mut conn, "SELECT COUNT(*) FROM documents").await, 1);
        let stored_mtime: i64 = sqlx::query_scalar("SELECT mtime FROM documents WHERE url = 'u://a'")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(stored_mtime, 2);
        assert_eq!(
            count(&mut conn, "SELECT COUNT(*) FROM documents_tree").await,
            0
        );
    }
}
