//! Full text queries against the crawled index.

use anyhow::Result;
use sqlx::Connection;

use crate::config::Config;
use crate::db;

pub const PAGE_SIZE: u32 = 10;

#[derive(Debug, sqlx::FromRow)]
pub struct SearchHit {
    pub name: String,
    /// Absent for documents nested inside containers.
    pub url: Option<String>,
    pub snippet: String,
    pub mtime: i64,
}

/// Runs an FTS5 match and returns one page of hits, newest sources first.
pub async fn run_search(config: &Config, query: &str, page: u32) -> Result<Vec<SearchHit>> {
    let mut conn = db::connect(config).await?;
    let offset = page * PAGE_SIZE;

    let hits = sqlx::query_as::<_, SearchHit>(
        "SELECT d.name, d.url,
                snippet(documents_fts, 0, '[', ']', '...', 24) AS snippet,
                d.mtime
           FROM documents_fts
           JOIN documents d ON d.id = documents_fts.rowid
          WHERE documents_fts MATCH ?
          ORDER BY d.mtime DESC
          LIMIT ? OFFSET ?",
    )
    .bind(query)
    .bind(PAGE_SIZE)
    .bind(offset)
    .fetch_all(&mut conn)
    .await?;

    conn.close().await?;
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, CrawlConfig, DbConfig, ReposConfig};
    use crate::{migrate, store};

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            db: DbConfig {
                path: dir.path().join("search.sqlite"),
            },
            crawl: CrawlConfig::default(),
            repos: ReposConfig::default(),
        }
    }

    #[tokio::test]
    async fn matches_are_ordered_newest_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = test_config(&dir);
        migrate::run_migrations(&config).await.unwrap();

        let mut conn = db::connect(&config).await.unwrap();
        for (name, mtime) in [("old.pdf", 100), ("new.pdf", 200)] {
            let id = store::persist(
                &mut conn,
                "pnt",
                name,
                Some(&format!("u://{name}")),
                &[],
                mtime,
                1,
            )
            .await
            .unwrap();
            store::index_text(&mut conn, id, "quarterly budget review")
                .await
                .unwrap();
        }
        conn.close().await.unwrap();

        let hits = run_search(&config, "budget", 0).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "new.pdf");
        assert!(hits[0].snippet.contains("[budget]"));

        let empty = run_search(&config, "budget", 1).await.unwrap();
        assert!(empty.is_empty());

        let none = run_search(&config, "nonexistent", 0).await.unwrap();
        assert!(none.is_empty());
    }
}
