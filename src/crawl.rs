//! The crawl engine: walks repo roots through the worker pool and keeps
//! the index consistent with what the sources currently hold.
//!
//! Every root is processed inside one transaction on its worker's private
//! connection. Container members recurse depth first under savepoints, so
//! a failing member rolls back exactly its own subtree while siblings and
//! the enclosing document survive. After all workers drain, one stale
//! sweep removes every document of the repo that this run did not see.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::document::Document;
use crate::error::IndexError;
use crate::pool::{TaskQueue, WorkerPool};
use crate::{db, migrate, repo, store};

const USER_AGENT: &str = concat!("spider/", env!("CARGO_PKG_VERSION"));

/// Counters shared by all workers of one run.
#[derive(Default)]
pub struct CrawlStats {
    pub visited: AtomicU64,
    pub indexed: AtomicU64,
    pub fresh: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
}

impl CrawlStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summarize(&self, removed: u64) -> CrawlSummary {
        CrawlSummary {
            visited: self.visited.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            fresh: self.fresh.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            removed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Documents reached, including fresh and uninteresting ones.
    pub visited: u64,
    /// Documents whose content landed in the index this run.
    pub indexed: u64,
    /// Roots left alone because their stored mtime still matches.
    pub fresh: u64,
    /// Documents with no recognized format.
    pub skipped: u64,
    /// Documents dropped after a recoverable error.
    pub failed: u64,
    /// Stale documents removed by the final sweep.
    pub removed: u64,
}

impl std::fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "visited {}, indexed {}, fresh {}, skipped {}, failed {}, removed {}",
            self.visited, self.indexed, self.fresh, self.skipped, self.failed, self.removed
        )
    }
}

/// Crawls one configured repo end to end and returns the run's counters.
///
/// The stale sweep runs whenever the scan completed, failed trees and
/// aborted workers included; only a partial scan skips it, since roots
/// that were never enqueued must not be removed.
pub async fn run_crawl(config: &Config, repo_name: &str) -> Result<CrawlSummary> {
    migrate::run_migrations(config).await?;
    let repo = repo::open(config, repo_name)?;

    // Millisecond watermark: every row this run writes or touches carries
    // it, and the sweep removes everything older.
    let run_start = Utc::now().timestamp_millis();
    let stats = Arc::new(CrawlStats::default());
    let workers = config.crawl.worker_count();

    let pool = {
        let config = config.clone();
        let stats = stats.clone();
        WorkerPool::spawn(workers, config.crawl.queue_depth, move |id, queue| {
            worker_loop(id, queue, config.clone(), stats.clone(), run_start)
        })
    };

    info!(repo = repo_name, workers, "crawl started");
    let scanned = repo.scan(&pool).await;
    // Drain the workers even when the scan failed part way.
    let joined = pool.join().await;

    // The sweep keys on the run watermark alone: documents without a
    // this-run touch go, whether their tree failed or their worker
    // aborted. Only a failed scan skips it, because roots that were never
    // enqueued must not be collected.
    let mut removed = 0;
    if scanned.is_ok() {
        let mut conn = db::connect(config).await?;
        removed = store::remove_stale(&mut conn, repo_name, run_start).await?;
        conn.close().await?;
    }

    // A scan failure caused by dead workers is a symptom, so the workers'
    // own error is reported first.
    joined?;
    let roots = scanned.context("scanning repo")?;

    let summary = stats.summarize(removed);
    info!(repo = repo_name, roots, %summary, "crawl finished");
    Ok(summary)
}

async fn worker_loop(
    id: usize,
    queue: TaskQueue<Document>,
    config: Config,
    stats: Arc<CrawlStats>,
    run_start: i64,
) -> Result<()> {
    let mut conn = db::connect(&config).await?;
    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let fatal = config.crawl.fatal_errors;

    while let Some(mut doc) = queue.next().await {
        debug!(worker = id, name = doc.name(), "processing root");
        match index_root(&mut conn, &client, &mut doc, run_start, &stats, fatal).await {
            Ok(()) => {}
            Err(err) if err.is_recoverable() && !fatal => {
                CrawlStats::bump(&stats.failed);
                warn!(worker = id, name = doc.name(), error = %err, "dropping root");
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("indexing '{}' failed", doc.name())));
            }
        }
    }

    conn.close().await?;
    Ok(())
}

/// One root, one transaction. Commits only a fully consistent subtree;
/// the indexed counter moves only for documents that actually committed.
async fn index_root(
    conn: &mut SqliteConnection,
    client: &reqwest::Client,
    doc: &mut Document,
    run_start: i64,
    stats: &CrawlStats,
    fatal: bool,
) -> Result<(), IndexError> {
    let mut tx = conn.begin().await?;
    match index_node(&mut tx, client, doc, run_start, stats, fatal).await {
        Ok(indexed) => {
            tx.commit().await?;
            stats.indexed.fetch_add(indexed, Ordering::Relaxed);
            Ok(())
        }
        Err(err) => {
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}

/// Indexes one document and recurses into its children, returning how many
/// documents its completed subtree persisted. The caller adds the count to
/// the stats only once the enclosing transaction commits, so rolled back
/// subtrees are never reported as indexed.
///
/// Returned as a boxed future because the recursion depth follows the
/// archive nesting, which is data dependent.
fn index_node<'a>(
    conn: &'a mut SqliteConnection,
    client: &'a reqwest::Client,
    doc: &'a mut Document,
    run_start: i64,
    stats: &'a CrawlStats,
    fatal: bool,
) -> Pin<Box<dyn Future<Output = Result<u64, IndexError>> + Send + 'a>> {
    Box::pin(async move {
        CrawlStats::bump(&stats.visited);
        debug!(
            name = doc.name(),
            depth = doc.ancestors().len(),
            "visiting"
        );

        // Only roots carry independent freshness state. When the mtime is
        // known up front (local stat, listing-reported), a fresh root is
        // decided before any fetch; touching moves the watermark so the
        // stale sweep passes its whole stored subtree by.
        let hint = doc.mtime_hint();
        if doc.is_root() {
            if let (Some(url), Some(mtime)) = (doc.url(), hint) {
                let url = url.to_string();
                if store::fresh(&mut *conn, &url, mtime).await? {
                    store::touch(&mut *conn, &url, run_start).await?;
                    CrawlStats::bump(&stats.fresh);
                    debug!(name = doc.name(), "fresh, nothing fetched");
                    return Ok(0);
                }
            }
        }

        doc.download(client).await?;

        if !doc.interesting() {
            CrawlStats::bump(&stats.skipped);
            debug!(name = doc.name(), "no recognized format");
            return Ok(0);
        }

        let mtime = doc.mtime()?;

        // Remote roots without a listing mtime can only be checked against
        // the fetched file's timestamp.
        if doc.is_root() && hint.is_none() {
            if let Some(url) = doc.url() {
                let url = url.to_string();
                if store::fresh(&mut *conn, &url, mtime).await? {
                    store::touch(&mut *conn, &url, run_start).await?;
                    CrawlStats::bump(&stats.fresh);
                    debug!(name = doc.name(), "fresh, index untouched");
                    return Ok(0);
                }
            }
        }

        doc.read()?;
        let id = store::persist(
            &mut *conn,
            doc.repo(),
            doc.name(),
            doc.url(),
            doc.ancestors(),
            mtime,
            run_start,
        )
        .await?;
        doc.set_row_id(id);
        if let Some(text) = doc.text() {
            store::index_text(&mut *conn, id, text).await?;
        }

        let mut indexed: u64 = 1;
        let mut children = doc.children()?;
        while let Some(mut child) = children.next_child()? {
            let mut savepoint = conn.begin().await?;
            let outcome =
                index_node(&mut savepoint, client, &mut child, run_start, stats, fatal).await;
            match outcome {
                Ok(n) => {
                    savepoint.commit().await?;
                    indexed += n;
                }
                Err(err) if err.is_recoverable() && !fatal => {
                    savepoint.rollback().await?;
                    CrawlStats::bump(&stats.failed);
                    warn!(name = child.name(), error = %err, "dropping member subtree");
                }
                Err(err) => {
                    let _ = savepoint.rollback().await;
                    return Err(err);
                }
            }
        }

        Ok(indexed)
    })
}
