//! Repository abstraction: a named collection of root documents.
//!
//! A repo only knows how to enumerate its roots; everything below a root
//! (archive members, embedded documents) is discovered by the crawl itself.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::document::Document;
use crate::pool::WorkerPool;
use crate::repo_cms::CmsRepo;
use crate::repo_fs::LocalRepo;

#[async_trait]
pub trait Repo: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Streams this repo's root documents into the crawl queue, blocking on
    /// the queue's backpressure. Returns the number of roots enqueued.
    async fn scan(&self, queue: &WorkerPool<Document>) -> Result<usize>;
}

/// Looks a repo up by name across the configured repo kinds.
pub fn open(config: &Config, name: &str) -> Result<Box<dyn Repo>> {
    if let Some(local) = config.repos.local.get(name) {
        return Ok(Box::new(LocalRepo::new(name, local.clone())?));
    }
    if let Some(cms) = config.repos.cms.get(name) {
        return Ok(Box::new(CmsRepo::new(name, cms.clone())));
    }
    let known = config.repo_names().join(", ");
    bail!("unknown repo '{name}' (configured repos: {known})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, CrawlConfig, DbConfig, LocalRepoConfig, ReposConfig};

    fn config_with_local() -> Config {
        let mut repos = ReposConfig::default();
        repos.local.insert(
            "pnt".to_string(),
            LocalRepoConfig {
                base: "/srv/files".into(),
                base_url: "https://files.example.org/".to_string(),
                include_globs: Vec::new(),
                exclude_globs: Vec::new(),
            },
        );
        Config {
            db: DbConfig {
                path: "/tmp/spider.sqlite".into(),
            },
            crawl: CrawlConfig::default(),
            repos,
        }
    }

    #[test]
    fn open_resolves_configured_repo() {
        let config = config_with_local();
        let repo = open(&config, "pnt").unwrap();
        assert_eq!(repo.name(), "pnt");
    }

    #[test]
    fn open_rejects_unknown_repo() {
        let config = config_with_local();
        let err = open(&config, "nope").unwrap_err();
        assert!(err.to_string().contains("pnt"));
    }
}
