//! Filesystem repo: a directory tree mapped onto a public URL space.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::LocalRepoConfig;
use crate::document::Document;
use crate::pool::WorkerPool;
use crate::repo::Repo;

#[derive(Debug)]
pub struct LocalRepo {
    name: String,
    config: LocalRepoConfig,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob: {pattern}"))?);
    }
    Ok(Some(builder.build()?))
}

impl LocalRepo {
    pub fn new(name: &str, config: LocalRepoConfig) -> Result<Self> {
        let include = build_globset(&config.include_globs)?;
        let exclude = build_globset(&config.exclude_globs)?;
        Ok(Self {
            name: name.to_string(),
            config,
            include,
            exclude,
        })
    }

    fn matches(&self, relative: &Path) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(relative) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.is_match(relative),
            None => true,
        }
    }

    /// Public URL for a file: the base URL joined with the relative path,
    /// always using forward slashes.
    fn url_for(&self, relative: &Path) -> String {
        let rel = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/{rel}")
    }
}

#[async_trait]
impl Repo for LocalRepo {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, queue: &WorkerPool<Document>) -> Result<usize> {
        let mut enqueued = 0usize;
        // Deterministic enumeration order: directories and files sorted by
        // name at every level.
        for entry in WalkDir::new(&self.config.base)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(&self.config.base) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            if !self.matches(relative) {
                debug!(path = %relative.display(), "excluded by glob");
                continue;
            }
            let name = relative.display().to_string();
            let url = self.url_for(relative);
            let doc = Document::local(&self.name, &name, Some(url), entry.path().to_path_buf());
            queue.enqueue(doc).await?;
            enqueued += 1;
        }
        Ok(enqueued)
    }
}
