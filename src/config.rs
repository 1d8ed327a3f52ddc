use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub repos: ReposConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    /// Worker count; defaults to the number of available CPU cores.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Capacity of the shared task queue. The producer blocks when full.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// When true, a recoverable document error terminates its worker and the
    /// run exits non-zero; when false, errors are logged and skipped.
    #[serde(default)]
    pub fatal_errors: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: None,
            queue_depth: default_queue_depth(),
            fatal_errors: false,
        }
    }
}

fn default_queue_depth() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReposConfig {
    #[serde(default)]
    pub local: BTreeMap<String, LocalRepoConfig>,
    #[serde(default)]
    pub cms: BTreeMap<String, CmsRepoConfig>,
}

/// A filesystem tree mapped onto a public URL space.
#[derive(Debug, Deserialize, Clone)]
pub struct LocalRepoConfig {
    pub base: PathBuf,
    /// Base URL joined with each file's path relative to `base`.
    pub base_url: String,
    /// Empty means every file is walked.
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

/// A CMS content listing paged over HTTP.
#[derive(Debug, Deserialize, Clone)]
pub struct CmsRepoConfig {
    /// First page of the JSON document listing.
    pub list_url: String,
}

impl CrawlConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        })
    }
}

impl Config {
    pub fn has_repo(&self, name: &str) -> bool {
        self.repos.local.contains_key(name) || self.repos.cms.contains_key(name)
    }

    pub fn repo_names(&self) -> Vec<String> {
        self.repos
            .local
            .keys()
            .chain(self.repos.cms.keys())
            .cloned()
            .collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Some(workers) = config.crawl.workers {
        if workers == 0 {
            anyhow::bail!("crawl.workers must be > 0");
        }
    }

    if config.crawl.queue_depth == 0 {
        anyhow::bail!("crawl.queue_depth must be > 0");
    }

    for (name, repo) in &config.repos.local {
        if repo.base.as_os_str().is_empty() {
            anyhow::bail!("repos.local.{}.base must not be empty", name);
        }
    }

    Ok(config)
}
