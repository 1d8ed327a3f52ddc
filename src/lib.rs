//! Spider crawls document repositories into a SQLite full text index.
//!
//! Repos enumerate root documents (files on disk, downloads listed by a
//! CMS); the crawl engine fans them out over a worker pool, sniffs their
//! formats, extracts text, and recurses into archives and office files.
//! Incremental runs reuse fresh roots, replace changed ones, and sweep
//! out whatever the sources no longer hold.

pub mod config;
pub mod crawl;
pub mod db;
pub mod document;
pub mod error;
pub mod formats;
pub mod migrate;
pub mod pool;
pub mod repo;
pub mod repo_cms;
pub mod repo_fs;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;
