//! Error taxonomy for the crawl engine.
//!
//! Download and decode failures are *recoverable*: they prune the affected
//! document subtree and never abort the rest of the run unless the crawl is
//! configured with `fatal_errors`. The recursion matches on these variants
//! explicitly instead of treating every error the same way.

use thiserror::Error;

/// A failed fetch of a remote document. Always prunes just the affected
/// subtree; never aborts the pool.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// Fewer body bytes arrived than the declared Content-Length.
    #[error("short read fetching {url}: {received} of {expected} bytes")]
    ShortRead {
        url: String,
        expected: u64,
        received: u64,
    },

    #[error("request for {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("writing fetched body failed")]
    Io(#[from] std::io::Error),
}

/// A failed text extraction or container enumeration.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("archive error in {name}: {message}")]
    Archive { name: String, message: String },

    #[error("malformed XML in {entry}: {message}")]
    Xml { entry: String, message: String },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything that can go wrong while indexing one document node.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("cannot stat document: {0}")]
    Stat(#[from] std::io::Error),
}

impl IndexError {
    /// Recoverable errors prune the affected subtree and let siblings
    /// continue. Storage errors are not recoverable: the surrounding
    /// transaction can no longer be trusted.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, IndexError::Storage(_))
    }
}
