//! The crawlable unit: one document, wherever its bytes come from.
//!
//! A Document is a closed set of variants behind one type: *Local* files
//! that already sit on disk, *Remote* resources that must be fetched first,
//! and *Temporary* files materialized out of a container member. Remote and
//! Temporary documents own their backing temp file; dropping the Document
//! releases it, on every path, exactly once. The ancestor chain is an
//! explicit ordered list of persisted row ids, so cycles are impossible by
//! construction.

use std::path::{Path, PathBuf};

use chrono::DateTime;
use tempfile::NamedTempFile;

use crate::error::{DecodeError, DownloadError};
use crate::formats::{self, Kind};

enum Origin {
    /// Already valid on disk; never deleted by the engine.
    Local(PathBuf),
    /// Empty until `download` succeeds; the fetched file is temporary
    /// storage, not the canonical source.
    Remote { fetched: Option<NamedTempFile> },
    /// Materialized from a container member.
    Temporary(NamedTempFile),
}

/// A remote resource linked from a document, indexed as its child.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

pub struct Document {
    repo: String,
    name: String,
    url: Option<String>,
    /// Persisted row ids of every ancestor, root first. Nonempty chain
    /// means no independent freshness state.
    ancestors: Vec<i64>,
    origin: Origin,
    /// Source mtime reported out of band (by a listing), trusted over the
    /// fetched file's own timestamp.
    listed_mtime: Option<i64>,
    /// Linked resources to index as children, in listing order.
    attachments: Vec<Attachment>,
    /// Memoized sniff result: outer None = not sniffed yet, inner None =
    /// unrecognized.
    kind: Option<Option<Kind>>,
    text: Option<String>,
    row_id: Option<i64>,
}

impl Document {
    pub fn local(repo: &str, name: &str, url: Option<String>, path: PathBuf) -> Self {
        Self {
            repo: repo.to_string(),
            name: name.to_string(),
            url,
            ancestors: Vec::new(),
            origin: Origin::Local(path),
            listed_mtime: None,
            attachments: Vec::new(),
            kind: None,
            text: None,
            row_id: None,
        }
    }

    pub fn remote(repo: &str, name: &str, url: String) -> Self {
        Self {
            repo: repo.to_string(),
            name: name.to_string(),
            url: Some(url),
            ancestors: Vec::new(),
            origin: Origin::Remote { fetched: None },
            listed_mtime: None,
            attachments: Vec::new(),
            kind: None,
            text: None,
            row_id: None,
        }
    }

    /// Trusts a listing-reported mtime, so freshness can be decided before
    /// any fetch.
    pub fn with_listed_mtime(mut self, mtime: Option<i64>) -> Self {
        self.listed_mtime = mtime;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn ancestors(&self) -> &[i64] {
        &self.ancestors
    }

    pub fn is_root(&self) -> bool {
        self.ancestors.is_empty()
    }

    pub fn row_id(&self) -> Option<i64> {
        self.row_id
    }

    pub fn set_row_id(&mut self, id: i64) {
        self.row_id = Some(id);
    }

    fn path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Local(p) => Some(p),
            Origin::Remote { fetched } => fetched.as_ref().map(|f| f.path()),
            Origin::Temporary(f) => Some(f.path()),
        }
    }

    /// Fetches a Remote document into a private temporary file; no-op for
    /// the other variants. The file's mtime is set from the response's
    /// Last-Modified so freshness checks see the source's clock.
    ///
    /// A non-success status or a body shorter than the declared
    /// Content-Length is a recoverable [`DownloadError`]; the partial file
    /// is discarded before returning.
    pub async fn download(&mut self, client: &reqwest::Client) -> Result<(), DownloadError> {
        let Origin::Remote { fetched } = &mut self.origin else {
            return Ok(());
        };
        if fetched.is_some() {
            return Ok(());
        }
        let url = self.url.clone().unwrap_or_default();

        let mut response = client
            .get(&url)
            .send()
            .await
            .map_err(|source| DownloadError::Http {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let expected = response.content_length();
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|dt| dt.timestamp());

        let mut file = NamedTempFile::new()?;
        let mut received: u64 = 0;
        loop {
            let chunk = response
                .chunk()
                .await
                .map_err(|source| DownloadError::Http {
                    url: url.clone(),
                    source,
                })?;
            let Some(chunk) = chunk else { break };
            std::io::Write::write_all(file.as_file_mut(), &chunk)?;
            received += chunk.len() as u64;
        }
        if let Some(expected) = expected {
            if received < expected {
                // `file` drops here, so the partial download is removed.
                return Err(DownloadError::ShortRead {
                    url,
                    expected,
                    received,
                });
            }
        }

        if let Some(mtime) = last_modified {
            let _ = filetime::set_file_mtime(
                file.path(),
                filetime::FileTime::from_unix_time(mtime, 0),
            );
        }

        *fetched = Some(file);
        Ok(())
    }

    /// Sniffed format, computed once per Document and cached.
    pub fn kind(&mut self) -> Option<Kind> {
        if let Some(cached) = self.kind {
            return cached;
        }
        let sniffed = self.path().and_then(formats::sniff);
        self.kind = Some(sniffed);
        sniffed
    }

    /// A document is interesting iff sniffing recognized its format.
    /// Uninteresting documents are skipped entirely but still count as
    /// visited.
    pub fn interesting(&mut self) -> bool {
        self.kind().is_some()
    }

    /// Extracts plain text via the decoder for the sniffed kind. Kinds
    /// without a text representation leave the text absent.
    pub fn read(&mut self) -> Result<(), DecodeError> {
        let Some(kind) = self.kind() else {
            return Ok(());
        };
        if let Some(path) = self.path() {
            self.text = formats::extract_text(path, kind)?;
        }
        Ok(())
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Modification time knowable without fetching anything: the listing's
    /// word for Remote documents, a stat for Local ones.
    pub fn mtime_hint(&self) -> Option<i64> {
        if self.listed_mtime.is_some() {
            return self.listed_mtime;
        }
        match &self.origin {
            Origin::Local(path) => stat_mtime(path).ok(),
            _ => None,
        }
    }

    /// Source modification time in whole seconds. A listing-reported mtime
    /// wins over the backing file's timestamp.
    pub fn mtime(&self) -> std::io::Result<i64> {
        if let Some(listed) = self.listed_mtime {
            return Ok(listed);
        }
        let Some(path) = self.path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "document has no backing file",
            ));
        };
        stat_mtime(path)
    }

    /// Starts the child sequence: attachments first, then container
    /// members. Lazy and non-restartable; each member's bytes hit disk
    /// only when the cursor reaches it, and each child carries this
    /// document's chain extended by its persisted id.
    ///
    /// Must be called after the document was persisted (children link to
    /// this row id).
    pub fn children(&mut self) -> Result<Children<'_>, DecodeError> {
        let kind = self.kind();
        let members = match (kind, self.path()) {
            (Some(kind), Some(path)) if kind.is_container() => formats::list_members(path, kind)?,
            _ => Vec::new(),
        };

        let mut chain = self.ancestors.clone();
        debug_assert!(self.row_id.is_some(), "children() before persist");
        if let Some(id) = self.row_id {
            chain.push(id);
        }

        let attachments = std::mem::take(&mut self.attachments);
        Ok(Children {
            doc: self,
            chain,
            attachments: attachments.into_iter(),
            members: members.into_iter(),
        })
    }
}

fn stat_mtime(path: &Path) -> std::io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0))
}

/// Cursor over a document's children. Holds no member bytes; every call to
/// [`Children::next_child`] materializes exactly one child.
pub struct Children<'a> {
    doc: &'a Document,
    chain: Vec<i64>,
    attachments: std::vec::IntoIter<Attachment>,
    members: std::vec::IntoIter<formats::Member>,
}

impl Children<'_> {
    pub fn next_child(&mut self) -> Result<Option<Document>, DecodeError> {
        if let Some(attachment) = self.attachments.next() {
            return Ok(Some(Document {
                repo: self.doc.repo.clone(),
                name: attachment.name,
                url: Some(attachment.url),
                ancestors: self.chain.clone(),
                origin: Origin::Remote { fetched: None },
                listed_mtime: None,
                attachments: Vec::new(),
                kind: None,
                text: None,
                row_id: None,
            }));
        }

        let Some(member) = self.members.next() else {
            return Ok(None);
        };
        let Some(path) = self.doc.path() else {
            return Ok(None);
        };
        let file = formats::materialize_member(path, &member)?;
        Ok(Some(Document {
            repo: self.doc.repo.clone(),
            name: member.name,
            url: None,
            ancestors: self.chain.clone(),
            origin: Origin::Temporary(file),
            listed_mtime: None,
            attachments: Vec::new(),
            kind: None,
            text: None,
            row_id: None,
        }))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("repo", &self.repo)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("depth", &self.ancestors.len())
            .finish()
    }
}
