//! CMS repo: a paged JSON listing of site documents.
//!
//! The CMS exposes its content as a listing endpoint. Each listing page
//! carries the documents it knows about and a link to the next page; the
//! scan follows those links until they run out. A listed document may be
//! an HTML page or a plain file; either way it becomes a remote root, its
//! listing-reported mtime lets the crawl skip fetching when nothing
//! changed, and its attachments are indexed as children of the document
//! itself.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::CmsRepoConfig;
use crate::document::{Attachment, Document};
use crate::pool::WorkerPool;
use crate::repo::Repo;

/// Hard cap on listing pages, so a listing that links back to itself
/// cannot spin the scan forever.
const MAX_PAGES: usize = 10_000;

#[derive(Debug, Deserialize)]
struct ListingPage {
    #[serde(default)]
    documents: Vec<ListingEntry>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    title: String,
    url: String,
    /// Unix seconds of the document's last change, as the CMS reports it.
    #[serde(default)]
    mtime: Option<i64>,
    #[serde(default)]
    attachments: Vec<ListingAttachment>,
}

#[derive(Debug, Deserialize)]
struct ListingAttachment {
    title: String,
    url: String,
}

#[derive(Debug)]
pub struct CmsRepo {
    name: String,
    config: CmsRepoConfig,
    client: reqwest::Client,
}

impl CmsRepo {
    pub fn new(name: &str, config: CmsRepoConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<ListingPage> {
        let page = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("fetching listing page {url}"))?
            .json::<ListingPage>()
            .await
            .with_context(|| format!("parsing listing page {url}"))?;
        Ok(page)
    }
}

#[async_trait]
impl Repo for CmsRepo {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(&self, queue: &WorkerPool<Document>) -> Result<usize> {
        let mut enqueued = 0usize;
        let mut next = Some(self.config.list_url.clone());
        let mut pages = 0usize;

        while let Some(url) = next {
            pages += 1;
            if pages > MAX_PAGES {
                anyhow::bail!("listing exceeded {MAX_PAGES} pages, assuming a cycle");
            }
            let page = self.fetch_page(&url).await?;
            debug!(page = pages, documents = page.documents.len(), "listing page");
            for entry in page.documents {
                let attachments = entry
                    .attachments
                    .into_iter()
                    .map(|a| Attachment {
                        name: a.title,
                        url: a.url,
                    })
                    .collect();
                let doc = Document::remote(&self.name, &entry.title, entry.url)
                    .with_listed_mtime(entry.mtime)
                    .with_attachments(attachments);
                queue.enqueue(doc).await?;
                enqueued += 1;
            }
            // A page linking to itself would otherwise loop at full speed.
            next = page.next.filter(|n| *n != url);
        }
        Ok(enqueued)
    }
}
