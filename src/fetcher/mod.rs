//! Fetching raw category pages.
//!
//! A [`Fetcher`] turns a [`CategorySpec`] into a [`DocumentBlob`]: one
//! fragment per requested page, in completion order. Failures never abort a
//! run; each failed page (or category) contributes a diagnostic marker
//! fragment instead, so the blob always accounts for every request made.
//!
//! # Strategies
//!
//! | Strategy | Categories | Pages |
//! |----------|------------|-------|
//! | [`FetchStrategy::Sequential`] | one after another, id order | in index order |
//! | [`FetchStrategy::Concurrent`] | one spawned task each | `buffer_unordered` |
//!
//! Both produce the same fragments; only their order differs. The concurrent
//! strategy shares one semaphore across all categories so the total number of
//! requests in flight never exceeds `max_concurrent_requests`.

pub mod http;
pub mod retry;

use crate::config::{Category, CategorySpec, Settings};
use futures::stream::{self, StreamExt};
use http::HttpPageSource;
use retry::{PageSource, RetryFetch};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tracing::{error, info, instrument, warn};

/// Marker substituted for a category that is not in the [`CategorySpec`].
pub const INVALID_CATEGORY: &str = "Invalid category";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("request for {category} page {page} failed: {source}")]
    Request {
        category: String,
        page: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("{category} page {page} returned HTTP {status}")]
    Status {
        category: String,
        page: u32,
        status: reqwest::StatusCode,
    },
    #[error("invalid http client setup: {0}")]
    Setup(String),
}

impl FetchError {
    /// Timeouts, connection failures and 5xx/429 responses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request { source, .. } => {
                source.is_timeout()
                    || source.is_connect()
                    || source.status().is_some_and(|s| s.is_server_error())
            }
            FetchError::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            FetchError::UnknownCategory(_) | FetchError::Setup(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    Sequential,
    #[default]
    Concurrent,
}

/// One piece of a [`DocumentBlob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Body of a successfully fetched page.
    Page {
        category: String,
        page: u32,
        body: String,
    },
    /// Inline placeholder for a request that failed.
    Diagnostic(String),
}

impl Fragment {
    pub fn text(&self) -> &str {
        match self {
            Fragment::Page { body, .. } => body,
            Fragment::Diagnostic(marker) => marker,
        }
    }

    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Fragment::Diagnostic(_))
    }

    fn page_failed(page: u32, error: &FetchError) -> Self {
        Fragment::Diagnostic(format!("\nPage {page} generated an exception: {error}"))
    }

    fn category_failed(category: &str, error: impl std::fmt::Display) -> Self {
        Fragment::Diagnostic(format!("\n{category} generated an exception: {error}"))
    }
}

/// Everything fetched in one pass, in the order fragments arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentBlob {
    fragments: Vec<Fragment>,
}

impl DocumentBlob {
    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    pub fn append(&mut self, other: DocumentBlob) {
        self.fragments.extend(other.fragments);
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn diagnostics(&self) -> usize {
        self.fragments.iter().filter(|f| f.is_diagnostic()).count()
    }

    /// The whole blob as one string, fragments concatenated in order.
    #[cfg(test)]
    pub fn text(&self) -> String {
        self.fragments.iter().map(Fragment::text).collect()
    }
}

impl From<Vec<Fragment>> for DocumentBlob {
    fn from(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }
}

/// Fetches category pages through a [`PageSource`].
pub struct Fetcher<S = RetryFetch<HttpPageSource>> {
    spec: Arc<CategorySpec>,
    source: Arc<S>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

impl<S> Clone for Fetcher<S> {
    fn clone(&self) -> Self {
        Self {
            spec: Arc::clone(&self.spec),
            source: Arc::clone(&self.source),
            permits: Arc::clone(&self.permits),
            max_in_flight: self.max_in_flight,
        }
    }
}

impl<S> std::fmt::Debug for Fetcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("categories", &self.spec.len())
            .field("max_in_flight", &self.max_in_flight)
            .finish()
    }
}

impl Fetcher {
    /// HTTP fetcher with retry, configured from `settings`.
    pub fn from_settings(spec: CategorySpec, settings: &Settings) -> Result<Self, FetchError> {
        let http = HttpPageSource::new(
            &settings.headers,
            &settings.cookies,
            Duration::from_secs(settings.request_timeout_secs),
        )?;
        let source = RetryFetch::new(
            http,
            settings.max_retries,
            Duration::from_millis(settings.retry_base_delay_ms),
        );
        Ok(Self::new(spec, source, settings.max_concurrent_requests))
    }
}

impl<S> Fetcher<S>
where
    S: PageSource + 'static,
{
    pub fn new(spec: CategorySpec, source: S, max_concurrent_requests: usize) -> Self {
        let max_in_flight = max_concurrent_requests.max(1);
        Self {
            spec: Arc::new(spec),
            source: Arc::new(source),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    /// Fetch one page of category `id`.
    ///
    /// Waits for a slot on the shared request semaphore, then asks the page
    /// source for the body.
    ///
    /// # Arguments
    ///
    /// * `id` - Category identifier, as listed in the [`CategorySpec`]
    /// * `page` - 0-based page index, sent as the `p` query parameter
    ///
    /// # Returns
    ///
    /// The response body, [`FetchError::UnknownCategory`] for an id outside
    /// the spec, or the source's error once retries are exhausted.
    pub async fn fetch_page(&self, id: &str, page: u32) -> Result<String, FetchError> {
        let category = self
            .spec
            .get(id)
            .ok_or_else(|| FetchError::UnknownCategory(id.to_string()))?;
        // The semaphore is never closed, so acquiring only waits.
        let _permit = self.permits.acquire().await;
        self.source.fetch_page(category, page).await
    }

    async fn page_fragment(&self, category: &Category, page: u32) -> Fragment {
        match self.fetch_page(&category.id, page).await {
            Ok(body) => Fragment::Page {
                category: category.id.clone(),
                page,
                body,
            },
            Err(e) => {
                warn!(category = %category.id, page, error = %e, "Page fetch failed; substituting diagnostic");
                Fragment::page_failed(page, &e)
            }
        }
    }

    /// Fetch every page of category `id`.
    ///
    /// Always returns a blob: failed pages become diagnostic fragments and an
    /// unknown id yields a blob holding only [`INVALID_CATEGORY`].
    ///
    /// # Arguments
    ///
    /// * `id` - Category identifier
    /// * `strategy` - Pages in index order, or up to `max_concurrent_requests`
    ///   at once in completion order
    ///
    /// # Returns
    ///
    /// One fragment per page `0..pages`.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_category(&self, id: &str, strategy: FetchStrategy) -> DocumentBlob {
        let Some(category) = self.spec.get(id) else {
            warn!("Unknown category requested");
            return DocumentBlob::from(vec![Fragment::Diagnostic(INVALID_CATEGORY.to_string())]);
        };

        let fragments: Vec<Fragment> = match strategy {
            FetchStrategy::Sequential => {
                let mut fragments = Vec::with_capacity(category.pages as usize);
                for page in 0..category.pages {
                    fragments.push(self.page_fragment(category, page).await);
                }
                fragments
            }
            FetchStrategy::Concurrent => {
                stream::iter(0..category.pages)
                    .map(|page| self.page_fragment(category, page))
                    .buffer_unordered(self.max_in_flight)
                    .collect()
                    .await
            }
        };

        let blob = DocumentBlob::from(fragments);
        info!(
            pages = category.pages,
            failed = blob.diagnostics(),
            "Fetched category"
        );
        blob
    }

    /// Fetch every page of every category.
    ///
    /// # Arguments
    ///
    /// * `strategy` - [`FetchStrategy::Sequential`] walks categories in id
    ///   order; [`FetchStrategy::Concurrent`] spawns one task per category
    ///
    /// # Returns
    ///
    /// A blob with one fragment per configured page across all categories.
    /// Both strategies yield the same fragments, in different orders.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_all(&self, strategy: FetchStrategy) -> DocumentBlob {
        let blob = match strategy {
            FetchStrategy::Sequential => {
                let mut blob = DocumentBlob::default();
                for category in self.spec.iter() {
                    blob.append(self.fetch_category(&category.id, strategy).await);
                }
                blob
            }
            FetchStrategy::Concurrent => self.fetch_all_concurrent().await,
        };

        info!(
            categories = self.spec.len(),
            fragments = blob.len(),
            failed = blob.diagnostics(),
            "Fetched all categories"
        );
        blob
    }

    /// One spawned task per category; results are funneled through a channel
    /// to this task, which is the only writer of the blob.
    async fn fetch_all_concurrent(&self) -> DocumentBlob {
        let (tx, mut rx) = mpsc::channel::<DocumentBlob>(self.spec.len().max(1));

        let mut handles = Vec::with_capacity(self.spec.len());
        for category in self.spec.iter() {
            let fetcher = self.clone();
            let tx = tx.clone();
            let id = category.id.clone();
            let handle = tokio::spawn(async move {
                let blob = fetcher
                    .fetch_category(&id, FetchStrategy::Concurrent)
                    .await;
                let _ = tx.send(blob).await;
            });
            handles.push((category.id.clone(), handle));
        }

        // Drop our copy of tx so rx closes when all spawned tasks finish
        drop(tx);

        let mut blob = DocumentBlob::default();
        while let Some(part) = rx.recv().await {
            blob.append(part);
        }

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                error!(category = %id, error = %e, "Category task failed");
                blob.push(Fragment::category_failed(&id, e));
            }
        }
        blob
    }
}
