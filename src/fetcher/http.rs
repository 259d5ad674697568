//! HTTP page source backed by `reqwest`.
//!
//! Every request carries the same static header set plus a `Cookie` header
//! built from the configured cookie map; the page index goes in the `p`
//! query parameter.

use super::FetchError;
use super::retry::PageSource;
use crate::config::Category;
use itertools::Itertools;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(
        headers: &BTreeMap<String, String>,
        cookies: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::Setup(format!("header name `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::Setup(format!("header `{name}`: {e}")))?;
            default_headers.insert(name, value);
        }
        if !cookies.is_empty() {
            let cookie = cookies.iter().map(|(k, v)| format!("{k}={v}")).join("; ");
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| FetchError::Setup(format!("cookie header: {e}")))?;
            default_headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Setup(e.to_string()))?;
        Ok(Self { client })
    }
}

impl PageSource for HttpPageSource {
    #[instrument(level = "debug", skip_all, fields(category = %category.id, page = page))]
    async fn fetch_page(&self, category: &Category, page: u32) -> Result<String, FetchError> {
        let request_error = |source| FetchError::Request {
            category: category.id.clone(),
            page,
            source,
        };

        let response = self
            .client
            .get(category.url.clone())
            .query(&[("p", page.to_string())])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                category: category.id.clone(),
                page,
                status,
            });
        }

        let body = response.text().await.map_err(request_error)?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
