//! Runtime configuration.
//!
//! Settings come from an optional YAML file; every field has a default so an
//! empty file (or no file at all) yields a working setup against tophub.today.
//! CLI flags override the sink locations, strategy and interval afterwards.
//!
//! ```yaml
//! category_urls:
//!   technological_info: https://tophub.today/c/tech
//! category_pages:
//!   technological_info: 25
//! snapshot_path: data/hot_search.csv
//! database: data/hotsearch.sqlite
//! table: hot_search
//! ```

use crate::fetcher::FetchStrategy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

pub const DEFAULT_ORIGIN: &str = "https://tophub.today";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("category `{id}` has {present} but no {missing}")]
    CategoryMismatch {
        id: String,
        present: &'static str,
        missing: &'static str,
    },
    #[error("category `{id}` has an invalid url: {source}")]
    InvalidUrl {
        id: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid origin `{origin}`: {source}")]
    InvalidOrigin {
        origin: String,
        #[source]
        source: url::ParseError,
    },
}

/// One tracked category: where its listing lives and how many pages it spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub url: Url,
    pub pages: u32,
}

/// Immutable category table, keyed by identifier.
///
/// Built from a URL map and a page-count map that must cover exactly the same
/// identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySpec {
    categories: BTreeMap<String, Category>,
}

impl CategorySpec {
    pub fn new(
        urls: &BTreeMap<String, String>,
        pages: &BTreeMap<String, u32>,
    ) -> Result<Self, ConfigError> {
        if let Some(id) = pages.keys().find(|id| !urls.contains_key(*id)) {
            return Err(ConfigError::CategoryMismatch {
                id: id.clone(),
                present: "a page count",
                missing: "url",
            });
        }

        let mut categories = BTreeMap::new();
        for (id, raw) in urls {
            let Some(&page_count) = pages.get(id) else {
                return Err(ConfigError::CategoryMismatch {
                    id: id.clone(),
                    present: "a url",
                    missing: "page count",
                });
            };
            let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
                id: id.clone(),
                source,
            })?;
            categories.insert(
                id.clone(),
                Category {
                    id: id.clone(),
                    url,
                    pages: page_count,
                },
            );
        }
        Ok(Self { categories })
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    /// Categories in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[cfg(test)]
    pub fn total_pages(&self) -> u64 {
        self.categories.values().map(|c| u64::from(c.pages)).sum()
    }
}

/// Raw, deserialized settings. See [`Settings::category_spec`] for validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Site origin that relative hrefs are resolved against.
    pub origin: String,
    pub category_urls: BTreeMap<String, String>,
    pub category_pages: BTreeMap<String, u32>,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub request_timeout_secs: u64,
    pub max_concurrent_requests: usize,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub strategy: FetchStrategy,
    pub snapshot_path: PathBuf,
    pub database: PathBuf,
    pub table: String,
    pub report_dir: Option<PathBuf>,
    pub interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let category_urls = [
            ("comprehensive_info", "https://tophub.today/c/news"),
            ("technological_info", "https://tophub.today/c/tech"),
            ("recreational_info", "https://tophub.today/c/ent"),
            ("communal_info", "https://tophub.today/c/community"),
            ("shop_info", "https://tophub.today/c/shopping"),
            ("financial_info", "https://tophub.today/c/finance"),
            ("newspaper_info", "https://tophub.today/c/epaper"),
        ];
        let category_pages = [
            ("comprehensive_info", 31),
            ("technological_info", 25),
            ("recreational_info", 29),
            ("communal_info", 23),
            ("shop_info", 11),
            ("financial_info", 14),
            ("newspaper_info", 10),
        ];
        let headers = [
            ("accept", "*/*"),
            ("accept-language", "zh-CN,zh;q=0.9"),
            ("priority", "u=1, i"),
            ("referer", "https://tophub.today/c/news"),
            (
                "sec-ch-ua",
                "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\"",
            ),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", "\"Windows\""),
            ("sec-fetch-dest", "empty"),
            ("sec-fetch-mode", "cors"),
            ("sec-fetch-site", "same-origin"),
            (
                "user-agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            ),
            ("x-requested-with", "XMLHttpRequest"),
        ];
        let cookies = [
            (
                "Hm_lvt_3b1e939f6e789219d8629de8a519eab9",
                "1715853553,1715855472,1715858860",
            ),
            ("Hm_lpvt_3b1e939f6e789219d8629de8a519eab9", "1715859056"),
        ];

        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            category_urls: owned_map(&category_urls),
            category_pages: category_pages
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            headers: owned_map(&headers),
            cookies: owned_map(&cookies),
            request_timeout_secs: 15,
            max_concurrent_requests: 16,
            max_retries: 2,
            retry_base_delay_ms: 500,
            strategy: FetchStrategy::Concurrent,
            snapshot_path: PathBuf::from("data/hot_search.csv"),
            database: PathBuf::from("data/hotsearch.sqlite"),
            table: "hot_search".to_string(),
            report_dir: None,
            interval_secs: 3600,
        }
    }
}

fn owned_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Settings {
    /// Load settings from `path`, or the defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using built-in defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document; treat it as "all defaults".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(raw)?;
        settings.category_spec()?;
        settings.origin_url()?;
        Ok(settings)
    }

    pub fn category_spec(&self) -> Result<CategorySpec, ConfigError> {
        CategorySpec::new(&self.category_urls, &self.category_pages)
    }

    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|source| ConfigError::InvalidOrigin {
            origin: self.origin.clone(),
            source,
        })
    }
}
