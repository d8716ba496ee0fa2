//! Async STAC Item Search client
//!
//! One [`StacClient`] talks to one catalog. Every request goes through the
//! same retry loop: transport failures and 5xx answers are retried with
//! exponential backoff, 4xx answers fail at once. Assets are fetched whole;
//! on Planetary Computer the href is signed first.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CloudError, Result};
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

const PC_STAC_ROOT: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";
const PC_SIGN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";
const EARTH_SEARCH_ROOT: &str = "https://earth-search.aws.element84.com/v1";

/// Error bodies are cut to this many characters in messages
const BODY_PREVIEW: usize = 300;

/// Which STAC API to search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer; assets need a SAS signature
    PlanetaryComputer,
    /// Element 84 Earth Search on AWS
    EarthSearch,
    /// Any other STAC API, by root URL or full `/search` URL
    Custom(String),
}

impl StacCatalog {
    /// `pc` / `es` shorthands, anything else is taken as a URL
    pub fn from_str_or_url(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.trim().to_string()),
        }
    }

    /// POST endpoint of Item Search
    pub fn search_url(&self) -> String {
        let root = match self {
            Self::PlanetaryComputer => PC_STAC_ROOT,
            Self::EarthSearch => EARTH_SEARCH_ROOT,
            Self::Custom(url) => url.trim_end_matches('/'),
        };
        if root.ends_with("/search") {
            root.to_string()
        } else {
            format!("{root}/search")
        }
    }

    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }
}

/// Limits applied to every [`StacClient`] request
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    pub request_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Items collected across all pages of one search
    pub max_items: usize,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_items: 100,
        }
    }
}

/// How to fetch the page behind a `next` link
#[derive(Debug, Clone, PartialEq)]
pub enum NextPage {
    Get(String),
    Post { url: String, body: Value },
}

/// Resolve a `next` link against the search that produced it.
///
/// POST links carry their own body, or, with `merge`, a patch over the
/// original search body. Links without a method are GET.
pub fn next_page(link: &StacLink, params: &StacSearchParams) -> Result<NextPage> {
    let is_post = link.method.as_deref().is_some_and(|m| m.eq_ignore_ascii_case("POST"));
    if !is_post {
        return Ok(NextPage::Get(link.href.clone()));
    }

    let original = || {
        serde_json::to_value(params).map_err(|e| CloudError::InvalidResponse(format!("search body: {e}")))
    };
    let body = match (&link.body, link.merge.unwrap_or(false)) {
        (Some(patch), true) => {
            let mut base = original()?;
            if let (Some(base), Some(patch)) = (base.as_object_mut(), patch.as_object()) {
                base.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            base
        }
        (Some(body), false) => body.clone(),
        (None, _) => original()?,
    };
    Ok(NextPage::Post {
        url: link.href.clone(),
        body,
    })
}

/// Async client for one STAC catalog
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("building HTTP client: {e}")))?;
        Ok(Self {
            catalog,
            client,
            options,
        })
    }

    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    /// One page of results
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        let resp = self
            .send("STAC search", || self.client.post(&url).json(params))
            .await?;
        read_page(resp).await
    }

    /// Follow `next` links until the catalog runs out or `max_items` is reached
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let max = self.options.max_items;
        let mut items = Vec::new();
        let mut page = self.search(params).await?;

        loop {
            let next = page.next_link().cloned();
            items.append(&mut page.features);
            if items.len() >= max {
                if next.is_some() || items.len() > max {
                    warn!(max, "STAC search truncated at max_items");
                }
                items.truncate(max);
                break;
            }
            let Some(link) = next else { break };

            page = self.fetch_page(&next_page(&link, params)?).await?;
            if page.is_empty() {
                break;
            }
        }

        debug!(items = items.len(), catalog = ?self.catalog, "STAC search complete");
        Ok(items)
    }

    /// Signed URL for `href`; unchanged when the catalog needs no signing
    pub async fn sign_asset_href(&self, href: &str) -> Result<String> {
        if !self.catalog.needs_signing() {
            return Ok(href.to_string());
        }

        let resp = self
            .send("asset signing", || self.client.get(PC_SIGN_URL).query(&[("href", href)]))
            .await
            .map_err(|e| CloudError::Auth(e.to_string()))?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| CloudError::Auth(format!("sign response: {e}")))?;
        body["href"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CloudError::Auth("sign response has no href".into()))
    }

    /// `length` bytes of `url` from `offset`, through an HTTP Range request
    pub async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        let resp = self
            .send("range read", || {
                self.client.get(url).header(reqwest::header::RANGE, range.as_str())
            })
            .await?;
        if resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            // Signed URLs carry their token in the query string
            let bare = url.split('?').next().unwrap_or(url);
            return Err(CloudError::RangeNotSupported(bare.to_string()));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CloudError::Network(format!("range body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_page(&self, next: &NextPage) -> Result<StacItemCollection> {
        let resp = match next {
            NextPage::Get(url) => self.send("STAC next page", || self.client.get(url)).await?,
            NextPage::Post { url, body } => {
                self.send("STAC next page", || self.client.post(url).json(body))
                    .await?
            }
        };
        read_page(resp).await
    }

    /// Send the request built by `build`, retrying transient failures
    async fn send<F>(&self, what: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let err = match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let body: String = resp.text().await.unwrap_or_default().chars().take(BODY_PREVIEW).collect();
                    let err = CloudError::Network(format!("{what} returned HTTP {status}: {body}"));
                    if status.is_client_error() {
                        return Err(err);
                    }
                    err
                }
                Err(e) => CloudError::Network(format!("{what} failed: {e}")),
            };

            if attempt >= self.options.max_retries {
                return Err(err);
            }
            attempt += 1;
            warn!(attempt, "{err}; retrying");
            tokio::time::sleep(backoff(attempt)).await;
        }
    }
}

async fn read_page(resp: reqwest::Response) -> Result<StacItemCollection> {
    let text = resp
        .text()
        .await
        .map_err(|e| CloudError::Network(format!("response body: {e}")))?;
    serde_json::from_str(&text).map_err(|e| CloudError::InvalidResponse(format!("STAC page: {e}")))
}

/// 500 ms, 1 s, 2 s, ... capped at 32 s
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 << attempt.saturating_sub(1).min(6))
}
