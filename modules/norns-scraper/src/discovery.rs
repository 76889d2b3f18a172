//! Dual-method demo discovery for a discussion thread.
//!
//! Two independent page sources feed the same candidate extractor: a plain
//! HTTP fetch (`StaticFetcher`) and a Browserless-rendered fetch
//! (`RenderedFetcher`). The core never parses or fetches on its own; it
//! consumes per-method candidate lists or an explicit failure
//! classification (`RateLimited` is retryable, `Transient` is not).

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use browserless_client::{BrowserlessClient, BrowserlessError};
use norns_common::{DemoCandidate, DiscoveryError, DiscoveryMethod};

use crate::extract::extract_candidates;

/// Discovery request descriptor: enough to re-issue the request in the
/// retry pass and to route its result back to the right script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoRequest {
    /// Identity key of the script the request belongs to.
    pub script_key: String,
    pub discussion_url: String,
    pub method: DiscoveryMethod,
}

/// One method's discovery result for one script.
pub type DiscoveryResult = Result<Vec<DemoCandidate>, DiscoveryError>;

// ---------------------------------------------------------------------------
// PageSource: how one method obtains discussion-page HTML
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, DiscoveryError>;
    fn method(&self) -> DiscoveryMethod;
}

/// Static-HTML fetch. Each worker owns its own instance (and its own
/// reqwest client), so cookies or connection failures stay isolated.
pub struct StaticFetcher {
    client: reqwest::Client,
}

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

impl StaticFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }
}

impl Default for StaticFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageSource for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, DiscoveryError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Transient(e.to_string()))?;

        let status = resp.status().as_u16();
        // Discourse answers hot crawlers with 429; some deployments use 403.
        if status == 429 || status == 403 {
            return Err(DiscoveryError::RateLimited { status });
        }
        if !resp.status().is_success() {
            return Err(DiscoveryError::Transient(format!("HTTP {status}")));
        }
        resp.text()
            .await
            .map_err(|e| DiscoveryError::Transient(e.to_string()))
    }

    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Extract
    }
}

/// Browser-rendered fetch via Browserless; sees oneboxes and players that
/// only exist after JS runs.
pub struct RenderedFetcher {
    client: BrowserlessClient,
}

impl RenderedFetcher {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: BrowserlessClient::new(base_url, token),
        }
    }
}

#[async_trait]
impl PageSource for RenderedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, DiscoveryError> {
        self.client.content(url).await.map_err(|e| match e {
            BrowserlessError::RateLimited { status } => DiscoveryError::RateLimited { status },
            other => DiscoveryError::Transient(other.to_string()),
        })
    }

    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Render
    }
}

// ---------------------------------------------------------------------------
// Discoverer: fetch + extract, dispatched by method
// ---------------------------------------------------------------------------

/// Executes discovery requests. The orchestrator's first pass and the retry
/// coordinator's second pass go through the same trait, and tests swap in a
/// mock: no network, no Browserless.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, request: &DemoRequest) -> DiscoveryResult;
}

/// Production discoverer: routes a request to the right page source, then
/// runs candidate extraction over whatever HTML came back. A disabled
/// render method reports an empty candidate list (`CollaboratorAbsent`
/// semantics, not a failure).
pub struct SourcePair {
    rendered_source: Option<RenderedFetcher>,
}

impl SourcePair {
    pub fn new(rendered_source: Option<RenderedFetcher>) -> Self {
        Self { rendered_source }
    }
}

#[async_trait]
impl Discoverer for SourcePair {
    async fn discover(&self, request: &DemoRequest) -> DiscoveryResult {
        let html = match request.method {
            // A fresh fetcher per request keeps worker sessions isolated;
            // Browserless isolates per-request browser contexts on its side.
            DiscoveryMethod::Extract => {
                StaticFetcher::new().fetch(&request.discussion_url).await?
            }
            DiscoveryMethod::Render => match &self.rendered_source {
                Some(source) => source.fetch(&request.discussion_url).await?,
                None => return Ok(Vec::new()),
            },
        };

        let candidates = extract_candidates(&html, request.method);
        if candidates.is_empty() {
            debug!(
                url = request.discussion_url.as_str(),
                method = %request.method,
                "No demo candidates found"
            );
        } else {
            info!(
                url = request.discussion_url.as_str(),
                method = %request.method,
                count = candidates.len(),
                top = candidates[0].url.as_str(),
                "Found demo candidates"
            );
        }
        Ok(candidates)
    }
}
