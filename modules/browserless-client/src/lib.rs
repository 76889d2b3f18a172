pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use tracing::debug;

/// Default settle time after DOM content load. Discourse threads hydrate
/// oneboxes (YouTube/Vimeo/SoundCloud embeds) from JS after the initial
/// document, so an immediate DOM dump misses exactly the links we want.
const DEFAULT_WAIT_MS: u64 = 3_000;

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    wait_ms: u64,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
            wait_ms: DEFAULT_WAIT_MS,
        }
    }

    /// Override the post-load settle time.
    pub fn with_wait_ms(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    /// Fetch fully-rendered HTML for a URL via the Browserless /content
    /// endpoint. A 429 from Browserless or the proxied site maps to
    /// `BrowserlessError::RateLimited`.
    pub async fn content(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({
            "url": url,
            "gotoOptions": { "waitUntil": "domcontentloaded", "timeout": 30_000 },
            "waitForTimeout": self.wait_ms,
        });

        debug!(url, wait_ms = self.wait_ms, "Rendering page via Browserless");

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(BrowserlessError::RateLimited {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
