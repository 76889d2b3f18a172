//! Second-pass retry for rate-limited discovery requests.
//!
//! Discovery fires many requests in a short window, so Discourse throttling
//! is expected. Retrying inline would serialize the whole batch behind one
//! hot host; instead the orchestrator drains the entire first pass, then
//! hands every `RateLimited` request here for one spaced retry pass.
//! Requests that fail again are terminal for the run: their method's
//! candidate list resolves as empty and the next run starts from scratch.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::discovery::{DemoRequest, Discoverer, DiscoveryResult};

/// Explicit retry configuration. Passed in, never process-wide state.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Inter-request spacing used by the first discovery pass.
    pub base_delay: Duration,
    /// Retry-pass spacing is `base_delay * multiplier`, floored at `min_delay`.
    pub multiplier: f64,
    /// Retries never run hotter than this, whatever the base spacing was.
    pub min_delay: Duration,
    /// Retry passes per request. The default single pass is deliberate; see
    /// module docs.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 3.0,
            min_delay: Duration::from_secs(2),
            max_attempts: 1,
        }
    }
}

impl RetryPolicy {
    pub fn retry_delay(&self) -> Duration {
        self.base_delay.mul_f64(self.multiplier).max(self.min_delay)
    }
}

pub struct RetryCoordinator {
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Retry every collected rate-limited request, serially, with increased
    /// spacing. Returns exactly one outcome per input request.
    ///
    /// Callers must only invoke this after the first pass has fully
    /// completed; the two-phase barrier is what keeps retries from
    /// amplifying first-pass rate pressure.
    pub async fn schedule(
        &self,
        failed: Vec<DemoRequest>,
        discoverer: &dyn Discoverer,
    ) -> Vec<(DemoRequest, DiscoveryResult)> {
        if failed.is_empty() {
            return Vec::new();
        }

        let delay = self.policy.retry_delay();
        info!(
            count = failed.len(),
            delay_ms = delay.as_millis() as u64,
            "Retrying rate-limited demo requests"
        );

        let mut results = Vec::with_capacity(failed.len());
        let mut recovered = 0usize;
        let mut still_failed = 0usize;

        for (i, request) in failed.into_iter().enumerate() {
            if i > 0 {
                sleep(delay).await;
            }

            let mut outcome = discoverer.discover(&request).await;
            let mut attempt = 1;
            while attempt < self.policy.max_attempts
                && matches!(&outcome, Err(e) if e.is_rate_limited())
            {
                sleep(delay).await;
                outcome = discoverer.discover(&request).await;
                attempt += 1;
            }

            match &outcome {
                Ok(_) => recovered += 1,
                Err(e) => {
                    still_failed += 1;
                    warn!(
                        url = request.discussion_url.as_str(),
                        method = %request.method,
                        error = %e,
                        "Retry failed, treating method as empty for this run"
                    );
                }
            }
            results.push((request, outcome));
        }

        info!(recovered, still_failed, "Retry pass complete");
        results
    }
}
