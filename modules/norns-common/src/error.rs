use thiserror::Error;

/// How a single discovery request failed. `RateLimited` is the only variant
/// the retry coordinator will re-attempt; everything else degrades that
/// method's candidate list to empty for the run.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("transient failure: {0}")]
    Transient(String),
}

impl DiscoveryError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DiscoveryError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
