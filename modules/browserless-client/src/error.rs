use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Network error: {0}")]
    Network(String),

    /// Browserless (or the upstream site, proxied through it) signalled
    /// throttling. Distinct from `Api` so callers can schedule a retry pass.
    #[error("Rate limited (status {status})")]
    RateLimited { status: u16 },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl BrowserlessError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BrowserlessError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        BrowserlessError::Network(err.to_string())
    }
}
