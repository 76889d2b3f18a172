use std::env;
use std::path::PathBuf;

/// Endpoint and credential configuration loaded from environment variables.
/// Tunables (worker count, delays, backoff) come in via CLI flags and are
/// passed explicitly; they never live in process-wide state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog root, e.g. `https://norns.community`.
    pub base_url: String,

    /// Browserless endpoint for rendered discovery, e.g. `http://localhost:3000`.
    /// Empty disables the render method.
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    /// Optional GitHub bearer token; unauthenticated requests work but hit
    /// the low rate limit quickly.
    pub github_token: Option<String>,

    /// Directory for the dataset file and run logs.
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("NORNS_BASE_URL")
                .unwrap_or_else(|_| "https://norns.community".to_string()),
            browserless_url: env::var("BROWSERLESS_URL").unwrap_or_default(),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok().filter(|t| !t.is_empty()),
            github_token: env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
        }
    }

    pub fn render_enabled(&self) -> bool {
        !self.browserless_url.is_empty()
    }
}
