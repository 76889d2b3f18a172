pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use config::Config;
pub use error::{DiscoveryError, ScraperError};
pub use types::{
    is_blank, DemoCandidate, DemoStatus, DiscoveryMethod, Platform, ScriptRecord, SyncField,
};
