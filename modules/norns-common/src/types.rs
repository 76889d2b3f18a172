use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::normalize::url_path;

// --- Enums ---

/// Which of the two discovery techniques produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Extract,
    Render,
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryMethod::Extract => write!(f, "extract"),
            DiscoveryMethod::Render => write!(f, "render"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    YouTube,
    Vimeo,
    SoundCloud,
    Instagram,
    Unknown,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::YouTube => write!(f, "youtube"),
            Platform::Vimeo => write!(f, "vimeo"),
            Platform::SoundCloud => write!(f, "soundcloud"),
            Platform::Instagram => write!(f, "instagram"),
            Platform::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of demo conflict resolution for one script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoStatus {
    NoConflict,
    PlaywrightPreferred,
    ExtractPreferred,
    ManualOverride,
    MissingDemo,
}

impl std::fmt::Display for DemoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemoStatus::NoConflict => write!(f, "No Conflict"),
            DemoStatus::PlaywrightPreferred => write!(f, "Playwright Preferred"),
            DemoStatus::ExtractPreferred => write!(f, "Extract Preferred"),
            DemoStatus::ManualOverride => write!(f, "Manual Override"),
            DemoStatus::MissingDemo => write!(f, "Missing Demo"),
        }
    }
}

/// Fields the sync comparator may flag as disagreeing with the live source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncField {
    Name,
    Authors,
    Tags,
    Description,
    Demo,
    DiscussionUrl,
    ProjectUrl,
}

impl std::fmt::Display for SyncField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncField::Name => write!(f, "Name"),
            SyncField::Authors => write!(f, "Author"),
            SyncField::Tags => write!(f, "Tags"),
            SyncField::Description => write!(f, "Description"),
            SyncField::Demo => write!(f, "Demo"),
            SyncField::DiscussionUrl => write!(f, "Discussion URL"),
            SyncField::ProjectUrl => write!(f, "Project URL"),
        }
    }
}

// --- Records ---

/// One media URL found by one discovery method. Transient: produced and
/// consumed within a single reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoCandidate {
    pub url: String,
    pub platform: Platform,
    pub method: DiscoveryMethod,
}

/// One entry in the dataset.
///
/// `community_url` is the identity key (normalized by path); `name` is the
/// fallback when it is blank. `demo_status` is `None` until a merge pass has
/// run demo resolution for the script, then always one of the five values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub name: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub demo_url: Option<String>,
    #[serde(default)]
    pub discussion_url: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    pub community_url: String,
    #[serde(default)]
    pub demo_status: Option<DemoStatus>,
    #[serde(default)]
    pub last_updated: Option<NaiveDate>,
    #[serde(default)]
    pub out_of_sync: BTreeSet<SyncField>,
}

impl ScriptRecord {
    /// Bare record for a script discovered on the index page.
    pub fn new(name: impl Into<String>, community_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authors: Vec::new(),
            tags: BTreeSet::new(),
            description: String::new(),
            demo_url: None,
            discussion_url: None,
            project_url: None,
            community_url: community_url.into(),
            demo_status: None,
            last_updated: None,
            out_of_sync: BTreeSet::new(),
        }
    }

    /// Identity key: community-URL path when present, else the name.
    /// Stable across runs; two records with the same key are the same script.
    pub fn merge_key(&self) -> String {
        let path = url_path(&self.community_url);
        if path.is_empty() {
            format!("name:{}", self.name)
        } else {
            format!("url:{path}")
        }
    }

    /// True once every scrapeable field is populated and the demo status is
    /// resolved; such a script is skipped entirely on incremental runs.
    pub fn is_complete(&self) -> bool {
        !is_blank(&self.name)
            && !self.authors.is_empty()
            && !self.tags.is_empty()
            && !is_blank(&self.description)
            && self.discussion_url.as_deref().is_some_and(|u| !is_blank(u))
            && self.project_url.as_deref().is_some_and(|u| !is_blank(u))
            && self.demo_status.is_some()
    }
}

/// The blank predicate: a string-valued field is blank iff it is empty after
/// trimming. Collections are blank iff empty; options are blank iff `None`
/// or wrapping a blank value. Fixed here once, not re-derived per field.
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_key_prefers_url_path() {
        let rec = ScriptRecord::new("mxsynths", "https://norns.community/mxsynths/");
        assert_eq!(rec.merge_key(), "url:mxsynths");
    }

    #[test]
    fn merge_key_falls_back_to_name() {
        let rec = ScriptRecord::new("orphan", "");
        assert_eq!(rec.merge_key(), "name:orphan");
    }

    #[test]
    fn incomplete_without_demo_status() {
        let mut rec = ScriptRecord::new("awake", "https://norns.community/awake");
        rec.authors = vec!["tehn".into()];
        rec.tags = ["sequencer".to_string()].into_iter().collect();
        rec.description = "a sequencer".into();
        rec.discussion_url = Some("https://llllllll.co/t/awake/21022".into());
        rec.project_url = Some("https://github.com/tehn/awake".into());
        assert!(!rec.is_complete());

        rec.demo_status = Some(DemoStatus::NoConflict);
        assert!(rec.is_complete());
    }
}
