//! norns.community catalog client: index-page script links and per-script
//! metadata tables.
//!
//! The catalog is static markup, so extraction is regex mining over raw
//! HTML. Script pages carry their metadata in a single key/value table
//! (`Project Name:`, `Author:`, `Tags:`, ...).

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use norns_common::ScriptRecord;

use crate::extract::decode_entities;

static RE_HREF_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).unwrap());

static RE_TD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<td[^>]*>(.*?)</td>").unwrap());

static RE_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<a\b[^>]*>(.*?)</a>").unwrap());

static RE_TAG_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a\b[^>]*class\s*=\s*["'][^"']*project-tag[^"']*["'][^>]*>(.*?)</a>"#)
        .unwrap()
});

static RE_TAG_MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// One entry on the index page: URL path (stable key) plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLink {
    pub name: String,
    pub url: String,
}

/// Catalog collaborator boundary. The orchestrator only ever sees this
/// trait, so tests drive it with canned records instead of the live site.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn index(&self) -> Result<Vec<ScriptLink>>;
    async fn script(&self, link: &ScriptLink) -> Result<ScriptRecord>;
}

pub struct CatalogClient {
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Each fetch owns a throwaway client: one worker's cookies or poisoned
/// connection pool cannot bleed into another's.
fn page_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent(super::discovery::USER_AGENT)
        .build()
        .expect("Failed to build HTTP client")
}

#[async_trait]
impl Catalog for CatalogClient {
    /// Fetch the index page and list every script on it. Failure here is
    /// fatal to the run; there is nothing to reconcile without the catalog.
    async fn index(&self) -> Result<Vec<ScriptLink>> {
        info!(url = self.base_url.as_str(), "Fetching catalog index");
        let html = page_client()
            .get(&self.base_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("Failed to fetch catalog index")?
            .text()
            .await
            .context("Failed to read catalog index body")?;

        let links = extract_script_links(&html, &self.base_url);
        info!(count = links.len(), "Found script links");
        Ok(links)
    }

    /// Fetch one script page and parse its metadata table.
    async fn script(&self, link: &ScriptLink) -> Result<ScriptRecord> {
        let html = page_client()
            .get(&link.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to fetch script page {}", link.url))?
            .text()
            .await
            .with_context(|| format!("Failed to read script page {}", link.url))?;

        Ok(parse_script_page(&html, &link.name, &link.url))
    }
}

/// Script links from the index: root-relative `<li>` anchors, skipping the
/// site's own navigation sections, deduplicated by path in page order.
pub fn extract_script_links(html: &str, base_url: &str) -> Vec<ScriptLink> {
    let base = Url::parse(base_url).ok();
    let mut seen = BTreeSet::new();
    let mut links = Vec::new();

    for item in html.split("<li").skip(1) {
        let Some(href) = RE_HREF_ATTR.captures(item).map(|c| decode_entities(&c[1])) else {
            continue;
        };
        if !href.starts_with('/')
            || href.starts_with("/author")
            || href.starts_with("/explore")
            || href.starts_with("/about")
        {
            continue;
        }
        let name = href.trim_matches('/').to_string();
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        let url = match &base {
            Some(b) => b.join(&href).map(String::from).unwrap_or_else(|_| href.clone()),
            None => href.clone(),
        };
        links.push(ScriptLink { name, url });
    }

    links
}

/// Parse a script page's metadata table into a raw record. Missing rows
/// leave fields blank; a missing project URL falls back to the script's own
/// community URL, matching how the catalog links self-hosted scripts.
pub fn parse_script_page(html: &str, name: &str, community_url: &str) -> ScriptRecord {
    let mut record = ScriptRecord::new(name, community_url);

    for row in html.split("<tr").skip(1) {
        let cells: Vec<String> = RE_TD
            .captures_iter(row)
            .map(|c| c[1].to_string())
            .collect();
        if cells.len() < 2 {
            continue;
        }
        let key = strip_markup(&cells[0]).to_lowercase();
        let value_cell = &cells[1];

        match key.as_str() {
            "project name:" => {
                let text = strip_markup(value_cell);
                if !text.is_empty() {
                    record.name = text;
                }
            }
            "author:" | "authors:" => {
                record.authors = anchor_texts(value_cell);
                if record.authors.is_empty() {
                    warn!(script = name, "No author link found");
                }
            }
            "tags:" => {
                record.tags = tag_texts(value_cell);
            }
            "description:" => {
                record.description = strip_markup(value_cell);
            }
            "discussion url:" => {
                record.discussion_url = first_href(value_cell);
            }
            "project url:" => {
                record.project_url = first_href(value_cell);
            }
            _ => {}
        }
    }

    if record.project_url.as_deref().map_or(true, str::is_empty) {
        record.project_url = Some(community_url.to_string());
    }

    record
}

fn strip_markup(html: &str) -> String {
    let text = RE_TAG_MARKUP.replace_all(html, " ");
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_href(html: &str) -> Option<String> {
    RE_HREF_ATTR
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|href| !href.is_empty())
}

/// All anchor texts in page order, deduplicated (authors may be linked from
/// both an avatar and a name).
fn anchor_texts(html: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    RE_ANCHOR
        .captures_iter(html)
        .map(|c| strip_markup(&c[1]))
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn tag_texts(html: &str) -> BTreeSet<String> {
    RE_TAG_ANCHOR
        .captures_iter(html)
        .map(|c| strip_markup(&c[1]))
        .filter(|t| !t.is_empty())
        .collect()
}
