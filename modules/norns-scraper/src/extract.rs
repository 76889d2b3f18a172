//! Demo-media candidate extraction from discussion-page HTML.
//!
//! Pure functions over markup: both discovery methods (static fetch and
//! Browserless render) feed their HTML through `extract_candidates`, so the
//! two methods differ only in how the page was obtained.
//!
//! Detection tiers, highest priority first; within a tier, first occurrence
//! on the page wins:
//!   1. direct anchor links to a media platform
//!   2. embedded players (iframe src, data-original-href)
//!   3. JSON-LD VideoObject structured data
//!   4. container attributes (data-video-id, data-provider-name)

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use norns_common::normalize::demo_key;
use norns_common::{DemoCandidate, DiscoveryMethod, Platform};

// =============================================================================
// Regex Patterns
// =============================================================================

static RE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).unwrap());

static RE_IFRAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<iframe\b[^>]*>").unwrap());

static RE_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src\s*=\s*["']([^"']+)["']"#).unwrap());

static RE_DATA_ORIGINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-original-href\s*=\s*["']([^"']+)["']"#).unwrap());

static RE_JSON_LD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .unwrap()
});

static RE_MEDIA_CONTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<(?:div|span)\b[^>]*class\s*=\s*["'][^"']*(?:youtube|vimeo|video|embed)[^"']*["'][^>]*>"#)
        .unwrap()
});

static RE_DATA_VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-video-id\s*=\s*["']([^"']+)["']"#).unwrap());

static RE_DATA_PROVIDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-provider-name\s*=\s*["']([^"']+)["']"#).unwrap());

// =============================================================================
// Extraction
// =============================================================================

/// Extract demo-media candidates from page HTML, ordered by detection
/// priority then first occurrence. Deduplicated by normalized video key.
pub fn extract_candidates(html: &str, method: DiscoveryMethod) -> Vec<DemoCandidate> {
    let mut out: Vec<DemoCandidate> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |url: String, platform: Platform, out: &mut Vec<DemoCandidate>| {
        let key = demo_key(&url);
        if !key.is_empty() && seen.insert(key) {
            out.push(DemoCandidate {
                url,
                platform,
                method,
            });
        }
    };

    // Tier 1: direct links
    for cap in RE_HREF.captures_iter(html) {
        let href = decode_entities(&cap[1]);
        if let Some(platform) = classify_direct_link(&href) {
            push(href, platform, &mut out);
        }
    }

    // Tier 2: embedded players
    for tag in RE_IFRAME.find_iter(html) {
        let tag = tag.as_str();
        if let Some(src) = RE_SRC.captures(tag).map(|c| decode_entities(&c[1])) {
            if let Some((url, platform)) = canonicalize_embed(&src) {
                push(url, platform, &mut out);
            }
        }
        // Discourse oneboxes keep the public Vimeo URL in data-original-href
        if let Some(orig) = RE_DATA_ORIGINAL.captures(tag).map(|c| decode_entities(&c[1])) {
            if orig.to_lowercase().contains("vimeo.com/") {
                push(orig, Platform::Vimeo, &mut out);
            }
        }
    }

    // Tier 3: JSON-LD VideoObject
    for cap in RE_JSON_LD.captures_iter(html) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(cap[1].trim()) else {
            continue;
        };
        let items: Vec<&serde_json::Value> = match &value {
            serde_json::Value::Array(arr) => arr.iter().collect(),
            other => vec![other],
        };
        for item in items {
            if let Some((url, platform)) = video_object_url(item) {
                push(url, platform, &mut out);
            }
        }
    }

    // Tier 4: container attributes
    for tag in RE_MEDIA_CONTAINER.find_iter(html) {
        let tag = tag.as_str();
        let video_id = RE_DATA_VIDEO_ID
            .captures(tag)
            .map(|c| decode_entities(&c[1]))
            .unwrap_or_default();
        if video_id.is_empty() {
            continue;
        }
        let provider = RE_DATA_PROVIDER
            .captures(tag)
            .map(|c| c[1].to_lowercase())
            .unwrap_or_default();
        let class_hint = tag.to_lowercase();

        if provider == "youtube" || class_hint.contains("youtube") || video_id.len() == 11 {
            push(
                format!("https://www.youtube.com/watch?v={video_id}"),
                Platform::YouTube,
                &mut out,
            );
        } else if class_hint.contains("vimeo") {
            push(format!("https://vimeo.com/{video_id}"), Platform::Vimeo, &mut out);
        }
    }

    out
}

/// Platform of a plain anchor href, if it points at demo media.
fn classify_direct_link(href: &str) -> Option<Platform> {
    let h = href.to_lowercase();
    let is_youtube = ["youtube.com/watch", "youtu.be/", "m.youtube.com/watch", "music.youtube.com/watch"]
        .iter()
        .any(|p| h.contains(p));
    if is_youtube {
        return Some(Platform::YouTube);
    }
    if h.contains("vimeo.com/") {
        return Some(Platform::Vimeo);
    }
    if h.contains("soundcloud.com/") {
        return Some(Platform::SoundCloud);
    }
    if h.contains("instagram.com/") && h.contains("/p/") {
        return Some(Platform::Instagram);
    }
    None
}

/// Turn a player/embed URL into the canonical shareable URL.
fn canonicalize_embed(src: &str) -> Option<(String, Platform)> {
    let s = src.to_lowercase();

    if let Some(rest) = split_after(src, "youtube.com/embed/") {
        let id = rest.split(['?', '&', '/']).next().unwrap_or_default();
        if !id.is_empty() {
            return Some((format!("https://www.youtube.com/watch?v={id}"), Platform::YouTube));
        }
    }
    if let Some(rest) = split_after(src, "youtu.be/") {
        let id = rest.split(['?', '&', '/']).next().unwrap_or_default();
        if !id.is_empty() {
            return Some((format!("https://www.youtube.com/watch?v={id}"), Platform::YouTube));
        }
    }
    if let Some(rest) = split_after(src, "vimeo.com/video/") {
        let id = rest.split(['?', '&', '/']).next().unwrap_or_default();
        if !id.is_empty() {
            return Some((format!("https://vimeo.com/{id}"), Platform::Vimeo));
        }
    }
    if s.contains("soundcloud.com/player") || s.contains("w.soundcloud.com") || s.contains("player.soundcloud.com")
    {
        // The public track hides in the player's url= query parameter:
        // url=https%3A//api.soundcloud.com/tracks/<id>
        let parsed = url::Url::parse(src).ok()?;
        let api_url = parsed
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())?;
        let track_id = split_after(&api_url, "api.soundcloud.com/tracks/")?
            .split(['?', '&', '/'])
            .next()
            .unwrap_or_default()
            .to_string();
        if !track_id.is_empty() {
            return Some((format!("https://soundcloud.com/track/{track_id}"), Platform::SoundCloud));
        }
    }
    None
}

/// URL (canonicalized when it is an embed form) from a JSON-LD VideoObject.
fn video_object_url(item: &serde_json::Value) -> Option<(String, Platform)> {
    if item.get("@type").and_then(|t| t.as_str()) != Some("VideoObject") {
        return None;
    }
    if let Some(content_url) = item.get("contentUrl").and_then(|u| u.as_str()) {
        let content_url = decode_entities(content_url);
        if let Some(platform) = classify_direct_link(&content_url) {
            return Some((content_url, platform));
        }
    }
    if let Some(embed_url) = item.get("embedUrl").and_then(|u| u.as_str()) {
        return canonicalize_embed(&decode_entities(embed_url));
    }
    None
}

fn split_after<'a>(s: &'a str, pattern: &str) -> Option<&'a str> {
    let lower = s.to_lowercase();
    // Byte offsets only line up when lowercasing didn't resize anything.
    if lower.len() == s.len() {
        let idx = lower.find(pattern)?;
        Some(&s[idx + pattern.len()..])
    } else {
        let idx = s.find(pattern)?;
        Some(&s[idx + pattern.len()..])
    }
}

/// Minimal HTML entity decoding for attribute values (`&amp;` in URLs is
/// the case that actually bites).
pub fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&#38;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}
