//! Normalization helpers shared by the conflict resolver, sync comparator,
//! and dataset keying. Comparison always happens on normalized forms; stored
//! values are never rewritten.

use std::collections::BTreeSet;

use url::Url;

/// Lowercased, whitespace-collapsed text comparison form.
pub fn norm_text(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Unordered comparison form for authors/tags: trimmed, lowercased,
/// stray quotes stripped, blanks dropped.
pub fn norm_set<'a, I: IntoIterator<Item = &'a str>>(items: I) -> BTreeSet<String> {
    items
        .into_iter()
        .map(|t| t.trim().trim_matches(|c| c == '\'' || c == '"').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// General URL comparison form: forced-https host (lowercased, `www.`
/// stripped), path with trailing slash and `.git` suffix removed, query and
/// fragment dropped. Unparseable input degrades to lowercase trim.
pub fn norm_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let Ok(parsed) = Url::parse(raw) else {
        return raw.to_lowercase().trim_end_matches('/').to_string();
    };
    let host = parsed
        .host_str()
        .unwrap_or("")
        .to_lowercase()
        .trim_start_matches("www.")
        .to_string();
    let mut path = parsed.path().trim_end_matches('/').to_string();
    if let Some(stripped) = path.strip_suffix(".git") {
        path = stripped.to_string();
    }
    format!("https://{host}{path}")
}

/// The path component of a community URL, used as the stable identity key:
/// `https://norns.community/mxsynths/` → `mxsynths`. Bare paths pass through.
pub fn url_path(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    match Url::parse(raw) {
        Ok(u) => u.path().trim_matches('/').to_string(),
        Err(_) => raw.trim_matches('/').to_string(),
    }
}

/// Demo-URL comparison key: scheme-stripped host+path+video-id,
/// case-insensitive, trailing slashes removed, tracking query parameters
/// discarded. Two demo URLs are "the same video" iff their keys are equal.
pub fn demo_key(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let Ok(parsed) = Url::parse(&with_scheme) else {
        return raw.to_lowercase().trim_end_matches('/').to_string();
    };

    let host = parsed.host_str().unwrap_or("").to_lowercase();
    // Mobile/music/player/embed subdomains point at the same video.
    let host = host
        .trim_start_matches("www.")
        .trim_start_matches("m.")
        .trim_start_matches("music.")
        .trim_start_matches("player.")
        .trim_start_matches("w.");
    let path = parsed.path().trim_matches('/').to_string();
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if host == "youtu.be" {
        if let Some(id) = segs.first() {
            return format!("youtube:{}", id.to_lowercase());
        }
    }
    if host.ends_with("youtube.com") {
        // watch?v=<id> and embed/<id> forms collapse to the video id
        if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
            return format!("youtube:{}", v.to_lowercase());
        }
        if segs.first() == Some(&"embed") {
            if let Some(id) = segs.get(1) {
                return format!("youtube:{}", id.to_lowercase());
            }
        }
    }
    if host.ends_with("vimeo.com") {
        // vimeo.com/<id> and vimeo.com/video/<id>
        if let Some(id) = segs.iter().find(|s| s.chars().all(|c| c.is_ascii_digit())) {
            return format!("vimeo:{id}");
        }
    }
    if host.ends_with("soundcloud.com") {
        return format!("soundcloud:{}", path.to_lowercase());
    }
    if host.ends_with("instagram.com") {
        return format!("instagram:{}", path.to_lowercase());
    }
    format!("{host}/{}", path.to_lowercase())
}

/// Tolerant script-name matching key for status replay: lowercased,
/// punctuation dropped, whitespace and hyphen runs collapsed to one hyphen.
pub fn norm_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else if c.is_whitespace() || c == '-' {
                ' '
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join("-")
}
