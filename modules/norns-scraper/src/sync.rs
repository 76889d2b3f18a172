//! Diagnostic diff between the freshly scraped record and the final merged
//! record: which fields does the live source now disagree with? Purely
//! informational; it never changes the merged record. `demo_status` and
//! `last_updated` are provenance/derived, not content, and are excluded.

use std::collections::BTreeSet;

use norns_common::normalize::{demo_key, norm_set, norm_text, norm_url};
use norns_common::{ScriptRecord, SyncField};

/// Comparable-field diff, normalized on both sides: trimmed case-folded
/// text, unordered author/tag sets, canonicalized URLs.
pub fn diff(scraped: &ScriptRecord, merged: &ScriptRecord) -> BTreeSet<SyncField> {
    let mut out = BTreeSet::new();

    if norm_text(&scraped.name) != norm_text(&merged.name) {
        out.insert(SyncField::Name);
    }
    if norm_set(scraped.authors.iter().map(String::as_str))
        != norm_set(merged.authors.iter().map(String::as_str))
    {
        out.insert(SyncField::Authors);
    }
    if norm_set(scraped.tags.iter().map(String::as_str))
        != norm_set(merged.tags.iter().map(String::as_str))
    {
        out.insert(SyncField::Tags);
    }
    if norm_text(&scraped.description) != norm_text(&merged.description) {
        out.insert(SyncField::Description);
    }
    if opt_key(&scraped.demo_url, demo_key) != opt_key(&merged.demo_url, demo_key) {
        out.insert(SyncField::Demo);
    }
    if opt_key(&scraped.discussion_url, norm_url) != opt_key(&merged.discussion_url, norm_url) {
        out.insert(SyncField::DiscussionUrl);
    }
    if opt_key(&scraped.project_url, norm_url) != opt_key(&merged.project_url, norm_url) {
        out.insert(SyncField::ProjectUrl);
    }

    out
}

fn opt_key(value: &Option<String>, normalizer: fn(&str) -> String) -> String {
    value.as_deref().map(normalizer).unwrap_or_default()
}
