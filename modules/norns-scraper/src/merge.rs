//! Per-field incremental merge between a freshly scraped record and the
//! previously stored one. Manual corrections are never overwritten: a
//! non-blank stored field always stands.
//!
//! `demo_url` and `demo_status` are exempt from blank-fill; they carry
//! provenance and are set only from resolver output (or a status-log replay
//! feeding the same contract). `last_updated` goes the other way: it is a
//! derived fact, overwritten whenever the commit-history collaborator
//! produced a value.

use norns_common::{is_blank, ScriptRecord};

/// Merge `scraped` into `existing`, producing the record to persist.
/// With no existing record the scraped record is the result, verbatim.
pub fn merge(scraped: &ScriptRecord, existing: Option<&ScriptRecord>) -> ScriptRecord {
    let Some(existing) = existing else {
        return scraped.clone();
    };

    // Resolver output rides in on the scraped record; demo_status None means
    // discovery did not run for this script this pass.
    let (demo_url, demo_status) = if scraped.demo_status.is_some() {
        (scraped.demo_url.clone(), scraped.demo_status)
    } else {
        (existing.demo_url.clone(), existing.demo_status)
    };

    ScriptRecord {
        name: fill_str(&existing.name, &scraped.name),
        authors: if existing.authors.is_empty() {
            scraped.authors.clone()
        } else {
            existing.authors.clone()
        },
        tags: if existing.tags.is_empty() {
            scraped.tags.clone()
        } else {
            existing.tags.clone()
        },
        description: fill_str(&existing.description, &scraped.description),
        demo_url,
        discussion_url: fill_opt(&existing.discussion_url, &scraped.discussion_url),
        project_url: fill_opt(&existing.project_url, &scraped.project_url),
        // The merge key: never rewritten, only filled when the stored record
        // predates community-URL tracking.
        community_url: fill_str(&existing.community_url, &scraped.community_url),
        demo_status,
        last_updated: scraped.last_updated.or(existing.last_updated),
        // Recomputed by the sync comparator after every merge; carried here so
        // replay-only passes don't wipe the last comparison.
        out_of_sync: existing.out_of_sync.clone(),
    }
}

fn fill_str(existing: &str, scraped: &str) -> String {
    if is_blank(existing) {
        scraped.to_string()
    } else {
        existing.to_string()
    }
}

fn fill_opt(existing: &Option<String>, scraped: &Option<String>) -> Option<String> {
    match existing.as_deref() {
        Some(v) if !is_blank(v) => existing.clone(),
        _ => scraped.clone(),
    }
}
