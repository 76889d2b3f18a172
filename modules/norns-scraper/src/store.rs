//! Dataset persistence: one JSON file, loaded at run start and replaced
//! atomically at run end. A missing file is a first run; a file we cannot
//! parse aborts the run, because merging against a half-read dataset would
//! silently shed manual edits.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use norns_common::{is_blank, ScriptRecord};

pub fn load(path: &Path) -> Result<Vec<ScriptRecord>> {
    if !path.exists() {
        info!(path = %path.display(), "No existing dataset, starting fresh");
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let records: Vec<ScriptRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Existing dataset {} is not parseable; refusing to run against it", path.display()))?;
    info!(count = records.len(), path = %path.display(), "Loaded existing dataset");
    Ok(records)
}

/// Write via temp file + rename so a crash mid-write never leaves a
/// truncated dataset behind.
pub fn save(path: &Path, records: &[ScriptRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(records).context("Failed to serialize dataset")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace dataset {}", path.display()))?;
    info!(count = records.len(), path = %path.display(), "Saved dataset");
    Ok(())
}

/// Explicit deduplication by identity key (community-URL path, name as
/// fallback). First occurrence wins; later duplicates only fill blanks of
/// the kept row. Returns the deduplicated set and how many rows were
/// dropped. This is the one place records are ever removed.
pub fn dedupe(records: Vec<ScriptRecord>) -> (Vec<ScriptRecord>, usize) {
    let mut kept: Vec<ScriptRecord> = Vec::with_capacity(records.len());
    let mut index_by_key: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut removed = 0usize;

    for record in records {
        let key = record.merge_key();
        match index_by_key.get(&key) {
            None => {
                index_by_key.insert(key, kept.len());
                kept.push(record);
            }
            Some(&idx) => {
                removed += 1;
                warn!(key = key.as_str(), "Dropping duplicate dataset row");
                fill_blanks(&mut kept[idx], &record);
            }
        }
    }

    (kept, removed)
}

/// Blank fields of `base` take the duplicate's values; populated fields are
/// left alone.
fn fill_blanks(base: &mut ScriptRecord, dup: &ScriptRecord) {
    if is_blank(&base.name) {
        base.name = dup.name.clone();
    }
    if base.authors.is_empty() {
        base.authors = dup.authors.clone();
    }
    if base.tags.is_empty() {
        base.tags = dup.tags.clone();
    }
    if is_blank(&base.description) {
        base.description = dup.description.clone();
    }
    if base.demo_url.as_deref().map_or(true, is_blank) {
        base.demo_url = dup.demo_url.clone();
    }
    if base.discussion_url.as_deref().map_or(true, is_blank) {
        base.discussion_url = dup.discussion_url.clone();
    }
    if base.project_url.as_deref().map_or(true, is_blank) {
        base.project_url = dup.project_url.clone();
    }
    if base.demo_status.is_none() {
        base.demo_status = dup.demo_status;
    }
    if base.last_updated.is_none() {
        base.last_updated = dup.last_updated;
    }
}
