//! Run log: persisted JSON timeline of what a reconciliation pass did.
//!
//! Each run produces `{DATA_DIR}/runs/{run_id}.json`: an ordered list of
//! timestamped, structured events. The `demo_resolved` events double as a
//! replayable status log: `--status-log` feeds them back through the merge
//! engine without re-running discovery, so a run whose save step failed can
//! still have its resolution decisions applied.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use norns_common::normalize::norm_name;
use norns_common::{DemoStatus, DiscoveryMethod, ScriptRecord};

use crate::merge::merge;

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize, Deserialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ScriptScraped {
        script: String,
        community_url: String,
    },
    DemoResolved {
        script: String,
        status: DemoStatus,
        demo_url: Option<String>,
    },
    DiscoveryFailed {
        script: String,
        method: DiscoveryMethod,
        kind: String,
    },
    RetryScheduled {
        count: u32,
        delay_ms: u64,
    },
    ScriptFailed {
        script: String,
        error: String,
    },
}

#[derive(Serialize, Deserialize)]
struct RunLogFile {
    run_id: String,
    started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn push(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    /// Write the log under `{data_dir}/runs/`. Log-write failure is worth
    /// surfacing but callers shouldn't fail the run over it.
    pub fn save(self, data_dir: &Path) -> Result<PathBuf> {
        let dir = data_dir.join("runs");
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(format!("{}.json", self.run_id));
        let file = RunLogFile {
            run_id: self.run_id,
            started_at: self.started_at,
            events: self.events,
        };
        fs::write(&path, serde_json::to_string_pretty(&file)?)
            .with_context(|| format!("Failed to write run log {}", path.display()))?;
        info!(path = %path.display(), "Run log saved");
        Ok(path)
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolution decisions recorded by a prior run, keyed for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedStatus {
    pub script: String,
    pub status: DemoStatus,
    pub demo_url: Option<String>,
}

/// Read a run log and collect its `demo_resolved` events. Later events for
/// the same script win, matching the order decisions were made in.
pub fn load_statuses(path: &Path) -> Result<Vec<LoggedStatus>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read run log {}", path.display()))?;
    let file: RunLogFile = serde_json::from_str(&raw)
        .with_context(|| format!("Run log {} is not parseable", path.display()))?;

    let mut by_script: HashMap<String, LoggedStatus> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for event in file.events {
        if let EventKind::DemoResolved {
            script,
            status,
            demo_url,
        } = event.kind
        {
            let key = norm_name(&script);
            if !by_script.contains_key(&key) {
                order.push(key.clone());
            }
            by_script.insert(
                key,
                LoggedStatus {
                    script,
                    status,
                    demo_url,
                },
            );
        }
    }

    Ok(order.into_iter().filter_map(|k| by_script.remove(&k)).collect())
}

/// Apply logged resolution decisions to the dataset through the regular
/// merge contract: a stub scraped record carries the logged demo fields, so
/// every other field follows the normal never-overwrite rules. Returns the
/// number of records that changed.
pub fn replay_statuses(records: &mut [ScriptRecord], statuses: &[LoggedStatus]) -> usize {
    let by_name: HashMap<String, &LoggedStatus> = statuses
        .iter()
        .map(|s| (norm_name(&s.script), s))
        .collect();

    let mut changed = 0usize;
    for record in records.iter_mut() {
        let Some(logged) = by_name.get(&norm_name(&record.name)) else {
            continue;
        };

        let mut stub = ScriptRecord::new(record.name.clone(), record.community_url.clone());
        stub.demo_url = logged.demo_url.clone();
        stub.demo_status = Some(logged.status);

        let merged = merge(&stub, Some(record));
        if merged != *record {
            *record = merged;
            changed += 1;
        }
    }

    info!(changed, total = statuses.len(), "Applied statuses from run log");
    changed
}
