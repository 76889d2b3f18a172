//! Reconciliation orchestrator: one full pass of scrape + dual-method demo
//! discovery + conflict resolution + merge + sync diff across the catalog.
//!
//! Scripts are processed by a bounded worker pool; each worker owns its own
//! copies of the scraped and existing records and returns a result, so no
//! record is ever shared mutably. Rate-limited discovery requests are
//! collected behind a strict barrier (the retry pass does not start until
//! the whole first pass has drained) and retried once with wider spacing.
//! One script's failure never aborts the batch; the run only dies when the
//! catalog index or the dataset itself is unusable.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::time::sleep;
use tracing::{error, info, warn};

use norns_common::normalize::norm_name;
use norns_common::{is_blank, DemoStatus, DiscoveryMethod, ScriptRecord};

use crate::catalog::{Catalog, ScriptLink};
use crate::discovery::{DemoRequest, Discoverer, DiscoveryResult};
use crate::github::{apply_last_updated, CommitHistory};
use crate::merge::merge;
use crate::resolve::resolve_demo;
use crate::retry::{RetryCoordinator, RetryPolicy};
use crate::run_log::{EventKind, RunLog};
use crate::store;
use crate::sync::diff;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Worker-pool width for scraping, discovery, and GitHub lookups.
    pub workers: usize,
    /// Spacing ahead of each script's discovery request pair.
    pub demo_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            workers: 10,
            demo_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

/// Stats from a reconciliation run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub total: u32,
    pub added: u32,
    pub updated: u32,
    pub preserved: u32,
    pub failed: u32,
    pub demos_found: u32,
    pub by_status: [u32; 5], // NoConflict, Playwright, Extract, Manual, Missing
    pub retried: u32,
    pub recovered: u32,
    pub out_of_sync: u32,
    /// Scripts whose discovery degraded to one method or none this run.
    pub degraded: Vec<String>,
}

impl RunStats {
    fn count_status(&mut self, status: DemoStatus) {
        let slot = match status {
            DemoStatus::NoConflict => 0,
            DemoStatus::PlaywrightPreferred => 1,
            DemoStatus::ExtractPreferred => 2,
            DemoStatus::ManualOverride => 3,
            DemoStatus::MissingDemo => 4,
        };
        self.by_status[slot] += 1;
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Reconciliation Run Complete ===")?;
        writeln!(f, "Scripts total:     {}", self.total)?;
        writeln!(f, "Scripts added:     {}", self.added)?;
        writeln!(f, "Scripts updated:   {}", self.updated)?;
        writeln!(f, "Scripts preserved: {}", self.preserved)?;
        writeln!(f, "Scripts failed:    {}", self.failed)?;
        writeln!(f, "Demos found:       {}", self.demos_found)?;
        writeln!(f, "Out of sync:       {}", self.out_of_sync)?;
        writeln!(f, "\nDemo resolution:")?;
        writeln!(f, "  No Conflict:          {}", self.by_status[0])?;
        writeln!(f, "  Playwright Preferred: {}", self.by_status[1])?;
        writeln!(f, "  Extract Preferred:    {}", self.by_status[2])?;
        writeln!(f, "  Manual Override:      {}", self.by_status[3])?;
        writeln!(f, "  Missing Demo:         {}", self.by_status[4])?;
        writeln!(
            f,
            "\nRate-limit retries: {} ({} recovered)",
            self.retried, self.recovered
        )?;
        if !self.degraded.is_empty() {
            writeln!(f, "Discovery degraded for:")?;
            for name in &self.degraded {
                writeln!(f, "  {name}")?;
            }
        }
        Ok(())
    }
}

/// Per-script result of the first pass, finalized after the retry barrier.
struct ScrapeOutcome {
    link: ScriptLink,
    existing: Option<ScriptRecord>,
    scraped: Option<ScriptRecord>,
    error: Option<String>,
    discussion_url: Option<String>,
    extract: Option<DiscoveryResult>,
    render: Option<DiscoveryResult>,
}

pub struct Reconciler<'a> {
    catalog: &'a dyn Catalog,
    discoverer: &'a dyn Discoverer,
    history: &'a dyn CommitHistory,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        catalog: &'a dyn Catalog,
        discoverer: &'a dyn Discoverer,
        history: &'a dyn CommitHistory,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            catalog,
            discoverer,
            history,
            options,
        }
    }

    /// One full reconciliation pass. Returns the dataset to persist,
    /// name-sorted regardless of processing order.
    pub async fn run(
        &self,
        links: Vec<ScriptLink>,
        existing: Vec<ScriptRecord>,
        log: &mut RunLog,
    ) -> Result<(Vec<ScriptRecord>, RunStats)> {
        let mut stats = RunStats::default();

        // Index existing records by identity key, with a tolerant-name side
        // index for records that predate community-URL tracking or moved.
        let mut existing_by_key: HashMap<String, ScriptRecord> = HashMap::new();
        let mut key_by_name: HashMap<String, String> = HashMap::new();
        for record in existing {
            let key = record.merge_key();
            key_by_name.insert(norm_name(&record.name), key.clone());
            existing_by_key.insert(key, record);
        }

        // Decide which scripts need work. Complete records are skipped
        // outright; their stored rows ride through untouched.
        let mut batch: Vec<(ScriptLink, Option<ScriptRecord>)> = Vec::new();
        let mut skipped_complete = 0u32;
        for link in links {
            let claimed = claim_existing(&mut existing_by_key, &mut key_by_name, &link);
            match claimed {
                Some(record) if record.is_complete() => {
                    skipped_complete += 1;
                    // Put it back; nothing to do this run.
                    existing_by_key.insert(record.merge_key(), record);
                }
                other => batch.push((link, other)),
            }
        }

        info!(
            to_process = batch.len(),
            skipped_complete,
            workers = self.options.workers,
            "Starting reconciliation pass"
        );

        // First pass: scrape + both discovery methods, bounded concurrency.
        let mut outcomes: Vec<ScrapeOutcome> = stream::iter(
            batch
                .into_iter()
                .map(|(link, existing)| self.process_script(link, existing)),
        )
        .buffer_unordered(self.options.workers.max(1))
        .collect()
        .await;

        // Barrier: the first pass has fully drained. Collect every
        // rate-limited request and run the single spaced retry pass.
        let failed_requests = collect_rate_limited(&outcomes);
        stats.retried = failed_requests.len() as u32;
        if !failed_requests.is_empty() {
            log.push(EventKind::RetryScheduled {
                count: failed_requests.len() as u32,
                delay_ms: self.options.retry.retry_delay().as_millis() as u64,
            });
        }
        let retried = RetryCoordinator::new(self.options.retry.clone())
            .schedule(failed_requests, self.discoverer)
            .await;
        stats.recovered = retried.iter().filter(|(_, r)| r.is_ok()).count() as u32;

        let mut retry_results: HashMap<(String, DiscoveryMethod), DiscoveryResult> = retried
            .into_iter()
            .map(|(req, res)| ((req.script_key, req.method), res))
            .collect();
        for outcome in &mut outcomes {
            for method in [DiscoveryMethod::Extract, DiscoveryMethod::Render] {
                if let Some(res) = retry_results.remove(&(outcome.link.name.clone(), method)) {
                    match method {
                        DiscoveryMethod::Extract => outcome.extract = Some(res),
                        DiscoveryMethod::Render => outcome.render = Some(res),
                    }
                }
            }
        }

        // Finalize each script: resolve, merge, diff. Synchronous from here.
        let mut output: Vec<ScriptRecord> = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            output.push(self.finalize_script(outcome, &mut stats, log));
        }

        // Records not on the index this run (and complete skips) are never
        // deleted; removal is the explicit dedupe operation only.
        stats.preserved += existing_by_key.len() as u32;
        output.extend(existing_by_key.into_values());

        apply_last_updated(&mut output, self.history, self.options.workers).await;

        // Identity is unique however the batch interleaved; the original
        // dataset carried historical duplicates, so enforce rather than trust.
        let (mut output, removed) = store::dedupe(output);
        if removed > 0 {
            warn!(removed, "Merged duplicate identities during reconciliation");
        }

        output.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.merge_key().cmp(&b.merge_key()))
        });

        stats.total = output.len() as u32;
        stats.out_of_sync = output.iter().filter(|r| !r.out_of_sync.is_empty()).count() as u32;
        Ok((output, stats))
    }

    /// Scrape one script page and, when its demo needs (re)resolution, run
    /// both discovery methods. Never fails: errors are carried in the
    /// outcome and contained at this script's boundary.
    async fn process_script(
        &self,
        link: ScriptLink,
        existing: Option<ScriptRecord>,
    ) -> ScrapeOutcome {
        let (scraped, error) = match self.catalog.script(&link).await {
            Ok(record) => (Some(record), None),
            Err(e) => {
                error!(script = link.name.as_str(), error = %e, "Failed to scrape script page");
                (None, Some(e.to_string()))
            }
        };

        let discussion_url = scraped
            .as_ref()
            .and_then(|s| s.discussion_url.clone())
            .or_else(|| existing.as_ref().and_then(|e| e.discussion_url.clone()))
            .filter(|u| !is_blank(u));

        let needs_demo = scraped.is_some()
            && discussion_url.is_some()
            && existing.as_ref().map_or(true, |e| {
                e.demo_url.as_deref().map_or(true, is_blank) || e.demo_status.is_none()
            });

        let (extract, render) = if needs_demo {
            sleep(self.options.demo_delay).await;
            let url = discussion_url.clone().unwrap();
            let extract_req = DemoRequest {
                script_key: link.name.clone(),
                discussion_url: url.clone(),
                method: DiscoveryMethod::Extract,
            };
            let render_req = DemoRequest {
                script_key: link.name.clone(),
                discussion_url: url,
                method: DiscoveryMethod::Render,
            };
            let (e, r) = tokio::join!(
                self.discoverer.discover(&extract_req),
                self.discoverer.discover(&render_req)
            );
            (Some(e), Some(r))
        } else {
            (None, None)
        };

        ScrapeOutcome {
            link,
            existing,
            scraped,
            error,
            discussion_url,
            extract,
            render,
        }
    }

    /// Post-barrier finalization: conflict resolution over whatever each
    /// method produced, then merge and sync diff. Pure record-in/record-out.
    fn finalize_script(
        &self,
        outcome: ScrapeOutcome,
        stats: &mut RunStats,
        log: &mut RunLog,
    ) -> ScriptRecord {
        let ScrapeOutcome {
            link,
            existing,
            scraped,
            error,
            extract,
            render,
            ..
        } = outcome;

        let Some(mut scraped) = scraped else {
            // Scrape failed: retain the best-available record and move on.
            stats.failed += 1;
            log.push(EventKind::ScriptFailed {
                script: link.name.clone(),
                error: error.unwrap_or_else(|| "unknown".to_string()),
            });
            return existing.unwrap_or_else(|| ScriptRecord::new(&link.name, &link.url));
        };

        log.push(EventKind::ScriptScraped {
            script: link.name.clone(),
            community_url: scraped.community_url.clone(),
        });

        if extract.is_some() || render.is_some() {
            let mut degraded = false;
            for (method, result) in [
                (DiscoveryMethod::Extract, &extract),
                (DiscoveryMethod::Render, &render),
            ] {
                if let Some(Err(e)) = result {
                    degraded = true;
                    log.push(EventKind::DiscoveryFailed {
                        script: link.name.clone(),
                        method,
                        kind: e.to_string(),
                    });
                }
            }
            if degraded {
                stats.degraded.push(link.name.clone());
            }

            // A failed method resolves with an empty candidate list; the
            // decision table handles it from there.
            let extract_candidates = extract.and_then(|r| r.ok()).unwrap_or_default();
            let render_candidates = render.and_then(|r| r.ok()).unwrap_or_default();
            let existing_demo = existing.as_ref().and_then(|e| e.demo_url.as_deref());

            let (final_demo, status) =
                resolve_demo(existing_demo, &extract_candidates, &render_candidates);
            if final_demo.is_some() {
                stats.demos_found += 1;
            }
            stats.count_status(status);
            log.push(EventKind::DemoResolved {
                script: link.name.clone(),
                status,
                demo_url: final_demo.clone(),
            });

            scraped.demo_url = final_demo;
            scraped.demo_status = Some(status);
        }

        let mut merged = merge(&scraped, existing.as_ref());
        if scraped.demo_status.is_none() {
            // No resolution ran this pass; the catalog page itself carries no
            // demo, so the scrape has no fresh demo value to disagree with.
            scraped.demo_url = merged.demo_url.clone();
        }
        merged.out_of_sync = diff(&scraped, &merged);

        match &existing {
            None => stats.added += 1,
            Some(prev) if *prev != merged => stats.updated += 1,
            Some(_) => stats.preserved += 1,
        }

        merged
    }
}

/// Pull the record this link refers to out of the index: by URL path first,
/// then by tolerant name match.
fn claim_existing(
    by_key: &mut HashMap<String, ScriptRecord>,
    key_by_name: &mut HashMap<String, String>,
    link: &ScriptLink,
) -> Option<ScriptRecord> {
    if let Some(record) = by_key.remove(&format!("url:{}", link.name)) {
        key_by_name.remove(&norm_name(&record.name));
        return Some(record);
    }
    let key = key_by_name.remove(&norm_name(&link.name))?;
    by_key.remove(&key)
}

/// Sync-check mode: re-scrape every stored record (no skip logic, no
/// discovery, no merge) and recompute `out_of_sync` in place. Returns how
/// many records' flags changed.
pub async fn sync_check(
    catalog: &dyn Catalog,
    records: &mut [ScriptRecord],
    workers: usize,
) -> Result<u32> {
    use norns_common::normalize::url_path;

    let tasks: Vec<(usize, ScriptLink)> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| !is_blank(&r.community_url))
        .map(|(idx, r)| {
            (
                idx,
                ScriptLink {
                    name: url_path(&r.community_url),
                    url: r.community_url.clone(),
                },
            )
        })
        .collect();

    info!(count = tasks.len(), "Sync-check: re-scraping stored records");

    let scraped: Vec<(usize, Option<ScriptRecord>)> = stream::iter(tasks)
        .map(|(idx, link)| async move {
            match catalog.script(&link).await {
                Ok(record) => (idx, Some(record)),
                Err(e) => {
                    warn!(script = link.name.as_str(), error = %e, "Sync-check scrape failed");
                    (idx, None)
                }
            }
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let mut changed = 0u32;
    for (idx, fresh) in scraped {
        let Some(mut fresh) = fresh else { continue };
        // Script pages carry no demo; only discussion discovery does.
        fresh.demo_url = records[idx].demo_url.clone();
        let flags = diff(&fresh, &records[idx]);
        if records[idx].out_of_sync != flags {
            records[idx].out_of_sync = flags;
            changed += 1;
        }
    }
    Ok(changed)
}

fn collect_rate_limited(outcomes: &[ScrapeOutcome]) -> Vec<DemoRequest> {
    let mut failed = Vec::new();
    for outcome in outcomes {
        let Some(url) = outcome.discussion_url.as_ref() else {
            continue;
        };
        for (method, result) in [
            (DiscoveryMethod::Extract, &outcome.extract),
            (DiscoveryMethod::Render, &outcome.render),
        ] {
            if let Some(Err(e)) = result {
                if e.is_rate_limited() {
                    failed.push(DemoRequest {
                        script_key: outcome.link.name.clone(),
                        discussion_url: url.clone(),
                        method,
                    });
                }
            }
        }
    }
    failed
}
