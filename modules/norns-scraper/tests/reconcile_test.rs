//! Orchestrator tests: scripted catalog, discoverer, and commit-history
//! mocks drive a full reconciliation pass. No network, no Browserless, no
//! GitHub.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use norns_common::{DemoCandidate, DemoStatus, DiscoveryError, DiscoveryMethod, Platform, ScriptRecord, SyncField};
use norns_scraper::catalog::{Catalog, ScriptLink};
use norns_scraper::discovery::{DemoRequest, Discoverer, DiscoveryResult};
use norns_scraper::github::CommitHistory;
use norns_scraper::reconcile::{ReconcileOptions, Reconciler};
use norns_scraper::retry::RetryPolicy;
use norns_scraper::run_log::RunLog;

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

struct MockCatalog {
    links: Vec<ScriptLink>,
    pages: HashMap<String, ScriptRecord>,
    fail: HashSet<String>,
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn index(&self) -> Result<Vec<ScriptLink>> {
        Ok(self.links.clone())
    }

    async fn script(&self, link: &ScriptLink) -> Result<ScriptRecord> {
        if self.fail.contains(&link.name) {
            return Err(anyhow!("connection reset by peer"));
        }
        self.pages
            .get(&link.name)
            .cloned()
            .ok_or_else(|| anyhow!("unexpected scrape of {}", link.name))
    }
}

/// Scripted per-(script, method) response queues; every call is recorded.
#[derive(Default)]
struct ScriptedDiscoverer {
    responses: Mutex<HashMap<(String, DiscoveryMethod), VecDeque<DiscoveryResult>>>,
    calls: Mutex<Vec<(String, DiscoveryMethod)>>,
}

impl ScriptedDiscoverer {
    fn respond(&self, script: &str, method: DiscoveryMethod, result: DiscoveryResult) {
        self.responses
            .lock()
            .unwrap()
            .entry((script.to_string(), method))
            .or_default()
            .push_back(result);
    }

    fn calls_for(&self, script: &str, method: DiscoveryMethod) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, m)| s == script && *m == method)
            .count()
    }
}

#[async_trait]
impl Discoverer for ScriptedDiscoverer {
    async fn discover(&self, request: &DemoRequest) -> DiscoveryResult {
        self.calls
            .lock()
            .unwrap()
            .push((request.script_key.clone(), request.method));
        self.responses
            .lock()
            .unwrap()
            .get_mut(&(request.script_key.clone(), request.method))
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

struct MockHistory {
    dates: HashMap<(String, String), NaiveDate>,
}

#[async_trait]
impl CommitHistory for MockHistory {
    async fn latest_non_readme_date(&self, owner: &str, repo: &str) -> Option<NaiveDate> {
        self.dates.get(&(owner.to_string(), repo.to_string())).copied()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn link(name: &str) -> ScriptLink {
    ScriptLink {
        name: name.to_string(),
        url: format!("https://norns.community/{name}"),
    }
}

fn page(name: &str) -> ScriptRecord {
    let mut rec = ScriptRecord::new(name, format!("https://norns.community/{name}"));
    rec.authors = vec![format!("{name}-author")];
    rec.tags = ["synth".to_string()].into_iter().collect();
    rec.description = format!("{name} does things");
    rec.discussion_url = Some(format!("https://llllllll.co/t/{name}/1"));
    rec.project_url = Some(format!("https://github.com/norns/{name}"));
    rec
}

fn extract_hit(url: &str) -> DiscoveryResult {
    Ok(vec![DemoCandidate {
        url: url.to_string(),
        platform: Platform::YouTube,
        method: DiscoveryMethod::Extract,
    }])
}

fn render_hit(url: &str) -> DiscoveryResult {
    Ok(vec![DemoCandidate {
        url: url.to_string(),
        platform: Platform::Vimeo,
        method: DiscoveryMethod::Render,
    }])
}

fn fast_options() -> ReconcileOptions {
    ReconcileOptions {
        workers: 4,
        demo_delay: Duration::from_millis(0),
        retry: RetryPolicy {
            base_delay: Duration::from_millis(0),
            multiplier: 3.0,
            min_delay: Duration::from_millis(0),
            max_attempts: 1,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_pass_resolves_merges_and_sorts() {
    // Index deliberately scrambled; output must come back name-sorted.
    let catalog = MockCatalog {
        links: vec![link("gamma"), link("delta"), link("alpha"), link("zeta"), link("beta")],
        pages: [
            ("alpha".to_string(), page("alpha")),
            ("gamma".to_string(), page("gamma")),
            ("beta".to_string(), page("beta")),
        ]
        .into_iter()
        .collect(),
        fail: ["delta".to_string()].into_iter().collect(),
    };

    let discoverer = ScriptedDiscoverer::default();
    // alpha: only extract finds a demo
    discoverer.respond("alpha", DiscoveryMethod::Extract, extract_hit("https://youtu.be/alpha111111"));
    // beta: stored demo matches neither method
    discoverer.respond("beta", DiscoveryMethod::Extract, extract_hit("https://youtu.be/beta2222222"));
    discoverer.respond("beta", DiscoveryMethod::Render, render_hit("https://vimeo.com/999"));
    // gamma: both methods come back empty

    let mut existing_beta = page("beta");
    existing_beta.demo_url = Some("https://soundcloud.com/old/beta-demo".into());

    let mut existing_gamma = page("gamma");
    existing_gamma.authors = vec!["hand-corrected".into()];

    // delta's scrape will fail; its stored record must survive verbatim.
    let mut existing_delta = page("delta");
    existing_delta.description = "must survive".into();

    // zeta is complete: never scraped, never discovered.
    let mut existing_zeta = page("zeta");
    existing_zeta.demo_url = Some("https://vimeo.com/55".into());
    existing_zeta.demo_status = Some(DemoStatus::NoConflict);

    let history = MockHistory {
        dates: [(
            ("norns".to_string(), "alpha".to_string()),
            NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
        )]
        .into_iter()
        .collect(),
    };

    let reconciler = Reconciler::new(&catalog, &discoverer, &history, fast_options());
    let mut run_log = RunLog::new();
    let (records, stats) = reconciler
        .run(
            catalog.index().await.unwrap(),
            vec![existing_beta, existing_gamma, existing_delta, existing_zeta],
            &mut run_log,
        )
        .await
        .unwrap();

    // Deterministic name order regardless of worker interleaving.
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta", "delta", "gamma", "zeta"]);

    let by_name: HashMap<&str, &ScriptRecord> =
        records.iter().map(|r| (r.name.as_str(), r)).collect();

    // alpha: new entry, extract-preferred demo, GitHub date applied.
    let alpha = by_name["alpha"];
    assert_eq!(alpha.demo_url.as_deref(), Some("https://youtu.be/alpha111111"));
    assert_eq!(alpha.demo_status, Some(DemoStatus::ExtractPreferred));
    assert_eq!(alpha.last_updated, NaiveDate::from_ymd_opt(2025, 3, 9));
    assert!(alpha.out_of_sync.is_empty());

    // beta: disagreement with no matching stored value prefers render.
    let beta = by_name["beta"];
    assert_eq!(beta.demo_url.as_deref(), Some("https://vimeo.com/999"));
    assert_eq!(beta.demo_status, Some(DemoStatus::PlaywrightPreferred));

    // gamma: manual author preserved, flagged, and demo resolved missing.
    let gamma = by_name["gamma"];
    assert_eq!(gamma.authors, vec!["hand-corrected".to_string()]);
    assert!(gamma.out_of_sync.contains(&SyncField::Authors));
    assert_eq!(gamma.demo_status, Some(DemoStatus::MissingDemo));

    // delta: scrape failure contained; stored record untouched.
    let delta = by_name["delta"];
    assert_eq!(delta.description, "must survive");
    assert_eq!(delta.demo_status, None);

    // zeta: complete, skipped, untouched.
    let zeta = by_name["zeta"];
    assert_eq!(zeta.demo_url.as_deref(), Some("https://vimeo.com/55"));
    assert_eq!(discoverer.calls_for("zeta", DiscoveryMethod::Extract), 0);

    assert_eq!(stats.added, 1);
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.preserved, 1);
    assert_eq!(stats.total, 5);
    assert_eq!(stats.out_of_sync, 1);
}

#[tokio::test]
async fn rate_limited_request_retried_exactly_once_after_barrier() {
    let catalog = MockCatalog {
        links: vec![link("epsilon"), link("steady")],
        pages: [
            ("epsilon".to_string(), page("epsilon")),
            ("steady".to_string(), page("steady")),
        ]
        .into_iter()
        .collect(),
        fail: HashSet::new(),
    };

    let discoverer = ScriptedDiscoverer::default();
    // First pass throttled, retry pass recovers.
    discoverer.respond(
        "epsilon",
        DiscoveryMethod::Extract,
        Err(DiscoveryError::RateLimited { status: 429 }),
    );
    discoverer.respond(
        "epsilon",
        DiscoveryMethod::Extract,
        extract_hit("https://youtu.be/epsilon1111"),
    );
    discoverer.respond("steady", DiscoveryMethod::Extract, extract_hit("https://youtu.be/steady11111"));

    let history = MockHistory { dates: HashMap::new() };
    let reconciler = Reconciler::new(&catalog, &discoverer, &history, fast_options());
    let mut run_log = RunLog::new();
    let (records, stats) = reconciler
        .run(catalog.index().await.unwrap(), Vec::new(), &mut run_log)
        .await
        .unwrap();

    // The throttled request went out once in each phase, no more.
    assert_eq!(discoverer.calls_for("epsilon", DiscoveryMethod::Extract), 2);
    assert_eq!(discoverer.calls_for("steady", DiscoveryMethod::Extract), 1);

    let epsilon = records.iter().find(|r| r.name == "epsilon").unwrap();
    assert_eq!(epsilon.demo_url.as_deref(), Some("https://youtu.be/epsilon1111"));
    assert_eq!(epsilon.demo_status, Some(DemoStatus::ExtractPreferred));

    assert_eq!(stats.retried, 1);
    assert_eq!(stats.recovered, 1);
    // Recovered discovery is not a degraded one.
    assert!(!stats.degraded.contains(&"epsilon".to_string()));
}

#[tokio::test]
async fn terminal_retry_failure_degrades_to_other_method() {
    let catalog = MockCatalog {
        links: vec![link("stuck")],
        pages: [("stuck".to_string(), page("stuck"))].into_iter().collect(),
        fail: HashSet::new(),
    };

    let discoverer = ScriptedDiscoverer::default();
    discoverer.respond(
        "stuck",
        DiscoveryMethod::Extract,
        Err(DiscoveryError::RateLimited { status: 429 }),
    );
    discoverer.respond(
        "stuck",
        DiscoveryMethod::Extract,
        Err(DiscoveryError::RateLimited { status: 429 }),
    );
    discoverer.respond("stuck", DiscoveryMethod::Render, render_hit("https://vimeo.com/77"));

    let history = MockHistory { dates: HashMap::new() };
    let reconciler = Reconciler::new(&catalog, &discoverer, &history, fast_options());
    let mut run_log = RunLog::new();
    let (records, stats) = reconciler
        .run(catalog.index().await.unwrap(), Vec::new(), &mut run_log)
        .await
        .unwrap();

    // Extract stayed throttled; resolution used the render result alone.
    let stuck = &records[0];
    assert_eq!(stuck.demo_url.as_deref(), Some("https://vimeo.com/77"));
    assert_eq!(stuck.demo_status, Some(DemoStatus::PlaywrightPreferred));

    assert_eq!(discoverer.calls_for("stuck", DiscoveryMethod::Extract), 2);
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.recovered, 0);
    assert!(stats.degraded.contains(&"stuck".to_string()));
}

#[tokio::test]
async fn transient_failure_not_retried() {
    let catalog = MockCatalog {
        links: vec![link("flaky")],
        pages: [("flaky".to_string(), page("flaky"))].into_iter().collect(),
        fail: HashSet::new(),
    };

    let discoverer = ScriptedDiscoverer::default();
    discoverer.respond(
        "flaky",
        DiscoveryMethod::Extract,
        Err(DiscoveryError::Transient("timeout".into())),
    );

    let history = MockHistory { dates: HashMap::new() };
    let reconciler = Reconciler::new(&catalog, &discoverer, &history, fast_options());
    let mut run_log = RunLog::new();
    let (records, stats) = reconciler
        .run(catalog.index().await.unwrap(), Vec::new(), &mut run_log)
        .await
        .unwrap();

    assert_eq!(discoverer.calls_for("flaky", DiscoveryMethod::Extract), 1);
    assert_eq!(stats.retried, 0);
    assert!(stats.degraded.contains(&"flaky".to_string()));
    // Both methods empty (one transient, one no-result): missing demo.
    assert_eq!(records[0].demo_status, Some(DemoStatus::MissingDemo));
}

#[tokio::test]
async fn out_of_sync_recomputed_not_accumulated() {
    // Stored record carries a stale Tags flag; this pass agrees on tags but
    // disagrees on description, so the set must be replaced, not unioned.
    let mut existing = page("omega");
    existing.description = "manually rewritten".into();
    existing.demo_url = Some("https://vimeo.com/1".into());
    existing.demo_status = Some(DemoStatus::ManualOverride);
    existing.out_of_sync = [SyncField::Tags].into_iter().collect();
    // Not complete: force a rescrape by blanking a field.
    existing.tags.clear();

    let catalog = MockCatalog {
        links: vec![link("omega")],
        pages: [("omega".to_string(), page("omega"))].into_iter().collect(),
        fail: HashSet::new(),
    };

    let discoverer = ScriptedDiscoverer::default();
    let history = MockHistory { dates: HashMap::new() };
    let reconciler = Reconciler::new(&catalog, &discoverer, &history, fast_options());
    let mut run_log = RunLog::new();
    let (records, _) = reconciler
        .run(catalog.index().await.unwrap(), vec![existing], &mut run_log)
        .await
        .unwrap();

    let omega = &records[0];
    assert_eq!(omega.description, "manually rewritten");
    assert!(omega.out_of_sync.contains(&SyncField::Description));
    assert!(!omega.out_of_sync.contains(&SyncField::Tags));
}
