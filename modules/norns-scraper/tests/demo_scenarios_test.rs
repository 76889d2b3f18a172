//! Demo resolution scenarios: resolver + merge + diff composed the way the
//! orchestrator composes them, with literal candidate lists. No I/O.

use norns_common::{DemoCandidate, DemoStatus, DiscoveryMethod, Platform, ScriptRecord};
use norns_scraper::merge::merge;
use norns_scraper::resolve::resolve_demo;
use norns_scraper::sync::diff;

fn candidate(url: &str, platform: Platform, method: DiscoveryMethod) -> DemoCandidate {
    DemoCandidate {
        url: url.to_string(),
        platform,
        method,
    }
}

fn extract(url: &str) -> DemoCandidate {
    candidate(url, Platform::YouTube, DiscoveryMethod::Extract)
}

fn render(url: &str) -> DemoCandidate {
    candidate(url, Platform::Vimeo, DiscoveryMethod::Render)
}

// Scenario A: nothing stored, only the static method finds a demo.
#[test]
fn extract_only_discovery_is_extract_preferred() {
    let (url, status) = resolve_demo(None, &[extract("https://youtu.be/v1v1v1v1v1v")], &[]);
    assert_eq!(url.as_deref(), Some("https://youtu.be/v1v1v1v1v1v"));
    assert_eq!(status, DemoStatus::ExtractPreferred);
}

// Scenario B: stored demo matches neither method; the render result wins.
#[test]
fn three_way_disagreement_prefers_render() {
    let (url, status) = resolve_demo(
        Some("https://soundcloud.com/someone/old-demo"),
        &[extract("https://youtu.be/yyyyyyyyyyy")],
        &[render("https://vimeo.com/333")],
    );
    assert_eq!(url.as_deref(), Some("https://vimeo.com/333"));
    assert_eq!(status, DemoStatus::PlaywrightPreferred);
}

// Scenario C: both methods agree with the stored value after normalization.
#[test]
fn full_agreement_is_no_conflict() {
    let (url, status) = resolve_demo(
        Some("https://www.youtube.com/watch?v=xxxxxxxxxxx"),
        &[extract("https://youtu.be/xxxxxxxxxxx")],
        &[candidate(
            "https://m.youtube.com/watch?v=xxxxxxxxxxx",
            Platform::YouTube,
            DiscoveryMethod::Render,
        )],
    );
    assert_eq!(url.as_deref(), Some("https://youtu.be/xxxxxxxxxxx"));
    assert_eq!(status, DemoStatus::NoConflict);
}

// Scenario D: a manually corrected author survives the merge and the diff
// flags the disagreement.
#[test]
fn manual_author_preserved_and_flagged() {
    let mut stored = ScriptRecord::new("oooooo", "https://norns.community/oooooo");
    stored.authors = vec!["trickyflemming".into()];

    let mut scraped = ScriptRecord::new("oooooo", "https://norns.community/oooooo");
    scraped.authors = vec!["tyler".into()];

    let merged = merge(&scraped, Some(&stored));
    assert_eq!(merged.authors, vec!["trickyflemming".to_string()]);

    let out_of_sync = diff(&scraped, &merged);
    assert!(out_of_sync.contains(&norns_common::SyncField::Authors));
}

// Scenario E: a brand-new fully populated script merges to itself with
// nothing out of sync.
#[test]
fn new_record_is_scraped_verbatim_with_empty_diff() {
    let mut scraped = ScriptRecord::new("fresh", "https://norns.community/fresh");
    scraped.authors = vec!["someone".into()];
    scraped.tags = ["synth".to_string()].into_iter().collect();
    scraped.description = "brand new".into();
    scraped.demo_url = Some("https://vimeo.com/42".into());
    scraped.discussion_url = Some("https://llllllll.co/t/fresh/1".into());
    scraped.project_url = Some("https://github.com/a/fresh".into());
    scraped.demo_status = Some(DemoStatus::NoConflict);

    let merged = merge(&scraped, None);
    assert_eq!(merged, scraped);
    assert!(diff(&scraped, &merged).is_empty());
}

// The stored value survives when discovery comes back empty-handed.
#[test]
fn stored_demo_with_no_corroboration_is_manual_override() {
    let (url, status) = resolve_demo(Some("https://vimeo.com/42"), &[], &[]);
    assert_eq!(url.as_deref(), Some("https://vimeo.com/42"));
    assert_eq!(status, DemoStatus::ManualOverride);
}

// Candidate-list ordering matters: only the top entry of each method is
// compared, later entries never override it.
#[test]
fn only_top_candidates_are_compared() {
    let (url, status) = resolve_demo(
        None,
        &[
            extract("https://youtu.be/aaaaaaaaaaa"),
            extract("https://youtu.be/bbbbbbbbbbb"),
        ],
        &[
            render("https://vimeo.com/111"),
            candidate(
                "https://youtu.be/aaaaaaaaaaa",
                Platform::YouTube,
                DiscoveryMethod::Render,
            ),
        ],
    );
    // Tops disagree even though deeper entries agree.
    assert_eq!(url.as_deref(), Some("https://vimeo.com/111"));
    assert_eq!(status, DemoStatus::PlaywrightPreferred);
}
