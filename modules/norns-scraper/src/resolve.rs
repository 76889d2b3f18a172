//! Demo conflict resolution: one final URL plus a status from the existing
//! stored value and the two per-method candidate lists.
//!
//! Pure and synchronous. URLs are compared by `demo_key` (scheme-stripped
//! host+path+video-id), never raw, so `youtu.be/x` and
//! `youtube.com/watch?v=x` agree.

use norns_common::normalize::demo_key;
use norns_common::{is_blank, DemoCandidate, DemoStatus};

/// Resolve the final demo URL for one script.
///
/// Decision table, first match wins:
/// 1. no candidates at all: keep the existing value; `MissingDemo` when
///    there is none, `ManualOverride` when a stored value survives with no
///    fresh corroboration
/// 2. both methods agree on their top candidate: that URL, `NoConflict`
/// 3. only the rendered method found something: `PlaywrightPreferred`
/// 4. only the static method found something: `ExtractPreferred`
/// 5. methods disagree and the stored value matches neither: prefer the
///    rendered candidate (see `RENDER_WINS_TIEBREAK`)
/// 6. methods disagree but the stored value matches one of them: the stored
///    value stands, `ManualOverride`
pub fn resolve_demo(
    existing: Option<&str>,
    extract: &[DemoCandidate],
    render: &[DemoCandidate],
) -> (Option<String>, DemoStatus) {
    let existing = existing.filter(|s| !is_blank(s));

    let (ext_top, ren_top) = (extract.first(), render.first());
    match (ext_top, ren_top) {
        (None, None) => match existing {
            None => (None, DemoStatus::MissingDemo),
            Some(kept) => (Some(kept.to_string()), DemoStatus::ManualOverride),
        },
        (Some(e), None) => (Some(e.url.clone()), DemoStatus::ExtractPreferred),
        (None, Some(r)) => (Some(r.url.clone()), DemoStatus::PlaywrightPreferred),
        (Some(e), Some(r)) => {
            let (e_key, r_key) = (demo_key(&e.url), demo_key(&r.url));
            if e_key == r_key {
                return (Some(e.url.clone()), DemoStatus::NoConflict);
            }
            match existing {
                Some(kept) if demo_key(kept) == e_key || demo_key(kept) == r_key => {
                    (Some(kept.to_string()), DemoStatus::ManualOverride)
                }
                _ => render_wins_tiebreak(r),
            }
        }
    }
}

/// Named policy decision: when the two methods disagree and no stored value
/// settles it, the rendered page wins. Browsers surface embed-only providers
/// that static parsing misses far more often than the reverse. Substitute a
/// different policy here, nowhere else.
fn render_wins_tiebreak(render_top: &DemoCandidate) -> (Option<String>, DemoStatus) {
    (
        Some(render_top.url.clone()),
        DemoStatus::PlaywrightPreferred,
    )
}
