//! GitHub commit-history collaborator: the date of the latest commit that
//! touched something other than README.md. README-only commits are noise
//! for "is this script still maintained", which is all `last_updated`
//! answers.
//!
//! Every failure path degrades to `None` (absent, not an error): scripts
//! without a GitHub project URL, deleted repos, and exhausted rate limits
//! all simply leave the stored date alone.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use norns_common::ScriptRecord;

/// Commits scanned at most: 3 pages of 50.
const COMMIT_PAGES: u32 = 3;
const COMMITS_PER_PAGE: u32 = 50;
/// Spacing between commit-list pages.
const PAGE_DELAY: Duration = Duration::from_millis(200);

#[async_trait]
pub trait CommitHistory: Send + Sync {
    /// Date of the newest non-README-only commit on the default branch,
    /// or `None` when the repo (or the answer) is unavailable.
    async fn latest_non_readme_date(&self, owner: &str, repo: &str) -> Option<NaiveDate>;
}

pub struct GithubClient {
    client: reqwest::Client,
    token: Option<String>,
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct CommitSummary {
    sha: String,
}

#[derive(Deserialize)]
struct CommitDetail {
    #[serde(default)]
    files: Vec<CommitFile>,
    commit: CommitMeta,
}

#[derive(Deserialize)]
struct CommitFile {
    #[serde(default)]
    filename: String,
}

#[derive(Deserialize)]
struct CommitMeta {
    committer: Option<Signer>,
    author: Option<Signer>,
}

#[derive(Deserialize)]
struct Signer {
    date: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("norns-scraper/0.1")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            token: token.map(String::from),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Option<T> {
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.ok()?;
        let status = resp.status();
        // 403 is GitHub's rate-limit answer for unauthenticated clients;
        // give up on this repo rather than stall the whole run.
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "GitHub request unsuccessful");
            return None;
        }
        resp.json().await.ok()
    }
}

#[async_trait]
impl CommitHistory for GithubClient {
    async fn latest_non_readme_date(&self, owner: &str, repo: &str) -> Option<NaiveDate> {
        let base = format!("https://api.github.com/repos/{owner}/{repo}");
        let info: RepoInfo = self.get_json(&base).await?;
        let branch = info.default_branch.unwrap_or_else(|| "main".to_string());

        for page in 1..=COMMIT_PAGES {
            let list_url = format!(
                "{base}/commits?sha={branch}&per_page={COMMITS_PER_PAGE}&page={page}"
            );
            let commits: Vec<CommitSummary> = self.get_json(&list_url).await?;
            if commits.is_empty() {
                break;
            }

            for summary in commits {
                let detail_url = format!("{base}/commits/{}", summary.sha);
                let Some(detail) = self.get_json::<CommitDetail>(&detail_url).await else {
                    continue;
                };
                if is_readme_only(&detail.files) {
                    continue;
                }
                let date = detail
                    .commit
                    .committer
                    .and_then(|c| c.date)
                    .or(detail.commit.author.and_then(|a| a.date));
                let Some(date) = date else { continue };
                return parse_commit_date(&date);
            }

            tokio::time::sleep(PAGE_DELAY).await;
        }

        None
    }
}

/// True when every changed file is a README.md (case-insensitive basename).
/// An empty file list is not README-only; it means the API gave us nothing
/// to judge by.
fn is_readme_only(files: &[CommitFile]) -> bool {
    !files.is_empty()
        && files.iter().all(|f| {
            f.filename
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .eq_ignore_ascii_case("readme.md")
        })
}

/// `(owner, repo)` if the URL points at a GitHub repository.
pub fn parse_github_repo(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if !host.ends_with("github.com") {
        return None;
    }
    let mut segs = parsed.path().split('/').filter(|s| !s.is_empty());
    let owner = segs.next()?.to_string();
    let repo = segs.next()?.trim_end_matches(".git").to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((owner, repo))
}

fn parse_commit_date(iso: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(iso.get(..10)?, "%Y-%m-%d").ok()
}

/// Enrich records with `last_updated` from their project URLs. Each
/// distinct repo is queried once, concurrently, and the result fans back
/// out to every record sharing it.
pub async fn apply_last_updated(
    records: &mut [ScriptRecord],
    history: &dyn CommitHistory,
    workers: usize,
) {
    let mut repo_to_indices: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        if let Some((owner, repo)) = record
            .project_url
            .as_deref()
            .and_then(parse_github_repo)
        {
            repo_to_indices.entry((owner, repo)).or_default().push(idx);
        }
    }
    if repo_to_indices.is_empty() {
        return;
    }

    info!(repos = repo_to_indices.len(), "Fetching last-updated dates from GitHub");

    let dates: Vec<((String, String), Option<NaiveDate>)> =
        stream::iter(repo_to_indices.keys().cloned())
            .map(|key| async move {
                let date = history.latest_non_readme_date(&key.0, &key.1).await;
                (key, date)
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

    for (key, date) in dates {
        let Some(date) = date else { continue };
        for &idx in &repo_to_indices[&key] {
            records[idx].last_updated = Some(date);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_parsed_from_project_url() {
        assert_eq!(
            parse_github_repo("https://github.com/schollz/mx.synths"),
            Some(("schollz".to_string(), "mx.synths".to_string()))
        );
        assert_eq!(
            parse_github_repo("https://www.github.com/tehn/awake.git"),
            Some(("tehn".to_string(), "awake".to_string()))
        );
    }

    #[test]
    fn non_github_urls_rejected() {
        assert_eq!(parse_github_repo("https://llllllll.co/t/awake"), None);
        assert_eq!(parse_github_repo("https://github.com/onlyowner"), None);
        assert_eq!(parse_github_repo("not a url"), None);
    }

    #[test]
    fn readme_only_detection() {
        let files = |names: &[&str]| {
            names
                .iter()
                .map(|n| CommitFile {
                    filename: n.to_string(),
                })
                .collect::<Vec<_>>()
        };
        assert!(is_readme_only(&files(&["README.md"])));
        assert!(is_readme_only(&files(&["docs/readme.md", "README.md"])));
        assert!(!is_readme_only(&files(&["README.md", "src/main.lua"])));
        assert!(!is_readme_only(&files(&[])));
    }

    #[test]
    fn commit_date_truncated_to_day() {
        assert_eq!(
            parse_commit_date("2024-11-03T12:30:00Z"),
            NaiveDate::from_ymd_opt(2024, 11, 3)
        );
        assert_eq!(parse_commit_date("garbage"), None);
    }
}
