//! Diff Aggregator
//!
//! Given a repository, a newly published tag, and a host credential, resolves
//! the previous published tag, retrieves the commit range between the two,
//! and resolves pull requests referenced by those commits into a normalized
//! change-set.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{ChangeSet, CommitInfo, PullRequestInfo};
use crate::services::github::{HostError, HostRelease, ReleaseHost};

/// Page size used when resolving the previous tag
const RELEASE_PAGE_SIZE: u32 = 10;

/// Hard cap on individual pull-request fetches per change-set
const MAX_PR_FETCHES: usize = 20;

/// Errors from change-set aggregation
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("No release found for tag {0}")]
    ReleaseNotFound(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Builds normalized change-sets from the source host
pub struct DiffAggregator {
    host: Arc<dyn ReleaseHost>,
}

impl DiffAggregator {
    pub fn new(host: Arc<dyn ReleaseHost>) -> Self {
        Self { host }
    }

    /// Aggregate the change-set for `tag_name`.
    ///
    /// Fails if the tag's release metadata cannot be retrieved. A missing
    /// previous tag is not an error: the change-set simply carries no
    /// commits. Individual pull-request fetch failures are skipped.
    pub async fn aggregate(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        tag_name: &str,
    ) -> Result<(HostRelease, ChangeSet), DiffError> {
        let release = self
            .host
            .release_by_tag(token, owner, repo, tag_name)
            .await?
            .ok_or_else(|| DiffError::ReleaseNotFound(tag_name.to_string()))?;

        let previous_tag = self.resolve_previous_tag(token, owner, repo, tag_name).await?;

        let commits = match &previous_tag {
            Some(previous) => {
                let range = self
                    .host
                    .compare_commits(token, owner, repo, previous, tag_name)
                    .await?;
                range
                    .into_iter()
                    .map(|c| CommitInfo {
                        sha: c.sha,
                        // Prefer the linked account login over the raw commit
                        // author name.
                        author_name: c
                            .author_login
                            .or(c.author_name)
                            .unwrap_or_else(|| "unknown".to_string()),
                        message: c.message,
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        let pull_requests = self
            .fetch_referenced_pulls(token, owner, repo, &commits)
            .await;

        debug!(
            %owner, %repo, %tag_name,
            previous_tag = previous_tag.as_deref().unwrap_or("-"),
            commits = commits.len(),
            pull_requests = pull_requests.len(),
            "aggregated change-set"
        );

        Ok((
            release,
            ChangeSet {
                previous_tag,
                commits,
                pull_requests,
            },
        ))
    }

    /// Newest releases first, as the host lists them. Used by the backfill
    /// path to pick import candidates.
    pub async fn list_recent(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        count: u32,
    ) -> Result<Vec<HostRelease>, DiffError> {
        Ok(self.host.list_releases(token, owner, repo, count).await?)
    }

    /// Resolve the tag published immediately before `tag_name`.
    ///
    /// Looks at the newest `RELEASE_PAGE_SIZE` releases, newest first; the
    /// entry after `tag_name`'s position is the previous tag. If `tag_name`
    /// is the oldest entry on the page, or absent from it, there is no
    /// previous tag.
    async fn resolve_previous_tag(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        tag_name: &str,
    ) -> Result<Option<String>, DiffError> {
        let releases = self
            .host
            .list_releases(token, owner, repo, RELEASE_PAGE_SIZE)
            .await?;

        let position = releases.iter().position(|r| r.tag_name == tag_name);
        Ok(position
            .and_then(|i| releases.get(i + 1))
            .map(|r| r.tag_name.clone()))
    }

    /// Fetch the pull requests referenced by the commit messages.
    ///
    /// Numbers are deduplicated and capped at `MAX_PR_FETCHES`; a failing
    /// individual fetch is logged and skipped, never fatal.
    async fn fetch_referenced_pulls(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        commits: &[CommitInfo],
    ) -> Vec<PullRequestInfo> {
        let mut seen = HashSet::new();
        let mut numbers = Vec::new();
        for commit in commits {
            for number in extract_pr_numbers(&commit.message) {
                if seen.insert(number) {
                    numbers.push(number);
                }
            }
        }
        numbers.truncate(MAX_PR_FETCHES);

        let mut pulls = Vec::new();
        for number in numbers {
            match self.host.pull_request(token, owner, repo, number).await {
                Ok(pull) => pulls.push(PullRequestInfo {
                    number: pull.number,
                    title: pull.title,
                    body: pull.body,
                    labels: pull.labels,
                    author_login: pull.author_login,
                }),
                Err(e) => {
                    warn!(%owner, %repo, number, error = %e, "skipping unresolvable pull request");
                }
            }
        }
        pulls
    }
}

/// Extract pull-request numbers referenced by a commit message.
///
/// Two reference shapes are recognized: the merge-commit form
/// ("Merge pull request #N ...") and the squash-merge form, a trailing
/// "(#N)" at the end of the subject line.
pub fn extract_pr_numbers(message: &str) -> Vec<u64> {
    let mut numbers = Vec::new();
    let subject = message.lines().next().unwrap_or("");

    let lowered = subject.to_ascii_lowercase();
    if let Some(idx) = lowered.find("merge pull request #") {
        let digits: String = subject[idx + "merge pull request #".len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(n) = digits.parse() {
            numbers.push(n);
        }
    }

    let trimmed = subject.trim_end();
    if let Some(open) = trimmed.rfind("(#") {
        if let Some(inner) = trimmed[open + 2..].strip_suffix(')') {
            if trimmed.ends_with(')') && !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(n) = inner.parse() {
                    numbers.push(n);
                }
            }
        }
    }

    numbers
}
