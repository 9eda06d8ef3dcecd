//! Change-set value types: the normalized commit+PR delta between two tags

use serde::{Deserialize, Serialize};

/// Immutable facts extracted from an inbound release notification
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseEvent {
    pub repo_full_name: String,
    pub tag_name: String,
    pub action: String,
    pub release_url: Option<String>,
}

/// One commit in the comparison range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: String,
}

/// One pull request referenced by the commit range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub author_login: Option<String>,
}

/// Normalized delta between a release's tag and the previous tag.
///
/// Commits are ordered oldest-to-newest as returned by the comparison range;
/// pull requests are deduplicated by number. Owned by one orchestration run,
/// never persisted directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub previous_tag: Option<String>,
    pub commits: Vec<CommitInfo>,
    pub pull_requests: Vec<PullRequestInfo>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty() && self.pull_requests.is_empty()
    }
}

/// Header facts handed to the generator and distributor
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    pub repo_full_name: String,
    pub tag_name: String,
    pub release_url: Option<String>,
}
