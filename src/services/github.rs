//! Source-Repository Host Client
//!
//! Consumes the source host's REST API: release lookup, release listing,
//! commit comparison, pull requests, and webhook registration. All calls are
//! keyed by an opaque bearer token. The `ReleaseHost` trait is the seam the
//! aggregator and handlers depend on; `GitHubClient` is the live
//! implementation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from the source-host API
#[derive(Debug, Error)]
pub enum HostError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("host returned {status}: {body}")]
    Server { status: u16, body: String },
}

/// Release metadata as the host reports it
#[derive(Debug, Clone, Deserialize)]
pub struct HostRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    pub html_url: Option<String>,
}

/// One commit from a comparison range
#[derive(Debug, Clone)]
pub struct HostCommit {
    pub sha: String,
    pub message: String,
    /// Raw commit author name
    pub author_name: Option<String>,
    /// Linked account login, when the host could resolve one
    pub author_login: Option<String>,
}

/// Pull request metadata
#[derive(Debug, Clone)]
pub struct HostPull {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub author_login: Option<String>,
}

/// Repository listing entry for the connect flow
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRepo {
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Seam over the source host's API, keyed by a bearer token per call
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Fetch a release by tag. `None` means the host has no release for it.
    async fn release_by_tag(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Option<HostRelease>, HostError>;

    /// List the most recent releases, newest first.
    async fn list_releases(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<HostRelease>, HostError>;

    /// Commits in the `base...head` range, oldest first.
    async fn compare_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Vec<HostCommit>, HostError>;

    /// Fetch a single pull request.
    async fn pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<HostPull, HostError>;

    /// Register a release webhook; returns the host's webhook id.
    async fn create_release_webhook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        callback_url: &str,
        secret: &str,
    ) -> Result<i64, HostError>;

    /// Remove a previously registered webhook.
    async fn delete_webhook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        hook_id: i64,
    ) -> Result<(), HostError>;

    /// Repositories visible to the token's owner.
    async fn list_viewer_repos(&self, token: &str) -> Result<Vec<HostRepo>, HostError>;
}

/// Live GitHub REST implementation
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
}

// Wire shapes for the endpoints we consume.

#[derive(Deserialize)]
struct CompareResponse {
    commits: Vec<CompareCommit>,
}

#[derive(Deserialize)]
struct CompareCommit {
    sha: String,
    commit: CommitDetail,
    author: Option<AccountRef>,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    name: Option<String>,
}

#[derive(Deserialize)]
struct AccountRef {
    login: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    body: Option<String>,
    labels: Vec<LabelRef>,
    user: Option<AccountRef>,
}

#[derive(Deserialize)]
struct LabelRef {
    name: String,
}

#[derive(Deserialize)]
struct HookResponse {
    id: i64,
}

impl GitHubClient {
    /// Build a client against the public GitHub API.
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url("https://api.github.com".to_string(), timeout)
    }

    /// Build a client against an alternate base URL (enterprise hosts, tests).
    pub fn with_base_url(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("shipnotes")
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, token: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
    }

    /// Read the body of a non-success response into a `Server` error.
    async fn server_error(resp: reqwest::Response) -> HostError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        HostError::Server { status, body }
    }
}

#[async_trait]
impl ReleaseHost for GitHubClient {
    async fn release_by_tag(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Option<HostRelease>, HostError> {
        let path = format!("/repos/{owner}/{repo}/releases/tags/{tag}");
        debug!(%owner, %repo, %tag, "fetching release by tag");

        let resp = self.get(token, &path).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::server_error(resp).await);
        }
        Ok(Some(resp.json().await?))
    }

    async fn list_releases(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<HostRelease>, HostError> {
        let path = format!("/repos/{owner}/{repo}/releases?per_page={per_page}");

        let resp = self.get(token, &path).send().await?;
        if !resp.status().is_success() {
            return Err(Self::server_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn compare_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Vec<HostCommit>, HostError> {
        let path = format!("/repos/{owner}/{repo}/compare/{base}...{head}");
        debug!(%owner, %repo, %base, %head, "fetching commit comparison");

        let resp = self.get(token, &path).send().await?;
        if !resp.status().is_success() {
            return Err(Self::server_error(resp).await);
        }
        let compare: CompareResponse = resp.json().await?;

        Ok(compare
            .commits
            .into_iter()
            .map(|c| HostCommit {
                sha: c.sha,
                message: c.commit.message,
                author_name: c.commit.author.and_then(|a| a.name),
                author_login: c.author.map(|a| a.login),
            })
            .collect())
    }

    async fn pull_request(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<HostPull, HostError> {
        let path = format!("/repos/{owner}/{repo}/pulls/{number}");

        let resp = self.get(token, &path).send().await?;
        if !resp.status().is_success() {
            return Err(Self::server_error(resp).await);
        }
        let pull: PullResponse = resp.json().await?;

        Ok(HostPull {
            number: pull.number,
            title: pull.title,
            body: pull.body,
            labels: pull.labels.into_iter().map(|l| l.name).collect(),
            author_login: pull.user.map(|u| u.login),
        })
    }

    async fn create_release_webhook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        callback_url: &str,
        secret: &str,
    ) -> Result<i64, HostError> {
        let payload = json!({
            "name": "web",
            "active": true,
            "events": ["release"],
            "config": {
                "url": callback_url,
                "content_type": "json",
                "secret": secret,
            },
        });

        let resp = self
            .client
            .post(format!("{}/repos/{owner}/{repo}/hooks", self.base_url))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::server_error(resp).await);
        }
        let hook: HookResponse = resp.json().await?;
        Ok(hook.id)
    }

    async fn delete_webhook(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        hook_id: i64,
    ) -> Result<(), HostError> {
        let resp = self
            .client
            .delete(format!(
                "{}/repos/{owner}/{repo}/hooks/{hook_id}",
                self.base_url
            ))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(Self::server_error(resp).await);
        }
        Ok(())
    }

    async fn list_viewer_repos(&self, token: &str) -> Result<Vec<HostRepo>, HostError> {
        let resp = self
            .get(token, "/user/repos?per_page=100&sort=updated")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::server_error(resp).await);
        }
        Ok(resp.json().await?)
    }
}
