//! Source-hosting provider: the narrow GitHub surface the pipeline needs.
//!
//! [`HostingProvider`] is the seam; [`GitHubClient`] is the REST
//! implementation. Every method reports "not found" as
//! [`HostingError::NotFound`] so callers can branch on it.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::errors::HostingError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const BRANCH: &str = "main";

/// A hosted repository (subset of fields we care about).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// A file read from a repository, content already decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoFile {
    pub path: String,
    /// Blob hash; doubles as the optimistic-concurrency token for updates.
    pub sha: String,
    pub content: String,
}

/// A commit produced by a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// Pages site configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagesSite {
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub build_type: Option<String>,
}

/// An automation (Actions) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

impl WorkflowRun {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }

    pub fn succeeded(&self) -> bool {
        self.conclusion.as_deref() == Some("success")
    }
}

/// Operations the pipeline performs against the hosting provider.
///
/// All repositories belong to [`HostingProvider::owner`].
/// Real implementation: `GitHubClient`. Test double: `FakeHosting`.
#[async_trait]
pub trait HostingProvider: Send + Sync {
    /// Account that owns every repository this provider touches.
    fn owner(&self) -> &str;

    async fn get_repo(&self, repo: &str) -> Result<Repository, HostingError>;

    async fn create_repo(&self, repo: &str, private: bool) -> Result<Repository, HostingError>;

    async fn get_file(&self, repo: &str, path: &str) -> Result<RepoFile, HostingError>;

    /// Create (`sha = None`) or update (`sha = Some(current)`) a file.
    /// Returns the commit when the provider reports one.
    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<Option<CommitRef>, HostingError>;

    async fn latest_commit(&self, repo: &str) -> Result<CommitRef, HostingError>;

    async fn get_pages(&self, repo: &str) -> Result<PagesSite, HostingError>;

    /// Enable pages with the Actions workflow as build source.
    async fn create_pages(&self, repo: &str) -> Result<(), HostingError>;

    async fn list_runs_for_commit(
        &self,
        repo: &str,
        commit_sha: &str,
    ) -> Result<Vec<WorkflowRun>, HostingError>;

    async fn get_run(&self, repo: &str, run_id: u64) -> Result<WorkflowRun, HostingError>;
}

// ── REST implementation ───────────────────────────────────────────────

#[derive(Deserialize)]
struct ContentResponse {
    path: String,
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct PutFileResponse {
    #[serde(default)]
    commit: Option<CommitRef>,
}

#[derive(Deserialize)]
struct RunsResponse {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Serialize)]
struct PutFileBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// GitHub REST API client authenticated with a personal access token.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    token: String,
}

impl GitHubClient {
    pub fn new(
        api_url: &str,
        owner: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self, HostingError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent("pagesmith")
            .build()
            .map_err(HostingError::Transport)?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            token: token.to_string(),
        })
    }

    fn repo_url(&self, repo: &str, suffix: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_url, self.owner, repo, suffix)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        resource: &str,
    ) -> Result<reqwest::Response, HostingError> {
        let resp = builder.send().await.map_err(HostingError::Transport)?;
        check_status(resp, resource).await
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(
    resp: reqwest::Response,
    resource: &str,
) -> Result<reqwest::Response, HostingError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message: String = body.chars().take(300).collect();
    Err(match status {
        StatusCode::NOT_FOUND => HostingError::not_found(resource),
        StatusCode::CONFLICT => HostingError::Conflict { message },
        _ => HostingError::Api {
            status: status.as_u16(),
            message,
        },
    })
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, HostingError> {
    resp.json::<T>()
        .await
        .map_err(|e| HostingError::Decode(e.to_string()))
}

/// Decode the base64 blob GitHub returns (wrapped at 60 columns).
pub fn decode_content(encoded: &str) -> Result<String, HostingError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| HostingError::Decode(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| HostingError::Decode(format!("content is not UTF-8: {}", e)))
}

#[async_trait]
impl HostingProvider for GitHubClient {
    fn owner(&self) -> &str {
        &self.owner
    }

    async fn get_repo(&self, repo: &str) -> Result<Repository, HostingError> {
        let url = self.repo_url(repo, "");
        let resp = self
            .send(self.request(reqwest::Method::GET, &url), &format!("repository {}", repo))
            .await?;
        decode_json(resp).await
    }

    async fn create_repo(&self, repo: &str, private: bool) -> Result<Repository, HostingError> {
        let url = format!("{}/user/repos", self.api_url);
        let body = serde_json::json!({ "name": repo, "private": private });
        let resp = self
            .send(
                self.request(reqwest::Method::POST, &url).json(&body),
                &format!("repository {}", repo),
            )
            .await?;
        decode_json(resp).await
    }

    async fn get_file(&self, repo: &str, path: &str) -> Result<RepoFile, HostingError> {
        let url = self.repo_url(repo, &format!("/contents/{}", path));
        let resp = self
            .send(
                self.request(reqwest::Method::GET, &url)
                    .query(&[("ref", BRANCH)]),
                &format!("{}/{}", repo, path),
            )
            .await?;
        let body: ContentResponse = decode_json(resp).await?;
        Ok(RepoFile {
            content: decode_content(&body.content)?,
            path: body.path,
            sha: body.sha,
        })
    }

    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<Option<CommitRef>, HostingError> {
        let url = self.repo_url(repo, &format!("/contents/{}", path));
        let body = PutFileBody {
            message,
            content: BASE64.encode(content.as_bytes()),
            branch: BRANCH,
            sha,
        };
        let resp = self
            .send(
                self.request(reqwest::Method::PUT, &url).json(&body),
                &format!("{}/{}", repo, path),
            )
            .await?;
        let body: PutFileResponse = decode_json(resp).await?;
        Ok(body.commit)
    }

    async fn latest_commit(&self, repo: &str) -> Result<CommitRef, HostingError> {
        let url = self.repo_url(repo, "/commits");
        let resp = self
            .send(
                self.request(reqwest::Method::GET, &url)
                    .query(&[("sha", BRANCH), ("per_page", "1")]),
                &format!("commits of {}", repo),
            )
            .await?;
        let commits: Vec<CommitRef> = decode_json(resp).await?;
        commits
            .into_iter()
            .next()
            .ok_or_else(|| HostingError::not_found(format!("commits of {}", repo)))
    }

    async fn get_pages(&self, repo: &str) -> Result<PagesSite, HostingError> {
        let url = self.repo_url(repo, "/pages");
        let resp = self
            .send(self.request(reqwest::Method::GET, &url), &format!("pages of {}", repo))
            .await?;
        decode_json(resp).await
    }

    async fn create_pages(&self, repo: &str) -> Result<(), HostingError> {
        let url = self.repo_url(repo, "/pages");
        let body = serde_json::json!({
            "source": { "branch": BRANCH, "path": "/" },
            "build_type": "workflow",
        });
        self.send(
            self.request(reqwest::Method::POST, &url).json(&body),
            &format!("pages of {}", repo),
        )
        .await?;
        Ok(())
    }

    async fn list_runs_for_commit(
        &self,
        repo: &str,
        commit_sha: &str,
    ) -> Result<Vec<WorkflowRun>, HostingError> {
        let url = self.repo_url(repo, "/actions/runs");
        let resp = self
            .send(
                self.request(reqwest::Method::GET, &url)
                    .query(&[("head_sha", commit_sha)]),
                &format!("runs of {}", repo),
            )
            .await?;
        let body: RunsResponse = decode_json(resp).await?;
        Ok(body.workflow_runs)
    }

    async fn get_run(&self, repo: &str, run_id: u64) -> Result<WorkflowRun, HostingError> {
        let url = self.repo_url(repo, &format!("/actions/runs/{}", run_id));
        let resp = self
            .send(
                self.request(reqwest::Method::GET, &url),
                &format!("run {} of {}", run_id, repo),
            )
            .await?;
        decode_json(resp).await
    }
}
