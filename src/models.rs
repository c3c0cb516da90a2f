use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Files every task repository carries.
pub mod paths {
    pub const DATA: &str = "data.json";
    pub const CODE: &str = "app.py";
    pub const REQUIREMENTS: &str = "requirements.txt";
    pub const LICENSE: &str = "LICENSE";
    pub const README: &str = "README.md";
    pub const CONTEXT: &str = "context.json";
    pub const WORKFLOW_DIR: &str = ".github/workflows";

    pub fn workflow(file_name: &str) -> String {
        format!("{}/{}", WORKFLOW_DIR, file_name)
    }
}

/// One attachment: a name and a data URI or link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A task-round request as received from the intake endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub brief: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub checks: Vec<String>,
    pub evaluation_url: String,
}

/// Intake body: a task request plus the shared secret.
#[derive(Debug, Deserialize)]
pub struct IntakeRequest {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(flatten)]
    pub request: TaskRequest,
}

/// `data.json` contents.
#[derive(Debug, Serialize)]
pub struct DataFile<'a> {
    pub attachments: &'a [Attachment],
}

/// Body posted to the evaluation endpoint once a round is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPayload {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: Option<String>,
    pub pages_url: String,
}

impl EvaluationPayload {
    pub fn for_request(
        request: &TaskRequest,
        repo_url: &str,
        commit_sha: Option<String>,
        pages_url: &str,
    ) -> Self {
        Self {
            email: request.email.clone(),
            task: request.task.clone(),
            round: request.round,
            nonce: request.nonce.clone(),
            repo_url: repo_url.to_string(),
            commit_sha,
            pages_url: pages_url.to_string(),
        }
    }
}

/// Derive the repository name for a task: `{task}-{first 8 hex of sha1(task)}`.
///
/// Pure function of `task`, so every round and every process restart finds
/// the same repository without any stored mapping.
pub fn repo_name_for_task(task: &str) -> String {
    let digest = Sha1::digest(task.as_bytes());
    let hex = format!("{:x}", digest);
    let short = &hex[..8];
    format!("{}-{}", task, short)
}

/// Public GitHub Pages URL for a repository.
pub fn pages_url(owner: &str, repo: &str) -> String {
    format!("https://{}.github.io/{}/", owner, repo)
}
