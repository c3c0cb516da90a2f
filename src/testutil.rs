//! In-memory fakes for the provider seams, shared by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::clock::Clock;
use crate::errors::{CompletionError, HostingError, NotifyError};
use crate::hosting::{CommitRef, HostingProvider, PagesSite, RepoFile, Repository, WorkflowRun};
use crate::llm::CompletionProvider;
use crate::models::EvaluationPayload;
use crate::notify::EvaluationSink;

pub const OWNER: &str = "octocat";

/// Scripted hosting failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    Conflict,
    Server,
}

impl Failure {
    fn into_error(self, resource: &str) -> HostingError {
        match self {
            Failure::NotFound => HostingError::not_found(resource),
            Failure::Conflict => HostingError::Conflict {
                message: format!("{} busy", resource),
            },
            Failure::Server => HostingError::Api {
                status: 500,
                message: format!("{} exploded", resource),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub repo: String,
    pub path: String,
    pub content: String,
    pub sha: Option<String>,
}

#[derive(Default)]
struct HostingState {
    repos: HashSet<String>,
    created_repos: Vec<String>,
    files: HashMap<(String, String), (String, String)>,
    writes: Vec<WriteRecord>,
    next_id: u64,
    commits: Vec<String>,
    read_failures: HashMap<String, Failure>,
    write_failures: HashSet<String>,
    omit_commit: bool,
    pages: HashSet<String>,
    pages_script: VecDeque<Failure>,
    pages_create_calls: u32,
    runs: HashMap<String, Vec<WorkflowRun>>,
    run_polls: HashMap<u64, VecDeque<Result<WorkflowRun, Failure>>>,
    hidden_run_lists: u32,
    run_list_calls: u32,
    run_list_failure: Option<Failure>,
    auto_deploy: Option<&'static str>,
}

/// In-memory hosting provider.
///
/// Every commit that lands registers a completed run of the deploy workflow
/// with the configured conclusion (`success` by default), so end-to-end
/// tests reach the evaluator without scripting runs by hand. Repository
/// lookups and content calls yield once, so runs joined on one task
/// interleave at every hosting call.
pub struct FakeHosting {
    state: Mutex<HostingState>,
}

impl FakeHosting {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HostingState {
                auto_deploy: Some("success"),
                ..HostingState::default()
            }),
        })
    }

    pub fn with_repo(repo: &str) -> Arc<Self> {
        let fake = Self::new();
        fake.lock().repos.insert(repo.to_string());
        fake
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostingState> {
        self.state.lock().unwrap()
    }

    pub fn seed_file(&self, repo: &str, path: &str, content: &str) {
        let mut state = self.lock();
        state.next_id += 1;
        let sha = format!("blob-{}", state.next_id);
        state
            .files
            .insert((repo.to_string(), path.to_string()), (content.to_string(), sha));
    }

    pub fn file(&self, repo: &str, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&(repo.to_string(), path.to_string()))
            .map(|(content, _)| content.clone())
    }

    pub fn file_sha(&self, repo: &str, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&(repo.to_string(), path.to_string()))
            .map(|(_, sha)| sha.clone())
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn written_paths(&self) -> Vec<String> {
        self.lock().writes.iter().map(|w| w.path.clone()).collect()
    }

    pub fn created_repos(&self) -> Vec<String> {
        self.lock().created_repos.clone()
    }

    pub fn fail_reads_of(&self, path: &str, failure: Failure) {
        self.lock().read_failures.insert(path.to_string(), failure);
    }

    pub fn fail_writes_of(&self, path: &str) {
        self.lock().write_failures.insert(path.to_string());
    }

    pub fn omit_commit_metadata(&self) {
        self.lock().omit_commit = true;
    }

    pub fn set_pages_enabled(&self, repo: &str) {
        self.lock().pages.insert(repo.to_string());
    }

    pub fn script_pages_creation(&self, failures: Vec<Failure>) {
        self.lock().pages_script = failures.into();
    }

    pub fn pages_create_calls(&self) -> u32 {
        self.lock().pages_create_calls
    }

    pub fn set_runs(&self, commit_sha: &str, runs: Vec<WorkflowRun>) {
        self.lock().runs.insert(commit_sha.to_string(), runs);
    }

    pub fn script_run_polls(&self, run_id: u64, polls: Vec<Result<WorkflowRun, Failure>>) {
        self.lock().run_polls.insert(run_id, polls.into());
    }

    /// The next `n` run listings come back empty.
    pub fn hide_runs_for(&self, n: u32) {
        self.lock().hidden_run_lists = n;
    }

    pub fn fail_run_listing(&self, failure: Failure) {
        self.lock().run_list_failure = Some(failure);
    }

    pub fn run_list_calls(&self) -> u32 {
        self.lock().run_list_calls
    }

    /// Conclusion of the run registered for each new commit; `None` disables.
    pub fn auto_deploy(&self, conclusion: Option<&'static str>) {
        self.lock().auto_deploy = conclusion;
    }
}

fn repository(repo: &str) -> Repository {
    Repository {
        name: repo.to_string(),
        full_name: format!("{}/{}", OWNER, repo),
        html_url: format!("https://github.com/{}/{}", OWNER, repo),
        default_branch: Some("main".to_string()),
    }
}

#[async_trait]
impl HostingProvider for FakeHosting {
    fn owner(&self) -> &str {
        OWNER
    }

    async fn get_repo(&self, repo: &str) -> Result<Repository, HostingError> {
        tokio::task::yield_now().await;
        if self.lock().repos.contains(repo) {
            Ok(repository(repo))
        } else {
            Err(HostingError::not_found(format!("repository {}", repo)))
        }
    }

    async fn create_repo(&self, repo: &str, _private: bool) -> Result<Repository, HostingError> {
        let mut state = self.lock();
        state.repos.insert(repo.to_string());
        state.created_repos.push(repo.to_string());
        Ok(repository(repo))
    }

    async fn get_file(&self, repo: &str, path: &str) -> Result<RepoFile, HostingError> {
        tokio::task::yield_now().await;
        let state = self.lock();
        if let Some(failure) = state.read_failures.get(path) {
            return Err(failure.into_error(path));
        }
        state
            .files
            .get(&(repo.to_string(), path.to_string()))
            .map(|(content, sha)| RepoFile {
                path: path.to_string(),
                sha: sha.clone(),
                content: content.clone(),
            })
            .ok_or_else(|| HostingError::not_found(format!("{}/{}", repo, path)))
    }

    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        _message: &str,
        sha: Option<&str>,
    ) -> Result<Option<CommitRef>, HostingError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if state.write_failures.contains(path) {
            return Err(Failure::Server.into_error(path));
        }
        let key = (repo.to_string(), path.to_string());
        let current = state.files.get(&key).map(|(_, s)| s.clone());
        if current.as_deref() != sha {
            return Err(HostingError::Conflict {
                message: format!("{} does not match {:?}", path, sha),
            });
        }

        state.next_id += 1;
        let id = state.next_id;
        state
            .files
            .insert(key, (content.to_string(), format!("blob-{}", id)));
        state.writes.push(WriteRecord {
            repo: repo.to_string(),
            path: path.to_string(),
            content: content.to_string(),
            sha: sha.map(str::to_string),
        });

        let commit = format!("commit-{}", id);
        state.commits.push(commit.clone());
        if let Some(conclusion) = state.auto_deploy {
            state.runs.insert(
                commit.clone(),
                vec![WorkflowRun {
                    id,
                    name: Some("Deploy".to_string()),
                    path: ".github/workflows/deploy.yml".to_string(),
                    status: Some("completed".to_string()),
                    conclusion: Some(conclusion.to_string()),
                }],
            );
        }

        if state.omit_commit {
            Ok(None)
        } else {
            Ok(Some(CommitRef { sha: commit }))
        }
    }

    async fn latest_commit(&self, repo: &str) -> Result<CommitRef, HostingError> {
        self.lock()
            .commits
            .last()
            .map(|sha| CommitRef { sha: sha.clone() })
            .ok_or_else(|| HostingError::not_found(format!("commits of {}", repo)))
    }

    async fn get_pages(&self, repo: &str) -> Result<PagesSite, HostingError> {
        if self.lock().pages.contains(repo) {
            Ok(PagesSite {
                html_url: Some(format!("https://{}.github.io/{}/", OWNER, repo)),
                build_type: Some("workflow".to_string()),
            })
        } else {
            Err(HostingError::not_found(format!("pages of {}", repo)))
        }
    }

    async fn create_pages(&self, repo: &str) -> Result<(), HostingError> {
        let mut state = self.lock();
        state.pages_create_calls += 1;
        match state.pages_script.pop_front() {
            Some(failure) => Err(failure.into_error("pages")),
            None => {
                state.pages.insert(repo.to_string());
                Ok(())
            }
        }
    }

    async fn list_runs_for_commit(
        &self,
        _repo: &str,
        commit_sha: &str,
    ) -> Result<Vec<WorkflowRun>, HostingError> {
        let mut state = self.lock();
        state.run_list_calls += 1;
        if let Some(failure) = state.run_list_failure {
            return Err(failure.into_error("runs"));
        }
        if state.hidden_run_lists > 0 {
            state.hidden_run_lists -= 1;
            return Ok(Vec::new());
        }
        Ok(state.runs.get(commit_sha).cloned().unwrap_or_default())
    }

    async fn get_run(&self, _repo: &str, run_id: u64) -> Result<WorkflowRun, HostingError> {
        let mut state = self.lock();
        if let Some(next) = state.run_polls.get_mut(&run_id).and_then(VecDeque::pop_front) {
            return next.map_err(|f| f.into_error("run"));
        }
        state
            .runs
            .values()
            .flatten()
            .find(|r| r.id == run_id)
            .cloned()
            .ok_or_else(|| HostingError::not_found(format!("run {}", run_id)))
    }
}

/// Completion provider that answers from a script, then keeps failing.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, CompletionError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Answers every prompt with `reply`.
    pub fn always(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.fallback {
            Some(reply) => Ok(reply.clone()),
            None => Err(CompletionError::Malformed("script exhausted".into())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Evaluation sink that records every post and answers from a script.
///
/// `Err(())` in the script simulates a transport failure; an exhausted
/// script answers `200`.
pub struct RecordingSink {
    statuses: Mutex<VecDeque<Result<u16, ()>>>,
    calls: Mutex<Vec<(String, EvaluationPayload)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::with_statuses(Vec::new())
    }

    pub fn with_statuses(statuses: Vec<Result<u16, ()>>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, EvaluationPayload)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvaluationSink for RecordingSink {
    async fn post(&self, url: &str, payload: &EvaluationPayload) -> Result<u16, NotifyError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(())) => {
                let source = unreachable_error().await;
                Err(NotifyError {
                    url: url.to_string(),
                    source,
                })
            }
            None => Ok(200),
        }
    }
}

/// A real `reqwest::Error`, produced by an invalid URL so no I/O happens.
async fn unreachable_error() -> reqwest::Error {
    match reqwest::Client::new().get("http://[::1").send().await {
        Err(e) => e,
        Ok(_) => panic!("malformed URL unexpectedly succeeded"),
    }
}

/// Clock whose time only moves when somebody sleeps on it.
///
/// Sleeps return immediately, advance the virtual time and are recorded, so
/// tests can assert the exact wait sequence a component produced.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// All sleeps requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A panic while holding this lock can only come from a test assertion.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}
