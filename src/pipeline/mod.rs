//! Task Pipeline: one task-round request from generation to evaluation.
//!
//! A run derives the repository, makes sure it exists, generates every
//! artifact, writes them in a fixed order (code last so the deploy workflow
//! fires once everything else is in place), waits on the deployment and then
//! reports to the evaluator. Rounds of the same task never overlap inside one
//! process.

pub mod context;
pub mod state;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::clock::Clock;
use crate::errors::{HostingError, PipelineError};
use crate::generate::{ArtifactGenerator, CodeBrief};
use crate::hosting::{CommitRef, HostingProvider, Repository};
use crate::llm::CompletionProvider;
use crate::models::{self, Attachment, DataFile, EvaluationPayload, TaskRequest, paths};
use crate::notify::{EvaluationNotifier, EvaluationSink};
use crate::publisher::{PagesPolicy, RepositoryPublisher};
use crate::queue::{QueueEntry, TaskRunner};
use crate::retry::RetryPolicy;
use crate::watcher::{DeploymentWatcher, WatchPolicy};

pub use context::ContextRecord;
pub use state::RoundState;

/// Tunables for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Workflow file name under `.github/workflows/`.
    pub workflow_file: String,
    /// Pause before the code write so the supporting files are visible to
    /// the workflow it triggers.
    pub settle_delay: Duration,
    pub deploy_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workflow_file: "deploy.yml".to_string(),
            settle_delay: Duration::from_secs(5),
            deploy_timeout: Duration::from_secs(180),
        }
    }
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub repo_name: String,
    pub state: RoundState,
    pub commit_sha: Option<String>,
    pub deployed: bool,
    pub notified: bool,
}

/// Generation inputs for one round.
struct RoundInputs {
    brief: String,
    checks: Vec<String>,
    attachments: Vec<Attachment>,
    previous_code: Option<String>,
    /// Fresh record to write (round 1 only).
    seed_context: Option<ContextRecord>,
}

impl RoundInputs {
    /// Inputs straight from the request, with no history.
    fn from_request(request: &TaskRequest) -> Self {
        Self {
            brief: request.brief.clone(),
            checks: request.checks.clone(),
            attachments: request.attachments.clone(),
            previous_code: None,
            seed_context: None,
        }
    }
}

pub struct TaskPipeline {
    hosting: Arc<dyn HostingProvider>,
    generator: ArtifactGenerator,
    publisher: RepositoryPublisher,
    watcher: DeploymentWatcher,
    notifier: EvaluationNotifier,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
    /// One entry per repository with a run in flight or waiting. Entries are
    /// dropped by the last run to release them.
    repo_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskPipeline {
    pub fn new(
        hosting: Arc<dyn HostingProvider>,
        completions: Arc<dyn CompletionProvider>,
        evaluation: Arc<dyn EvaluationSink>,
        clock: Arc<dyn Clock>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator: ArtifactGenerator::new(completions, RetryPolicy::generation(), clock.clone()),
            publisher: RepositoryPublisher::new(hosting.clone(), clock.clone(), PagesPolicy::default()),
            watcher: DeploymentWatcher::new(hosting.clone(), clock.clone(), WatchPolicy::default()),
            notifier: EvaluationNotifier::new(evaluation, RetryPolicy::evaluation(), clock.clone()),
            hosting,
            clock,
            settings,
            repo_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock shared by every run targeting `repo_name`.
    fn repo_lock(&self, repo_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.repo_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(repo_name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Forget `repo_name`'s lock unless another run still holds a handle.
    fn release_repo_lock(&self, repo_name: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.repo_locks.lock().unwrap_or_else(|e| e.into_inner());
        // The map's handle plus ours.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(repo_name);
        }
    }

    /// Run one task round end to end.
    ///
    /// Errors only when the round is invalid, the repository cannot be
    /// obtained or an artifact cannot be generated; in those cases the
    /// evaluator is not notified. Publish, deployment and notification
    /// problems are logged and reflected in the [`RunReport`].
    pub async fn execute(&self, request: &TaskRequest) -> Result<RunReport, PipelineError> {
        let state = RoundState::for_round(request.round)?;
        let repo_name = models::repo_name_for_task(&request.task);

        let lock = self.repo_lock(&repo_name);
        let result = {
            let _guard = lock.lock().await;
            self.run_round(state, repo_name.clone(), request).await
        };
        self.release_repo_lock(&repo_name, lock);
        result
    }

    async fn run_round(
        &self,
        state: RoundState,
        repo_name: String,
        request: &TaskRequest,
    ) -> Result<RunReport, PipelineError> {
        tracing::info!(task = %request.task, round = request.round, repo = %repo_name, %state, "Starting pipeline run");

        let repo = self.ensure_repository(&repo_name).await?;

        let inputs = if state.uses_previous_code() {
            self.load_history(&repo_name, request).await
        } else {
            RoundInputs {
                seed_context: Some(ContextRecord::seeded(request)),
                ..RoundInputs::from_request(request)
            }
        };

        let commit = self.publish_round(state, &repo_name, &inputs).await?;
        let commit_sha = match commit {
            Some(commit) => Some(commit.sha),
            None => self.fallback_commit(&repo_name).await,
        };

        let deployed = match &commit_sha {
            Some(sha) => {
                self.watcher
                    .await_deployment(
                        &repo_name,
                        sha,
                        Some(&self.settings.workflow_file),
                        self.settings.deploy_timeout,
                    )
                    .await
            }
            None => {
                tracing::warn!(repo = %repo_name, "No commit to watch; skipping deployment wait");
                false
            }
        };

        let payload = EvaluationPayload::for_request(
            request,
            &repo.html_url,
            commit_sha.clone(),
            &models::pages_url(self.hosting.owner(), &repo_name),
        );
        let notified = self.notifier.notify(&request.evaluation_url, &payload).await;

        Ok(RunReport {
            repo_name,
            state,
            commit_sha,
            deployed,
            notified,
        })
    }

    async fn ensure_repository(&self, repo_name: &str) -> Result<Repository, PipelineError> {
        match self.hosting.get_repo(repo_name).await {
            Ok(repo) => {
                tracing::info!(repo = repo_name, "Using existing repository");
                Ok(repo)
            }
            Err(HostingError::NotFound { .. }) => {
                tracing::info!(repo = repo_name, "Creating public repository");
                self.hosting
                    .create_repo(repo_name, false)
                    .await
                    .map_err(|source| PipelineError::Repository {
                        repo: repo_name.to_string(),
                        source,
                    })
            }
            Err(source) => Err(PipelineError::Repository {
                repo: repo_name.to_string(),
                source,
            }),
        }
    }

    /// Read the stored context and code, fold this round's request into the
    /// context and persist it. Any read or parse failure degrades to the
    /// request's own data.
    async fn load_history(&self, repo: &str, request: &TaskRequest) -> RoundInputs {
        let context_file = match self.hosting.get_file(repo, paths::CONTEXT).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(repo, error = %e, "Could not read stored context; continuing without history");
                return RoundInputs::from_request(request);
            }
        };
        let code_file = match self.hosting.get_file(repo, paths::CODE).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(repo, error = %e, "Could not read previous code; continuing without history");
                return RoundInputs::from_request(request);
            }
        };
        let mut record = match ContextRecord::from_json(&context_file.content) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(repo, error = %e, "Stored context is malformed; continuing without history");
                return RoundInputs::from_request(request);
            }
        };

        record.merge_attachments(&request.attachments);
        record.append_brief(&request.brief);
        self.persist_context(repo, &record, &context_file.sha, request.round)
            .await;

        RoundInputs {
            brief: record.cumulative_brief(),
            checks: record.checks_history,
            attachments: record.attachment_history,
            previous_code: Some(code_file.content),
            seed_context: None,
        }
    }

    /// Update `context.json` against the blob hash it was read with.
    async fn persist_context(&self, repo: &str, record: &ContextRecord, sha: &str, round: u32) {
        let json = match record.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(repo, error = %e, "Failed to serialize context");
                return;
            }
        };
        let message = format!("Update {} for round {}", paths::CONTEXT, round);
        match self
            .hosting
            .put_file(repo, paths::CONTEXT, &json, &message, Some(sha))
            .await
        {
            Ok(_) => tracing::info!(repo, "Updated stored context"),
            Err(e) => tracing::error!(repo, error = %e, "Failed to update stored context"),
        }
    }

    /// Generate every artifact for the round, then write them. Returns the
    /// commit of the code write when the provider reported one.
    async fn publish_round(
        &self,
        state: RoundState,
        repo: &str,
        inputs: &RoundInputs,
    ) -> Result<Option<CommitRef>, PipelineError> {
        let owner = self.hosting.owner();
        let workflow_file = self.settings.workflow_file.as_str();

        let code = self
            .generator
            .code(&CodeBrief {
                brief: &inputs.brief,
                checks: &inputs.checks,
                attachments: &inputs.attachments,
                previous_code: inputs.previous_code.as_deref(),
            })
            .await?;
        let readme = self
            .generator
            .readme(repo, &inputs.brief, owner, &code)
            .await?;
        // A fresh repository gets its license before the workflow; later
        // rounds regenerate the workflow ahead of the requirements.
        let (requirements, license, workflow) = if state.regenerates_license() {
            let requirements = self.generator.requirements(&code).await?;
            let license = self.generator.license(&inputs.checks).await?;
            let workflow = self
                .generator
                .workflow(&inputs.brief, &code, &inputs.checks, workflow_file)
                .await?;
            (requirements, Some(license), workflow)
        } else {
            let workflow = self
                .generator
                .workflow(&inputs.brief, &code, &inputs.checks, workflow_file)
                .await?;
            let requirements = self.generator.requirements(&code).await?;
            (requirements, None, workflow)
        };

        if state.enables_pages() && !self.publisher.enable_pages(repo).await {
            tracing::warn!(repo, "Pages could not be enabled; publishing anyway");
        }

        let data = serde_json::to_string_pretty(&DataFile {
            attachments: &inputs.attachments,
        })
        .context("Failed to serialize data.json")?;
        let verb = if state.seeds_context() { "Add" } else { "Update" };

        self.write(repo, paths::DATA, &data, verb).await;
        self.write(repo, paths::REQUIREMENTS, &requirements, verb)
            .await;
        if let Some(license) = &license {
            self.write(repo, paths::LICENSE, license, verb).await;
        }
        self.write(repo, paths::README, &readme, verb).await;
        if let Some(record) = &inputs.seed_context {
            let json = record.to_json().context("Failed to serialize context")?;
            self.write(repo, paths::CONTEXT, &json, verb).await;
        }
        self.write(repo, &paths::workflow(workflow_file), &workflow, verb)
            .await;

        self.clock.sleep(self.settings.settle_delay).await;
        Ok(self.write(repo, paths::CODE, &code, verb).await)
    }

    async fn write(&self, repo: &str, path: &str, content: &str, verb: &str) -> Option<CommitRef> {
        let message = format!("{} {}", verb, path);
        let commit = self.publisher.upsert(repo, path, content, &message).await;
        if commit.is_none() {
            tracing::warn!(repo, path, "Write not confirmed");
        }
        commit
    }

    /// Latest commit on the default branch. Another writer to the same
    /// repository may have landed in between, so this is only a best guess.
    async fn fallback_commit(&self, repo: &str) -> Option<String> {
        match self.hosting.latest_commit(repo).await {
            Ok(commit) => {
                tracing::warn!(repo, commit = %commit.sha, "Code write reported no commit; using latest commit");
                Some(commit.sha)
            }
            Err(e) => {
                tracing::error!(repo, error = %e, "Could not determine a commit for this round");
                None
            }
        }
    }
}

#[async_trait]
impl TaskRunner for TaskPipeline {
    async fn run(&self, entry: &QueueEntry) -> anyhow::Result<()> {
        let report = self.execute(&entry.request).await?;
        tracing::info!(
            job_id = %entry.job_id,
            repo = %report.repo_name,
            state = %report.state,
            commit = ?report.commit_sha,
            deployed = report.deployed,
            notified = report.notified,
            "Pipeline run complete"
        );
        Ok(())
    }
}
