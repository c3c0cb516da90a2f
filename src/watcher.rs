//! Deployment Watcher: find the Actions run a commit triggered and wait for it.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::errors::HostingError;
use crate::hosting::{HostingProvider, WorkflowRun};

/// Timing for run resolution and polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchPolicy {
    pub resolve_attempts: u32,
    pub resolve_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            resolve_attempts: 5,
            resolve_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
        }
    }
}

pub struct DeploymentWatcher {
    hosting: Arc<dyn HostingProvider>,
    clock: Arc<dyn Clock>,
    policy: WatchPolicy,
}

impl DeploymentWatcher {
    pub fn new(hosting: Arc<dyn HostingProvider>, clock: Arc<dyn Clock>, policy: WatchPolicy) -> Self {
        Self {
            hosting,
            clock,
            policy,
        }
    }

    /// Wait for the run triggered by `commit_sha` to finish.
    ///
    /// `true` only when the run completed with conclusion `success` inside
    /// `timeout`. Every failure mode is logged and reported as `false`.
    pub async fn await_deployment(
        &self,
        repo: &str,
        commit_sha: &str,
        workflow_file: Option<&str>,
        timeout: Duration,
    ) -> bool {
        let Some(run) = self.resolve_run(repo, commit_sha, workflow_file).await else {
            tracing::warn!(repo, commit = commit_sha, "No workflow run found for commit");
            return false;
        };
        tracing::info!(repo, run_id = run.id, "Watching workflow run");

        let started = self.clock.now();
        loop {
            if self.clock.now().duration_since(started) >= timeout {
                tracing::warn!(repo, run_id = run.id, timeout_secs = timeout.as_secs(), "Timed out waiting for workflow run");
                return false;
            }

            match self.hosting.get_run(repo, run.id).await {
                Ok(current) if current.is_completed() => {
                    let ok = current.succeeded();
                    if ok {
                        tracing::info!(repo, run_id = run.id, "Deployment workflow succeeded");
                    } else {
                        tracing::warn!(repo, run_id = run.id, conclusion = ?current.conclusion, "Deployment workflow did not succeed");
                    }
                    return ok;
                }
                Ok(current) => {
                    tracing::debug!(repo, run_id = run.id, status = ?current.status, "Workflow still running");
                }
                Err(HostingError::Transport(e)) => {
                    tracing::warn!(repo, run_id = run.id, error = %e, "Transient error polling workflow run");
                }
                Err(e) => {
                    tracing::error!(repo, run_id = run.id, error = %e, "Error polling workflow run");
                    return false;
                }
            }
            self.clock.sleep(self.policy.poll_interval).await;
        }
    }

    async fn resolve_run(
        &self,
        repo: &str,
        commit_sha: &str,
        workflow_file: Option<&str>,
    ) -> Option<WorkflowRun> {
        for attempt in 1..=self.policy.resolve_attempts {
            match self.hosting.list_runs_for_commit(repo, commit_sha).await {
                Ok(runs) => {
                    if let Some(run) = pick_run(runs, workflow_file) {
                        return Some(run);
                    }
                    tracing::debug!(repo, attempt, "Workflow run not visible yet");
                }
                Err(e) => {
                    tracing::error!(repo, commit = commit_sha, error = %e, "Error listing workflow runs");
                    return None;
                }
            }
            if attempt < self.policy.resolve_attempts {
                self.clock.sleep(self.policy.resolve_delay).await;
            }
        }
        None
    }
}

/// The run whose workflow path ends with `workflow_file`, or the first run
/// when no file is given.
fn pick_run(runs: Vec<WorkflowRun>, workflow_file: Option<&str>) -> Option<WorkflowRun> {
    match workflow_file {
        Some(file) => runs.into_iter().find(|r| r.path.ends_with(file)),
        None => runs.into_iter().next(),
    }
}
