//! Repository Publisher: idempotent file writes and pages enablement.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::errors::HostingError;
use crate::hosting::{CommitRef, HostingProvider};

/// Timing for [`RepositoryPublisher::enable_pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagesPolicy {
    pub max_attempts: u32,
    /// Wait after a "creation in progress" conflict.
    pub conflict_delay: Duration,
    /// Wait after any other failed attempt.
    pub retry_delay: Duration,
    /// Wait after successful creation before returning.
    pub settle_delay: Duration,
}

impl Default for PagesPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            conflict_delay: Duration::from_secs(3),
            retry_delay: Duration::from_secs(2),
            settle_delay: Duration::from_secs(5),
        }
    }
}

pub struct RepositoryPublisher {
    hosting: Arc<dyn HostingProvider>,
    clock: Arc<dyn Clock>,
    pages_policy: PagesPolicy,
}

impl RepositoryPublisher {
    pub fn new(hosting: Arc<dyn HostingProvider>, clock: Arc<dyn Clock>, pages_policy: PagesPolicy) -> Self {
        Self {
            hosting,
            clock,
            pages_policy,
        }
    }

    /// Create-or-update `path` in `repo`.
    ///
    /// Reads first: an existing file is updated with its blob hash as the
    /// concurrency token; a missing one is created. Any other failure is
    /// logged and reported as `None` ("not guaranteed written"), so callers
    /// never abort on a single file.
    pub async fn upsert(&self, repo: &str, path: &str, content: &str, message: &str) -> Option<CommitRef> {
        let current_sha = match self.hosting.get_file(repo, path).await {
            Ok(file) => Some(file.sha),
            Err(HostingError::NotFound { .. }) => None,
            Err(e) => {
                tracing::error!(repo, path, error = %e, "Unexpected error reading file before write");
                return None;
            }
        };

        let action = if current_sha.is_some() { "Updated" } else { "Created" };
        match self
            .hosting
            .put_file(repo, path, content, message, current_sha.as_deref())
            .await
        {
            Ok(commit) => {
                tracing::info!(repo, path, commit = ?commit.as_ref().map(|c| &c.sha), "{} file", action);
                commit
            }
            Err(e) => {
                tracing::error!(repo, path, error = %e, "Failed to write file");
                None
            }
        }
    }

    /// Make sure the repository has a pages site built by Actions.
    ///
    /// Returns `true` when pages already exist or were created.
    pub async fn enable_pages(&self, repo: &str) -> bool {
        match self.hosting.get_pages(repo).await {
            Ok(site) => {
                tracing::info!(repo, build_type = ?site.build_type, "Pages already enabled");
                return true;
            }
            Err(HostingError::NotFound { .. }) => {}
            Err(e) => {
                tracing::warn!(repo, error = %e, "Unexpected response checking pages");
                return false;
            }
        }

        tracing::info!(repo, "Enabling pages with Actions as build source");
        let policy = self.pages_policy;
        for attempt in 1..=policy.max_attempts {
            match self.hosting.create_pages(repo).await {
                Ok(()) => {
                    tracing::info!(repo, attempt, "Pages enabled");
                    self.clock.sleep(policy.settle_delay).await;
                    return true;
                }
                Err(HostingError::Conflict { .. }) => {
                    tracing::info!(repo, attempt, "Pages creation in progress, waiting");
                    self.clock.sleep(policy.conflict_delay).await;
                }
                Err(e) => {
                    tracing::warn!(repo, attempt, error = %e, "Pages creation attempt failed");
                    self.clock.sleep(policy.retry_delay).await;
                }
            }
        }

        tracing::error!(repo, attempts = policy.max_attempts, "Failed to enable pages after retries");
        false
    }
}
