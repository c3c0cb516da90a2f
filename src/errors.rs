//! Typed error hierarchy for pagesmith.
//!
//! One enum per subsystem:
//! - `HostingError`: source-hosting provider (GitHub) failures
//! - `CompletionError` / `GenerationError`: LLM calls and artifact generation
//! - `NotifyError`: evaluation callback transport failures
//! - `EnqueueError`: intake queue rejections
//! - `PipelineError`: failures that end one task-round run

use thiserror::Error;

/// Errors from the source-hosting provider.
///
/// `NotFound` is kept distinct from everything else: it drives the
/// create-vs-update branching in the publisher and the pipeline.
#[derive(Debug, Error)]
pub enum HostingError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Hosting API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Hosting request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to decode hosting response: {0}")]
    Decode(String),
}

impl HostingError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors from a single completion-provider request.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Completion provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    Malformed(String),
}

/// Errors from the artifact generator once its retries are spent.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generating {artifact} failed after {attempts} attempts: {last}")]
    Exhausted {
        artifact: String,
        attempts: u32,
        #[source]
        last: CompletionError,
    },
}

/// Transport failure while posting to the evaluation endpoint.
#[derive(Debug, Error)]
#[error("Evaluation callback to {url} failed: {source}")]
pub struct NotifyError {
    pub url: String,
    #[source]
    pub source: reqwest::Error,
}

/// Rejections from the intake queue. Never blocks the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("Task queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Task queue is closed")]
    Closed,
}

/// Errors that end one task-round pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid round {round}: rounds start at 1")]
    InvalidRound { round: u32 },

    #[error("Repository {repo} unavailable: {source}")]
    Repository {
        repo: String,
        #[source]
        source: HostingError,
    },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosting_error_not_found_is_distinct() {
        let err = HostingError::not_found("repo demo-1234");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("demo-1234"));

        let other = HostingError::Api {
            status: 500,
            message: "boom".into(),
        };
        assert!(!other.is_not_found());
    }

    #[test]
    fn hosting_error_conflict_is_matchable() {
        let err = HostingError::Conflict {
            message: "pages creation in progress".into(),
        };
        assert!(matches!(err, HostingError::Conflict { .. }));
        assert!(!err.is_not_found());
    }

    #[test]
    fn generation_error_carries_attempts_and_source() {
        let err = GenerationError::Exhausted {
            artifact: "README.md".into(),
            attempts: 3,
            last: CompletionError::Malformed("no choices".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("README.md"));
        assert!(msg.contains('3'));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn enqueue_error_full_carries_capacity() {
        let err = EnqueueError::Full { capacity: 16 };
        assert!(err.to_string().contains("16"));
        assert_ne!(err, EnqueueError::Closed);
    }

    #[test]
    fn pipeline_error_converts_from_generation_error() {
        let inner = GenerationError::Exhausted {
            artifact: "app.py".into(),
            attempts: 3,
            last: CompletionError::Status {
                status: 502,
                body: "bad gateway".into(),
            },
        };
        let err: PipelineError = inner.into();
        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[test]
    fn pipeline_error_invalid_round_mentions_round() {
        let err = PipelineError::InvalidRound { round: 0 };
        assert!(err.to_string().contains('0'));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&HostingError::not_found("x"));
        assert_std_error(&CompletionError::Malformed("x".into()));
        assert_std_error(&EnqueueError::Closed);
        assert_std_error(&PipelineError::InvalidRound { round: 0 });
    }
}
