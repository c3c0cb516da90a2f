//! Artifact generation.
//!
//! [`ArtifactGenerator`] turns prompts into repository files through a
//! [`CompletionProvider`], retrying each artifact per its [`RetryPolicy`].
//! Identical prompts always re-invoke the provider; nothing is cached.

pub mod prompts;

use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::GenerationError;
use crate::llm::CompletionProvider;
use crate::models::paths;
use crate::retry::RetryPolicy;

pub use prompts::CodeBrief;

/// Dependency line the deployment workflow relies on.
pub const FRAMEWORK_DEPENDENCY: &str = "flask";

/// Generates artifacts with bounded retry.
pub struct ArtifactGenerator {
    provider: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ArtifactGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            policy,
            clock,
        }
    }

    /// Run one prompt through the provider, retrying transport and decode
    /// failures. `artifact` labels logs and the terminal error.
    pub async fn generate(&self, artifact: &str, prompt: &str) -> Result<String, GenerationError> {
        let provider = self.provider.as_ref();
        let result = self
            .policy
            .run(self.clock.as_ref(), |attempt| async move {
                tracing::info!(
                    artifact,
                    attempt,
                    provider = provider.name(),
                    "Calling LLM for file generation"
                );
                provider.complete(prompt).await
            })
            .await;

        match result {
            Ok(text) => Ok(strip_code_fences(&text)),
            Err((attempts, last)) => {
                tracing::error!(artifact, attempts, error = %last, "LLM generation failed after maximum retries");
                Err(GenerationError::Exhausted {
                    artifact: artifact.to_string(),
                    attempts,
                    last,
                })
            }
        }
    }

    pub async fn code(&self, input: &CodeBrief<'_>) -> Result<String, GenerationError> {
        self.generate(paths::CODE, &prompts::build_code_prompt(input)).await
    }

    pub async fn readme(
        &self,
        repo_name: &str,
        brief: &str,
        owner: &str,
        code: &str,
    ) -> Result<String, GenerationError> {
        let prompt = prompts::build_readme_prompt(repo_name, brief, owner, code);
        self.generate(paths::README, &prompt).await
    }

    /// Dependency list, guaranteed to carry the web framework.
    pub async fn requirements(&self, code: &str) -> Result<String, GenerationError> {
        let raw = self
            .generate(paths::REQUIREMENTS, &prompts::build_requirements_prompt(code))
            .await?;
        Ok(ensure_framework_dependency(raw))
    }

    pub async fn license(&self, checks: &[String]) -> Result<String, GenerationError> {
        self.generate(paths::LICENSE, &prompts::build_license_prompt(checks))
            .await
    }

    pub async fn workflow(
        &self,
        brief: &str,
        code: &str,
        checks: &[String],
        workflow_file: &str,
    ) -> Result<String, GenerationError> {
        let prompt = prompts::build_workflow_prompt(brief, code, checks, workflow_file);
        let workflow = self.generate(workflow_file, &prompt).await?;
        if let Err(e) = serde_yaml::from_str::<serde_yaml::Value>(&workflow) {
            tracing::warn!(error = %e, "Generated workflow is not valid YAML; writing it anyway");
        }
        Ok(workflow)
    }
}

/// Prepend the framework dependency when the generator left it out.
pub fn ensure_framework_dependency(requirements: String) -> String {
    if requirements.to_lowercase().contains(FRAMEWORK_DEPENDENCY) {
        requirements
    } else {
        format!("{}\n{}", FRAMEWORK_DEPENDENCY, requirements)
    }
}

/// Remove a markdown fence wrapping the whole reply, if there is one.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text.to_string();
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text.to_string();
    };
    // Drop the info string (`python`, `yaml`, ...) on the opening line.
    let body = match inner.find('\n') {
        Some(idx) => &inner[idx + 1..],
        None => "",
    };
    let mut out = body.trim_end().to_string();
    out.push('\n');
    out
}
