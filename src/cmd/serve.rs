//! Intake server: `pagesmith serve`.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use pagesmith::api::AppState;
use pagesmith::clock::SystemClock;
use pagesmith::config::{LlmProviderKind, PagesmithConfig};
use pagesmith::hosting::GitHubClient;
use pagesmith::llm::{CompletionProvider, GeminiProvider, OpenAiCompatibleProvider};
use pagesmith::notify::HttpEvaluationSink;
use pagesmith::pipeline::TaskPipeline;
use pagesmith::queue::{IntakeQueue, WorkerPool};
use pagesmith::{logging, server};

use super::super::Cli;

pub async fn cmd_serve(cli: &Cli, port: Option<u16>) -> Result<()> {
    let config = PagesmithConfig::load(cli.config.as_deref())?.with_cli_args(port);
    let _logging = logging::init(cli.verbose, &config.logging)?;

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("{}", problem);
        }
        anyhow::bail!(
            "Refusing to start: {} configuration problem(s). Run `pagesmith config validate`.",
            problems.len()
        );
    }

    let pipeline = Arc::new(build_pipeline(&config)?);
    let (queue, rx) = IntakeQueue::bounded(config.queue.capacity);
    let pool = WorkerPool::spawn(config.queue.workers, rx, pipeline);

    let capacity = queue.capacity();
    let state = Arc::new(AppState {
        queue,
        secret: config.secrets.intake_secret.clone().unwrap_or_default(),
    });
    tracing::info!(
        capacity,
        workers = config.queue.workers,
        provider = %config.llm.provider,
        model = config.llm.model(),
        owner = %config.github.user,
        "Starting pagesmith"
    );

    server::start_server(&config.server, state, server::shutdown_signal()).await?;

    // The router (and with it the last queue sender) is gone; let the
    // workers finish what was already accepted.
    tracing::info!("Draining queued tasks");
    pool.join().await;
    Ok(())
}

fn build_pipeline(config: &PagesmithConfig) -> Result<TaskPipeline> {
    let github_token = config.secrets.github_token.as_deref().unwrap_or_default();
    let llm_key = config.secrets.llm_api_key.as_deref().unwrap_or_default();

    let hosting = GitHubClient::new(
        &config.github.api_url,
        &config.github.user,
        github_token,
        Duration::from_secs(config.github.request_timeout_secs),
    )
    .context("Failed to build GitHub client")?;

    let llm_timeout = Duration::from_secs(config.llm.request_timeout_secs);
    let completions: Arc<dyn CompletionProvider> = match config.llm.provider {
        LlmProviderKind::Openai => Arc::new(
            OpenAiCompatibleProvider::new(config.llm.endpoint(), config.llm.model(), llm_key, llm_timeout)
                .context("Failed to build completion client")?,
        ),
        LlmProviderKind::Gemini => Arc::new(
            GeminiProvider::new(config.llm.endpoint(), config.llm.model(), llm_key, llm_timeout)
                .context("Failed to build completion client")?,
        ),
    };

    let evaluation = HttpEvaluationSink::new(Duration::from_secs(config.pipeline.evaluation_timeout_secs))
        .context("Failed to build evaluation client")?;

    Ok(TaskPipeline::new(
        Arc::new(hosting),
        completions,
        Arc::new(evaluation),
        Arc::new(SystemClock),
        config.pipeline.settings(),
    ))
}
