//! Intake endpoint wired to a real queue and worker pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use pagesmith::api::AppState;
use pagesmith::queue::{IntakeQueue, QueueEntry, TaskRunner, WorkerPool};
use pagesmith::server::build_router;

#[derive(Default)]
struct RecordingRunner {
    seen: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn run(&self, entry: &QueueEntry) -> anyhow::Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push((entry.request.task.clone(), entry.request.round));
        if entry.request.brief == "explode" {
            anyhow::bail!("generation failed");
        }
        Ok(())
    }
}

fn intake(secret: &str, task: &str, round: u32, brief: &str) -> Request<Body> {
    let body = serde_json::json!({
        "secret": secret,
        "email": "student@example.com",
        "task": task,
        "round": round,
        "nonce": format!("nonce-{}", round),
        "brief": brief,
        "checks": ["Page has a heading"],
        "attachments": [{"name": "sample.csv", "url": "data:text/csv;base64,YSxiCjEsMgo="}],
        "evaluation_url": "http://eval.example/notify",
    });
    Request::builder()
        .method("POST")
        .uri("/api-endpoint")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_accepted_requests_reach_workers() {
    let (queue, rx) = IntakeQueue::bounded(8);
    let runner = Arc::new(RecordingRunner::default());
    let pool = WorkerPool::spawn(2, rx, runner.clone());
    let stats = pool.stats();

    let app = build_router(Arc::new(AppState {
        queue,
        secret: "s3cret".to_string(),
    }));

    for (round, brief) in [(1, "todo app"), (2, "explode")] {
        let response = app
            .clone()
            .oneshot(intake("s3cret", "demo", round, brief))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "acknowledged");
        assert!(json["job_id"].is_string());
    }

    let rejected = app
        .clone()
        .oneshot(intake("wrong", "demo", 3, "todo app"))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

    // Dropping the router drops the last queue sender, so the pool drains and exits.
    drop(app);
    pool.join().await;

    let mut seen = runner.seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![("demo".to_string(), 1), ("demo".to_string(), 2)]);
    assert_eq!(stats.processed(), 1);
    assert_eq!(stats.failed(), 1);
}

#[tokio::test]
async fn test_health_check_through_full_router() {
    let (queue, _rx) = IntakeQueue::bounded(1);
    let app = build_router(Arc::new(AppState {
        queue,
        secret: "s3cret".to_string(),
    }));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
