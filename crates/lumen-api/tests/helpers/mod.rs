//! Test helpers: build the router over a stubbed scan pipeline.
//!
//! Run from workspace root: `cargo test -p lumen-api`.

use async_trait::async_trait;
use axum_test::TestServer;
use lumen_api::constants;
use lumen_api::setup::{routes, services};
use lumen_api::state::AppState;
use lumen_core::models::{Issue, IssueType};
use lumen_core::{
    BaseConfig, Config, ReachabilityCheck, ReachabilityError, ScanConfig, ScanError, ScanExecutor,
};
use lumen_worker::WorkerHandle;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// API path prefix for tests (e.g. `/api/analysis`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Scanner stand-in. URLs containing `fail` crash the "scanner"; anything
/// else yields two issues.
pub struct StubExecutor;

#[async_trait]
impl ScanExecutor for StubExecutor {
    async fn scan(&self, url: &str, runner: &str) -> Result<Vec<Issue>, ScanError> {
        if url.contains("fail") {
            return Err(ScanError::UnexpectedExit {
                code: Some(1),
                parse_error: Some("expected value at line 1 column 1".to_string()),
                output: "Error: browser crashed".to_string(),
            });
        }

        let runner = if runner.is_empty() { "htmlcs" } else { runner };
        Ok((0..2)
            .map(|i| Issue {
                code: format!("WCAG2AA.Principle1.Guideline1_1.1_1_1.H{}", 30 + i),
                issue_type: IssueType::Error,
                type_code: 1,
                message: "Img element missing an alt attribute.".to_string(),
                context: Some("<img src=\"logo.png\">".to_string()),
                selector: format!("html > body > img:nth-child({})", i + 1),
                runner: runner.to_string(),
                runner_extras: None,
            })
            .collect())
    }
}

/// Scheme/host validation only; never touches the network.
pub struct StubChecker;

#[async_trait]
impl ReachabilityCheck for StubChecker {
    async fn check(&self, url: &str) -> Result<(), ReachabilityError> {
        lumen_scanner::validate_target(url).map(|_| ())
    }
}

pub fn create_test_config() -> Config {
    Config {
        base: BaseConfig {
            server_addr: "127.0.0.1:0".to_string(),
            environment: "test".to_string(),
        },
        scan: ScanConfig {
            queue_capacity: 16,
            workers: 2,
            scan_timeout_secs: 10,
            ..ScanConfig::default()
        },
    }
}

/// Test application: server plus the worker pool behind it.
pub struct TestApp {
    pub server: TestServer,
    pub workers: Option<WorkerHandle>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Stop the worker pool and wait for it, closing the scan queue.
    pub async fn stop_workers(&mut self) {
        if let Some(workers) = self.workers.take() {
            workers.shutdown();
            workers.join().await;
        }
    }
}

pub async fn setup_test_app() -> TestApp {
    let config = create_test_config();
    let (registry, workers) = services::start_scan_pipeline(
        &config.scan,
        Arc::new(StubExecutor),
        Some(Arc::new(StubChecker)),
    );

    let state = Arc::new(AppState::new(registry));
    let app = routes::setup_routes(state);
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        workers: Some(workers),
    }
}

/// Submit a URL and return the accepted task body.
pub async fn submit(client: &TestServer, url: &str) -> Value {
    let response = client
        .post(&api_path("/analysis"))
        .json(&serde_json::json!({ "url": url }))
        .await;
    assert_eq!(response.status_code(), 202);
    response.json::<Value>()
}

/// Poll a task until it reaches `completed` or `failed`.
pub async fn wait_for_terminal(client: &TestServer, id: &str) -> Value {
    for _ in 0..500 {
        let task = client
            .get(&api_path(&format!("/analysis/{}", id)))
            .await
            .json::<Value>();
        if task["status"] == "completed" || task["status"] == "failed" {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} did not finish in time", id);
}
