use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lumen_core::models::{Issue, Task, TaskStatus};
use lumen_core::{ReachabilityCheck, ScanConfig, ScanError, ScanExecutor};

use crate::queue::TaskReceiver;
use crate::registry::TaskRegistry;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Number of loops draining the shared queue.
    pub workers: usize,
    /// Deadline for a single scan; `None` lets it run until the scanner exits.
    pub scan_timeout: Option<Duration>,
    /// Terminal tasks older than this are evicted; `None` keeps them forever.
    pub task_retention: Option<Duration>,
    pub reap_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for WorkerConfig {
    fn from(config: &ScanConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            scan_timeout: (config.scan_timeout_secs > 0)
                .then(|| Duration::from_secs(config.scan_timeout_secs)),
            task_retention: (config.task_retention_secs > 0)
                .then(|| Duration::from_secs(config.task_retention_secs)),
            reap_interval: Duration::from_secs(config.task_reap_interval_secs.max(1)),
        }
    }
}

/// Drives queued tasks through `processing` to a terminal status.
///
/// Every failure while handling a task is written onto that task; nothing a
/// single task does can stop the loop.
#[derive(Clone)]
pub struct TaskWorker {
    registry: TaskRegistry,
    executor: Arc<dyn ScanExecutor>,
    checker: Option<Arc<dyn ReachabilityCheck>>,
    config: WorkerConfig,
}

impl TaskWorker {
    /// `checker` is optional; without one every dequeued task goes straight
    /// to the scanner.
    pub fn new(
        registry: TaskRegistry,
        executor: Arc<dyn ScanExecutor>,
        checker: Option<Arc<dyn ReachabilityCheck>>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            checker,
            config,
        }
    }

    /// Start the worker loops (and the retention reaper, if configured).
    pub fn spawn(self, receiver: TaskReceiver) -> WorkerHandle {
        let shutdown = CancellationToken::new();
        let workers = self.config.workers.max(1);

        tracing::info!(
            workers,
            scan_timeout = ?self.config.scan_timeout,
            reachability_check = self.checker.is_some(),
            "Scan worker pool started"
        );

        let mut handles = Vec::with_capacity(workers + 1);
        for worker_id in 0..workers {
            let worker = self.clone();
            let receiver = receiver.clone();
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker.run(worker_id, receiver, token).await;
            }));
        }

        if let Some(retention) = self.config.task_retention {
            handles.push(spawn_reaper(
                self.registry.clone(),
                retention,
                self.config.reap_interval,
                shutdown.clone(),
            ));
        }

        WorkerHandle { shutdown, handles }
    }

    async fn run(&self, worker_id: usize, receiver: TaskReceiver, shutdown: CancellationToken) {
        tracing::debug!(worker_id, "Scan worker started");

        loop {
            let id = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(id) => id,
                    None => {
                        tracing::info!(worker_id, "Scan queue closed");
                        break;
                    }
                },
            };

            self.process_task(id, &shutdown).await;
        }

        tracing::debug!(worker_id, "Scan worker stopped");
    }

    #[tracing::instrument(skip(self, shutdown), fields(task.id = %id))]
    async fn process_task(&self, id: Uuid, shutdown: &CancellationToken) {
        let Some(task) = self.registry.get_by_id(id).await else {
            tracing::warn!("Dequeued task not found in registry, skipping");
            return;
        };

        match self.registry.update_status(id, TaskStatus::Processing).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!("Task disappeared before processing, skipping");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Task cannot be processed, skipping");
                return;
            }
        }

        tracing::info!(url = %task.url, runner = %task.runner, "Processing task");

        let outcome = tokio::select! {
            _ = shutdown.cancelled() => Err(ScanError::Cancelled.to_string()),
            result = self.run_scan(&task) => result,
        };

        let (status, issues, error_message) = match outcome {
            Ok(issues) => (TaskStatus::Completed, Some(issues), None),
            Err(message) => (TaskStatus::Failed, None, Some(message)),
        };

        match self
            .registry
            .update_result(id, status, issues, error_message)
            .await
        {
            Ok(Some(task)) if task.status == TaskStatus::Completed => {
                tracing::info!(
                    issue_count = task.result.as_ref().map_or(0, Vec::len),
                    duration_ms = task.duration_ms,
                    "Task completed"
                );
            }
            Ok(Some(task)) => {
                tracing::warn!(
                    error = task.error_message.as_deref().unwrap_or_default(),
                    duration_ms = task.duration_ms,
                    "Task failed"
                );
            }
            Ok(None) => tracing::warn!("Task disappeared before its result was recorded"),
            Err(e) => tracing::error!(error = %e, "Failed to record task result"),
        }
    }

    /// Reachability pre-check followed by the scan. Errors come back as the
    /// message to store on the task.
    async fn run_scan(&self, task: &Task) -> Result<Vec<Issue>, String> {
        if let Some(checker) = &self.checker {
            if let Err(e) = checker.check(&task.url).await {
                return Err(format!("URL not reachable: {}", e));
            }
        }

        let scan = self.executor.scan(&task.url, &task.runner);
        let result = match self.config.scan_timeout {
            Some(limit) => tokio::time::timeout(limit, scan)
                .await
                .unwrap_or_else(|_| Err(ScanError::Timeout { limit })),
            None => scan.await,
        };

        result.map_err(|e| e.to_string())
    }
}

fn spawn_reaper(
    registry: TaskRegistry,
    retention: Duration,
    reap_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let retention = match chrono::Duration::from_std(retention) {
            Ok(retention) => retention,
            Err(e) => {
                tracing::error!(error = %e, "Task retention out of range, reaper disabled");
                return;
            }
        };

        let mut interval = tokio::time::interval(reap_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let evicted = registry.evict_finished_before(Utc::now() - retention).await;
                    if evicted > 0 {
                        tracing::info!(evicted, "Evicted finished tasks");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    })
}

/// Owns the spawned worker loops.
pub struct WorkerHandle {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Ask every loop to stop. Idle loops exit at once; a scan in flight is
    /// abandoned, its child process killed, and the task marked failed.
    pub fn shutdown(&self) {
        tracing::info!("Initiating scan worker shutdown");
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for every loop to finish.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scan worker task ended abnormally");
            }
        }
        tracing::info!("Scan worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::task_channel;
    use async_trait::async_trait;
    use lumen_core::models::IssueType;
    use lumen_core::ReachabilityError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Behaviour is picked from the URL: `fail` -> unexpected exit,
    /// `five` -> five issues, `slow` -> never returns in time, else two issues.
    #[derive(Default)]
    struct StubExecutor {
        delay: Duration,
        calls: Mutex<Vec<String>>,
    }

    impl StubExecutor {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn issues(count: usize) -> Vec<Issue> {
        (0..count)
            .map(|i| Issue {
                code: format!("WCAG2AA.H{}", i),
                issue_type: IssueType::Warning,
                type_code: 2,
                message: "Check contrast".to_string(),
                context: None,
                selector: format!("p:nth-child({})", i + 1),
                runner: "htmlcs".to_string(),
                runner_extras: None,
            })
            .collect()
    }

    #[async_trait]
    impl ScanExecutor for StubExecutor {
        async fn scan(&self, url: &str, _runner: &str) -> Result<Vec<Issue>, ScanError> {
            self.calls.lock().unwrap().push(url.to_string());
            if url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            tokio::time::sleep(self.delay).await;

            if url.contains("fail") {
                return Err(ScanError::UnexpectedExit {
                    code: Some(1),
                    parse_error: Some("expected value at line 1 column 1".to_string()),
                    output: "Error: page crashed".to_string(),
                });
            }
            if url.contains("five") {
                return Ok(issues(5));
            }
            Ok(issues(2))
        }
    }

    struct StubChecker;

    #[async_trait]
    impl ReachabilityCheck for StubChecker {
        async fn check(&self, url: &str) -> Result<(), ReachabilityError> {
            lumen_scanner::validate_target(url).map(|_| ())
        }
    }

    struct Harness {
        registry: TaskRegistry,
        receiver: TaskReceiver,
        executor: Arc<StubExecutor>,
    }

    impl Harness {
        fn new(capacity: usize, executor: StubExecutor) -> Self {
            let (tx, rx) = task_channel(capacity);
            Self {
                registry: TaskRegistry::new(tx),
                receiver: rx,
                executor: Arc::new(executor),
            }
        }

        fn worker(&self, config: WorkerConfig) -> TaskWorker {
            TaskWorker::new(
                self.registry.clone(),
                self.executor.clone(),
                Some(Arc::new(StubChecker)),
                config,
            )
        }

        fn start(&self, config: WorkerConfig) -> WorkerHandle {
            self.worker(config).spawn(self.receiver.clone())
        }
    }

    fn config(workers: usize) -> WorkerConfig {
        WorkerConfig {
            workers,
            scan_timeout: Some(Duration::from_secs(10)),
            task_retention: None,
            reap_interval: Duration::from_secs(60),
        }
    }

    async fn wait_for<F>(registry: &TaskRegistry, id: Uuid, done: F) -> Task
    where
        F: Fn(&Task) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(task) = registry.get_by_id(id).await {
                    if done(&task) {
                        return task;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task did not reach the expected state in time")
    }

    async fn wait_for_terminal(registry: &TaskRegistry, id: Uuid) -> Task {
        wait_for(registry, id, Task::is_terminal).await
    }

    #[test]
    fn test_worker_config_from_scan_config() {
        let scan = ScanConfig {
            workers: 3,
            scan_timeout_secs: 0,
            task_retention_secs: 600,
            ..ScanConfig::default()
        };

        let config = WorkerConfig::from(&scan);
        assert_eq!(config.workers, 3);
        assert!(config.scan_timeout.is_none());
        assert_eq!(config.task_retention, Some(Duration::from_secs(600)));

        let defaults = WorkerConfig::default();
        assert_eq!(defaults.workers, 1);
        assert_eq!(defaults.scan_timeout, Some(Duration::from_secs(300)));
        assert!(defaults.task_retention.is_none());
    }

    #[tokio::test]
    async fn test_successful_scan_completes_task() {
        let harness = Harness::new(4, StubExecutor::default());
        let task = harness
            .registry
            .create("https://example.com", "")
            .await
            .unwrap();
        assert_eq!(
            harness.registry.get_by_id(task.id).await.unwrap().status,
            TaskStatus::Pending
        );

        let handle = harness.start(config(1));
        let done = wait_for_terminal(&harness.registry, task.id).await;

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_ref().map(Vec::len), Some(2));
        assert!(done.error_message.is_none());
        let started = done.started_at.unwrap();
        let completed = done.completed_at.unwrap();
        assert!(started >= done.created_at);
        assert!(completed >= started);
        assert!(done.duration_ms.unwrap() >= 0);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_unreachable_url_fails_without_scanning() {
        let harness = Harness::new(4, StubExecutor::default());
        let handle = harness.start(config(1));

        let task = harness
            .registry
            .create("ftp://bad-scheme", "")
            .await
            .unwrap();
        let done = wait_for_terminal(&harness.registry, task.id).await;

        assert_eq!(done.status, TaskStatus::Failed);
        let message = done.error_message.unwrap();
        assert!(message.starts_with("URL not reachable: "));
        assert!(message.contains("unsupported URL scheme"));
        assert!(done.result.is_none());
        assert!(done.started_at.is_some());
        assert!(harness.executor.calls().is_empty());

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_issues_found_report_completes_task() {
        let harness = Harness::new(4, StubExecutor::default());
        let handle = harness.start(config(1));

        let task = harness
            .registry
            .create("https://five.example.com", "axe")
            .await
            .unwrap();
        let done = wait_for_terminal(&harness.registry, task.id).await;

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.unwrap().len(), 5);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_scanner_error_fails_task_and_next_task_still_runs() {
        let harness = Harness::new(4, StubExecutor::default());
        let failing = harness
            .registry
            .create("https://fail.example.com", "")
            .await
            .unwrap();
        let healthy = harness
            .registry
            .create("https://ok.example.com", "")
            .await
            .unwrap();

        let handle = harness.start(config(1));
        let failed = wait_for_terminal(&harness.registry, failing.id).await;
        let completed = wait_for_terminal(&harness.registry, healthy.id).await;

        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.result.is_none());
        let message = failed.error_message.unwrap();
        assert!(message.contains("not a valid JSON report"));
        assert!(message.contains("expected value"));

        assert_eq!(completed.status, TaskStatus::Completed);

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_tasks_start_in_fifo_order() {
        let harness = Harness::new(8, StubExecutor::default());
        let urls = [
            "https://a.example.com",
            "https://b.example.com",
            "https://c.example.com",
        ];
        let mut ids = Vec::new();
        for url in urls {
            ids.push(harness.registry.create(url, "").await.unwrap().id);
        }

        let handle = harness.start(config(1));
        for id in &ids {
            wait_for_terminal(&harness.registry, *id).await;
        }

        assert_eq!(harness.executor.calls(), urls.to_vec());

        let tasks: Vec<Task> = snapshots(&harness.registry, &ids).await;
        assert!(tasks[0].started_at <= tasks[1].started_at);
        assert!(tasks[1].started_at <= tasks[2].started_at);

        handle.shutdown();
        handle.join().await;
    }

    async fn snapshots(registry: &TaskRegistry, ids: &[Uuid]) -> Vec<Task> {
        let mut tasks = Vec::new();
        for id in ids {
            tasks.push(registry.get_by_id(*id).await.unwrap());
        }
        tasks
    }

    #[tokio::test]
    async fn test_worker_pool_processes_each_task_once() {
        let harness = Harness::new(64, StubExecutor::with_delay(Duration::from_millis(2)));
        let handle = harness.start(config(4));

        let mut ids = Vec::new();
        for i in 0..40 {
            let url = format!("https://example.com/page/{}", i);
            ids.push(harness.registry.create(&url, "").await.unwrap().id);
        }
        for id in &ids {
            let task = wait_for_terminal(&harness.registry, *id).await;
            assert_eq!(task.status, TaskStatus::Completed);
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for url in harness.executor.calls() {
            *counts.entry(url).or_default() += 1;
        }
        assert_eq!(counts.len(), 40);
        assert!(counts.values().all(|&n| n == 1));

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer_until_dequeued() {
        let harness = Harness::new(1, StubExecutor::with_delay(Duration::from_millis(20)));
        let first = harness
            .registry
            .create("https://first.example.com", "")
            .await
            .unwrap();

        let registry = harness.registry.clone();
        let second = tokio::spawn(async move {
            registry
                .create("https://second.example.com", "")
                .await
                .unwrap()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());
        assert_eq!(harness.registry.len().await, 1);

        let handle = harness.start(config(1));
        let second = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("blocked producer was never released")
            .unwrap();

        wait_for_terminal(&harness.registry, first.id).await;
        wait_for_terminal(&harness.registry, second.id).await;
        assert_eq!(
            harness.executor.calls(),
            vec![
                "https://first.example.com".to_string(),
                "https://second.example.com".to_string()
            ]
        );

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_scan_deadline_fails_task() {
        let harness = Harness::new(4, StubExecutor::default());
        let mut config = config(1);
        config.scan_timeout = Some(Duration::from_millis(50));
        let handle = harness.start(config);

        let task = harness
            .registry
            .create("https://slow.example.com", "")
            .await
            .unwrap();
        let done = wait_for_terminal(&harness.registry, task.id).await;

        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(
            done.error_message.as_deref(),
            Some("scan timed out after 50ms")
        );

        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_scan() {
        let harness = Harness::new(4, StubExecutor::default());
        let mut config = config(1);
        config.scan_timeout = None;
        let handle = harness.start(config);

        let task = harness
            .registry
            .create("https://slow.example.com", "")
            .await
            .unwrap();
        wait_for(&harness.registry, task.id, |t| {
            t.status == TaskStatus::Processing
        })
        .await;

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("worker did not stop");

        let done = harness.registry.get_by_id(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(
            done.error_message.as_deref(),
            Some("scan cancelled: worker shutting down")
        );
    }

    #[tokio::test]
    async fn test_idle_pool_stops_on_shutdown() {
        let harness = Harness::new(4, StubExecutor::default());
        let handle = harness.start(config(3));
        let token = handle.shutdown_token();

        handle.shutdown();
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("idle workers did not stop");
    }

    #[tokio::test]
    async fn test_unknown_or_finished_ids_are_skipped() {
        let harness = Harness::new(4, StubExecutor::default());
        let worker = harness.worker(config(1));
        let token = CancellationToken::new();

        worker.process_task(Uuid::new_v4(), &token).await;
        assert!(harness.registry.is_empty().await);

        let task = harness
            .registry
            .create("https://example.com", "")
            .await
            .unwrap();
        harness
            .registry
            .update_result(task.id, TaskStatus::Failed, None, Some("earlier".into()))
            .await
            .unwrap();

        worker.process_task(task.id, &token).await;
        let after = harness.registry.get_by_id(task.id).await.unwrap();
        assert_eq!(after.status, TaskStatus::Failed);
        assert_eq!(after.error_message.as_deref(), Some("earlier"));
        assert!(harness.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retention_reaper_evicts_finished_tasks() {
        let harness = Harness::new(4, StubExecutor::default());
        let mut config = config(1);
        config.task_retention = Some(Duration::from_millis(1));
        config.reap_interval = Duration::from_millis(20);
        let handle = harness.start(config);

        let task = harness
            .registry
            .create("https://example.com", "")
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while harness.registry.get_by_id(task.id).await.is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("finished task was never evicted");

        handle.shutdown();
        handle.join().await;
    }
}
