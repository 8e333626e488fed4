//! Scan pipeline wiring: queue, registry, scanner and worker pool.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;
use lumen_core::{Config, ReachabilityCheck, ScanConfig, ScanExecutor};
use lumen_scanner::{HttpReachabilityChecker, Pa11yExecutor};
use lumen_worker::{task_channel, TaskRegistry, TaskWorker, WorkerConfig, WorkerHandle};

/// Build the pa11y-backed pipeline described by `config` and wrap it in the
/// shared handler state.
pub async fn initialize_services(config: &Config) -> Result<(Arc<AppState>, WorkerHandle)> {
    let executor = Pa11yExecutor::from_config(&config.scan);
    match executor.check_install().await {
        Ok(version) => tracing::info!(program = executor.program(), version = %version, "Scanner available"),
        Err(e) => tracing::warn!(
            program = executor.program(),
            error = %e,
            "Scanner could not be launched; scans will fail until it is installed"
        ),
    }

    let checker: Option<Arc<dyn ReachabilityCheck>> = if config.scan.reachability_check_enabled {
        Some(Arc::new(HttpReachabilityChecker::new(Duration::from_secs(
            config.scan.reachability_timeout_secs,
        ))?))
    } else {
        tracing::info!("Reachability pre-check disabled");
        None
    };

    let (registry, workers) = start_scan_pipeline(&config.scan, Arc::new(executor), checker);
    Ok((Arc::new(AppState::new(registry)), workers))
}

/// Create the bounded queue and registry and spawn the worker pool over them.
pub fn start_scan_pipeline(
    config: &ScanConfig,
    executor: Arc<dyn ScanExecutor>,
    checker: Option<Arc<dyn ReachabilityCheck>>,
) -> (TaskRegistry, WorkerHandle) {
    let (sender, receiver) = task_channel(config.queue_capacity.max(1));
    let registry = TaskRegistry::new(sender);

    tracing::info!(
        queue_capacity = config.queue_capacity,
        workers = config.workers,
        "Starting scan pipeline"
    );

    let workers = TaskWorker::new(
        registry.clone(),
        executor,
        checker,
        WorkerConfig::from(config),
    )
    .spawn(receiver);

    (registry, workers)
}
