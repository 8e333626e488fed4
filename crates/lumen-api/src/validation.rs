//! Validation utilities for API handlers

use lumen_core::config::SUPPORTED_RUNNERS;
use lumen_core::models::CreateTaskRequest;
use lumen_core::AppError;

/// A submission that passed producer-side checks.
#[derive(Debug, PartialEq, Eq)]
pub struct ScanSubmission {
    pub url: String,
    /// Empty selects the scanner's default runner.
    pub runner: String,
}

/// Reject submissions before a task is created.
///
/// Only the shape of the URL is checked here. Whether it is http(s) and
/// answers is decided by the worker's reachability check, which records the
/// reason on the task.
pub fn validate_scan_request(request: &CreateTaskRequest) -> Result<ScanSubmission, AppError> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(AppError::InvalidInput("url is required".to_string()));
    }

    reqwest::Url::parse(url)
        .map_err(|e| AppError::InvalidInput(format!("invalid URL '{}': {}", url, e)))?;

    let runner = request.runner.as_deref().unwrap_or_default().trim();
    if !runner.is_empty() && !SUPPORTED_RUNNERS.contains(&runner) {
        return Err(AppError::InvalidInput(format!(
            "unsupported runner '{}', expected one of: {}",
            runner,
            SUPPORTED_RUNNERS.join(", ")
        )));
    }

    Ok(ScanSubmission {
        url: url.to_string(),
        runner: runner.to_string(),
    })
}
