//! Scan collaborator traits.
//!
//! The worker drives two collaborators for every task: a cheap reachability
//! probe and the scan itself. Both are traits so the worker can be exercised
//! with stubs and the concrete process/HTTP implementations live in
//! `lumen-scanner`.

use async_trait::async_trait;
use std::time::Duration;

use crate::models::Issue;

/// Runs the external accessibility scanner against a URL.
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    /// Scan `url` with the given runner profile (empty selects the default).
    async fn scan(&self, url: &str, runner: &str) -> Result<Vec<Issue>, ScanError>;
}

/// Verifies a URL answers before paying for a full scan.
#[async_trait]
pub trait ReachabilityCheck: Send + Sync {
    async fn check(&self, url: &str) -> Result<(), ReachabilityError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("error running {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "error running scanner: {}; {}\nOutput: {output}",
        describe_exit(.code),
        describe_report(.parse_error)
    )]
    UnexpectedExit {
        code: Option<i32>,
        parse_error: Option<String>,
        output: String,
    },

    #[error("error parsing scanner output: {source}\nOutput was: {output}")]
    InvalidOutput {
        #[source]
        source: serde_json::Error,
        output: String,
    },

    #[error("scan timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("scan cancelled: worker shutting down")]
    Cancelled,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn describe_report(parse_error: &Option<String>) -> String {
    match parse_error {
        Some(err) => format!("output is not a valid JSON report ({})", err),
        None => "output is a valid JSON report".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReachabilityError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: missing host")]
    MissingHost,

    #[error("request failed: {0}")]
    Request(String),

    #[error("received HTTP status {status} {reason}")]
    HttpStatus { status: u16, reason: String },
}
