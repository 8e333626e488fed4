use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use lumen_core::models::Issue;
use lumen_core::{ScanConfig, ScanError, ScanExecutor};

/// pa11y exits with this code when the page has accessibility issues. The JSON
/// report on stdout is still complete in that case.
pub const ISSUES_FOUND_EXIT_CODE: i32 = 2;

/// Longest chunk of scanner output copied into an error message.
const MAX_OUTPUT_EXCERPT: usize = 2000;

/// Runs pa11y as a child process with the JSON reporter.
#[derive(Debug, Clone)]
pub struct Pa11yExecutor {
    program: String,
    base_args: Vec<String>,
    default_runner: String,
}

impl Pa11yExecutor {
    /// `command` is split on whitespace: the first token is the program and
    /// the rest are passed before the scan arguments (e.g. `npx pa11y`).
    pub fn new(command: &str, default_runner: impl Into<String>) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "pa11y".to_string());
        Self {
            program,
            base_args: parts.collect(),
            default_runner: default_runner.into(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(&config.command, config.default_runner.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn build_args(&self, url: &str, runner: &str) -> Vec<String> {
        let runner = if runner.trim().is_empty() {
            self.default_runner.as_str()
        } else {
            runner
        };

        let mut args = self.base_args.clone();
        args.extend([
            "--reporter".to_string(),
            "json".to_string(),
            "--runner".to_string(),
            runner.to_string(),
            url.to_string(),
        ]);
        args
    }

    /// Confirm the scanner can be launched, returning the version it reports.
    pub async fn check_install(&self) -> Result<String, ScanError> {
        let output = Command::new(&self.program)
            .args(&self.base_args)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ScanError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ScanError::UnexpectedExit {
                code: output.status.code(),
                parse_error: None,
                output: combined_excerpt(&output.stdout, &output.stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ScanExecutor for Pa11yExecutor {
    #[tracing::instrument(skip(self), fields(program = %self.program))]
    async fn scan(&self, url: &str, runner: &str) -> Result<Vec<Issue>, ScanError> {
        let args = self.build_args(url, runner);
        tracing::debug!(args = ?args, "Running scanner");

        // kill_on_drop: a deadline or shutdown that drops this future must not
        // leave the browser-backed scanner running.
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ScanError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        let issues = interpret_output(output.status.code(), &output.stdout, &output.stderr)?;
        tracing::debug!(issue_count = issues.len(), "Scanner finished");
        Ok(issues)
    }
}

/// Map the scanner's exit code and stdout to an issue list.
///
/// Exit 0 and [`ISSUES_FOUND_EXIT_CODE`] both carry a report. Anything else is
/// a failure; the error still records whether stdout was a parsable report so
/// the operator can tell a crashed scanner from a rejected page.
pub(crate) fn interpret_output(
    code: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<Vec<Issue>, ScanError> {
    match code {
        Some(0) | Some(ISSUES_FOUND_EXIT_CODE) => {
            serde_json::from_slice(stdout).map_err(|source| ScanError::InvalidOutput {
                source,
                output: combined_excerpt(stdout, stderr),
            })
        }
        code => Err(ScanError::UnexpectedExit {
            code,
            parse_error: serde_json::from_slice::<Vec<Issue>>(stdout)
                .err()
                .map(|e| e.to_string()),
            output: combined_excerpt(stdout, stderr),
        }),
    }
}

fn combined_excerpt(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).trim().to_string();
    let err = String::from_utf8_lossy(stderr);
    let err = err.trim();
    if !err.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(err);
    }

    if text.chars().count() > MAX_OUTPUT_EXCERPT {
        let cut: String = text.chars().take(MAX_OUTPUT_EXCERPT).collect();
        format!("{}... (truncated)", cut)
    } else {
        text
    }
}
