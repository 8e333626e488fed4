use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::Issue;
use crate::queue_error::RegistryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and Failed are final; nothing moves out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Processing => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    /// Only strictly forward moves are allowed. A task may skip Processing
    /// (Pending -> Failed) but can never re-enter a status it already held.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// One accessibility-scan request and its lifecycle state.
///
/// `id`, `url` and `runner` never change after creation. Everything else is
/// written by the worker through [`Task::transition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub url: String,
    /// Runner profile; empty means the scanner's default.
    pub runner: String,
    pub status: TaskStatus,
    pub result: Option<Vec<Issue>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl Task {
    pub fn new(url: impl Into<String>, runner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            runner: runner.into(),
            status: TaskStatus::Pending,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the task to `next`, stamping `updated_at` and, the first time the
    /// corresponding status is reached, `started_at` / `completed_at`.
    ///
    /// `duration_ms` is measured from `started_at`, falling back to
    /// `created_at` for tasks that never started, and is never negative.
    pub fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<(), RegistryError> {
        if !self.status.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.updated_at = now;

        if next == TaskStatus::Processing && self.started_at.is_none() {
            self.started_at = Some(now);
        }

        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
            let since = self.started_at.unwrap_or(self.created_at);
            self.duration_ms = Some(now.signed_duration_since(since).num_milliseconds().max(0));
        }

        Ok(())
    }
}

/// Request body for submitting a scan.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub url: String,
    #[serde(default)]
    pub runner: Option<String>,
}

/// Response model for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Uuid,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub runner: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Vec<Issue>>,
    pub issue_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            url: task.url,
            runner: task.runner,
            status: task.status,
            issue_count: task.result.as_ref().map_or(0, Vec::len),
            result: task.result,
            error_message: task.error_message,
            created_at: task.created_at,
            updated_at: task.updated_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            duration_ms: task.duration_ms,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskStats {
    pub fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}
