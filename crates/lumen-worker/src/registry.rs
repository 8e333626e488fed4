//! Task registry: the authoritative id -> task map.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use lumen_core::models::{Issue, Task, TaskStats, TaskStatus};
use lumen_core::{QueueError, RegistryError};

use crate::queue::TaskSender;

/// Registry of scan tasks.
///
/// A single tokio RwLock guards the whole map. Every accessor returns owned
/// clones, so callers never hold a reference into the map across an await and
/// never observe a task mid-update.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    queue: TaskSender,
}

impl TaskRegistry {
    pub fn new(queue: TaskSender) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            queue,
        }
    }

    /// Store a new pending task and enqueue its id, waiting for queue space.
    ///
    /// The queue slot is reserved before the task is inserted, so a closed
    /// queue leaves no orphaned task behind and the id is only visible to
    /// workers once the task is in the map.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, url: &str, runner: &str) -> Result<Task, QueueError> {
        let permit = self.queue.reserve().await?;
        Ok(self.insert_and_send(permit, url, runner).await)
    }

    /// Like [`create`](Self::create) but fails with [`QueueError::Full`]
    /// instead of waiting.
    pub async fn try_create(&self, url: &str, runner: &str) -> Result<Task, QueueError> {
        let permit = self.queue.try_reserve()?;
        Ok(self.insert_and_send(permit, url, runner).await)
    }

    async fn insert_and_send(
        &self,
        permit: tokio::sync::mpsc::Permit<'_, Uuid>,
        url: &str,
        runner: &str,
    ) -> Task {
        let task = Task::new(url, runner);
        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(task.id, task.clone());
        }
        permit.send(task.id);

        tracing::info!(
            task_id = %task.id,
            url = %task.url,
            runner = %task.runner,
            "Task enqueued"
        );
        task
    }

    pub async fn get_by_id(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// All tasks, newest first.
    pub async fn get_all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        sort_newest_first(&mut tasks);
        tasks
    }

    /// Completed tasks, newest first.
    pub async fn get_completed(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .cloned()
            .collect();
        sort_newest_first(&mut tasks);
        tasks
    }

    /// Move a task to `status`.
    ///
    /// Unknown ids are a silent no-op (`Ok(None)`). A backward or repeated
    /// transition is rejected and the task is left untouched.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<Task>, RegistryError> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(None);
        };

        task.transition(status, Utc::now())?;
        Ok(Some(task.clone()))
    }

    /// Move a task to its final status and record the outcome in the same
    /// critical section.
    ///
    /// `issues` is only kept for `Completed` and `error_message` only for
    /// `Failed`, so a task never carries both.
    pub async fn update_result(
        &self,
        id: Uuid,
        status: TaskStatus,
        issues: Option<Vec<Issue>>,
        error_message: Option<String>,
    ) -> Result<Option<Task>, RegistryError> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(None);
        };

        task.transition(status, Utc::now())?;
        match status {
            TaskStatus::Completed => task.result = Some(issues.unwrap_or_default()),
            TaskStatus::Failed => {
                task.error_message = error_message.filter(|m| !m.is_empty());
            }
            TaskStatus::Pending | TaskStatus::Processing => {}
        }
        Ok(Some(task.clone()))
    }

    pub async fn stats(&self) -> TaskStats {
        let tasks = self.tasks.read().await;
        let mut stats = TaskStats::default();
        for task in tasks.values() {
            stats.record(task.status);
        }
        stats
    }

    /// Drop terminal tasks that finished before `cutoff`. Returns how many
    /// were removed.
    pub async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| {
            !(task.is_terminal() && task.completed_at.is_some_and(|done| done < cutoff))
        });
        before - tasks.len()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
