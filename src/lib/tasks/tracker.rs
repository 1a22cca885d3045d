use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::state::valid_state_transition;
use super::store::TaskStore;
use super::types::{
    EcsTaskStateChange, NewScanTask, ScanTask, State, StatusReport, TaskError, TaskFilter,
    TaskResult,
};

/// Owns the scan task state machine on top of a [`TaskStore`].
#[derive(Clone)]
pub struct TaskTracker {
    store: Arc<dyn TaskStore>,
}

impl TaskTracker {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: NewScanTask) -> TaskResult<ScanTask> {
        let now = Utc::now();
        let task = ScanTask {
            id: Uuid::new_v4(),
            scan_id: new.scan_id,
            organization_id: new.organization_ids.first().copied(),
            organization_ids: new.organization_ids,
            status: State::Created,
            kind: new.kind,
            backend_handle: None,
            input: new.input,
            output: None,
            created_at: now,
            updated_at: now,
            queued_at: None,
            requested_at: None,
            started_at: None,
            finished_at: None,
        };
        self.store.insert(task.clone()).await?;
        tracing::debug!(task_id = %task.id, "Scan task created");
        Ok(task)
    }

    pub async fn get(&self, id: Uuid) -> TaskResult<ScanTask> {
        self.store.get(id).await?.ok_or(TaskError::NotFound(id))
    }

    pub async fn list(&self, filter: &TaskFilter) -> TaskResult<Vec<ScanTask>> {
        self.store.list(filter).await
    }

    /// Moves a record to `dst`, stamping the matching timestamp.
    pub async fn transition(
        &self,
        id: Uuid,
        dst: State,
        handle: Option<String>,
        output: Option<String>,
    ) -> TaskResult<ScanTask> {
        let task = self.get(id).await?;
        self.apply(task, dst, handle, output).await
    }

    async fn apply(
        &self,
        mut task: ScanTask,
        dst: State,
        handle: Option<String>,
        output: Option<String>,
    ) -> TaskResult<ScanTask> {
        if task.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal(task.id));
        }
        if !valid_state_transition(&task.status, &dst) {
            return Err(TaskError::InvalidTransition {
                from: task.status,
                to: dst,
            });
        }

        let expected = task.status;
        let now = Utc::now();
        match dst {
            State::Queued => task.queued_at = Some(now),
            State::Requested => task.requested_at = Some(now),
            State::Started => task.started_at = Some(now),
            State::Finished | State::Failed => task.finished_at = Some(now),
            State::Created => {}
        }
        if handle.is_some() {
            task.backend_handle = handle;
        }
        if output.is_some() {
            task.output = output;
        }
        task.status = dst;
        task.updated_at = now;

        if !self.store.update_if(expected, task.clone()).await? {
            // Another writer moved the record first.
            let current = self.get(task.id).await?;
            tracing::debug!(
                task_id = %task.id,
                expected = ?expected,
                current = ?current.status,
                "Scan task changed concurrently"
            );
            if current.status.is_terminal() {
                return Err(TaskError::AlreadyTerminal(task.id));
            }
            return Err(TaskError::InvalidTransition {
                from: current.status,
                to: dst,
            });
        }
        tracing::debug!(task_id = %task.id, status = ?task.status, "Scan task updated");
        Ok(task)
    }

    /// Out-of-band termination; the record goes straight to `Failed`.
    pub async fn kill(&self, id: Uuid) -> TaskResult<ScanTask> {
        let output = format!("Manually stopped at {}", Utc::now().to_rfc3339());
        let task = self.transition(id, State::Failed, None, Some(output)).await?;
        tracing::info!(task_id = %id, "Scan task killed");
        Ok(task)
    }

    pub async fn report(&self, id: Uuid, report: StatusReport) -> TaskResult<ScanTask> {
        match report.status {
            State::Started | State::Finished | State::Failed => {
                self.transition(id, report.status, None, report.output).await
            }
            other => {
                let task = self.get(id).await?;
                Err(TaskError::InvalidTransition {
                    from: task.status,
                    to: other,
                })
            }
        }
    }

    /// Applies an ECS task state change. Events for unknown ARNs and
    /// intermediate statuses are ignored.
    pub async fn apply_ecs_event(
        &self,
        event: &EcsTaskStateChange,
    ) -> TaskResult<Option<ScanTask>> {
        let Some(task) = self.store.find_by_handle(&event.task_arn).await? else {
            tracing::debug!(task_arn = %event.task_arn, "No scan task for ECS event");
            return Ok(None);
        };

        match event.last_status.as_str() {
            "RUNNING" => {
                if task.status != State::Requested {
                    return Ok(Some(task));
                }
                self.apply(task, State::Started, None, None).await.map(Some)
            }
            "STOPPED" => {
                if task.status.is_terminal() {
                    return Ok(Some(task));
                }
                let exit_code = event.containers.first().and_then(|c| c.exit_code);
                if exit_code == Some(0) {
                    // A short-lived task can stop before RUNNING was reported.
                    let task = if task.status == State::Requested {
                        self.apply(task, State::Started, None, None).await?
                    } else {
                        task
                    };
                    self.apply(task, State::Finished, None, None).await.map(Some)
                } else {
                    let output = match (exit_code, &event.stopped_reason) {
                        (Some(code), _) => format!("Container exited with code {code}"),
                        (None, Some(reason)) => reason.clone(),
                        (None, None) => "Task stopped".to_string(),
                    };
                    self.apply(task, State::Failed, None, Some(output)).await.map(Some)
                }
            }
            _ => Ok(Some(task)),
        }
    }
}
