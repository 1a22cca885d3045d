use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Created,
    Queued,
    Requested,
    Started,
    Finished,
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Finished | State::Failed)
    }
}

/// How a scan task is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Fargate,
    Lambda,
}

/// One dispatched unit of scan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanTask {
    pub id: Uuid,
    pub scan_id: Option<Uuid>,
    /// Legacy single-organization reference.
    pub organization_id: Option<Uuid>,
    pub organization_ids: Vec<Uuid>,
    pub status: State,
    pub kind: ExecutionKind,
    /// ECS task ARN or Docker container id, once the backend has one.
    pub backend_handle: Option<String>,
    pub input: serde_json::Value,
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub requested_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Fields needed to open a new record in the `Created` state.
#[derive(Debug, Clone)]
pub struct NewScanTask {
    pub scan_id: Option<Uuid>,
    pub organization_ids: Vec<Uuid>,
    pub kind: ExecutionKind,
    pub input: serde_json::Value,
}

/// Status report sent by a running unit about itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: State,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub status: Option<State>,
    pub organization: Option<Uuid>,
    pub scan: Option<Uuid>,
}

impl TaskFilter {
    pub fn matches(&self, task: &ScanTask) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(org) = self.organization {
            let member = task.organization_id == Some(org) || task.organization_ids.contains(&org);
            if !member {
                return false;
            }
        }
        if let Some(scan) = self.scan {
            if task.scan_id != Some(scan) {
                return false;
            }
        }
        true
    }
}

/// ECS "Task State Change" event detail.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsTaskStateChange {
    pub task_arn: String,
    pub last_status: String,
    #[serde(default)]
    pub stopped_reason: Option<String>,
    #[serde(default)]
    pub containers: Vec<EcsContainerState>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsContainerState {
    #[serde(default)]
    pub exit_code: Option<i32>,
}

pub type TaskDb = HashMap<Uuid, ScanTask>;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("ScanTask {0} not found")]
    NotFound(Uuid),

    #[error("ScanTask has already finished.")]
    AlreadyTerminal(Uuid),

    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: State, to: State },

    #[error("Task store error: {0}")]
    Store(String),
}

pub type TaskResult<T> = Result<T, TaskError>;
