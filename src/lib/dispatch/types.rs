use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lib::launch::types::LaunchError;

/// Inbound request to launch workers for one scan type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub scan_type: String,
    #[serde(default)]
    pub desired_count: Option<usize>,
    #[serde(default)]
    pub scan_id: Option<Uuid>,
    #[serde(default)]
    pub organization_ids: Vec<Uuid>,
}

impl DispatchRequest {
    pub fn new(scan_type: &str) -> Self {
        Self {
            scan_type: scan_type.to_string(),
            desired_count: None,
            scan_id: None,
            organization_ids: Vec::new(),
        }
    }
}

/// Ownership copied onto every task record a dispatch creates.
#[derive(Debug, Clone, Default)]
pub struct TaskOrigin {
    pub scan_id: Option<Uuid>,
    pub organization_ids: Vec<Uuid>,
}

/// Batch sizes for one dispatch, in launch order. Batches are produced lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub(super) desired: usize,
    pub(super) limit: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub scan_type: String,
    pub desired_count: usize,
    pub batches: Vec<usize>,
    pub launched: usize,
    pub failed: usize,
    pub task_ids: Vec<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Launch backend failed for {scan_type} on batch {batch_index} \
         (size {batch_size}, {launched} already launched): {source}"
    )]
    LaunchBackend {
        scan_type: String,
        batch_index: usize,
        batch_size: usize,
        launched: usize,
        #[source]
        source: LaunchError,
    },
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Configuration(_) => "configuration",
            DispatchError::LaunchBackend { .. } => "launch_backend",
        }
    }

    /// Units already started before the failure.
    pub fn launched(&self) -> usize {
        match self {
            DispatchError::Configuration(_) => 0,
            DispatchError::LaunchBackend { launched, .. } => *launched,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
