use async_trait::async_trait;

use crate::lib::tasks::types::ExecutionKind;

/// Environment variable carrying the scan type to the worker.
pub const SERVICE_TYPE_ENV: &str = "SERVICE_TYPE";
/// Environment variable carrying the work queue URL to the worker.
pub const SERVICE_QUEUE_URL_ENV: &str = "SERVICE_QUEUE_URL";

/// Starts execution units on a container backend.
#[async_trait]
pub trait LaunchBackend: Send + Sync {
    /// Maximum number of units a single `launch` call may start.
    fn max_per_call(&self) -> usize;

    fn kind(&self) -> ExecutionKind {
        ExecutionKind::Fargate
    }

    async fn launch(
        &self,
        scan_type: &str,
        count: usize,
        queue_url: &str,
    ) -> Result<LaunchResult, LaunchError>;
}

#[derive(Debug, Clone)]
pub struct LaunchedUnit {
    pub handle: String,
}

#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub handle: Option<String>,
    pub reason: String,
}

/// Outcome of one batch: units that started and units that did not.
#[derive(Debug, Clone, Default)]
pub struct LaunchResult {
    pub succeeded: Vec<LaunchedUnit>,
    pub failed: Vec<UnitFailure>,
}

impl LaunchResult {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("ECS error: {0}")]
    Ecs(String),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Secret provider error: {0}")]
    Secret(String),
}
