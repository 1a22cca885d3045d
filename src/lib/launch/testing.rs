use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{LaunchBackend, LaunchError, LaunchResult, LaunchedUnit, UnitFailure};

/// In-process backend that records every call.
pub struct RecordingBackend {
    limit: usize,
    fail_on_call: Option<usize>,
    failed_units_per_call: usize,
    calls: Mutex<Vec<(String, usize, String)>>,
}

impl RecordingBackend {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            fail_on_call: None,
            failed_units_per_call: 0,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes the `n`th call (1-based) return an error.
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    pub fn with_failed_units(mut self, per_call: usize) -> Self {
        self.failed_units_per_call = per_call;
        self
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|c| c.1).collect()
    }

    pub fn calls(&self) -> Vec<(String, usize, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LaunchBackend for RecordingBackend {
    fn max_per_call(&self) -> usize {
        self.limit
    }

    async fn launch(
        &self,
        scan_type: &str,
        count: usize,
        queue_url: &str,
    ) -> Result<LaunchResult, LaunchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((scan_type.to_string(), count, queue_url.to_string()));
            calls.len()
        };

        if self.fail_on_call == Some(call) {
            return Err(LaunchError::Ecs("simulated quota exceeded".to_string()));
        }

        let failed = self.failed_units_per_call.min(count);
        let mut result = LaunchResult::default();
        for i in 0..count - failed {
            result.succeeded.push(LaunchedUnit {
                handle: format!("task-{call}-{i}"),
            });
        }
        for _ in 0..failed {
            result.failed.push(UnitFailure {
                handle: None,
                reason: "simulated unit failure".to_string(),
            });
        }
        Ok(result)
    }
}
