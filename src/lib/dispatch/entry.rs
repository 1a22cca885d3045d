use super::dispatcher::Dispatcher;
use super::types::{DispatchError, DispatchReport, DispatchRequest, DispatchResult, TaskOrigin};
use crate::lib::config::scan_types::ScanTypeRegistry;

/// Upper bound on units a single request may ask for.
pub const DEFAULT_MAX_DESIRED_COUNT: usize = 1000;

/// Resolves a scan type to its launch policy and hands off to the dispatcher.
#[derive(Clone)]
pub struct DispatchEntry {
    registry: ScanTypeRegistry,
    dispatcher: Dispatcher,
    max_desired_count: usize,
}

impl DispatchEntry {
    pub fn new(registry: ScanTypeRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            dispatcher,
            max_desired_count: DEFAULT_MAX_DESIRED_COUNT,
        }
    }

    pub fn with_max_desired_count(mut self, max: usize) -> Self {
        self.max_desired_count = max;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn handle(&self, request: DispatchRequest) -> DispatchResult<DispatchReport> {
        let Some(policy) = self.registry.get(&request.scan_type) else {
            tracing::warn!(
                scan_type = %request.scan_type,
                available = ?self.registry.names(),
                "Rejected dispatch for unknown scan type"
            );
            return Err(DispatchError::Configuration(format!(
                "unknown scan type '{}'",
                request.scan_type
            )));
        };

        let Some(queue_url) = policy.queue_url.as_deref() else {
            return Err(DispatchError::Configuration(format!(
                "no queue URL configured for scan type '{}'",
                request.scan_type
            )));
        };

        let desired_count = request.desired_count.unwrap_or(policy.default_count);
        if desired_count > self.max_desired_count {
            tracing::warn!(
                scan_type = %request.scan_type,
                desired_count,
                max = self.max_desired_count,
                "Rejected dispatch above the desired count ceiling"
            );
            return Err(DispatchError::Configuration(format!(
                "desired count {} exceeds the maximum of {}",
                desired_count, self.max_desired_count
            )));
        }
        let origin = TaskOrigin {
            scan_id: request.scan_id,
            organization_ids: request.organization_ids,
        };

        self.dispatcher
            .start_desired_tasks(&request.scan_type, desired_count, queue_url, &origin)
            .await
    }
}
