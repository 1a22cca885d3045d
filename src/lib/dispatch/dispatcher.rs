use std::sync::Arc;

use uuid::Uuid;

use super::types::{BatchPlan, DispatchError, DispatchReport, DispatchResult, TaskOrigin};
use crate::lib::launch::types::{LaunchBackend, LaunchResult};
use crate::lib::tasks::{
    tracker::TaskTracker,
    types::{NewScanTask, State, TaskResult},
};

/// Turns a desired unit count into sequential, bounded launch calls.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn LaunchBackend>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn LaunchBackend>, tracker: TaskTracker) -> Self {
        Self { backend, tracker }
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub async fn start_desired_tasks(
        &self,
        scan_type: &str,
        desired_count: usize,
        queue_url: &str,
        origin: &TaskOrigin,
    ) -> DispatchResult<DispatchReport> {
        let plan = BatchPlan::new(desired_count, self.backend.max_per_call());
        tracing::info!(
            scan_type,
            desired_count,
            batches = plan.len(),
            "Dispatching scan workers"
        );

        let mut report = DispatchReport {
            scan_type: scan_type.to_string(),
            desired_count,
            batches: Vec::new(),
            launched: 0,
            failed: 0,
            task_ids: Vec::new(),
        };

        for (batch_index, current) in plan.iter().enumerate() {
            let records = self
                .open_records(scan_type, queue_url, origin, current)
                .await;
            report.task_ids.extend(records.iter().flatten().copied());

            let result = match self.backend.launch(scan_type, current, queue_url).await {
                Ok(result) => result,
                Err(source) => {
                    tracing::error!(
                        scan_type,
                        batch_index,
                        batch_size = current,
                        attempted = desired_count,
                        launched = report.launched,
                        error = %source,
                        "Launch backend call failed, aborting dispatch"
                    );
                    let reason = format!("Launch failed: {source}");
                    for id in records.iter().flatten() {
                        let update =
                            self.tracker
                                .transition(*id, State::Failed, None, Some(reason.clone()));
                        self.record(update).await;
                    }
                    return Err(DispatchError::LaunchBackend {
                        scan_type: scan_type.to_string(),
                        batch_index,
                        batch_size: current,
                        launched: report.launched,
                        source,
                    });
                }
            };

            if result.total() != current {
                tracing::warn!(
                    scan_type,
                    batch_index,
                    batch_size = current,
                    reported = result.total(),
                    "Launch backend reported a different unit count than requested"
                );
            }
            report.batches.push(current);
            report.launched += result.succeeded.len();
            report.failed += current.saturating_sub(result.succeeded.len());
            self.settle_records(records, result).await;
        }

        tracing::info!(
            scan_type,
            launched = report.launched,
            failed = report.failed,
            "Dispatch complete"
        );
        Ok(report)
    }

    /// Creates one record per unit and queues it. A record that cannot be
    /// persisted is left out; the unit is still launched.
    async fn open_records(
        &self,
        scan_type: &str,
        queue_url: &str,
        origin: &TaskOrigin,
        count: usize,
    ) -> Vec<Option<Uuid>> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let new = NewScanTask {
                scan_id: origin.scan_id,
                organization_ids: origin.organization_ids.clone(),
                kind: self.backend.kind(),
                input: serde_json::json!({ "scanType": scan_type, "queueUrl": queue_url }),
            };
            let id = match self.tracker.create(new).await {
                Ok(task) => self
                    .record(self.tracker.transition(task.id, State::Queued, None, None))
                    .await
                    .map(|t| t.id),
                Err(e) => {
                    tracing::warn!(scan_type, error = %e, "Failed to persist scan task");
                    None
                }
            };
            ids.push(id);
        }
        ids
    }

    async fn settle_records(&self, records: Vec<Option<Uuid>>, result: LaunchResult) {
        let mut records = records.into_iter();

        for unit in result.succeeded {
            if let Some(Some(id)) = records.next() {
                let update =
                    self.tracker
                        .transition(id, State::Requested, Some(unit.handle), None);
                self.record(update).await;
            }
        }
        for failure in result.failed {
            if let Some(Some(id)) = records.next() {
                self.record(self.tracker.transition(
                    id,
                    State::Failed,
                    failure.handle,
                    Some(failure.reason),
                ))
                .await;
            }
        }
        for id in records.flatten() {
            self.record(self.tracker.transition(
                id,
                State::Failed,
                None,
                Some("No result from launch backend".to_string()),
            ))
            .await;
        }
    }

    /// Status persistence failures are logged and never abort a dispatch.
    async fn record<T>(&self, update: impl Future<Output = TaskResult<T>>) -> Option<T> {
        match update.await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist scan task status");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::launch::testing::RecordingBackend;
    use crate::lib::tasks::store::{MemoryTaskStore, TaskStore};
    use crate::lib::tasks::types::{ScanTask, TaskError, TaskFilter};
    use async_trait::async_trait;

    fn dispatcher(backend: Arc<RecordingBackend>) -> Dispatcher {
        let tracker = TaskTracker::new(Arc::new(MemoryTaskStore::new()));
        Dispatcher::new(backend, tracker)
    }

    #[tokio::test]
    async fn splits_into_sequential_batches() {
        let backend = Arc::new(RecordingBackend::new(10));
        let dispatcher = dispatcher(backend.clone());

        let report = dispatcher
            .start_desired_tasks("dnstwist", 25, "https://queue/dnstwist", &TaskOrigin::default())
            .await
            .unwrap();

        assert_eq!(backend.batch_sizes(), vec![10, 10, 5]);
        assert!(backend
            .calls()
            .iter()
            .all(|(t, _, q)| t == "dnstwist" && q == "https://queue/dnstwist"));
        assert_eq!(report.batches, vec![10, 10, 5]);
        assert_eq!(report.launched, 25);
        assert_eq!(report.failed, 0);
        assert_eq!(report.task_ids.len(), 25);

        let requested = TaskFilter {
            status: Some(State::Requested),
            ..Default::default()
        };
        let tasks = dispatcher.tracker().list(&requested).await.unwrap();
        assert_eq!(tasks.len(), 25);
        assert!(tasks.iter().all(|t| t.backend_handle.is_some()));
    }

    #[tokio::test]
    async fn zero_desired_makes_no_calls() {
        let backend = Arc::new(RecordingBackend::new(10));
        let report = dispatcher(backend.clone())
            .start_desired_tasks("shodan", 0, "q", &TaskOrigin::default())
            .await
            .unwrap();
        assert!(backend.calls().is_empty());
        assert!(report.batches.is_empty());
    }

    #[tokio::test]
    async fn failing_batch_aborts_the_rest() {
        let backend = Arc::new(RecordingBackend::new(10).failing_on(2));
        let dispatcher = dispatcher(backend.clone());

        let err = dispatcher
            .start_desired_tasks("hibp", 35, "q", &TaskOrigin::default())
            .await
            .unwrap_err();

        assert_eq!(backend.batch_sizes(), vec![10, 10]);
        match err {
            DispatchError::LaunchBackend {
                batch_index,
                batch_size,
                launched,
                ..
            } => {
                assert_eq!(batch_index, 1);
                assert_eq!(batch_size, 10);
                assert_eq!(launched, 10);
            }
            other => panic!("unexpected error: {other}"),
        }

        let failed = TaskFilter {
            status: Some(State::Failed),
            ..Default::default()
        };
        assert_eq!(dispatcher.tracker().list(&failed).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn unit_failures_are_counted_not_fatal() {
        let backend = Arc::new(RecordingBackend::new(10).with_failed_units(2));
        let dispatcher = dispatcher(backend.clone());

        let report = dispatcher
            .start_desired_tasks("intelx", 15, "q", &TaskOrigin::default())
            .await
            .unwrap();

        assert_eq!(backend.batch_sizes(), vec![10, 5]);
        assert_eq!(report.launched, 11);
        assert_eq!(report.failed, 4);

        let failed = TaskFilter {
            status: Some(State::Failed),
            ..Default::default()
        };
        let tasks = dispatcher.tracker().list(&failed).await.unwrap();
        assert_eq!(tasks.len(), 4);
        assert!(tasks.iter().all(|t| t.finished_at.is_some()));
    }

    #[tokio::test]
    async fn origin_is_copied_onto_records() {
        let backend = Arc::new(RecordingBackend::new(10));
        let dispatcher = dispatcher(backend);
        let org = Uuid::new_v4();
        let origin = TaskOrigin {
            scan_id: Some(Uuid::new_v4()),
            organization_ids: vec![org],
        };

        dispatcher
            .start_desired_tasks("shodan", 2, "q", &origin)
            .await
            .unwrap();

        let filter = TaskFilter {
            organization: Some(org),
            scan: origin.scan_id,
            ..Default::default()
        };
        assert_eq!(dispatcher.tracker().list(&filter).await.unwrap().len(), 2);
    }

    struct FailingStore;

    #[async_trait]
    impl TaskStore for FailingStore {
        async fn insert(&self, _task: ScanTask) -> TaskResult<()> {
            Err(TaskError::Store("database unavailable".into()))
        }

        async fn get(&self, _id: Uuid) -> TaskResult<Option<ScanTask>> {
            Ok(None)
        }

        async fn update_if(&self, _expected: State, _task: ScanTask) -> TaskResult<bool> {
            Err(TaskError::Store("database unavailable".into()))
        }

        async fn list(&self, _filter: &TaskFilter) -> TaskResult<Vec<ScanTask>> {
            Ok(Vec::new())
        }

        async fn find_by_handle(&self, _handle: &str) -> TaskResult<Option<ScanTask>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn store_failures_do_not_block_launches() {
        let backend = Arc::new(RecordingBackend::new(10));
        let dispatcher = Dispatcher::new(backend.clone(), TaskTracker::new(Arc::new(FailingStore)));

        let report = dispatcher
            .start_desired_tasks("shodan", 5, "q", &TaskOrigin::default())
            .await
            .unwrap();

        assert_eq!(backend.batch_sizes(), vec![5]);
        assert_eq!(report.launched, 5);
        assert!(report.task_ids.is_empty());
    }
}
