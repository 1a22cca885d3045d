use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::types::{ScanTask, State, TaskDb, TaskFilter, TaskResult};

/// Persistence port for scan task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: ScanTask) -> TaskResult<()>;

    async fn get(&self, id: Uuid) -> TaskResult<Option<ScanTask>>;

    /// Replaces the stored record only while its status is still `expected`.
    /// Returns `false` when the record is missing or has moved on.
    async fn update_if(&self, expected: State, task: ScanTask) -> TaskResult<bool>;

    async fn list(&self, filter: &TaskFilter) -> TaskResult<Vec<ScanTask>>;

    async fn find_by_handle(&self, handle: &str) -> TaskResult<Option<ScanTask>>;
}

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    db: Mutex<TaskDb>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: ScanTask) -> TaskResult<()> {
        self.db.lock().await.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> TaskResult<Option<ScanTask>> {
        Ok(self.db.lock().await.get(&id).cloned())
    }

    async fn update_if(&self, expected: State, task: ScanTask) -> TaskResult<bool> {
        let mut db = self.db.lock().await;
        match db.get_mut(&task.id) {
            Some(current) if current.status == expected => {
                *current = task;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, filter: &TaskFilter) -> TaskResult<Vec<ScanTask>> {
        let db = self.db.lock().await;
        let mut tasks: Vec<ScanTask> = db.values().filter(|t| filter.matches(t)).cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn find_by_handle(&self, handle: &str) -> TaskResult<Option<ScanTask>> {
        let db = self.db.lock().await;
        Ok(db
            .values()
            .find(|t| t.backend_handle.as_deref() == Some(handle))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::lib::tasks::types::ExecutionKind;

    fn task(status: State) -> ScanTask {
        let now = Utc::now();
        ScanTask {
            id: Uuid::new_v4(),
            scan_id: None,
            organization_id: None,
            organization_ids: Vec::new(),
            status,
            kind: ExecutionKind::Fargate,
            backend_handle: None,
            input: serde_json::Value::Null,
            output: None,
            created_at: now,
            updated_at: now,
            queued_at: None,
            requested_at: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn update_if_only_writes_over_the_expected_status() {
        let store = MemoryTaskStore::new();
        let stored = task(State::Started);
        store.insert(stored.clone()).await.unwrap();

        let mut killed = stored.clone();
        killed.status = State::Failed;
        assert!(store.update_if(State::Started, killed).await.unwrap());

        let mut finished = stored.clone();
        finished.status = State::Finished;
        assert!(!store.update_if(State::Started, finished).await.unwrap());

        let current = store.get(stored.id).await.unwrap().unwrap();
        assert_eq!(current.status, State::Failed);
    }

    #[tokio::test]
    async fn update_if_on_missing_record_writes_nothing() {
        let store = MemoryTaskStore::new();
        let orphan = task(State::Queued);
        assert!(!store.update_if(State::Queued, orphan.clone()).await.unwrap());
        assert!(store.get(orphan.id).await.unwrap().is_none());
    }
}
