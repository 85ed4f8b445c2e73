use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use domus_core::{Device, Explanation, LogEntry, Session, Task, Value};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("device not found: {0}/{1}")]
    DeviceNotFound(String, String),
    #[error("explanation not found: {0}")]
    ExplanationNotFound(String),
}

type Result<T> = std::result::Result<T, StoreError>;

/// The per-study document store. Shared as `Arc<StudyStore>` across the
/// engine, gateway and timers.
#[derive(Default)]
pub struct StudyStore {
    sessions: RwLock<HashMap<String, Session>>,
    tasks: RwLock<HashMap<String, Task>>,
    /// Keyed by `(session_id, device_id)`.
    devices: RwLock<HashMap<(String, String), Device>>,
    explanations: RwLock<HashMap<String, Explanation>>,
    logs: RwLock<Vec<LogEntry>>,
}

impl StudyStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub async fn insert_session(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Attach or refresh the live transport handle.
    pub async fn set_socket(&self, session_id: &str, socket_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.into()))?;
        session.socket_id = Some(socket_id.to_string());
        Ok(())
    }

    pub async fn set_session_start(&self, session_id: &str, start_ms: i64) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.into()))?;
        session.start_time_ms = start_ms;
        Ok(())
    }

    /// Terminal: a completed session passes no further gate checks.
    pub async fn complete_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.into()))?;
        session.is_completed = true;
        Ok(())
    }

    /// Overwrite the single-slot pull-mode cache. Last writer wins.
    pub async fn cache_explanation(&self, session_id: &str, explanation: Explanation) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.into()))?;
        session.explanation_cache = Some(explanation);
        Ok(())
    }

    /// Resolve and clear the pull-mode cache.
    pub async fn take_cached_explanation(&self, session_id: &str) -> Result<Option<Explanation>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.into()))?;
        Ok(session.explanation_cache.take())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub async fn insert_task(&self, task: Task) {
        self.tasks.write().await.insert(task.task_id.clone(), task);
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// All tasks of a session, ordered by chain position.
    pub async fn tasks_for_session(&self, session_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.task_order);
        tasks
    }

    /// The task whose window contains `now` and which is not terminal.
    pub async fn current_task(&self, session_id: &str, now: i64) -> Option<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.session_id == session_id && t.is_current(now))
            .min_by_key(|t| t.task_order)
            .cloned()
    }

    pub async fn increment_interactions(&self, task_id: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.into()))?;
        task.interaction_times += 1;
        Ok(())
    }

    /// Guarded terminal transition: `isCompleted: false` is part of the
    /// write predicate, so a racing duplicate matches zero documents and
    /// returns `None`.
    pub async fn complete_task(&self, task_id: &str, now: i64) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.into()))?;
        if task.is_terminal() {
            return Ok(None);
        }
        task.is_completed = true;
        task.end_time_ms = now;
        task.completion_time_ms = Some(now);
        task.duration_ms = Some(now - task.start_time_ms);
        Ok(Some(task.clone()))
    }

    /// Guarded timeout transition; same predicate pattern as `complete_task`.
    pub async fn timeout_task(&self, task_id: &str, now: i64) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.into()))?;
        if task.is_terminal() {
            return Ok(None);
        }
        task.is_timed_out = true;
        task.duration_ms = Some(now - task.start_time_ms);
        Ok(Some(task.clone()))
    }

    /// Guarded abort transition; a double abort is a no-op.
    pub async fn abort_task(&self, task_id: &str, reason: &str, now: i64) -> Result<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.into()))?;
        if task.is_terminal() {
            return Ok(None);
        }
        task.is_aborted = true;
        task.aborted_reason = Some(reason.to_string());
        task.duration_ms = Some(now - task.start_time_ms);
        Ok(Some(task.clone()))
    }

    /// Rewrite one task's window. Applied atomically per task; used by the
    /// rescheduler when it walks the downstream chain.
    pub async fn set_task_window(&self, task_id: &str, start_ms: i64, end_ms: i64) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.into()))?;
        task.start_time_ms = start_ms;
        task.end_time_ms = end_ms;
        Ok(task.clone())
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    pub async fn upsert_device(&self, device: Device) {
        self.devices.write().await.insert(
            (device.session_id.clone(), device.device_id.clone()),
            device,
        );
    }

    pub async fn get_device(&self, session_id: &str, device_id: &str) -> Option<Device> {
        self.devices
            .read()
            .await
            .get(&(session_id.to_string(), device_id.to_string()))
            .cloned()
    }

    pub async fn devices_for_session(&self, session_id: &str) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .read()
            .await
            .values()
            .filter(|d| d.session_id == session_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    pub async fn set_device_property(
        &self,
        session_id: &str,
        device_id: &str,
        name: &str,
        value: Value,
    ) -> Result<Device> {
        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(&(session_id.to_string(), device_id.to_string()))
            .ok_or_else(|| StoreError::DeviceNotFound(session_id.into(), device_id.into()))?;
        device.set_property(name, value);
        Ok(device.clone())
    }

    // ------------------------------------------------------------------
    // Explanations
    // ------------------------------------------------------------------

    pub async fn insert_explanation(&self, explanation: Explanation) {
        self.explanations
            .write()
            .await
            .insert(explanation.explanation_id.clone(), explanation);
    }

    pub async fn get_explanation(&self, explanation_id: &str) -> Option<Explanation> {
        self.explanations.read().await.get(explanation_id).cloned()
    }

    pub async fn explanations_for_session(&self, session_id: &str) -> Vec<Explanation> {
        let mut all: Vec<Explanation> = self
            .explanations
            .read()
            .await
            .values()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        all.sort_by_key(|e| e.created_at_ms);
        all
    }

    /// Fill the rating slot of a delivered explanation. Ratings never affect
    /// delivery; an unknown id is reported, not an error.
    pub async fn rate_explanation(&self, explanation_id: &str, rating: i32) -> Result<()> {
        let mut explanations = self.explanations.write().await;
        let explanation = explanations
            .get_mut(explanation_id)
            .ok_or_else(|| StoreError::ExplanationNotFound(explanation_id.into()))?;
        explanation.rating = Some(rating);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event log
    // ------------------------------------------------------------------

    pub async fn append_log(&self, entry: LogEntry) {
        self.logs.write().await.push(entry);
    }

    /// Most recent `limit` entries for a session, oldest first.
    pub async fn recent_logs(&self, session_id: &str, limit: usize) -> Vec<LogEntry> {
        let logs = self.logs.read().await;
        let matching: Vec<LogEntry> = logs
            .iter()
            .filter(|l| l.session_id == session_id)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domus_core::{now_ms, LogKind, Property};

    fn task(id: &str, order: u32, start: i64, end: i64) -> Task {
        Task {
            task_id: id.into(),
            session_id: "s1".into(),
            task_order: order,
            start_time_ms: start,
            end_time_ms: end,
            interaction_times: 0,
            is_completed: false,
            is_timed_out: false,
            is_aborted: false,
            aborted_reason: None,
            duration_ms: None,
            completion_time_ms: None,
        }
    }

    #[tokio::test]
    async fn test_guarded_complete_is_idempotent() {
        let store = StudyStore::new();
        store.insert_task(task("t1", 1, 0, 10_000)).await;

        let first = store.complete_task("t1", 5_000).await.unwrap();
        assert!(first.is_some());
        let completed = first.unwrap();
        assert_eq!(completed.duration_ms, Some(5_000));
        assert_eq!(completed.completion_time_ms, Some(5_000));
        assert_eq!(completed.end_time_ms, 5_000);

        // Second transition loses the guard and is a no-op.
        let second = store.complete_task("t1", 6_000).await.unwrap();
        assert!(second.is_none());
        let stored = store.get_task("t1").await.unwrap();
        assert_eq!(stored.completion_time_ms, Some(5_000));
    }

    #[tokio::test]
    async fn test_timeout_after_complete_is_noop() {
        let store = StudyStore::new();
        store.insert_task(task("t1", 1, 0, 10_000)).await;
        store.complete_task("t1", 5_000).await.unwrap();

        let timed_out = store.timeout_task("t1", 11_000).await.unwrap();
        assert!(timed_out.is_none());
        let stored = store.get_task("t1").await.unwrap();
        assert!(stored.is_completed);
        assert!(!stored.is_timed_out);
    }

    #[tokio::test]
    async fn test_double_abort_is_noop() {
        let store = StudyStore::new();
        store.insert_task(task("t1", 1, 0, 10_000)).await;

        let first = store.abort_task("t1", "too hard", 3_000).await.unwrap();
        assert!(first.is_some());
        assert_eq!(
            first.unwrap().aborted_reason.as_deref(),
            Some("too hard")
        );
        let second = store.abort_task("t1", "changed my mind", 4_000).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_current_task_respects_window_and_state() {
        let store = StudyStore::new();
        store.insert_task(task("t1", 1, 0, 10_000)).await;
        store.insert_task(task("t2", 2, 10_000, 20_000)).await;

        let current = store.current_task("s1", 5_000).await.unwrap();
        assert_eq!(current.task_id, "t1");

        store.complete_task("t1", 5_000).await.unwrap();
        let current = store.current_task("s1", 12_000).await.unwrap();
        assert_eq!(current.task_id, "t2");

        assert!(store.current_task("s1", 50_000).await.is_none());
    }

    #[tokio::test]
    async fn test_device_property_write() {
        let store = StudyStore::new();
        store
            .upsert_device(Device {
                device_id: "fan-1".into(),
                session_id: "s1".into(),
                properties: vec![Property {
                    name: "speed".into(),
                    value: Value::Int(0),
                }],
            })
            .await;

        let updated = store
            .set_device_property("s1", "fan-1", "speed", Value::Int(3))
            .await
            .unwrap();
        assert_eq!(updated.properties[0].value, Value::Int(3));

        let missing = store
            .set_device_property("s1", "ghost", "speed", Value::Int(1))
            .await;
        assert!(matches!(missing, Err(StoreError::DeviceNotFound(_, _))));
    }

    #[tokio::test]
    async fn test_recent_logs_returns_tail_in_order() {
        let store = StudyStore::new();
        for i in 0..5 {
            store
                .append_log(LogEntry::new(
                    "s1",
                    None,
                    LogKind::Game,
                    &format!("event {}", i),
                ))
                .await;
        }
        store
            .append_log(LogEntry::new("other", None, LogKind::Game, "noise"))
            .await;

        let logs = store.recent_logs("s1", 3).await;
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "event 2");
        assert_eq!(logs[2].message, "event 4");
    }

    #[tokio::test]
    async fn test_explanation_cache_single_slot() {
        let store = StudyStore::new();
        store
            .insert_session(Session {
                session_id: "s1".into(),
                socket_id: None,
                start_time_ms: now_ms(),
                custom_data: Default::default(),
                explanation_cache: None,
                is_completed: false,
            })
            .await;

        let first = Explanation::new("first", "s1", None, 0);
        let second = Explanation::new("second", "s1", None, 0);
        store.cache_explanation("s1", first).await.unwrap();
        store.cache_explanation("s1", second).await.unwrap();

        let taken = store.take_cached_explanation("s1").await.unwrap().unwrap();
        assert_eq!(taken.explanation, "second");
        assert!(store.take_cached_explanation("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rate_explanation() {
        let store = StudyStore::new();
        let expl = Explanation::new("because", "s1", None, 0);
        let id = expl.explanation_id.clone();
        store.insert_explanation(expl).await;

        store.rate_explanation(&id, 4).await.unwrap();
        assert_eq!(store.get_explanation(&id).await.unwrap().rating, Some(4));

        let unknown = store.rate_explanation("nope", 1).await;
        assert!(matches!(unknown, Err(StoreError::ExplanationNotFound(_))));
    }
}
