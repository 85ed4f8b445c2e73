//! Session Provisioning
//!
//! Seeds the documents a participant session needs before the orchestration
//! core runs: the session itself (with injected context variables), one
//! device per configured spec at its default property values, and the full
//! task chain with contiguous windows. The core only mutates lifecycle
//! fields and downstream windows after this point.

use uuid::Uuid;

use domus_core::{now_ms, Device, DomusConfig, Session, Task};

use crate::store::StudyStore;

/// Create session, devices and the seeded task chain starting at `now`.
pub async fn provision_session(store: &StudyStore, config: &DomusConfig, session_id: &str) -> Session {
    let now = now_ms();
    let session = Session {
        session_id: session_id.to_string(),
        socket_id: None,
        start_time_ms: now,
        custom_data: config.study.context.clone(),
        explanation_cache: None,
        is_completed: false,
    };
    store.insert_session(session.clone()).await;

    for spec in &config.study.devices {
        store
            .upsert_device(Device {
                device_id: spec.device_id.clone(),
                session_id: session_id.to_string(),
                properties: spec.defaults.clone(),
            })
            .await;
    }

    seed_task_chain(store, config, session_id, now).await;
    session
}

/// (Re)write the session's task chain as contiguous windows starting at
/// `origin_ms`. Windows of tasks that already exist are rebased in place;
/// missing tasks are created. Terminal tasks keep their recorded outcome.
pub async fn seed_task_chain(
    store: &StudyStore,
    config: &DomusConfig,
    session_id: &str,
    origin_ms: i64,
) {
    let existing = store.tasks_for_session(session_id).await;
    let mut cursor = origin_ms;

    let mut specs: Vec<_> = config.study.tasks.iter().collect();
    specs.sort_by_key(|s| s.order);

    for spec in specs {
        let duration = config.task_duration_ms(Some(spec));
        let end = cursor + duration;

        match existing.iter().find(|t| t.task_order == spec.order) {
            Some(task) if !task.is_terminal() => {
                if let Err(e) = store.set_task_window(&task.task_id, cursor, end).await {
                    tracing::warn!("Failed to rebase task window: {}", e);
                }
            }
            Some(_) => {
                // Already ended; leave its record untouched but keep its
                // slot in the chain so downstream windows stay contiguous.
            }
            None => {
                store
                    .insert_task(Task {
                        task_id: Uuid::new_v4().to_string(),
                        session_id: session_id.to_string(),
                        task_order: spec.order,
                        start_time_ms: cursor,
                        end_time_ms: end,
                        interaction_times: 0,
                        is_completed: false,
                        is_timed_out: false,
                        is_aborted: false,
                        aborted_reason: None,
                        duration_ms: None,
                        completion_time_ms: None,
                    })
                    .await;
            }
        }
        cursor = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domus_core::Value;

    fn config() -> DomusConfig {
        toml::from_str(
            r#"
[study]
default_task_secs = 100

[[study.tasks]]
name = "first"
order = 1
timer_secs = 60

[[study.tasks]]
name = "second"
order = 2

[[study.devices]]
device_id = "light-1"
defaults = [{ name = "power", value = false }]

[study.context]
User_Name = "Alice"
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_provision_creates_contiguous_chain() {
        let store = StudyStore::new();
        let session = provision_session(&store, &config(), "s1").await;
        assert_eq!(
            session.custom_data.get("User_Name"),
            Some(&Value::Text("Alice".into()))
        );

        let tasks = store.tasks_for_session("s1").await;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].end_time_ms - tasks[0].start_time_ms, 60_000);
        assert_eq!(tasks[1].end_time_ms - tasks[1].start_time_ms, 100_000);
        assert_eq!(tasks[0].end_time_ms, tasks[1].start_time_ms);

        let devices = store.devices_for_session("s1").await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].properties[0].value, Value::Bool(false));
    }

    #[tokio::test]
    async fn test_seed_rebases_open_tasks_only() {
        let store = StudyStore::new();
        let cfg = config();
        provision_session(&store, &cfg, "s1").await;

        let tasks = store.tasks_for_session("s1").await;
        store.complete_task(&tasks[0].task_id, 500).await.unwrap();

        seed_task_chain(&store, &cfg, "s1", 1_000_000).await;

        let tasks = store.tasks_for_session("s1").await;
        // Terminal task untouched, open task rebased after the full chain
        // origin (first slot still reserves the completed task's duration).
        assert!(tasks[0].is_completed);
        assert_eq!(tasks[1].start_time_ms, 1_000_000 + 60_000);
        assert_eq!(tasks[1].end_time_ms, 1_000_000 + 60_000 + 100_000);
    }
}
