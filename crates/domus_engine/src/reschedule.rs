//! Rescheduler
//!
//! When the active task ends, the rest of the chain is rebased onto "now":
//! each downstream task keeps its configured duration (or the study-wide
//! default) and starts exactly where its predecessor ends. Before walking
//! the chain, any lower-order task that is somehow still open past its
//! window is repaired to TimedOut. The first downstream task gets its
//! devices reset to their configured defaults so the participant starts it
//! from a known state.

use anyhow::Result;

use domus_core::events::PropertyUpdate;
use domus_core::{now_ms, LogEntry, LogKind, Property, Session, Task};

use crate::handler::Orchestrator;

/// What a reschedule changed: the rebased downstream tasks, the next task
/// to begin (if any), and the device resets applied for it.
#[derive(Debug, Clone, Default)]
pub struct RescheduleResult {
    pub rescheduled: Vec<Task>,
    pub next_task: Option<Task>,
    pub resets: Vec<PropertyUpdate>,
}

impl Orchestrator {
    /// Recompute the windows of every task ordered after `ended_order`.
    pub(crate) async fn reschedule(
        &self,
        session: &Session,
        ended_order: u32,
    ) -> Result<RescheduleResult> {
        let now = now_ms();
        let tasks = self.store.tasks_for_session(&session.session_id).await;

        // Consistency repair: an out-of-order completion can leave an
        // earlier task open past its window. Close it retroactively.
        for task in tasks.iter().filter(|t| t.task_order < ended_order) {
            if !t_is_open_and_elapsed(task, now) {
                continue;
            }
            if self.store.timeout_task(&task.task_id, now).await?.is_some() {
                tracing::warn!(task = %task.task_id, "Repaired stale open task to timed out");
                let entry = LogEntry::new(
                    &session.session_id,
                    Some(&task.task_id),
                    LogKind::Task,
                    "task timed out (retroactive repair)",
                );
                self.log_and_forward(entry).await?;
            }
        }

        let mut result = RescheduleResult::default();
        let mut cursor = now;

        for task in tasks.iter().filter(|t| t.task_order > ended_order) {
            if task.is_terminal() {
                continue;
            }
            let duration = self
                .config
                .task_duration_ms(self.config.task_spec(task.task_order));
            let rebased = self
                .store
                .set_task_window(&task.task_id, cursor, cursor + duration)
                .await?;
            cursor += duration;

            if result.next_task.is_none() {
                result.next_task = Some(rebased.clone());
            }
            result.rescheduled.push(rebased);
        }

        if let Some(next) = result.next_task.clone() {
            result.resets = self.reset_devices_for(session, &next).await?;
        }

        Ok(result)
    }

    /// Reset the session's devices to their configured defaults: read each
    /// current document, overwrite matching property names, persist. Returns
    /// the applied changes so the caller can sync the client immediately.
    async fn reset_devices_for(
        &self,
        session: &Session,
        _next: &Task,
    ) -> Result<Vec<PropertyUpdate>> {
        let mut resets = Vec::new();

        for spec in &self.config.study.devices {
            let Some(mut device) = self
                .store
                .get_device(&session.session_id, &spec.device_id)
                .await
            else {
                tracing::debug!(device = %spec.device_id, "No device doc to reset");
                continue;
            };

            for default in &spec.defaults {
                let already = device
                    .properties
                    .iter()
                    .any(|p| p.name == default.name && p.value == default.value);
                if already {
                    continue;
                }
                device.set_property(&default.name, default.value.clone());
                resets.push(PropertyUpdate {
                    device_id: spec.device_id.clone(),
                    property: Property {
                        name: default.name.clone(),
                        value: default.value.clone(),
                    },
                });
            }
            self.store.upsert_device(device).await;
        }

        Ok(resets)
    }
}

fn t_is_open_and_elapsed(task: &Task, now: i64) -> bool {
    !task.is_terminal() && task.end_time_ms <= now
}
