//! Event Logger
//!
//! Appends every game/device/rule/task event to the log store, then forwards
//! it to the active reasoning adapter enriched with a metadata snapshot:
//! session id, current task, in-game clock, context variables, all device
//! states and recent history. A request/response adapter may answer with an
//! explanation; under the external engine that answer enters the delivery
//! router like any other candidate.

use anyhow::Result;

use domus_adapter::ContextSnapshot;
use domus_core::{game_time, now_ms, EngineKind, LogEntry};

use crate::handler::Orchestrator;

/// How much history rides along with each forwarded event.
const SNAPSHOT_LOG_LIMIT: usize = 50;

impl Orchestrator {
    /// Append one entry and forward it with full context. Adapter failures
    /// degrade to "no explanation"; they never fail the handler.
    pub(crate) async fn log_and_forward(&self, entry: LogEntry) -> Result<()> {
        self.store.append_log(entry.clone()).await;

        let Some(session) = self.store.get_session(&entry.session_id).await else {
            return Ok(());
        };
        let now = now_ms();
        let task = self.store.current_task(&session.session_id, now).await;
        let task_name = task.as_ref().and_then(|t| {
            self.config
                .task_spec(t.task_order)
                .map(|spec| spec.name.clone())
        });
        let clock = game_time(
            session.start_time_ms,
            now,
            self.config.clock.speed,
            self.config.clock.start_hour,
            self.config.clock.start_minute,
        );
        let devices = self.store.devices_for_session(&session.session_id).await;
        let logs = self
            .store
            .recent_logs(&session.session_id, SNAPSHOT_LOG_LIMIT)
            .await;

        let snapshot =
            ContextSnapshot::new(&session, task_name.as_deref(), clock, devices, &logs);

        match self.adapter.log_event(snapshot).await {
            Ok(Some(text)) if self.config.explanation.engine == EngineKind::External => {
                self.deliver_external(&session.session_id, &text).await
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("Reasoning adapter unavailable for log forward: {}", e);
                Ok(())
            }
        }
    }
}
