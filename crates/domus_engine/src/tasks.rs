//! Task Lifecycle State Machine
//!
//! Scheduled → Active → {Completed | TimedOut | Aborted}. "Active" is
//! read-derived from the task window, never stored. Every terminal
//! transition is a guarded store write; a write that matches zero documents
//! means someone else already transitioned this task, and the handler exits
//! quietly with no second reschedule and no duplicate log.

use anyhow::Result;

use domus_core::{game_time, now_ms, preconditions_hold, LogEntry, LogKind, OutboundEvent, Session, Task};

use crate::handler::Orchestrator;

impl Orchestrator {
    /// AND-reduce the current task's goal list against the fresh device
    /// snapshot. An empty goal list is never met.
    pub(crate) async fn check_task_goal(&self, session: &Session, task: &Task) -> Result<()> {
        let Some(spec) = self.config.task_spec(task.task_order) else {
            tracing::debug!(order = task.task_order, "No task spec for goal check");
            return Ok(());
        };
        if spec.goal.is_empty() {
            return Ok(());
        }

        let devices = self.store.devices_for_session(&session.session_id).await;
        let clock = game_time(
            session.start_time_ms,
            now_ms(),
            self.config.clock.speed,
            self.config.clock.start_hour,
            self.config.clock.start_minute,
        );
        if !preconditions_hold(&spec.goal, session, &devices, clock) {
            return Ok(());
        }

        let now = now_ms();
        let Some(completed) = self.store.complete_task(&task.task_id, now).await? else {
            tracing::debug!(task = %task.task_id, "Lost completion race, nothing to do");
            return Ok(());
        };

        let entry = LogEntry::new(
            &session.session_id,
            Some(&completed.task_id),
            LogKind::Task,
            &format!("task {} completed", spec.name),
        )
        .with_payload(serde_json::json!({
            "durationMs": completed.duration_ms,
            "interactionTimes": completed.interaction_times,
        }));
        self.log_and_forward(entry).await?;

        self.finish_task(session, &completed, "Task completed").await
    }

    /// External timer signal claiming the window has elapsed. Re-validated
    /// server-side so a late client timeout cannot fire after an independent
    /// completion or before the window genuinely ends.
    pub(crate) async fn on_task_timeout(&self, session: Session, task_id: &str) -> Result<()> {
        let Some(task) = self.store.get_task(task_id).await else {
            tracing::debug!(task = %task_id, "Timeout signal for unknown task");
            return Ok(());
        };
        if task.session_id != session.session_id {
            tracing::debug!(task = %task_id, "Timeout signal from foreign session");
            return Ok(());
        }

        // Server-authoritative: a client timer firing even milliseconds
        // before the window end does not count as elapsed.
        let now = now_ms();
        if now < task.end_time_ms {
            tracing::debug!(task = %task_id, "Premature timeout signal rejected");
            return Ok(());
        }

        let Some(timed_out) = self.store.timeout_task(task_id, now).await? else {
            tracing::debug!(task = %task_id, "Lost timeout race, nothing to do");
            return Ok(());
        };

        let entry = LogEntry::new(
            &session.session_id,
            Some(&timed_out.task_id),
            LogKind::Task,
            "task timed out",
        );
        self.log_and_forward(entry).await?;

        self.finish_task(&session, &timed_out, "Task timed out").await
    }

    /// Client-initiated abort with a reason code. Double abort is a no-op.
    pub(crate) async fn on_task_abort(
        &self,
        session: Session,
        task_id: &str,
        reason: &str,
    ) -> Result<()> {
        let Some(task) = self.store.get_task(task_id).await else {
            tracing::debug!(task = %task_id, "Abort signal for unknown task");
            return Ok(());
        };
        if task.session_id != session.session_id {
            tracing::debug!(task = %task_id, "Abort signal from foreign session");
            return Ok(());
        }

        let now = now_ms();
        let Some(aborted) = self.store.abort_task(task_id, reason, now).await? else {
            tracing::debug!(task = %task_id, "Lost abort race, nothing to do");
            return Ok(());
        };

        let entry = LogEntry::new(
            &session.session_id,
            Some(&aborted.task_id),
            LogKind::Task,
            &format!("task aborted: {}", reason),
        );
        self.log_and_forward(entry).await?;

        self.finish_task(&session, &aborted, "Task aborted").await
    }

    /// Shared tail of every terminal transition: reschedule the remainder
    /// of the chain, announce it, and close the session when the chain is
    /// exhausted.
    async fn finish_task(&self, session: &Session, ended: &Task, message: &str) -> Result<()> {
        let result = self.reschedule(session, ended.task_order).await?;

        if let Some(next) = &result.next_task {
            let spec_name = self
                .config
                .task_spec(next.task_order)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| format!("task #{}", next.task_order));
            let entry = LogEntry::new(
                &session.session_id,
                Some(&next.task_id),
                LogKind::Task,
                &format!("task {} begins", spec_name),
            );
            self.log_and_forward(entry).await?;
        } else {
            self.store.complete_session(&session.session_id).await?;
            let entry = LogEntry::new(&session.session_id, None, LogKind::Game, "session completed");
            self.log_and_forward(entry).await?;
        }

        let mut tasks = vec![ended.clone()];
        tasks.extend(result.rescheduled.iter().cloned());
        self.notifier.notify(
            &session.session_id,
            &OutboundEvent::GameUpdate {
                session_id: session.session_id.clone(),
                tasks,
                updates: result.resets,
                message: message.to_string(),
            },
        );
        Ok(())
    }
}
