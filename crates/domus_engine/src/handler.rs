//! Inbound Event Handler
//!
//! One `Orchestrator` per process, shared across socket handlers and timers.
//! Every inbound event runs the same shape: Session Gate, then the handler
//! for its kind. Validation failures (missing session, no current task) end
//! the handler quietly; persistence failures propagate.

use std::sync::Arc;

use anyhow::Result;

use domus_adapter::ReasoningAdapter;
use domus_core::{
    now_ms, ClientNotifier, DomusConfig, InboundEvent, LogEntry, LogKind, OutboundEvent,
};
use domus_store::StudyStore;

use crate::rules::evaluate_rules;

/// The orchestration core: rule engine, scheduler, task lifecycle and
/// explanation router behind one entry point.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) store: Arc<StudyStore>,
    pub(crate) config: Arc<DomusConfig>,
    pub(crate) notifier: Arc<dyn ClientNotifier>,
    pub(crate) adapter: Arc<dyn ReasoningAdapter>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StudyStore>,
        config: Arc<DomusConfig>,
        notifier: Arc<dyn ClientNotifier>,
        adapter: Arc<dyn ReasoningAdapter>,
    ) -> Self {
        Self {
            store,
            config,
            notifier,
            adapter,
        }
    }

    pub fn store(&self) -> &Arc<StudyStore> {
        &self.store
    }

    /// Handle one inbound event arriving on the transport `socket_id`.
    pub async fn handle(&self, event: InboundEvent, socket_id: &str) -> Result<()> {
        let Some(session) = self.gate(event.session_id(), socket_id).await? else {
            return Ok(());
        };

        match event {
            InboundEvent::DeviceInteraction {
                device_id,
                name,
                value,
                ..
            } => self.on_device_interaction(session, &device_id, &name, value).await,
            InboundEvent::GameInteraction { message, payload, .. } => {
                let now = now_ms();
                let task = self.store.current_task(&session.session_id, now).await;
                let entry = LogEntry::new(
                    &session.session_id,
                    task.as_ref().map(|t| t.task_id.as_str()),
                    LogKind::Game,
                    &message,
                )
                .with_payload(payload);
                self.log_and_forward(entry).await
            }
            InboundEvent::TaskTimeout { task_id, .. } => {
                self.on_task_timeout(session, &task_id).await
            }
            InboundEvent::TaskAbort { task_id, reason, .. } => {
                self.on_task_abort(session, &task_id, &reason).await
            }
            InboundEvent::ExplanationRequest { .. } => {
                self.on_explanation_request(session).await
            }
            InboundEvent::ExplanationRating {
                explanation_id,
                rating,
                ..
            } => self.on_explanation_rating(session, &explanation_id, rating).await,
            InboundEvent::ExplanationChat { message, .. } => {
                self.on_explanation_chat(session, &message).await
            }
            InboundEvent::GameStart { .. } => self.on_game_start(session).await,
        }
    }

    /// The main path: device write → rule evaluation → scheduling →
    /// goal check → lifecycle.
    async fn on_device_interaction(
        &self,
        session: domus_core::Session,
        device_id: &str,
        name: &str,
        value: domus_core::Value,
    ) -> Result<()> {
        let now = now_ms();
        let Some(task) = self.store.current_task(&session.session_id, now).await else {
            tracing::debug!(session = %session.session_id, "Device interaction outside any task window");
            return Ok(());
        };
        self.store.increment_interactions(&task.task_id).await?;

        // Persist the participant's own write and echo it back.
        let device = self
            .store
            .set_device_property(&session.session_id, device_id, name, value.clone())
            .await?;
        self.notifier.notify(
            &session.session_id,
            &OutboundEvent::DeviceUpdate {
                session_id: session.session_id.clone(),
                update: domus_core::events::PropertyUpdate {
                    device_id: device.device_id.clone(),
                    property: domus_core::Property {
                        name: name.to_string(),
                        value: value.clone(),
                    },
                },
            },
        );

        let entry = LogEntry::new(
            &session.session_id,
            Some(&task.task_id),
            LogKind::Device,
            &format!("{} {} = {}", device_id, name, value),
        )
        .with_payload(serde_json::json!({
            "deviceId": device_id,
            "name": name,
            "value": value,
        }));
        self.log_and_forward(entry).await?;

        // Rules run against the snapshot as of this interaction.
        let devices = self.store.devices_for_session(&session.session_id).await;
        let outcome = evaluate_rules(
            &session,
            Some(&task),
            &devices,
            &self.config.study.rules,
            &self.config,
        );
        for fired in &outcome.fired {
            let entry = LogEntry::new(
                &session.session_id,
                Some(&task.task_id),
                LogKind::Rule,
                &format!("rule {} fired", fired.rule_id),
            )
            .with_rule(&fired.rule_id)
            .with_payload(serde_json::to_value(&fired.changes)?);
            self.log_and_forward(entry).await?;
        }
        self.dispatch_effects(&session.session_id, outcome).await?;

        // Goal check against the fresh snapshot, synchronous effects included.
        self.check_task_goal(&session, &task).await
    }

    async fn on_game_start(&self, session: domus_core::Session) -> Result<()> {
        let now = now_ms();
        self.store.set_session_start(&session.session_id, now).await?;
        domus_store::provision::seed_task_chain(
            &self.store,
            &self.config,
            &session.session_id,
            now,
        )
        .await;

        let entry = LogEntry::new(&session.session_id, None, LogKind::Game, "game started");
        self.log_and_forward(entry).await?;

        let tasks = self.store.tasks_for_session(&session.session_id).await;
        self.notifier.notify(
            &session.session_id,
            &OutboundEvent::GameUpdate {
                session_id: session.session_id.clone(),
                tasks,
                updates: vec![],
                message: "Game started".to_string(),
            },
        );
        Ok(())
    }
}
