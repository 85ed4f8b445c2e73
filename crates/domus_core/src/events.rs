//! Wire Events and the Client Notifier Capability
//!
//! Inbound events arrive over the gateway's WebSocket as JSON tagged with an
//! `event` field; every one carries the session id the Session Gate
//! validates. Outbound notifications go back through a `ClientNotifier`, an
//! injected lookup over the live-socket registry so the engine never touches
//! a global and tests can record deliveries.

use serde::{Deserialize, Serialize};

use crate::model::{Property, Task, Value};

/// Inbound session-scoped event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Participant toggled a device property in the simulator.
    DeviceInteraction {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "deviceId")]
        device_id: String,
        name: String,
        value: Value,
    },
    /// Free-form telemetry from the front-end.
    GameInteraction {
        #[serde(rename = "sessionId")]
        session_id: String,
        message: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// External timer signal claiming the named task's window has elapsed.
    TaskTimeout {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "taskId")]
        task_id: String,
    },
    /// Participant gave up on the current task.
    TaskAbort {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "taskId")]
        task_id: String,
        reason: String,
    },
    /// Pull-mode request for the cached (or freshly generated) explanation.
    ExplanationRequest {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Rate a previously delivered explanation.
    ExplanationRating {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "explanationId")]
        explanation_id: String,
        rating: i32,
    },
    /// Interactive-mode free-form follow-up to the reasoning engine.
    ExplanationChat {
        #[serde(rename = "sessionId")]
        session_id: String,
        message: String,
    },
    /// Participant pressed "start": stamps the session clock and rebases the
    /// seeded task chain.
    GameStart {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl InboundEvent {
    pub fn session_id(&self) -> &str {
        match self {
            InboundEvent::DeviceInteraction { session_id, .. }
            | InboundEvent::GameInteraction { session_id, .. }
            | InboundEvent::TaskTimeout { session_id, .. }
            | InboundEvent::TaskAbort { session_id, .. }
            | InboundEvent::ExplanationRequest { session_id }
            | InboundEvent::ExplanationRating { session_id, .. }
            | InboundEvent::ExplanationChat { session_id, .. }
            | InboundEvent::GameStart { session_id } => session_id,
        }
    }
}

/// A single applied device-property change, as reported to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyUpdate {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(flatten)]
    pub property: Property,
}

/// Outbound notification to a session's live transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// One device property changed.
    DeviceUpdate {
        #[serde(rename = "sessionId")]
        session_id: String,
        update: PropertyUpdate,
    },
    /// Aggregated task/goal progress: updated tasks, reset properties and a
    /// human-readable message.
    GameUpdate {
        #[serde(rename = "sessionId")]
        session_id: String,
        tasks: Vec<Task>,
        updates: Vec<PropertyUpdate>,
        message: String,
    },
    /// An explanation reaches the participant.
    Explanation {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "explanationId")]
        explanation_id: String,
        explanation: String,
        /// Present when a rating scheme is configured; the client renders a
        /// rating widget scaled to this many steps.
        #[serde(skip_serializing_if = "Option::is_none")]
        rating_scale: Option<u8>,
    },
}

/// Injected lookup over the live-socket registry.
///
/// `notify` returns whether a live transport was attached and accepted the
/// message; a `false` is not an error, push-mode deliveries simply drop.
pub trait ClientNotifier: Send + Sync {
    fn notify(&self, session_id: &str, event: &OutboundEvent) -> bool;
}
