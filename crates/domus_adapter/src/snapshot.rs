//! Metadata snapshot handed to the reasoning service with every forwarded
//! event: enough context (task, clock, environment, devices, recent history)
//! for it to author a situated explanation.

use serde::Serialize;

use domus_core::{Device, GameTime, LogEntry, Session, Value};

/// One injected context variable, in the `{name, value}` shape the external
/// service expects in its `environment` list.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentItem {
    pub name: String,
    pub value: Value,
}

/// A log entry with internal bookkeeping stripped: the reasoning service
/// sees what happened, not our storage keys.
#[derive(Debug, Clone, Serialize)]
pub struct LogView {
    #[serde(rename = "type")]
    pub kind: domus_core::LogKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub message: String,
    pub timestamp_ms: i64,
}

impl From<&LogEntry> for LogView {
    fn from(entry: &LogEntry) -> Self {
        Self {
            kind: entry.kind,
            rule_id: entry.rule_id.clone(),
            message: entry.message.clone(),
            timestamp_ms: entry.timestamp_ms,
        }
    }
}

/// The full enrichment context forwarded alongside a logged event.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    /// Session id, under the name the external service keys its store by.
    pub user_id: String,
    pub current_task: Option<String>,
    pub game_time: GameTime,
    pub environment: Vec<EnvironmentItem>,
    pub devices: Vec<Device>,
    pub logs: Vec<LogView>,
}

impl ContextSnapshot {
    pub fn new(
        session: &Session,
        current_task: Option<&str>,
        game_time: GameTime,
        devices: Vec<Device>,
        logs: &[LogEntry],
    ) -> Self {
        Self {
            user_id: session.session_id.clone(),
            current_task: current_task.map(|t| t.to_string()),
            game_time,
            environment: session
                .custom_data
                .iter()
                .map(|(name, value)| EnvironmentItem {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            devices,
            logs: logs.iter().map(LogView::from).collect(),
        }
    }
}
