//! Study Data Model
//!
//! Documents held in the store: participant sessions, timed tasks, simulated
//! devices, explanations and the append-only event log. Fields mirror what
//! the front-end simulator exchanges over the wire, so everything is serde.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Scalar value carried by device properties, rule literals and session
/// context variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view for cross-type Int/Float comparison.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One participant session. Created once per participant; the socket id is
/// refreshed whenever the live transport reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    /// Identity of the currently attached transport, if any.
    pub socket_id: Option<String>,
    /// Unix millis the participant pressed "start".
    pub start_time_ms: i64,
    /// Injected context variables (e.g. Condition, Technical_Interest,
    /// User_Name) consumed by Context rule clauses and the metadata snapshot.
    #[serde(default)]
    pub custom_data: BTreeMap<String, Value>,
    /// Single-slot cache for pull-mode explanations. Last writer wins.
    #[serde(default)]
    pub explanation_cache: Option<Explanation>,
    /// Terminal; a completed session passes no further gate checks.
    #[serde(default)]
    pub is_completed: bool,
}

// ============================================================================
// Task
// ============================================================================

/// One timed study task. Exactly one task per session is "current" at any
/// instant: the one whose window contains now and which is not terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub session_id: String,
    /// Position in the session's task chain; windows are contiguous and
    /// monotonically increasing in this order once scheduling has converged.
    pub task_order: u32,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    /// Number of device interactions attributed to this task.
    #[serde(default)]
    pub interaction_times: u32,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_timed_out: bool,
    #[serde(default)]
    pub is_aborted: bool,
    #[serde(default)]
    pub aborted_reason: Option<String>,
    /// Set once, on the terminal transition.
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub completion_time_ms: Option<i64>,
}

impl Task {
    /// A task in any terminal state is closed; transitions on it are no-ops.
    pub fn is_terminal(&self) -> bool {
        self.is_completed || self.is_timed_out || self.is_aborted
    }

    /// Whether this task's window contains `now` and it is still open.
    pub fn is_current(&self, now: i64) -> bool {
        !self.is_terminal() && self.start_time_ms <= now && now <= self.end_time_ms
    }
}

// ============================================================================
// Device
// ============================================================================

/// A named device property and its current value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

/// One simulated device with its current property values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub session_id: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

/// Tri-state result of a `(device, property)` lookup. A Missing property is
/// a distinct outcome from "present but comparison false".
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyLookup {
    Found(Value),
    /// Property exists but carries no usable value.
    FoundNull,
    Missing,
}

impl Device {
    pub fn lookup(&self, name: &str) -> PropertyLookup {
        match self.properties.iter().find(|p| p.name == name) {
            Some(Property {
                value: Value::Null, ..
            }) => PropertyLookup::FoundNull,
            Some(p) => PropertyLookup::Found(p.value.clone()),
            None => PropertyLookup::Missing,
        }
    }

    /// Overwrite the named property, appending it if absent.
    pub fn set_property(&mut self, name: &str, value: Value) {
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = value,
            None => self.properties.push(Property {
                name: name.to_string(),
                value,
            }),
        }
    }
}

// ============================================================================
// Explanation
// ============================================================================

/// One generated explanation. Exists independently of its delivery: the same
/// record may be cached, later delivered, then separately rated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub explanation_id: String,
    pub explanation: String,
    pub created_at_ms: i64,
    pub session_id: String,
    pub task_id: Option<String>,
    #[serde(default)]
    pub delay_secs: u64,
    #[serde(default)]
    pub rating: Option<i32>,
}

impl Explanation {
    pub fn new(text: &str, session_id: &str, task_id: Option<&str>, delay_secs: u64) -> Self {
        Self {
            explanation_id: Uuid::new_v4().to_string(),
            explanation: text.to_string(),
            created_at_ms: now_ms(),
            session_id: session_id.to_string(),
            task_id: task_id.map(|t| t.to_string()),
            delay_secs,
            rating: None,
        }
    }
}

// ============================================================================
// Event log
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogKind {
    Game,
    Device,
    Rule,
    Task,
}

/// Append-only record of a game/device/rule/task event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub session_id: String,
    pub task_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: LogKind,
    /// Set for RULE entries: the rule that fired.
    #[serde(default)]
    pub rule_id: Option<String>,
    pub message: String,
    /// Structured detail, e.g. the concrete property changes a rule produced.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp_ms: i64,
}

impl LogEntry {
    pub fn new(session_id: &str, task_id: Option<&str>, kind: LogKind, message: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            task_id: task_id.map(|t| t.to_string()),
            kind,
            rule_id: None,
            message: message.to_string(),
            payload: serde_json::Value::Null,
            timestamp_ms: now_ms(),
        }
    }

    pub fn with_rule(mut self, rule_id: &str) -> Self {
        self.rule_id = Some(rule_id.to_string());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_untagged_parse() {
        let v: Value = serde_json::from_str("true").unwrap();
        assert_eq!(v, Value::Bool(true));
        let v: Value = serde_json::from_str("3").unwrap();
        assert_eq!(v, Value::Int(3));
        let v: Value = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, Value::Float(2.5));
        let v: Value = serde_json::from_str("\"on\"").unwrap();
        assert_eq!(v, Value::Text("on".into()));
    }

    #[test]
    fn test_device_lookup_tristate() {
        let dev = Device {
            device_id: "light-1".into(),
            session_id: "s1".into(),
            properties: vec![Property {
                name: "power".into(),
                value: Value::Bool(true),
            }],
        };
        assert_eq!(dev.lookup("power"), PropertyLookup::Found(Value::Bool(true)));
        assert_eq!(dev.lookup("speed"), PropertyLookup::Missing);
    }

    #[test]
    fn test_device_lookup_null_is_distinct() {
        let dev = Device {
            device_id: "sensor-1".into(),
            session_id: "s1".into(),
            properties: vec![Property {
                name: "reading".into(),
                value: Value::Null,
            }],
        };
        assert_eq!(dev.lookup("reading"), PropertyLookup::FoundNull);
    }

    #[test]
    fn test_set_property_overwrites_or_appends() {
        let mut dev = Device {
            device_id: "fan-1".into(),
            session_id: "s1".into(),
            properties: vec![],
        };
        dev.set_property("speed", Value::Int(1));
        dev.set_property("speed", Value::Int(3));
        assert_eq!(dev.properties.len(), 1);
        assert_eq!(dev.lookup("speed"), PropertyLookup::Found(Value::Int(3)));
    }

    #[test]
    fn test_task_current_window() {
        let task = Task {
            task_id: "t1".into(),
            session_id: "s1".into(),
            task_order: 1,
            start_time_ms: 1000,
            end_time_ms: 2000,
            interaction_times: 0,
            is_completed: false,
            is_timed_out: false,
            is_aborted: false,
            aborted_reason: None,
            duration_ms: None,
            completion_time_ms: None,
        };
        assert!(task.is_current(1500));
        assert!(!task.is_current(2500));
        let mut done = task.clone();
        done.is_completed = true;
        assert!(!done.is_current(1500));
    }

    #[test]
    fn test_log_kind_serializes_uppercase() {
        let entry = LogEntry::new("s1", None, LogKind::Rule, "fired").with_rule("kitchen_rule");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "RULE");
        assert_eq!(json["rule_id"], "kitchen_rule");
    }
}
