//! Process-wide study configuration, loaded once from TOML with env-var
//! overrides. Read-only for the lifetime of a server process.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::model::{Property, Value};
use crate::rules::{Condition, Rule};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomusConfig {
    pub explanation: ExplanationConfig,
    pub clock: ClockConfig,
    pub study: StudyConfig,
    pub gateway: GatewayConfig,
}

impl DomusConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields, then apply env var overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: DomusConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, fall back
    /// to defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DOMUS_ENGINE") {
            if let Ok(kind) = toml::Value::String(v).try_into() {
                self.explanation.engine = kind;
            }
        }
        if let Ok(v) = std::env::var("DOMUS_TRIGGER") {
            if let Ok(mode) = toml::Value::String(v).try_into() {
                self.explanation.trigger = mode;
            }
        }
        if let Ok(v) = std::env::var("DOMUS_ADAPTER") {
            if let Ok(kind) = toml::Value::String(v).try_into() {
                self.explanation.adapter = kind;
            }
        }
        if let Ok(v) = std::env::var("DOMUS_ENDPOINT") {
            self.explanation.endpoint = v;
        }
        if let Ok(v) = std::env::var("DOMUS_PORT") {
            if let Ok(n) = v.parse() {
                self.gateway.port = n;
            }
        }
    }

    /// Look up the spec of a task by its chain position.
    pub fn task_spec(&self, order: u32) -> Option<&TaskSpec> {
        self.study.tasks.iter().find(|t| t.order == order)
    }

    /// Effective window length for a task: its own timer if present, else
    /// the study-wide default.
    pub fn task_duration_ms(&self, spec: Option<&TaskSpec>) -> i64 {
        let secs = spec
            .and_then(|s| s.timer_secs)
            .unwrap_or(self.study.default_task_secs);
        secs as i64 * 1000
    }
}

// ============================================================================
// Explanation engine / delivery
// ============================================================================

/// Which component authors explanation text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Canned-text lookup driven by rule Explanation actions.
    #[default]
    Integrated,
    /// The external reasoning service authors text; rules never do.
    External,
}

/// When and how an explanation reaches the participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Cache a single pending explanation until explicitly requested.
    #[default]
    Pull,
    /// Persist and broadcast immediately.
    Push,
    /// Push, plus conversational follow-ups to the reasoning engine.
    Interactive,
}

/// Transport of the external reasoning adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    #[default]
    Rest,
    Websocket,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    pub engine: EngineKind,
    pub trigger: TriggerMode,
    pub adapter: AdapterKind,
    /// Base URL of the external reasoning service.
    pub endpoint: String,
    /// Number of rating steps offered to the participant; None disables
    /// rating collection.
    pub rating_scale: Option<u8>,
    /// Canned explanation texts, keyed by the rule Explanation action key.
    pub explanations: BTreeMap<String, String>,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Integrated,
            trigger: TriggerMode::Pull,
            adapter: AdapterKind::Rest,
            endpoint: "http://localhost:5001".to_string(),
            rating_scale: None,
            explanations: BTreeMap::new(),
        }
    }
}

// ============================================================================
// In-game clock
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Game seconds per real second.
    pub speed: f64,
    pub start_hour: u32,
    pub start_minute: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            speed: 60.0,
            start_hour: 8,
            start_minute: 0,
        }
    }
}

// ============================================================================
// Study definition
// ============================================================================

/// Static definition of one task in the chain.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub order: u32,
    /// Window length in seconds; None uses `default_task_secs`.
    #[serde(default)]
    pub timer_secs: Option<u64>,
    /// Goal conditions, AND-reduced on every device interaction. An empty
    /// list means the goal can never be met (the task runs out its timer).
    #[serde(default)]
    pub goal: Vec<Condition>,
}

/// Initial property values for one device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub device_id: String,
    #[serde(default)]
    pub defaults: Vec<Property>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub default_task_secs: u64,
    pub tasks: Vec<TaskSpec>,
    pub rules: Vec<Rule>,
    pub devices: Vec<DeviceSpec>,
    /// Context variables injected into every session at provisioning.
    pub context: BTreeMap<String, Value>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            default_task_secs: 300,
            tasks: vec![],
            rules: vec![],
            devices: vec![],
            context: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = DomusConfig::default();
        assert_eq!(cfg.explanation.engine, EngineKind::Integrated);
        assert_eq!(cfg.explanation.trigger, TriggerMode::Pull);
        assert_eq!(cfg.clock.speed, 60.0);
        assert_eq!(cfg.study.default_task_secs, 300);
        assert_eq!(cfg.gateway.port, 5000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[explanation]
engine = "external"
trigger = "push"
adapter = "websocket"
endpoint = "ws://localhost:5001"
rating_scale = 5

[clock]
speed = 120.0
start_hour = 9
start_minute = 30

[study]
default_task_secs = 240

[[study.tasks]]
name = "warm_up"
order = 1
timer_secs = 120

[[study.tasks]]
name = "evening_scene"
order = 2

[[study.rules]]
id = "fan_follows_light"
delay_secs = 2

[[study.rules.precondition]]
type = "Device"
device = "light-1"

[study.rules.precondition.condition]
name = "power"
operator = "=="
value = true

[[study.rules.action]]
type = "DeviceInteraction"
device = "fan-1"

[study.rules.action.interaction]
name = "speed"
value = 3

[[study.devices]]
device_id = "light-1"
defaults = [{ name = "power", value = false }]

[study.context]
Condition = 2
Technical_Interest = "high"

[gateway]
port = 5050
"#;
        let cfg: DomusConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.explanation.engine, EngineKind::External);
        assert_eq!(cfg.explanation.trigger, TriggerMode::Push);
        assert_eq!(cfg.explanation.adapter, AdapterKind::Websocket);
        assert_eq!(cfg.explanation.rating_scale, Some(5));
        assert_eq!(cfg.clock.start_hour, 9);
        assert_eq!(cfg.study.tasks.len(), 2);
        assert_eq!(cfg.study.tasks[0].timer_secs, Some(120));
        assert_eq!(cfg.study.rules.len(), 1);
        assert_eq!(cfg.study.rules[0].delay_secs, 2);
        assert_eq!(cfg.study.rules[0].precondition.len(), 1);
        assert_eq!(cfg.study.devices[0].device_id, "light-1");
        assert_eq!(
            cfg.study.context.get("Technical_Interest"),
            Some(&Value::Text("high".into()))
        );
        assert_eq!(cfg.gateway.port, 5050);
    }

    #[test]
    fn test_task_duration_falls_back_to_default() {
        let cfg: DomusConfig = toml::from_str(
            r#"
[study]
default_task_secs = 100

[[study.tasks]]
name = "a"
order = 1
timer_secs = 42

[[study.tasks]]
name = "b"
order = 2
"#,
        )
        .unwrap();
        assert_eq!(cfg.task_duration_ms(cfg.task_spec(1)), 42_000);
        assert_eq!(cfg.task_duration_ms(cfg.task_spec(2)), 100_000);
        assert_eq!(cfg.task_duration_ms(None), 100_000);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("DOMUS_TRIGGER", "interactive");
        std::env::set_var("DOMUS_PORT", "6001");
        let mut cfg = DomusConfig::default();
        cfg.apply_env_overrides();
        std::env::remove_var("DOMUS_TRIGGER");
        std::env::remove_var("DOMUS_PORT");
        assert_eq!(cfg.explanation.trigger, TriggerMode::Interactive);
        assert_eq!(cfg.gateway.port, 6001);
    }
}
