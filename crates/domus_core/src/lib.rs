pub mod clock;
pub mod config;
pub mod events;
pub mod model;
pub mod rules;

pub use clock::{game_time, GameTime};
pub use config::{
    AdapterKind, ClockConfig, DeviceSpec, DomusConfig, EngineKind, ExplanationConfig,
    GatewayConfig, StudyConfig, TaskSpec, TriggerMode,
};
pub use events::{ClientNotifier, InboundEvent, OutboundEvent};
pub use model::{
    now_ms, Device, Explanation, LogEntry, LogKind, Property, PropertyLookup, Session, Task, Value,
};
pub use rules::{
    compare, evaluate_condition, preconditions_hold, Action, Clause, ClauseOutcome, Condition, Op,
    Rule,
};
