//! Study Orchestration Engine
//!
//! The server-side core that reacts to a device interaction and decides what
//! happens next: rule evaluation and action scheduling, the task lifecycle
//! state machine with its cascading rescheduler, and the explanation
//! delivery router in front of the external reasoning adapter.

pub mod gate;
pub mod handler;
pub mod logger;
pub mod reschedule;
pub mod router;
pub mod rules;
pub mod scheduler;
pub mod tasks;

pub use handler::Orchestrator;
pub use reschedule::RescheduleResult;
pub use router::NO_EXPLANATION;
pub use rules::{evaluate_rules, FiredRule, PendingUpdate, RuleOutcome};
