//! Declarative Automation Rules
//!
//! A rule is a list of typed preconditions evaluated with AND short-circuit
//! semantics, plus a list of actions carried out when they all hold. The
//! evaluator is a pure function layer; the engine crate drives it against
//! live session and device state.

use serde::{Deserialize, Serialize};

use crate::clock::GameTime;
use crate::model::{Device, PropertyLookup, Session, Value};

// ============================================================================
// Rule data model
// ============================================================================

/// One automation rule. Rules are evaluated in declared order against the
/// pre-evaluation device snapshot; an empty precondition list always fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub precondition: Vec<Condition>,
    #[serde(default)]
    pub action: Vec<Action>,
    /// Seconds to defer this rule's effects. 0 applies inline.
    #[serde(default)]
    pub delay_secs: u64,
}

/// Relational operator of a clause. Unknown operators are accepted at parse
/// time and evaluate to false, so one malformed rule cannot abort the rest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Op {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(other)]
    Unknown,
}

/// `name operator value`, the comparison inside every condition variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    pub name: String,
    pub operator: Op,
    pub value: Value,
}

/// One typed precondition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Condition {
    /// Compare a device property against a literal.
    Device { device: String, condition: Clause },
    /// Compare an injected session context variable against a literal.
    Context { condition: Clause },
    /// Compare a sub-field of the in-game clock (`hour` or `minute`).
    Time { condition: Clause },
}

/// One rule action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Write a device property value.
    DeviceInteraction {
        device: String,
        interaction: crate::model::Property,
    },
    /// Surface a canned explanation by key (integrated engine only).
    Explanation { explanation: String },
}

// ============================================================================
// Condition evaluation
// ============================================================================

/// Evaluate `left op right`. Cross-numeric Int/Float comparison is supported;
/// a type mismatch (e.g. ordering a Bool) evaluates false. `Op::Unknown`
/// always evaluates false with a warning.
pub fn compare(op: Op, left: &Value, right: &Value) -> bool {
    let ord = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (left, right) {
            (Value::Bool(l), Value::Bool(r)) => l.partial_cmp(r),
            (Value::Text(l), Value::Text(r)) => l.partial_cmp(r),
            _ => None,
        },
    };

    match op {
        Op::Eq => ord == Some(std::cmp::Ordering::Equal),
        Op::Ne => matches!(ord, Some(o) if o != std::cmp::Ordering::Equal),
        Op::Lt => ord == Some(std::cmp::Ordering::Less),
        Op::Gt => ord == Some(std::cmp::Ordering::Greater),
        Op::Le => matches!(ord, Some(o) if o != std::cmp::Ordering::Greater),
        Op::Ge => matches!(ord, Some(o) if o != std::cmp::Ordering::Less),
        Op::Unknown => {
            tracing::warn!("Unsupported operator in rule clause, treating as false");
            false
        }
    }
}

/// Outcome of one precondition. `Missing` is surfaced separately so the
/// caller can short-circuit an entire chain on an absent device property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseOutcome {
    Holds,
    Fails,
    /// The referenced device or property does not exist.
    Missing,
}

/// Evaluate a single condition against the supplied snapshot.
pub fn evaluate_condition(
    cond: &Condition,
    session: &Session,
    devices: &[Device],
    game_time: GameTime,
) -> ClauseOutcome {
    match cond {
        Condition::Device { device, condition } => {
            let Some(dev) = devices.iter().find(|d| d.device_id == *device) else {
                tracing::debug!(device = %device, "Rule references unknown device");
                return ClauseOutcome::Missing;
            };
            match dev.lookup(&condition.name) {
                PropertyLookup::Found(current) => {
                    if compare(condition.operator, &current, &condition.value) {
                        ClauseOutcome::Holds
                    } else {
                        ClauseOutcome::Fails
                    }
                }
                PropertyLookup::FoundNull => {
                    tracing::debug!(
                        device = %device,
                        property = %condition.name,
                        "Device property present but null"
                    );
                    ClauseOutcome::Fails
                }
                PropertyLookup::Missing => {
                    tracing::debug!(
                        device = %device,
                        property = %condition.name,
                        "Device property not found"
                    );
                    ClauseOutcome::Missing
                }
            }
        }
        Condition::Context { condition } => match session.custom_data.get(&condition.name) {
            Some(current) if compare(condition.operator, current, &condition.value) => {
                ClauseOutcome::Holds
            }
            Some(_) => ClauseOutcome::Fails,
            None => {
                tracing::debug!(name = %condition.name, "Unknown context variable");
                ClauseOutcome::Fails
            }
        },
        Condition::Time { condition } => {
            let current = match condition.name.as_str() {
                "hour" => game_time.hour as i64,
                "minute" => game_time.minute as i64,
                other => {
                    tracing::warn!(field = %other, "Unknown time field in rule clause");
                    return ClauseOutcome::Fails;
                }
            };
            // Time literals come from hand-written rule files; a malformed
            // one evaluates false rather than aborting evaluation.
            let literal = match &condition.value {
                Value::Int(n) => *n,
                Value::Float(f) => *f as i64,
                Value::Text(s) => match s.trim().parse::<i64>() {
                    Ok(n) => n,
                    Err(_) => {
                        tracing::warn!(literal = %s, "Malformed time literal in rule clause");
                        return ClauseOutcome::Fails;
                    }
                },
                other => {
                    tracing::warn!(?other, "Malformed time literal in rule clause");
                    return ClauseOutcome::Fails;
                }
            };
            if compare(condition.operator, &Value::Int(current), &Value::Int(literal)) {
                ClauseOutcome::Holds
            } else {
                ClauseOutcome::Fails
            }
        }
    }
}

/// AND-reduce a precondition list with short-circuit on the first clause
/// that fails or references a missing property. An empty list is vacuously
/// true: such a rule always fires.
pub fn preconditions_hold(
    conditions: &[Condition],
    session: &Session,
    devices: &[Device],
    game_time: GameTime,
) -> bool {
    conditions
        .iter()
        .all(|c| evaluate_condition(c, session, devices, game_time) == ClauseOutcome::Holds)
}
