//! Rule Evaluation Engine
//!
//! Iterates the ruleset in declared order against the pre-evaluation device
//! snapshot: this is a batch, not a fixed point, so later rules see the
//! state as it was when the interaction arrived, never the effects of
//! earlier rules in the same pass.

use domus_core::events::PropertyUpdate;
use domus_core::{
    game_time, preconditions_hold, Action, DomusConfig, EngineKind, Explanation,
    now_ms, Device, Rule, Session, Task,
};

/// A device-property write still to be applied, carrying its rule's delay.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub device_id: String,
    pub property: domus_core::Property,
    pub delay_secs: u64,
}

impl PendingUpdate {
    pub fn as_property_update(&self) -> PropertyUpdate {
        PropertyUpdate {
            device_id: self.device_id.clone(),
            property: self.property.clone(),
        }
    }
}

/// Audit record of one successful rule: its id and the concrete property
/// changes it produced.
#[derive(Debug, Clone)]
pub struct FiredRule {
    pub rule_id: String,
    pub changes: Vec<PropertyUpdate>,
}

/// Batch of effects one evaluation pass produced.
#[derive(Debug, Clone, Default)]
pub struct RuleOutcome {
    pub updates: Vec<PendingUpdate>,
    pub explanations: Vec<Explanation>,
    pub fired: Vec<FiredRule>,
}

/// Evaluate the ordered ruleset. Preconditions AND-reduce with
/// short-circuit; an empty precondition list always fires. Explanation
/// actions materialize only under the integrated engine, tagged with the
/// currently active task and the rule's delay.
pub fn evaluate_rules(
    session: &Session,
    current_task: Option<&Task>,
    devices: &[Device],
    rules: &[Rule],
    config: &DomusConfig,
) -> RuleOutcome {
    let clock = game_time(
        session.start_time_ms,
        now_ms(),
        config.clock.speed,
        config.clock.start_hour,
        config.clock.start_minute,
    );

    let mut outcome = RuleOutcome::default();

    for rule in rules {
        if !preconditions_hold(&rule.precondition, session, devices, clock) {
            continue;
        }

        let mut changes = Vec::new();
        for action in &rule.action {
            match action {
                Action::DeviceInteraction { device, interaction } => {
                    let update = PendingUpdate {
                        device_id: device.clone(),
                        property: interaction.clone(),
                        delay_secs: rule.delay_secs,
                    };
                    changes.push(update.as_property_update());
                    outcome.updates.push(update);
                }
                Action::Explanation { explanation: key } => {
                    if config.explanation.engine != EngineKind::Integrated {
                        // External engine owns explanation text; rules only
                        // carry canned keys for the integrated one.
                        continue;
                    }
                    match config.explanation.explanations.get(key) {
                        Some(text) => outcome.explanations.push(Explanation::new(
                            text,
                            &session.session_id,
                            current_task.map(|t| t.task_id.as_str()),
                            rule.delay_secs,
                        )),
                        None => {
                            tracing::warn!(key = %key, rule = %rule.id, "No canned explanation for key");
                        }
                    }
                }
            }
        }

        tracing::debug!(rule = %rule.id, changes = changes.len(), "Rule fired");
        outcome.fired.push(FiredRule {
            rule_id: rule.id.clone(),
            changes,
        });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use domus_core::{Clause, Condition, Op, Property, TriggerMode, Value};
    use std::collections::BTreeMap;

    fn session() -> Session {
        Session {
            session_id: "s1".into(),
            socket_id: None,
            start_time_ms: now_ms(),
            custom_data: BTreeMap::new(),
            explanation_cache: None,
            is_completed: false,
        }
    }

    fn task() -> Task {
        Task {
            task_id: "t1".into(),
            session_id: "s1".into(),
            task_order: 1,
            start_time_ms: 0,
            end_time_ms: i64::MAX,
            interaction_times: 0,
            is_completed: false,
            is_timed_out: false,
            is_aborted: false,
            aborted_reason: None,
            duration_ms: None,
            completion_time_ms: None,
        }
    }

    fn light(power: bool) -> Device {
        Device {
            device_id: "light-1".into(),
            session_id: "s1".into(),
            properties: vec![Property {
                name: "power".into(),
                value: Value::Bool(power),
            }],
        }
    }

    fn power_condition(value: bool) -> Condition {
        Condition::Device {
            device: "light-1".into(),
            condition: Clause {
                name: "power".into(),
                operator: Op::Eq,
                value: Value::Bool(value),
            },
        }
    }

    fn fan_action() -> Action {
        Action::DeviceInteraction {
            device: "fan-1".into(),
            interaction: Property {
                name: "speed".into(),
                value: Value::Int(3),
            },
        }
    }

    fn config() -> DomusConfig {
        let mut cfg = DomusConfig::default();
        cfg.explanation.trigger = TriggerMode::Push;
        cfg.explanation
            .explanations
            .insert("fan_on".into(), "The fan turned on because...".into());
        cfg
    }

    #[test]
    fn test_rule_fires_and_expands_actions() {
        let rule = Rule {
            id: "fan_follows_light".into(),
            precondition: vec![power_condition(true)],
            action: vec![fan_action()],
            delay_secs: 2,
        };
        let outcome = evaluate_rules(&session(), Some(&task()), &[light(true)], &[rule], &config());
        assert_eq!(outcome.updates.len(), 1);
        assert_eq!(outcome.updates[0].device_id, "fan-1");
        assert_eq!(outcome.updates[0].delay_secs, 2);
        assert_eq!(outcome.fired.len(), 1);
        assert_eq!(outcome.fired[0].rule_id, "fan_follows_light");
        assert_eq!(outcome.fired[0].changes.len(), 1);
    }

    #[test]
    fn test_failing_precondition_suppresses_rule() {
        let rule = Rule {
            id: "fan_follows_light".into(),
            precondition: vec![power_condition(true)],
            action: vec![fan_action()],
            delay_secs: 0,
        };
        let outcome =
            evaluate_rules(&session(), Some(&task()), &[light(false)], &[rule], &config());
        assert!(outcome.updates.is_empty());
        assert!(outcome.fired.is_empty());
    }

    #[test]
    fn test_empty_precondition_always_fires() {
        let rule = Rule {
            id: "always".into(),
            precondition: vec![],
            action: vec![fan_action()],
            delay_secs: 0,
        };
        let outcome = evaluate_rules(&session(), None, &[], &[rule], &config());
        assert_eq!(outcome.fired.len(), 1);
    }

    #[test]
    fn test_batch_uses_pre_evaluation_snapshot() {
        // First rule turns the light on; second rule keys on the light being
        // on. With batch semantics the second rule must NOT fire, because it
        // sees the snapshot from before the pass.
        let turn_on = Rule {
            id: "turn_on".into(),
            precondition: vec![],
            action: vec![Action::DeviceInteraction {
                device: "light-1".into(),
                interaction: Property {
                    name: "power".into(),
                    value: Value::Bool(true),
                },
            }],
            delay_secs: 0,
        };
        let follows = Rule {
            id: "follows".into(),
            precondition: vec![power_condition(true)],
            action: vec![fan_action()],
            delay_secs: 0,
        };
        let outcome = evaluate_rules(
            &session(),
            None,
            &[light(false)],
            &[turn_on, follows],
            &config(),
        );
        assert_eq!(outcome.fired.len(), 1);
        assert_eq!(outcome.fired[0].rule_id, "turn_on");
    }

    #[test]
    fn test_integrated_engine_materializes_explanations() {
        let rule = Rule {
            id: "explain".into(),
            precondition: vec![],
            action: vec![Action::Explanation {
                explanation: "fan_on".into(),
            }],
            delay_secs: 1,
        };
        let outcome = evaluate_rules(&session(), Some(&task()), &[], &[rule.clone()], &config());
        assert_eq!(outcome.explanations.len(), 1);
        let expl = &outcome.explanations[0];
        assert_eq!(expl.explanation, "The fan turned on because...");
        assert_eq!(expl.task_id.as_deref(), Some("t1"));
        assert_eq!(expl.delay_secs, 1);

        // Under an external engine the same rule produces nothing.
        let mut external = config();
        external.explanation.engine = EngineKind::External;
        let outcome = evaluate_rules(&session(), Some(&task()), &[], &[rule], &external);
        assert!(outcome.explanations.is_empty());
    }

    #[test]
    fn test_unknown_explanation_key_skipped() {
        let rule = Rule {
            id: "explain".into(),
            precondition: vec![],
            action: vec![Action::Explanation {
                explanation: "missing_key".into(),
            }],
            delay_secs: 0,
        };
        let outcome = evaluate_rules(&session(), None, &[], &[rule], &config());
        assert!(outcome.explanations.is_empty());
        // The rule itself still counts as fired.
        assert_eq!(outcome.fired.len(), 1);
    }
}
