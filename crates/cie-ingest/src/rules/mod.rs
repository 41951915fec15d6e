//! Admission rules
//!
//! A [`RuleEvaluator`] is a pure function from envelope to envelope. It may
//! clear `admitted` and rewrite the payload; nothing else it changes is read
//! by the pipeline.

mod model;

pub use model::{Action, Condition, Fact, Rule};

use serde_json::Value;
use std::collections::HashMap;

use crate::envelope::Envelope;
use crate::json_path::JsonPath;

pub trait RuleEvaluator: Send + Sync {
    fn evaluate(&self, envelope: Envelope) -> Envelope;
}

/// Admits every event unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl RuleEvaluator for AdmitAll {
    fn evaluate(&self, envelope: Envelope) -> Envelope {
        envelope
    }
}

/// Rules for one event type, in firing order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Order rules by ascending priority; equal priorities keep declaration order
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Rule sets keyed by uppercased event name
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    sets: HashMap<String, RuleSet>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(mut self, event_name: &str, rules: Vec<Rule>) -> Self {
        self.insert(event_name, rules);
        self
    }

    pub fn insert(&mut self, event_name: &str, rules: Vec<Rule>) {
        self.sets.insert(event_name.to_uppercase(), RuleSet::new(rules));
    }

    pub fn rules_for(&self, event_name: &str) -> Option<&RuleSet> {
        self.sets.get(&event_name.to_uppercase())
    }

    /// Event types with at least one rule set
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

impl RuleEvaluator for RuleEngine {
    fn evaluate(&self, mut envelope: Envelope) -> Envelope {
        let Some(set) = self.rules_for(&envelope.event_name).filter(|s| !s.is_empty()) else {
            tracing::debug!(event_name = %envelope.event_name, "No rules for event type");
            return envelope;
        };

        let mut payload: Option<Value> = envelope
            .event_payload
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok());

        for rule in set.rules() {
            if !rule.when.holds(&envelope, payload.as_ref()) {
                continue;
            }
            tracing::debug!(rule = %rule.name, priority = rule.priority, "Rule fired");

            for action in &rule.then {
                apply(action, &mut envelope, payload.as_mut());
            }
        }

        if !envelope.admitted {
            tracing::info!(
                event_name = %envelope.event_name,
                event_id = envelope.event_id_or_empty(),
                "Event rejected by rules"
            );
        }
        envelope
    }
}

fn apply(action: &Action, envelope: &mut Envelope, payload: Option<&mut Value>) {
    match action {
        Action::Reject => envelope.admitted = false,
        Action::Admit => envelope.admitted = true,
        Action::SetPayloadField { path, value } => {
            let Some(payload) = payload else {
                return;
            };
            let changed = JsonPath::compile(path).is_ok_and(|p| p.set(payload, value.clone()));
            if changed {
                envelope.event_payload = Some(payload.to_string());
            }
        },
        Action::RemovePayloadField { path } => {
            let Some(payload) = payload else {
                return;
            };
            let removed = JsonPath::compile(path)
                .ok()
                .and_then(|p| p.remove(payload))
                .is_some();
            if removed {
                envelope.event_payload = Some(payload.to_string());
            }
        },
    }
}
