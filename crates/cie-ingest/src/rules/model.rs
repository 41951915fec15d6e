//! Declarative rule model
//!
//! ```yaml
//! - name: drop-test-traffic
//!   priority: 1
//!   when:
//!     any:
//!       - equals: { fact: eventSource, value: LOAD_TEST }
//!       - payloadEquals: { path: $.synthetic, value: true }
//!   then:
//!     - reject
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Envelope;
use crate::json_path::{JsonPath, JsonPathError};

/// Envelope fields visible to conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Fact {
    EventName,
    EventId,
    EventSource,
    EventMetadata,
    EventPayload,
    CorrelationId,
    RegulatoryRegion,
}

impl Fact {
    /// Current value; a missing field is not present rather than an error
    pub fn read(self, envelope: &Envelope) -> Option<&str> {
        match self {
            Fact::EventName => Some(envelope.event_name.as_str()),
            Fact::EventId => envelope.event_id.as_deref(),
            Fact::EventSource => envelope.event_source.as_deref(),
            Fact::EventMetadata => envelope.event_metadata.as_deref(),
            Fact::EventPayload => envelope.event_payload.as_deref(),
            Fact::CorrelationId => envelope.correlation_id.as_deref(),
            Fact::RegulatoryRegion => envelope.regulatory_region.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Contains { fact: Fact, value: String },
    Equals { fact: Fact, value: String },
    Blank { fact: Fact },
    Present { fact: Fact },
    PayloadEquals { path: String, value: Value },
    PayloadMissing { path: String },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    Always,
}

impl Condition {
    /// Evaluate against the envelope and its parsed payload (`None` when unparseable)
    pub fn holds(&self, envelope: &Envelope, payload: Option<&Value>) -> bool {
        match self {
            Condition::Contains { fact, value } => fact.read(envelope).is_some_and(|v| v.contains(value.as_str())),
            Condition::Equals { fact, value } => fact.read(envelope) == Some(value.as_str()),
            Condition::Blank { fact } => fact.read(envelope).map_or(true, |v| v.trim().is_empty()),
            Condition::Present { fact } => fact.read(envelope).is_some_and(|v| !v.trim().is_empty()),
            Condition::PayloadEquals { path, value } => {
                resolve(path, payload).is_some_and(|found| found == *value)
            },
            Condition::PayloadMissing { path } => resolve(path, payload).map_or(true, |found| found.is_null()),
            Condition::All(conditions) => conditions.iter().all(|c| c.holds(envelope, payload)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.holds(envelope, payload)),
            Condition::Not(inner) => !inner.holds(envelope, payload),
            Condition::Always => true,
        }
    }

    fn paths(&self) -> Vec<&str> {
        match self {
            Condition::PayloadEquals { path, .. } | Condition::PayloadMissing { path } => vec![path.as_str()],
            Condition::All(conditions) | Condition::Any(conditions) => {
                conditions.iter().flat_map(Condition::paths).collect()
            },
            Condition::Not(inner) => inner.paths(),
            _ => Vec::new(),
        }
    }
}

fn resolve(path: &str, payload: Option<&Value>) -> Option<Value> {
    let payload = payload?;
    JsonPath::compile(path).ok()?.resolve(payload).map(|v| v.into_owned())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Mark the event as not admitted
    Reject,
    /// Mark the event as admitted again
    Admit,
    SetPayloadField { path: String, value: Value },
    RemovePayloadField { path: String },
}

impl Action {
    fn path(&self) -> Option<&str> {
        match self {
            Action::SetPayloadField { path, .. } | Action::RemovePayloadField { path } => Some(path.as_str()),
            _ => None,
        }
    }
}

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Rule {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Lower fires first
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub when: Condition,

    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub then: Vec<Action>,
}

impl Rule {
    /// Check that every payload path in the rule compiles
    pub fn validate(&self) -> Result<(), JsonPathError> {
        let action_paths = self.then.iter().filter_map(Action::path);
        for path in self.when.paths().into_iter().chain(action_paths) {
            JsonPath::compile(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> Envelope {
        Envelope {
            event_name: "AVS".into(),
            event_id: Some("evt-1".into()),
            correlation_id: None,
            event_source: Some("AVS_SERVICE".into()),
            regulatory_region: Some("  ".into()),
            event_timestamp: None,
            event_metadata: None,
            event_payload: Some(r#"{"avsTranId":"T1","synthetic":true}"#.into()),
            admitted: true,
        }
    }

    #[test]
    fn test_fact_conditions() {
        let env = envelope();
        let source = |value: &str| Condition::Equals {
            fact: Fact::EventSource,
            value: value.into(),
        };
        assert!(source("AVS_SERVICE").holds(&env, None));
        assert!(!source("OTHER").holds(&env, None));
        assert!(Condition::Contains {
            fact: Fact::EventSource,
            value: "SERV".into()
        }
        .holds(&env, None));
    }

    #[test]
    fn test_null_fact_is_not_present() {
        let env = envelope();
        assert!(!Condition::Equals {
            fact: Fact::CorrelationId,
            value: "".into()
        }
        .holds(&env, None));
        assert!(!Condition::Contains {
            fact: Fact::CorrelationId,
            value: "".into()
        }
        .holds(&env, None));
        assert!(Condition::Blank { fact: Fact::CorrelationId }.holds(&env, None));
        assert!(Condition::Blank { fact: Fact::RegulatoryRegion }.holds(&env, None));
        assert!(!Condition::Present { fact: Fact::RegulatoryRegion }.holds(&env, None));
    }

    #[test]
    fn test_payload_conditions() {
        let env = envelope();
        let payload = json!({ "avsTranId": "T1", "synthetic": true });
        assert!(Condition::PayloadEquals {
            path: "$.synthetic".into(),
            value: json!(true)
        }
        .holds(&env, Some(&payload)));
        assert!(Condition::PayloadMissing { path: "$.ghost".into() }.holds(&env, Some(&payload)));
        assert!(Condition::PayloadMissing { path: "$.avsTranId".into() }.holds(&env, None));
    }

    #[test]
    fn test_combinators() {
        let env = envelope();
        let yes = Condition::Always;
        let no = Condition::Not(Box::new(Condition::Always));
        assert!(Condition::All(vec![yes.clone(), yes.clone()]).holds(&env, None));
        assert!(!Condition::All(vec![yes.clone(), no.clone()]).holds(&env, None));
        assert!(Condition::Any(vec![no.clone(), yes]).holds(&env, None));
        assert!(!Condition::Any(vec![no]).holds(&env, None));
        assert!(Condition::All(vec![]).holds(&env, None));
    }

    #[test]
    fn test_rule_yaml_shape() {
        let yaml = r#"
- name: drop-test-traffic
  description: Synthetic events never reach the store
  priority: 2
  when:
    any:
      - equals: { fact: eventSource, value: LOAD_TEST }
      - payloadEquals: { path: $.synthetic, value: true }
  then:
    - reject
    - setPayloadField: { path: $.flagged, value: yes }
- name: always-admit
  when: always
  then: [admit]
"#;
        let rules: Vec<Rule> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].priority, 2);
        assert_eq!(rules[1].priority, 1);
        assert!(matches!(&rules[0].when, Condition::Any(c) if c.len() == 2));
        assert_eq!(rules[0].then[0], Action::Reject);
        assert_eq!(rules[1].when, Condition::Always);
        assert!(rules[0].validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_paths() {
        let rule = Rule {
            name: "bad".into(),
            description: None,
            priority: 1,
            when: Condition::Not(Box::new(Condition::PayloadMissing { path: "$.a[".into() })),
            then: vec![],
        };
        assert!(rule.validate().is_err());
    }
}
