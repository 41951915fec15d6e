//! Sub-entity fan-out
//!
//! Expands address rules into rows. A root that resolves to an array yields
//! one row per element, null elements included; any other node yields one
//! row; a missing or null root yields nothing.
//! Rows are best-effort and never fail mandatory validation.

use serde_json::Value;

use super::FieldMapper;
use crate::config::AddressRule;
use crate::value::MappedRow;

#[derive(Debug, Clone)]
pub struct FanoutBuilder {
    mapper: FieldMapper,
}

impl FanoutBuilder {
    pub fn new(mapper: FieldMapper) -> Self {
        Self { mapper }
    }

    /// Build every row the rules produce for `payload`.
    ///
    /// Each row carries a fresh identifier, the rule's type tag and, when
    /// given, `parent_id`, under the column names of the ingestion policy.
    pub fn build(&self, payload: &Value, rules: &[AddressRule], parent_id: Option<&str>) -> Vec<MappedRow> {
        let mut rows = Vec::new();

        for rule in rules {
            let Some(root) = self.mapper.compiled(&rule.root_path) else {
                continue;
            };
            let node = match root.resolve(payload) {
                Some(node) if !node.is_null() => node,
                _ => {
                    tracing::debug!(
                        address_type = %rule.address_type,
                        root_path = %rule.root_path,
                        "Address root not present, rule skipped"
                    );
                    continue;
                },
            };

            match node.as_ref() {
                Value::Array(elements) => {
                    for element in elements {
                        rows.push(self.row(element, rule, parent_id));
                    }
                },
                other => rows.push(self.row(other, rule, parent_id)),
            }
        }

        rows
    }

    fn row(&self, node: &Value, rule: &AddressRule, parent_id: Option<&str>) -> MappedRow {
        let policy = self.mapper.policy();
        let mut row = self.mapper.resolve_fields(node, &rule.field_mapping);
        row.insert(policy.id_column.clone(), self.mapper.generate_id());
        row.insert(policy.address_type_column.clone(), rule.address_type.clone());
        if let Some(parent) = parent_id {
            row.insert(policy.address_parent_column.clone(), parent);
        }
        row
    }
}
