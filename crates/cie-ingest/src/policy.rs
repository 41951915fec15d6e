//! Ingestion policy
//!
//! Naming conventions that decide timestamp coercion, parent identifier
//! derivation and the reserved columns stamped onto generated rows. All of it
//! is configuration: deployments disagree on the exact lists.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct IngestionPolicy {
    /// Column suffixes marking a date-bearing column
    pub date_suffixes: Vec<String>,

    /// Column substrings marking a date-bearing column
    pub date_substrings: Vec<String>,

    /// Columns tried in order when deriving the parent identifier from a main row
    pub parent_id_keys: Vec<String>,

    /// Reserved column for generated identifiers
    pub id_column: String,

    /// Column receiving an address rule's type tag
    pub address_type_column: String,

    /// Column receiving the parent identifier on fan-out rows
    pub address_parent_column: String,
}

impl Default for IngestionPolicy {
    fn default() -> Self {
        Self {
            date_suffixes: vec!["_DT".into(), "_TS".into()],
            date_substrings: vec!["DATE".into()],
            parent_id_keys: vec![
                "TRAN_ID".into(),
                "ACCT_INFO_ID".into(),
                "TRANSACTION_ID".into(),
                "ID".into(),
            ],
            id_column: "ID".into(),
            address_type_column: "ADDR_TYPE".into(),
            address_parent_column: "PARENT_ID".into(),
        }
    }
}

impl IngestionPolicy {
    /// Whether values mapped into `column` should be coerced to timestamps
    pub fn is_date_column(&self, column: &str) -> bool {
        let upper = column.to_uppercase();
        self.date_suffixes
            .iter()
            .any(|suffix| upper.ends_with(&suffix.to_uppercase()))
            || self
                .date_substrings
                .iter()
                .any(|part| upper.contains(&part.to_uppercase()))
    }
}
