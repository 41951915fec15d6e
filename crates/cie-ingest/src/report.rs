//! Ingestion outcome reporting

use serde::Serialize;

use crate::executor::InsertOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// All tables processed and committed
    Ingested,
    /// Rejected by the rules; acknowledged without writing anything
    Filtered,
}

/// Per-table counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReport {
    pub logical_key: String,
    pub rows_inserted: usize,
    pub duplicates_skipped: usize,
}

impl TableReport {
    pub fn new(logical_key: impl Into<String>) -> Self {
        Self {
            logical_key: logical_key.into(),
            rows_inserted: 0,
            duplicates_skipped: 0,
        }
    }

    pub fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.rows_inserted += 1,
            InsertOutcome::Duplicate => self.duplicates_skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub event_id: Option<String>,
    pub event_name: String,
    pub outcome: Outcome,
    pub parent_id: Option<String>,
    pub rows_inserted: usize,
    pub duplicates_skipped: usize,
    pub tables: Vec<TableReport>,
}

impl IngestionReport {
    pub fn filtered(event_id: Option<String>, event_name: impl Into<String>) -> Self {
        Self {
            event_id,
            event_name: event_name.into(),
            outcome: Outcome::Filtered,
            parent_id: None,
            rows_inserted: 0,
            duplicates_skipped: 0,
            tables: Vec::new(),
        }
    }

    pub fn ingested(
        event_id: Option<String>,
        event_name: impl Into<String>,
        parent_id: Option<String>,
        tables: Vec<TableReport>,
    ) -> Self {
        Self {
            event_id,
            event_name: event_name.into(),
            outcome: Outcome::Ingested,
            parent_id,
            rows_inserted: tables.iter().map(|t| t.rows_inserted).sum(),
            duplicates_skipped: tables.iter().map(|t| t.duplicates_skipped).sum(),
            tables,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_sum_tables() {
        let mut main = TableReport::new("AVS");
        main.record(InsertOutcome::Inserted);
        let mut addr = TableReport::new("AVS_ADDR");
        addr.record(InsertOutcome::Inserted);
        addr.record(InsertOutcome::Duplicate);

        let report = IngestionReport::ingested(Some("evt-1".into()), "AVS", Some("T1".into()), vec![main, addr]);
        assert_eq!(report.rows_inserted, 2);
        assert_eq!(report.duplicates_skipped, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "INGESTED");
        assert_eq!(json["tables"][1]["logicalKey"], "AVS_ADDR");
        assert_eq!(json["rowsInserted"], 2);
    }

    #[test]
    fn test_filtered_report_is_empty() {
        let report = IngestionReport::filtered(None, "AVS");
        assert_eq!(report.outcome, Outcome::Filtered);
        assert!(report.tables.is_empty());
        assert_eq!(serde_json::to_value(&report).unwrap()["outcome"], "FILTERED");
    }
}
