//! Insert executor
//!
//! Runs one synthesized statement inside the caller's transaction. A unique
//! violation means the row is already there: re-delivery of an event is a
//! no-op, not a failure.

use crate::sql::InsertStatement;
use crate::store::{StoreError, StoreTransaction};
use crate::value::MappedRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Execute `statement` for `row`.
///
/// # Errors
///
/// Every store failure other than a unique violation.
#[tracing::instrument(skip_all, fields(table = %statement.table))]
pub async fn insert<T>(tx: &mut T, statement: &InsertStatement, row: &MappedRow) -> Result<InsertOutcome, StoreError>
where
    T: StoreTransaction + ?Sized,
{
    match tx.execute(statement, row).await {
        Ok(()) => Ok(InsertOutcome::Inserted),
        Err(StoreError::UniqueViolation { table, constraint }) => {
            tracing::info!(
                table = %table,
                constraint = constraint.as_deref().unwrap_or("unknown"),
                "Row already present, skipping duplicate"
            );
            Ok(InsertOutcome::Duplicate)
        },
        Err(e) => Err(e),
    }
}
