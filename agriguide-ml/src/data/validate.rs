//! Row-level validation of a loaded batch against a family schema.

use crate::data::schema::{FamilySchema, RawRecord, RowRejection};
use crate::data::source::DataBatch;
use crate::error::AgriError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts of kept and dropped rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub dropped_rows: usize,
    /// Dropped rows keyed by reason, e.g. `non_numeric:N`.
    pub dropped_by_reason: BTreeMap<String, usize>,
}

impl ValidationReport {
    fn reject(&mut self, reason: &RowRejection) {
        self.dropped_rows += 1;
        *self.dropped_by_reason.entry(reason_key(reason)).or_default() += 1;
    }
}

fn reason_key(reason: &RowRejection) -> String {
    match reason {
        RowRejection::RaggedRow => "ragged_row".to_string(),
        RowRejection::NonNumeric { column } => format!("non_numeric:{column}"),
        RowRejection::NonFinite { column } => format!("non_finite:{column}"),
        RowRejection::EmptyValue { column } => format!("empty_value:{column}"),
    }
}

/// Check the header, then parse every row. Invalid rows are dropped and
/// counted, never coerced.
pub fn validate_batch(
    schema: &FamilySchema,
    batch: &DataBatch,
    allow_extra_columns: bool,
) -> Result<(Vec<RawRecord>, ValidationReport), AgriError> {
    schema.check_header(&batch.columns, allow_extra_columns)?;

    let mut report = ValidationReport {
        total_rows: batch.row_count(),
        ..Default::default()
    };
    let mut records = Vec::with_capacity(batch.row_count());
    for row in &batch.rows {
        match schema.parse_row(&batch.columns, row) {
            Ok(record) => records.push(record),
            Err(reason) => report.reject(&reason),
        }
    }
    report.valid_rows = records.len();

    if report.dropped_rows > 0 {
        tracing::warn!(
            family = %schema.family,
            dropped = report.dropped_rows,
            reasons = ?report.dropped_by_reason,
            "dropped invalid rows"
        );
    }
    Ok((records, report))
}
