//! Training-time row cleaning: outlier clipping, trimming, and the derived
//! yield target. Bounds always come from the training split.

use crate::config::CleaningConfig;
use crate::data::schema::{Family, RawRecord, RawValue};
use crate::error::AgriError;
use serde::{Deserialize, Serialize};

/// Name of the continuous target derived for the yield family.
pub const YIELD_COLUMN: &str = "Yield";

/// Inclusive bounds fitted for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBounds {
    pub column: String,
    pub lower: f64,
    pub upper: f64,
}

/// What cleaning did to one split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub bounds: Vec<ColumnBounds>,
    pub clipped_values: usize,
    pub train_rows_removed: usize,
    pub test_rows_removed: usize,
    pub yield_cap: Option<f64>,
}

/// Quantile with linear interpolation between closest ranks.
///
/// `sorted` must be ascending and non-empty.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn sorted_column(records: &[RawRecord], column: &str) -> Result<Vec<f64>, AgriError> {
    let mut values = records
        .iter()
        .map(|r| r.number(column))
        .collect::<Result<Vec<_>, _>>()?;
    values.sort_by(f64::total_cmp);
    Ok(values)
}

/// Tukey fences `Q1 - k*IQR, Q3 + k*IQR`. `None` when the IQR is zero.
fn iqr_bounds(sorted: &[f64], column: &str, k: f64) -> Option<ColumnBounds> {
    let q1 = quantile(sorted, 0.25);
    let q3 = quantile(sorted, 0.75);
    let iqr = q3 - q1;
    if iqr == 0.0 {
        return None;
    }
    Some(ColumnBounds {
        column: column.to_string(),
        lower: q1 - k * iqr,
        upper: q3 + k * iqr,
    })
}

/// Apply the family's cleaning to the train and test splits in place.
pub fn clean_splits(
    family: Family,
    config: &CleaningConfig,
    train: &mut Vec<RawRecord>,
    test: &mut Vec<RawRecord>,
) -> Result<CleaningSummary, AgriError> {
    match family {
        Family::Crop if config.clip_outliers => clip_crop(config, train),
        Family::Yield => clean_yield(config, train, test),
        _ => Ok(CleaningSummary::default()),
    }
}

/// Clip the crop family's numeric inputs on the training split only.
fn clip_crop(
    config: &CleaningConfig,
    train: &mut [RawRecord],
) -> Result<CleaningSummary, AgriError> {
    let mut summary = CleaningSummary::default();
    if train.is_empty() {
        return Ok(summary);
    }
    for column in Family::Crop.schema().numeric_columns() {
        let sorted = sorted_column(train, column)?;
        let Some(bounds) = iqr_bounds(&sorted, column, config.iqr_multiplier) else {
            continue;
        };
        for record in train.iter_mut() {
            let v = record.number(column)?;
            let clipped = v.clamp(bounds.lower, bounds.upper);
            if clipped != v {
                record.insert(column, RawValue::Number(clipped));
                summary.clipped_values += 1;
            }
        }
        summary.bounds.push(bounds);
    }
    Ok(summary)
}

fn clean_yield(
    config: &CleaningConfig,
    train: &mut Vec<RawRecord>,
    test: &mut Vec<RawRecord>,
) -> Result<CleaningSummary, AgriError> {
    let mut summary = CleaningSummary::default();
    let (train_before, test_before) = (train.len(), test.len());

    let positive_area = |r: &RawRecord| r.number("Area").map(|a| a > 0.0);
    retain_ok(train, positive_area)?;
    retain_ok(test, positive_area)?;

    for column in ["Area", "Production"] {
        if train.is_empty() {
            break;
        }
        let sorted = sorted_column(train, column)?;
        let bounds = match iqr_bounds(&sorted, column, config.iqr_multiplier) {
            Some(b) => ColumnBounds {
                lower: b.lower.max(0.0),
                ..b
            },
            None => ColumnBounds {
                column: column.to_string(),
                lower: if column == "Production" {
                    0.0
                } else {
                    quantile(&sorted, 0.01)
                },
                upper: quantile(&sorted, 0.99),
            },
        };
        let within = |r: &RawRecord| {
            r.number(column)
                .map(|v| v >= bounds.lower && v <= bounds.upper)
        };
        retain_ok(train, within)?;
        retain_ok(test, within)?;
        summary.bounds.push(bounds);
    }

    for split in [&mut *train, &mut *test] {
        for record in split.iter_mut() {
            let y = record.number("Production")? / record.number("Area")?;
            record.insert(YIELD_COLUMN, RawValue::Number(y));
        }
        split.retain(|r| matches!(r.get(YIELD_COLUMN), Some(RawValue::Number(y)) if y.is_finite()));
    }

    if !train.is_empty() {
        let sorted = sorted_column(train, YIELD_COLUMN)?;
        let cap = quantile(&sorted, config.yield_quantile_cap).min(config.max_reasonable_yield);
        let capped = |r: &RawRecord| r.number(YIELD_COLUMN).map(|y| y <= cap);
        retain_ok(train, capped)?;
        retain_ok(test, capped)?;
        summary.yield_cap = Some(cap);
    }

    summary.train_rows_removed = train_before - train.len();
    summary.test_rows_removed = test_before - test.len();
    Ok(summary)
}

/// `Vec::retain` with a fallible predicate.
fn retain_ok(
    records: &mut Vec<RawRecord>,
    keep: impl Fn(&RawRecord) -> Result<bool, AgriError>,
) -> Result<(), AgriError> {
    let mut kept = Vec::with_capacity(records.len());
    for record in records.drain(..) {
        if keep(&record)? {
            kept.push(record);
        }
    }
    *records = kept;
    Ok(())
}
