//! Standardization with frozen training statistics.

use crate::error::AgriError;
use serde::{Deserialize, Serialize};

/// Per-column mean and scale, fitted once on the training split.
///
/// Uses the population standard deviation. Columns with zero variance keep a
/// scale of `1.0` so they pass through centred but unscaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on rows of `columns.len()` values each.
    pub fn fit(columns: Vec<String>, rows: &[Vec<f64>]) -> Result<Self, AgriError> {
        if rows.is_empty() {
            return Err(AgriError::transformation(
                "cannot fit scaler on an empty training split",
            ));
        }
        let width = columns.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(AgriError::transformation(format!(
                "scaler expects {width} values per row, got {}",
                bad.len()
            )));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; width];
        for row in rows {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std > f64::EPSILON { std } else { 1.0 }
            })
            .collect();

        Ok(Self {
            columns,
            mean,
            scale,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn transform(&self, values: &[f64]) -> Result<Vec<f64>, AgriError> {
        self.check_width(values)?;
        Ok(values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>, AgriError> {
        self.check_width(values)?;
        Ok(values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| v * s + m)
            .collect())
    }

    fn check_width(&self, values: &[f64]) -> Result<(), AgriError> {
        if values.len() != self.columns.len() {
            return Err(AgriError::transformation(format!(
                "scaler expects {} values, got {}",
                self.columns.len(),
                values.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn test_fit_statistics() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let scaler = StandardScaler::fit(cols(2), &rows).unwrap();
        assert_eq!(scaler.mean(), &[2.0, 10.0]);
        assert_eq!(scaler.scale(), &[1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 12.0]).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let rows = vec![vec![4.2, -1.0], vec![8.9, 3.5], vec![0.3, 7.25]];
        let scaler = StandardScaler::fit(cols(2), &rows).unwrap();
        let original = [5.5, 2.0];
        let scaled = scaler.transform(&original).unwrap();
        let back = scaler.inverse_transform(&scaled).unwrap();
        for (a, b) in original.iter().zip(&back) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_width_mismatch_is_error() {
        let scaler = StandardScaler::fit(cols(1), &[vec![1.0], vec![2.0]]).unwrap();
        assert!(scaler.transform(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_empty_fit_fails() {
        assert!(StandardScaler::fit(cols(1), &[]).is_err());
    }
}
