//! Dense feature matrix handed from transformation to training.

use crate::error::AgriError;
use serde::{Deserialize, Serialize};

/// Transformed rows plus their targets (class codes or continuous values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            rows: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<f64>, target: f64) -> Result<(), AgriError> {
        if row.len() != self.feature_names.len() {
            return Err(AgriError::transformation(format!(
                "row has {} features, matrix expects {}",
                row.len(),
                self.feature_names.len()
            )));
        }
        self.rows.push(row);
        self.targets.push(target);
        Ok(())
    }

    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Targets as class indices. Fails on negative or fractional codes.
    pub fn class_targets(&self) -> Result<Vec<usize>, AgriError> {
        self.targets
            .iter()
            .map(|t| {
                if *t >= 0.0 && t.fract() == 0.0 {
                    Ok(*t as usize)
                } else {
                    Err(AgriError::training(format!("target {t} is not a class code")))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_checks_width() {
        let mut m = FeatureMatrix::new(vec!["a".into(), "b".into()]);
        assert!(m.push(vec![1.0, 2.0], 0.0).is_ok());
        assert!(m.push(vec![1.0], 0.0).is_err());
        assert_eq!(m.n_samples(), 1);
    }

    #[test]
    fn test_class_targets() {
        let mut m = FeatureMatrix::new(vec!["a".into()]);
        m.push(vec![0.0], 2.0).unwrap();
        assert_eq!(m.class_targets().unwrap(), vec![2]);
        m.push(vec![0.0], 0.5).unwrap();
        assert!(m.class_targets().is_err());
    }
}
