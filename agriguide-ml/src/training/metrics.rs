//! Evaluation metrics for the test split.

use crate::error::AgriError;
use serde::{Deserialize, Serialize};

/// Per-class precision, recall and F1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Classification metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub per_class: Vec<ClassReport>,
    /// `confusion_matrix[actual][predicted]`, in label-encoder order.
    pub confusion_matrix: Vec<Vec<usize>>,
    /// Known classes with no row in the test split.
    pub missing_test_classes: Vec<String>,
    pub test_samples: usize,
}

impl ClassificationMetrics {
    pub fn compute(
        actual: &[usize],
        predicted: &[usize],
        labels: &[String],
    ) -> Result<Self, AgriError> {
        check_lengths(actual.len(), predicted.len())?;
        let k = labels.len();
        let mut confusion = vec![vec![0usize; k]; k];
        for (&a, &p) in actual.iter().zip(predicted) {
            if a >= k || p >= k {
                return Err(AgriError::training(format!(
                    "class code outside the {k} known labels"
                )));
            }
            confusion[a][p] += 1;
        }

        let correct: usize = (0..k).map(|c| confusion[c][c]).sum();
        let accuracy = correct as f64 / actual.len() as f64;

        let mut per_class = Vec::with_capacity(k);
        let mut missing_test_classes = Vec::new();
        for (c, label) in labels.iter().enumerate() {
            let support: usize = confusion[c].iter().sum();
            let predicted_c: usize = confusion.iter().map(|row| row[c]).sum();
            let tp = confusion[c][c] as f64;
            let precision = ratio(tp, predicted_c as f64);
            let recall = ratio(tp, support as f64);
            let f1_score = ratio(2.0 * precision * recall, precision + recall);
            if support == 0 {
                missing_test_classes.push(label.clone());
            }
            per_class.push(ClassReport {
                label: label.clone(),
                precision,
                recall,
                f1_score,
                support,
            });
        }

        // Macro averages over classes present in the test split.
        let present: Vec<&ClassReport> = per_class.iter().filter(|r| r.support > 0).collect();
        let mean = |f: fn(&ClassReport) -> f64| {
            ratio(present.iter().map(|r| f(r)).sum(), present.len() as f64)
        };

        Ok(Self {
            accuracy,
            macro_precision: mean(|r| r.precision),
            macro_recall: mean(|r| r.recall),
            macro_f1: mean(|r| r.f1_score),
            per_class,
            confusion_matrix: confusion,
            missing_test_classes,
            test_samples: actual.len(),
        })
    }
}

/// Regression metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r_squared: f64,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub test_samples: usize,
}

impl RegressionMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self, AgriError> {
        check_lengths(actual.len(), predicted.len())?;
        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;
        let (mut ss_res, mut ss_tot, mut abs) = (0.0, 0.0, 0.0);
        for (a, p) in actual.iter().zip(predicted) {
            ss_res += (a - p).powi(2);
            ss_tot += (a - mean).powi(2);
            abs += (a - p).abs();
        }
        // Constant targets: perfect predictions score 1, anything else 0.
        let r_squared = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };
        let mse = ss_res / n;
        Ok(Self {
            r_squared,
            mae: abs / n,
            mse,
            rmse: mse.sqrt(),
            test_samples: actual.len(),
        })
    }
}

/// Metrics of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum ModelMetrics {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
}

impl ModelMetrics {
    /// Accuracy for classifiers, R² for the regressor.
    pub fn headline(&self) -> (&'static str, f64) {
        match self {
            Self::Classification(m) => ("accuracy", m.accuracy),
            Self::Regression(m) => ("r_squared", m.r_squared),
        }
    }
}

fn check_lengths(actual: usize, predicted: usize) -> Result<(), AgriError> {
    if actual == 0 {
        return Err(AgriError::training("test split is empty; nothing to evaluate"));
    }
    if actual != predicted {
        return Err(AgriError::training(format!(
            "{actual} targets but {predicted} predictions"
        )));
    }
    Ok(())
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}
