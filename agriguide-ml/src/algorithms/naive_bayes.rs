//! Gaussian naive Bayes classifier.

use crate::algorithms::decision_tree::argmax;
use crate::error::AgriError;
use serde::{Deserialize, Serialize};

/// Fraction of the largest feature variance added to every variance.
const VAR_SMOOTHING: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Log prior per class.
    log_priors: Vec<f64>,
    /// `means[class][feature]`
    means: Vec<Vec<f64>>,
    /// `variances[class][feature]`, smoothed.
    variances: Vec<Vec<f64>>,
}

impl GaussianNaiveBayes {
    /// Fit on class-coded targets. Classes absent from the training rows get
    /// a prior of zero and are never predicted.
    pub fn fit(rows: &[Vec<f64>], classes: &[usize], n_classes: usize) -> Result<Self, AgriError> {
        if rows.is_empty() || rows.len() != classes.len() {
            return Err(AgriError::training(
                "naive Bayes needs a non-empty matrix with one class per row",
            ));
        }
        let width = rows[0].len();
        let mut counts = vec![0usize; n_classes];
        let mut means = vec![vec![0.0; width]; n_classes];
        for (row, &c) in rows.iter().zip(classes) {
            if c >= n_classes {
                return Err(AgriError::training(format!("class {c} out of range")));
            }
            counts[c] += 1;
            for (m, v) in means[c].iter_mut().zip(row) {
                *m += v;
            }
        }
        for (mean, &n) in means.iter_mut().zip(&counts) {
            if n > 0 {
                mean.iter_mut().for_each(|m| *m /= n as f64);
            }
        }

        let mut variances = vec![vec![0.0; width]; n_classes];
        for (row, &c) in rows.iter().zip(classes) {
            for ((acc, v), m) in variances[c].iter_mut().zip(row).zip(&means[c]) {
                *acc += (v - m).powi(2);
            }
        }
        for (var, &n) in variances.iter_mut().zip(&counts) {
            if n > 0 {
                var.iter_mut().for_each(|v| *v /= n as f64);
            }
        }

        let epsilon = VAR_SMOOTHING * overall_max_variance(rows).max(f64::MIN_POSITIVE);
        for var in &mut variances {
            var.iter_mut().for_each(|v| *v += epsilon);
        }

        let total = rows.len() as f64;
        let log_priors = counts
            .iter()
            .map(|&n| {
                if n == 0 {
                    f64::NEG_INFINITY
                } else {
                    (n as f64 / total).ln()
                }
            })
            .collect();

        Ok(Self {
            log_priors,
            means,
            variances,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.log_priors.len()
    }

    /// Posterior class probabilities.
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, AgriError> {
        let width = self.means.first().map_or(0, Vec::len);
        if row.len() != width {
            return Err(AgriError::ArtifactMismatch(format!(
                "naive Bayes expects {width} features, got {}",
                row.len()
            )));
        }
        let joint: Vec<f64> = self
            .log_priors
            .iter()
            .zip(self.means.iter().zip(&self.variances))
            .map(|(prior, (mean, var))| {
                if prior.is_infinite() {
                    return f64::NEG_INFINITY;
                }
                let log_likelihood: f64 = row
                    .iter()
                    .zip(mean.iter().zip(var))
                    .map(|(x, (m, v))| {
                        -0.5 * (2.0 * std::f64::consts::PI * v).ln() - (x - m).powi(2) / (2.0 * v)
                    })
                    .sum();
                prior + log_likelihood
            })
            .collect();

        let max = joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = joint.iter().map(|j| (j - max).exp()).collect();
        let sum: f64 = exp.iter().sum();
        Ok(exp.into_iter().map(|e| e / sum).collect())
    }

    pub fn predict(&self, row: &[f64]) -> Result<usize, AgriError> {
        Ok(argmax(&self.predict_proba(row)?))
    }
}

fn overall_max_variance(rows: &[Vec<f64>]) -> f64 {
    let n = rows.len() as f64;
    let width = rows[0].len();
    (0..width)
        .map(|j| {
            let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
            rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separates_gaussian_blobs() {
        let rows = vec![
            vec![0.0, 0.1],
            vec![0.2, -0.1],
            vec![-0.1, 0.0],
            vec![5.0, 5.1],
            vec![5.2, 4.9],
            vec![4.9, 5.0],
        ];
        let classes = vec![0, 0, 0, 1, 1, 1];
        let nb = GaussianNaiveBayes::fit(&rows, &classes, 2).unwrap();
        assert_eq!(nb.predict(&[0.1, 0.0]).unwrap(), 0);
        assert_eq!(nb.predict(&[5.0, 5.0]).unwrap(), 1);
        let proba = nb.predict_proba(&[2.5, 2.5]).unwrap();
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_absent_class_never_predicted() {
        let rows = vec![vec![1.0], vec![1.2], vec![3.0]];
        let classes = vec![0, 0, 2];
        let nb = GaussianNaiveBayes::fit(&rows, &classes, 3).unwrap();
        let proba = nb.predict_proba(&[2.0]).unwrap();
        assert_eq!(proba[1], 0.0);
        assert_eq!(nb.n_classes(), 3);
    }

    #[test]
    fn test_constant_feature_does_not_divide_by_zero() {
        let rows = vec![vec![1.0, 7.0], vec![2.0, 7.0], vec![9.0, 7.0], vec![10.0, 7.0]];
        let classes = vec![0, 0, 1, 1];
        let nb = GaussianNaiveBayes::fit(&rows, &classes, 2).unwrap();
        let proba = nb.predict_proba(&[1.5, 7.0]).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
        assert_eq!(argmax(&proba), 0);
    }
}
