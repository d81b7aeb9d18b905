//! Bagged ensemble of CART trees.
//!
//! Tree `i` draws its bootstrap sample and feature subsets from a
//! `ChaCha8Rng` seeded with `seed + i`, so a fixed config and matrix always
//! grow the same forest.

use crate::algorithms::decision_tree::{
    DecisionTree, TrainingSet, TreeParams, argmax, bootstrap_sample,
};
use crate::config::ForestConfig;
use crate::data::schema::TaskType;
use crate::error::AgriError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    task: TaskType,
    n_classes: usize,
    n_features: usize,
    params: TreeParams,
    trees: Vec<DecisionTree>,
    /// Normalized mean impurity decrease per feature.
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Fit a classifier on class-coded targets `0..n_classes`.
    pub fn fit_classifier(
        rows: &[Vec<f64>],
        classes: &[usize],
        n_classes: usize,
        config: &ForestConfig,
    ) -> Result<Self, AgriError> {
        let targets: Vec<f64> = classes.iter().map(|&c| c as f64).collect();
        Self::fit(rows, &targets, TaskType::Classification, n_classes, config)
    }

    pub fn fit_regressor(
        rows: &[Vec<f64>],
        targets: &[f64],
        config: &ForestConfig,
    ) -> Result<Self, AgriError> {
        Self::fit(rows, targets, TaskType::Regression, 0, config)
    }

    fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        task: TaskType,
        n_classes: usize,
        config: &ForestConfig,
    ) -> Result<Self, AgriError> {
        if rows.is_empty() {
            return Err(AgriError::training("training matrix is empty"));
        }
        if rows.len() != targets.len() {
            return Err(AgriError::training(format!(
                "{} rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        if config.n_trees == 0 {
            return Err(AgriError::training("forest needs at least one tree"));
        }
        let n_features = rows[0].len();
        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: config.max_features.resolve(n_features),
        };
        let data = TrainingSet {
            rows,
            targets,
            task,
            n_classes,
        };

        let mut trees = Vec::with_capacity(config.n_trees);
        for i in 0..config.n_trees {
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
            let sample = bootstrap_sample(rows.len(), &mut rng);
            trees.push(DecisionTree::fit(&data, &sample, &params, &mut rng)?);
        }

        let mut feature_importances = vec![0.0; n_features];
        for tree in &trees {
            let total: f64 = tree.importances().iter().sum();
            if total > 0.0 {
                for (acc, imp) in feature_importances.iter_mut().zip(tree.importances()) {
                    *acc += imp / total;
                }
            }
        }
        let sum: f64 = feature_importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut feature_importances {
                *imp /= sum;
            }
        }

        Ok(Self {
            task,
            n_classes,
            n_features,
            params,
            trees,
            feature_importances,
        })
    }

    pub fn task(&self) -> TaskType {
        self.task
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Mean of the trees' leaf distributions.
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, AgriError> {
        if self.task != TaskType::Classification {
            return Err(AgriError::ArtifactMismatch(
                "class probabilities requested from a regressor".into(),
            ));
        }
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba_one(row)?) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        for p in &mut proba {
            *p /= n;
        }
        Ok(proba)
    }

    /// Class index (classifier) or mean tree prediction (regressor).
    pub fn predict(&self, row: &[f64]) -> Result<f64, AgriError> {
        match self.task {
            TaskType::Classification => Ok(argmax(&self.predict_proba(row)?) as f64),
            TaskType::Regression => {
                let mut sum = 0.0;
                for tree in &self.trees {
                    sum += tree.predict_one(row)?;
                }
                Ok(sum / self.trees.len() as f64)
            }
        }
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, AgriError> {
        rows.iter().map(|r| self.predict(r)).collect()
    }
}
