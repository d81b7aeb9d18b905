//! CART decision tree over a dense feature matrix.
//!
//! Classification trees split on Gini impurity and store the class
//! distribution of each leaf; regression trees split on variance and store
//! the leaf mean. Nodes live in a flat arena so a fitted tree serializes as a
//! plain list.

use crate::data::schema::TaskType;
use crate::error::AgriError;
use rand::Rng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Smallest impurity decrease accepted for a split.
const MIN_GAIN: f64 = 1e-12;

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Candidate features drawn at each node.
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
        /// Class probabilities; empty for regression.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Training data borrowed by a tree while it grows.
pub struct TrainingSet<'a> {
    pub rows: &'a [Vec<f64>],
    pub targets: &'a [f64],
    pub task: TaskType,
    pub n_classes: usize,
}

impl TrainingSet<'_> {
    fn n_features(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    fn class_of(&self, i: usize) -> usize {
        self.targets[i] as usize
    }
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    task: TaskType,
    n_classes: usize,
    n_features: usize,
    nodes: Vec<Node>,
    /// Total weighted impurity decrease per feature, unnormalized.
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Grow a tree on the rows named by `sample` (indices may repeat).
    pub fn fit(
        data: &TrainingSet<'_>,
        sample: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Result<Self, AgriError> {
        if sample.is_empty() {
            return Err(AgriError::training("cannot grow a tree on zero samples"));
        }
        if data.task == TaskType::Classification {
            if let Some(&bad) = sample.iter().find(|&&i| data.class_of(i) >= data.n_classes) {
                return Err(AgriError::training(format!(
                    "target {} is outside the {} known classes",
                    data.targets[bad], data.n_classes
                )));
            }
        }
        let n_features = data.n_features();
        let mut tree = Self {
            task: data.task,
            n_classes: data.n_classes,
            n_features,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        tree.grow(data, sample.to_vec(), 0, params, rng);
        Ok(tree)
    }

    fn grow(
        &mut self,
        data: &TrainingSet<'_>,
        sample: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let impurity = self.impurity(data, &sample);
        let splittable = depth < params.max_depth
            && sample.len() >= params.min_samples_split
            && impurity > MIN_GAIN;

        let choice = if splittable {
            self.best_split(data, &sample, impurity, params, rng)
        } else {
            None
        };
        let Some(choice) = choice else {
            return self.push_leaf(data, &sample);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .iter()
            .partition(|&&i| data.rows[i][choice.feature] <= choice.threshold);
        self.importances[choice.feature] += choice.gain * sample.len() as f64;

        let id = self.nodes.len();
        self.nodes.push(Node::Split {
            feature: choice.feature,
            threshold: choice.threshold,
            left: 0,
            right: 0,
        });
        let left_id = self.grow(data, left, depth + 1, params, rng);
        let right_id = self.grow(data, right, depth + 1, params, rng);
        self.nodes[id] = Node::Split {
            feature: choice.feature,
            threshold: choice.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn push_leaf(&mut self, data: &TrainingSet<'_>, sample: &[usize]) -> usize {
        let leaf = match self.task {
            TaskType::Classification => {
                let counts = self.class_counts(data, sample);
                let n = sample.len() as f64;
                let distribution: Vec<f64> = counts.iter().map(|&c| c / n).collect();
                Node::Leaf {
                    value: argmax(&distribution) as f64,
                    distribution,
                }
            }
            TaskType::Regression => Node::Leaf {
                value: sample.iter().map(|&i| data.targets[i]).sum::<f64>() / sample.len() as f64,
                distribution: Vec::new(),
            },
        };
        self.nodes.push(leaf);
        self.nodes.len() - 1
    }

    fn class_counts(&self, data: &TrainingSet<'_>, sample: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in sample {
            counts[data.class_of(i)] += 1.0;
        }
        counts
    }

    fn impurity(&self, data: &TrainingSet<'_>, sample: &[usize]) -> f64 {
        match self.task {
            TaskType::Classification => gini(&self.class_counts(data, sample), sample.len() as f64),
            TaskType::Regression => {
                let (sum, sum_sq) = sample.iter().fold((0.0, 0.0), |(s, sq), &i| {
                    let y = data.targets[i];
                    (s + y, sq + y * y)
                });
                variance(sum, sum_sq, sample.len() as f64)
            }
        }
    }

    /// Sorted sweep over a random subset of features.
    fn best_split(
        &self,
        data: &TrainingSet<'_>,
        sample: &[usize],
        parent_impurity: f64,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitChoice> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);
        features.truncate(params.max_features.max(1));

        let n = sample.len();
        if n < 2 {
            return None;
        }
        let min_leaf = params.min_samples_leaf.max(1);
        let mut best: Option<SplitChoice> = None;
        let mut order = sample.to_vec();

        for feature in features {
            order.sort_by(|&a, &b| data.rows[a][feature].total_cmp(&data.rows[b][feature]));
            let mut sweep = Sweep::new(self, data, &order);

            for pos in 0..n - 1 {
                sweep.move_left(data, order[pos]);
                let left_n = pos + 1;
                let right_n = n - left_n;
                let here = data.rows[order[pos]][feature];
                let next = data.rows[order[pos + 1]][feature];
                if here == next || left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let weighted = sweep.weighted_impurity(left_n as f64, right_n as f64);
                let gain = parent_impurity - weighted;
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(SplitChoice {
                        feature,
                        threshold: midpoint(here, next),
                        gain,
                    });
                }
            }
        }
        best
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    fn leaf_for(&self, row: &[f64]) -> Result<&Node, AgriError> {
        if row.len() != self.n_features {
            return Err(AgriError::ArtifactMismatch(format!(
                "tree expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let mut id = 0;
        loop {
            match self.nodes.get(id) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
                Some(leaf @ Node::Leaf { .. }) => return Ok(leaf),
                None => {
                    return Err(AgriError::ArtifactMismatch(format!(
                        "tree node {id} does not exist"
                    )));
                }
            }
        }
    }

    /// Leaf value: class index or regression mean.
    pub fn predict_one(&self, row: &[f64]) -> Result<f64, AgriError> {
        match self.leaf_for(row)? {
            Node::Leaf { value, .. } => Ok(*value),
            Node::Split { .. } => Err(AgriError::ArtifactMismatch("walk ended on a split".into())),
        }
    }

    /// Leaf class distribution of a classification tree.
    pub fn predict_proba_one(&self, row: &[f64]) -> Result<&[f64], AgriError> {
        match self.leaf_for(row)? {
            Node::Leaf { distribution, .. } if distribution.len() == self.n_classes => {
                Ok(distribution)
            }
            _ => Err(AgriError::ArtifactMismatch(
                "tree has no class distribution".into(),
            )),
        }
    }
}

/// Running left/right statistics while the split point moves right.
enum Sweep {
    Classes { left: Vec<f64>, right: Vec<f64> },
    Moments { left: (f64, f64), right: (f64, f64) },
}

impl Sweep {
    fn new(tree: &DecisionTree, data: &TrainingSet<'_>, order: &[usize]) -> Self {
        match tree.task {
            TaskType::Classification => Self::Classes {
                left: vec![0.0; tree.n_classes],
                right: tree.class_counts(data, order),
            },
            TaskType::Regression => {
                let right = order.iter().fold((0.0, 0.0), |(s, sq), &i| {
                    let y = data.targets[i];
                    (s + y, sq + y * y)
                });
                Self::Moments {
                    left: (0.0, 0.0),
                    right,
                }
            }
        }
    }

    fn move_left(&mut self, data: &TrainingSet<'_>, i: usize) {
        match self {
            Self::Classes { left, right } => {
                let c = data.class_of(i);
                left[c] += 1.0;
                right[c] -= 1.0;
            }
            Self::Moments { left, right } => {
                let y = data.targets[i];
                left.0 += y;
                left.1 += y * y;
                right.0 -= y;
                right.1 -= y * y;
            }
        }
    }

    fn weighted_impurity(&self, n_left: f64, n_right: f64) -> f64 {
        let (l, r) = match self {
            Self::Classes { left, right } => (gini(left, n_left), gini(right, n_right)),
            Self::Moments { left, right } => (
                variance(left.0, left.1, n_left),
                variance(right.0, right.1, n_right),
            ),
        };
        (n_left * l + n_right * r) / (n_left + n_right)
    }
}

fn gini(counts: &[f64], n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / n).powi(2)).sum::<f64>()
}

fn variance(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

fn midpoint(a: f64, b: f64) -> f64 {
    let mid = a + (b - a) / 2.0;
    // Rounding can land on `b`, which would send it left.
    if mid < b { mid } else { a }
}

/// Index of the largest value; the lowest index wins ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Draw `n` indices with replacement.
pub fn bootstrap_sample(n: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 2,
        }
    }

    #[test]
    fn test_classifier_separates_threshold() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 0.0]).collect();
        let targets: Vec<f64> = (0..10).map(|i| if i < 5 { 0.0 } else { 1.0 }).collect();
        let data = TrainingSet {
            rows: &rows,
            targets: &targets,
            task: TaskType::Classification,
            n_classes: 2,
        };
        let sample: Vec<usize> = (0..10).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(&data, &sample, &params(), &mut rng).unwrap();
        assert_eq!(tree.predict_one(&[1.0, 0.0]).unwrap(), 0.0);
        assert_eq!(tree.predict_one(&[8.0, 0.0]).unwrap(), 1.0);
        assert_eq!(tree.predict_proba_one(&[8.0, 0.0]).unwrap(), &[0.0, 1.0]);
        assert!(tree.importances()[0] > 0.0);
        assert_eq!(tree.importances()[1], 0.0);
    }

    #[test]
    fn test_regressor_fits_step() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 3.0 }).collect();
        let data = TrainingSet {
            rows: &rows,
            targets: &targets,
            task: TaskType::Regression,
            n_classes: 0,
        };
        let sample: Vec<usize> = (0..20).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(&data, &sample, &params(), &mut rng).unwrap();
        assert_eq!(tree.predict_one(&[2.0]).unwrap(), 1.0);
        assert_eq!(tree.predict_one(&[15.0]).unwrap(), 3.0);
        assert_eq!(tree.n_nodes(), 3);
    }

    #[test]
    fn test_depth_limit_makes_stump() {
        let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..8).map(|i| (i % 4) as f64).collect();
        let data = TrainingSet {
            rows: &rows,
            targets: &targets,
            task: TaskType::Classification,
            n_classes: 4,
        };
        let p = TreeParams {
            max_depth: 1,
            ..params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tree = DecisionTree::fit(&data, &(0..8).collect::<Vec<_>>(), &p, &mut rng).unwrap();
        assert!(tree.n_nodes() <= 3);
    }

    #[test]
    fn test_min_leaf_respected() {
        let rows: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let targets = vec![0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let data = TrainingSet {
            rows: &rows,
            targets: &targets,
            task: TaskType::Classification,
            n_classes: 2,
        };
        let p = TreeParams {
            min_samples_leaf: 2,
            ..params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tree = DecisionTree::fit(&data, &(0..6).collect::<Vec<_>>(), &p, &mut rng).unwrap();
        // The pure split {0} | {1..5} is forbidden, so row 0 shares a leaf.
        assert_eq!(tree.predict_proba_one(&[0.0]).unwrap(), &[0.5, 0.5]);
        assert_eq!(tree.predict_one(&[4.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_wrong_width_is_mismatch() {
        let rows = vec![vec![0.0], vec![1.0]];
        let targets = vec![0.0, 1.0];
        let data = TrainingSet {
            rows: &rows,
            targets: &targets,
            task: TaskType::Classification,
            n_classes: 2,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tree = DecisionTree::fit(&data, &[0, 1], &params(), &mut rng).unwrap();
        assert!(matches!(
            tree.predict_one(&[0.0, 1.0]),
            Err(AgriError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn test_argmax_prefers_lowest_index_on_tie() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
