//! Estimators: CART trees, random forests and Gaussian naive Bayes.

pub mod decision_tree;
pub mod naive_bayes;
pub mod random_forest;

pub use decision_tree::DecisionTree;
pub use naive_bayes::GaussianNaiveBayes;
pub use random_forest::RandomForest;
