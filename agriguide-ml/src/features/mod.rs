//! Feature engineering: cleaning, derived features, encoders, scaling and
//! the fitted transformer shared by training and inference.

pub mod cleaning;
pub mod derived;
pub mod encoder;
pub mod matrix;
pub mod scaler;
pub mod transformation;
pub mod transformer;

pub use derived::DerivedFeature;
pub use encoder::{ColumnEncoder, LabelEncoder, OneHotEncoder};
pub use matrix::FeatureMatrix;
pub use scaler::StandardScaler;
pub use transformation::DataTransformation;
pub use transformer::{FeatureContract, FittedTransformer, SlotEncoding};
