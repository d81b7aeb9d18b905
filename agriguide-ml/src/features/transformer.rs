//! The fitted per-family transformer and its feature-vector contract.
//!
//! A [`FittedTransformer`] is built once from the training split and never
//! mutated afterwards. Training matrices, evaluation matrices and serving-time
//! feature vectors all go through [`FittedTransformer::transform`], so the
//! three paths cannot drift apart.

use crate::data::schema::{
    CategoricalEncoding, ColumnRole, Family, FamilySchema, RawRecord, TaskType,
};
use crate::error::AgriError;
use crate::features::encoder::{ColumnEncoder, LabelEncoder, OneHotEncoder};
use crate::features::matrix::FeatureMatrix;
use crate::features::scaler::StandardScaler;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How one position of the feature vector is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum SlotEncoding {
    /// Raw numeric column, standardized.
    Standardized { column: String },
    /// Derived feature, standardized.
    DerivedStandardized { feature: String },
    /// Integer code of a categorical column.
    LabelCode { column: String },
    /// Indicator of one category of a categorical column.
    OneHot { column: String, category: String },
}

/// Ordered feature names, their encodings, and a fingerprint of the frozen
/// statistics behind them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureContract {
    pub family: Family,
    pub feature_names: Vec<String>,
    pub slots: Vec<SlotEncoding>,
    pub fingerprint: String,
}

impl FeatureContract {
    pub fn width(&self) -> usize {
        self.feature_names.len()
    }
}

/// What the model learns to predict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetEncoding {
    /// Class label encoded to its sorted index.
    Label(LabelEncoder),
    /// Continuous value read from a numeric column.
    Continuous { column: String },
}

/// Encoders, scaler and contract for one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransformer {
    schema: FamilySchema,
    encoders: Vec<ColumnEncoder>,
    scaler: StandardScaler,
    target: TargetEncoding,
    contract: FeatureContract,
}

impl FittedTransformer {
    /// Fit encoders, scaler and target encoding on training records.
    ///
    /// `target_column` is the label column for classifiers or the continuous
    /// target (possibly derived during cleaning) for the regressor.
    pub fn fit(
        schema: &FamilySchema,
        train: &[RawRecord],
        target_column: &str,
    ) -> Result<Self, AgriError> {
        if train.is_empty() {
            return Err(AgriError::empty_dataset(format!(
                "no {} training rows to fit the transformer on",
                schema.family
            )));
        }

        let mut encoders = Vec::new();
        for (column, encoding) in schema.categorical_columns() {
            let values = train
                .iter()
                .map(|r| r.text(column))
                .collect::<Result<Vec<_>, _>>()?;
            let observed = values.iter().map(String::as_str);
            let encoder = match encoding {
                CategoricalEncoding::Label => {
                    ColumnEncoder::Label(LabelEncoder::fit(column, observed)?)
                }
                CategoricalEncoding::OneHot => {
                    ColumnEncoder::OneHot(OneHotEncoder::fit(column, observed)?)
                }
            };
            encoders.push(encoder);
        }

        let scaled_names = scaled_feature_names(schema);
        let numeric_rows = train
            .iter()
            .map(|r| numeric_values(schema, r))
            .collect::<Result<Vec<_>, _>>()?;
        let scaler = StandardScaler::fit(scaled_names, &numeric_rows)?;

        let target = match schema.family.task() {
            TaskType::Classification => {
                let labels = train
                    .iter()
                    .map(|r| r.text(target_column))
                    .collect::<Result<Vec<_>, _>>()?;
                TargetEncoding::Label(LabelEncoder::fit(
                    target_column,
                    labels.iter().map(String::as_str),
                )?)
            }
            TaskType::Regression => TargetEncoding::Continuous {
                column: target_column.to_string(),
            },
        };

        let contract = build_contract(schema, &encoders, &scaler, &target)?;
        Ok(Self {
            schema: schema.clone(),
            encoders,
            scaler,
            target,
            contract,
        })
    }

    pub fn family(&self) -> Family {
        self.schema.family
    }

    pub fn schema(&self) -> &FamilySchema {
        &self.schema
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn encoders(&self) -> &[ColumnEncoder] {
        &self.encoders
    }

    pub fn target(&self) -> &TargetEncoding {
        &self.target
    }

    /// Label encoder of a classifier family.
    pub fn label_encoder(&self) -> Option<&LabelEncoder> {
        match &self.target {
            TargetEncoding::Label(enc) => Some(enc),
            TargetEncoding::Continuous { .. } => None,
        }
    }

    /// Known categories of a categorical input column.
    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.encoders
            .iter()
            .find(|e| e.column() == column)
            .map(ColumnEncoder::categories)
    }

    /// Build the feature vector for one record using the frozen statistics.
    pub fn transform(&self, record: &RawRecord) -> Result<Vec<f64>, AgriError> {
        let scaled = self.scaler.transform(&numeric_values(&self.schema, record)?)?;
        let mut scaled = scaled.into_iter();
        let mut encoders = self.encoders.iter();
        let mut out = Vec::with_capacity(self.contract.width());

        for column in &self.schema.columns {
            match column.role {
                ColumnRole::Numeric => out.push(next_scaled(&mut scaled)?),
                ColumnRole::Categorical { .. } => {
                    let encoder = encoders.next().ok_or_else(|| {
                        AgriError::ArtifactMismatch("transformer has too few encoders".into())
                    })?;
                    encoder.encode_into(&record.text(&column.name)?, &mut out)?;
                }
                _ => {}
            }
        }
        for _ in &self.schema.derived {
            out.push(next_scaled(&mut scaled)?);
        }

        if out.len() != self.contract.width() {
            return Err(AgriError::ArtifactMismatch(format!(
                "built {} features, contract declares {}",
                out.len(),
                self.contract.width()
            )));
        }
        Ok(out)
    }

    /// Validate a serving-time record against the schema, then transform it.
    pub fn transform_input(&self, record: &RawRecord) -> Result<Vec<f64>, AgriError> {
        self.schema.check_inference_record(record)?;
        self.transform(record)
    }

    /// Encode the training target of a record.
    pub fn encode_target(&self, record: &RawRecord) -> Result<f64, AgriError> {
        match &self.target {
            TargetEncoding::Label(enc) => Ok(enc.encode(&record.text(enc.column())?)? as f64),
            TargetEncoding::Continuous { column } => record.number(column),
        }
    }

    /// Transform records into a matrix. With `drop_unknown`, rows carrying a
    /// category outside the fitted domain are skipped and counted instead of
    /// failing the whole matrix.
    pub fn transform_records(
        &self,
        records: &[RawRecord],
        drop_unknown: bool,
    ) -> Result<(FeatureMatrix, usize), AgriError> {
        let mut matrix = FeatureMatrix::new(self.contract.feature_names.clone());
        let mut dropped = 0;
        for record in records {
            let row = self.transform(record).and_then(|row| {
                let target = self.encode_target(record)?;
                Ok((row, target))
            });
            match row {
                Ok((row, target)) => matrix.push(row, target)?,
                Err(AgriError::UnknownCategory { column, value }) if drop_unknown => {
                    tracing::debug!(family = %self.family(), %column, %value, "dropping row with unseen category");
                    dropped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((matrix, dropped))
    }
}

fn next_scaled(scaled: &mut impl Iterator<Item = f64>) -> Result<f64, AgriError> {
    scaled
        .next()
        .ok_or_else(|| AgriError::ArtifactMismatch("scaler has too few columns".into()))
}

/// Raw numeric columns in schema order, then derived features.
fn scaled_feature_names(schema: &FamilySchema) -> Vec<String> {
    schema
        .numeric_columns()
        .into_iter()
        .map(str::to_string)
        .chain(schema.derived.iter().map(|d| d.name().to_string()))
        .collect()
}

fn numeric_values(schema: &FamilySchema, record: &RawRecord) -> Result<Vec<f64>, AgriError> {
    let mut values = schema
        .numeric_columns()
        .into_iter()
        .map(|c| record.number(c))
        .collect::<Result<Vec<_>, _>>()?;
    for derived in &schema.derived {
        values.push(derived.compute(record)?);
    }
    Ok(values)
}

fn build_contract(
    schema: &FamilySchema,
    encoders: &[ColumnEncoder],
    scaler: &StandardScaler,
    target: &TargetEncoding,
) -> Result<FeatureContract, AgriError> {
    let mut names = Vec::new();
    let mut slots = Vec::new();
    let mut encoders = encoders.iter();

    for column in &schema.columns {
        match column.role {
            ColumnRole::Numeric => {
                names.push(column.name.clone());
                slots.push(SlotEncoding::Standardized {
                    column: column.name.clone(),
                });
            }
            ColumnRole::Categorical { .. } => {
                let Some(encoder) = encoders.next() else {
                    return Err(AgriError::transformation("encoder missing for categorical column"));
                };
                match encoder {
                    ColumnEncoder::Label(_) => {
                        names.push(column.name.clone());
                        slots.push(SlotEncoding::LabelCode {
                            column: column.name.clone(),
                        });
                    }
                    ColumnEncoder::OneHot(enc) => {
                        names.extend(enc.feature_names());
                        slots.extend(enc.categories().iter().map(|c| SlotEncoding::OneHot {
                            column: column.name.clone(),
                            category: c.clone(),
                        }));
                    }
                }
            }
            _ => {}
        }
    }
    for derived in &schema.derived {
        names.push(derived.name().to_string());
        slots.push(SlotEncoding::DerivedStandardized {
            feature: derived.name().to_string(),
        });
    }

    let mut hasher = Sha256::new();
    hasher.update(schema.family.as_str().as_bytes());
    hasher.update(serde_json::to_vec(&slots)?);
    for (m, s) in scaler.mean().iter().zip(scaler.scale()) {
        hasher.update(m.to_le_bytes());
        hasher.update(s.to_le_bytes());
    }
    hasher.update(serde_json::to_vec(target)?);

    Ok(FeatureContract {
        family: schema.family,
        feature_names: names,
        slots,
        fingerprint: format!("{:x}", hasher.finalize()),
    })
}
