//! Per-family column schemas and the raw record type they validate.

use crate::error::AgriError;
use crate::features::derived::DerivedFeature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One of the three independent model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Crop,
    Yield,
    Fertilizer,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Crop, Family::Yield, Family::Fertilizer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crop => "crop",
            Self::Yield => "yield",
            Self::Fertilizer => "fertilizer",
        }
    }

    pub fn task(&self) -> TaskType {
        match self {
            Self::Crop | Self::Fertilizer => TaskType::Classification,
            Self::Yield => TaskType::Regression,
        }
    }

    /// The fixed source schema of this family.
    pub fn schema(&self) -> FamilySchema {
        match self {
            Self::Crop => FamilySchema {
                family: *self,
                columns: vec![
                    ColumnSchema::numeric("N"),
                    ColumnSchema::numeric("P"),
                    ColumnSchema::numeric("K"),
                    ColumnSchema::numeric("temperature"),
                    ColumnSchema::numeric("humidity"),
                    ColumnSchema::numeric("ph"),
                    ColumnSchema::numeric("rainfall"),
                    ColumnSchema::new("label", ColumnRole::Label),
                ],
                derived: DerivedFeature::CROP.to_vec(),
            },
            Self::Yield => FamilySchema {
                family: *self,
                columns: vec![
                    ColumnSchema::categorical("State_Name", CategoricalEncoding::OneHot),
                    ColumnSchema::new("District_Name", ColumnRole::Context),
                    ColumnSchema::new("Crop_Year", ColumnRole::Context),
                    ColumnSchema::categorical("Season", CategoricalEncoding::OneHot),
                    ColumnSchema::categorical("Crop", CategoricalEncoding::OneHot),
                    ColumnSchema::numeric("Area"),
                    ColumnSchema::new("Production", ColumnRole::Target),
                ],
                derived: Vec::new(),
            },
            Self::Fertilizer => FamilySchema {
                family: *self,
                columns: vec![
                    ColumnSchema::numeric("Temparature"),
                    ColumnSchema::numeric("Humidity"),
                    ColumnSchema::numeric("Moisture"),
                    ColumnSchema::categorical("Soil Type", CategoricalEncoding::Label),
                    ColumnSchema::categorical("Crop Type", CategoricalEncoding::Label),
                    ColumnSchema::numeric("Nitrogen"),
                    ColumnSchema::numeric("Potassium"),
                    ColumnSchema::numeric("Phosphorous"),
                    ColumnSchema::new("Fertilizer Name", ColumnRole::Label),
                ],
                derived: Vec::new(),
            },
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Family {
    type Err = AgriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crop" => Ok(Self::Crop),
            "yield" => Ok(Self::Yield),
            "fertilizer" => Ok(Self::Fertilizer),
            other => Err(AgriError::config(format!("unknown family '{other}'"))),
        }
    }
}

/// Supervised task solved by a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Classification,
    Regression,
}

/// How a categorical column becomes numeric features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalEncoding {
    /// Single integer code per category.
    Label,
    /// One indicator feature per category.
    OneHot,
}

/// What a column is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ColumnRole {
    Numeric,
    Categorical { encoding: CategoricalEncoding },
    /// Class label of a classifier family.
    Label,
    /// Numeric target of the regressor family.
    Target,
    /// Required in the source, not a model input.
    Context,
}

impl ColumnRole {
    pub fn is_feature(&self) -> bool {
        matches!(self, Self::Numeric | Self::Categorical { .. })
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub role: ColumnRole,
}

impl ColumnSchema {
    pub fn new(name: &str, role: ColumnRole) -> Self {
        Self {
            name: name.to_string(),
            role,
        }
    }

    pub fn numeric(name: &str) -> Self {
        Self::new(name, ColumnRole::Numeric)
    }

    pub fn categorical(name: &str, encoding: CategoricalEncoding) -> Self {
        Self::new(name, ColumnRole::Categorical { encoding })
    }
}

/// Full schema of a family's source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySchema {
    pub family: Family,
    pub columns: Vec<ColumnSchema>,
    /// Features computed from raw columns after validation.
    pub derived: Vec<DerivedFeature>,
}

/// Reason a source row was rejected during validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RowRejection {
    /// Row has a different number of cells than the header.
    RaggedRow,
    NonNumeric { column: String },
    NonFinite { column: String },
    EmptyValue { column: String },
}

impl FamilySchema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.role == ColumnRole::Numeric)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn categorical_columns(&self) -> Vec<(&str, CategoricalEncoding)> {
        self.columns
            .iter()
            .filter_map(|c| match c.role {
                ColumnRole::Categorical { encoding } => Some((c.name.as_str(), encoding)),
                _ => None,
            })
            .collect()
    }

    /// The label column (classifiers) or target column (regressor).
    pub fn target_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| matches!(c.role, ColumnRole::Label | ColumnRole::Target))
            .map(|c| c.name.as_str())
    }

    /// Check a source header against the schema.
    ///
    /// Missing columns are always an error; unexpected columns are an error
    /// unless `allow_extra` is set.
    pub fn check_header(&self, header: &[String], allow_extra: bool) -> Result<(), AgriError> {
        let missing: Vec<&str> = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|name| !header.iter().any(|h| h == name))
            .collect();
        if !missing.is_empty() {
            return Err(AgriError::schema(format!(
                "{} source is missing required columns: {}",
                self.family,
                missing.join(", ")
            )));
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = header.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(AgriError::schema(format!(
                "{} source has duplicate column '{dup}'",
                self.family
            )));
        }

        if !allow_extra {
            let extra: Vec<&str> = header
                .iter()
                .map(String::as_str)
                .filter(|h| self.column(h).is_none())
                .collect();
            if !extra.is_empty() {
                return Err(AgriError::schema(format!(
                    "{} source has unexpected columns: {}",
                    self.family,
                    extra.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Parse one source row into a typed record, or say why it is rejected.
    ///
    /// `header` must already have passed [`FamilySchema::check_header`].
    pub fn parse_row(&self, header: &[String], row: &[String]) -> Result<RawRecord, RowRejection> {
        if header.len() != row.len() {
            return Err(RowRejection::RaggedRow);
        }

        let mut record = RawRecord::new();
        for column in &self.columns {
            let Some(idx) = header.iter().position(|h| h == &column.name) else {
                return Err(RowRejection::EmptyValue {
                    column: column.name.clone(),
                });
            };
            let cell = row[idx].trim();
            let value = match column.role {
                ColumnRole::Numeric | ColumnRole::Target => {
                    let parsed: f64 = cell.parse().map_err(|_| RowRejection::NonNumeric {
                        column: column.name.clone(),
                    })?;
                    if !parsed.is_finite() {
                        return Err(RowRejection::NonFinite {
                            column: column.name.clone(),
                        });
                    }
                    RawValue::Number(parsed)
                }
                ColumnRole::Categorical { .. } | ColumnRole::Label => {
                    if cell.is_empty() {
                        return Err(RowRejection::EmptyValue {
                            column: column.name.clone(),
                        });
                    }
                    RawValue::Text(cell.to_string())
                }
                ColumnRole::Context => RawValue::Text(cell.to_string()),
            };
            record.insert(&column.name, value);
        }
        Ok(record)
    }

    /// Check a serving-time record: every feature column present, no column
    /// outside the schema. Label, target and context columns are optional.
    pub fn check_inference_record(&self, record: &RawRecord) -> Result<(), AgriError> {
        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.role.is_feature() && !record.contains(&c.name))
            .map(|c| c.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AgriError::schema(format!(
                "{} input is missing features: {}",
                self.family,
                missing.join(", ")
            )));
        }

        let unknown: Vec<&str> = record
            .keys()
            .filter(|k| self.column(k).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(AgriError::schema(format!(
                "{} input has unknown fields: {}",
                self.family,
                unknown.join(", ")
            )));
        }
        Ok(())
    }
}

/// A single raw cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    pub fn to_cell(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One row of raw input, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<RawValue>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn insert(&mut self, column: &str, value: RawValue) {
        self.fields.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.fields.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Read a numeric cell. Text that does not parse to a finite float is a
    /// transformation error, never a silent zero.
    pub fn number(&self, column: &str) -> Result<f64, AgriError> {
        let value = match self.fields.get(column) {
            Some(RawValue::Number(n)) => *n,
            Some(RawValue::Text(s)) => s.trim().parse::<f64>().map_err(|_| {
                AgriError::transformation(format!("column '{column}' is not numeric: '{s}'"))
            })?,
            None => {
                return Err(AgriError::schema(format!("missing column '{column}'")));
            }
        };
        if !value.is_finite() {
            return Err(AgriError::transformation(format!(
                "column '{column}' is not finite: {value}"
            )));
        }
        Ok(value)
    }

    /// Read a categorical cell, trimmed.
    pub fn text(&self, column: &str) -> Result<String, AgriError> {
        match self.fields.get(column) {
            Some(RawValue::Text(s)) => Ok(s.trim().to_string()),
            Some(RawValue::Number(n)) => Ok(n.to_string()),
            None => Err(AgriError::schema(format!("missing column '{column}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let schema = Family::Crop.schema();
        let h = header(&["N", "P", "K", "temperature", "humidity", "ph", "label"]);
        let err = schema.check_header(&h, false).unwrap_err();
        assert!(matches!(err, AgriError::Schema(_)));
        assert!(err.to_string().contains("rainfall"));
    }

    #[test]
    fn test_extra_column_rejected_unless_allowed() {
        let schema = Family::Crop.schema();
        let mut h = schema.column_names();
        h.push("notes".into());
        assert!(matches!(
            schema.check_header(&h, false),
            Err(AgriError::Schema(_))
        ));
        assert!(schema.check_header(&h, true).is_ok());
    }

    #[test]
    fn test_parse_row_rejects_non_numeric_and_nan() {
        let schema = Family::Crop.schema();
        let h = schema.column_names();
        let row = |n: &str| -> Vec<String> {
            vec![n, "40", "40", "25.1", "80", "6.5", "200", "rice"]
                .into_iter()
                .map(String::from)
                .collect()
        };
        assert!(schema.parse_row(&h, &row("90")).is_ok());
        assert_eq!(
            schema.parse_row(&h, &row("abc")).unwrap_err(),
            RowRejection::NonNumeric { column: "N".into() }
        );
        assert_eq!(
            schema.parse_row(&h, &row("NaN")).unwrap_err(),
            RowRejection::NonFinite { column: "N".into() }
        );
    }

    #[test]
    fn test_parse_row_rejects_empty_label() {
        let schema = Family::Crop.schema();
        let h = schema.column_names();
        let row: Vec<String> = vec!["1", "2", "3", "4", "5", "6", "7", "  "]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            schema.parse_row(&h, &row).unwrap_err(),
            RowRejection::EmptyValue {
                column: "label".into()
            }
        );
    }

    #[test]
    fn test_inference_record_checks() {
        let schema = Family::Fertilizer.schema();
        let record = RawRecord::new()
            .with("Temparature", 26.0)
            .with("Humidity", 52.0)
            .with("Moisture", 38.0)
            .with("Soil Type", "Sandy")
            .with("Crop Type", "Maize")
            .with("Nitrogen", 37.0)
            .with("Potassium", 0.0);
        let err = schema.check_inference_record(&record).unwrap_err();
        assert!(err.to_string().contains("Phosphorous"));

        let complete = record.clone().with("Phosphorous", 0.0);
        assert!(schema.check_inference_record(&complete).is_ok());

        let extra = complete.with("Colour", "red");
        assert!(matches!(
            schema.check_inference_record(&extra),
            Err(AgriError::Schema(_))
        ));
    }

    #[test]
    fn test_record_number_from_text() {
        let record = RawRecord::new().with("Area", "12.5").with("Crop", "Rice");
        assert_eq!(record.number("Area").unwrap(), 12.5);
        assert!(matches!(
            record.number("Crop"),
            Err(AgriError::Transformation(_))
        ));
    }

    #[test]
    fn test_family_roundtrip() {
        for family in Family::ALL {
            assert_eq!(family.as_str().parse::<Family>().unwrap(), family);
        }
        assert!("orchard".parse::<Family>().is_err());
    }
}
