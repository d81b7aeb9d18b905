//! Categorical encoders with a frozen, sorted category domain.

use crate::error::AgriError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maps each category to its index in the sorted list of categories seen
/// while fitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    column: String,
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit over the observed values. Values are trimmed before fitting.
    pub fn fit<'a>(
        column: &str,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, AgriError> {
        let classes: BTreeSet<String> = values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if classes.is_empty() {
            return Err(AgriError::transformation(format!(
                "cannot fit encoder for '{column}': no categories observed"
            )));
        }
        Ok(Self {
            column: column.to_string(),
            classes: classes.into_iter().collect(),
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, value: &str) -> Result<usize, AgriError> {
        let value = value.trim();
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map_err(|_| AgriError::unknown_category(&self.column, value))
    }

    pub fn decode(&self, code: usize) -> Result<&str, AgriError> {
        self.classes.get(code).map(String::as_str).ok_or_else(|| {
            AgriError::transformation(format!(
                "code {code} is outside the {} categories of '{}'",
                self.classes.len(),
                self.column
            ))
        })
    }
}

/// One indicator per category, in sorted category order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: LabelEncoder,
}

impl OneHotEncoder {
    pub fn fit<'a>(
        column: &str,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, AgriError> {
        Ok(Self {
            categories: LabelEncoder::fit(column, values)?,
        })
    }

    pub fn column(&self) -> &str {
        self.categories.column()
    }

    pub fn categories(&self) -> &[String] {
        self.categories.classes()
    }

    /// Feature names, `<column>_<category>` like pandas dummies.
    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .classes()
            .iter()
            .map(|c| format!("{}_{}", self.column(), c))
            .collect()
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Append the indicator block for `value` to `out`.
    pub fn encode_into(&self, value: &str, out: &mut Vec<f64>) -> Result<(), AgriError> {
        let hot = self.categories.encode(value)?;
        out.extend((0..self.width()).map(|i| if i == hot { 1.0 } else { 0.0 }));
        Ok(())
    }

    /// Recover the category from an indicator block.
    pub fn decode(&self, block: &[f64]) -> Result<&str, AgriError> {
        if block.len() != self.width() {
            return Err(AgriError::transformation(format!(
                "one-hot block for '{}' has width {}, expected {}",
                self.column(),
                block.len(),
                self.width()
            )));
        }
        let hot = block
            .iter()
            .position(|v| *v == 1.0)
            .ok_or_else(|| AgriError::transformation("one-hot block has no active category"))?;
        self.categories.decode(hot)
    }
}

/// Fitted encoder for one categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnEncoder {
    Label(LabelEncoder),
    OneHot(OneHotEncoder),
}

impl ColumnEncoder {
    pub fn column(&self) -> &str {
        match self {
            Self::Label(e) => e.column(),
            Self::OneHot(e) => e.column(),
        }
    }

    pub fn categories(&self) -> &[String] {
        match self {
            Self::Label(e) => e.classes(),
            Self::OneHot(e) => e.categories(),
        }
    }

    pub fn feature_names(&self) -> Vec<String> {
        match self {
            Self::Label(e) => vec![e.column().to_string()],
            Self::OneHot(e) => e.feature_names(),
        }
    }

    pub fn encode_into(&self, value: &str, out: &mut Vec<f64>) -> Result<(), AgriError> {
        match self {
            Self::Label(e) => {
                out.push(e.encode(value)? as f64);
                Ok(())
            }
            Self::OneHot(e) => e.encode_into(value, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_label_encoder_sorted_roundtrip() {
        let enc = LabelEncoder::fit("Soil Type", ["Sandy", "Loamy", "Black", "Sandy"]).unwrap();
        assert_eq!(enc.classes(), &["Black", "Loamy", "Sandy"]);
        for class in ["Black", "Loamy", "Sandy"] {
            let code = enc.encode(class).unwrap();
            assert_eq!(enc.decode(code).unwrap(), class);
        }
    }

    #[test]
    fn test_label_encoder_trims_values() {
        let enc = LabelEncoder::fit("Season", ["Kharif     ", "Rabi"]).unwrap();
        assert_eq!(enc.encode(" Kharif").unwrap(), 0);
    }

    #[test]
    fn test_unknown_category_is_an_error() {
        let enc = LabelEncoder::fit("Crop Type", ["Maize", "Paddy"]).unwrap();
        let err = enc.encode("Barley").unwrap_err();
        assert!(matches!(err, AgriError::UnknownCategory { ref value, .. } if value == "Barley"));
    }

    #[test]
    fn test_empty_fit_fails() {
        let empty: [&str; 0] = [];
        assert!(LabelEncoder::fit("Crop", empty).is_err());
    }

    #[test]
    fn test_one_hot_layout_and_decode() {
        let enc = OneHotEncoder::fit("Season", ["Rabi", "Kharif", "Whole Year"]).unwrap();
        assert_eq!(
            enc.feature_names(),
            vec!["Season_Kharif", "Season_Rabi", "Season_Whole Year"]
        );
        let mut out = vec![3.5];
        enc.encode_into("Rabi", &mut out).unwrap();
        assert_eq!(out, vec![3.5, 0.0, 1.0, 0.0]);
        assert_eq!(enc.decode(&out[1..]).unwrap(), "Rabi");
        assert!(enc.encode_into("Autumn", &mut out).is_err());
    }
}
