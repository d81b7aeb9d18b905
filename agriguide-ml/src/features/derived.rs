//! Engineered features computed from raw nutrient and climate measurements.
//!
//! Every derived feature is a pure function of one raw record. There is no
//! fitted state, so the same code runs at training and at serving time.

use crate::data::schema::RawRecord;
use crate::error::AgriError;
use serde::{Deserialize, Serialize};

/// Guards the ratio features against division by zero.
const RATIO_EPSILON: f64 = 1e-3;

/// A composite feature derived from raw columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedFeature {
    /// `N + P + K`
    NpkSum,
    /// `N / (K + eps)`
    NitrogenPotassiumRatio,
    /// `temperature * humidity / 100`
    TempHumidityIndex,
    /// `1` when `ph < 7`, else `0`
    IsAcidic,
    /// `rainfall / (N + P + K + eps)`
    RainfallPerNpk,
}

impl DerivedFeature {
    /// Derived features of the crop family, in feature-vector order.
    pub const CROP: [DerivedFeature; 5] = [
        DerivedFeature::NpkSum,
        DerivedFeature::NitrogenPotassiumRatio,
        DerivedFeature::TempHumidityIndex,
        DerivedFeature::IsAcidic,
        DerivedFeature::RainfallPerNpk,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NpkSum => "NPK_sum",
            Self::NitrogenPotassiumRatio => "N_K_ratio",
            Self::TempHumidityIndex => "temp_humidity_index",
            Self::IsAcidic => "is_acidic",
            Self::RainfallPerNpk => "rainfall_per_NPK",
        }
    }

    /// Raw columns this feature reads.
    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            Self::NpkSum => &["N", "P", "K"],
            Self::NitrogenPotassiumRatio => &["N", "K"],
            Self::TempHumidityIndex => &["temperature", "humidity"],
            Self::IsAcidic => &["ph"],
            Self::RainfallPerNpk => &["rainfall", "N", "P", "K"],
        }
    }

    pub fn compute(&self, record: &RawRecord) -> Result<f64, AgriError> {
        let value = match self {
            Self::NpkSum => npk_sum(record)?,
            Self::NitrogenPotassiumRatio => {
                record.number("N")? / (record.number("K")? + RATIO_EPSILON)
            }
            Self::TempHumidityIndex => {
                record.number("temperature")? * record.number("humidity")? / 100.0
            }
            Self::IsAcidic => {
                if record.number("ph")? < 7.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::RainfallPerNpk => record.number("rainfall")? / (npk_sum(record)? + RATIO_EPSILON),
        };
        if !value.is_finite() {
            return Err(AgriError::transformation(format!(
                "derived feature '{}' is not finite",
                self.name()
            )));
        }
        Ok(value)
    }
}

fn npk_sum(record: &RawRecord) -> Result<f64, AgriError> {
    Ok(record.number("N")? + record.number("P")? + record.number("K")?)
}
