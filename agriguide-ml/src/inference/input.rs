//! Typed prediction requests and their range checks.

use crate::data::schema::RawRecord;
use crate::error::AgriError;
use serde::{Deserialize, Serialize};

fn check_finite(name: &str, value: f64) -> Result<(), AgriError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AgriError::invalid_input(format!("{name} must be a finite number")))
    }
}

fn check_range(name: &str, value: f64, low: f64, high: f64) -> Result<(), AgriError> {
    check_finite(name, value)?;
    if value < low || value > high {
        return Err(AgriError::invalid_input(format!(
            "{name} must be between {low} and {high}"
        )));
    }
    Ok(())
}

fn check_required(name: &str, value: &str) -> Result<(), AgriError> {
    if value.trim().is_empty() {
        return Err(AgriError::invalid_input(format!("{name} is required")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropInput {
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub ph: f64,
    pub rainfall: f64,
}

impl CropInput {
    pub fn validate(&self) -> Result<(), AgriError> {
        for (name, value) in [
            ("N", self.nitrogen),
            ("P", self.phosphorus),
            ("K", self.potassium),
            ("temperature", self.temperature),
            ("rainfall", self.rainfall),
        ] {
            check_finite(name, value)?;
        }
        check_range("pH", self.ph, 0.0, 14.0)?;
        check_range("humidity", self.humidity, 0.0, 100.0)
    }

    pub fn to_record(&self) -> RawRecord {
        RawRecord::new()
            .with("N", self.nitrogen)
            .with("P", self.phosphorus)
            .with("K", self.potassium)
            .with("temperature", self.temperature)
            .with("humidity", self.humidity)
            .with("ph", self.ph)
            .with("rainfall", self.rainfall)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldInput {
    pub state: String,
    /// Informational only; the regressor does not use it.
    #[serde(default)]
    pub district: Option<String>,
    pub season: String,
    pub crop: String,
    /// Hectares.
    pub area: f64,
}

impl YieldInput {
    pub fn validate(&self) -> Result<(), AgriError> {
        check_required("state", &self.state)?;
        check_required("season", &self.season)?;
        check_required("crop", &self.crop)?;
        check_finite("area", self.area)?;
        if self.area <= 0.0 {
            return Err(AgriError::invalid_input("area must be greater than 0"));
        }
        Ok(())
    }

    pub fn to_record(&self) -> RawRecord {
        let record = RawRecord::new()
            .with("State_Name", self.state.trim())
            .with("Season", self.season.trim())
            .with("Crop", self.crop.trim())
            .with("Area", self.area);
        match &self.district {
            Some(district) => record.with("District_Name", district.trim()),
            None => record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerInput {
    pub temperature: f64,
    pub humidity: f64,
    pub moisture: f64,
    pub soil_type: String,
    pub crop_type: String,
    pub nitrogen: f64,
    pub potassium: f64,
    pub phosphorous: f64,
}

impl FertilizerInput {
    pub fn validate(&self) -> Result<(), AgriError> {
        check_required("soil type", &self.soil_type)?;
        check_required("crop type", &self.crop_type)?;
        for (name, value) in [
            ("temperature", self.temperature),
            ("nitrogen", self.nitrogen),
            ("potassium", self.potassium),
            ("phosphorous", self.phosphorous),
        ] {
            check_finite(name, value)?;
        }
        check_range("humidity", self.humidity, 0.0, 100.0)?;
        check_range("moisture", self.moisture, 0.0, 100.0)
    }

    pub fn to_record(&self) -> RawRecord {
        RawRecord::new()
            .with("Temparature", self.temperature)
            .with("Humidity", self.humidity)
            .with("Moisture", self.moisture)
            .with("Soil Type", self.soil_type.trim())
            .with("Crop Type", self.crop_type.trim())
            .with("Nitrogen", self.nitrogen)
            .with("Potassium", self.potassium)
            .with("Phosphorous", self.phosphorous)
    }
}
