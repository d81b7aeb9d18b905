//! Rule-based soil advice attached to crop and fertilizer predictions.

use serde::{Deserialize, Serialize};

/// Assumed pH when advising on a fertilizer request, which carries no pH.
pub const NEUTRAL_PH: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Optimal,
    High,
}

impl Level {
    fn classify(value: f64, low: f64, high: f64) -> Self {
        if value < low {
            Self::Low
        } else if value > high {
            Self::High
        } else {
            Self::Optimal
        }
    }
}

/// Nutrient and pH assessment plus the rendered advice text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilAdvice {
    pub nitrogen: Level,
    pub phosphorus: Level,
    pub potassium: Level,
    pub ph: Level,
    pub message: String,
}

pub fn soil_advice(n: f64, p: f64, k: f64, ph: f64) -> SoilAdvice {
    let nitrogen = Level::classify(n, 50.0, 100.0);
    let phosphorus = Level::classify(p, 30.0, 60.0);
    let potassium = Level::classify(k, 30.0, 80.0);
    let ph_level = Level::classify(ph, 6.0, 8.0);

    let parts = [
        match nitrogen {
            Level::Low => "N levels are low. Add Urea or Ammonium Nitrate.",
            Level::High => "N levels are high. Reduce nitrogen fertilizers.",
            Level::Optimal => "N levels are optimal.",
        },
        match phosphorus {
            Level::Low => "P levels are low. Add Superphosphate or DAP.",
            Level::High => "P levels are high. Reduce phosphorus fertilizers.",
            Level::Optimal => "P levels are optimal.",
        },
        match potassium {
            Level::Low => "K levels are low. Add Potash or Muriate of Potash.",
            Level::High => "K levels are high. Reduce potassium fertilizers.",
            Level::Optimal => "K levels are optimal.",
        },
        match ph_level {
            Level::Low => "Soil is acidic. Consider adding lime to raise pH.",
            Level::High => "Soil is alkaline. Consider adding sulfur or organic matter to lower pH.",
            Level::Optimal => "Soil pH is optimal for most crops.",
        },
    ];

    SoilAdvice {
        nitrogen,
        phosphorus,
        potassium,
        ph: ph_level,
        message: parts.join(" "),
    }
}
