use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::InsightsError;

/// One daily OHLCV row for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub symbol: String,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    pub close: f64,
    pub volume: f64,
}

impl PriceRecord {
    pub fn new(date: NaiveDate, symbol: impl Into<String>, close: f64, volume: f64) -> Self {
        Self {
            date,
            symbol: symbol.into(),
            open: None,
            high: None,
            low: None,
            close,
            volume,
        }
    }
}

/// Fundamental ratios reported for a symbol on a given date.
/// Any field may be missing in the source table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    #[serde(rename = "EPS")]
    pub eps: Option<f64>,
    #[serde(rename = "PE")]
    pub pe: Option<f64>,
    #[serde(rename = "ROE")]
    pub roe: Option<f64>,
    #[serde(rename = "ROA")]
    pub roa: Option<f64>,
    #[serde(rename = "ROI")]
    pub roi: Option<f64>,
}

impl Fundamentals {
    pub const FIELD_NAMES: [&'static str; 5] = ["EPS", "PE", "ROE", "ROA", "ROI"];

    pub fn as_array(&self) -> [Option<f64>; 5] {
        [self.eps, self.pe, self.roe, self.roa, self.roi]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsRecord {
    pub date: NaiveDate,
    pub symbol: String,
    #[serde(flatten)]
    pub values: Fundamentals,
}

/// Investor risk appetite, mapped to a risk-free rate through [`RiskFreeTable`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Low,
    #[default]
    Moderate,
    High,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Low => "low",
            RiskProfile::Moderate => "moderate",
            RiskProfile::High => "high",
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskProfile {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskProfile::Low),
            "moderate" => Ok(RiskProfile::Moderate),
            "high" => Ok(RiskProfile::High),
            other => Err(InsightsError::InvalidRequest(format!(
                "unknown risk profile '{other}' (expected low, moderate or high)"
            ))),
        }
    }
}

/// Risk-free rate per risk profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFreeTable {
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
}

impl RiskFreeTable {
    pub fn rate_for(&self, profile: RiskProfile) -> f64 {
        match profile {
            RiskProfile::Low => self.low,
            RiskProfile::Moderate => self.moderate,
            RiskProfile::High => self.high,
        }
    }
}

impl Default for RiskFreeTable {
    fn default() -> Self {
        Self {
            low: 0.0,
            moderate: 0.01,
            high: 0.02,
        }
    }
}

/// Random forest hyperparameters for the next-day close regressor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelParams {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Feed the same-day close to the model alongside volume and fundamentals.
    #[serde(default)]
    pub include_close: bool,
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(10),
            min_samples_split: 2,
            include_close: false,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_profile_parsing_is_case_insensitive() {
        assert_eq!("LOW".parse::<RiskProfile>().unwrap(), RiskProfile::Low);
        assert_eq!(" Moderate ".parse::<RiskProfile>().unwrap(), RiskProfile::Moderate);
        assert_eq!("high".parse::<RiskProfile>().unwrap(), RiskProfile::High);
        assert!("aggressive".parse::<RiskProfile>().is_err());
    }

    #[test]
    fn test_default_risk_free_table() {
        let table = RiskFreeTable::default();
        assert_eq!(table.rate_for(RiskProfile::Low), 0.0);
        assert_eq!(table.rate_for(RiskProfile::Moderate), 0.01);
        assert_eq!(table.rate_for(RiskProfile::High), 0.02);
        assert_eq!(RiskProfile::default(), RiskProfile::Moderate);
    }

    #[test]
    fn test_fundamentals_serde_uses_source_column_names() {
        let json = r#"{"EPS": 1.5, "PE": 20.0, "ROE": null, "ROA": 0.04, "ROI": 0.1}"#;
        let f: Fundamentals = serde_json::from_str(json).unwrap();
        assert_eq!(f.eps, Some(1.5));
        assert_eq!(f.roe, None);
        assert_eq!(f.as_array()[3], Some(0.04));
    }
}
