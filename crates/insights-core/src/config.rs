use serde::{Deserialize, Serialize};

use crate::error::{InsightsError, InsightsResult};
use crate::types::{ModelParams, RiskFreeTable};

/// Engine-wide defaults. Built explicitly by the caller and passed into each
/// computation; nothing here is global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Random portfolios drawn per insights request
    pub num_portfolios: usize,
    /// Monte Carlo paths for forward growth projection
    pub num_simulations: usize,
    pub initial_investment: f64,
    pub seed: Option<u64>,
    pub risk_free: RiskFreeTable,
    pub model: ModelParams,
    /// Fraction of rows held out when fitting the price model
    pub test_fraction: f64,
    /// Length of the backtest holdout window in calendar days
    pub backtest_holdout_days: i64,
    pub backtest_num_portfolios: usize,
    pub backtest_risk_free_rates: Vec<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_portfolios: 10_000,
            num_simulations: 1_000,
            initial_investment: 100.0,
            seed: None,
            risk_free: RiskFreeTable::default(),
            model: ModelParams::default(),
            test_fraction: 0.2,
            backtest_holdout_days: 365 * 2,
            backtest_num_portfolios: 5_000,
            backtest_risk_free_rates: vec![0.0, 0.01, 0.02],
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> InsightsResult<()> {
        if self.num_portfolios == 0 || self.backtest_num_portfolios == 0 {
            return Err(InsightsError::InvalidRequest(
                "portfolio trial counts must be positive".to_string(),
            ));
        }
        if self.num_simulations == 0 {
            return Err(InsightsError::InvalidRequest(
                "num_simulations must be positive".to_string(),
            ));
        }
        if !(self.initial_investment.is_finite() && self.initial_investment > 0.0) {
            return Err(InsightsError::InvalidRequest(format!(
                "initial_investment must be positive, got {}",
                self.initial_investment
            )));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(InsightsError::InvalidRequest(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.backtest_holdout_days <= 0 {
            return Err(InsightsError::InvalidRequest(
                "backtest_holdout_days must be positive".to_string(),
            ));
        }
        if self.model.n_estimators == 0 {
            return Err(InsightsError::InvalidRequest(
                "model.n_estimators must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
