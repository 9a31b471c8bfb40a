use std::collections::BTreeMap;

use chrono::NaiveDate;
use insights_core::RiskProfile;
use nalgebra::DMatrix;
use price_predictor::ModelMetrics;
use serde::{Deserialize, Serialize};

/// Score of one random portfolio. `sharpe_ratio` is `None` when the
/// portfolio has zero volatility or the ratio is not finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: Option<f64>,
}

/// All trials of one sampler run plus the max-Sharpe allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerOutcome {
    pub seed: u64,
    pub risk_free_rate: f64,
    /// Symbol order of `optimal_weights`
    pub symbols: Vec<String>,
    pub results: Vec<SimulationResult>,
    pub optimal_index: usize,
    pub optimal_weights: Vec<f64>,
}

impl SamplerOutcome {
    pub fn optimal(&self) -> &SimulationResult {
        &self.results[self.optimal_index]
    }

    /// Sharpe of the selected trial. Always defined.
    pub fn optimal_sharpe(&self) -> f64 {
        self.optimal().sharpe_ratio.unwrap_or(f64::NEG_INFINITY)
    }

    /// 3 x num_trials matrix: rows are return, volatility and Sharpe.
    /// Undefined Sharpe ratios appear as negative infinity.
    pub fn results_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(3, self.results.len(), |row, col| {
            let r = &self.results[col];
            match row {
                0 => r.expected_return,
                1 => r.volatility,
                _ => r.sharpe_ratio.unwrap_or(f64::NEG_INFINITY),
            }
        })
    }

    pub fn weights_by_symbol(&self) -> BTreeMap<String, f64> {
        self.symbols
            .iter()
            .cloned()
            .zip(self.optimal_weights.iter().copied())
            .collect()
    }
}

/// Daily-unit performance of the chosen allocation with annualized figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthMethod {
    /// Both endpoints observed for every symbol
    Realized,
    /// Some endpoint filled from the price model's prediction
    Backfilled,
    /// End prices projected past the observed history
    Extrapolated,
    /// Monte Carlo projection from return statistics
    Simulated,
}

/// Terminal value percentiles of a simulated projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueDistribution {
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthEstimate {
    pub method: GrowthMethod,
    pub growth: f64,
    pub initial_investment: f64,
    pub portfolio_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon_days: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<ValueDistribution>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightsRequest {
    #[serde(default)]
    pub risk_profile: RiskProfile,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Trading days to project forward; `<= 0` yields no projection.
    pub horizon_days: Option<i64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioInsights {
    pub risk_profile: RiskProfile,
    pub risk_free_rate: f64,
    pub weights: BTreeMap<String, f64>,
    /// Sample standard deviation of each symbol's daily returns
    pub volatilities: BTreeMap<String, f64>,
    pub performance: PortfolioPerformance,
    pub investment_growth: Option<GrowthEstimate>,
    pub projection: Option<GrowthEstimate>,
    pub projected_value: Option<f64>,
    /// Present when the price model had to be fitted for backfilling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_metrics: Option<ModelMetrics>,
    pub seed: u64,
}
