use std::collections::BTreeMap;
use std::time::Duration;

use insights_core::{EngineConfig, ModelParams};
use portfolio_optimizer::PortfolioPerformance;
use price_predictor::ModelMetrics;
use serde::{Deserialize, Serialize};

/// Search space for the backtest. Empty lists fall back to the engine
/// defaults, so the grid always has at least one cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    #[serde(default)]
    pub max_depths: Vec<Option<usize>>,
    #[serde(default)]
    pub n_estimators: Vec<usize>,
    #[serde(default)]
    pub min_samples_splits: Vec<usize>,
    #[serde(default)]
    pub num_portfolios: Vec<usize>,
    #[serde(default)]
    pub holdout_days: Vec<i64>, // calendar days
    #[serde(default)]
    pub num_simulations: Vec<usize>,
    #[serde(default)]
    pub risk_free_rates: Vec<f64>,
}

impl HyperparameterGrid {
    /// Single model configuration, one cell per risk-free rate.
    pub fn for_risk_rates(rates: &[f64]) -> Self {
        Self {
            risk_free_rates: rates.to_vec(),
            ..Self::default()
        }
    }
}

/// One point of the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestParams {
    pub max_depth: Option<usize>,
    pub n_estimators: usize,
    pub min_samples_split: usize,
    pub num_portfolios: usize,
    pub holdout_days: i64,
    pub num_simulations: usize,
    pub risk_free_rate: f64,
}

impl BacktestParams {
    pub fn model_params(&self, include_close: bool, seed: u64) -> ModelParams {
        ModelParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            include_close,
            seed,
        }
    }
}

/// Settings shared by every cell of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOptions {
    /// Base seed for sampler and simulation streams; drawn from entropy when `None`.
    pub seed: Option<u64>,
    pub model_seed: u64,
    pub include_close: bool,
    pub test_fraction: f64,
    pub initial_investment: f64,
    /// Cells not started before this much wall-clock time has passed are skipped.
    pub time_budget: Option<Duration>,
    /// Grid defaults for lists left empty
    pub defaults: BacktestParams,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl BacktestOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            seed: config.seed,
            model_seed: config.model.seed,
            include_close: config.model.include_close,
            test_fraction: config.test_fraction,
            initial_investment: config.initial_investment,
            time_budget: None,
            defaults: BacktestParams {
                max_depth: config.model.max_depth,
                n_estimators: config.model.n_estimators,
                min_samples_split: config.model.min_samples_split,
                num_portfolios: config.backtest_num_portfolios,
                holdout_days: config.backtest_holdout_days,
                num_simulations: config.num_simulations,
                risk_free_rate: config.risk_free.moderate,
            },
        }
    }
}

/// Everything one grid cell produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellOutcome {
    pub grid_index: usize,
    pub params: BacktestParams,
    pub predicted_value: f64,
    pub predicted_growth: f64,
    pub actual_growth: f64,
    /// `None` when the realized growth is exactly zero
    pub growth_difference_percentage: Option<f64>,
    pub performance_metrics: PortfolioPerformance,
    /// `None` when the cell sampled on actual closes without fitting a model
    pub model_metrics: Option<ModelMetrics>,
    pub weights: BTreeMap<String, f64>,
}

/// Best cell for one risk-free rate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestRecord {
    pub risk_free_rate: f64,
    pub predicted_value: f64,
    pub predicted_growth: f64,
    pub actual_growth: f64,
    pub growth_difference_percentage: f64,
    pub best_parameters: BacktestParams,
    pub performance_metrics: PortfolioPerformance,
    pub model_metrics: Option<ModelMetrics>,
    pub weights: BTreeMap<String, f64>,
    pub grid_index: usize,
}

impl BacktestRecord {
    /// `None` for cells whose growth difference is undefined.
    pub fn from_outcome(outcome: CellOutcome) -> Option<Self> {
        let diff = outcome.growth_difference_percentage?;
        Some(Self {
            risk_free_rate: outcome.params.risk_free_rate,
            predicted_value: outcome.predicted_value,
            predicted_growth: outcome.predicted_growth,
            actual_growth: outcome.actual_growth,
            growth_difference_percentage: diff,
            best_parameters: outcome.params,
            performance_metrics: outcome.performance_metrics,
            model_metrics: outcome.model_metrics,
            weights: outcome.weights,
            grid_index: outcome.grid_index,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellFailure {
    pub grid_index: usize,
    pub params: BacktestParams,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub seed: u64,
    pub grid_size: usize,
    /// Sorted by risk-free rate
    pub records: Vec<BacktestRecord>,
    pub evaluated: usize,
    /// Evaluated cells whose growth difference was undefined
    pub undefined: usize,
    pub skipped: usize,
    pub failed: Vec<CellFailure>,
}

impl BacktestReport {
    pub fn record_for(&self, risk_free_rate: f64) -> Option<&BacktestRecord> {
        self.records
            .iter()
            .find(|r| r.risk_free_rate.total_cmp(&risk_free_rate).is_eq())
    }
}
