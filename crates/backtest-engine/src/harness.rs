use std::time::Instant;

use chrono::Duration;
use insights_core::{
    derive_seed, resolve_seed, EngineConfig, FundamentalsPanel, InsightsError, InsightsResult,
    PricePanel,
};
use portfolio_optimizer::{realized_growth, GrowthEstimator, PortfolioPerformance, PortfolioSampler};
use price_predictor::{ModelMetrics, PricePredictor};
use quant_analysis::{annualize_return, annualize_volatility, ReturnStatistics};
use rayon::prelude::*;

use crate::models::{
    BacktestOptions, BacktestParams, BacktestReport, CellFailure, CellOutcome, HyperparameterGrid,
};
use crate::reduction::GridAccumulator;

const SAMPLER_STREAM: u64 = 0;
const PROJECTION_STREAM: u64 = 1;

/// Replays prediction, allocation and projection over a held-out window for
/// every cell of a hyperparameter grid.
#[derive(Debug, Clone)]
pub struct BacktestHarness {
    grid: HyperparameterGrid,
    options: BacktestOptions,
}

impl BacktestHarness {
    pub fn new(grid: HyperparameterGrid, options: BacktestOptions) -> Self {
        Self { grid, options }
    }

    pub fn run(
        &self,
        panel: &PricePanel,
        fundamentals: Option<&FundamentalsPanel>,
    ) -> InsightsResult<BacktestReport> {
        self.fold_cells(panel, |index, params, seed| {
            self.evaluate_cell(index, params, panel, fundamentals, seed)
        })
    }

    /// Like [`run`](Self::run), but every cell samples on the actual holdout
    /// closes and no price model is fitted.
    pub fn run_without_model(&self, panel: &PricePanel) -> InsightsResult<BacktestReport> {
        self.fold_cells(panel, |index, params, seed| {
            self.evaluate_cell_without_model(index, params, panel, seed)
        })
    }

    fn fold_cells<F>(&self, panel: &PricePanel, evaluate: F) -> InsightsResult<BacktestReport>
    where
        F: Fn(usize, &BacktestParams, u64) -> InsightsResult<CellOutcome> + Sync,
    {
        self.grid.validate()?;
        let seed = resolve_seed(self.options.seed);
        let cells = self.grid.cells(&self.options.defaults);
        // A budget too large to represent as an instant means no deadline.
        let deadline = self
            .options
            .time_budget
            .and_then(|budget| Instant::now().checked_add(budget));

        tracing::info!(
            "Starting backtest over {} grid cells ({} rows, seed {})",
            cells.len(),
            panel.len(),
            seed
        );

        let acc = cells
            .par_iter()
            .enumerate()
            .fold(GridAccumulator::default, |acc, (index, params)| {
                if deadline.map_or(false, |d| Instant::now() >= d) {
                    return acc.record_skip();
                }
                match evaluate(index, params, seed) {
                    Ok(outcome) => {
                        tracing::debug!(
                            "Cell {} (rf {}): growth difference {:?}",
                            index,
                            params.risk_free_rate,
                            outcome.growth_difference_percentage
                        );
                        acc.record_outcome(outcome)
                    }
                    Err(e) => {
                        tracing::warn!("Backtest cell {} failed: {}", index, e);
                        acc.record_failure(CellFailure {
                            grid_index: index,
                            params: *params,
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        })
                    }
                }
            })
            .reduce(GridAccumulator::default, GridAccumulator::merge);

        let mut failed = acc.failures;
        failed.sort_by_key(|f| f.grid_index);

        tracing::info!(
            "Backtest complete: {} evaluated, {} undefined, {} failed, {} skipped",
            acc.evaluated,
            acc.undefined,
            failed.len(),
            acc.skipped
        );

        Ok(BacktestReport {
            seed,
            grid_size: cells.len(),
            records: acc.best.into_records(),
            evaluated: acc.evaluated,
            undefined: acc.undefined,
            skipped: acc.skipped,
            failed,
        })
    }

    /// Runs one cell. Every cell shares the base seed so cells differ only by
    /// their parameters.
    pub fn evaluate_cell(
        &self,
        index: usize,
        params: &BacktestParams,
        panel: &PricePanel,
        fundamentals: Option<&FundamentalsPanel>,
        seed: u64,
    ) -> InsightsResult<CellOutcome> {
        let (train, test) = split_holdout(panel, params.holdout_days)?;

        let model = params.model_params(self.options.include_close, self.options.model_seed);
        let fitted = PricePredictor::new(model, self.options.test_fraction)
            .fit_panel(&train, fundamentals)?;
        let predicted = fitted.predict_panel(&test, fundamentals)?.to_price_panel()?;
        let predicted_stats = ReturnStatistics::from_panel(&predicted)?;

        self.replay_window(index, params, &train, &test, &predicted_stats, Some(*fitted.metrics()), seed)
    }

    /// Runs one cell on the actual holdout closes.
    pub fn evaluate_cell_without_model(
        &self,
        index: usize,
        params: &BacktestParams,
        panel: &PricePanel,
        seed: u64,
    ) -> InsightsResult<CellOutcome> {
        let (train, test) = split_holdout(panel, params.holdout_days)?;
        let test_stats = ReturnStatistics::from_panel(&test)?;
        self.replay_window(index, params, &train, &test, &test_stats, None, seed)
    }

    /// Samples weights on `sample_stats`, projects them from train-period
    /// statistics over the test window and compares with realized growth.
    #[allow(clippy::too_many_arguments)]
    fn replay_window(
        &self,
        index: usize,
        params: &BacktestParams,
        train: &PricePanel,
        test: &PricePanel,
        sample_stats: &ReturnStatistics,
        model_metrics: Option<ModelMetrics>,
        seed: u64,
    ) -> InsightsResult<CellOutcome> {
        let outcome = PortfolioSampler::new(params.num_portfolios).sample(
            sample_stats,
            params.risk_free_rate,
            Some(derive_seed(seed, SAMPLER_STREAM)),
        )?;

        let train_stats = ReturnStatistics::from_panel(train)?;
        if train_stats.symbols() != outcome.symbols.as_slice() {
            return Err(InsightsError::InvalidData(format!(
                "train symbols {:?} differ from test symbols {:?}",
                train_stats.symbols(),
                outcome.symbols
            )));
        }

        let horizon = test.dates().len() as i64 - 1;
        let projection = GrowthEstimator::new(self.options.initial_investment, params.num_simulations)
            .simulate(
                &train_stats,
                &outcome.optimal_weights,
                horizon,
                Some(derive_seed(seed, PROJECTION_STREAM)),
            )?
            .ok_or_else(|| {
                InsightsError::InsufficientData("test window spans a single date".to_string())
            })?;

        let mut start_prices = Vec::with_capacity(outcome.symbols.len());
        let mut end_prices = Vec::with_capacity(outcome.symbols.len());
        for symbol in &outcome.symbols {
            let closes = test.closes_for(symbol);
            match (closes.first(), closes.last()) {
                (Some((_, first)), Some((_, last))) => {
                    start_prices.push(*first);
                    end_prices.push(*last);
                }
                _ => {
                    return Err(InsightsError::InsufficientData(format!(
                        "no test-window closes for {}",
                        symbol
                    )))
                }
            }
        }
        let actual_growth = realized_growth(&outcome.optimal_weights, &start_prices, &end_prices)?;
        let growth_difference_percentage = growth_difference_percentage(projection.growth, actual_growth);

        let optimal = *outcome.optimal();
        Ok(CellOutcome {
            grid_index: index,
            params: *params,
            predicted_value: projection.portfolio_value,
            predicted_growth: projection.growth,
            actual_growth,
            growth_difference_percentage,
            performance_metrics: PortfolioPerformance {
                expected_return: optimal.expected_return,
                volatility: optimal.volatility,
                sharpe_ratio: outcome.optimal_sharpe(),
                annualized_return: annualize_return(optimal.expected_return),
                annualized_volatility: annualize_volatility(optimal.volatility),
            },
            model_metrics,
            weights: outcome.weights_by_symbol(),
        })
    }
}

/// Train rows before `last_date - holdout_days`, test rows on or after it.
fn split_holdout(panel: &PricePanel, holdout_days: i64) -> InsightsResult<(PricePanel, PricePanel)> {
    let last = panel
        .last_date()
        .ok_or_else(|| InsightsError::InsufficientData("price panel is empty".to_string()))?;
    let split = last - Duration::days(holdout_days);
    let train = panel.before(split);
    let test = panel.on_or_after(split);
    if train.is_empty() || test.dates().len() < 2 {
        return Err(InsightsError::InsufficientData(format!(
            "holdout of {} days leaves {} train rows and {} test dates",
            holdout_days,
            train.len(),
            test.dates().len()
        )));
    }
    Ok((train, test))
}

/// `(predicted - actual) / actual * 100`, undefined when `actual` is zero.
pub fn growth_difference_percentage(predicted: f64, actual: f64) -> Option<f64> {
    if actual == 0.0 {
        return None;
    }
    Some((predicted - actual) / actual * 100.0).filter(|d| d.is_finite())
}

pub fn backtest(
    panel: &PricePanel,
    fundamentals: Option<&FundamentalsPanel>,
    grid: &HyperparameterGrid,
    options: &BacktestOptions,
) -> InsightsResult<BacktestReport> {
    BacktestHarness::new(grid.clone(), options.clone()).run(panel, fundamentals)
}

/// One cell per configured risk-free rate, sampled on the actual closes of
/// the holdout window. No price model is fitted.
pub fn backtest_risk_rates(panel: &PricePanel, config: &EngineConfig) -> InsightsResult<BacktestReport> {
    config.validate()?;
    let grid = HyperparameterGrid::for_risk_rates(&config.backtest_risk_free_rates);
    BacktestHarness::new(grid, BacktestOptions::from_config(config)).run_without_model(panel)
}
