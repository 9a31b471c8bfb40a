use chrono::NaiveDate;
use insights_core::{resolve_seed, stream_rng, InsightsError, InsightsResult, PricePanel};
use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};
use price_predictor::{extrapolate_close, PredictedPanel};
use quant_analysis::ReturnStatistics;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::models::{GrowthEstimate, GrowthMethod, ValueDistribution};

/// Projects or measures the value of a fixed allocation.
#[derive(Debug, Clone, Copy)]
pub struct GrowthEstimator {
    initial_investment: f64,
    num_simulations: usize,
}

impl GrowthEstimator {
    pub fn new(initial_investment: f64, num_simulations: usize) -> Self {
        Self {
            initial_investment,
            num_simulations,
        }
    }

    pub fn initial_investment(&self) -> f64 {
        self.initial_investment
    }

    /// `growth = sum(w_i * end_i / start_i) - 1`
    pub fn realized(
        &self,
        weights: &[f64],
        start_prices: &[f64],
        end_prices: &[f64],
    ) -> InsightsResult<GrowthEstimate> {
        let growth = realized_growth(weights, start_prices, end_prices)?;
        Ok(GrowthEstimate {
            method: GrowthMethod::Realized,
            growth,
            initial_investment: self.initial_investment,
            portfolio_value: self.initial_investment * (1.0 + growth),
            start_date: None,
            end_date: None,
            horizon_days: None,
            distribution: None,
        })
    }

    /// Monte Carlo projection over `num_days` trading days. Each path sums
    /// daily draws from N(mu, cov) as log-returns; the terminal value is the
    /// weighted exponentiated sum. Returns `Ok(None)` when `num_days <= 0`.
    pub fn simulate(
        &self,
        stats: &ReturnStatistics,
        weights: &[f64],
        num_days: i64,
        seed: Option<u64>,
    ) -> InsightsResult<Option<GrowthEstimate>> {
        if num_days <= 0 {
            return Ok(None);
        }
        if self.num_simulations == 0 {
            return Err(InsightsError::InvalidRequest(
                "number of simulations must be positive".to_string(),
            ));
        }
        let n = stats.num_assets();
        if weights.len() != n {
            return Err(InsightsError::InvalidRequest(format!(
                "{} weights for {} assets",
                weights.len(),
                n
            )));
        }

        let factor = covariance_factor(stats.cov_matrix())?;
        let mu = stats.mean_returns();
        let w = DVector::from_column_slice(weights);
        let seed = resolve_seed(seed);

        let mut outcomes: Vec<f64> = (0..self.num_simulations)
            .into_par_iter()
            .map(|trial| {
                let mut rng = stream_rng(seed, trial as u64);
                let mut cumulative = DVector::<f64>::zeros(n);
                for _ in 0..num_days {
                    let z = DVector::<f64>::from_fn(n, |_, _| StandardNormal.sample(&mut rng));
                    cumulative += mu + &factor * z;
                }
                cumulative.map(f64::exp).dot(&w)
            })
            .collect();

        if outcomes.iter().any(|v| !v.is_finite()) {
            return Err(InsightsError::Calculation(
                "simulated portfolio value overflowed".to_string(),
            ));
        }

        let mean = outcomes.iter().sum::<f64>() / outcomes.len() as f64;
        outcomes.sort_by(|a, b| a.total_cmp(b));
        let percentile = |p: f64| -> f64 {
            let idx = ((p / 100.0) * (outcomes.len() - 1) as f64).round() as usize;
            outcomes[idx.min(outcomes.len() - 1)] * self.initial_investment
        };
        let distribution = ValueDistribution {
            p5: percentile(5.0),
            p50: percentile(50.0),
            p95: percentile(95.0),
        };

        tracing::debug!(
            "Simulated {} paths over {} days (seed {}): mean relative value {:.6}",
            self.num_simulations,
            num_days,
            seed,
            mean
        );

        Ok(Some(GrowthEstimate {
            method: GrowthMethod::Simulated,
            growth: mean - 1.0,
            initial_investment: self.initial_investment,
            portfolio_value: mean * self.initial_investment,
            start_date: None,
            end_date: None,
            horizon_days: Some(num_days as usize),
            distribution: Some(distribution),
        }))
    }

    /// Growth of `weights` (aligned with `symbols`) between two dates.
    ///
    /// Observed closes are used where present. A date inside the history
    /// but missing for a symbol is filled from that symbol's latest prior
    /// prediction; an end date past the history is extrapolated.
    pub fn between(
        &self,
        panel: &PricePanel,
        symbols: &[String],
        weights: &[f64],
        start: NaiveDate,
        end: NaiveDate,
        predictions: Option<&PredictedPanel>,
    ) -> InsightsResult<GrowthEstimate> {
        check_window(panel, start, end)?;
        if symbols.len() != weights.len() {
            return Err(InsightsError::InvalidRequest(format!(
                "{} weights for {} symbols",
                weights.len(),
                symbols.len()
            )));
        }

        let mut method = GrowthMethod::Realized;
        let mut start_prices = Vec::with_capacity(symbols.len());
        let mut end_prices = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            start_prices.push(observed_or_backfilled(
                panel,
                symbol,
                start,
                predictions,
                &mut method,
            )?);

            let last = panel
                .last_close(symbol)
                .map(|(date, _)| date)
                .ok_or_else(|| {
                    InsightsError::InsufficientData(format!("no price history for {}", symbol))
                })?;
            let end_price = if end > last && panel.last_date().map_or(false, |d| end > d) {
                method = GrowthMethod::Extrapolated;
                extrapolate_close(panel, symbol, end)?.close
            } else {
                observed_or_backfilled(panel, symbol, end, predictions, &mut method)?
            };
            end_prices.push(end_price);
        }

        let growth = realized_growth(weights, &start_prices, &end_prices)?;
        tracing::debug!(
            "Growth from {} to {} ({:?}): {:.6}",
            start,
            end,
            method,
            growth
        );

        Ok(GrowthEstimate {
            method,
            growth,
            initial_investment: self.initial_investment,
            portfolio_value: self.initial_investment * (1.0 + growth),
            start_date: Some(start),
            end_date: Some(end),
            horizon_days: None,
            distribution: None,
        })
    }
}

/// True when an endpoint inside the observed history lacks a close for some
/// symbol, i.e. `between` would need predictions.
pub fn needs_backfill(panel: &PricePanel, start: NaiveDate, end: NaiveDate) -> bool {
    let last = match panel.last_date() {
        Some(d) => d,
        None => return false,
    };
    [start, end]
        .iter()
        .filter(|d| **d <= last)
        .any(|d| panel.symbols().iter().any(|s| panel.close(*d, s).is_none()))
}

pub fn realized_growth(weights: &[f64], start_prices: &[f64], end_prices: &[f64]) -> InsightsResult<f64> {
    if weights.len() != start_prices.len() || weights.len() != end_prices.len() {
        return Err(InsightsError::InvalidRequest(format!(
            "{} weights, {} start prices, {} end prices",
            weights.len(),
            start_prices.len(),
            end_prices.len()
        )));
    }
    if let Some(i) = start_prices.iter().position(|p| *p == 0.0 || !p.is_finite()) {
        return Err(InsightsError::InvalidData(format!(
            "start price {} at position {} cannot anchor a return",
            start_prices[i], i
        )));
    }
    let relative: f64 = weights
        .iter()
        .zip(start_prices.iter().zip(end_prices))
        .map(|(w, (s, e))| w * e / s)
        .sum();
    Ok(relative - 1.0)
}

/// Lower-triangular `L` with `L * L^T = cov`. Falls back to an eigen
/// decomposition with negative eigenvalues clamped to zero when `cov` is
/// only positive semi-definite.
pub fn covariance_factor(cov: &DMatrix<f64>) -> InsightsResult<DMatrix<f64>> {
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(InsightsError::Calculation(
            "covariance matrix contains non-finite values".to_string(),
        ));
    }
    if let Some(chol) = Cholesky::new(cov.clone()) {
        return Ok(chol.l());
    }
    let eigen = SymmetricEigen::new(cov.clone());
    let sqrt_values = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
    Ok(&eigen.eigenvectors * DMatrix::from_diagonal(&sqrt_values))
}

fn check_window(panel: &PricePanel, start: NaiveDate, end: NaiveDate) -> InsightsResult<()> {
    let (first, last) = match (panel.first_date(), panel.last_date()) {
        (Some(f), Some(l)) => (f, l),
        _ => {
            return Err(InsightsError::InsufficientData(
                "price panel is empty".to_string(),
            ))
        }
    };
    if start > end {
        return Err(InsightsError::InvalidRequest(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    if start < first || start > last {
        return Err(InsightsError::InvalidRequest(format!(
            "start date {} is outside the price history {} to {}",
            start, first, last
        )));
    }
    Ok(())
}

fn observed_or_backfilled(
    panel: &PricePanel,
    symbol: &str,
    date: NaiveDate,
    predictions: Option<&PredictedPanel>,
    method: &mut GrowthMethod,
) -> InsightsResult<f64> {
    if let Some(close) = panel.close(date, symbol) {
        return Ok(close);
    }
    let predicted = predictions
        .and_then(|p| p.latest_prediction_before(date, symbol))
        .ok_or_else(|| {
            InsightsError::InsufficientData(format!(
                "no close or prior prediction for {} on {}",
                symbol, date
            ))
        })?;
    if *method == GrowthMethod::Realized {
        *method = GrowthMethod::Backfilled;
    }
    Ok(predicted.predicted_close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;
    use insights_core::{ModelParams, PriceRecord};
    use price_predictor::PricePredictor;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn zero_stats() -> ReturnStatistics {
        let records = (0..5)
            .flat_map(|i| {
                [
                    PriceRecord::new(d(1) + Duration::days(i), "AAA", 10.0, 1.0),
                    PriceRecord::new(d(1) + Duration::days(i), "BBB", 20.0, 1.0),
                ]
            })
            .collect();
        ReturnStatistics::from_panel(&PricePanel::new(records).unwrap()).unwrap()
    }

    #[test]
    fn test_realized_growth_single_asset() {
        let estimate = GrowthEstimator::new(100.0, 10)
            .realized(&[1.0], &[100.0], &[110.0])
            .unwrap();
        assert_relative_eq!(estimate.growth, 0.10, epsilon = 1e-12);
        assert_relative_eq!(estimate.portfolio_value, 110.0, epsilon = 1e-9);
        assert_eq!(estimate.method, GrowthMethod::Realized);
    }

    #[test]
    fn test_zero_moments_keep_initial_value() {
        let estimate = GrowthEstimator::new(250.0, 64)
            .simulate(&zero_stats(), &[0.3, 0.7], 20, Some(1))
            .unwrap()
            .unwrap();
        assert_relative_eq!(estimate.portfolio_value, 250.0, epsilon = 1e-9);
        let dist = estimate.distribution.unwrap();
        assert_relative_eq!(dist.p5, 250.0, epsilon = 1e-9);
        assert_relative_eq!(dist.p95, 250.0, epsilon = 1e-9);
    }

    #[test]
    fn test_non_positive_horizon_is_undefined() {
        let estimator = GrowthEstimator::new(100.0, 8);
        assert_eq!(estimator.simulate(&zero_stats(), &[0.5, 0.5], 0, Some(1)).unwrap(), None);
        assert_eq!(estimator.simulate(&zero_stats(), &[0.5, 0.5], -3, Some(1)).unwrap(), None);
    }

    #[test]
    fn test_simulation_is_seeded() {
        let closes_a = [10.0, 10.5, 10.2, 10.8, 11.0, 10.7];
        let closes_b = [20.0, 19.5, 19.9, 20.4, 20.1, 20.8];
        let records = closes_a
            .iter()
            .zip(&closes_b)
            .enumerate()
            .flat_map(|(i, (a, b))| {
                let date = d(1) + Duration::days(i as i64);
                [
                    PriceRecord::new(date, "AAA", *a, 1.0),
                    PriceRecord::new(date, "BBB", *b, 1.0),
                ]
            })
            .collect();
        let stats = ReturnStatistics::from_panel(&PricePanel::new(records).unwrap()).unwrap();
        let estimator = GrowthEstimator::new(100.0, 200);
        let a = estimator.simulate(&stats, &[0.5, 0.5], 10, Some(9)).unwrap();
        let b = estimator.simulate(&stats, &[0.5, 0.5], 10, Some(9)).unwrap();
        assert_eq!(a, b);
        let dist = a.unwrap().distribution.unwrap();
        assert!(dist.p5 <= dist.p50 && dist.p50 <= dist.p95);
    }

    #[test]
    fn test_semidefinite_covariance_factor() {
        let zero = DMatrix::<f64>::zeros(2, 2);
        assert_eq!(covariance_factor(&zero).unwrap(), DMatrix::zeros(2, 2));

        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let l = covariance_factor(&singular).unwrap();
        let rebuilt = &l * l.transpose();
        for (a, b) in rebuilt.iter().zip(singular.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }

        let bad = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        assert!(matches!(covariance_factor(&bad), Err(InsightsError::Calculation(_))));
    }

    fn gappy_panel() -> PricePanel {
        // BBB has no row on day 3
        let mut records = Vec::new();
        for day in 1..=12 {
            records.push(PriceRecord::new(d(day), "AAA", 100.0 + day as f64, 1_000.0 + day as f64));
            if day != 3 {
                records.push(PriceRecord::new(d(day), "BBB", 50.0 + 0.5 * day as f64, 500.0 + day as f64));
            }
        }
        PricePanel::new(records).unwrap()
    }

    fn symbols() -> Vec<String> {
        vec!["AAA".to_string(), "BBB".to_string()]
    }

    #[test]
    fn test_between_observed_dates_is_realized() {
        let estimate = GrowthEstimator::new(100.0, 1)
            .between(&gappy_panel(), &symbols(), &[1.0, 0.0], d(1), d(11), None)
            .unwrap();
        assert_eq!(estimate.method, GrowthMethod::Realized);
        assert_relative_eq!(estimate.growth, 111.0 / 101.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_endpoint_is_backfilled() {
        let panel = gappy_panel();
        assert!(needs_backfill(&panel, d(3), d(10)));
        assert!(!needs_backfill(&panel, d(2), d(10)));

        let params = ModelParams {
            n_estimators: 5,
            ..ModelParams::default()
        };
        let predictions = PricePredictor::new(params, 0.2)
            .fit_panel(&panel, None)
            .unwrap()
            .predict_panel(&panel, None)
            .unwrap();
        let estimator = GrowthEstimator::new(100.0, 1);
        let estimate = estimator
            .between(&panel, &symbols(), &[0.5, 0.5], d(3), d(10), Some(&predictions))
            .unwrap();
        assert_eq!(estimate.method, GrowthMethod::Backfilled);

        let without = estimator.between(&panel, &symbols(), &[0.5, 0.5], d(3), d(10), None);
        assert!(matches!(without, Err(InsightsError::InsufficientData(_))));
    }

    #[test]
    fn test_end_past_history_is_extrapolated() {
        let estimate = GrowthEstimator::new(100.0, 1)
            .between(&gappy_panel(), &symbols(), &[0.5, 0.5], d(2), d(20), None)
            .unwrap();
        assert_eq!(estimate.method, GrowthMethod::Extrapolated);
        assert!(estimate.portfolio_value.is_finite());
    }

    #[test]
    fn test_invalid_windows() {
        let estimator = GrowthEstimator::new(100.0, 1);
        let panel = gappy_panel();
        for (start, end) in [(d(5), d(4)), (d(13), d(20))] {
            assert!(matches!(
                estimator.between(&panel, &symbols(), &[0.5, 0.5], start, end, None),
                Err(InsightsError::InvalidRequest(_))
            ));
        }
    }
}
