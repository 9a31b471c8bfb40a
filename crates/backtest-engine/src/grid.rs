use insights_core::{InsightsError, InsightsResult};

use crate::models::{BacktestParams, HyperparameterGrid};

fn or_default<T: Clone>(values: &[T], default: T) -> Vec<T> {
    if values.is_empty() {
        vec![default]
    } else {
        values.to_vec()
    }
}

impl HyperparameterGrid {
    /// Cartesian product in declaration order; risk-free rate varies fastest.
    /// The position of a cell in this list is its grid index.
    pub fn cells(&self, defaults: &BacktestParams) -> Vec<BacktestParams> {
        let depths = or_default(&self.max_depths, defaults.max_depth);
        let estimators = or_default(&self.n_estimators, defaults.n_estimators);
        let splits = or_default(&self.min_samples_splits, defaults.min_samples_split);
        let portfolios = or_default(&self.num_portfolios, defaults.num_portfolios);
        let holdouts = or_default(&self.holdout_days, defaults.holdout_days);
        let simulations = or_default(&self.num_simulations, defaults.num_simulations);
        let rates = or_default(&self.risk_free_rates, defaults.risk_free_rate);

        let mut grid = Vec::with_capacity(
            depths.len()
                * estimators.len()
                * splits.len()
                * portfolios.len()
                * holdouts.len()
                * simulations.len()
                * rates.len(),
        );
        for &max_depth in &depths {
            for &n_estimators in &estimators {
                for &min_samples_split in &splits {
                    for &num_portfolios in &portfolios {
                        for &holdout_days in &holdouts {
                            for &num_simulations in &simulations {
                                for &risk_free_rate in &rates {
                                    grid.push(BacktestParams {
                                        max_depth,
                                        n_estimators,
                                        min_samples_split,
                                        num_portfolios,
                                        holdout_days,
                                        num_simulations,
                                        risk_free_rate,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        grid
    }

    pub fn validate(&self) -> InsightsResult<()> {
        if let Some(r) = self.risk_free_rates.iter().find(|r| !r.is_finite()) {
            return Err(InsightsError::InvalidRequest(format!(
                "risk-free rate {} is not finite",
                r
            )));
        }
        if let Some(h) = self.holdout_days.iter().find(|h| **h <= 0) {
            return Err(InsightsError::InvalidRequest(format!(
                "holdout window must be positive, got {} days",
                h
            )));
        }
        if self.n_estimators.contains(&0)
            || self.num_portfolios.contains(&0)
            || self.num_simulations.contains(&0)
        {
            return Err(InsightsError::InvalidRequest(
                "estimator, portfolio and simulation counts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BacktestOptions;

    #[test]
    fn test_empty_grid_uses_defaults() {
        let defaults = BacktestOptions::default().defaults;
        let cells = HyperparameterGrid::default().cells(&defaults);
        assert_eq!(cells, vec![defaults]);
    }

    #[test]
    fn test_product_order() {
        let grid = HyperparameterGrid {
            max_depths: vec![Some(3), None],
            risk_free_rates: vec![0.0, 0.01, 0.02],
            ..HyperparameterGrid::default()
        };
        let cells = grid.cells(&BacktestOptions::default().defaults);
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0].max_depth, Some(3));
        assert_eq!(cells[1].risk_free_rate, 0.01);
        assert_eq!(cells[3].max_depth, None);
        assert_eq!(cells[3].risk_free_rate, 0.0);
    }

    #[test]
    fn test_risk_rate_grid() {
        let cells = HyperparameterGrid::for_risk_rates(&[0.0, 0.02])
            .cells(&BacktestOptions::default().defaults);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].n_estimators, 100);
        assert_eq!(cells[0].max_depth, Some(10));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_rate = HyperparameterGrid::for_risk_rates(&[f64::NAN]);
        assert!(bad_rate.validate().is_err());
        let bad_holdout = HyperparameterGrid {
            holdout_days: vec![0],
            ..HyperparameterGrid::default()
        };
        assert!(bad_holdout.validate().is_err());
        assert!(HyperparameterGrid::default().validate().is_ok());
    }
}
