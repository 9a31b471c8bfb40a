use insights_core::{resolve_seed, stream_rng, InsightsError, InsightsResult};
use nalgebra::DVector;
use quant_analysis::ReturnStatistics;
use rand::Rng;
use rayon::prelude::*;

use crate::models::{SamplerOutcome, SimulationResult};

/// Trials per RNG stream. Fixed so a seed maps to the same draws regardless
/// of thread count.
pub const BLOCK_SIZE: usize = 1024;

/// Monte Carlo search over the weight simplex for the max-Sharpe portfolio.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioSampler {
    num_trials: usize,
}

struct BlockOutcome {
    results: Vec<SimulationResult>,
    best: Option<(usize, f64, Vec<f64>)>,
}

impl PortfolioSampler {
    pub fn new(num_trials: usize) -> Self {
        Self { num_trials }
    }

    pub fn num_trials(&self) -> usize {
        self.num_trials
    }

    /// Draws `num_trials` portfolios, each `num_assets` uniform values scaled
    /// to sum to one, and keeps the first trial with the highest defined
    /// Sharpe ratio.
    pub fn sample(
        &self,
        stats: &ReturnStatistics,
        risk_free_rate: f64,
        seed: Option<u64>,
    ) -> InsightsResult<SamplerOutcome> {
        if self.num_trials == 0 {
            return Err(InsightsError::InvalidRequest(
                "number of portfolios must be positive".to_string(),
            ));
        }
        if !risk_free_rate.is_finite() {
            return Err(InsightsError::InvalidRequest(format!(
                "risk-free rate must be finite, got {}",
                risk_free_rate
            )));
        }

        let seed = resolve_seed(seed);
        let n_assets = stats.num_assets();
        let n_blocks = (self.num_trials + BLOCK_SIZE - 1) / BLOCK_SIZE;

        let blocks: Vec<BlockOutcome> = (0..n_blocks)
            .into_par_iter()
            .map(|block| {
                let mut rng = stream_rng(seed, block as u64);
                let start = block * BLOCK_SIZE;
                let end = (start + BLOCK_SIZE).min(self.num_trials);
                let mut results = Vec::with_capacity(end - start);
                let mut best: Option<(usize, f64, Vec<f64>)> = None;

                for trial in start..end {
                    let weights = random_weights(n_assets, &mut rng);
                    let w = DVector::from_column_slice(&weights);
                    let result = score(stats, &w, risk_free_rate);
                    if let Some(sharpe) = result.sharpe_ratio {
                        if best.as_ref().map_or(true, |(_, b, _)| sharpe > *b) {
                            best = Some((trial, sharpe, weights));
                        }
                    }
                    results.push(result);
                }

                BlockOutcome { results, best }
            })
            .collect();

        let mut results = Vec::with_capacity(self.num_trials);
        let mut best: Option<(usize, f64, Vec<f64>)> = None;
        for block in blocks {
            results.extend(block.results);
            if let Some(candidate) = block.best {
                // Blocks arrive in trial order, so strict > keeps the first maximum.
                if best.as_ref().map_or(true, |(_, b, _)| candidate.1 > *b) {
                    best = Some(candidate);
                }
            }
        }

        let (optimal_index, optimal_sharpe, optimal_weights) = best.ok_or_else(|| {
            InsightsError::UndefinedRatio(format!(
                "no portfolio out of {} had a defined Sharpe ratio (all volatilities zero)",
                self.num_trials
            ))
        })?;

        tracing::info!(
            "Sampled {} portfolios over {} assets (seed {}): best Sharpe {:.4} at trial {}",
            self.num_trials,
            n_assets,
            seed,
            optimal_sharpe,
            optimal_index
        );

        Ok(SamplerOutcome {
            seed,
            risk_free_rate,
            symbols: stats.symbols().to_vec(),
            results,
            optimal_index,
            optimal_weights,
        })
    }
}

/// Uniform [0, 1) draws divided by their sum. Not uniform on the simplex.
fn random_weights(n: usize, rng: &mut impl Rng) -> Vec<f64> {
    let raw: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        raw.iter().map(|v| v / sum).collect()
    } else {
        vec![1.0 / n as f64; n]
    }
}

pub fn score(stats: &ReturnStatistics, weights: &DVector<f64>, risk_free_rate: f64) -> SimulationResult {
    let expected_return = stats.portfolio_return(weights);
    let volatility = stats.portfolio_volatility(weights);
    let sharpe_ratio = if volatility > 0.0 {
        Some((expected_return - risk_free_rate) / volatility).filter(|s| s.is_finite())
    } else {
        None
    };
    SimulationResult {
        expected_return,
        volatility,
        sharpe_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use insights_core::{PricePanel, PriceRecord};

    fn stats_from(series: &[(&str, &[f64])]) -> ReturnStatistics {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let mut records = Vec::new();
        for (symbol, closes) in series {
            for (i, c) in closes.iter().enumerate() {
                records.push(PriceRecord::new(
                    start + chrono::Duration::days(i as i64),
                    *symbol,
                    *c,
                    1.0,
                ));
            }
        }
        ReturnStatistics::from_panel(&PricePanel::new(records).unwrap()).unwrap()
    }

    fn three_assets() -> ReturnStatistics {
        stats_from(&[
            ("AAA", &[100.0, 102.0, 101.0, 104.0, 103.0, 106.0]),
            ("BBB", &[50.0, 49.0, 51.0, 50.5, 52.0, 51.0]),
            ("CCC", &[20.0, 20.2, 20.1, 20.4, 20.6, 20.5]),
        ])
    }

    #[test]
    fn test_weights_on_simplex() {
        let outcome = PortfolioSampler::new(50).sample(&three_assets(), 0.0, Some(3)).unwrap();
        assert_eq!(outcome.results.len(), 50);
        assert_relative_eq!(outcome.optimal_weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(outcome.optimal_weights.iter().all(|w| *w >= 0.0));
        let mut rng = stream_rng(9, 0);
        for _ in 0..100 {
            let w = random_weights(5, &mut rng);
            assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fixed_seed_is_reproducible_across_blocks() {
        let stats = three_assets();
        let sampler = PortfolioSampler::new(3 * BLOCK_SIZE + 17);
        let a = sampler.sample(&stats, 0.01, Some(42)).unwrap();
        let b = sampler.sample(&stats, 0.01, Some(42)).unwrap();
        assert_eq!(a.optimal_weights, b.optimal_weights);
        assert_eq!(a.optimal_sharpe(), b.optimal_sharpe());
        assert_eq!(a.results, b.results);
        assert_eq!(a.seed, 42);
    }

    #[test]
    fn test_single_thread_pool_matches_default_pool() {
        let stats = three_assets();
        let sampler = PortfolioSampler::new(4 * BLOCK_SIZE + 5);
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| sampler.sample(&stats, 0.01, Some(11)).unwrap());
        let pooled = sampler.sample(&stats, 0.01, Some(11)).unwrap();
        assert_eq!(single.optimal_index, pooled.optimal_index);
        assert_eq!(single.optimal_weights, pooled.optimal_weights);
        assert_eq!(single.results, pooled.results);
    }

    #[test]
    fn test_optimal_is_first_maximum() {
        let outcome = PortfolioSampler::new(2_000).sample(&three_assets(), 0.0, Some(5)).unwrap();
        let best = outcome.optimal_sharpe();
        let first = outcome
            .results
            .iter()
            .position(|r| r.sharpe_ratio == Some(best))
            .unwrap();
        assert_eq!(first, outcome.optimal_index);
        assert!(outcome
            .results
            .iter()
            .all(|r| r.sharpe_ratio.map_or(true, |s| s <= best)));

        let m = outcome.results_matrix();
        assert_eq!(m.shape(), (3, 2_000));
        assert_eq!(m[(2, outcome.optimal_index)], best);
    }

    #[test]
    fn test_zero_volatility_has_no_sharpe() {
        let flat = stats_from(&[("AAA", &[10.0; 6]), ("BBB", &[20.0; 6])]);
        let err = PortfolioSampler::new(10).sample(&flat, 0.0, Some(1)).unwrap_err();
        assert!(matches!(err, InsightsError::UndefinedRatio(_)));
    }

    #[test]
    fn test_unseeded_run_reports_its_seed() {
        let stats = three_assets();
        let first = PortfolioSampler::new(20).sample(&stats, 0.0, None).unwrap();
        let replay = PortfolioSampler::new(20).sample(&stats, 0.0, Some(first.seed)).unwrap();
        assert_eq!(first.optimal_weights, replay.optimal_weights);
    }

    #[test]
    fn test_rejects_zero_trials() {
        assert!(matches!(
            PortfolioSampler::new(0).sample(&three_assets(), 0.0, Some(1)),
            Err(InsightsError::InvalidRequest(_))
        ));
    }
}
