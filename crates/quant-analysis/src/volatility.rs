use insights_core::{InsightsError, InsightsResult};
use serde::Serialize;
use statrs::statistics::Statistics;

const MIN_OBSERVATIONS: usize = 5;

/// GARCH(1,1) conditional variance model for daily returns.
///
/// `sigma2[t] = omega + alpha * eps[t-1]^2 + beta * sigma2[t-1]`, with
/// `omega` pinned by variance targeting so the unconditional variance equals
/// the sample variance. `alpha` and `beta` are chosen by maximizing the
/// Gaussian log-likelihood over a fixed grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GarchModel {
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    pub long_run_variance: f64,
    /// One-step-ahead conditional variance after the last observation
    pub next_variance: f64,
    pub log_likelihood: f64,
}

impl GarchModel {
    pub fn fit(returns: &[f64]) -> InsightsResult<Self> {
        if returns.len() < MIN_OBSERVATIONS {
            return Err(InsightsError::InsufficientData(format!(
                "GARCH fit needs at least {} returns, got {}",
                MIN_OBSERVATIONS,
                returns.len()
            )));
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(InsightsError::Calculation(
                "returns contain non-finite values".to_string(),
            ));
        }

        let mean = returns.mean();
        let residuals: Vec<f64> = returns.iter().map(|r| r - mean).collect();
        let variance = residuals.iter().map(|e| e * e).sum::<f64>() / residuals.len() as f64;

        if variance <= f64::EPSILON * f64::EPSILON {
            // Flat series: no conditional variance to model.
            return Ok(Self {
                omega: 0.0,
                alpha: 0.0,
                beta: 0.0,
                long_run_variance: 0.0,
                next_variance: 0.0,
                log_likelihood: 0.0,
            });
        }

        let mut best: Option<Self> = None;
        for a in 1..=30 {
            let alpha = a as f64 * 0.01;
            for b in 50..=98 {
                let beta = b as f64 * 0.01;
                if alpha + beta >= 0.999 {
                    continue;
                }
                let omega = variance * (1.0 - alpha - beta);
                let (log_likelihood, next_variance) =
                    filter(&residuals, omega, alpha, beta, variance);
                if !log_likelihood.is_finite() {
                    continue;
                }
                if best.map_or(true, |m| log_likelihood > m.log_likelihood) {
                    best = Some(Self {
                        omega,
                        alpha,
                        beta,
                        long_run_variance: variance,
                        next_variance,
                        log_likelihood,
                    });
                }
            }
        }

        let model = best.ok_or_else(|| {
            InsightsError::Calculation("GARCH likelihood undefined on every grid point".to_string())
        })?;
        tracing::debug!(
            "GARCH fit on {} returns: alpha {:.2}, beta {:.2}",
            returns.len(),
            model.alpha,
            model.beta
        );
        Ok(model)
    }

    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    /// Conditional variance for each of the next `horizon` days.
    pub fn forecast_variance(&self, horizon: usize) -> Vec<f64> {
        let persistence = self.persistence();
        let mut decay = 1.0;
        (0..horizon)
            .map(|_| {
                let v = self.long_run_variance + decay * (self.next_variance - self.long_run_variance);
                decay *= persistence;
                v.max(0.0)
            })
            .collect()
    }

    /// Standard deviation of the summed return over the next `horizon` days.
    pub fn forecast_volatility(&self, horizon: usize) -> f64 {
        self.forecast_variance(horizon).iter().sum::<f64>().sqrt()
    }
}

/// Runs the variance recursion, returning (log-likelihood without constant,
/// one-step-ahead variance).
fn filter(residuals: &[f64], omega: f64, alpha: f64, beta: f64, initial: f64) -> (f64, f64) {
    let mut sigma2 = initial;
    let mut ll = 0.0;
    for e in residuals {
        if sigma2 <= 0.0 {
            return (f64::NEG_INFINITY, sigma2);
        }
        ll -= 0.5 * (sigma2.ln() + e * e / sigma2);
        sigma2 = omega + alpha * e * e + beta * sigma2;
    }
    (ll, sigma2)
}
