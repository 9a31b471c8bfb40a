use chrono::NaiveDate;
use insights_core::{CloseMatrix, InsightsError, InsightsResult, PricePanel};
use nalgebra::{DMatrix, DVector};
use statrs::statistics::Statistics;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Daily return statistics for a fixed, sorted set of symbols.
///
/// Returns are `price[t] / price[t-1] - 1`. A date contributes a row only if
/// every symbol has both that day's and the previous row's close, so the mean
/// vector and the covariance matrix always come from the same rows.
#[derive(Debug, Clone)]
pub struct ReturnStatistics {
    symbols: Vec<String>,
    dates: Vec<NaiveDate>,
    returns: DMatrix<f64>,
    mean_returns: DVector<f64>,
    cov_matrix: DMatrix<f64>,
    volatilities: DVector<f64>,
}

impl ReturnStatistics {
    pub fn from_panel(panel: &PricePanel) -> InsightsResult<Self> {
        Self::from_close_matrix(&panel.close_matrix())
    }

    pub fn from_close_matrix(matrix: &CloseMatrix) -> InsightsResult<Self> {
        let n_assets = matrix.symbols.len();
        if n_assets == 0 {
            return Err(InsightsError::InsufficientData(
                "price panel has no symbols".to_string(),
            ));
        }

        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(matrix.values.len());
        let mut dates = Vec::with_capacity(matrix.values.len());
        for t in 1..matrix.values.len() {
            let row: Option<Vec<f64>> = matrix.values[t - 1]
                .iter()
                .zip(&matrix.values[t])
                .map(|pair| match pair {
                    (Some(prev), Some(cur)) if *prev != 0.0 => Some(cur / prev - 1.0),
                    _ => None,
                })
                .collect();
            if let Some(row) = row {
                rows.push(row);
                dates.push(matrix.dates[t]);
            }
        }

        if rows.len() < 2 {
            return Err(InsightsError::InsufficientData(format!(
                "need at least 2 complete daily return rows across {} symbols, found {}",
                n_assets,
                rows.len()
            )));
        }

        let dropped = matrix.values.len().saturating_sub(1) - rows.len();
        if dropped > 0 {
            tracing::debug!("Dropped {} return rows with a missing or zero close", dropped);
        }

        let columns: Vec<Vec<f64>> = (0..n_assets)
            .map(|j| rows.iter().map(|r| r[j]).collect())
            .collect();

        let mean_returns = DVector::from_iterator(
            n_assets,
            columns.iter().map(|c| c.as_slice().mean()),
        );
        let volatilities = DVector::from_iterator(
            n_assets,
            columns.iter().map(|c| c.as_slice().std_dev()),
        );
        let cov_matrix = DMatrix::from_fn(n_assets, n_assets, |i, j| {
            sample_covariance(&columns[i], mean_returns[i], &columns[j], mean_returns[j])
        });

        if cov_matrix.iter().any(|v| !v.is_finite()) || mean_returns.iter().any(|v| !v.is_finite()) {
            return Err(InsightsError::Calculation(
                "return statistics are not finite".to_string(),
            ));
        }

        Ok(Self {
            symbols: matrix.symbols.clone(),
            dates,
            returns: DMatrix::from_fn(rows.len(), n_assets, |i, j| rows[i][j]),
            mean_returns,
            cov_matrix,
            volatilities,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Dates of the rows that survived gap removal.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn num_assets(&self) -> usize {
        self.symbols.len()
    }

    pub fn num_observations(&self) -> usize {
        self.dates.len()
    }

    /// Observations x symbols
    pub fn returns(&self) -> &DMatrix<f64> {
        &self.returns
    }

    pub fn mean_returns(&self) -> &DVector<f64> {
        &self.mean_returns
    }

    pub fn cov_matrix(&self) -> &DMatrix<f64> {
        &self.cov_matrix
    }

    /// Sample standard deviation of each symbol's daily returns.
    pub fn volatilities(&self) -> &DVector<f64> {
        &self.volatilities
    }

    pub fn return_series(&self, symbol: &str) -> Option<Vec<f64>> {
        let col = self.symbols.iter().position(|s| s == symbol)?;
        Some(self.returns.column(col).iter().copied().collect())
    }

    pub fn portfolio_return(&self, weights: &DVector<f64>) -> f64 {
        weights.dot(&self.mean_returns)
    }

    pub fn portfolio_volatility(&self, weights: &DVector<f64>) -> f64 {
        let variance = weights.dot(&(&self.cov_matrix * weights));
        // Rounding can push a zero-variance quadratic form slightly negative.
        variance.max(0.0).sqrt()
    }
}

fn sample_covariance(x: &[f64], x_mean: f64, y: &[f64], y_mean: f64) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let sum: f64 = x
        .iter()
        .zip(y)
        .map(|(a, b)| (a - x_mean) * (b - y_mean))
        .sum();
    sum / (n as f64 - 1.0)
}

/// Fractional returns of a single price series, skipping zero-price predecessors.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn annualize_return(daily: f64) -> f64 {
    daily * TRADING_DAYS_PER_YEAR
}

pub fn annualize_volatility(daily: f64) -> f64 {
    daily * TRADING_DAYS_PER_YEAR.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use insights_core::PriceRecord;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn two_asset_panel() -> PricePanel {
        let a = [100.0, 110.0, 99.0, 108.9];
        let b = [50.0, 50.0, 55.0, 55.0];
        let mut records = Vec::new();
        for (i, (pa, pb)) in a.iter().zip(b.iter()).enumerate() {
            records.push(PriceRecord::new(d(i as u32 + 2), "AAA", *pa, 1_000.0));
            records.push(PriceRecord::new(d(i as u32 + 2), "BBB", *pb, 1_000.0));
        }
        PricePanel::new(records).unwrap()
    }

    #[test]
    fn test_mean_and_covariance() {
        let stats = ReturnStatistics::from_panel(&two_asset_panel()).unwrap();
        assert_eq!(stats.num_assets(), 2);
        assert_eq!(stats.num_observations(), 3);

        // AAA: +10%, -10%, +10%; BBB: 0%, +10%, 0%
        assert_relative_eq!(stats.mean_returns()[0], 0.1 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stats.mean_returns()[1], 0.1 / 3.0, epsilon = 1e-12);

        let var_a = ((0.1f64 - 0.1 / 3.0).powi(2) * 2.0 + (-0.1f64 - 0.1 / 3.0).powi(2)) / 2.0;
        assert_relative_eq!(stats.cov_matrix()[(0, 0)], var_a, epsilon = 1e-12);
        assert_relative_eq!(stats.cov_matrix()[(0, 1)], stats.cov_matrix()[(1, 0)], epsilon = 1e-15);
        assert!(stats.cov_matrix()[(0, 1)] < 0.0);
        assert_relative_eq!(stats.volatilities()[0], var_a.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_rows_with_gaps_are_dropped() {
        let mut records = two_asset_panel().records().to_vec();
        // Remove BBB on day 3: the returns for day 3 and day 4 both disappear.
        records.retain(|r| !(r.symbol == "BBB" && r.date == d(3)));
        records.push(PriceRecord::new(d(6), "AAA", 120.0, 1.0));
        records.push(PriceRecord::new(d(6), "BBB", 60.0, 1.0));
        let stats = ReturnStatistics::from_panel(&PricePanel::new(records).unwrap()).unwrap();
        assert_eq!(stats.dates(), &[d(5), d(6)]);
    }

    #[test]
    fn test_insufficient_rows() {
        let panel = PricePanel::new(vec![
            PriceRecord::new(d(2), "AAA", 100.0, 1.0),
            PriceRecord::new(d(3), "AAA", 101.0, 1.0),
        ])
        .unwrap();
        assert!(matches!(
            ReturnStatistics::from_panel(&panel),
            Err(InsightsError::InsufficientData(_))
        ));
        assert!(matches!(
            ReturnStatistics::from_panel(&PricePanel::default()),
            Err(InsightsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_portfolio_moments() {
        let stats = ReturnStatistics::from_panel(&two_asset_panel()).unwrap();
        let w = DVector::from_vec(vec![1.0, 0.0]);
        assert_relative_eq!(stats.portfolio_return(&w), stats.mean_returns()[0], epsilon = 1e-15);
        assert_relative_eq!(stats.portfolio_volatility(&w), stats.volatilities()[0], epsilon = 1e-12);
        let bbb = stats.return_series("BBB").unwrap();
        assert_eq!(bbb.len(), 3);
        assert_relative_eq!(bbb[1], 0.1, epsilon = 1e-12);
        assert!(stats.return_series("ZZZ").is_none());
    }

    #[test]
    fn test_simple_returns() {
        let r = simple_returns(&[100.0, 105.0, 0.0, 10.0]);
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0], 0.05, epsilon = 1e-12);
        assert_relative_eq!(r[1], -1.0, epsilon = 1e-12);
    }
}
