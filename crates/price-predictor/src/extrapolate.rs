use chrono::{Datelike, Duration, NaiveDate, Weekday};
use insights_core::{InsightsError, InsightsResult, PricePanel};
use quant_analysis::{simple_returns, GarchModel};
use serde::Serialize;
use statrs::statistics::Statistics;

/// Close projected past the end of a symbol's history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceExtrapolation {
    pub symbol: String,
    pub last_date: NaiveDate,
    pub last_close: f64,
    pub target_date: NaiveDate,
    /// Weekdays in `(last_date, target_date]`
    pub horizon: usize,
    pub avg_return: f64,
    pub forecast_volatility: f64,
    pub close: f64,
    pub model: GarchModel,
}

/// Number of weekdays after `last` up to and including `target`.
pub fn trading_days_between(last: NaiveDate, target: NaiveDate) -> usize {
    let total = (target - last).num_days();
    if total <= 0 {
        return 0;
    }
    let weeks = total / 7;
    let mut count = (weeks * 5) as usize;
    let mut day = last + Duration::days(weeks * 7);
    while day < target {
        day += Duration::days(1);
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            count += 1;
        }
    }
    count
}

/// `last_close * exp(avg_return * h + 0.5 * vol^2)` where `vol` is the GARCH
/// forecast of the h-day cumulative volatility.
pub fn extrapolate_close(
    panel: &PricePanel,
    symbol: &str,
    target: NaiveDate,
) -> InsightsResult<PriceExtrapolation> {
    let history = panel.closes_for(symbol);
    let (last_date, last_close) = history.last().copied().ok_or_else(|| {
        InsightsError::InsufficientData(format!("no price history for {}", symbol))
    })?;

    let horizon = trading_days_between(last_date, target);
    if horizon == 0 {
        return Err(InsightsError::ForecastRange {
            last: last_date,
            target,
        });
    }

    let prices: Vec<f64> = history.iter().map(|(_, close)| *close).collect();
    let returns = simple_returns(&prices);
    let model = GarchModel::fit(&returns)?;
    let avg_return = returns.as_slice().mean();
    let forecast_volatility = model.forecast_volatility(horizon);
    let close =
        last_close * (avg_return * horizon as f64 + 0.5 * forecast_volatility.powi(2)).exp();

    if !close.is_finite() {
        return Err(InsightsError::Calculation(format!(
            "extrapolated close for {} is not finite",
            symbol
        )));
    }

    tracing::debug!(
        "Extrapolated {} from {} to {} ({} trading days): {:.4}",
        symbol,
        last_date,
        target,
        horizon,
        close
    );

    Ok(PriceExtrapolation {
        symbol: symbol.to_string(),
        last_date,
        last_close,
        target_date: target,
        horizon,
        avg_return,
        forecast_volatility,
        close,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use insights_core::PriceRecord;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weekday_panel(closes: &[f64]) -> PricePanel {
        let mut date = ymd(2024, 1, 1);
        let mut records = Vec::new();
        for &c in closes {
            while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                date += Duration::days(1);
            }
            records.push(PriceRecord::new(date, "XOM", c, 1.0));
            date += Duration::days(1);
        }
        PricePanel::new(records).unwrap()
    }

    #[test]
    fn test_trading_days_skip_weekends() {
        // Friday 2024-01-05 -> Monday 2024-01-08
        assert_eq!(trading_days_between(ymd(2024, 1, 5), ymd(2024, 1, 8)), 1);
        assert_eq!(trading_days_between(ymd(2024, 1, 5), ymd(2024, 1, 7)), 0);
        assert_eq!(trading_days_between(ymd(2024, 1, 1), ymd(2024, 1, 29)), 20);
        assert_eq!(trading_days_between(ymd(2024, 1, 8), ymd(2024, 1, 8)), 0);
        assert_eq!(trading_days_between(ymd(2024, 1, 8), ymd(2024, 1, 1)), 0);
    }

    #[test]
    fn test_flat_history_extrapolates_flat() {
        let panel = weekday_panel(&[50.0; 30]);
        let last = panel.last_date().unwrap();
        let ext = extrapolate_close(&panel, "XOM", last + Duration::days(14)).unwrap();
        assert_eq!(ext.horizon, 10);
        assert_relative_eq!(ext.close, 50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_growth_matches_formula() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 * (1.0 + 0.01 * ((i % 3) as f64 - 0.5)).powi(i))
            .collect();
        let panel = weekday_panel(&closes);
        let last = panel.last_date().unwrap();
        let ext = extrapolate_close(&panel, "XOM", last + Duration::days(7)).unwrap();
        let expected = ext.last_close
            * (ext.avg_return * ext.horizon as f64 + 0.5 * ext.forecast_volatility.powi(2)).exp();
        assert_relative_eq!(ext.close, expected, epsilon = 1e-9);
        assert!(ext.forecast_volatility > 0.0);
    }

    #[test]
    fn test_target_inside_history_is_out_of_range() {
        let panel = weekday_panel(&[50.0; 30]);
        let last = panel.last_date().unwrap();
        assert!(matches!(
            extrapolate_close(&panel, "XOM", last),
            Err(InsightsError::ForecastRange { .. })
        ));
        assert!(matches!(
            extrapolate_close(&panel, "CVX", last + Duration::days(3)),
            Err(InsightsError::InsufficientData(_))
        ));
    }
}
