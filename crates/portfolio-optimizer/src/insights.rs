use std::collections::BTreeMap;

use insights_core::{
    derive_seed, resolve_seed, EngineConfig, FundamentalsPanel, InsightsError, InsightsResult,
    PricePanel,
};
use price_predictor::PricePredictor;
use quant_analysis::{annualize_return, annualize_volatility, ReturnStatistics};

use crate::growth::{needs_backfill, GrowthEstimator};
use crate::models::{InsightsRequest, PortfolioInsights, PortfolioPerformance};
use crate::sampler::PortfolioSampler;

const SAMPLER_STREAM: u64 = 0;
const PROJECTION_STREAM: u64 = 1;

/// Max-Sharpe allocation for the requested risk profile, plus optional
/// growth between two dates and an optional forward projection.
///
/// Growth is computed only when both `start_date` and `end_date` are given;
/// a request naming just one of them is rejected with `InvalidRequest`.
///
/// Everything is derived from one seed (the request's, else the config's,
/// else fresh entropy), reported back so the call can be replayed.
pub fn compute_portfolio_insights(
    panel: &PricePanel,
    fundamentals: Option<&FundamentalsPanel>,
    request: &InsightsRequest,
    config: &EngineConfig,
) -> InsightsResult<PortfolioInsights> {
    config.validate()?;
    let seed = resolve_seed(request.seed.or(config.seed));
    let risk_free_rate = config.risk_free.rate_for(request.risk_profile);

    tracing::info!(
        "Computing portfolio insights: {} symbols, {} rows, profile {} (rf {}), seed {}",
        panel.symbols().len(),
        panel.len(),
        request.risk_profile,
        risk_free_rate,
        seed
    );

    let stats = ReturnStatistics::from_panel(panel)?;
    let outcome = PortfolioSampler::new(config.num_portfolios).sample(
        &stats,
        risk_free_rate,
        Some(derive_seed(seed, SAMPLER_STREAM)),
    )?;
    let optimal = *outcome.optimal();

    let performance = PortfolioPerformance {
        expected_return: optimal.expected_return,
        volatility: optimal.volatility,
        sharpe_ratio: outcome.optimal_sharpe(),
        annualized_return: annualize_return(optimal.expected_return),
        annualized_volatility: annualize_volatility(optimal.volatility),
    };

    let volatilities: BTreeMap<String, f64> = stats
        .symbols()
        .iter()
        .cloned()
        .zip(stats.volatilities().iter().copied())
        .collect();

    let estimator = GrowthEstimator::new(config.initial_investment, config.num_simulations);

    let mut model_metrics = None;
    let investment_growth = match (request.start_date, request.end_date) {
        (None, None) => None,
        (Some(_), None) | (None, Some(_)) => {
            return Err(InsightsError::InvalidRequest(
                "start_date and end_date must be given together".to_string(),
            ));
        }
        (Some(start), Some(end)) => {
            let predictions = if needs_backfill(panel, start, end) {
                let fitted = PricePredictor::new(config.model, config.test_fraction)
                    .fit_panel(panel, fundamentals)?;
                model_metrics = Some(*fitted.metrics());
                Some(fitted.predict_panel(panel, fundamentals)?)
            } else {
                None
            };
            Some(estimator.between(
                panel,
                &outcome.symbols,
                &outcome.optimal_weights,
                start,
                end,
                predictions.as_ref(),
            )?)
        }
    };

    let projection = match request.horizon_days {
        Some(days) => estimator.simulate(
            &stats,
            &outcome.optimal_weights,
            days,
            Some(derive_seed(seed, PROJECTION_STREAM)),
        )?,
        None => None,
    };

    Ok(PortfolioInsights {
        risk_profile: request.risk_profile,
        risk_free_rate,
        weights: outcome.weights_by_symbol(),
        volatilities,
        performance,
        investment_growth,
        projected_value: projection.as_ref().map(|p| p.portfolio_value),
        projection,
        model_metrics,
        seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};
    use insights_core::{ModelParams, PriceRecord, RiskProfile};

    use crate::models::GrowthMethod;

    fn panel() -> PricePanel {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let a = [100.0, 101.5, 100.8, 102.9, 103.4, 102.1, 104.8, 105.2, 104.9, 106.3];
        let b = [40.0, 39.6, 40.3, 40.1, 41.0, 41.4, 40.7, 41.9, 42.3, 42.0];
        let c = [75.0, 75.9, 76.4, 75.2, 76.8, 77.5, 77.1, 78.4, 78.0, 79.2];
        let mut records = Vec::new();
        for i in 0..a.len() {
            let date = start + Duration::days(i as i64);
            records.push(PriceRecord::new(date, "MSFT", a[i], 1_000.0));
            records.push(PriceRecord::new(date, "KO", b[i], 2_000.0));
            records.push(PriceRecord::new(date, "JNJ", c[i], 1_500.0));
        }
        PricePanel::new(records).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig {
            num_portfolios: 500,
            num_simulations: 50,
            ..EngineConfig::default()
        }
    }

    fn request() -> InsightsRequest {
        InsightsRequest {
            risk_profile: RiskProfile::High,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 2),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 9),
            horizon_days: Some(15),
            seed: Some(2024),
        }
    }

    #[test]
    fn test_identical_inputs_serialize_identically() {
        let a = compute_portfolio_insights(&panel(), None, &request(), &config()).unwrap();
        let b = compute_portfolio_insights(&panel(), None, &request(), &config()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert_eq!(a.seed, 2024);
    }

    #[test]
    fn test_insights_shape() {
        let insights = compute_portfolio_insights(&panel(), None, &request(), &config()).unwrap();
        assert_eq!(insights.risk_free_rate, 0.02);
        assert_eq!(
            insights.weights.keys().cloned().collect::<Vec<_>>(),
            vec!["JNJ", "KO", "MSFT"]
        );
        assert_relative_eq!(insights.weights.values().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_eq!(insights.volatilities.len(), 3);
        assert_relative_eq!(
            insights.performance.annualized_return,
            insights.performance.expected_return * 252.0,
            epsilon = 1e-12
        );

        let growth = insights.investment_growth.unwrap();
        assert_eq!(growth.method, GrowthMethod::Realized);
        assert!(insights.model_metrics.is_none());
        assert_eq!(insights.projected_value, insights.projection.map(|p| p.portfolio_value));
    }

    #[test]
    fn test_no_dates_no_growth() {
        let req = InsightsRequest {
            start_date: None,
            end_date: None,
            horizon_days: Some(0),
            ..request()
        };
        let insights = compute_portfolio_insights(&panel(), None, &req, &config()).unwrap();
        assert!(insights.investment_growth.is_none());
        assert!(insights.projected_value.is_none());
    }

    #[test]
    fn test_reversed_dates_rejected() {
        let req = InsightsRequest {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 9),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..request()
        };
        let err = compute_portfolio_insights(&panel(), None, &req, &config()).unwrap_err();
        assert!(matches!(err, InsightsError::InvalidRequest(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_single_date_is_rejected() {
        for (start, end) in [
            (NaiveDate::from_ymd_opt(2024, 1, 2), None),
            (None, NaiveDate::from_ymd_opt(2024, 1, 9)),
        ] {
            let req = InsightsRequest {
                start_date: start,
                end_date: end,
                ..request()
            };
            let err = compute_portfolio_insights(&panel(), None, &req, &config()).unwrap_err();
            assert!(matches!(err, InsightsError::InvalidRequest(_)));
        }
    }

    #[test]
    fn test_end_past_history_is_extrapolated() {
        let req = InsightsRequest {
            end_date: NaiveDate::from_ymd_opt(2024, 1, 20),
            ..request()
        };
        let insights = compute_portfolio_insights(&panel(), None, &req, &config()).unwrap();
        let growth = insights.investment_growth.unwrap();
        assert_eq!(growth.method, GrowthMethod::Extrapolated);
        assert!(growth.portfolio_value.is_finite());
        assert!(insights.model_metrics.is_none());
    }

    #[test]
    fn test_gap_inside_history_fits_model_and_backfills() {
        // KO has no row on Jan 5
        let gap = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let records = panel()
            .records()
            .iter()
            .filter(|r| !(r.date == gap && r.symbol == "KO"))
            .cloned()
            .collect();
        let gappy = PricePanel::new(records).unwrap();
        let cfg = EngineConfig {
            model: ModelParams {
                n_estimators: 10,
                ..ModelParams::default()
            },
            ..config()
        };
        let req = InsightsRequest {
            end_date: Some(gap),
            ..request()
        };

        let insights = compute_portfolio_insights(&gappy, None, &req, &cfg).unwrap();
        assert_eq!(insights.investment_growth.unwrap().method, GrowthMethod::Backfilled);
        let metrics = insights.model_metrics.unwrap();
        assert!(metrics.train_rows > 0 && metrics.test_rows > 0);
    }
}
