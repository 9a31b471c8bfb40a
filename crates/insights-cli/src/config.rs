use anyhow::{Context, Result};
use insights_core::EngineConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Data files
    pub price_history_csv: PathBuf,
    pub fundamentals_csv: Option<PathBuf>,
    pub sentiment_json: Option<PathBuf>,

    // Backtest wall-clock budget; unset means no limit
    pub backtest_time_budget: Option<Duration>,

    pub engine: EngineConfig,
}

impl AppConfig {
    /// Reads settings from the process environment. Call `dotenvy::dotenv()`
    /// first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();
        let mut engine = defaults.clone();

        engine.num_portfolios = parse_or(&lookup, "NUM_PORTFOLIOS", defaults.num_portfolios)?;
        engine.num_simulations = parse_or(&lookup, "NUM_SIMULATIONS", defaults.num_simulations)?;
        engine.initial_investment =
            parse_or(&lookup, "INITIAL_INVESTMENT", defaults.initial_investment)?;
        engine.seed = parse_opt(&lookup, "INSIGHTS_SEED")?;
        engine.risk_free.low = parse_or(&lookup, "RISK_FREE_LOW", defaults.risk_free.low)?;
        engine.risk_free.moderate =
            parse_or(&lookup, "RISK_FREE_MODERATE", defaults.risk_free.moderate)?;
        engine.risk_free.high = parse_or(&lookup, "RISK_FREE_HIGH", defaults.risk_free.high)?;
        engine.backtest_holdout_days =
            parse_or(&lookup, "BACKTEST_HOLDOUT_DAYS", defaults.backtest_holdout_days)?;

        engine.validate().context("invalid engine configuration")?;

        let config = Self {
            price_history_csv: lookup("PRICE_HISTORY_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/historical_stock_data.csv")),
            fundamentals_csv: lookup("FUNDAMENTALS_CSV").map(PathBuf::from),
            sentiment_json: lookup("SENTIMENT_JSON").map(PathBuf::from),
            backtest_time_budget: parse_opt::<u64, _>(&lookup, "BACKTEST_TIME_BUDGET_SECS")?
                .map(Duration::from_secs),
            engine,
        };

        Ok(config)
    }
}

fn parse_opt<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        _ => Ok(None),
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}
