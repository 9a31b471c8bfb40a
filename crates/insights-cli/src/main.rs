//! insights-cli: portfolio insights, backtests and sentiment analysis over
//! local CSV/JSON data.
//!
//! Usage:
//!   insights-cli insights --risk-profile moderate --start-date 2023-01-03 --end-date 2023-06-30
//!   insights-cli insights --risk-profile high --horizon-days 60 --seed 7
//!   insights-cli backtest --seed 7
//!   insights-cli backtest --without-model
//!   insights-cli sentiment --ticker XOM --max-lag 10

mod config;

use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use backtest_engine::{BacktestHarness, BacktestOptions, HyperparameterGrid};
use chrono::NaiveDate;
use config::AppConfig;
use insights_core::{
    ErrorReport, FundamentalsPanel, FundamentalsProvider, InsightsError, PriceHistoryProvider,
    PricePanel, RiskProfile,
};
use market_data::{analyze_sentiment, CsvFundamentals, CsvPriceHistory, SentimentFeed};
use portfolio_optimizer::{compute_portfolio_insights, InsightsRequest};
use serde::Serialize;

const DEFAULT_MAX_LAG: usize = 10;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let cause = err.downcast_ref::<InsightsError>();
            match cause.map(|e| serde_json::to_string_pretty(&ErrorReport::from(e))) {
                Some(Ok(json)) => eprintln!("{}", json),
                _ => eprintln!("Error: {:#}", err),
            }
            if cause.map_or(false, InsightsError::is_client_error) {
                ExitCode::from(2)
            } else {
                tracing::error!("{:#}", err);
                ExitCode::from(1)
            }
        }
    }
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    // Logs go to stderr so stdout carries only the JSON result.
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run(args: &[String]) -> Result<()> {
    let command = match args.first() {
        Some(command) => command.as_str(),
        None => {
            print_usage();
            return Err(InsightsError::InvalidRequest("missing command".to_string()).into());
        }
    };
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return Ok(());
    }
    let config = AppConfig::from_env()?;

    match command {
        "insights" => run_insights(args, &config),
        "backtest" => run_backtest(args, &config),
        "sentiment" => run_sentiment(args, &config),
        other => {
            print_usage();
            Err(InsightsError::InvalidRequest(format!("unknown command '{}'", other)).into())
        }
    }
}

fn run_insights(args: &[String], config: &AppConfig) -> Result<()> {
    let request = InsightsRequest {
        risk_profile: parse_flag::<RiskProfile>(args, "--risk-profile")?.unwrap_or_default(),
        start_date: parse_flag::<NaiveDate>(args, "--start-date")?,
        end_date: parse_flag::<NaiveDate>(args, "--end-date")?,
        horizon_days: parse_flag::<i64>(args, "--horizon-days")?,
        seed: parse_flag::<u64>(args, "--seed")?,
    };

    let panel = load_prices(config)?;
    let fundamentals = load_fundamentals(config)?;

    tracing::info!(
        "Computing insights for risk profile {} over {} symbols",
        request.risk_profile,
        panel.symbols().len()
    );
    let insights = compute_portfolio_insights(&panel, fundamentals.as_ref(), &request, &config.engine)?;
    print_json(&insights)
}

fn run_backtest(args: &[String], config: &AppConfig) -> Result<()> {
    let mut options = BacktestOptions::from_config(&config.engine);
    options.time_budget = config.backtest_time_budget;
    if let Some(seed) = parse_flag::<u64>(args, "--seed")? {
        options.seed = Some(seed);
    }
    let grid = HyperparameterGrid::for_risk_rates(&config.engine.backtest_risk_free_rates);

    let panel = load_prices(config)?;
    let fundamentals = load_fundamentals(config)?;
    let harness = BacktestHarness::new(grid, options);
    let report = if args.iter().any(|a| a == "--without-model") {
        harness.run_without_model(&panel)?
    } else {
        harness.run(&panel, fundamentals.as_ref())?
    };
    print_json(&report)
}

fn run_sentiment(args: &[String], config: &AppConfig) -> Result<()> {
    let ticker = parse_flag::<String>(args, "--ticker")?
        .map(|t| t.trim().to_uppercase())
        .ok_or_else(|| InsightsError::InvalidRequest("--ticker is required".to_string()))?;
    let max_lag = parse_flag::<usize>(args, "--max-lag")?.unwrap_or(DEFAULT_MAX_LAG);

    let feed_path = config
        .sentiment_json
        .as_deref()
        .context("SENTIMENT_JSON must be set for the sentiment command")?;
    let feed = SentimentFeed::from_path(feed_path)?;
    let panel = load_prices(config)?;

    let analysis = analyze_sentiment(&feed, &panel, &ticker, max_lag)?;
    print_json(&analysis)
}

fn load_prices(config: &AppConfig) -> Result<PricePanel> {
    let panel = CsvPriceHistory::new(&config.price_history_csv).load()?;
    Ok(panel)
}

fn load_fundamentals(config: &AppConfig) -> Result<Option<FundamentalsPanel>> {
    match config.fundamentals_csv.as_deref() {
        Some(path) => Ok(Some(CsvFundamentals::new(path).load()?)),
        None => Ok(None),
    }
}

/// Value following `flag`, parsed. A flag given without a value or with an
/// unparseable one is a client error.
fn parse_flag<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let position = match args.iter().position(|a| a == flag) {
        Some(position) => position,
        None => return Ok(None),
    };
    let raw = args
        .get(position + 1)
        .filter(|v| !v.starts_with("--"))
        .ok_or_else(|| InsightsError::InvalidRequest(format!("{} requires a value", flag)))?;
    let value = raw.parse::<T>().map_err(|e| {
        InsightsError::InvalidRequest(format!("invalid value '{}' for {}: {}", raw, flag, e))
    })?;
    Ok(Some(value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  insights-cli insights [--risk-profile low|moderate|high] [--start-date YYYY-MM-DD]");
    eprintln!("                        [--end-date YYYY-MM-DD] [--horizon-days N] [--seed S]");
    eprintln!("  insights-cli backtest [--seed S] [--without-model]");
    eprintln!("  insights-cli sentiment --ticker T [--max-lag N]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PRICE_HISTORY_CSV   daily closes (default: data/historical_stock_data.csv)");
    eprintln!("  FUNDAMENTALS_CSV    optional EPS/PE/ROE/ROA/ROI table");
    eprintln!("  SENTIMENT_JSON      news sentiment feed for the sentiment command");
}
