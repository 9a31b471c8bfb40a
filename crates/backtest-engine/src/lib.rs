pub mod grid;
pub mod harness;
pub mod models;
pub mod reduction;


pub use harness::{backtest, backtest_risk_rates, growth_difference_percentage, BacktestHarness};
pub use models::*;
pub use reduction::{BestRecords, GridAccumulator, RateKey};
