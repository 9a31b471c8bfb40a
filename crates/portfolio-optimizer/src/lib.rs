//! Monte Carlo allocation search and growth estimation.
//!
//! [`PortfolioSampler`] scores random simplex weights by Sharpe ratio,
//! [`GrowthEstimator`] measures or simulates the value of the chosen weights,
//! and [`compute_portfolio_insights`] ties both to a risk profile.

pub mod growth;
pub mod insights;
pub mod models;
pub mod sampler;

pub use growth::{covariance_factor, needs_backfill, realized_growth, GrowthEstimator};
pub use insights::compute_portfolio_insights;
pub use models::*;
pub use sampler::{score, PortfolioSampler, BLOCK_SIZE};
