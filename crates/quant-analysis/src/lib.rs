//! Return statistics and volatility forecasting over a price panel.

pub mod returns;
pub mod volatility;

pub use returns::{
    annualize_return, annualize_volatility, simple_returns, ReturnStatistics, TRADING_DAYS_PER_YEAR,
};
pub use volatility::GarchModel;
