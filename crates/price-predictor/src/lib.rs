//! Next-day close regression (random forest over volume and fundamentals)
//! and GARCH-based price extrapolation beyond the observed history.

pub mod dataset;
pub mod extrapolate;
pub mod forest;
pub mod predictor;
pub mod tree;

pub use dataset::{Dataset, FeatureRow};
pub use extrapolate::{extrapolate_close, trading_days_between, PriceExtrapolation};
pub use forest::RandomForest;
pub use predictor::{FittedPredictor, ModelMetrics, PredictedClose, PredictedPanel, PricePredictor};
pub use tree::{RegressionTree, TreeParams};
