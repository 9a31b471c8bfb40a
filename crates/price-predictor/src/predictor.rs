use chrono::NaiveDate;
use insights_core::{
    stream_rng, FundamentalsPanel, InsightsError, InsightsResult, ModelParams, PricePanel,
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::forest::RandomForest;

/// RNG stream for the train/test shuffle. Tree streams count up from 0.
const SPLIT_STREAM: u64 = u64::MAX;

/// Hold-out evaluation of a fitted price model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub train_rows: usize,
    pub test_rows: usize,
    pub mse: f64,
    pub mae: f64,
    /// `None` when the hold-out labels have zero variance.
    pub r_squared: Option<f64>,
}

impl ModelMetrics {
    fn evaluate(actual: &[f64], predicted: &[f64], train_rows: usize) -> Self {
        let n = actual.len() as f64;
        let mse = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).powi(2))
            .sum::<f64>()
            / n;
        let mae = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).abs())
            .sum::<f64>()
            / n;
        let mean = actual.iter().sum::<f64>() / n;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
        let r_squared = if ss_tot > 0.0 {
            Some(1.0 - mse * n / ss_tot)
        } else {
            None
        };
        Self {
            train_rows,
            test_rows: actual.len(),
            mse,
            mae,
            r_squared,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricePredictor {
    params: ModelParams,
    test_fraction: f64,
}

impl PricePredictor {
    pub fn new(params: ModelParams, test_fraction: f64) -> Self {
        Self {
            params,
            test_fraction,
        }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Shuffles rows with the model seed, holds out `ceil(n * test_fraction)`
    /// of them, fits the forest on the rest and scores the hold-out.
    pub fn fit(&self, dataset: &Dataset) -> InsightsResult<FittedPredictor> {
        let n = dataset.len();
        if n < 2 {
            return Err(InsightsError::InsufficientData(format!(
                "price model needs at least 2 rows, got {}",
                n
            )));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(InsightsError::InvalidRequest(format!(
                "test fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut stream_rng(self.params.seed, SPLIT_STREAM));
        let test_rows = ((n as f64 * self.test_fraction).ceil() as usize).clamp(1, n - 1);
        let (test_idx, train_idx) = order.split_at(test_rows);

        let rows = dataset.rows();
        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
            idx.iter()
                .map(|&i| (rows[i].features.clone(), rows[i].label))
                .unzip()
        };
        let (train_x, train_y) = pick(train_idx);
        let (test_x, test_y) = pick(test_idx);

        let forest = RandomForest::fit(&train_x, &train_y, &self.params)?;
        let metrics = ModelMetrics::evaluate(&test_y, &forest.predict_many(&test_x), train_x.len());

        tracing::info!(
            "Price model fitted on {} rows, evaluated on {}: mse={:.4}, mae={:.4}",
            metrics.train_rows,
            metrics.test_rows,
            metrics.mse,
            metrics.mae
        );

        Ok(FittedPredictor {
            forest,
            params: self.params,
            metrics,
        })
    }

    /// Builds the feature set for `panel` and fits on it.
    pub fn fit_panel(
        &self,
        panel: &PricePanel,
        fundamentals: Option<&FundamentalsPanel>,
    ) -> InsightsResult<FittedPredictor> {
        let dataset = Dataset::build(panel, fundamentals, self.params.include_close)?;
        self.fit(&dataset)
    }
}

/// Read-only fitted model. Never persisted.
#[derive(Debug, Clone)]
pub struct FittedPredictor {
    forest: RandomForest,
    params: ModelParams,
    metrics: ModelMetrics,
}

impl FittedPredictor {
    pub fn metrics(&self) -> &ModelMetrics {
        &self.metrics
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn predict_dataset(&self, dataset: &Dataset) -> Vec<f64> {
        self.forest.predict_many(&dataset.features())
    }

    /// Fills `predicted_close` for every row of `panel`.
    pub fn predict_panel(
        &self,
        panel: &PricePanel,
        fundamentals: Option<&FundamentalsPanel>,
    ) -> InsightsResult<PredictedPanel> {
        let dataset = Dataset::build(panel, fundamentals, self.params.include_close)?;
        if dataset.feature_names().len() != self.forest.num_features() {
            return Err(InsightsError::InvalidData(format!(
                "model expects {} features, dataset has {}",
                self.forest.num_features(),
                dataset.feature_names().len()
            )));
        }
        let predictions = self.predict_dataset(&dataset);
        let rows = dataset
            .rows()
            .iter()
            .zip(&predictions)
            .map(|(r, &p)| PredictedClose {
                date: r.date,
                symbol: r.symbol.clone(),
                close: r.close,
                predicted_close: p,
            })
            .collect();
        Ok(PredictedPanel {
            source: panel.clone(),
            rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedClose {
    pub date: NaiveDate,
    pub symbol: String,
    pub close: f64,
    pub predicted_close: f64,
}

/// Price panel rows paired with the model's next-day close, in panel order.
#[derive(Debug, Clone)]
pub struct PredictedPanel {
    source: PricePanel,
    rows: Vec<PredictedClose>,
}

impl PredictedPanel {
    pub fn rows(&self) -> &[PredictedClose] {
        &self.rows
    }

    pub fn predicted_close(&self, date: NaiveDate, symbol: &str) -> Option<f64> {
        self.rows
            .binary_search_by(|r| (r.date, r.symbol.as_str()).cmp(&(date, symbol)))
            .ok()
            .map(|i| self.rows[i].predicted_close)
    }

    /// Most recent row for `symbol` strictly before `date`.
    pub fn latest_prediction_before(&self, date: NaiveDate, symbol: &str) -> Option<&PredictedClose> {
        self.rows
            .iter()
            .rev()
            .find(|r| r.date < date && r.symbol == symbol)
    }

    /// The source panel with every close replaced by its prediction.
    pub fn to_price_panel(&self) -> InsightsResult<PricePanel> {
        let closes: Vec<f64> = self.rows.iter().map(|r| r.predicted_close).collect();
        self.source.with_closes(&closes)
    }
}
