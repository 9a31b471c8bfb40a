use insights_core::{stream_rng, InsightsError, InsightsResult, ModelParams};
use rand::Rng;
use rayon::prelude::*;

use crate::tree::{RegressionTree, TreeParams};

/// Bagged ensemble of regression trees; the prediction is the tree average.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Each tree gets its own bootstrap sample drawn from
    /// `stream_rng(params.seed, tree_index)`, so the fitted forest is the
    /// same whatever order rayon builds the trees in.
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ModelParams) -> InsightsResult<Self> {
        if params.n_estimators == 0 {
            return Err(InsightsError::InvalidRequest(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if x.is_empty() {
            return Err(InsightsError::InsufficientData(
                "cannot fit a forest on zero rows".to_string(),
            ));
        }
        if x.len() != y.len() {
            return Err(InsightsError::InvalidData(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(InsightsError::InvalidData(
                "feature rows have inconsistent widths".to_string(),
            ));
        }
        if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
            return Err(InsightsError::InvalidData(
                "training data contains non-finite values".to_string(),
            ));
        }

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
        };
        let n = x.len();

        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = stream_rng(params.seed, t as u64);
                let samples: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &samples, &tree_params)
            })
            .collect::<InsightsResult<Vec<_>>>()?;

        tracing::debug!(
            "Random forest fitted: {} trees, {} rows, {} features",
            trees.len(),
            n,
            n_features
        );

        Ok(Self { trees, n_features })
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        total / self.trees.len() as f64
    }

    pub fn predict_many(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.par_iter().map(|r| self.predict(r)).collect()
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let y: Vec<f64> = (0..60).map(|i| 10.0 + 2.0 * i as f64).collect();
        (x, y)
    }

    fn params(seed: u64) -> ModelParams {
        ModelParams {
            n_estimators: 20,
            max_depth: Some(6),
            min_samples_split: 2,
            include_close: false,
            seed,
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = linear_data();
        let a = RandomForest::fit(&x, &y, &params(7)).unwrap();
        let b = RandomForest::fit(&x, &y, &params(7)).unwrap();
        assert_eq!(a.predict_many(&x), b.predict_many(&x));
        assert_eq!(a.num_trees(), 20);
        assert_eq!(a.num_features(), 2);
    }

    #[test]
    fn test_single_thread_pool_matches_default_pool() {
        let (x, y) = linear_data();
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| RandomForest::fit(&x, &y, &params(3)).unwrap().predict_many(&x));
        let pooled = RandomForest::fit(&x, &y, &params(3)).unwrap().predict_many(&x);
        assert_eq!(single, pooled);
    }

    #[test]
    fn test_tracks_monotone_target() {
        let (x, y) = linear_data();
        let forest = RandomForest::fit(&x, &y, &params(1)).unwrap();
        let low = forest.predict(&[5.0, 5.0]);
        let high = forest.predict(&[55.0, 6.0]);
        assert!(high > low);
        assert!(low >= 10.0 && high <= 128.0);
    }

    #[test]
    fn test_rejects_invalid_training_data() {
        let (x, mut y) = linear_data();
        let mut p = params(1);
        p.n_estimators = 0;
        assert!(RandomForest::fit(&x, &y, &p).is_err());
        y[3] = f64::NAN;
        assert!(RandomForest::fit(&x, &y, &params(1)).is_err());
        assert!(RandomForest::fit(&[], &[], &params(1)).is_err());
    }
}
