//! Random forest: bagged regression trees with per-split feature sampling.

use super::tree::{RegressionTree, TreeOptions, bootstrap_rows};
use super::{Regressor, check_fit_input, check_predict_input, not_fitted};
use crate::error::MlError;
use goalcast_core::experiment::{ModelKind, RandomForestParams};
use ndarray::{Array1, Array2};
use rand::{SeedableRng, rngs::StdRng};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RandomForestModel {
    params: RandomForestParams,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForestModel {
    pub fn new(params: RandomForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            max_features: self.params.max_features,
        }
    }
}

impl Regressor for RandomForestModel {
    fn kind(&self) -> ModelKind {
        ModelKind::RandomForest
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        check_fit_input(self.kind(), x, y)?;
        let seed = self.params.random_state.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let options = self.tree_options();
        let targets = y.to_vec();
        let all_rows: Vec<usize> = (0..x.nrows()).collect();

        self.trees = (0..self.params.n_estimators)
            .map(|_| {
                let rows = if self.params.bootstrap {
                    bootstrap_rows(x.nrows(), &mut rng)
                } else {
                    all_rows.clone()
                };
                RegressionTree::fit(x, &targets, &rows, &options, &mut rng)
            })
            .collect();
        self.n_features = x.ncols();
        debug!(trees = self.trees.len(), seed, "random forest fitted");
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        if self.trees.is_empty() {
            return Err(not_fitted(self.kind()));
        }
        check_predict_input(self.kind(), x, self.n_features)?;
        let n_trees = self.trees.len() as f64;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }

    fn to_artifact(&self) -> Result<serde_json::Value, MlError> {
        if self.trees.is_empty() {
            return Err(not_fitted(self.kind()));
        }
        Ok(json!({
            "model_type": self.kind(),
            "params": self.params,
            "n_features": self.n_features,
            "trees": self.trees,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array::from_shape_fn((40, 2), |(i, j)| (i * (j + 1)) as f64 % 17.0);
        let y = x.column(0).mapv(|v| if v > 8.0 { 3.0 } else { 1.0 });
        (x, y)
    }

    fn params(seed: u64) -> RandomForestParams {
        RandomForestParams {
            n_estimators: 10,
            random_state: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_predict() {
        let (x, y) = data();
        let mut model = RandomForestModel::new(params(42));
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.len(), 40);
        let mse = (&pred - &y).mapv(|d| d * d).mean().unwrap();
        assert!(mse < 0.5, "mse {mse}");
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let (x, y) = data();
        let mut a = RandomForestModel::new(params(7));
        let mut b = RandomForestModel::new(params(7));
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
        assert_eq!(a.to_artifact().unwrap(), b.to_artifact().unwrap());
    }

    #[test]
    fn test_feature_count_checked() {
        let (x, y) = data();
        let mut model = RandomForestModel::new(params(1));
        model.fit(&x, &y).unwrap();
        let narrow = Array2::<f64>::zeros((3, 1));
        assert!(model.predict(&narrow).is_err());
    }
}
