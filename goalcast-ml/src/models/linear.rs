//! Ordinary and non-negative least squares.

use super::{Regressor, check_fit_input, check_predict_input, not_fitted};
use crate::error::MlError;
use goalcast_core::experiment::{LinearRegressionParams, ModelKind};
use linfa::{Dataset, traits::Fit};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::json;

const NNLS_MAX_SWEEPS: usize = 10_000;
const NNLS_TOLERANCE: f64 = 1e-12;

/// Fitted weights of a linear predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LinearCoefficients {
    /// `x · coef + intercept` per row.
    pub fn linear_predictor(&self, x: &Array2<f64>) -> Array1<f64> {
        let coef = Array1::from(self.coef.clone());
        x.dot(&coef) + self.intercept
    }
}

#[derive(Debug, Clone)]
pub struct LinearRegressionModel {
    params: LinearRegressionParams,
    fitted: Option<LinearCoefficients>,
}

impl LinearRegressionModel {
    pub fn new(params: LinearRegressionParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn coefficients(&self) -> Option<&LinearCoefficients> {
        self.fitted.as_ref()
    }
}

impl Regressor for LinearRegressionModel {
    fn kind(&self) -> ModelKind {
        ModelKind::LinearRegression
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        check_fit_input(self.kind(), x, y)?;
        let coefficients = if self.params.positive {
            fit_non_negative(x, y, self.params.fit_intercept)
        } else {
            let dataset = Dataset::new(x.clone(), y.clone());
            let fitted = linfa_linear::LinearRegression::new()
                .with_intercept(self.params.fit_intercept)
                .fit(&dataset)
                .map_err(|e| MlError::training(format!("LinearRegression: {e}")))?;
            LinearCoefficients {
                coef: fitted.params().to_vec(),
                intercept: fitted.intercept(),
            }
        };
        self.fitted = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.kind()))?;
        check_predict_input(self.kind(), x, fitted.coef.len())?;
        Ok(fitted.linear_predictor(x))
    }

    fn to_artifact(&self) -> Result<serde_json::Value, MlError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.kind()))?;
        Ok(json!({
            "model_type": self.kind(),
            "params": self.params,
            "coefficients": fitted,
        }))
    }
}

/// Least squares with `coef >= 0`, by projected coordinate descent.
///
/// With an intercept the problem is solved on centred data and the
/// intercept recovered from the column means.
fn fit_non_negative(x: &Array2<f64>, y: &Array1<f64>, fit_intercept: bool) -> LinearCoefficients {
    let n_features = x.ncols();
    let (xc, yc, x_mean, y_mean) = if fit_intercept {
        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let y_mean = y.mean().unwrap_or(0.0);
        (x - &x_mean, y - y_mean, x_mean, y_mean)
    } else {
        (x.clone(), y.clone(), Array1::zeros(n_features), 0.0)
    };

    let col_sq: Vec<f64> = xc.columns().into_iter().map(|c| c.dot(&c)).collect();
    let mut w = Array1::<f64>::zeros(n_features);
    let mut residual = yc;

    for _ in 0..NNLS_MAX_SWEEPS {
        let mut max_step: f64 = 0.0;
        for j in 0..n_features {
            if col_sq[j] == 0.0 {
                continue;
            }
            let col = xc.column(j);
            let rho = col.dot(&residual) + w[j] * col_sq[j];
            let updated = (rho / col_sq[j]).max(0.0);
            let step = updated - w[j];
            if step != 0.0 {
                residual.scaled_add(-step, &col);
                w[j] = updated;
                max_step = max_step.max(step.abs());
            }
        }
        if max_step < NNLS_TOLERANCE {
            break;
        }
    }

    let intercept = if fit_intercept {
        y_mean - x_mean.dot(&w)
    } else {
        0.0
    };
    LinearCoefficients {
        coef: w.to_vec(),
        intercept,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn test_ols_recovers_exact_line() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 5.0], [4.0, 2.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -0.5 * v) + 1.0;
        let mut model = LinearRegressionModel::new(LinearRegressionParams::default());
        model.fit(&x, &y).unwrap();
        let coefs = model.coefficients().unwrap();
        assert_close(coefs.coef[0], 2.0);
        assert_close(coefs.coef[1], -0.5);
        assert_close(coefs.intercept, 1.0);
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_close(*p, *t);
        }
    }

    #[test]
    fn test_positive_clamps_negative_weights() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 5.0], [4.0, 2.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -0.5 * v) + 1.0;
        let mut model = LinearRegressionModel::new(LinearRegressionParams {
            positive: true,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let coefs = model.coefficients().unwrap();
        assert!(coefs.coef.iter().all(|w| *w >= 0.0));
        assert!(coefs.coef[0] > 1.0);
    }

    #[test]
    fn test_positive_matches_ols_when_unconstrained() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![3.0, 5.0, 7.0, 9.0];
        let mut model = LinearRegressionModel::new(LinearRegressionParams {
            positive: true,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let coefs = model.coefficients().unwrap();
        assert_close(coefs.coef[0], 2.0);
        assert_close(coefs.intercept, 1.0);
    }

    #[test]
    fn test_artifact_contains_coefficients() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut model = LinearRegressionModel::new(LinearRegressionParams::default());
        assert!(model.to_artifact().is_err());
        model.fit(&x, &y).unwrap();
        let artifact = model.to_artifact().unwrap();
        assert_eq!(artifact["model_type"], "LinearRegression");
        assert!(artifact["coefficients"]["coef"].is_array());
    }
}
