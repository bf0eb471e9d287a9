//! Poisson GLM (Tweedie power 1, log link).

use super::linear::LinearCoefficients;
use super::{Regressor, check_fit_input, check_predict_input, not_fitted};
use crate::error::MlError;
use goalcast_core::experiment::{ModelKind, PoissonParams, PoissonSolver};
use linfa::{Dataset, traits::Fit};
use linfa_linear::{Link, TweedieRegressor};
use ndarray::{Array1, Array2};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PoissonModel {
    params: PoissonParams,
    fitted: Option<LinearCoefficients>,
}

impl PoissonModel {
    pub fn new(params: PoissonParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }
}

impl Regressor for PoissonModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Poisson
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        check_fit_input(self.kind(), x, y)?;
        if y.iter().any(|v| *v < 0.0) {
            return Err(MlError::training(
                "PoissonRegressor requires non-negative targets",
            ));
        }
        if self.params.solver == PoissonSolver::NewtonCholesky {
            debug!("newton-cholesky requested; fitting with L-BFGS");
        }

        let dataset = Dataset::new(x.clone(), y.clone());
        let fitted = TweedieRegressor::params()
            .power(1.0)
            .link(Link::Log)
            .alpha(self.params.alpha)
            .fit_intercept(self.params.fit_intercept)
            .max_iter(self.params.max_iter as usize)
            .tol(self.params.tol)
            .fit(&dataset)
            .map_err(|e| MlError::training(format!("PoissonRegressor: {e}")))?;

        self.fitted = Some(LinearCoefficients {
            coef: fitted.coef.to_vec(),
            intercept: fitted.intercept,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.kind()))?;
        check_predict_input(self.kind(), x, fitted.coef.len())?;
        Ok(fitted.linear_predictor(x).mapv(f64::exp))
    }

    fn to_artifact(&self) -> Result<serde_json::Value, MlError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.kind()))?;
        Ok(json!({
            "model_type": self.kind(),
            "params": self.params,
            "link": "log",
            "coefficients": fitted,
        }))
    }
}
