//! Regression and discretised classification metrics.
//!
//! Continuous predictions are rounded half away from zero to integer class
//! labels before accuracy, precision, recall and F1 are computed.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric families reported for each target and for their average.
pub const METRIC_FAMILIES: [&str; 5] = ["mse", "accuracy", "precision", "recall", "f1"];

/// Suffixes for the local target, the visitor target and their mean.
pub const LOCAL_SUFFIX: &str = "local";
pub const VISITOR_SUFFIX: &str = "visitante";
pub const AVERAGE_SUFFIX: &str = "promedio";

/// Named metric values in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    entries: Vec<(String, f64)>,
}

impl MetricSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, name: String, value: f64) {
        self.entries.push((name, value));
    }
}

/// Scores of one target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetScores {
    pub mse: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl TargetScores {
    fn by_family(&self, family: &str) -> f64 {
        match family {
            "mse" => self.mse,
            "accuracy" => self.accuracy,
            "precision" => self.precision,
            "recall" => self.recall,
            _ => self.f1,
        }
    }
}

/// Score both targets and their average.
pub fn evaluate(
    y_test_local: &[f64],
    y_pred_local: &[f64],
    y_test_visitor: &[f64],
    y_pred_visitor: &[f64],
) -> Result<MetricSet, MlError> {
    let local = score_target(y_test_local, y_pred_local)?;
    let visitor = score_target(y_test_visitor, y_pred_visitor)?;

    let mut set = MetricSet::default();
    for family in METRIC_FAMILIES {
        let l = local.by_family(family);
        let v = visitor.by_family(family);
        set.push(format!("{family}_{LOCAL_SUFFIX}"), l);
        set.push(format!("{family}_{VISITOR_SUFFIX}"), v);
        set.push(format!("{family}_{AVERAGE_SUFFIX}"), (l + v) / 2.0);
    }
    Ok(set)
}

/// Score one target.
pub fn score_target(y_true: &[f64], y_pred: &[f64]) -> Result<TargetScores, MlError> {
    if y_true.len() != y_pred.len() {
        return Err(MlError::training(format!(
            "{} true values but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(MlError::training("cannot score an empty test set"));
    }

    let true_labels: Vec<i64> = y_true.iter().map(|v| to_label(*v)).collect();
    let pred_labels: Vec<i64> = y_pred.iter().map(|v| to_label(*v)).collect();
    let (precision, recall, f1) = weighted_prf(&true_labels, &pred_labels);

    Ok(TargetScores {
        mse: mean_squared_error(y_true, y_pred),
        accuracy: accuracy(&true_labels, &pred_labels),
        precision,
        recall,
        f1,
    })
}

/// Round half away from zero.
pub fn to_label(value: f64) -> i64 {
    value.round() as i64
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len() as f64;
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>()
        / n
}

fn accuracy(y_true: &[i64], y_pred: &[i64]) -> f64 {
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    hits as f64 / y_true.len() as f64
}

#[derive(Default)]
struct LabelCounts {
    true_positive: usize,
    predicted: usize,
    support: usize,
}

/// Support-weighted precision, recall and F1 over the union of labels.
/// Undefined ratios count as 0.
fn weighted_prf(y_true: &[i64], y_pred: &[i64]) -> (f64, f64, f64) {
    let mut counts: BTreeMap<i64, LabelCounts> = BTreeMap::new();
    for (t, p) in y_true.iter().zip(y_pred) {
        counts.entry(*t).or_default().support += 1;
        counts.entry(*p).or_default().predicted += 1;
        if t == p {
            counts.entry(*t).or_default().true_positive += 1;
        }
    }

    let total = y_true.len() as f64;
    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for c in counts.values() {
        if c.support == 0 {
            continue;
        }
        let weight = c.support as f64 / total;
        let p = ratio(c.true_positive, c.predicted);
        let r = ratio(c.true_positive, c.support);
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        precision += weight * p;
        recall += weight * r;
        f1 += weight * f;
    }
    (precision, recall, f1)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
