//! CART regression tree (squared-error splits).
//!
//! Shared by the random forest and gradient boosting models. Splits are
//! searched exhaustively over the sorted values of each candidate feature;
//! thresholds sit halfway between consecutive distinct values.

use ndarray::{Array2, ArrayView1};
use rand::{Rng, rngs::StdRng, seq::index};
use serde::{Deserialize, Serialize};

/// Growth limits for one tree.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of features drawn as split candidates at every node.
    pub max_features: f64,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub root: Node,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree on `rows` of `x` (repeats allowed, as in a bootstrap
    /// sample). `y` is indexed by the same row numbers as `x`.
    pub fn fit(
        x: &Array2<f64>,
        y: &[f64],
        rows: &[usize],
        options: &TreeOptions,
        rng: &mut StdRng,
    ) -> Self {
        let mut rows = rows.to_vec();
        Self {
            root: grow(x, y, &mut rows, options, rng, 0),
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        depth_of(&self.root)
    }
}

fn mean(y: &[f64], rows: &[usize]) -> f64 {
    rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
}

fn grow(
    x: &Array2<f64>,
    y: &[f64],
    rows: &mut [usize],
    options: &TreeOptions,
    rng: &mut StdRng,
    depth: usize,
) -> Node {
    let value = mean(y, rows);
    let depth_reached = options.max_depth.is_some_and(|d| depth >= d);
    let pure = rows.iter().all(|&r| y[r] == y[rows[0]]);
    if depth_reached || pure || rows.len() < options.min_samples_split {
        return Node::Leaf { value };
    }

    let Some(best) = best_split(x, y, rows, options, rng) else {
        return Node::Leaf { value };
    };

    // Partition rows in place: left block first.
    let mut boundary = 0;
    for i in 0..rows.len() {
        if x[[rows[i], best.feature]] <= best.threshold {
            rows.swap(i, boundary);
            boundary += 1;
        }
    }
    let (left_rows, right_rows) = rows.split_at_mut(boundary);
    let left = grow(x, y, left_rows, options, rng, depth + 1);
    let right = grow(x, y, right_rows, options, rng, depth + 1);
    Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn candidate_features(n_features: usize, fraction: f64, rng: &mut StdRng) -> Vec<usize> {
    let k = ((fraction * n_features as f64).ceil() as usize).clamp(1, n_features);
    if k == n_features {
        (0..n_features).collect()
    } else {
        let mut picked = index::sample(rng, n_features, k).into_vec();
        picked.sort_unstable();
        picked
    }
}

fn best_split(
    x: &Array2<f64>,
    y: &[f64],
    rows: &[usize],
    options: &TreeOptions,
    rng: &mut StdRng,
) -> Option<BestSplit> {
    let n = rows.len();
    let min_leaf = options.min_samples_leaf.max(1);
    if n < 2 * min_leaf {
        return None;
    }
    let total_sum: f64 = rows.iter().map(|&r| y[r]).sum();
    let parent_score = total_sum * total_sum / n as f64;

    let mut best: Option<BestSplit> = None;
    let mut order: Vec<usize> = rows.to_vec();
    for feature in candidate_features(x.ncols(), options.max_features, rng) {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_sum = 0.0;
        for i in 0..n - 1 {
            left_sum += y[order[i]];
            let left_n = i + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let here = x[[order[i], feature]];
            let next = x[[order[i + 1], feature]];
            if here == next {
                continue;
            }
            let right_sum = total_sum - left_sum;
            // Maximising this is equivalent to minimising the children's SSE.
            let score = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
            let gain = score - parent_score;
            if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
    }
    best
}

/// Draw `n` row numbers from `0..n` with replacement.
pub fn bootstrap_rows(n: usize, rng: &mut StdRng) -> Vec<usize> {
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}
