use insights_core::{InsightsError, InsightsResult};

/// Growth limits for a single regression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct Candidate {
    feature: usize,
    threshold: f64,
    sse: f64,
}

/// CART regression tree. Splits minimize the summed squared error of the two
/// children; rows with `x[feature] <= threshold` go left.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grows a tree on the rows listed in `samples` (repeats allowed, as in a
    /// bootstrap draw). Nodes are expanded from an explicit stack, so depth
    /// is bounded only by `params.max_depth`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        samples: &[usize],
        params: &TreeParams,
    ) -> InsightsResult<Self> {
        if x.len() != y.len() {
            return Err(InsightsError::InvalidData(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if samples.is_empty() {
            return Err(InsightsError::InsufficientData(
                "cannot grow a tree on zero samples".to_string(),
            ));
        }
        if let Some(&bad) = samples.iter().find(|&&i| i >= x.len()) {
            return Err(InsightsError::InvalidData(format!(
                "sample index {} out of range for {} rows",
                bad,
                x.len()
            )));
        }

        let min_split = params.min_samples_split.max(2);
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(0, samples.to_vec(), 0)];

        while let Some((slot, rows, depth)) = stack.pop() {
            let (sum, sum_sq) = sums(y, &rows);
            let n = rows.len() as f64;
            let mean = sum / n;
            let sse = sum_sq - sum * sum / n;

            let depth_reached = params.max_depth.map_or(false, |d| depth >= d);
            let split = if depth_reached || rows.len() < min_split || sse <= 1e-12 * n {
                None
            } else {
                best_split(x, y, &rows, sse)
            };

            match split {
                None => nodes[slot] = Node::Leaf { value: mean },
                Some(c) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                        rows.iter().partition(|&&i| x[i][c.feature] <= c.threshold);
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { value: 0.0 });
                    nodes.push(Node::Leaf { value: 0.0 });
                    nodes[slot] = Node::Split {
                        feature: c.feature,
                        threshold: c.threshold,
                        left,
                        right,
                    };
                    stack.push((right, right_rows, depth + 1));
                    stack.push((left, left_rows, depth + 1));
                }
            }
        }

        Ok(Self { nodes })
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = features.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[idx] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

fn sums(y: &[f64], rows: &[usize]) -> (f64, f64) {
    rows.iter().fold((0.0, 0.0), |(s, sq), &i| (s + y[i], sq + y[i] * y[i]))
}

/// Exhaustive search over every feature and every gap between distinct
/// sorted values. The first strictly better candidate wins ties.
fn best_split(x: &[Vec<f64>], y: &[f64], rows: &[usize], parent_sse: f64) -> Option<Candidate> {
    let n_features = x[rows[0]].len();
    let total = rows.len();
    let (sum, sum_sq) = sums(y, rows);
    let mut best: Option<Candidate> = None;
    let mut order = rows.to_vec();

    for feature in 0..n_features {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..total - 1 {
            let i = order[k];
            left_sum += y[i];
            left_sq += y[i] * y[i];

            let lo = x[i][feature];
            let hi = x[order[k + 1]][feature];
            if lo >= hi {
                continue;
            }

            let n_left = (k + 1) as f64;
            let n_right = (total - k - 1) as f64;
            let right_sum = sum - left_sum;
            let right_sq = sum_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left)
                + (right_sq - right_sum * right_sum / n_right);

            if best.as_ref().map_or(true, |b| sse < b.sse) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some(Candidate {
                    feature,
                    threshold,
                    sse,
                });
            }
        }
    }

    best.filter(|c| c.sse < parent_sse - 1e-12 * parent_sse.abs().max(1.0))
}
