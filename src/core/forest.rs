//! Isolation forest for one-class anomaly detection on small training sets.
//!
//! Each tree recursively partitions a subsample with random axis-aligned
//! splits. Points that get isolated after few splits are anomalous. Scores
//! follow the usual `2^(-E[h(x)] / c(n))` normalisation.
//!
//! Training sets here are tiny (three to a handful of typed samples), so a
//! point lying well outside a node's training range is treated as isolated at
//! that node with the probability a split drawn over the widened range would
//! have separated it. The range is first widened by a slack relative to the
//! feature's magnitude; points within it score exactly as in a classic forest.
//!
//! The cutoff sets aside `floor(contamination * n)` training points as
//! outliers and admits every score up to the highest remaining one.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Upper bound on the per-tree subsample size.
const MAX_SUBSAMPLE: usize = 256;

/// Forest hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub trees: usize,
    /// Expected fraction of outliers in the training data
    pub contamination: f64,
    pub seed: u64,
    /// Widening of each training range, relative to the feature's magnitude
    pub slack: f64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 100,
            contamination: 0.05,
            seed: 42,
            slack: 0.25,
        }
    }
}

#[derive(Debug)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        /// Training range of `feature` at this node
        low: f64,
        high: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
        /// Per-feature training bounds, used when the leaf was not fully isolated
        bounds: Vec<(f64, f64)>,
    },
}

#[derive(Debug)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn build(data: &[Vec<f64>], rows: &[usize], max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: build_node(data, rows, 0, max_depth, rng),
        }
    }

    fn path_length(&self, point: &[f64], slack: f64) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        // Probability mass of the point not yet isolated.
        let mut carried = 1.0;
        let mut length = 0.0;

        loop {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    low,
                    high,
                    left,
                    right,
                } => {
                    let escape = escape_probability(point[*feature], *low, *high, slack);
                    length += carried * escape * (depth + 1.0);
                    carried *= 1.0 - escape;

                    node = if point[*feature] < *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                    depth += 1.0;
                }
                Node::Leaf { size, bounds } => {
                    let remaining = depth + average_path_length(*size);
                    if *size > 1 {
                        let escape = bounds
                            .iter()
                            .zip(point)
                            .map(|(&(lo, hi), &x)| escape_probability(x, lo, hi, slack))
                            .fold(0.0, f64::max);
                        length += carried * (escape * (depth + 1.0) + (1.0 - escape) * remaining);
                    } else {
                        length += carried * remaining;
                    }
                    return length;
                }
            }
        }
    }
}

fn build_node(
    data: &[Vec<f64>],
    rows: &[usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    let dims = data[rows[0]].len();
    let bounds: Vec<(f64, f64)> = (0..dims)
        .map(|f| {
            rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(data[r][f]), hi.max(data[r][f]))
            })
        })
        .collect();

    let splittable: Vec<usize> = (0..dims).filter(|&f| bounds[f].0 < bounds[f].1).collect();

    if rows.len() <= 1 || depth >= max_depth || splittable.is_empty() {
        return Node::Leaf {
            size: rows.len(),
            bounds,
        };
    }

    let feature = splittable[rng.gen_range(0..splittable.len())];
    let (low, high) = bounds[feature];
    let mut threshold = low + rng.gen::<f64>() * (high - low);
    if threshold <= low {
        // Keep at least one row on each side.
        threshold = (low + high) / 2.0;
    }

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.iter().copied().partition(|&r| data[r][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        low,
        high,
        left: Box::new(build_node(data, &left_rows, depth + 1, max_depth, rng)),
        right: Box::new(build_node(data, &right_rows, depth + 1, max_depth, rng)),
    }
}

/// Chance that a uniform split over `[min(lo, x), max(hi, x)]` separates `x`
/// from the training range `[lo, hi]` widened by `slack * max(|lo|, |hi|)`.
fn escape_probability(x: f64, lo: f64, hi: f64, slack: f64) -> f64 {
    let margin = slack.max(0.0) * lo.abs().max(hi.abs());
    if x > hi + margin {
        (x - hi - margin) / (x - lo)
    } else if x < lo - margin {
        (lo - margin - x) / (hi - x)
    } else {
        0.0
    }
}

fn harmonic(n: f64) -> f64 {
    n.ln() + EULER_GAMMA
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * harmonic(n - 1.0) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Highest training score left after the `contamination` share of the
/// most anomalous scores is set aside. `scores` must be non-empty.
fn inlier_cutoff(scores: &[f64], contamination: f64) -> f64 {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let outliers = (contamination * sorted.len() as f64).floor() as usize;
    sorted[sorted.len() - 1 - outliers.min(sorted.len() - 1)]
}

/// A fitted isolation forest.
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample: usize,
    dims: usize,
    slack: f64,
    /// Anomaly scores above this value are outliers
    cutoff: f64,
}

impl IsolationForest {
    /// Fit on `data` (non-empty, rectangular). The same data and params
    /// always produce the same forest.
    pub fn fit(data: &[Vec<f64>], params: ForestParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let subsample = data.len().min(MAX_SUBSAMPLE);
        let max_depth = (subsample as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..params.trees.max(1))
            .map(|_| {
                let rows: Vec<usize> = if subsample == data.len() {
                    (0..data.len()).collect()
                } else {
                    index::sample(&mut rng, data.len(), subsample).into_vec()
                };
                IsolationTree::build(data, &rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            subsample,
            dims: data[0].len(),
            slack: params.slack,
            cutoff: f64::INFINITY,
        };

        let training_scores: Vec<f64> = data.iter().map(|row| forest.score(row)).collect();
        let contamination = params.contamination.clamp(0.0, 0.5);
        forest.cutoff = inlier_cutoff(&training_scores, contamination);
        forest
    }

    /// Anomaly score in `(0, 1]`; higher is more anomalous.
    pub fn score(&self, point: &[f64]) -> f64 {
        debug_assert_eq!(point.len(), self.dims);
        let mean_path = self
            .trees
            .iter()
            .map(|tree| tree.path_length(point, self.slack))
            .sum::<f64>()
            / self.trees.len() as f64;

        let normaliser = average_path_length(self.subsample);
        if normaliser == 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / normaliser)
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn is_inlier(&self, point: &[f64]) -> bool {
        self.score(point) <= self.cutoff
    }
}
