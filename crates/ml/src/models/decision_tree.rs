//! CART regression trees shared by the forest and boosting ensembles.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "n_nodes": 3,
//!   "nodes": [
//!     { "feature": 5, "threshold": 12.5, "left": 1, "right": 2, "value": null },
//!     { "feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": 8.25 },
//!     { "feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": 31.0 }
//!   ]
//! }
//! ```
//!
//! Nodes are stored in pre-order, so every child index is greater than its
//! parent's.
//!
//! # Tree Traversal
//!
//! - Start at node 0 (root)
//! - If `feature == -1`, this is a leaf node; return `value`
//! - Else: compare `features[node.feature]` to `node.threshold`
//!   - If `<= threshold` or `NaN`, go to `left` child
//!   - Else go to `right` child
//!
//! # Fitting
//!
//! Greedy variance-reduction splits. At each node a random subset of
//! `max_features` columns is searched (all columns when unset). Splits fall
//! midway between adjacent distinct values and must leave at least
//! `min_samples_leaf` rows on each side.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::features::FeatureVector;

/// A single node in a regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionNode {
    /// Feature index to split on (-1 for leaf nodes).
    pub feature: i32,
    /// Threshold value for the split.
    pub threshold: f64,
    /// Index of left child (-1 for leaf nodes).
    pub left: i32,
    /// Index of right child (-1 for leaf nodes).
    pub right: i32,
    /// Mean target of the rows reaching this leaf (None for internal nodes).
    pub value: Option<f64>,
}

impl RegressionNode {
    fn leaf(value: f64) -> Self {
        Self {
            feature: -1,
            threshold: 0.0,
            left: -1,
            right: -1,
            value: Some(value),
        }
    }
}

/// Growth limits for one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Columns searched per split; `None` searches all.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub n_nodes: usize,
    pub nodes: Vec<RegressionNode>,
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `indices` (duplicates allowed, as
    /// produced by bootstrap sampling).
    pub fn fit(
        x: &[FeatureVector],
        y: &[f64],
        mut indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map_or(0, |r| r.len());
        let mut builder = Builder {
            x,
            y,
            params,
            n_features,
            nodes: Vec::new(),
        };
        if indices.is_empty() {
            builder.nodes.push(RegressionNode::leaf(0.0));
        } else {
            builder.grow(&mut indices, 0, rng);
        }

        Self {
            n_nodes: builder.nodes.len(),
            nodes: builder.nodes,
        }
    }

    /// Structural checks run when a tree is loaded from JSON.
    pub fn validate(&self, n_features: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() || self.n_nodes != self.nodes.len() {
            return Err(ModelError::InvalidParameters(format!(
                "tree declares {} nodes but holds {}",
                self.n_nodes,
                self.nodes.len()
            )));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.feature == -1 {
                match node.value {
                    Some(v) if v.is_finite() => {}
                    _ => {
                        return Err(ModelError::InvalidParameters(format!(
                            "leaf node {i} has no finite value"
                        )));
                    }
                }
                continue;
            }

            // Internal node: children must come later in pre-order.
            for child in [node.left, node.right] {
                if child <= i as i32 || child as usize >= self.nodes.len() {
                    return Err(ModelError::InvalidParameters(format!(
                        "node {i} has invalid child {child}"
                    )));
                }
            }
            if node.feature < 0 || node.feature as usize >= n_features {
                return Err(ModelError::InvalidParameters(format!(
                    "node {i} has invalid feature index {}",
                    node.feature
                )));
            }
        }
        Ok(())
    }

    /// Traverse the tree for given features and return leaf node index.
    #[inline]
    fn traverse(&self, features: &[f64]) -> usize {
        let mut node_idx = 0usize;

        loop {
            let node = &self.nodes[node_idx];

            if node.feature == -1 {
                return node_idx;
            }

            let feature_val = features
                .get(node.feature as usize)
                .copied()
                .unwrap_or(f64::NAN);

            if feature_val.is_nan() || feature_val <= node.threshold {
                node_idx = node.left as usize;
            } else {
                node_idx = node.right as usize;
            }
        }
    }

    #[inline]
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.nodes[self.traverse(features)].value.unwrap_or(0.0)
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[RegressionNode], idx: usize) -> usize {
            let node = &nodes[idx];
            if node.feature == -1 {
                return 0;
            }
            1 + walk(nodes, node.left as usize).max(walk(nodes, node.right as usize))
        }
        walk(&self.nodes, 0)
    }
}

// =============================================================================
// Builder
// =============================================================================

struct Split {
    feature: usize,
    threshold: f64,
}

struct Builder<'a> {
    x: &'a [FeatureVector],
    y: &'a [f64],
    params: &'a TreeParams,
    n_features: usize,
    nodes: Vec<RegressionNode>,
}

impl Builder<'_> {
    /// Grow the subtree for `indices`; returns its root node index.
    fn grow(&mut self, indices: &mut [usize], depth: usize, rng: &mut StdRng) -> i32 {
        let node_idx = self.nodes.len();
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        self.nodes.push(RegressionNode::leaf(sum / n as f64));

        let params = self.params;
        if depth >= params.max_depth
            || n < params.min_samples_split.max(2)
            || n < 2 * params.min_samples_leaf.max(1)
        {
            return node_idx as i32;
        }

        let Some(split) = self.best_split(indices, sum, rng) else {
            return node_idx as i32;
        };

        let x = self.x;
        let mut mid = 0;
        for j in 0..n {
            if x[indices[j]][split.feature] <= split.threshold {
                indices.swap(mid, j);
                mid += 1;
            }
        }

        let (left_rows, right_rows) = indices.split_at_mut(mid);
        let left = self.grow(left_rows, depth + 1, rng);
        let right = self.grow(right_rows, depth + 1, rng);
        self.nodes[node_idx] = RegressionNode {
            feature: split.feature as i32,
            threshold: split.threshold,
            left,
            right,
            value: None,
        };
        node_idx as i32
    }

    fn candidate_features(&self, rng: &mut StdRng) -> Vec<usize> {
        match self.params.max_features {
            Some(k) if k > 0 && k < self.n_features => {
                let mut picked = rand::seq::index::sample(rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Best variance-reducing split, maximizing `S_l² / n_l + S_r² / n_r`.
    fn best_split(&self, indices: &[usize], total: f64, rng: &mut StdRng) -> Option<Split> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent_score = total * total / n as f64;
        let mut best: Option<(f64, Split)> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in self.candidate_features(rng) {
            pairs.clear();
            pairs.extend(indices.iter().map(|&i| (self.x[i][feature], self.y[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += pairs[k - 1].1;
                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let (lo, hi) = (pairs[k - 1].0, pairs[k].0);
                if lo >= hi {
                    continue;
                }

                let right_sum = total - left_sum;
                let score = left_sum * left_sum / k as f64 + right_sum * right_sum / (n - k) as f64;
                let improves = score > parent_score + 1e-12 * parent_score.abs().max(1.0);
                let beats_best = best.as_ref().is_none_or(|(s, _)| score > *s);
                if improves && beats_best {
                    let mid = lo + (hi - lo) / 2.0;
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some((score, Split { feature, threshold }));
                }
            }
        }

        best.map(|(_, split)| split)
    }
}
