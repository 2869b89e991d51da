//! # Stacked Model
//!
//! The two-stage collaborator: a gradient-boosted ensemble of shallow
//! regression trees (one-vs-rest), a leaf-membership one-hot encoder over
//! the fitted ensemble, and a softmax linear stage trained on the
//! transformed features. Three artifacts, three paths.

use std::path::Path;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::info;

use bunrui_core::error::{BunruiError, Result};

use super::classic::{argmax_rows, SoftmaxRegression};

const ROUNDS: usize = 10;
const MAX_DEPTH: usize = 3;
const SHRINKAGE: f32 = 0.3;
const MIN_SPLIT: usize = 4;
const MAX_THRESHOLDS: usize = 8;

/// One node of a fitted regression tree. Leaves carry an in-tree index used
/// for the leaf-membership transform.
#[derive(Debug, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f32,
        index: usize,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// A depth-limited regression tree fitted to residuals.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode,
    n_leaves: usize,
}

impl RegressionTree {
    fn fit(x: &Array2<f32>, targets: &[f32], rows: &[usize]) -> Self {
        let mut n_leaves = 0;
        let root = build_node(x, targets, rows, MAX_DEPTH, &mut n_leaves);
        Self { root, n_leaves }
    }

    /// Predicted value and leaf index for one example.
    fn apply(&self, row: ArrayView1<f32>) -> (f32, usize) {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value, index } => return (*value, *index),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

fn build_node(
    x: &Array2<f32>,
    targets: &[f32],
    rows: &[usize],
    depth: usize,
    n_leaves: &mut usize,
) -> TreeNode {
    let mean = if rows.is_empty() {
        0.0
    } else {
        rows.iter().map(|&i| targets[i]).sum::<f32>() / rows.len() as f32
    };

    if depth == 0 || rows.len() < MIN_SPLIT {
        let index = *n_leaves;
        *n_leaves += 1;
        return TreeNode::Leaf { value: mean, index };
    }

    let Some((feature, threshold)) = best_split(x, targets, rows) else {
        let index = *n_leaves;
        *n_leaves += 1;
        return TreeNode::Leaf { value: mean, index };
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .copied()
        .partition(|&i| x[[i, feature]] <= threshold);

    let left = build_node(x, targets, &left_rows, depth - 1, n_leaves);
    let right = build_node(x, targets, &right_rows, depth - 1, n_leaves);
    TreeNode::Split {
        feature,
        threshold,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Exhaustive scan over features with up to [`MAX_THRESHOLDS`] candidate
/// thresholds each, maximizing squared-error reduction.
fn best_split(x: &Array2<f32>, targets: &[f32], rows: &[usize]) -> Option<(usize, f32)> {
    let total_sum: f32 = rows.iter().map(|&i| targets[i]).sum();
    let total_sq: f32 = rows.iter().map(|&i| targets[i] * targets[i]).sum();
    let n = rows.len() as f32;
    let parent_sse = total_sq - total_sum * total_sum / n;

    let mut best: Option<(usize, f32, f32)> = None;
    for feature in 0..x.ncols() {
        let mut values: Vec<f32> = rows.iter().map(|&i| x[[i, feature]]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();
        if values.len() < 2 {
            continue;
        }

        let step = (values.len() - 1).div_ceil(MAX_THRESHOLDS);
        for pair in values.windows(2).step_by(step.max(1)) {
            let threshold = (pair[0] + pair[1]) / 2.0;

            let mut left_sum = 0.0f32;
            let mut left_sq = 0.0f32;
            let mut left_n = 0.0f32;
            for &i in rows {
                if x[[i, feature]] <= threshold {
                    left_sum += targets[i];
                    left_sq += targets[i] * targets[i];
                    left_n += 1.0;
                }
            }
            let right_n = n - left_n;
            if left_n == 0.0 || right_n == 0.0 {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);
            let gain = parent_sse - sse;

            if gain > 1e-7 && best.map_or(true, |(_, _, g)| gain > g) {
                best = Some((feature, threshold, gain));
            }
        }
    }
    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// One-vs-rest gradient boosting with squared loss on 0/1 targets.
#[derive(Debug, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base: Vec<f32>,
    class_trees: Vec<Vec<RegressionTree>>,
    shrinkage: f32,
}

impl GradientBoostedTrees {
    fn fit(x: &Array2<f32>, y: &[usize], num_classes: usize) -> Self {
        let n = x.nrows();
        let rows: Vec<usize> = (0..n).collect();

        let mut base = vec![0.0f32; num_classes];
        let mut class_trees = Vec::with_capacity(num_classes);

        for class in 0..num_classes {
            let targets: Vec<f32> = y.iter().map(|&label| f32::from(label == class)).collect();
            let mean = if n > 0 {
                targets.iter().sum::<f32>() / n as f32
            } else {
                0.0
            };
            base[class] = mean;

            let mut scores = vec![mean; n];
            let mut trees = Vec::with_capacity(ROUNDS);
            for _ in 0..ROUNDS {
                let residuals: Vec<f32> = targets
                    .iter()
                    .zip(&scores)
                    .map(|(t, s)| t - s)
                    .collect();
                let tree = RegressionTree::fit(x, &residuals, &rows);
                for (i, score) in scores.iter_mut().enumerate() {
                    *score += SHRINKAGE * tree.apply(x.row(i)).0;
                }
                trees.push(tree);
            }
            class_trees.push(trees);
        }

        Self {
            base,
            class_trees,
            shrinkage: SHRINKAGE,
        }
    }

    /// Raw per-class ensemble scores.
    pub fn predict_scores(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut scores = Array2::zeros((x.nrows(), self.class_trees.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (class, trees) in self.class_trees.iter().enumerate() {
                let mut score = self.base[class];
                for tree in trees {
                    score += self.shrinkage * tree.apply(row).0;
                }
                scores[[i, class]] = score;
            }
        }
        scores
    }
}

/// Maps (tree, leaf) pairs of the fitted ensemble to one-hot columns.
#[derive(Debug, Serialize, Deserialize)]
pub struct LeafEncoder {
    offsets: Vec<usize>,
    total: usize,
}

impl LeafEncoder {
    fn fit(trees: &GradientBoostedTrees) -> Self {
        let mut offsets = Vec::new();
        let mut total = 0;
        for class_trees in &trees.class_trees {
            for tree in class_trees {
                offsets.push(total);
                total += tree.n_leaves;
            }
        }
        Self { offsets, total }
    }

    /// Leaf-membership one-hot features, one row per example.
    pub fn transform(&self, trees: &GradientBoostedTrees, x: &Array2<f32>) -> Array2<f32> {
        let mut features = Array2::zeros((x.nrows(), self.total));
        for (i, row) in x.rows().into_iter().enumerate() {
            let mut t = 0;
            for class_trees in &trees.class_trees {
                for tree in class_trees {
                    let (_, leaf) = tree.apply(row);
                    features[[i, self.offsets[t] + leaf]] = 1.0;
                    t += 1;
                }
            }
        }
        features
    }

    pub fn dim(&self) -> usize {
        self.total
    }
}

/// The fitted two-stage model.
#[derive(Debug, Serialize, Deserialize)]
pub struct StackedModel {
    trees: GradientBoostedTrees,
    encoder: LeafEncoder,
    linear: SoftmaxRegression,
}

impl StackedModel {
    /// Fit the tree ensemble, derive the leaf encoder, then fit the linear
    /// stage on the transformed features.
    pub fn train(x: &Array2<f32>, y: &[usize], num_classes: usize) -> Self {
        let trees = GradientBoostedTrees::fit(x, y, num_classes);
        let encoder = LeafEncoder::fit(&trees);
        let leaf_features = encoder.transform(&trees, x);
        let linear = SoftmaxRegression::fit(&leaf_features, y, num_classes);
        Self {
            trees,
            encoder,
            linear,
        }
    }

    pub fn predict_proba(&self, x: &Array2<f32>) -> Array2<f32> {
        let leaf_features = self.encoder.transform(&self.trees, x);
        self.linear.predict_proba(&leaf_features)
    }

    pub fn predict(&self, x: &Array2<f32>) -> Vec<usize> {
        argmax_rows(&self.predict_proba(x))
    }

    /// Persist the three artifacts: ensemble, linear stage, leaf encoder.
    pub fn save(
        &self,
        trees_path: &Path,
        linear_path: &Path,
        encoder_path: &Path,
    ) -> Result<()> {
        write_json(trees_path, &self.trees)?;
        write_json(linear_path, &self.linear)?;
        write_json(encoder_path, &self.encoder)?;
        info!(trees = %trees_path.display(), "saved stacked model artifacts");
        Ok(())
    }

    pub fn load(trees_path: &Path, linear_path: &Path, encoder_path: &Path) -> Result<Self> {
        Ok(Self {
            trees: read_json(trees_path)?,
            linear: read_json(linear_path)?,
            encoder: read_json(encoder_path)?,
        })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string(value).map_err(|e| BunruiError::Artifact(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| BunruiError::Artifact(e.to_string()))
}
