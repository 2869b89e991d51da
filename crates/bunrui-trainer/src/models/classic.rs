//! # Classical Classifiers
//!
//! The feature-matrix collaborators selectable by name: softmax regression,
//! multinomial naive Bayes, and k-nearest-neighbour. All expose the same
//! fit/predict surface over dense ndarray matrices and persist as JSON.

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use bunrui_core::error::{BunruiError, Result};

use crate::config::ClassicKind;

/// A fitted classical model plus the class-name table it predicts over.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClassicArtifact {
    pub classes: Vec<String>,
    pub model: ClassicModel,
}

/// One of the classical model families.
#[derive(Debug, Serialize, Deserialize)]
pub enum ClassicModel {
    Logistic(SoftmaxRegression),
    Bayes(MultinomialNb),
    Knn(KnnClassifier),
}

impl ClassicModel {
    /// Fit the family named by `kind`.
    pub fn fit(kind: ClassicKind, x: &Array2<f32>, y: &[usize], num_classes: usize) -> Self {
        match kind {
            ClassicKind::LogisticRegression => {
                ClassicModel::Logistic(SoftmaxRegression::fit(x, y, num_classes))
            }
            ClassicKind::Bayes => ClassicModel::Bayes(MultinomialNb::fit(x, y, num_classes)),
            ClassicKind::Knn => ClassicModel::Knn(KnnClassifier::fit(x, y, num_classes)),
        }
    }

    /// Per-class probabilities, one row per example.
    pub fn predict_proba(&self, x: &Array2<f32>) -> Array2<f32> {
        match self {
            ClassicModel::Logistic(m) => m.predict_proba(x),
            ClassicModel::Bayes(m) => m.predict_proba(x),
            ClassicModel::Knn(m) => m.predict_proba(x),
        }
    }

    /// Most likely class per example.
    pub fn predict(&self, x: &Array2<f32>) -> Vec<usize> {
        argmax_rows(&self.predict_proba(x))
    }

    /// Persist the fitted model and its class table as JSON.
    pub fn save<P: AsRef<Path>>(&self, classes: &[String], path: P) -> Result<()> {
        #[derive(Serialize)]
        struct ArtifactRef<'a> {
            classes: &'a [String],
            model: &'a ClassicModel,
        }

        let artifact = ArtifactRef {
            classes,
            model: self,
        };
        let json =
            serde_json::to_string(&artifact).map_err(|e| BunruiError::Artifact(e.to_string()))?;
        std::fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), "saved classic model");
        Ok(())
    }

    /// Reload an artifact persisted by [`ClassicModel::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ClassicArtifact> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| BunruiError::Artifact(e.to_string()))
    }
}

/// Multi-class logistic regression trained with full-batch gradient descent.
#[derive(Debug, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl SoftmaxRegression {
    const STEPS: usize = 200;
    const LEARNING_RATE: f32 = 0.5;

    pub(crate) fn fit(x: &Array2<f32>, y: &[usize], num_classes: usize) -> Self {
        let (n, dim) = x.dim();
        let mut weights = Array2::zeros((dim, num_classes));
        let mut bias = Array1::zeros(num_classes);

        let mut onehot = Array2::zeros((n, num_classes));
        for (i, &label) in y.iter().enumerate() {
            onehot[[i, label]] = 1.0f32;
        }

        for _ in 0..Self::STEPS {
            let mut logits = x.dot(&weights);
            logits += &bias;
            let proba = softmax_rows(logits);

            let grad = (&proba - &onehot) / n.max(1) as f32;
            let grad_w = x.t().dot(&grad);
            let grad_b = grad.sum_axis(Axis(0));

            weights -= &(grad_w * Self::LEARNING_RATE);
            bias -= &(grad_b * Self::LEARNING_RATE);
        }

        Self { weights, bias }
    }

    pub(crate) fn predict_proba(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut logits = x.dot(&self.weights);
        logits += &self.bias;
        softmax_rows(logits)
    }
}

/// Multinomial naive Bayes with Laplace smoothing, over non-negative
/// feature weights.
#[derive(Debug, Serialize, Deserialize)]
pub struct MultinomialNb {
    class_log_prior: Array1<f32>,
    feature_log_prob: Array2<f32>,
}

impl MultinomialNb {
    fn fit(x: &Array2<f32>, y: &[usize], num_classes: usize) -> Self {
        let (n, dim) = x.dim();

        let mut class_counts = vec![0usize; num_classes];
        let mut feature_counts = Array2::<f32>::zeros((num_classes, dim));
        for (i, &label) in y.iter().enumerate() {
            class_counts[label] += 1;
            let mut class_row = feature_counts.row_mut(label);
            class_row += &x.row(i);
        }

        let mut class_log_prior = Array1::zeros(num_classes);
        let mut feature_log_prob = Array2::zeros((num_classes, dim));
        for class in 0..num_classes {
            class_log_prior[class] =
                ((class_counts[class] as f32 + 1.0) / (n as f32 + num_classes as f32)).ln();
            let row = feature_counts.row(class);
            let total: f32 = row.sum() + dim as f32;
            for (j, &count) in row.iter().enumerate() {
                feature_log_prob[[class, j]] = ((count + 1.0) / total).ln();
            }
        }

        Self {
            class_log_prior,
            feature_log_prob,
        }
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut joint = x.dot(&self.feature_log_prob.t());
        joint += &self.class_log_prior;
        softmax_rows(joint)
    }
}

/// k-nearest-neighbour voting over the stored training matrix.
#[derive(Debug, Serialize, Deserialize)]
pub struct KnnClassifier {
    k: usize,
    num_classes: usize,
    x: Array2<f32>,
    y: Vec<usize>,
}

impl KnnClassifier {
    const K: usize = 5;

    fn fit(x: &Array2<f32>, y: &[usize], num_classes: usize) -> Self {
        Self {
            k: Self::K.min(y.len().max(1)),
            num_classes,
            x: x.clone(),
            y: y.to_vec(),
        }
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut proba = Array2::zeros((x.nrows(), self.num_classes));
        for (qi, query) in x.rows().into_iter().enumerate() {
            let mut distances: Vec<(f32, usize)> = self
                .x
                .rows()
                .into_iter()
                .zip(&self.y)
                .map(|(row, &label)| {
                    let d = query
                        .iter()
                        .zip(row.iter())
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f32>();
                    (d, label)
                })
                .collect();
            distances
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let k = self.k.min(distances.len());
            for &(_, label) in &distances[..k] {
                proba[[qi, label]] += 1.0 / k as f32;
            }
        }
        proba
    }
}

/// Row-wise softmax, numerically shifted by the row maximum.
pub(crate) fn softmax_rows(mut logits: Array2<f32>) -> Array2<f32> {
    for mut row in logits.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    logits
}

/// Index of the largest value in each row.
pub(crate) fn argmax_rows(proba: &Array2<f32>) -> Vec<usize> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
        .collect()
}
