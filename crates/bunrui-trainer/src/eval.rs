//! # Evaluation
//!
//! Precision/recall/F-score routines shared by the three strategies, plus
//! the precision-recall figure persisted by the classical path.

use std::path::Path;

use plotters::prelude::*;
use serde::Serialize;

use bunrui_core::error::{BunruiError, Result};

/// Macro-averaged precision, recall, and F-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

impl Scores {
    pub fn zero() -> Self {
        Self {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
        }
    }
}

/// Fraction of predictions matching the truth.
pub fn accuracy(truth: &[usize], pred: &[usize]) -> f32 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(pred).filter(|(t, p)| t == p).count();
    correct as f32 / truth.len() as f32
}

/// Macro-averaged scores over `num_classes` classes.
pub fn multiclass_scores(truth: &[usize], pred: &[usize], num_classes: usize) -> Scores {
    if num_classes == 0 || truth.is_empty() {
        return Scores::zero();
    }

    let mut precision_sum = 0.0f32;
    let mut recall_sum = 0.0f32;
    let mut f1_sum = 0.0f32;

    for class in 0..num_classes {
        let tp = truth
            .iter()
            .zip(pred)
            .filter(|(t, p)| **t == class && **p == class)
            .count() as f32;
        let fp = truth
            .iter()
            .zip(pred)
            .filter(|(t, p)| **t != class && **p == class)
            .count() as f32;
        let fn_ = truth
            .iter()
            .zip(pred)
            .filter(|(t, p)| **t == class && **p != class)
            .count() as f32;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        precision_sum += precision;
        recall_sum += recall;
        f1_sum += f1;
    }

    let k = num_classes as f32;
    Scores {
        precision: precision_sum / k,
        recall: recall_sum / k,
        f1: f1_sum / k,
    }
}

/// Binary scores for the positive class (1) after thresholding its
/// predicted probability.
pub fn binary_scores(truth: &[usize], positive_proba: &[f32], threshold: f32) -> Scores {
    let pred: Vec<usize> = positive_proba
        .iter()
        .map(|&p| usize::from(p >= threshold))
        .collect();

    let tp = truth.iter().zip(&pred).filter(|(t, p)| **t == 1 && **p == 1).count() as f32;
    let fp = truth.iter().zip(&pred).filter(|(t, p)| **t != 1 && **p == 1).count() as f32;
    let fn_ = truth.iter().zip(&pred).filter(|(t, p)| **t == 1 && **p != 1).count() as f32;

    let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Scores {
        precision,
        recall,
        f1,
    }
}

/// `(recall, precision)` points swept over every distinct probability value,
/// one-vs-rest for `class`.
pub fn pr_curve(truth: &[usize], proba: &[f32], class: usize) -> Vec<(f32, f32)> {
    let mut thresholds: Vec<f32> = proba.to_vec();
    thresholds.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    thresholds.dedup();

    let positives = truth.iter().filter(|&&t| t == class).count() as f32;
    let mut points = Vec::with_capacity(thresholds.len());
    for threshold in thresholds {
        let tp = truth
            .iter()
            .zip(proba)
            .filter(|(t, p)| **t == class && **p >= threshold)
            .count() as f32;
        let predicted = proba.iter().filter(|&&p| p >= threshold).count() as f32;

        let precision = if predicted > 0.0 { tp / predicted } else { 1.0 };
        let recall = if positives > 0.0 { tp / positives } else { 0.0 };
        points.push((recall, precision));
    }
    points
}

/// Render precision-recall curves (recall on x, precision on y, one color
/// per class) to a PNG at `path`.
///
/// The chart carries no text: the minimal bitmap backend renders lines
/// only, keeping the plot free of native font dependencies.
pub fn plot_pr_curves(curves: &[(String, Vec<(f32, f32)>)], path: &Path) -> Result<()> {
    const SERIES_COLORS: [RGBColor; 6] = [RED, BLUE, GREEN, MAGENTA, CYAN, BLACK];

    let root = BitMapBackend::new(path, (640, 480)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| BunruiError::Artifact(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0f32..1f32, 0f32..1f32)
        .map_err(|e| BunruiError::Artifact(e.to_string()))?;

    chart
        .configure_mesh()
        .draw()
        .map_err(|e| BunruiError::Artifact(e.to_string()))?;

    for (i, (label, points)) in curves.iter().enumerate() {
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];
        chart
            .draw_series(LineSeries::new(points.iter().copied(), &color))
            .map_err(|e| BunruiError::Artifact(e.to_string()))?;
        tracing::info!(series = %label, "plotted precision-recall curve");
    }

    root.present()
        .map_err(|e| BunruiError::Artifact(e.to_string()))?;
    Ok(())
}

/// Print validation metrics for the stacked strategy.
pub fn simple_evaluate(truth: &[usize], pred: &[usize], num_classes: usize) {
    let scores = multiclass_scores(truth, pred, num_classes);
    println!(
        "acc:{:.6}, precision:{:.6}, recall:{:.6}, f1:{:.6}",
        accuracy(truth, pred),
        scores.precision,
        scores.recall,
        scores.f1
    );
}

/// Index of the best epoch: the first maximum F-score. Comparison is strict
/// greater-than, so ties resolve to the earliest epoch.
pub fn best_epoch(scores: &[Scores]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, score) in scores.iter().enumerate() {
        match best {
            Some(b) if score.f1 <= scores[b].f1 => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_score_one() {
        let truth = vec![0, 1, 2, 1, 0];
        let scores = multiclass_scores(&truth, &truth, 3);
        assert!((scores.precision - 1.0).abs() < 1e-6);
        assert!((scores.recall - 1.0).abs() < 1e-6);
        assert!((scores.f1 - 1.0).abs() < 1e-6);
        assert!((accuracy(&truth, &truth) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn macro_average_counts_empty_classes() {
        let truth = vec![0, 0, 1, 1];
        let pred = vec![0, 0, 0, 0];
        // class 0: p=0.5 r=1.0 f=2/3; class 1: all zero
        let scores = multiclass_scores(&truth, &pred, 2);
        assert!((scores.precision - 0.25).abs() < 1e-6);
        assert!((scores.recall - 0.5).abs() < 1e-6);
    }

    #[test]
    fn threshold_moves_binary_precision_recall() {
        let truth = vec![1, 1, 0, 0];
        let proba = vec![0.9, 0.6, 0.55, 0.1];

        let strict = binary_scores(&truth, &proba, 0.8);
        assert!((strict.precision - 1.0).abs() < 1e-6);
        assert!((strict.recall - 0.5).abs() < 1e-6);

        let loose = binary_scores(&truth, &proba, 0.5);
        assert!((loose.precision - 2.0 / 3.0).abs() < 1e-6);
        assert!((loose.recall - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pr_curve_starts_precise_and_ends_complete() {
        let truth = vec![1, 1, 0, 0];
        let proba = vec![0.9, 0.8, 0.3, 0.2];
        let points = pr_curve(&truth, &proba, 1);

        let (first_recall, first_precision) = points[0];
        assert!((first_precision - 1.0).abs() < 1e-6);
        assert!(first_recall < 1.0);

        let (last_recall, _) = *points.last().unwrap();
        assert!((last_recall - 1.0).abs() < 1e-6);
    }

    #[test]
    fn best_epoch_takes_first_maximum() {
        let scores: Vec<Scores> = [0.70, 0.81, 0.81, 0.75, 0.60]
            .iter()
            .map(|&f1| Scores {
                precision: 0.0,
                recall: 0.0,
                f1,
            })
            .collect();
        // First occurrence of the max 0.81 is index 1 (epoch number 2).
        assert_eq!(best_epoch(&scores), Some(1));
    }

    #[test]
    fn best_epoch_of_empty_history_is_none() {
        assert_eq!(best_epoch(&[]), None);
    }

    #[test]
    fn pr_plot_writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pr_curve.png");
        let curve = vec![(0.0, 1.0), (0.5, 0.8), (1.0, 0.5)];

        plot_pr_curves(&[("class 1".to_string(), curve)], &path).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
