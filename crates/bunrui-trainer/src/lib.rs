//! # Bunrui Trainer
//!
//! Training orchestration for the bunrui pipeline: one configuration value
//! dispatches to exactly one of three strategies (a classical
//! feature-matrix classifier, a stacked tree-and-linear model, or a neural
//! sequence classifier) and persists the winning artifacts.

pub mod config;
pub mod embedding;
pub mod eval;
pub mod feature;
pub mod models;
pub mod split;
pub mod trainer;

pub use config::{ClassicKind, FeatureKind, ModelFamily, TrainConfig};
pub use trainer::run_training;
