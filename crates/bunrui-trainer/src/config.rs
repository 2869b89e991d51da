//! # Training Configuration
//!
//! One explicit configuration value, constructed from a JSON file (or
//! defaults) and passed by reference into every component. The model family
//! is a closed enum: an unrecognized name fails at parse time, before any
//! corpus data is read.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use bunrui_core::error::{BunruiError, Result};

/// Classical model families selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassicKind {
    LogisticRegression,
    Bayes,
    Knn,
}

/// The three mutually exclusive training strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Feature-matrix classifier, one of [`ClassicKind`].
    Classic(ClassicKind),
    /// Gradient-boosted trees feeding a linear model over leaf features.
    Stacked,
    /// Neural classifier over padded ID sequences.
    Sequence,
}

impl FromStr for ModelFamily {
    type Err = BunruiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cnn" => Ok(ModelFamily::Sequence),
            "xgboost_lr" => Ok(ModelFamily::Stacked),
            "logistic_regression" => Ok(ModelFamily::Classic(ClassicKind::LogisticRegression)),
            "bayes" => Ok(ModelFamily::Classic(ClassicKind::Bayes)),
            "knn" => Ok(ModelFamily::Classic(ClassicKind::Knn)),
            other => Err(BunruiError::Config(format!(
                "unknown model family: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFamily::Sequence => "cnn",
            ModelFamily::Stacked => "xgboost_lr",
            ModelFamily::Classic(ClassicKind::LogisticRegression) => "logistic_regression",
            ModelFamily::Classic(ClassicKind::Bayes) => "bayes",
            ModelFamily::Classic(ClassicKind::Knn) => "knn",
        };
        f.write_str(name)
    }
}

impl Serialize for ModelFamily {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelFamily {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Feature-extraction modes for the classical and stacked strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Character n-gram TF-IDF weighting.
    TfidfChar,
    /// Word TF-IDF weighting.
    TfidfWord,
    /// Language-model-derived signal.
    Language,
}

impl FromStr for FeatureKind {
    type Err = BunruiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tfidf_char" => Ok(FeatureKind::TfidfChar),
            "tfidf_word" => Ok(FeatureKind::TfidfWord),
            "language" => Ok(FeatureKind::Language),
            other => Err(BunruiError::Config(format!(
                "unknown feature kind: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::TfidfChar => "tfidf_char",
            FeatureKind::TfidfWord => "tfidf_word",
            FeatureKind::Language => "language",
        };
        f.write_str(name)
    }
}

impl Serialize for FeatureKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeatureKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Settings for one training run.
///
/// Derived artifact paths hang off `output_dir`; the scratch directory is
/// run-scoped and cleared by the sequence strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub model_family: ModelFamily,
    pub feature_kind: FeatureKind,
    /// Column separator between label and content in corpus lines.
    pub col_sep: char,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub output_dir: PathBuf,
    /// Ephemeral per-run scratch space for the sequence strategy.
    pub scratch_dir: PathBuf,
    pub num_classes: usize,
    /// Positive-class decision threshold for binary evaluation.
    pub threshold: f32,
    /// Fixed encoded sequence length.
    pub max_len: usize,
    /// Minimum token frequency for vocabulary membership.
    pub min_count: usize,
    pub word_dim: usize,
    pub pos_dim: usize,
    /// Word vocabulary starts here; 0 is padding, 1 unknown.
    pub word_offset: u32,
    /// Part-of-speech vocabulary starts here; 0 is shared padding/unknown.
    pub pos_offset: u32,
    pub batch_size: usize,
    pub epochs: usize,
    pub keep_prob: f32,
    pub word_keep_prob: f32,
    pub pos_keep_prob: f32,
    /// Fraction of examples held out for validation.
    pub val_fraction: f32,
    /// Seed for the deterministic split and embedding training.
    pub seed: u64,
    /// Optional pre-trained word vectors (word2vec text format).
    pub word_vectors_path: Option<PathBuf>,
    /// Rebuild embedding tables even when assembled ones exist.
    pub overwrite_embeddings: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model_family: ModelFamily::Classic(ClassicKind::LogisticRegression),
            feature_kind: FeatureKind::TfidfChar,
            col_sep: '\t',
            train_path: PathBuf::from("data/train_seg.txt"),
            test_path: PathBuf::from("data/test_seg.txt"),
            output_dir: PathBuf::from("output"),
            scratch_dir: PathBuf::from("output/save_model"),
            num_classes: 4,
            threshold: 0.5,
            max_len: 300,
            min_count: 5,
            word_dim: 256,
            pos_dim: 64,
            word_offset: 2,
            pos_offset: 1,
            batch_size: 128,
            epochs: 5,
            keep_prob: 0.5,
            word_keep_prob: 0.9,
            pos_keep_prob: 0.9,
            val_fraction: 0.2,
            seed: 0,
            word_vectors_path: None,
            overwrite_embeddings: true,
        }
    }
}

impl TrainConfig {
    /// Load a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| {
            BunruiError::Config(format!(
                "{}: {e}",
                path.as_ref().display()
            ))
        })
    }

    pub fn word_vocab_path(&self) -> PathBuf {
        self.output_dir.join("word_vocab.txt")
    }

    pub fn pos_vocab_path(&self) -> PathBuf {
        self.output_dir.join("pos_vocab.txt")
    }

    pub fn label_vocab_path(&self) -> PathBuf {
        self.output_dir.join("label_vocab.txt")
    }

    pub fn word_emb_path(&self) -> PathBuf {
        self.output_dir.join("w2v.json")
    }

    pub fn pos_emb_path(&self) -> PathBuf {
        self.output_dir.join("p2v.json")
    }

    pub fn vectorizer_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("vectorizer_{}.json", self.feature_kind))
    }

    pub fn model_save_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "model_{}_{}.json",
            self.feature_kind, self.model_family
        ))
    }

    pub fn pr_figure_path(&self) -> PathBuf {
        self.output_dir.join("pr_curve.png")
    }

    pub fn stacked_trees_path(&self) -> PathBuf {
        self.output_dir.join("xgblr_trees.json")
    }

    pub fn stacked_linear_path(&self) -> PathBuf {
        self.output_dir.join("xgblr_linear.json")
    }

    pub fn stacked_encoder_path(&self) -> PathBuf {
        self.output_dir.join("xgblr_encoder.json")
    }

    pub fn sequence_weights_path(&self) -> PathBuf {
        self.output_dir.join("model_sequence.safetensors")
    }

    pub fn best_pred_path(&self) -> PathBuf {
        self.output_dir.join("best.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_names_parse() {
        assert_eq!("cnn".parse::<ModelFamily>().unwrap(), ModelFamily::Sequence);
        assert_eq!(
            "xgboost_lr".parse::<ModelFamily>().unwrap(),
            ModelFamily::Stacked
        );
        assert_eq!(
            "bayes".parse::<ModelFamily>().unwrap(),
            ModelFamily::Classic(ClassicKind::Bayes)
        );
    }

    #[test]
    fn unknown_family_is_a_config_error() {
        let err = "word2vec".parse::<ModelFamily>().unwrap_err();
        assert!(matches!(err, BunruiError::Config(_)));
        assert!(err.to_string().contains("word2vec"));
    }

    #[test]
    fn unknown_family_fails_config_load_before_any_data_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{"model_family": "transformer"}"#).unwrap();

        let err = TrainConfig::load(&path).unwrap_err();
        assert!(matches!(err, BunruiError::Config(_)));
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(
            &path,
            r#"{"model_family": "cnn", "epochs": 3, "max_len": 50}"#,
        )
        .unwrap();

        let config = TrainConfig::load(&path).unwrap();
        assert_eq!(config.model_family, ModelFamily::Sequence);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.max_len, 50);
        assert_eq!(config.batch_size, TrainConfig::default().batch_size);
    }

    #[test]
    fn family_display_round_trips() {
        for name in ["cnn", "xgboost_lr", "logistic_regression", "bayes", "knn"] {
            let family: ModelFamily = name.parse().unwrap();
            assert_eq!(family.to_string(), name);
        }
    }

    #[test]
    fn derived_paths_live_under_output_dir() {
        let config = TrainConfig::default();
        assert!(config.model_save_path().starts_with(&config.output_dir));
        assert_eq!(
            config.vectorizer_path(),
            PathBuf::from("output/vectorizer_tfidf_char.json")
        );
    }
}
