//! # Training Orchestration
//!
//! Dispatches one configuration to exactly one of the three training
//! strategies, wires the prepared data into the chosen collaborator, and
//! persists the winning artifacts. Collaborator failures propagate
//! unmodified; nothing here retries a fit.

use std::fs;
use std::path::Path;

use anyhow::Context;
use ndarray::Array2;
use tracing::{info, warn};

use bunrui_core::corpus::{self, TaggedExample};
use bunrui_core::encode::SequenceEncoder;
use bunrui_core::vocab::{TokenTree, Vocab, VocabOptions};

use crate::config::{ClassicKind, ModelFamily, TrainConfig};
use crate::embedding::{self, WordVectors};
use crate::eval;
use crate::feature::{Vectorizer, encode_labels};
use crate::models::{ClassicModel, SequenceModel, SequenceModelConfig, StackedModel};
use crate::split::train_test_split;

/// Run the strategy selected by `config.model_family`.
pub fn run_training(config: &TrainConfig) -> anyhow::Result<()> {
    fs::create_dir_all(&config.output_dir)?;
    match config.model_family {
        ModelFamily::Classic(kind) => train_classic(config, kind),
        ModelFamily::Stacked => train_stacked(config),
        ModelFamily::Sequence => train_sequence(config),
    }
}

/// Shared preparation for the feature-matrix strategies: read the labeled
/// corpus, fit and persist the vectorizer, encode labels.
fn prepare_features(
    config: &TrainConfig,
) -> anyhow::Result<(Vec<Vec<f32>>, Vec<usize>, Vec<String>, Vectorizer)> {
    let (contents, labels) = corpus::read_labeled(&config.train_path, config.col_sep)?;
    let documents: Vec<String> = contents.iter().map(|c| detag(c)).collect();
    info!(examples = documents.len(), "read labeled corpus");

    let vectorizer = Vectorizer::fit(config.feature_kind, &documents);
    let rows: Vec<Vec<f32>> = documents.iter().map(|d| vectorizer.transform(d)).collect();
    vectorizer.save(config.vectorizer_path())?;

    let (encoded, classes) = encode_labels(&labels);
    if classes.len() != config.num_classes {
        warn!(
            configured = config.num_classes,
            observed = classes.len(),
            "corpus class count differs from configuration"
        );
    }
    Ok((rows, encoded, classes, vectorizer))
}

fn train_classic(config: &TrainConfig, kind: ClassicKind) -> anyhow::Result<()> {
    let (rows, labels, classes, vectorizer) = prepare_features(config)?;
    let num_classes = classes.len();

    let (train_rows, val_rows, train_y, val_y) =
        train_test_split(&rows, &labels, config.val_fraction, config.seed);
    let x_train = rows_to_matrix(&train_rows, vectorizer.dim());
    let x_val = rows_to_matrix(&val_rows, vectorizer.dim());

    let model = ClassicModel::fit(kind, &x_train, &train_y, num_classes);
    model.save(&classes, config.model_save_path())?;

    let proba = model.predict_proba(&x_val);
    if num_classes == 2 {
        let positive: Vec<f32> = proba.column(1).to_vec();
        let scores = eval::binary_scores(&val_y, &positive, config.threshold);
        println!(
            "precision:{:.6}, recall:{:.6}, f1:{:.6} (threshold {:.2})",
            scores.precision, scores.recall, scores.f1, config.threshold
        );
        let curve = eval::pr_curve(&val_y, &positive, 1);
        eval::plot_pr_curves(&[(classes[1].clone(), curve)], &config.pr_figure_path())?;
    } else {
        let pred = model.predict(&x_val);
        let scores = eval::multiclass_scores(&val_y, &pred, num_classes);
        println!(
            "acc:{:.6}, precision:{:.6}, recall:{:.6}, f1:{:.6}",
            eval::accuracy(&val_y, &pred),
            scores.precision,
            scores.recall,
            scores.f1
        );
        let curves: Vec<(String, Vec<(f32, f32)>)> = classes
            .iter()
            .enumerate()
            .map(|(class, name)| {
                let class_proba: Vec<f32> = proba.column(class).to_vec();
                (name.clone(), eval::pr_curve(&val_y, &class_proba, class))
            })
            .collect();
        eval::plot_pr_curves(&curves, &config.pr_figure_path())?;
    }
    info!(figure = %config.pr_figure_path().display(), "classic training finished");
    Ok(())
}

fn train_stacked(config: &TrainConfig) -> anyhow::Result<()> {
    let (rows, labels, classes, vectorizer) = prepare_features(config)?;
    let num_classes = classes.len();

    let (train_rows, val_rows, train_y, val_y) =
        train_test_split(&rows, &labels, config.val_fraction, config.seed);
    let x_train = rows_to_matrix(&train_rows, vectorizer.dim());
    let x_val = rows_to_matrix(&val_rows, vectorizer.dim());

    let model = StackedModel::train(&x_train, &train_y, num_classes);
    model.save(
        &config.stacked_trees_path(),
        &config.stacked_linear_path(),
        &config.stacked_encoder_path(),
    )?;

    let pred = model.predict(&x_val);
    eval::simple_evaluate(&val_y, &pred, num_classes);
    Ok(())
}

fn train_sequence(config: &TrainConfig) -> anyhow::Result<()> {
    let train_examples = corpus::read_tagged(&config.train_path, config.col_sep)?;
    let test_examples = corpus::read_tagged(&config.test_path, config.col_sep)?;
    anyhow::ensure!(
        !train_examples.is_empty(),
        "no training examples in {}",
        config.train_path.display()
    );

    // 1. vocabularies from the raw training corpus
    let word_lists: Vec<Vec<String>> =
        train_examples.iter().map(|e| e.words.clone()).collect();
    let pos_lists: Vec<Vec<String>> = train_examples.iter().map(|e| e.pos.clone()).collect();
    let labels: Vec<String> = train_examples.iter().map(|e| e.label.clone()).collect();

    let word_vocab = Vocab::build(
        TokenTree::from_sentences(&word_lists).leaves(),
        VocabOptions {
            offset: config.word_offset,
            min_count: config.min_count,
            ..Default::default()
        },
    );
    let pos_vocab = Vocab::build(
        TokenTree::from_sentences(&pos_lists).leaves(),
        VocabOptions {
            offset: config.pos_offset,
            ..Default::default()
        },
    );
    let label_vocab = Vocab::build(labels.iter().map(String::as_str), VocabOptions::default());
    info!(
        words = word_vocab.len(),
        pos = pos_vocab.len(),
        labels = label_vocab.len(),
        "built vocabularies"
    );

    word_vocab.save(config.word_vocab_path())?;
    pos_vocab.save(config.pos_vocab_path())?;
    label_vocab.save(config.label_vocab_path())?;

    // 2. embedding tables
    let word_table = embedding::build_table(
        config.word_emb_path(),
        config.overwrite_embeddings,
        &word_vocab,
        config.word_dim,
        || match &config.word_vectors_path {
            Some(path) if path.exists() => WordVectors::load(path),
            _ => Ok(WordVectors::train(
                &word_lists,
                config.word_dim,
                config.min_count,
                config.seed,
            )),
        },
    )?;
    let pos_table = embedding::build_table(
        config.pos_emb_path(),
        config.overwrite_embeddings,
        &pos_vocab,
        config.pos_dim,
        || Ok(WordVectors::train(&pos_lists, config.pos_dim, 1, config.seed)),
    )?;

    // 3. encode every training and test example
    let word_encoder = SequenceEncoder::new(
        &word_vocab,
        config.max_len,
        config.word_offset.saturating_sub(1),
        false,
    );
    let pos_encoder = SequenceEncoder::new(
        &pos_vocab,
        config.max_len,
        config.pos_offset.saturating_sub(1),
        false,
    );
    let encode_pair =
        |e: &TaggedExample| (word_encoder.encode(&e.words), pos_encoder.encode(&e.pos));

    let train_encoded: Vec<(Vec<u32>, Vec<u32>)> =
        train_examples.iter().map(encode_pair).collect();
    let test_encoded: Vec<(Vec<u32>, Vec<u32>)> =
        test_examples.iter().map(encode_pair).collect();
    let label_ids: Vec<u32> = labels
        .iter()
        .map(|label| label_vocab.get(label).unwrap_or(0))
        .collect();

    // 4. run-scoped scratch space
    clear_directory(&config.scratch_dir)?;

    // 5. train/dev split
    let (train_xy, dev_xy, train_labels, dev_labels) =
        train_test_split(&train_encoded, &label_ids, config.val_fraction, config.seed);
    let (train_words, train_pos): (Vec<Vec<u32>>, Vec<Vec<u32>>) =
        train_xy.into_iter().unzip();
    let (dev_words, dev_pos): (Vec<Vec<u32>>, Vec<Vec<u32>>) = dev_xy.into_iter().unzip();
    let (test_words, test_pos): (Vec<Vec<u32>>, Vec<Vec<u32>>) =
        test_encoded.into_iter().unzip();

    // 6. fit
    let model_config = SequenceModelConfig {
        max_len: config.max_len,
        num_classes: label_vocab.len(),
        batch_size: config.batch_size,
        epochs: config.epochs,
        keep_prob: config.keep_prob,
        word_keep_prob: config.word_keep_prob,
        pos_keep_prob: config.pos_keep_prob,
        ..Default::default()
    };
    let mut model = SequenceModel::new(
        &word_table,
        config.word_dim,
        &pos_table,
        config.pos_dim,
        model_config,
    )?;

    let label_names: Vec<String> = {
        let rev = label_vocab.reverse();
        (0..label_vocab.len() as u32)
            .map(|id| rev.get(&id).cloned().unwrap_or_else(|| id.to_string()))
            .collect()
    };

    model.fit(
        &train_words,
        &train_pos,
        &train_labels,
        &dev_words,
        &dev_pos,
        &dev_labels,
        &test_words,
        &test_pos,
        &label_names,
        &config.scratch_dir,
    )?;

    // 7. promote the best epoch
    let (best, best_idx) = model.best_score().context("no epochs were run")?;
    println!(
        "P@dev:{:.6}, R@dev:{:.6}, F@dev:{:.6}, num_best_epoch:{}",
        best.precision,
        best.recall,
        best.f1,
        best_idx + 1
    );

    let best_src = config.scratch_dir.join(format!("epoch_{}.csv", best_idx + 1));
    fs::copy(&best_src, config.best_pred_path())
        .with_context(|| format!("promoting {}", best_src.display()))?;

    model.save(config.sequence_weights_path())?;
    Ok(())
}

/// Remove and recreate the run-scoped scratch directory. A missing
/// directory is not an error; an inaccessible one is.
pub fn clear_directory(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

/// Strip part-of-speech tags from a content field, keeping the words.
fn detag(content: &str) -> String {
    content
        .split_whitespace()
        .map(|item| corpus::split_word_pos(item).0)
        .collect::<Vec<_>>()
        .join(" ")
}

fn rows_to_matrix(rows: &[Vec<f32>], dim: usize) -> Array2<f32> {
    let mut matrix = Array2::zeros((rows.len(), dim));
    for (i, row) in rows.iter().enumerate() {
        for (j, &value) in row.iter().enumerate().take(dim) {
            matrix[[i, j]] = value;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureKind;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_corpus(path: &PathBuf, lines: &[&str]) {
        let mut file = std::fs::File::create(path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn labeled_lines() -> Vec<&'static str> {
        vec![
            "pos\tgood/a movie/n great/a fun/a",
            "pos\tgreat/a acting/n good/a plot/n",
            "pos\tfun/a good/a great/a scenes/n",
            "pos\tgood/a great/a movie/n",
            "neg\tbad/a boring/a plot/n",
            "neg\tawful/a bad/a acting/n",
            "neg\tboring/a awful/a movie/n",
            "neg\tbad/a awful/a boring/a",
            "pos\tgood/a fun/a acting/n",
            "neg\tbad/a plot/n boring/a",
        ]
    }

    fn base_config(dir: &Path) -> TrainConfig {
        let train_path = dir.join("train_seg.txt");
        let test_path = dir.join("test_seg.txt");
        write_corpus(&train_path, &labeled_lines());
        write_corpus(
            &test_path,
            &["pos\tgood/a movie/n", "neg\tbad/a plot/n"],
        );

        TrainConfig {
            train_path,
            test_path,
            output_dir: dir.join("output"),
            scratch_dir: dir.join("output/save_model"),
            num_classes: 2,
            max_len: 6,
            min_count: 1,
            word_dim: 8,
            pos_dim: 4,
            batch_size: 2,
            epochs: 2,
            val_fraction: 0.2,
            seed: 0,
            ..Default::default()
        }
    }

    #[test]
    fn classic_run_persists_model_vectorizer_and_plot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());
        config.model_family = ModelFamily::Classic(ClassicKind::LogisticRegression);
        config.feature_kind = FeatureKind::TfidfWord;

        run_training(&config).unwrap();

        assert!(config.model_save_path().exists());
        assert!(config.vectorizer_path().exists());
        assert!(config.pr_figure_path().exists());
    }

    #[test]
    fn stacked_run_persists_three_artifacts_and_no_plot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());
        config.model_family = ModelFamily::Stacked;
        config.feature_kind = FeatureKind::TfidfWord;

        run_training(&config).unwrap();

        assert!(config.stacked_trees_path().exists());
        assert!(config.stacked_linear_path().exists());
        assert!(config.stacked_encoder_path().exists());
        assert!(!config.pr_figure_path().exists());
    }

    #[test]
    fn sequence_run_promotes_best_epoch_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());
        config.model_family = ModelFamily::Sequence;

        run_training(&config).unwrap();

        assert!(config.word_vocab_path().exists());
        assert!(config.pos_vocab_path().exists());
        assert!(config.label_vocab_path().exists());
        assert!(config.word_emb_path().exists());
        assert!(config.pos_emb_path().exists());
        assert!(config.best_pred_path().exists());
        assert!(config.sequence_weights_path().exists());
        assert!(config.scratch_dir.join("epoch_1.csv").exists());
        assert!(config.scratch_dir.join("epoch_2.csv").exists());

        // Predictions are label names from the corpus.
        let best = std::fs::read_to_string(config.best_pred_path()).unwrap();
        for line in best.lines() {
            assert!(line == "pos" || line == "neg");
        }
    }

    #[test]
    fn clear_directory_resets_scratch_content() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("save_model");
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::write(scratch.join("epoch_1.csv"), "stale").unwrap();

        clear_directory(&scratch).unwrap();
        assert!(scratch.exists());
        assert!(!scratch.join("epoch_1.csv").exists());

        // Absent directory is created, not an error.
        let fresh = dir.path().join("never_made");
        clear_directory(&fresh).unwrap();
        assert!(fresh.exists());
    }
}
