//! # Sequence Neural Classifier
//!
//! Convolution over concatenated word and part-of-speech embeddings, global
//! max pooling, and a linear head, trained with AdamW and cross-entropy.
//! Embedding tables come pre-assembled and stay frozen; only the
//! convolution and head are optimized. Per-epoch precision/recall/F on the
//! dev split is tracked so the orchestrator can promote the best epoch.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{
    AdamW, Conv1d, Conv1dConfig, Embedding, Linear, Module, Optimizer, ParamsAdamW, VarBuilder,
    VarMap, conv1d, linear, ops,
};
use tracing::info;

use bunrui_core::error::{BunruiError, Result};

use crate::eval::{self, Scores};

/// Hyperparameters of the sequence model.
#[derive(Debug, Clone)]
pub struct SequenceModelConfig {
    pub max_len: usize,
    pub num_classes: usize,
    pub batch_size: usize,
    pub epochs: usize,
    pub keep_prob: f32,
    pub word_keep_prob: f32,
    pub pos_keep_prob: f32,
    pub conv_filters: usize,
    pub kernel_size: usize,
    pub learning_rate: f64,
}

impl Default for SequenceModelConfig {
    fn default() -> Self {
        Self {
            max_len: 300,
            num_classes: 2,
            batch_size: 128,
            epochs: 5,
            keep_prob: 0.5,
            word_keep_prob: 0.9,
            pos_keep_prob: 0.9,
            conv_filters: 128,
            kernel_size: 3,
            learning_rate: 1e-3,
        }
    }
}

/// The fitted (or fitting) sequence model.
pub struct SequenceModel {
    device: Device,
    varmap: VarMap,
    word_emb: Embedding,
    pos_emb: Embedding,
    conv: Conv1d,
    fc: Linear,
    config: SequenceModelConfig,
    scores: Vec<Scores>,
}

fn candle_err(e: candle_core::Error) -> BunruiError {
    BunruiError::Model(e.to_string())
}

impl SequenceModel {
    /// Build the model over pre-assembled embedding tables.
    pub fn new(
        word_table: &[Vec<f32>],
        word_dim: usize,
        pos_table: &[Vec<f32>],
        pos_dim: usize,
        config: SequenceModelConfig,
    ) -> Result<Self> {
        let device = Device::Cpu;

        let word_emb = Embedding::new(
            table_tensor(word_table, word_dim, &device).map_err(candle_err)?,
            word_dim,
        );
        let pos_emb = Embedding::new(
            table_tensor(pos_table, pos_dim, &device).map_err(candle_err)?,
            pos_dim,
        );

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let conv = conv1d(
            word_dim + pos_dim,
            config.conv_filters,
            config.kernel_size,
            Conv1dConfig {
                padding: 1,
                ..Default::default()
            },
            vb.pp("conv"),
        )
        .map_err(candle_err)?;
        let fc = linear(config.conv_filters, config.num_classes, vb.pp("fc"))
            .map_err(candle_err)?;

        Ok(Self {
            device,
            varmap,
            word_emb,
            pos_emb,
            conv,
            fc,
            config,
            scores: Vec::new(),
        })
    }

    fn forward(&self, words: &Tensor, pos: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut word_vecs = self.word_emb.forward(words)?;
        let mut pos_vecs = self.pos_emb.forward(pos)?;
        if train {
            word_vecs = ops::dropout(&word_vecs, 1.0 - self.config.word_keep_prob)?;
            pos_vecs = ops::dropout(&pos_vecs, 1.0 - self.config.pos_keep_prob)?;
        }

        let x = Tensor::cat(&[&word_vecs, &pos_vecs], D::Minus1)?;
        let x = x.transpose(1, 2)?.contiguous()?;
        let x = self.conv.forward(&x)?.relu()?;
        let mut x = x.max(D::Minus1)?;
        if train {
            x = ops::dropout(&x, 1.0 - self.config.keep_prob)?;
        }
        self.fc.forward(&x)
    }

    /// Fit for the configured number of epochs.
    ///
    /// After each pass the dev split is scored and the test split's
    /// predicted labels are written to `scratch_dir/epoch_<n>.csv`
    /// (1-based). Returns the per-epoch dev scores.
    #[allow(clippy::too_many_arguments)]
    pub fn fit(
        &mut self,
        train_words: &[Vec<u32>],
        train_pos: &[Vec<u32>],
        train_labels: &[u32],
        dev_words: &[Vec<u32>],
        dev_pos: &[Vec<u32>],
        dev_labels: &[u32],
        test_words: &[Vec<u32>],
        test_pos: &[Vec<u32>],
        label_names: &[String],
        scratch_dir: &Path,
    ) -> Result<&[Scores]> {
        let mut optimizer = AdamW::new(
            self.varmap.all_vars(),
            ParamsAdamW {
                lr: self.config.learning_rate,
                ..Default::default()
            },
        )
        .map_err(candle_err)?;

        let n = train_words.len();
        let batch = self.config.batch_size.max(1);

        for epoch in 0..self.config.epochs {
            let mut epoch_loss = 0.0f32;
            let mut n_batches = 0usize;

            for start in (0..n).step_by(batch) {
                let end = (start + batch).min(n);
                let words = batch_tensor(&train_words[start..end], &self.device)
                    .map_err(candle_err)?;
                let pos =
                    batch_tensor(&train_pos[start..end], &self.device).map_err(candle_err)?;
                let labels = Tensor::from_vec(
                    train_labels[start..end].to_vec(),
                    end - start,
                    &self.device,
                )
                .map_err(candle_err)?;

                let logits = self.forward(&words, &pos, true).map_err(candle_err)?;
                let loss =
                    candle_nn::loss::cross_entropy(&logits, &labels).map_err(candle_err)?;
                optimizer.backward_step(&loss).map_err(candle_err)?;

                epoch_loss += loss.to_scalar::<f32>().map_err(candle_err)?;
                n_batches += 1;
            }

            let dev_pred = self.predict(dev_words, dev_pos)?;
            let dev_truth: Vec<usize> = dev_labels.iter().map(|&l| l as usize).collect();
            let scores = eval::multiclass_scores(&dev_truth, &dev_pred, self.config.num_classes);
            self.scores.push(scores);

            println!(
                "Epoch {}/{} - loss:{:.6}, P@dev:{:.6}, R@dev:{:.6}, F@dev:{:.6}",
                epoch + 1,
                self.config.epochs,
                epoch_loss / n_batches.max(1) as f32,
                scores.precision,
                scores.recall,
                scores.f1
            );

            let test_pred = self.predict(test_words, test_pos)?;
            self.write_predictions(&test_pred, label_names, scratch_dir, epoch + 1)?;
        }

        Ok(&self.scores)
    }

    /// Predicted class per example, batched, without dropout.
    pub fn predict(&self, words: &[Vec<u32>], pos: &[Vec<u32>]) -> Result<Vec<usize>> {
        let mut predictions = Vec::with_capacity(words.len());
        let batch = self.config.batch_size.max(1);
        for start in (0..words.len()).step_by(batch) {
            let end = (start + batch).min(words.len());
            let word_ids =
                batch_tensor(&words[start..end], &self.device).map_err(candle_err)?;
            let pos_ids = batch_tensor(&pos[start..end], &self.device).map_err(candle_err)?;

            let logits = self.forward(&word_ids, &pos_ids, false).map_err(candle_err)?;
            let argmax = logits
                .argmax(D::Minus1)
                .map_err(candle_err)?
                .to_vec1::<u32>()
                .map_err(candle_err)?;
            predictions.extend(argmax.into_iter().map(|id| id as usize));
        }
        Ok(predictions)
    }

    fn write_predictions(
        &self,
        predictions: &[usize],
        label_names: &[String],
        scratch_dir: &Path,
        epoch_number: usize,
    ) -> Result<()> {
        let path = scratch_dir.join(format!("epoch_{epoch_number}.csv"));
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        for &class in predictions {
            match label_names.get(class) {
                Some(name) => writeln!(writer, "{name}")?,
                None => writeln!(writer, "{class}")?,
            }
        }
        writer.flush()?;
        info!(path = %path.display(), "wrote epoch predictions");
        Ok(())
    }

    /// Dev scores tracked so far, one entry per finished epoch.
    pub fn scores(&self) -> &[Scores] {
        &self.scores
    }

    /// The best epoch: `(scores, 0-based index)` of the first maximum
    /// F-score across all finished epochs.
    pub fn best_score(&self) -> Option<(Scores, usize)> {
        eval::best_epoch(&self.scores).map(|i| (self.scores[i], i))
    }

    /// Persist the trainable weights (safetensors via the var map).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap.save(path.as_ref()).map_err(candle_err)?;
        info!(path = %path.as_ref().display(), "saved sequence model weights");
        Ok(())
    }
}

fn table_tensor(
    table: &[Vec<f32>],
    dim: usize,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let rows = table.len();
    let mut flat = Vec::with_capacity(rows * dim);
    for row in table {
        let take = row.len().min(dim);
        flat.extend_from_slice(&row[..take]);
        flat.resize(flat.len() + (dim - take), 0.0);
    }
    Tensor::from_vec(flat, (rows, dim), device)
}

fn batch_tensor(sequences: &[Vec<u32>], device: &Device) -> candle_core::Result<Tensor> {
    let b = sequences.len();
    let l = sequences.first().map_or(0, Vec::len);
    let flat: Vec<u32> = sequences.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (b, l), device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> SequenceModelConfig {
        SequenceModelConfig {
            max_len: 6,
            num_classes: 2,
            batch_size: 2,
            epochs: 2,
            // keep everything: dropout off for a deterministic smoke test
            keep_prob: 1.0,
            word_keep_prob: 1.0,
            pos_keep_prob: 1.0,
            conv_filters: 8,
            kernel_size: 3,
            learning_rate: 1e-2,
        }
    }

    fn table(rows: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..rows)
            .map(|r| (0..dim).map(|c| (r * dim + c) as f32 * 0.01).collect())
            .collect()
    }

    #[test]
    fn fit_tracks_one_score_per_epoch_and_writes_epoch_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config();

        let mut model = SequenceModel::new(&table(6, 4), 4, &table(3, 2), 2, config).unwrap();

        let words: Vec<Vec<u32>> = vec![
            vec![2, 3, 4, 0, 0, 0],
            vec![5, 3, 2, 0, 0, 0],
            vec![4, 4, 1, 0, 0, 0],
            vec![3, 2, 5, 0, 0, 0],
        ];
        let pos: Vec<Vec<u32>> = vec![
            vec![1, 2, 1, 0, 0, 0],
            vec![2, 1, 1, 0, 0, 0],
            vec![1, 1, 2, 0, 0, 0],
            vec![2, 2, 1, 0, 0, 0],
        ];
        let labels = vec![0u32, 1, 0, 1];
        let names = vec!["neg".to_string(), "pos".to_string()];

        let scores = model
            .fit(
                &words,
                &pos,
                &labels,
                &words[..2],
                &pos[..2],
                &labels[..2],
                &words[2..],
                &pos[2..],
                &names,
                dir.path(),
            )
            .unwrap()
            .to_vec();

        assert_eq!(scores.len(), 2);
        assert!(dir.path().join("epoch_1.csv").exists());
        assert!(dir.path().join("epoch_2.csv").exists());

        let content = std::fs::read_to_string(dir.path().join("epoch_2.csv")).unwrap();
        assert_eq!(content.lines().count(), 2);
        for line in content.lines() {
            assert!(line == "neg" || line == "pos");
        }

        let (_, best) = model.best_score().unwrap();
        assert!(best < 2);
    }

    #[test]
    fn predict_returns_one_class_per_example() {
        let config = tiny_config();
        let model = SequenceModel::new(&table(6, 4), 4, &table(3, 2), 2, config).unwrap();

        let words: Vec<Vec<u32>> = vec![vec![1, 2, 3, 4, 5, 0]; 3];
        let pos: Vec<Vec<u32>> = vec![vec![1, 2, 0, 1, 2, 0]; 3];
        let pred = model.predict(&words, &pos).unwrap();
        assert_eq!(pred.len(), 3);
        assert!(pred.iter().all(|&c| c < 2));
    }

    #[test]
    fn weights_save_as_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_sequence.safetensors");

        let model =
            SequenceModel::new(&table(4, 4), 4, &table(2, 2), 2, tiny_config()).unwrap();
        model.save(&path).unwrap();
        assert!(path.exists());
    }
}
