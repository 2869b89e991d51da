//! # Embedding Assembly
//!
//! Builds dense lookup tables indexed by vocabulary ID from a word-vector
//! source. The source is either a pre-trained file in word2vec text format
//! or vectors trained here with a deterministic random-indexing scheme.
//! Vocabulary entries missing from the source get the zero vector; a row
//! is never absent.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::info;

use bunrui_core::error::{BunruiError, Result};
use bunrui_core::vocab::Vocab;

/// A token-to-dense-vector mapping.
#[derive(Debug, Clone)]
pub struct WordVectors {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    /// Train vectors from token sequences with seeded random indexing:
    /// every token gets a deterministic signature vector, and a token's
    /// embedding is the normalized sum of the signatures of its window
    /// neighbours. Tokens under `min_count` are skipped.
    pub fn train(sentences: &[Vec<String>], dim: usize, min_count: usize, seed: u64) -> Self {
        const WINDOW: usize = 2;

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for sentence in sentences {
            for token in sentence {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        let mut sums: HashMap<String, Vec<f32>> = HashMap::new();
        for sentence in sentences {
            for (i, token) in sentence.iter().enumerate() {
                if counts[token.as_str()] < min_count.max(1) {
                    continue;
                }
                let entry = sums
                    .entry(token.clone())
                    .or_insert_with(|| vec![0.0; dim]);
                let lo = i.saturating_sub(WINDOW);
                let hi = (i + WINDOW + 1).min(sentence.len());
                for neighbour in &sentence[lo..hi] {
                    if std::ptr::eq(neighbour, token) {
                        continue;
                    }
                    for (slot, value) in entry.iter_mut().zip(signature(neighbour, dim, seed)) {
                        *slot += value;
                    }
                }
            }
        }

        let vectors = sums
            .into_iter()
            .map(|(token, sum)| {
                let norm = sum.iter().map(|v| v * v).sum::<f32>().sqrt();
                let vector = if norm > 0.0 {
                    sum.iter().map(|v| v / norm).collect()
                } else {
                    // Isolated token: fall back to its own signature.
                    signature(&token, dim, seed)
                };
                (token, vector)
            })
            .collect();

        Self { dim, vectors }
    }

    /// Load vectors from a word2vec-style text file: `token v1 v2 ...` per
    /// line. Lines whose vector width disagrees with the first line are
    /// skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut dim = 0usize;
        let mut vectors = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(token) = parts.next() else {
                continue;
            };
            let values: Vec<f32> = parts.filter_map(|v| v.parse().ok()).collect();
            if values.is_empty() {
                continue;
            }
            if dim == 0 {
                dim = values.len();
            }
            if values.len() != dim {
                continue;
            }
            vectors.insert(token.to_string(), values);
        }

        info!(path = %path.as_ref().display(), tokens = vectors.len(), dim, "loaded word vectors");
        Ok(Self { dim, vectors })
    }

    /// Persist in the same text format [`WordVectors::load`] reads.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        for (token, vector) in &self.vectors {
            write!(writer, "{token}")?;
            for value in vector {
                write!(writer, " {value}")?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn get(&self, token: &str) -> Option<&[f32]> {
        self.vectors.get(token).map(Vec::as_slice)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Deterministic signature vector for a token.
fn signature(token: &str, dim: usize, seed: u64) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    let mut rng = oorandom::Rand64::new(((hasher.finish() as u128) << 64) | seed as u128);
    (0..dim)
        .map(|_| (rng.rand_float() as f32) * 2.0 - 1.0)
        .collect()
}

/// Build the ID-indexed table for `vocab`: row `id` holds the vector of the
/// token owning that ID; reserved low IDs and source misses hold zeros.
pub fn assemble_table(source: &WordVectors, vocab: &Vocab, dim: usize) -> Vec<Vec<f32>> {
    let rows = vocab.offset() as usize + vocab.len();
    let mut table = vec![vec![0.0f32; dim]; rows];
    for (token, id) in vocab.iter() {
        // Traversal-order vocabularies may hold IDs past the contiguous
        // range; those rows are simply not representable in the table.
        let Some(row) = table.get_mut(id as usize) else {
            continue;
        };
        if let Some(vector) = source.get(token) {
            let width = vector.len().min(dim);
            row[..width].copy_from_slice(&vector[..width]);
        }
    }
    table
}

/// Assemble (or reuse) the embedding table persisted at `path`.
///
/// With `overwrite` unset and an existing table on disk, the table is
/// reloaded and the source is never computed; otherwise `source` runs once
/// and the rebuilt table replaces the file.
pub fn build_table<P, F>(
    path: P,
    overwrite: bool,
    vocab: &Vocab,
    dim: usize,
    source: F,
) -> Result<Vec<Vec<f32>>>
where
    P: AsRef<Path>,
    F: FnOnce() -> Result<WordVectors>,
{
    let path = path.as_ref();
    if !overwrite && path.exists() {
        info!(path = %path.display(), "reusing assembled embedding table");
        return load_table(path);
    }

    let table = assemble_table(&source()?, vocab, dim);
    save_table(path, &table)?;
    Ok(table)
}

/// Persist an assembled table as JSON.
pub fn save_table<P: AsRef<Path>>(path: P, table: &[Vec<f32>]) -> Result<()> {
    let json = serde_json::to_string(table).map_err(|e| BunruiError::Artifact(e.to_string()))?;
    std::fs::write(path.as_ref(), json)?;
    info!(path = %path.as_ref().display(), rows = table.len(), "saved embedding table");
    Ok(())
}

/// Reload a table persisted by [`save_table`].
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f32>>> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| BunruiError::Artifact(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunrui_core::vocab::VocabOptions;

    fn sentences(items: &[&[&str]]) -> Vec<Vec<String>> {
        items
            .iter()
            .map(|s| s.iter().map(|t| t.to_string()).collect())
            .collect()
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let corpus = sentences(&[&["a", "b", "c"], &["a", "c", "b"], &["b", "a"]]);
        let first = WordVectors::train(&corpus, 8, 1, 42);
        let second = WordVectors::train(&corpus, 8, 1, 42);
        assert_eq!(first.get("a"), second.get("a"));
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn min_count_drops_rare_tokens() {
        let corpus = sentences(&[&["a", "a", "rare"], &["a", "b", "b"]]);
        let vectors = WordVectors::train(&corpus, 4, 2, 0);
        assert!(vectors.get("a").is_some());
        assert!(vectors.get("rare").is_none());
    }

    #[test]
    fn table_rows_cover_offset_and_vocab() {
        let vocab = Vocab::build(
            ["x", "x", "y"],
            VocabOptions {
                offset: 2,
                ..Default::default()
            },
        );
        let corpus = sentences(&[&["x", "y"]]);
        let source = WordVectors::train(&corpus, 4, 1, 0);
        let table = assemble_table(&source, &vocab, 4);

        assert_eq!(table.len(), 4);
        // Reserved rows stay zeroed.
        assert_eq!(table[0], vec![0.0; 4]);
        assert_eq!(table[1], vec![0.0; 4]);
        // Vocabulary rows carry the source vectors.
        assert_eq!(table[vocab.get("x").unwrap() as usize], source.get("x").unwrap());
    }

    #[test]
    fn missing_source_entries_default_to_zero_rows() {
        let vocab = Vocab::build(
            ["seen", "seen", "unseen", "unseen"],
            VocabOptions {
                offset: 1,
                ..Default::default()
            },
        );
        let mut source = WordVectors::train(&sentences(&[&["seen", "ctx"]]), 3, 1, 0);
        source.vectors.remove("ctx");
        source.vectors.remove("unseen");

        let table = assemble_table(&source, &vocab, 3);
        assert_eq!(table[vocab.get("unseen").unwrap() as usize], vec![0.0; 3]);
    }

    #[test]
    fn existing_table_is_reused_without_recomputation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w2v.json");
        let vocab = Vocab::build(["t", "t"], VocabOptions::default());

        save_table(&path, &[vec![1.0, 2.0]]).unwrap();

        let table = build_table(&path, false, &vocab, 2, || {
            panic!("source must not be recomputed when reusing")
        })
        .unwrap();
        assert_eq!(table, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn overwrite_rebuilds_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w2v.json");
        let vocab = Vocab::build(["t", "t"], VocabOptions::default());

        save_table(&path, &[vec![9.0]]).unwrap();

        let corpus = sentences(&[&["t", "u"]]);
        let table = build_table(&path, true, &vocab, 4, || {
            Ok(WordVectors::train(&corpus, 4, 1, 0))
        })
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].len(), 4);
        // The persisted copy was replaced too.
        assert_eq!(load_table(&path).unwrap(), table);
    }

    #[test]
    fn text_format_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");

        let corpus = sentences(&[&["m", "n", "o"]]);
        let vectors = WordVectors::train(&corpus, 4, 1, 7);
        vectors.save(&path).unwrap();

        let reloaded = WordVectors::load(&path).unwrap();
        assert_eq!(reloaded.len(), vectors.len());
        assert_eq!(reloaded.dim(), 4);
        let original = vectors.get("m").unwrap();
        let restored = reloaded.get("m").unwrap();
        for (a, b) in original.iter().zip(restored) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
