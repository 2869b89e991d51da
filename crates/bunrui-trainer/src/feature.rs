//! # Feature Extraction
//!
//! Turns raw content strings into dense feature matrices for the classical
//! and stacked strategies: character n-gram TF-IDF, word TF-IDF, or a
//! language-model-derived signal. Fitted vectorizers persist as JSON so an
//! inference run can reload them read-only.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use bunrui_core::error::{BunruiError, Result};

use crate::config::FeatureKind;

/// A fitted feature extractor, one of the three [`FeatureKind`] modes.
#[derive(Debug, Serialize, Deserialize)]
pub enum Vectorizer {
    Tfidf(TfidfVectorizer),
    Language(LanguageSignal),
}

impl Vectorizer {
    /// Fit an extractor of the requested kind on the full content collection.
    pub fn fit(kind: FeatureKind, documents: &[String]) -> Self {
        match kind {
            FeatureKind::TfidfChar => Vectorizer::Tfidf(TfidfVectorizer::fit(documents, true)),
            FeatureKind::TfidfWord => Vectorizer::Tfidf(TfidfVectorizer::fit(documents, false)),
            FeatureKind::Language => Vectorizer::Language(LanguageSignal::fit(documents)),
        }
    }

    /// Feature-vector width.
    pub fn dim(&self) -> usize {
        match self {
            Vectorizer::Tfidf(v) => v.vocabulary.len(),
            Vectorizer::Language(_) => LanguageSignal::DIM,
        }
    }

    /// Transform one document into a dense feature vector.
    pub fn transform(&self, document: &str) -> Vec<f32> {
        match self {
            Vectorizer::Tfidf(v) => v.transform(document),
            Vectorizer::Language(v) => v.transform(document),
        }
    }

    /// Transform a document collection into a row-per-example matrix.
    pub fn transform_matrix(&self, documents: &[String]) -> Array2<f32> {
        let dim = self.dim();
        let mut matrix = Array2::zeros((documents.len(), dim));
        for (i, doc) in documents.iter().enumerate() {
            for (j, value) in self.transform(doc).into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }
        matrix
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self).map_err(|e| BunruiError::Artifact(e.to_string()))?;
        std::fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), dim = self.dim(), "saved vectorizer");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| BunruiError::Artifact(e.to_string()))
    }
}

/// TF-IDF weighting over character n-grams (n = 1..=2) or words.
#[derive(Debug, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    char_ngrams: bool,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    n_documents: usize,
}

impl TfidfVectorizer {
    fn fit(documents: &[String], char_ngrams: bool) -> Self {
        let mut vocabulary = HashMap::new();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let terms: HashSet<String> = tokenize(doc, char_ngrams).collect();
            for term in terms {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
                let next = vocabulary.len();
                vocabulary.entry(term).or_insert(next);
            }
        }

        let n = documents.len();
        let mut idf = vec![0.0f32; vocabulary.len()];
        for (term, &idx) in &vocabulary {
            let df = document_frequency[term];
            idf[idx] = ((n as f32 + 1.0) / (df as f32 + 1.0)).ln() + 1.0;
        }

        Self {
            char_ngrams,
            vocabulary,
            idf,
            n_documents: n,
        }
    }

    fn transform(&self, document: &str) -> Vec<f32> {
        let mut tf = vec![0.0f32; self.vocabulary.len()];
        let mut n_terms = 0usize;
        for term in tokenize(document, self.char_ngrams) {
            n_terms += 1;
            if let Some(&idx) = self.vocabulary.get(&term) {
                tf[idx] += 1.0;
            }
        }
        if n_terms > 0 {
            let len = n_terms as f32;
            for (value, idf) in tf.iter_mut().zip(&self.idf) {
                *value = *value / len * idf;
            }
        }
        tf
    }
}

fn tokenize(document: &str, char_ngrams: bool) -> Box<dyn Iterator<Item = String> + '_> {
    if char_ngrams {
        let chars: Vec<char> = document.chars().filter(|c| !c.is_whitespace()).collect();
        let unigrams = chars.clone().into_iter().map(String::from);
        let bigrams: Vec<String> = chars.windows(2).map(|w| w.iter().collect()).collect();
        Box::new(unigrams.chain(bigrams))
    } else {
        Box::new(document.split_whitespace().map(String::from))
    }
}

/// Language-model-derived document signal: smoothed unigram and bigram
/// log-probabilities, out-of-vocabulary rate, and log length.
#[derive(Debug, Serialize, Deserialize)]
pub struct LanguageSignal {
    unigram: HashMap<String, usize>,
    bigram: HashMap<String, usize>,
    total_tokens: usize,
}

impl LanguageSignal {
    pub const DIM: usize = 4;

    fn fit(documents: &[String]) -> Self {
        let mut unigram: HashMap<String, usize> = HashMap::new();
        let mut bigram: HashMap<String, usize> = HashMap::new();
        let mut total_tokens = 0usize;

        for doc in documents {
            let words: Vec<&str> = doc.split_whitespace().collect();
            total_tokens += words.len();
            for word in &words {
                *unigram.entry((*word).to_string()).or_insert(0) += 1;
            }
            for pair in words.windows(2) {
                *bigram.entry(format!("{} {}", pair[0], pair[1])).or_insert(0) += 1;
            }
        }

        Self {
            unigram,
            bigram,
            total_tokens,
        }
    }

    fn transform(&self, document: &str) -> Vec<f32> {
        let words: Vec<&str> = document.split_whitespace().collect();
        if words.is_empty() {
            return vec![0.0; Self::DIM];
        }

        let vocab_size = self.unigram.len().max(1) as f32;
        let total = self.total_tokens as f32;

        let mut uni_logprob = 0.0f32;
        let mut oov = 0usize;
        for word in &words {
            let count = self.unigram.get(*word).copied().unwrap_or(0);
            if count == 0 {
                oov += 1;
            }
            uni_logprob += ((count as f32 + 1.0) / (total + vocab_size)).ln();
        }
        uni_logprob /= words.len() as f32;

        let mut bi_logprob = 0.0f32;
        if words.len() > 1 {
            for pair in words.windows(2) {
                let count = self
                    .bigram
                    .get(&format!("{} {}", pair[0], pair[1]))
                    .copied()
                    .unwrap_or(0);
                let prev = self.unigram.get(pair[0]).copied().unwrap_or(0);
                bi_logprob += ((count as f32 + 1.0) / (prev as f32 + vocab_size)).ln();
            }
            bi_logprob /= (words.len() - 1) as f32;
        }

        vec![
            uni_logprob,
            bi_logprob,
            oov as f32 / words.len() as f32,
            (1.0 + words.len() as f32).ln(),
        ]
    }
}

/// Map label strings to contiguous class IDs over the sorted distinct labels.
///
/// Returns the encoded labels and the class-name table indexed by ID.
pub fn encode_labels(labels: &[String]) -> (Vec<usize>, Vec<String>) {
    let mut classes: Vec<String> = labels
        .iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .cloned()
        .collect();
    classes.sort();

    let index: HashMap<&str, usize> = classes
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let encoded = labels.iter().map(|label| index[label.as_str()]).collect();
    (encoded, classes)
}
