//! # Vocabulary Construction
//!
//! Builds token-to-ID mappings from token streams, either frequency-ranked
//! or in traversal order, and persists them as one-token-per-line files.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::Result;

/// Options controlling how a [`Vocab`] is built.
#[derive(Debug, Clone, Copy)]
pub struct VocabOptions {
    /// Smallest ID assigned. Lower IDs stay reserved for padding/unknown markers.
    pub offset: u32,
    /// Rank tokens by descending frequency instead of traversal order.
    pub sort_by_count: bool,
    /// Tokens seen fewer times are dropped. Only applies when `sort_by_count`
    /// is set and the threshold is non-zero.
    pub min_count: usize,
    /// Lowercase tokens before counting and lookup.
    pub lowercase: bool,
}

impl Default for VocabOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            sort_by_count: true,
            min_count: 0,
            lowercase: false,
        }
    }
}

/// A token-to-integer-ID mapping.
///
/// In frequency-ranked mode IDs form a contiguous range starting at the
/// configured offset. Built once per training run and read-only afterward.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    token_to_id: HashMap<String, u32>,
    offset: u32,
}

impl Vocab {
    /// Build a vocabulary from an ordered token stream.
    ///
    /// Frequency-ranked mode counts every (optionally lowercased) token,
    /// sorts by descending count with ties broken by first-observation order,
    /// assigns IDs from `offset` in that order, and drops tokens below
    /// `min_count`. Traversal-order mode assigns IDs in stream order with no
    /// counting or filtering; a duplicate token keeps the ID of its last
    /// occurrence.
    ///
    /// An empty stream yields an empty vocabulary.
    ///
    /// # Examples
    /// ```
    /// use bunrui_core::vocab::{Vocab, VocabOptions};
    ///
    /// let opts = VocabOptions { offset: 2, min_count: 2, ..Default::default() };
    /// let vocab = Vocab::build(["a", "a", "b", "c", "c", "c"], opts);
    /// assert_eq!(vocab.get("c"), Some(2));
    /// assert_eq!(vocab.get("a"), Some(3));
    /// assert_eq!(vocab.get("b"), None);
    /// ```
    pub fn build<I, T>(tokens: I, opts: VocabOptions) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut token_to_id = HashMap::new();

        if opts.sort_by_count {
            let mut counts: HashMap<String, usize> = HashMap::new();
            let mut order: Vec<String> = Vec::new();
            for token in tokens {
                let token = normalize(token.as_ref(), opts.lowercase);
                match counts.get_mut(&token) {
                    Some(count) => *count += 1,
                    None => {
                        counts.insert(token.clone(), 1);
                        order.push(token);
                    }
                }
            }

            // Stable sort keeps first-observation order among equal counts.
            order.sort_by_key(|token| std::cmp::Reverse(counts[token]));

            let mut next_id = opts.offset;
            for token in order {
                if opts.min_count > 0 && counts[&token] < opts.min_count {
                    continue;
                }
                token_to_id.insert(token, next_id);
                next_id += 1;
            }
        } else {
            for (i, token) in tokens.into_iter().enumerate() {
                let token = normalize(token.as_ref(), opts.lowercase);
                token_to_id.insert(token, opts.offset + i as u32);
            }
        }

        Self {
            token_to_id,
            offset: opts.offset,
        }
    }

    /// Look up the ID assigned to `token`.
    pub fn get(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Whether `token` was assigned an ID.
    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    /// The smallest assignable ID.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Tokens in ID-assignment order.
    pub fn tokens_by_id(&self) -> Vec<&str> {
        let mut entries: Vec<(&str, u32)> = self
            .token_to_id
            .iter()
            .map(|(token, &id)| (token.as_str(), id))
            .collect();
        entries.sort_by_key(|&(_, id)| id);
        entries.into_iter().map(|(token, _)| token).collect()
    }

    /// ID-to-token reverse mapping.
    pub fn reverse(&self) -> HashMap<u32, String> {
        self.token_to_id
            .iter()
            .map(|(token, &id)| (id, token.clone()))
            .collect()
    }

    /// Iterate over `(token, id)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.token_to_id
            .iter()
            .map(|(token, &id)| (token.as_str(), id))
    }

    /// Persist the vocabulary, one token per line in ID-assignment order.
    ///
    /// A reader recovers the mapping from `(token, line_index)` pairs by
    /// adding the offset back; see [`Vocab::load`].
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        for token in self.tokens_by_id() {
            writeln!(writer, "{token}")?;
        }
        writer.flush()?;
        info!(path = %path.as_ref().display(), tokens = self.len(), "saved vocabulary");
        Ok(())
    }

    /// Reload a vocabulary persisted by [`Vocab::save`].
    ///
    /// Line `i` maps to ID `offset + i`, restoring encoder/decoder symmetry
    /// with the run that wrote the file.
    pub fn load<P: AsRef<Path>>(path: P, offset: u32) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);

        let mut token_to_id = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let token = line?.trim().to_string();
            if token.is_empty() {
                continue;
            }
            token_to_id.insert(token, offset + i as u32);
        }

        Ok(Self { token_to_id, offset })
    }
}

fn normalize(token: &str, lowercase: bool) -> String {
    if lowercase {
        token.to_lowercase()
    } else {
        token.to_string()
    }
}

/// An arbitrarily nested token collection.
///
/// Corpus readers hand back one token list per example; vocabulary
/// construction wants a single flat stream. [`TokenTree::leaves`] walks the
/// nesting with an explicit stack, so pathological depth cannot overflow the
/// call stack.
#[derive(Debug, Clone)]
pub enum TokenTree {
    Leaf(String),
    List(Vec<TokenTree>),
}

impl TokenTree {
    /// Build a two-level tree from per-example token lists.
    pub fn from_sentences<S: AsRef<str>>(sentences: &[Vec<S>]) -> Self {
        TokenTree::List(
            sentences
                .iter()
                .map(|tokens| {
                    TokenTree::List(
                        tokens
                            .iter()
                            .map(|t| TokenTree::Leaf(t.as_ref().to_string()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Lazy left-to-right iterator over leaf tokens.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves { stack: vec![self] }
    }
}

/// Iterator returned by [`TokenTree::leaves`].
pub struct Leaves<'a> {
    stack: Vec<&'a TokenTree>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                TokenTree::Leaf(token) => return Some(token),
                TokenTree::List(items) => {
                    // Push in reverse so the leftmost child pops first.
                    self.stack.extend(items.iter().rev());
                }
            }
        }
        None
    }
}
