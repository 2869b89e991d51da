//! # Sequence Encoding
//!
//! Maps bounded-length token sequences to fixed-length integer-ID arrays
//! using a [`Vocab`]. Truncates from the front, pads at the end.

use crate::vocab::Vocab;

/// Encoder from token sequences to fixed-length ID arrays.
#[derive(Debug, Clone, Copy)]
pub struct SequenceEncoder<'a> {
    vocab: &'a Vocab,
    max_len: usize,
    unknown_id: u32,
    lowercase: bool,
}

impl<'a> SequenceEncoder<'a> {
    /// Create an encoder over `vocab`.
    ///
    /// Tokens missing from the vocabulary resolve to `unknown_id`; positions
    /// past the input length stay `0` (padding).
    pub fn new(vocab: &'a Vocab, max_len: usize, unknown_id: u32, lowercase: bool) -> Self {
        Self {
            vocab,
            max_len,
            unknown_id,
            lowercase,
        }
    }

    /// Encode one example into exactly `max_len` IDs.
    ///
    /// The first `min(max_len, tokens.len())` positions hold vocabulary IDs
    /// (or `unknown_id` for misses); trailing input beyond `max_len` is
    /// silently truncated. Pure: the same input always yields the same array.
    ///
    /// # Examples
    /// ```
    /// use bunrui_core::encode::SequenceEncoder;
    /// use bunrui_core::vocab::{Vocab, VocabOptions};
    ///
    /// let vocab = Vocab::build(["x"], VocabOptions { offset: 5, ..Default::default() });
    /// let encoder = SequenceEncoder::new(&vocab, 4, 0, false);
    /// assert_eq!(encoder.encode(&["x", "y"]), vec![5, 0, 0, 0]);
    /// ```
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        let mut ids = vec![0u32; self.max_len];
        let n = self.max_len.min(tokens.len());
        for (slot, token) in ids.iter_mut().zip(tokens.iter().take(n)) {
            let token = token.as_ref();
            let id = if self.lowercase {
                self.vocab.get(&token.to_lowercase())
            } else {
                self.vocab.get(token)
            };
            *slot = id.unwrap_or(self.unknown_id);
        }
        ids
    }

    /// The fixed output length.
    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::VocabOptions;

    fn vocab_from(tokens: &[&str], offset: u32) -> Vocab {
        Vocab::build(
            tokens.to_vec(),
            VocabOptions {
                offset,
                ..Default::default()
            },
        )
    }

    #[test]
    fn short_input_is_padded() {
        let vocab = vocab_from(&["x"], 5);
        let encoder = SequenceEncoder::new(&vocab, 4, 0, false);
        assert_eq!(encoder.encode(&["x", "y"]), vec![5, 0, 0, 0]);
    }

    #[test]
    fn long_input_is_truncated() {
        let vocab = vocab_from(&["a", "b", "c", "d"], 0);
        let encoder = SequenceEncoder::new(&vocab, 2, 0, false);
        let encoded = encoder.encode(&["a", "b", "c", "d"]);
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded[0], vocab.get("a").unwrap());
        assert_eq!(encoded[1], vocab.get("b").unwrap());
    }

    #[test]
    fn output_length_is_always_max_len() {
        let vocab = vocab_from(&["t"], 1);
        let encoder = SequenceEncoder::new(&vocab, 8, 0, false);
        for input in [vec![], vec!["t"; 8], vec!["t"; 100]] {
            assert_eq!(encoder.encode(&input).len(), 8);
        }
    }

    #[test]
    fn unknown_tokens_resolve_to_default() {
        let vocab = vocab_from(&["known"], 2);
        let encoder = SequenceEncoder::new(&vocab, 3, 1, false);
        assert_eq!(encoder.encode(&["missing", "known", "missing"]), vec![1, 2, 1]);
    }

    #[test]
    fn encoding_is_idempotent() {
        let vocab = vocab_from(&["a", "b", "a"], 2);
        let encoder = SequenceEncoder::new(&vocab, 6, 1, false);
        let tokens = ["a", "nope", "b"];
        assert_eq!(encoder.encode(&tokens), encoder.encode(&tokens));
    }

    #[test]
    fn lowercase_lookup() {
        let vocab = Vocab::build(
            ["word", "word"],
            VocabOptions {
                offset: 2,
                lowercase: true,
                ..Default::default()
            },
        );
        let encoder = SequenceEncoder::new(&vocab, 2, 0, true);
        assert_eq!(encoder.encode(&["WORD"]), vec![2, 0]);
    }
}
