//! # Bunrui Core
//!
//! Data preparation for the bunrui text-classification pipeline: vocabulary
//! construction, fixed-length sequence encoding, and tagged-corpus reading.
//!
//! ## Quick Start
//!
//! ```rust
//! use bunrui_core::vocab::{Vocab, VocabOptions};
//! use bunrui_core::encode::SequenceEncoder;
//!
//! let opts = VocabOptions { offset: 2, min_count: 2, ..Default::default() };
//! let vocab = Vocab::build(["a", "a", "b", "c", "c", "c"], opts);
//! assert_eq!(vocab.get("c"), Some(2));
//!
//! let encoder = SequenceEncoder::new(&vocab, 4, 1, false);
//! assert_eq!(encoder.encode(&["c", "b"]), vec![2, 1, 0, 0]);
//! ```
pub mod corpus;
pub mod encode;
pub mod error;
pub mod vocab;

// Re-export primary API
pub use corpus::{read_labeled, read_lines, read_tagged, TaggedExample};
pub use encode::SequenceEncoder;
pub use error::{BunruiError, Result};
pub use vocab::{TokenTree, Vocab, VocabOptions};
