//! # Corpus Reading
//!
//! Line-based readers for the tagged corpus format: each line carries a
//! label, a column separator, and a content field of space-separated
//! `word/pos` items (plain words when no part-of-speech tag is present).
//! Malformed lines are skipped, not raised.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::error::Result;

/// One example from a tagged corpus: label plus aligned word and
/// part-of-speech token lists.
#[derive(Debug, Clone)]
pub struct TaggedExample {
    pub label: String,
    pub words: Vec<String>,
    pub pos: Vec<String>,
}

/// Read all trimmed, non-empty lines from `path`.
///
/// When `col_sep` is given, lines that do not contain the separator are
/// dropped silently (tolerated data error).
pub fn read_lines<P: AsRef<Path>>(path: P, col_sep: Option<char>) -> Result<Vec<String>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    let mut skipped = 0usize;
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(sep) = col_sep {
            if !line.contains(sep) {
                skipped += 1;
                continue;
            }
        }
        lines.push(line.to_string());
    }
    if skipped > 0 {
        warn!(path = %path.as_ref().display(), skipped, "skipped malformed corpus lines");
    }
    Ok(lines)
}

/// Split a labeled line at the first separator occurrence.
pub fn split_label(line: &str, col_sep: char) -> Option<(&str, &str)> {
    let idx = line.find(col_sep)?;
    Some((&line[..idx], &line[idx + col_sep.len_utf8()..]))
}

/// Split one content item into `(word, pos)` at the last `/`.
///
/// Items without a tag come back with an empty pos; a word may itself
/// contain `/`, so the split point is the rightmost separator.
pub fn split_word_pos(item: &str) -> (&str, &str) {
    match item.rfind('/') {
        Some(idx) => (&item[..idx], &item[idx + 1..]),
        None => (item, ""),
    }
}

/// Read a labeled corpus into parallel `(contents, labels)` collections,
/// preserving line order.
pub fn read_labeled<P: AsRef<Path>>(path: P, col_sep: char) -> Result<(Vec<String>, Vec<String>)> {
    let lines = read_lines(path, Some(col_sep))?;
    let mut contents = Vec::with_capacity(lines.len());
    let mut labels = Vec::with_capacity(lines.len());
    for line in &lines {
        if let Some((label, content)) = split_label(line, col_sep) {
            labels.push(label.trim().to_string());
            contents.push(content.trim().to_string());
        }
    }
    Ok((contents, labels))
}

/// Read a tagged corpus into per-example word/pos token lists.
pub fn read_tagged<P: AsRef<Path>>(path: P, col_sep: char) -> Result<Vec<TaggedExample>> {
    let lines = read_lines(path, Some(col_sep))?;
    let mut examples = Vec::with_capacity(lines.len());
    for line in &lines {
        let Some((label, content)) = split_label(line, col_sep) else {
            continue;
        };
        let mut words = Vec::new();
        let mut pos = Vec::new();
        for item in content.split_whitespace() {
            let (word, tag) = split_word_pos(item);
            if word.is_empty() {
                continue;
            }
            words.push(word.to_string());
            pos.push(tag.to_string());
        }
        if words.is_empty() {
            continue;
        }
        examples.push(TaggedExample {
            label: label.trim().to_string(),
            words,
            pos,
        });
    }
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_corpus(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn read_lines_skips_lines_without_separator() {
        let file = write_corpus(&["pos\tgood/a movie/n", "garbage line", "neg\tbad/a"]);
        let lines = read_lines(file.path(), Some('\t')).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn split_label_uses_first_separator() {
        let (label, content) = split_label("news\ttitle/n has\ttab", '\t').unwrap();
        assert_eq!(label, "news");
        assert_eq!(content, "title/n has\ttab");
    }

    #[test]
    fn split_word_pos_uses_last_slash() {
        assert_eq!(split_word_pos("http://x/n"), ("http://x", "n"));
        assert_eq!(split_word_pos("plain"), ("plain", ""));
        assert_eq!(split_word_pos("word/v"), ("word", "v"));
    }

    #[test]
    fn read_labeled_preserves_order_and_pairing() {
        let file = write_corpus(&["a\tfirst content", "b\tsecond content"]);
        let (contents, labels) = read_labeled(file.path(), '\t').unwrap();
        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(contents, vec!["first content", "second content"]);
    }

    #[test]
    fn read_tagged_aligns_words_and_pos() {
        let file = write_corpus(&["sports\tteam/n wins/v again/d"]);
        let examples = read_tagged(file.path(), '\t').unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].label, "sports");
        assert_eq!(examples[0].words, vec!["team", "wins", "again"]);
        assert_eq!(examples[0].pos, vec!["n", "v", "d"]);
    }

    #[test]
    fn read_tagged_tolerates_untagged_words() {
        let file = write_corpus(&["x\thello world/n"]);
        let examples = read_tagged(file.path(), '\t').unwrap();
        assert_eq!(examples[0].words, vec!["hello", "world"]);
        assert_eq!(examples[0].pos, vec!["", "n"]);
    }
}
