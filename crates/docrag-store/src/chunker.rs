//! Text chunking
//!
//! Documents are split into overlapping chunks before embedding. Sizes are
//! measured in characters, not bytes, so Cyrillic text chunks the same way as
//! ASCII text of equal length.

use tracing::warn;

use docrag_core::{Error, IndexingConfig, Result};

/// Separators tried in order, from paragraph breaks down to single characters
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn from_config(config: &IndexingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into trimmed, non-empty chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    /// Fixed character windows advancing by `chunk_size - chunk_overlap`
    pub fn split_window(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }
            if !good_splits.is_empty() {
                chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits));
        }

        chunks
    }

    /// Greedily pack pieces into chunks, keeping a tail of at most
    /// `chunk_overlap` characters as the start of the next chunk
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);

            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        size = total,
                        limit = self.chunk_size,
                        "Created a chunk larger than the configured size"
                    );
                }
                if !current.is_empty() {
                    push_joined(&mut docs, &current);
                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        let (_, first_len) = current.remove(0);
                        total -= first_len;
                    }
                }
            }

            current.push((piece, len));
            total += len;
        }

        push_joined(&mut docs, &current);
        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        let config = IndexingConfig::default();
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_joined(docs: &mut Vec<String>, pieces: &[(&str, usize)]) {
    let joined: String = pieces.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
