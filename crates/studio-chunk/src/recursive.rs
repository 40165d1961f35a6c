//! Recursive text chunker.
//!
//! Splits text by trying progressively smaller separators until every piece
//! fits the size bound, then merges neighbouring pieces back up to the bound
//! while keeping a fixed overlap between consecutive chunks.

use tracing::debug;

use studio_core::{Chunk, ChunkConfig, Chunker, Result, StudioError};

/// Separators tried in order. The empty separator splits into characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n\n", "\n\n", "\n", ". ", " ", ""];

/// Recursive chunker that splits text by multiple separators.
///
/// Tries each separator in order until pieces are small enough:
/// 1. Triple newline (section breaks)
/// 2. Double newline (paragraph breaks)
/// 3. Single newline
/// 4. Sentence boundaries
/// 5. Word boundaries
/// 6. Character (last resort)
///
/// Separators are kept at the start of the piece that follows them, so
/// joining the pieces of a chunk reproduces the original text.
pub struct RecursiveChunker {
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a chunker with the default separators.
    pub fn new() -> Self {
        Self::with_separators(DEFAULT_SEPARATORS)
    }

    /// Create a chunker with custom separators, most significant first.
    pub fn with_separators(separators: &[&str]) -> Self {
        Self {
            separators: separators.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Split already-cleaned text into chunk strings.
    pub fn split_text(&self, text: &str, config: &ChunkConfig) -> Result<Vec<String>> {
        validate(config)?;
        let separators: Vec<&str> = self.separators.iter().map(|s| s.as_str()).collect();
        Ok(self.split_recursive(text, &separators, config))
    }

    fn split_recursive(&self, text: &str, separators: &[&str], config: &ChunkConfig) -> Vec<String> {
        // Pick the first separator present in the text
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&str] = &[];
        for (idx, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[idx + 1..];
                break;
            }
        }

        let splits = split_keep_separator(text, separator);

        let mut chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for split in splits {
            if char_len(split) < config.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                chunks.extend(merge_splits(&good_splits, config));
                good_splits.clear();
            }

            if remaining.is_empty() {
                chunks.push(split.trim().to_string());
            } else {
                chunks.extend(self.split_recursive(split, remaining, config));
            }
        }

        if !good_splits.is_empty() {
            chunks.extend(merge_splits(&good_splits, config));
        }

        chunks
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, content: &str, source_name: &str, config: &ChunkConfig) -> Result<Vec<Chunk>> {
        validate(config)?;

        let cleaned = clean_text(content);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let prefix = context_prefix(source_name);
        let chunks: Vec<Chunk> = self
            .split_text(&cleaned, config)?
            .into_iter()
            .filter(|text| !text.is_empty())
            .enumerate()
            .map(|(index, text)| Chunk {
                index: index as u32,
                text,
                context_prefix: prefix.clone(),
            })
            .collect();

        debug!(
            "Chunked {} chars from {:?} into {} chunks",
            cleaned.chars().count(),
            source_name,
            chunks.len()
        );

        Ok(chunks)
    }
}

/// Header identifying the source document, prepended to every chunk.
pub fn context_prefix(source_name: &str) -> String {
    format!("Document: {}\n\n", studio_core::strip_extension(source_name))
}

/// Trim the text and collapse runs of spaces into one.
pub fn clean_text(content: &str) -> String {
    let mut cleaned = String::with_capacity(content.len());
    let mut previous_space = false;
    for c in content.trim().chars() {
        if c == ' ' {
            if !previous_space {
                cleaned.push(c);
            }
            previous_space = true;
        } else {
            cleaned.push(c);
            previous_space = false;
        }
    }
    cleaned
}

fn validate(config: &ChunkConfig) -> Result<()> {
    if config.chunk_size == 0 {
        return Err(StudioError::invalid_argument("chunk_size must be positive"));
    }
    if config.chunk_overlap >= config.chunk_size {
        return Err(StudioError::invalid_argument(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            config.chunk_overlap, config.chunk_size
        )));
    }
    Ok(())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, keeping it at the start of the following piece.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        // Character-level split as last resort
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

    pieces.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Greedily merge small pieces into chunks of at most `chunk_size` chars,
/// seeding each new chunk with trailing pieces of the previous one up to
/// `chunk_overlap` chars.
fn merge_splits(splits: &[&str], config: &ChunkConfig) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
    let mut total = 0usize;

    for split in splits {
        let len = char_len(split);

        if total + len > config.chunk_size {
            if !current.is_empty() {
                let doc: String = current.iter().copied().collect();
                let doc = doc.trim();
                if !doc.is_empty() {
                    docs.push(doc.to_string());
                }

                while total > config.chunk_overlap
                    || (total + len > config.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
        }

        current.push_back(split);
        total += len;
    }

    let doc: String = current.iter().copied().collect();
    let doc = doc.trim();
    if !doc.is_empty() {
        docs.push(doc.to_string());
    }

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn test_simple_chunk() {
        let chunker = RecursiveChunker::new();
        let text = "Hello world. This is a test.";
        let chunks = chunker.chunk(text, "notes.txt", &config(100, 20)).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].context_prefix, "Document: notes\n\n");
        assert_eq!(chunks[0].content(), format!("Document: notes\n\n{}", text));
    }

    #[test]
    fn test_paragraph_split() {
        let chunker = RecursiveChunker::new();
        let text = "First paragraph text here.\n\nSecond paragraph text here.\n\nThird paragraph text here.";
        let chunks = chunker.chunk(text, "doc.md", &config(50, 0)).unwrap();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "First paragraph text here.",
                "Second paragraph text here.",
                "Third paragraph text here."
            ]
        );
        let indices: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_word_overlap() {
        let chunker = RecursiveChunker::new();
        let chunks = chunker
            .split_text("a1 b2 c3 d4 e5 f6 g7 h8", &config(8, 3))
            .unwrap();

        assert_eq!(
            chunks,
            vec!["a1 b2 c3", "c3 d4", "d4 e5", "e5 f6", "f6 g7", "g7 h8"]
        );
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].starts_with(last_word));
        }
    }

    #[test]
    fn test_character_fallback() {
        let chunker = RecursiveChunker::new();
        let chunks = chunker
            .split_text("abcdefghijklmnopqrstuvwxy", &config(10, 0))
            .unwrap();

        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxy"]);
    }

    #[test]
    fn test_chunks_respect_size_bound() {
        let chunker = RecursiveChunker::new();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(200);
        let cfg = config(300, 60);
        let chunks = chunker.chunk(&text, "fox.txt", &cfg).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= cfg.chunk_size);
        }
    }

    #[test]
    fn test_chunking_is_idempotent() {
        let chunker = RecursiveChunker::new();
        let text = "Alpha section.\n\n\nBeta paragraph one. Beta sentence two.\n\nGamma line\nDelta line with     extra   spaces. ".repeat(40);
        let cfg = config(120, 30);

        let first = chunker.chunk(&text, "greek.txt", &cfg).unwrap();
        let second = chunker.chunk(&text, "greek.txt", &cfg).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_content() {
        let chunker = RecursiveChunker::new();
        let cfg = ChunkConfig::default();

        assert!(chunker.chunk("", "a.txt", &cfg).unwrap().is_empty());
        assert!(chunker.chunk("   \n  ", "a.txt", &cfg).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_overlap() {
        let chunker = RecursiveChunker::new();
        let err = chunker.chunk("text", "a.txt", &config(10, 10)).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  a    b  c \n"), "a b c");
        assert_eq!(clean_text("line\n\nnext"), "line\n\nnext");
    }

    #[test]
    fn test_context_prefix() {
        assert_eq!(context_prefix("Quarterly Report.pdf"), "Document: Quarterly Report\n\n");
        assert_eq!(context_prefix("YouTube Video (abc)"), "Document: YouTube Video (abc)\n\n");
    }
}
