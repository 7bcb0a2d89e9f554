//! Text chunking with position tracking
//!
//! Sizes are measured in whitespace-separated tokens. Every chunk records the
//! byte range of the source text it was cut from.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{ChunkStrategy, ChunkingConfig};

/// A chunk of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of the chunk within its document
    pub index: u32,
    /// Chunk text, trimmed
    pub content: String,
    /// Byte offset of the chunk start in the source text
    pub char_start: usize,
    /// Byte offset one past the chunk end
    pub char_end: usize,
    /// Token count of the chunk
    pub tokens: usize,
}

/// A byte range of the source text and its token count
#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: usize,
    end: usize,
    tokens: usize,
}

/// Text chunker with configurable strategy, size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    strategy: ChunkStrategy,
    /// Target chunk size in tokens
    max_tokens: usize,
    /// Tokens repeated at the start of the next chunk
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(strategy: ChunkStrategy, max_tokens: usize, overlap: usize) -> Self {
        let max_tokens = max_tokens.max(1);
        Self {
            strategy,
            max_tokens,
            overlap: overlap.min(max_tokens - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.strategy, config.max_tokens, config.overlap)
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    /// Chunk a document's text
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let spans = match self.strategy {
            ChunkStrategy::Token => self.token_windows(text),
            ChunkStrategy::Sentence => self.pack(self.limit(text, sentence_spans(text, 0, text.len()))),
            ChunkStrategy::Semantic => self.pack(self.limit(text, self.semantic_units(text))),
        };

        spans
            .into_iter()
            .filter_map(|span| {
                let content = text[span.start..span.end].trim();
                (!content.is_empty()).then(|| (span, content.to_string()))
            })
            .enumerate()
            .map(|(index, (span, content))| TextChunk {
                index: index as u32,
                content,
                char_start: span.start,
                char_end: span.end,
                tokens: span.tokens,
            })
            .collect()
    }

    /// Fixed windows of `max_tokens` tokens advancing by `max_tokens - overlap`
    fn token_windows(&self, text: &str) -> Vec<Span> {
        let tokens = token_spans(text, 0, text.len());
        let step = self.max_tokens - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;
        while start < tokens.len() {
            let end = (start + self.max_tokens).min(tokens.len());
            windows.push(Span {
                start: tokens[start].0,
                end: tokens[end - 1].1,
                tokens: end - start,
            });
            if end == tokens.len() {
                break;
            }
            start += step;
        }
        windows
    }

    /// Paragraphs, with oversized paragraphs broken into sentences
    fn semantic_units(&self, text: &str) -> Vec<Span> {
        let mut units = Vec::new();
        for (start, end) in paragraph_ranges(text) {
            let tokens = count_tokens(&text[start..end]);
            if tokens == 0 {
                continue;
            }
            if tokens > self.max_tokens {
                units.extend(sentence_spans(text, start, end));
            } else {
                units.push(Span { start, end, tokens });
            }
        }
        units
    }

    /// Break any unit above `max_tokens` into token windows without overlap
    fn limit(&self, text: &str, units: Vec<Span>) -> Vec<Span> {
        let mut out = Vec::with_capacity(units.len());
        for unit in units {
            if unit.tokens <= self.max_tokens {
                out.push(unit);
                continue;
            }
            let tokens = token_spans(text, unit.start, unit.end);
            for window in tokens.chunks(self.max_tokens) {
                if let (Some(first), Some(last)) = (window.first(), window.last()) {
                    out.push(Span {
                        start: first.0,
                        end: last.1,
                        tokens: window.len(),
                    });
                }
            }
        }
        out
    }

    /// Pack consecutive units up to `max_tokens`, carrying trailing units
    /// worth at most `overlap` tokens into the next chunk
    fn pack(&self, units: Vec<Span>) -> Vec<Span> {
        let mut chunks = Vec::new();
        let mut current: Vec<Span> = Vec::new();
        let mut current_tokens = 0usize;
        let mut fresh = 0usize;

        for unit in units {
            if unit.tokens == 0 {
                continue;
            }
            if fresh > 0 && current_tokens + unit.tokens > self.max_tokens {
                chunks.push(merge(&current));

                let mut carried = Vec::new();
                let mut carried_tokens = 0;
                for span in current.iter().rev() {
                    if carried_tokens + span.tokens > self.overlap
                        || carried_tokens + span.tokens + unit.tokens > self.max_tokens
                    {
                        break;
                    }
                    carried_tokens += span.tokens;
                    carried.push(*span);
                }
                carried.reverse();
                current = carried;
                current_tokens = carried_tokens;
                fresh = 0;
            }

            current.push(unit);
            current_tokens += unit.tokens;
            fresh += 1;
        }

        if fresh > 0 {
            chunks.push(merge(&current));
        }
        chunks
    }
}

fn merge(spans: &[Span]) -> Span {
    let start = spans.first().map(|s| s.start).unwrap_or(0);
    let end = spans.last().map(|s| s.end).unwrap_or(start);
    Span {
        start,
        end,
        tokens: spans.iter().map(|s| s.tokens).sum(),
    }
}

fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Byte ranges of whitespace-separated tokens in `text[start..end]`
fn token_spans(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut token_start = None;
    for (offset, c) in text[start..end].char_indices() {
        let pos = start + offset;
        match (c.is_whitespace(), token_start) {
            (true, Some(s)) => {
                spans.push((s, pos));
                token_start = None;
            }
            (false, None) => token_start = Some(pos),
            _ => {}
        }
    }
    if let Some(s) = token_start {
        spans.push((s, end));
    }
    spans
}

/// Unicode sentence bounds in `text[start..end]`
fn sentence_spans(text: &str, start: usize, end: usize) -> Vec<Span> {
    text[start..end]
        .split_sentence_bound_indices()
        .map(|(offset, sentence)| Span {
            start: start + offset,
            end: start + offset + sentence.len(),
            tokens: count_tokens(sentence),
        })
        .filter(|span| span.tokens > 0)
        .collect()
}

/// Blocks separated by one or more blank lines
fn paragraph_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let blank = line.trim().is_empty();
        match (blank, start) {
            (true, Some(s)) => {
                ranges.push((s, offset));
                start = None;
            }
            (false, None) => start = Some(offset),
            _ => {}
        }
        offset += line.len();
    }
    if let Some(s) = start {
        ranges.push((s, text.len()));
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_token_windows_with_overlap() {
        let chunker = TextChunker::new(ChunkStrategy::Token, 10, 3);
        let chunks = chunker.chunk(&words(24));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].tokens, 10);
        assert!(chunks[0].content.starts_with("w0 "));
        assert!(chunks[1].content.starts_with("w7 "));
        assert!(chunks[2].content.starts_with("w14 "));
        assert!(chunks[2].content.ends_with("w23"));
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_sentence_packing_respects_limit() {
        let text = "One two three. Four five six. Seven eight nine. Ten eleven twelve.";
        let chunker = TextChunker::new(ChunkStrategy::Sentence, 6, 0);
        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "One two three. Four five six.");
        assert_eq!(chunks[1].content, "Seven eight nine. Ten eleven twelve.");
        assert!(chunks.iter().all(|c| c.tokens <= 6));
    }

    #[test]
    fn test_sentence_overlap_carries_trailing_sentence() {
        let text = "One two three. Four five six. Seven eight nine.";
        let chunker = TextChunker::new(ChunkStrategy::Sentence, 6, 3);
        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].content, "Four five six. Seven eight nine.");
    }

    #[test]
    fn test_semantic_keeps_paragraphs_together() {
        let text = "Alpha beta gamma.\nDelta epsilon.\n\nZeta eta theta.\n\n\nIota kappa.";
        let chunker = TextChunker::new(ChunkStrategy::Semantic, 5, 0);
        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Alpha beta gamma.\nDelta epsilon.");
        assert_eq!(chunks[1].content, "Zeta eta theta.\n\n\nIota kappa.");
    }

    #[test]
    fn test_semantic_splits_long_paragraphs() {
        let text = format!("{}. {}.", words(8), words(8));
        let chunker = TextChunker::new(ChunkStrategy::Semantic, 10, 0);
        let chunks = chunker.chunk(&text);

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.tokens <= 10));
    }

    #[test]
    fn test_oversized_sentence_is_windowed() {
        let chunker = TextChunker::new(ChunkStrategy::Sentence, 4, 0);
        let chunks = chunker.chunk(&words(10));
        assert_eq!(chunks.iter().map(|c| c.tokens).collect::<Vec<_>>(), vec![4, 4, 2]);
    }

    #[test]
    fn test_offsets_point_into_source() {
        let text = "  First part here.\n\nSecond part follows.  ";
        let chunker = TextChunker::new(ChunkStrategy::Semantic, 3, 0);
        for chunk in chunker.chunk(text) {
            assert_eq!(text[chunk.char_start..chunk.char_end].trim(), chunk.content);
        }
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        for strategy in [ChunkStrategy::Semantic, ChunkStrategy::Sentence, ChunkStrategy::Token] {
            let chunker = TextChunker::new(strategy, 50, 10);
            assert!(chunker.chunk("").is_empty());
            assert!(chunker.chunk(" \n\n\t ").is_empty());
        }
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Übung macht den Meister. Ça va très bien. 東京は大きい。";
        let chunker = TextChunker::new(ChunkStrategy::Sentence, 5, 2);
        let chunks = chunker.chunk(text);
        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert!(text.is_char_boundary(chunk.char_start));
            assert!(text.is_char_boundary(chunk.char_end));
        }
    }

    #[test]
    fn test_zero_size_is_clamped_to_one_token() {
        let chunker = TextChunker::new(ChunkStrategy::Token, 0, 5);
        let chunks = chunker.chunk("alpha beta gamma");
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.tokens == 1));
    }
}
