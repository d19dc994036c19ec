//! Text chunking module
//!
//! Splits decoded document text into overlapping windows for embedding.
//!
//! Splitting is delegated to `text-splitter`, which cuts at the coarsest
//! semantic level that fits (line breaks, sentences, words) and measures
//! chunks in characters. Whitespace is kept so the chunks tile the input.
//! Words longer than `chunk_size` are emitted whole unless
//! `split_oversized_tokens` is set.

use lorehunt_common::config::IngestionConfig;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between neighbouring chunks in characters
    pub chunk_overlap: usize,
    /// Cut words longer than `chunk_size` at character boundaries
    pub split_oversized_tokens: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            split_oversized_tokens: false,
        }
    }
}

impl From<&IngestionConfig> for ChunkingConfig {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            split_oversized_tokens: config.split_oversized_tokens,
        }
    }
}

/// A text chunk with its position in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Index of this chunk in the document
    pub index: usize,
    /// The chunk content
    pub content: String,
    /// Start byte offset in the original text
    pub start: usize,
    /// End byte offset (exclusive) in the original text
    pub end: usize,
    /// Byte length of the prefix shared with the previous chunk
    pub overlap: usize,
}

impl TextChunk {
    /// Content not already present in the previous chunk
    pub fn fresh(&self) -> &str {
        &self.content[self.overlap..]
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Split `text` into chunks of at most `size` characters sharing up to
/// `overlap` characters with their predecessor
pub fn chunk(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let config = ChunkingConfig {
        chunk_size: size,
        chunk_overlap: overlap,
        split_oversized_tokens: false,
    };
    chunk_spans(text, &config).into_iter().map(|c| c.content).collect()
}

/// Split `text` into chunks, keeping byte spans and overlap lengths
pub fn chunk_spans(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);
    let splitter = splitter(size, overlap);

    let segments = if config.split_oversized_tokens {
        vec![Segment::Split(0, text.len())]
    } else {
        segments(text, size)
    };

    let mut chunks: Vec<TextChunk> = Vec::new();
    for segment in segments {
        match segment {
            Segment::Whole(start, end) => push_chunk(&mut chunks, text, start, end),
            Segment::Split(start, end) => {
                for (offset, piece) in splitter.chunk_indices(&text[start..end]) {
                    push_chunk(&mut chunks, text, start + offset, start + offset + piece.len());
                }
            }
        }
    }

    debug!(
        input_len = text.len(),
        chunk_count = chunks.len(),
        chunk_size = size,
        chunk_overlap = overlap,
        "Text chunked"
    );

    chunks
}

/// Rebuild the original text from its chunks by dropping every overlap prefix
pub fn reassemble(chunks: &[TextChunk]) -> String {
    chunks.iter().map(TextChunk::fresh).collect()
}

fn splitter(size: usize, overlap: usize) -> TextSplitter<text_splitter::Characters> {
    let config = match ChunkConfig::new(size).with_overlap(overlap) {
        Ok(config) => config,
        // overlap is already clamped below size
        Err(_) => ChunkConfig::new(size),
    };
    TextSplitter::new(config.with_trim(false))
}

/// Byte range handed to the splitter, or kept as a single chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Split(usize, usize),
    Whole(usize, usize),
}

/// Cut the text around words longer than `size` characters
fn segments(text: &str, size: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut from = 0;
    let mut word: Option<(usize, usize)> = None;

    for (pos, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some((start, chars)) = word.take() {
                if chars > size {
                    cut_out(&mut segments, &mut from, start, pos);
                }
            }
        } else {
            let (start, chars) = word.unwrap_or((pos, 0));
            word = Some((start, chars + 1));
        }
    }
    if let Some((start, chars)) = word {
        if chars > size {
            cut_out(&mut segments, &mut from, start, text.len());
        }
    }

    if from < text.len() {
        segments.push(Segment::Split(from, text.len()));
    }
    segments
}

fn cut_out(segments: &mut Vec<Segment>, from: &mut usize, start: usize, end: usize) {
    if *from < start {
        segments.push(Segment::Split(*from, start));
    }
    segments.push(Segment::Whole(start, end));
    *from = end;
}

fn push_chunk(chunks: &mut Vec<TextChunk>, text: &str, start: usize, end: usize) {
    let overlap = match chunks.last() {
        // nothing new past the previous chunk
        Some(prev) if end <= prev.end => return,
        Some(prev) => prev.end.saturating_sub(start),
        None => 0,
    };

    chunks.push(TextChunk {
        index: chunks.len(),
        content: text[start..end].to_string(),
        start,
        end,
        overlap,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGEND: &str = "The caravan left Fez at dawn. Nobody spoke of the map!\n\
        Old Yusuf kept it sewn inside his coat, or so the story went.\n\n\
        In Tangier the harbour master laughed at the question. Why would a map \
        survive three hundred years? Still, he pointed toward the lighthouse.\n\n\
        The lighthouse keeper had a ledger. Page forty held a drawing of a key.";

    fn config(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            split_oversized_tokens: false,
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_spans("", &ChunkingConfig::default()).is_empty());
        assert!(chunk("", 512, 50).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_spans("A short note.", &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "A short note.");
        assert_eq!(chunks[0].overlap, 0);
    }

    #[test]
    fn test_reassembly_is_exact() {
        for (size, overlap) in [(20, 5), (64, 16), (512, 50)] {
            let chunks = chunk_spans(LEGEND, &config(size, overlap));
            assert_eq!(reassemble(&chunks), LEGEND, "size {} overlap {}", size, overlap);
        }
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunks = chunk_spans(LEGEND, &config(64, 16));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 64, "chunk too long: {:?}", chunk.content);
        }
    }

    #[test]
    fn test_spans_match_content() {
        let chunks = chunk_spans(LEGEND, &config(64, 16));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(&LEGEND[chunk.start..chunk.end], chunk.content);
        }
    }

    #[test]
    fn test_overlap_repeats_previous_tail() {
        let text = "Sentence one. Sentence two. Sentence three. Sentence four.";
        let chunks = chunk_spans(text, &config(30, 15));

        assert!(chunks.len() > 1);
        assert!(chunks.iter().any(|c| c.overlap > 0));
        for pair in chunks.windows(2) {
            let shared = &pair[1].content[..pair[1].overlap];
            assert!(shared.chars().count() <= 15);
            assert!(pair[0].content.ends_with(shared));
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_cuts_at_sentence_boundaries() {
        let text = "Sentence one. Sentence two. Sentence three. Sentence four.";
        let chunks = chunk(text, 30, 0);
        for piece in &chunks[..chunks.len() - 1] {
            assert!(piece.trim_end().ends_with('.'), "cut mid-sentence: {:?}", piece);
        }
    }

    #[test]
    fn test_oversized_word_emitted_whole() {
        let long_word = "x".repeat(50);
        let text = format!("a {} b", long_word);
        let chunks = chunk_spans(&text, &config(10, 2));

        assert!(chunks.iter().any(|c| c.content.trim() == long_word));
        for chunk in &chunks {
            assert!(chunk.char_len() <= 10 || chunk.content.trim() == long_word);
        }
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_split_oversized_tokens() {
        let text = format!("a {} b", "x".repeat(50));
        let config = ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 2,
            split_oversized_tokens: true,
        };
        let chunks = chunk_spans(&text, &config);

        assert!(chunks.iter().all(|c| c.char_len() <= 10));
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_size_counts_characters_not_bytes() {
        let text = "ééééé ééééé ééééé";
        let chunks = chunk_spans(text, &config(6, 0));

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.char_len() <= 6));
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_overlap_clamped_below_size() {
        let chunks = chunk_spans(LEGEND, &config(40, 400));
        assert_eq!(reassemble(&chunks), LEGEND);
        assert!(chunks.iter().all(|c| c.overlap < c.content.len() && c.char_len() <= 40));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(chunk(LEGEND, 48, 12), chunk(LEGEND, 48, 12));
    }
}
