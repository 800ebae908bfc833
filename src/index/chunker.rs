//! Character-window chunker
//!
//! Slides a fixed-size window with overlap across the raw character stream
//! (not line-based), producing non-empty overlapping windows until the end
//! of text is covered. Line numbers per window are computed from character
//! offsets. This stage is pure and synchronous.

use super::metadata;
use super::models::Chunk;
use crate::config::ChunkingConfig;

/// Split raw file text into overlapping windows with extracted metadata.
///
/// The returned chunks carry no embedding and no embedding-model identity
/// yet; ingestion fills both in. The final window's end always equals the
/// text length.
pub fn chunk(filename: &str, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![];
    }

    let window_size = config.window_size.max(1);
    // A stride of zero would never advance
    let overlap = config.overlap.min(window_size - 1);
    let stride = window_size - overlap;

    let file_type = metadata::file_type_of(filename);

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut window_index = 0;

    loop {
        let end = (start + window_size).min(chars.len());
        let content: String = chars[start..end].iter().collect();

        let line_start = line_of(&chars, start);
        let line_end = line_of(&chars, end.saturating_sub(1));

        let extracted = metadata::extract(&file_type, &content);

        chunks.push(Chunk {
            id: String::new(),
            filename: filename.to_string(),
            file_type: file_type.clone(),
            content,
            window_index,
            window_start: start,
            window_end: end,
            line_start,
            line_end,
            embedding_model: String::new(),
            embedding: vec![],
            identifiers: extracted.identifiers,
            keywords: extracted.keywords,
        });

        if end == chars.len() {
            break;
        }
        start += stride;
        window_index += 1;
    }

    chunks
}

/// 1-based line number of a character offset
fn line_of(chars: &[char], offset: usize) -> usize {
    chars[..offset.min(chars.len())]
        .iter()
        .filter(|c| **c == '\n')
        .count()
        + 1
}
