//! Chunking Pipeline (C7): length/overlap fallback chunker, content-type
//! sizing table, and the top-level dispatch that tries the CST chunker
//! first and falls back when unavailable.
//!
//! The fallback chunker replaces the teacher's paragraph-boundary
//! `chunk_text` (`\n\n`-split, `CHARS_PER_TOKEN` token estimate) with the
//! fixed-size/overlap chunker spec §4.7 names; the teacher's "split on a
//! semantic boundary, cover the whole input, deterministic" shape is kept.

use std::path::Path;

use crate::chunk_cst::{self, CstChunk};

/// One chunk produced by either the fallback or CST chunker, prior to
/// being wrapped into a [`crate::models::Chunk`] by the indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// CST node type name, when this chunk came from the CST chunker.
    pub boundary_type: Option<String>,
    /// Extracted identifier name (function/class name, etc.), when known.
    pub name: Option<String>,
}

impl From<CstChunk> for RawChunk {
    fn from(c: CstChunk) -> Self {
        Self {
            text: c.text,
            start_offset: c.start_offset,
            end_offset: c.end_offset,
            boundary_type: Some(c.node_type),
            name: c.name,
        }
    }
}

/// Size/overlap defaults by content class (spec §4.7).
struct SizingClass {
    size: usize,
    overlap: usize,
    extensions: &'static [&'static str],
}

const CODE_EXTENSIONS: &[&str] = &[
    "js", "ts", "jsx", "tsx", "mjs", "cjs", "py", "go", "rs", "java", "rb", "c", "cpp", "h", "css",
    "json", "yaml", "yml",
];
const DOC_EXTENSIONS: &[&str] = &["md", "mdx", "html"];
const ARTICLE_EXTENSIONS: &[&str] = &["txt"];

const SIZING_TABLE: &[SizingClass] = &[
    SizingClass { size: 650, overlap: 125, extensions: CODE_EXTENSIONS },
    SizingClass { size: 1250, overlap: 250, extensions: DOC_EXTENSIONS },
    SizingClass { size: 1750, overlap: 350, extensions: ARTICLE_EXTENSIONS },
];
const DEFAULT_SIZE: usize = 1000;
const DEFAULT_OVERLAP: usize = 200;

/// Returns the default `(size, overlap)` for `extension` (without the
/// leading dot, compared case-insensitively), falling back to the
/// catch-all default class.
pub fn default_sizing(extension: &str) -> (usize, usize) {
    let lower = extension.to_ascii_lowercase();
    for class in SIZING_TABLE {
        if class.extensions.contains(&lower.as_str()) {
            return (class.size, class.overlap);
        }
    }
    (DEFAULT_SIZE, DEFAULT_OVERLAP)
}

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string()
}

/// Caller-supplied chunking parameters; explicit values always win over
/// automatic sizing (spec §4.7 "Explicit caller-supplied ... always take
/// precedence").
#[derive(Debug, Clone, Default)]
pub struct ChunkOptions {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub preserve_boundaries: bool,
}

/// Splits `text`, originating from `path` (used only for
/// extension-driven sizing/language dispatch), into [`RawChunk`]s.
///
/// When `options.preserve_boundaries` is set, tries the CST chunker
/// first; on an unavailable parser or a parse failure, falls back to the
/// length/overlap chunker for this file (spec §4.7 "Degraded mode").
pub fn chunk_document(path: &str, text: &str, options: &ChunkOptions) -> Vec<RawChunk> {
    let extension = extension_of(path);
    let (default_size, default_overlap) = default_sizing(&extension);
    let size = options.chunk_size.unwrap_or(default_size);
    let overlap = options.chunk_overlap.unwrap_or(default_overlap);

    if options.preserve_boundaries {
        if let Some(chunks) = chunk_cst::try_chunk(&extension, text) {
            if !chunks.is_empty() {
                return chunks.into_iter().map(RawChunk::from).collect();
            }
        }
    }

    chunk_fixed(text, size, overlap)
}

/// The length/overlap fallback chunker (spec §4.7): deterministic and
/// total for any `0 ≤ overlap < size`. Each non-final chunk has length
/// `size`; consecutive chunks share `overlap` characters; the final
/// chunk may be shorter.
pub fn chunk_fixed(text: &str, size: usize, overlap: usize) -> Vec<RawChunk> {
    assert!(overlap < size, "overlap must be strictly less than size");

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let stride = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + size).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        chunks.push(RawChunk {
            text,
            start_offset: start,
            end_offset: end,
            boundary_type: None,
            name: None,
        });
        if end >= chars.len() {
            break;
        }
        start += stride;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_fixed("", 10, 2).is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_fixed("hello", 10, 2);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
    }

    #[test]
    fn covers_input_when_overlap_removed() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_fixed(text, 10, 3);
        assert!(chunks.len() > 1);

        let mut reconstructed = chunks[0].text.clone();
        for window in chunks.windows(2) {
            let (prev, next) = (&window[0], &window[1]);
            let overlap_len = prev.end_offset.saturating_sub(next.start_offset);
            reconstructed.push_str(&next.text[overlap_len..]);
        }
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn non_final_chunks_have_exact_size() {
        let text = "a".repeat(25);
        let chunks = chunk_fixed(&text, 10, 2);
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.text.chars().count(), 10);
        }
    }

    #[test]
    fn default_sizing_dispatches_by_extension() {
        assert_eq!(default_sizing("rs"), (650, 125));
        assert_eq!(default_sizing("MD"), (1250, 250));
        assert_eq!(default_sizing("txt"), (1750, 350));
        assert_eq!(default_sizing("unknown_ext"), (1000, 200));
    }

    #[test]
    fn explicit_options_take_precedence_over_sizing_table() {
        let options = ChunkOptions {
            chunk_size: Some(5),
            chunk_overlap: Some(1),
            preserve_boundaries: false,
        };
        let chunks = chunk_document("file.rs", "abcdefghij", &options);
        assert_eq!(chunks[0].text.chars().count(), 5);
    }

    proptest::proptest! {
        /// For any `0 <= overlap < size` and any text, `chunk_fixed` is
        /// deterministic and its chunks reassemble the original input
        /// after stripping each chunk's shared overlap prefix.
        #[test]
        fn chunk_fixed_is_deterministic_and_covers_input(
            text in "[a-zA-Z0-9 .,\n]{0,200}",
            size in 1usize..30,
            overlap_fraction in 0usize..100,
        ) {
            let overlap = overlap_fraction * (size - 1) / 100;
            let first = chunk_fixed(&text, size, overlap);
            let second = chunk_fixed(&text, size, overlap);
            proptest::prop_assert_eq!(&first, &second);

            if !text.is_empty() {
                let mut reconstructed = first[0].text.clone();
                for window in first.windows(2) {
                    let (prev, next) = (&window[0], &window[1]);
                    let overlap_len = prev.end_offset.saturating_sub(next.start_offset);
                    reconstructed.push_str(&next.text[overlap_len..]);
                }
                proptest::prop_assert_eq!(reconstructed, text);
            }
        }
    }
}
