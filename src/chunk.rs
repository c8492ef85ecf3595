//! Overlapping-window text chunker.
//!
//! Splits document text into spans of at most `chunk_size` bytes where
//! consecutive spans overlap by approximately `overlap_size`. Split points
//! prefer natural boundaries in order: paragraph (`\n\n`), line (`\n`),
//! sentence end, word, then raw character. Spans tile the source — each span
//! starts at or before the previous span's end — so the concatenation of
//! non-overlapping portions reconstructs the input exactly.

use crate::models::DocumentChunk;

/// Byte range of one chunk within the source text. Both ends are char
/// boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Split `text` into chunk spans. `overlap_size` must be smaller than
/// `chunk_size`; both are byte budgets. Empty input yields no spans; input
/// shorter than `chunk_size` yields exactly one span covering it.
pub fn split_spans(text: &str, chunk_size: usize, overlap_size: usize) -> Vec<Span> {
    debug_assert!(chunk_size > 0 && overlap_size < chunk_size);

    let len = text.len();
    if len == 0 {
        return Vec::new();
    }
    if len <= chunk_size {
        return vec![Span { start: 0, end: len }];
    }

    let mut spans = Vec::new();
    let mut start = 0usize;

    loop {
        if start + chunk_size >= len {
            spans.push(Span { start, end: len });
            break;
        }

        let limit = floor_char_boundary(text, start + chunk_size);
        // A break must land past start + overlap, otherwise the next window
        // would re-find the same separator and the chunker would stall.
        let min_end = start + overlap_size;
        let end = if limit <= min_end {
            // chunk_size snapped down below the overlap floor (multibyte
            // squeeze) — take whole characters until past it
            ceil_char_boundary(text, (min_end + 1).min(len))
        } else {
            find_break(text, start, limit, min_end)
        };

        spans.push(Span { start, end });

        if end >= len {
            break;
        }

        let mut next = floor_char_boundary(text, end.saturating_sub(overlap_size));
        if next <= start {
            next = end;
        }
        start = next;
    }

    spans
}

/// Split `text` into owned chunk strings. See [`split_spans`].
pub fn split_text(text: &str, chunk_size: usize, overlap_size: usize) -> Vec<String> {
    split_spans(text, chunk_size, overlap_size)
        .into_iter()
        .map(|s| text[s.start..s.end].to_string())
        .collect()
}

/// Chunk one document's extracted text, tagging each chunk with its source
/// filename, position, and the total count.
pub fn chunk_document(
    text: &str,
    filename: &str,
    chunk_size: usize,
    overlap_size: usize,
) -> Vec<DocumentChunk> {
    let pieces = split_text(text, chunk_size, overlap_size);
    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| DocumentChunk {
            text: piece,
            filename: filename.to_string(),
            chunk_index: i,
            total_chunks: total,
        })
        .collect()
}

/// Pick the break point inside `text[start..limit]`, preferring the latest
/// paragraph break, then line break, then sentence end, then word boundary.
/// Falls back to `limit` (raw character split). The returned end is always
/// greater than `min_end`.
fn find_break(text: &str, start: usize, limit: usize, min_end: usize) -> usize {
    let window = &text[start..limit];

    if let Some(pos) = window.rfind("\n\n") {
        let end = start + pos + 2;
        if end > min_end {
            return end;
        }
    }
    if let Some(pos) = window.rfind('\n') {
        let end = start + pos + 1;
        if end > min_end {
            return end;
        }
    }
    if let Some(pos) = rfind_sentence_end(window) {
        let end = start + pos;
        if end > min_end {
            return end;
        }
    }
    if let Some(pos) = window.rfind(' ') {
        let end = start + pos + 1;
        if end > min_end {
            return end;
        }
    }
    limit
}

/// Position just past the last `". "`, `"! "`, or `"? "` in the window.
fn rfind_sentence_end(window: &str) -> Option<usize> {
    [". ", "! ", "? "]
        .iter()
        .filter_map(|sep| window.rfind(sep))
        .max()
        .map(|pos| pos + 2)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tiling(text: &str, spans: &[Span]) {
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().unwrap().end, text.len());
        for pair in spans.windows(2) {
            // no gaps, strict forward progress
            assert!(pair[1].start <= pair[0].end);
            assert!(pair[1].start > pair[0].start);
            assert!(pair[1].end > pair[0].end);
        }
        // concatenating non-overlapping portions reconstructs the source
        let mut rebuilt = String::new();
        let mut covered = 0usize;
        for span in spans {
            rebuilt.push_str(&text[covered.max(span.start)..span.end]);
            covered = span.end;
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_text("", 500, 100).is_empty());
        assert!(chunk_document("", "a.txt", 500, 100).is_empty());
    }

    #[test]
    fn short_document_yields_single_chunk() {
        let text = "This file is only fifty characters long, roughly.";
        let chunks = split_text(text, 500, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn long_text_reconstructs_exactly() {
        let text = (0..80)
            .map(|i| format!("Sentence number {} talks about one topic. ", i))
            .collect::<String>();
        let spans = split_spans(&text, 200, 40);
        assert!(spans.len() > 1);
        assert_tiling(&text, &spans);
    }

    #[test]
    fn consecutive_chunks_overlap_within_budget() {
        let text = "word ".repeat(400);
        let spans = split_spans(&text, 250, 50);
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            let overlap = pair[0].end - pair[1].start;
            assert!(overlap <= 50, "overlap {} exceeds budget", overlap);
        }
        assert_tiling(&text, &spans);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let para = "alpha beta gamma delta epsilon zeta eta theta.";
        let text = format!("{}\n\n{}\n\n{}", para, para, para);
        let spans = split_spans(&text, para.len() + 10, 4);
        // each split lands right after a paragraph separator
        for span in &spans[..spans.len() - 1] {
            assert!(text[..span.end].ends_with("\n\n"));
        }
        assert_tiling(&text, &spans);
    }

    #[test]
    fn chunk_size_respected() {
        let text = "x".repeat(5000);
        let spans = split_spans(&text, 700, 80);
        for span in &spans {
            assert!(span.end - span.start <= 700);
        }
        assert_tiling(&text, &spans);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllø wörld çœur ".repeat(100);
        let spans = split_spans(&text, 120, 30);
        for span in &spans {
            assert!(text.is_char_boundary(span.start));
            assert!(text.is_char_boundary(span.end));
        }
        assert_tiling(&text, &spans);
    }

    #[test]
    fn no_word_boundaries_falls_back_to_characters() {
        let text = "a".repeat(1000);
        let spans = split_spans(&text, 300, 60);
        assert!(spans.len() > 1);
        assert_tiling(&text, &spans);
    }

    #[test]
    fn document_chunks_are_indexed_and_counted() {
        let text = "Topic one. ".repeat(100);
        let chunks = chunk_document(&text, "notes.txt", 200, 40);
        let total = chunks.len();
        assert!(total > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, total);
            assert_eq!(chunk.filename, "notes.txt");
        }
    }
}
