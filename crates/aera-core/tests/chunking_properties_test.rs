//! Structural properties of the sliding-window chunker.
use aera_core::chunking::chunk_text;
use aera_core::defaults::{CHUNK_OVERLAP, CHUNK_SIZE};

/// Text without whitespace so trimming never alters a window.
fn dense_text(items: usize) -> String {
    (0..items)
        .map(|i| format!("item{}value{}.", i, i * 7))
        .collect()
}

fn reconstruct(chunks: &[aera_core::DocumentChunk]) -> String {
    let mut out = String::new();
    let mut prev_end: usize = 0;
    for chunk in chunks {
        let overlap = prev_end.saturating_sub(chunk.start);
        out.extend(chunk.content.chars().skip(overlap));
        prev_end = chunk.end;
    }
    out
}

#[test]
fn test_short_text_is_single_trimmed_chunk() {
    for text in ["a", "  padded text \n", "One sentence. Another sentence."] {
        let chunks = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(chunks.len(), 1, "text {:?}", text);
        assert_eq!(chunks[0].content, text.trim());
    }
}

#[test]
fn test_long_text_reconstructs_without_gaps() {
    let text = dense_text(400);
    assert!(text.chars().count() > CHUNK_SIZE * 3);

    let chunks = chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
    assert!(chunks.len() > 3);
    assert_eq!(chunks[0].start, 0);
    assert_eq!(chunks.last().unwrap().end, text.chars().count());
    for pair in chunks.windows(2) {
        assert!(pair[1].start <= pair[0].end, "gap between chunks");
        assert!(pair[1].start > pair[0].start, "cursor did not advance");
    }
    assert_eq!(reconstruct(&chunks), text);
}

#[test]
fn test_reconstructs_with_various_sizes() {
    let text = dense_text(120);
    for (max, overlap) in [(50, 0), (64, 8), (100, 30), (333, 100)] {
        let chunks = chunk_text(&text, max, overlap);
        assert_eq!(reconstruct(&chunks), text, "max={} overlap={}", max, overlap);
    }
}

#[test]
fn test_no_whitespace_only_chunks() {
    let text = format!(
        "{}\n\n\n{}\n{}",
        "word ".repeat(300),
        " ".repeat(1500),
        "tail. ".repeat(200)
    );
    let chunks = chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP);
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert!(!chunk.content.trim().is_empty());
        assert_eq!(chunk.content, chunk.content.trim());
    }
}

#[test]
fn test_chunks_never_exceed_max_chars() {
    let text = "Lorem ipsum dolor sit amet. ".repeat(200);
    for chunk in chunk_text(&text, 200, 20) {
        assert!(chunk.content.chars().count() <= 200);
    }
}
