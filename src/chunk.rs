//! Fixed-size text chunker.
//!
//! Splits extracted text into ordered segments of at most `max_chars`
//! characters. Boundaries are purely positional: no paragraph or word
//! awareness, but a split never falls inside a UTF-8 code point. The
//! concatenation of all chunks is the original text.

/// Default chunk size, in characters.
pub const DEFAULT_MAX_CHARS: usize = 30_000;

/// Split `text` into `ceil(chars / max_chars)` borrowed slices.
///
/// Empty input yields no chunks. A `max_chars` of zero is treated as one.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 10).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("hello world", DEFAULT_MAX_CHARS);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn test_exact_multiple() {
        let chunks = chunk_text("abcdef", 3);
        assert_eq!(chunks, vec!["abc", "def"]);
    }

    #[test]
    fn test_65k_splits_into_three() {
        let text = "x".repeat(65_000);
        let chunks = chunk_text(&text, 30_000);
        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![30_000, 30_000, 5_000]);
    }

    #[test]
    fn test_lossless_and_bounded() {
        let text = "Grüße aus Zürich ~ ünïcödé 🦀 text. ".repeat(37);
        for max in [1, 2, 7, 64, 1000] {
            let chunks = chunk_text(&text, max);
            assert_eq!(chunks.concat(), text);
            let n = text.chars().count();
            assert_eq!(chunks.len(), n.div_ceil(max));
            assert!(chunks.iter().all(|c| c.chars().count() <= max));
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha Beta Gamma Delta".repeat(100);
        assert_eq!(chunk_text(&text, 33), chunk_text(&text, 33));
    }
}
