//! Paragraph-boundary text chunker.
//!
//! Splits an item body into bounded excerpts that become the unit of
//! indexing and scoring.
//!
//! # Algorithm
//!
//! 1. Normalize `\r\n` to `\n` and trim.
//! 2. Split on blank-line paragraph boundaries.
//! 3. Keep paragraphs within `max_chars` as-is.
//! 4. Split longer paragraphs after sentence terminators (`.`, `!`, `?`
//!    followed by whitespace) and greedily repack the sentences into
//!    pieces of at most `max_chars`. A single sentence longer than the
//!    budget is emitted on its own.
//!
//! Lengths are measured in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use ambient_context_core::chunk::chunk_body;
//!
//! let chunks = chunk_body("Hello world.\n\nSecond paragraph.", 520);
//! assert_eq!(chunks, vec!["Hello world.", "Second paragraph."]);
//! ```

/// Default per-chunk character budget.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 520;

/// Split a body into chunk texts. Returns an empty vector for a blank body.
pub fn chunk_body(body: &str, max_chars: usize) -> Vec<String> {
    let normalized = body.replace("\r\n", "\n");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    for paragraph in split_paragraphs(normalized) {
        if char_len(&paragraph) <= max_chars {
            chunks.push(paragraph);
            continue;
        }

        let mut acc = String::new();
        for sentence in split_sentences(&paragraph) {
            if acc.is_empty() {
                acc.push_str(sentence);
                continue;
            }
            if char_len(&acc) + 1 + char_len(sentence) <= max_chars {
                acc.push(' ');
                acc.push_str(sentence);
            } else {
                chunks.push(std::mem::take(&mut acc));
                acc.push_str(sentence);
            }
        }
        if !acc.is_empty() {
            chunks.push(acc);
        }
    }

    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Group lines into paragraphs separated by whitespace-only lines.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs.retain(|p| !p.is_empty());
    paragraphs
}

/// Split after `.`, `!`, or `?` when followed by whitespace.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(next_i, next_c)) = chars.peek() else {
            break;
        };
        if next_c.is_whitespace() {
            let part = paragraph[start..i + c.len_utf8()].trim();
            if !part.is_empty() {
                parts.push(part);
            }
            start = next_i;
        }
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_yields_nothing() {
        assert!(chunk_body("", 520).is_empty());
        assert!(chunk_body("  \r\n \n", 520).is_empty());
    }

    #[test]
    fn test_paragraphs_become_chunks() {
        let chunks = chunk_body("First.\r\n\r\nSecond.\n   \nThird.", 520);
        assert_eq!(chunks, vec!["First.", "Second.", "Third."]);
    }

    #[test]
    fn test_long_paragraph_repacked_at_sentences() {
        let sentence = "This sentence is exactly forty chars ok.";
        assert_eq!(sentence.len(), 40);
        let paragraph = vec![sentence; 5].join(" ");
        let chunks = chunk_body(&paragraph, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], format!("{} {}", sentence, sentence));
        assert_eq!(chunks[2], sentence);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = "x".repeat(80);
        let text = format!("{}. Short one.", long);
        let chunks = chunk_body(&text, 50);
        assert_eq!(chunks, vec![format!("{}.", long), "Short one.".to_string()]);
    }

    #[test]
    fn test_budget_counts_chars_not_bytes() {
        let text = "é".repeat(30);
        assert_eq!(chunk_body(&text, 30).len(), 1);
    }

    #[test]
    fn test_decimal_point_not_a_sentence_break() {
        let parts = split_sentences("Version 2.5 shipped. Next up!");
        assert_eq!(parts, vec!["Version 2.5 shipped.", "Next up!"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha.\n\nBeta. Gamma. Delta.";
        assert_eq!(chunk_body(text, 8), chunk_body(text, 8));
    }
}
