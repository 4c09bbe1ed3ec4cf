//! Tokenizer shared by indexing and querying.
//!
//! Lowercases, replaces every character outside `[a-z0-9+#-]` with a space,
//! splits on whitespace, and drops single-character tokens and stop words.
//! Keeping `+`, `#`, and `-` preserves terms like `c++`, `c#`, and
//! `dual-write`.

use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "shall", "can",
    "need", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "during",
    "before", "after", "between", "out", "off", "over", "under", "again", "then", "once", "here",
    "there", "when", "where", "why", "how", "all", "each", "every", "both", "few", "more", "most",
    "other", "some", "such", "no", "not", "only", "own", "same", "so", "than", "too", "very",
    "just", "about", "up", "and", "but", "or", "if", "while", "because", "until", "that",
    "which", "who", "whom", "this", "these", "those", "what", "i", "me", "my", "we", "our", "you",
    "your", "he", "him", "his", "she", "her", "it", "its", "they", "them", "their", "hey", "hi",
    "hello", "thanks", "thank", "please", "also", "like", "know", "think", "want", "get", "got",
    "going", "still", "any",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '#' | '-')
}

/// Split text into normalized index tokens, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if is_token_char(c) { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.len() > 1 && !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// Term frequencies for a token list.
pub fn count_tokens(tokens: &[String]) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }
    counts
}
