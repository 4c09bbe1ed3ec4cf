//! Request fingerprints: the key for caching and coalescing.
//!
//! Two requests share a fingerprint when they have the same mode, channel
//! and recipient and their drafts normalize to the same text. The client
//! key is deliberately excluded.

use crate::types::ContextRequest;

/// Trim, lowercase, collapse whitespace runs, and cap at `max_chars`.
pub fn normalize_draft(draft: &str, max_chars: usize) -> String {
    draft
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(max_chars)
        .collect()
}

/// `mode|channel|recipient|normalized-draft`.
pub fn fingerprint(request: &ContextRequest, max_chars: usize) -> String {
    format!(
        "{}|{}|{}|{}",
        request.mode.as_str(),
        request.channel_id.as_deref().unwrap_or("no-channel"),
        request.recipient_id,
        normalize_draft(&request.draft_text, max_chars)
    )
}
