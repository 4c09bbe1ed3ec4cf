//! Pattern-matching heuristics over draft text and retrieved bodies.
//!
//! | Heuristic | Input | Output |
//! |-----------|-------|--------|
//! | [`cited_github_urls`] | draft text | canonical GitHub issue URLs |
//! | [`derive_open_questions`] | retrieved item bodies | follow-up questions |
//!
//! Both are policy, not contract: the patterns are tuned for chat drafts and
//! project notes and may be adjusted freely.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const MAX_CITED_URLS: usize = 6;
const MAX_QUOTED_CHARS: usize = 90;

static PATTERNS: OnceLock<PatternSet> = OnceLock::new();

struct PatternSet {
    url: Regex,
    trailing_punct: Regex,
    issue_shorthand: Regex,
    checklist: Regex,
    owner_suffix: Regex,
    rollback: Regex,
    release_window: Regex,
}

impl PatternSet {
    fn new() -> Self {
        Self {
            url: Regex::new(r"https?://[^\s)\]}>,]+").expect("url regex must compile"),
            trailing_punct: Regex::new(r"[.,;:!?]+$").expect("punct regex must compile"),
            // owner/repo#123
            issue_shorthand: Regex::new(r"(?i)\b([a-z0-9_.-]+/[a-z0-9_.-]+)#(\d{2,7})\b")
                .expect("shorthand regex must compile"),
            // - [ ] task text (Owner)
            checklist: Regex::new(r"(?m)^\s*[-*]\s*\[\s?\]\s*(.+?)\s*$")
                .expect("checklist regex must compile"),
            owner_suffix: Regex::new(r"^(.*?)\s*\(([^()]+)\)$").expect("owner regex must compile"),
            rollback: Regex::new(r"(?im)\brollback plan\s*[:\-]\s*(.+?)\s*$")
                .expect("rollback regex must compile"),
            release_window: Regex::new(
                r"(?i)\b(publish|deploy|release|launch|rollout|cutover)(?:ing|ment|es|ed|s)?\s+window\b",
            )
            .expect("window regex must compile"),
        }
    }
}

fn patterns() -> &'static PatternSet {
    PATTERNS.get_or_init(PatternSet::new)
}

/// GitHub issue URLs referenced in `text`, in order of first appearance.
///
/// Full `github.com` URLs are taken as written (minus trailing
/// punctuation); `owner/repo#123` shorthand is expanded to
/// `https://github.com/owner/repo/issues/123`.
pub fn cited_github_urls(text: &str) -> Vec<String> {
    let p = patterns();
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for m in p.url.find_iter(text).take(MAX_CITED_URLS) {
        let cleaned = p.trailing_punct.replace(m.as_str(), "").into_owned();
        if cleaned.contains("github.com/") && seen.insert(cleaned.clone()) {
            urls.push(cleaned);
        }
    }

    for caps in p.issue_shorthand.captures_iter(text) {
        let url = format!("https://github.com/{}/issues/{}", &caps[1], &caps[2]);
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    }

    urls
}

/// Up to `limit` follow-up questions derived from item bodies.
///
/// # Rules
///
/// - An unchecked checklist line `- [ ] task (Owner)` asks the owner for an
///   ETA and sign-off; without an owner it asks who owns the task.
/// - A `Rollback plan: ...` line asks whether the plan has been validated.
/// - A mention of a publish/deploy/release window asks about scheduling.
///
/// Questions are deduplicated case-insensitively, first occurrence wins.
pub fn derive_open_questions<'a, I>(bodies: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let p = patterns();
    let mut seen = HashSet::new();
    let mut questions = Vec::new();

    let mut push = |question: String, questions: &mut Vec<String>| {
        if questions.len() < limit && seen.insert(question.to_lowercase()) {
            questions.push(question);
        }
    };

    for body in bodies {
        if questions.len() >= limit {
            break;
        }

        for caps in p.checklist.captures_iter(body) {
            let line = caps[1].trim();
            let question = match p.owner_suffix.captures(line) {
                Some(owner) if !owner[1].trim().is_empty() => format!(
                    "{}: what's the ETA and sign-off for \"{}\"?",
                    owner[2].trim(),
                    clip(owner[1].trim())
                ),
                _ => format!("Who owns \"{}\", and what's the ETA and sign-off?", clip(line)),
            };
            push(question, &mut questions);
        }

        for caps in p.rollback.captures_iter(body) {
            push(
                format!(
                    "Has the rollback plan ({}) been validated, and who signs off?",
                    clip(caps[1].trim_end_matches('.'))
                ),
                &mut questions,
            );
        }

        if let Some(caps) = p.release_window.captures(body) {
            push(
                format!(
                    "When is the {} window, and is everyone aligned on timing?",
                    caps[1].to_lowercase()
                ),
                &mut questions,
            );
        }
    }

    questions
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_QUOTED_CHARS {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MAX_QUOTED_CHARS).collect();
    clipped.push('…');
    clipped
}
