//! Prompt Input Hygiene
//!
//! Screens caller-supplied text (company names, notes, feedback comments)
//! before it is interpolated into LLM prompts. Suspicious fragments are
//! stripped rather than rejected: the analysis must proceed even when an
//! operator pastes odd text.

use regex::Regex;
use std::sync::OnceLock;

const MAX_PROMPT_INPUT_LEN: usize = 10_000;

fn injection_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)ignore\s+(previous|all|above)\s+instructions",
            r"(?i)new\s+instructions?:",
            r"(?i)system\s*:",
            r"(?i)<\s*script",
            r"(?i)javascript:",
            r"\{\{\s*.*?\s*\}\}",
            r"\$\{\s*.*?\s*\}",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Clean a text fragment for safe interpolation into an LLM prompt.
///
/// Removes injection-looking fragments and control characters, collapses
/// runs of blank lines, and truncates to a hard cap. Returns the cleaned
/// text together with a flag noting whether anything suspicious was found.
pub fn sanitize_for_prompt(text: &str) -> (String, bool) {
    let mut cleaned = if text.len() > MAX_PROMPT_INPUT_LEN {
        let mut end = MAX_PROMPT_INPUT_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    } else {
        text.to_string()
    };

    let mut suspicious = false;
    for pattern in injection_patterns() {
        if pattern.is_match(&cleaned) {
            suspicious = true;
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
    }

    cleaned = cleaned
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    while cleaned.contains("\n\n\n") {
        cleaned = cleaned.replace("\n\n\n", "\n\n");
    }

    (cleaned.trim().to_string(), suspicious)
}
