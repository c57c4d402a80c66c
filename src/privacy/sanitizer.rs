//! Free-text sanitizing for text sent to the narrative model.
//!
//! Strips prompt-manipulation markers (role switches, chat-template
//! tokens, code fences, instruction overrides), collapses whitespace
//! and bounds the length.

use regex::Regex;
use std::sync::OnceLock;

/// Default maximum length of a sanitized field, in characters.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 500;

// Compile-once regex patterns via OnceLock.
fn re_fences() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`{3,}|~{3,}").unwrap())
}

fn re_template_tokens() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<\|[^|>]{0,40}\|>|\[/?(inst|sys)\]|<</?sys>>|</?(system|assistant|user|human)>")
            .unwrap()
    })
}

fn re_role_markers() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(system|assistant|user|human|developer)\s*:").unwrap()
    })
}

fn re_overrides() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(ignore|disregard|forget|override)\b[^.\n]{0,40}?\b(instructions?|prompts?|rules|directions)\b|\byou are now\b|\bnew instructions?\b|\bpretend (to be|you are)\b|\bjailbreak\b",
        )
        .unwrap()
    })
}

fn re_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Remove prompt-manipulation substrings and normalize whitespace.
///
/// Repeats until no pattern matches.
pub fn strip_injection(input: &str) -> String {
    let mut current = input.to_string();

    for _ in 0..4 {
        let mut next = re_fences().replace_all(&current, " ").into_owned();
        next = re_template_tokens().replace_all(&next, " ").into_owned();
        next = re_role_markers().replace_all(&next, " ").into_owned();
        next = re_overrides().replace_all(&next, " ").into_owned();
        next = re_whitespace().replace_all(&next, " ").trim().to_string();

        if next == current {
            break;
        }
        current = next;
    }

    current
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => input[..idx].trim_end().to_string(),
        None => input.to_string(),
    }
}
