//! Compound utterance splitting
//!
//! Splits "open chrome and then search cats" into ordered segments on
//! sequencing connectors ("and then", "after that", "phir") and parallel
//! connectors ("and", "also", "plus"). A bare "and" only splits when a
//! command verb follows it, so recipient lists ("send hi to mom and dad")
//! and free-text arguments ("search cats and dogs") stay whole.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static CONNECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \s*(?:
            ,?\s*\band\s+then\b
          | ,?\s*\bthen\b
          | ,?\s*\bafter\s+(?:that|this)\b
          | ,?\s*\bfollowed\s+by\b
          | \bphir\b | \bfir\b
          | \buske\s+baad\b | \bbaad\s+mein\b
          | ,?\s*\band\s+also\b
          | ,?\s*\b(?P<and>and)\b
          | ,?\s*\balso\b
          | ,?\s*\bplus\b
          | \s&
        )\s*",
    )
    .expect("connector regex")
});

/// Words that start a new command after a connector
const COMMAND_VERBS: &[&str] = &[
    "open", "launch", "start", "close", "quit", "exit", "kill", "play", "pause", "stop", "resume",
    "send", "msg", "message", "text", "call", "search", "google", "find", "set", "turn", "switch",
    "mute", "unmute", "increase", "decrease", "raise", "lower", "type", "press", "shutdown",
    "restart", "reboot", "lock", "remind", "do", "perform", "run", "skip", "next", "previous",
    "describe", "take", "make", "enable", "disable", "volume", "brightness", "wifi", "bluetooth",
    "tell", "ask", "forget", "list",
];

/// Byte ranges of the segments of `text`, in spoken order.
///
/// A single range covering the whole trimmed text means "not compound".
pub fn split_compound(text: &str) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut start = 0;

    for caps in CONNECTOR.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };

        if caps.name("and").is_some() && !starts_command(&text[whole.end()..]) {
            continue;
        }

        push_segment(text, start..whole.start(), &mut segments);
        start = whole.end();
    }
    push_segment(text, start..text.len(), &mut segments);

    segments
}

fn starts_command(after: &str) -> bool {
    let next_word = after.split_whitespace().next().unwrap_or_default();
    COMMAND_VERBS.contains(&next_word.to_lowercase().as_str())
}

fn push_segment(text: &str, range: Range<usize>, segments: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let offset = range.start + (slice.len() - slice.trim_start().len());
    segments.push(offset..offset + trimmed.len());
}
