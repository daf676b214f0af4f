//! Utterance normalizer
//!
//! Pure function from raw text to a canonical form:
//! - strips prompt prefixes, greetings and politeness filler
//! - repairs common misspellings and canonicalizes Hinglish verbs
//! - fuzzy-corrects near misses of common command terms
//! - lower-cases for matching, while keeping a case-preserving copy so
//!   names and messages can be extracted with the user's casing

use regex::Regex;
use similar::TextDiff;
use std::ops::Range;
use std::sync::LazyLock;

/// Minimum similarity for fuzzy token correction
const AUTOCORRECT_CUTOFF: f32 = 0.8;

/// Terms worth snapping misheard tokens onto
const COMMON_TERMS: &[&str] = &[
    "battery",
    "saver",
    "wifi",
    "bluetooth",
    "volume",
    "brightness",
    "notepad",
    "whatsapp",
    "shutdown",
    "restart",
    "spotify",
    "calculator",
];

/// Ordered rewrite table: (case-insensitive pattern, replacement)
static REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)^you\s*:\s*", ""),
        (r"(?i)^(?:assistant|buddy|hey|hello|hi|ok)[,\s]+", ""),
        (r"(?i)\b(?:please|kindly|kripya|pls)\b[ ,]*", ""),
        (r"(?i)\b(?:blutooth|bluetoth|bluetoothh|bluetooh)\b", "bluetooth"),
        (r"(?i)\bwi[\s-]?fi\b", "wifi"),
        (r"(?i)\bbaterry\b", "battery"),
        (r"(?i)\bchalu(?:\s+karo)?\b", "turn on"),
        (r"(?i)\b(?:bandh|band\s+karo|bandh\s+karo)\b", "turn off"),
        (r"(?i)\b(?:kar|karo|krna|karna)\b", ""),
        (r"(?i)\baur\b", "and"),
        (r"(?i)\bbhejo?\b", "send"),
        (r"[.!?]+$", ""),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("normalizer rewrite regex"), replacement))
    .collect()
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z']+").expect("word regex"));

/// A normalized utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Lower-cased canonical text used for matching
    text: String,
    /// Same text with the user's casing preserved
    cased: String,
}

impl Normalized {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cased(&self) -> &str {
        &self.cased
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whitespace-separated tokens of the lower-cased text
    pub fn tokens(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// Cased slice for a byte range found in `text()`.
    ///
    /// Falls back to the lower-cased slice when lower-casing changed byte
    /// lengths (non-ASCII input).
    pub fn cased_span(&self, range: Range<usize>) -> &str {
        if self.text.len() == self.cased.len()
            && self.cased.is_char_boundary(range.start)
            && self.cased.is_char_boundary(range.end)
        {
            &self.cased[range]
        } else {
            &self.text[range]
        }
    }
}

/// Normalize a raw utterance
pub fn normalize(raw: &str) -> Normalized {
    let mut working = collapse(raw);

    for (pattern, replacement) in REWRITES.iter() {
        working = collapse(&pattern.replace_all(&working, *replacement));
    }

    let cased = autocorrect(&working);
    let text = cased.to_lowercase();
    Normalized { text, cased }
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Snap tokens longer than three letters onto the closest common term
fn autocorrect(text: &str) -> String {
    WORD.replace_all(text, |caps: &regex::Captures<'_>| {
        let token = &caps[0];
        let lower = token.to_lowercase();
        if lower.len() <= 3 || COMMON_TERMS.contains(&lower.as_str()) {
            return token.to_string();
        }
        COMMON_TERMS
            .iter()
            .map(|term| (term, TextDiff::from_chars(lower.as_str(), term).ratio()))
            .filter(|(_, ratio)| *ratio >= AUTOCORRECT_CUTOFF)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(term, _)| term.to_string())
            .unwrap_or_else(|| token.to_string())
    })
    .into_owned()
}
