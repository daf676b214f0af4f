//! Entity extraction
//!
//! Finds typed values (people, numbers, durations, apps, on/off states)
//! anywhere in an utterance. The entity stage uses these to fill slots a
//! deterministic rule left empty; learned-task replay uses them to bind
//! template slots.

use crate::nlu::normalizer::Normalized;
use crate::types::Params;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Kind of value a slot expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Person,
    Number,
    Duration,
    App,
    State,
}

/// Slot name to entity kind; free-text slots have none
pub fn slot_kind(slot: &str) -> Option<EntityKind> {
    match slot {
        "contact" | "recipient" | "person" => Some(EntityKind::Person),
        "percent" | "level" | "delta" | "repeat_count" | "count" => Some(EntityKind::Number),
        "duration_seconds" | "interval_seconds" | "delay_seconds" => Some(EntityKind::Duration),
        "app" => Some(EntityKind::App),
        "state" => Some(EntityKind::State),
        _ => None,
    }
}

/// Spoken nicknames mapped to contact names
const CONTACT_ALIASES: &[(&str, &str)] = &[
    ("mom", "Mom"),
    ("mum", "Mom"),
    ("mummy", "Mom"),
    ("mumma", "Mom"),
    ("mommy", "Mom"),
    ("mama", "Mom"),
    ("maa", "Mom"),
    ("mother", "Mom"),
    ("dad", "Papa"),
    ("daddy", "Papa"),
    ("papa", "Papa"),
    ("father", "Papa"),
    ("pappa", "Papa"),
];

/// Known applications: (spoken name, canonical name)
const KNOWN_APPS: &[(&str, &str)] = &[
    ("google chrome", "Chrome"),
    ("chrome", "Chrome"),
    ("firefox", "Firefox"),
    ("edge", "Edge"),
    ("brave", "Brave"),
    ("excel", "Excel"),
    ("word", "Word"),
    ("powerpoint", "PowerPoint"),
    ("notepad", "notepad.exe"),
    ("calculator", "calc.exe"),
    ("calc", "calc.exe"),
    ("paint", "mspaint.exe"),
    ("spotify", "Spotify"),
    ("whatsapp", "WhatsApp"),
    ("vs code", "VS Code"),
    ("vscode", "VS Code"),
    ("file explorer", "explorer.exe"),
    ("explorer", "explorer.exe"),
    ("terminal", "Terminal"),
    ("outlook", "Outlook"),
    ("teams", "Teams"),
    ("discord", "Discord"),
    ("slack", "Slack"),
    ("telegram", "Telegram"),
];

const UNITS: &[(&str, f64)] = &[
    ("zero", 0.0),
    ("one", 1.0),
    ("a", 1.0),
    ("an", 1.0),
    ("two", 2.0),
    ("three", 3.0),
    ("four", 4.0),
    ("five", 5.0),
    ("six", 6.0),
    ("seven", 7.0),
    ("eight", 8.0),
    ("nine", 9.0),
    ("ten", 10.0),
    ("eleven", 11.0),
    ("twelve", 12.0),
    ("thirteen", 13.0),
    ("fourteen", 14.0),
    ("fifteen", 15.0),
    ("sixteen", 16.0),
    ("seventeen", 17.0),
    ("eighteen", 18.0),
    ("nineteen", 19.0),
];

const TENS: &[(&str, f64)] = &[
    ("twenty", 20.0),
    ("thirty", 30.0),
    ("forty", 40.0),
    ("fifty", 50.0),
    ("sixty", 60.0),
    ("seventy", 70.0),
    ("eighty", 80.0),
    ("ninety", 90.0),
];

/// Words that multiply the group spoken before them
const SCALES: &[(&str, f64)] = &[("hundred", 100.0), ("thousand", 1000.0)];

const NUMBER_WORD: &str = r"(?:zero|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety|hundred|thousand)";

const TIME_UNIT: &str = r"(?:ms|milliseconds?|s|secs?|seconds?|m|mins?|minutes?|h|hrs?|hours?)";

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?P<number>\d+(?:\.\d+)?\s*|(?:an?|{w}(?:[\s-]+{w}){{0,3}})\s+)(?P<unit>{u})\b",
        w = NUMBER_WORD,
        u = TIME_UNIT
    ))
    .expect("duration regex")
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?P<number>\d+(?:\.\d+)?|{w}(?:[\s-]+{w}){{0,3}})\b(?:\s*(?:%|percent))?",
        w = NUMBER_WORD
    ))
    .expect("number regex")
});

static PERSON_AFTER_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:to|for|with|call|tell|ask|message|text|ring)\s+(?P<name>[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")
        .expect("person regex")
});

static STATE_ON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:on|enable|enabled|start)\b").expect("state on regex"));
static STATE_OFF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:off|disable|disabled|stop)\b").expect("state off regex"));
static STATE_TOGGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:toggle|flip|switch)\b").expect("state toggle regex"));

static RECIPIENT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|&|\band\b)\s*").expect("recipient separator regex"));

static CONTACT_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:on\s+whatsapp|too|also|as\s+well|please|now)$").expect("contact noise regex")
});

static BINDING_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|;|\band\b)\s*").expect("binding separator regex"));

static BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<key>[A-Za-z_]+)(?:\s*[=:]\s*|\s+(?:(?i:as|is)\s+)?)(?P<value>\S.*)$")
        .expect("binding regex")
});

/// Typed values found in an utterance, in order of appearance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    pub persons: Vec<String>,
    pub numbers: Vec<f64>,
    pub durations: Vec<f64>,
    pub apps: Vec<String>,
    pub states: Vec<String>,
}

impl Entities {
    /// First value matching the slot's kind
    pub fn value_for(&self, slot: &str) -> Option<Value> {
        match slot_kind(slot)? {
            EntityKind::Person => self.persons.first().map(|p| Value::String(p.clone())),
            EntityKind::Number => {
                let n = *self.numbers.first()?;
                let n = if matches!(slot, "percent" | "level") {
                    n.clamp(0.0, 100.0)
                } else {
                    n
                };
                Some(number_value(n))
            }
            EntityKind::Duration => self.durations.first().map(|d| number_value(*d)),
            EntityKind::App => self.apps.first().map(|a| Value::String(a.clone())),
            EntityKind::State => self.states.first().map(|s| Value::String(s.clone())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
            && self.numbers.is_empty()
            && self.durations.is_empty()
            && self.apps.is_empty()
            && self.states.is_empty()
    }
}

/// Extract every recognizable entity from a normalized utterance
pub fn extract(normalized: &Normalized) -> Entities {
    let text = normalized.text();
    let mut entities = Entities::default();

    let mut duration_spans = Vec::new();
    for caps in DURATION.captures_iter(text) {
        let (Some(whole), Some(number), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(seconds) = parse_duration(number.as_str(), Some(unit.as_str())) {
            entities.durations.push(seconds);
            duration_spans.push(whole.range());
        }
    }

    for caps in NUMBER.captures_iter(text) {
        let Some(m) = caps.name("number") else { continue };
        if duration_spans.iter().any(|span| span.contains(&m.start())) {
            continue;
        }
        if let Some(value) = parse_number(m.as_str()) {
            entities.numbers.push(value);
        }
    }

    for caps in PERSON_AFTER_CUE.captures_iter(normalized.cased()) {
        if let Some(name) = caps.name("name") {
            push_unique(&mut entities.persons, normalize_contact(name.as_str()));
        }
    }
    for token in normalized.tokens() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if let Some((_, canonical)) = CONTACT_ALIASES.iter().find(|(alias, _)| *alias == token) {
            push_unique(&mut entities.persons, canonical.to_string());
        }
    }

    let padded = format!(" {} ", text);
    for (spoken, canonical) in KNOWN_APPS {
        if padded.contains(&format!(" {} ", spoken)) {
            push_unique(&mut entities.apps, canonical.to_string());
        }
    }

    if STATE_TOGGLE.is_match(text) && !STATE_ON.is_match(text) && !STATE_OFF.is_match(text) {
        entities.states.push("toggle".to_string());
    } else if STATE_OFF.is_match(text) {
        entities.states.push("off".to_string());
    } else if STATE_ON.is_match(text) {
        entities.states.push("on".to_string());
    }

    entities
}

/// Parse digits or spoken number words ("twenty five", "forty-two")
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim().to_lowercase();
    if let Ok(n) = text.parse::<f64>() {
        return Some(n);
    }

    let mut total = 0.0;
    let mut group = 0.0;
    let mut matched = false;
    for word in text.split(|c: char| c.is_whitespace() || c == '-').filter(|w| !w.is_empty()) {
        matched = true;
        if let Some((_, scale)) = SCALES.iter().find(|(name, _)| *name == word) {
            // "hundred" alone means one hundred
            let base = if group == 0.0 { 1.0 } else { group };
            if *scale >= 1000.0 {
                total += base * scale;
                group = 0.0;
            } else {
                group = base * scale;
            }
            continue;
        }
        let value = UNITS
            .iter()
            .chain(TENS.iter())
            .find(|(name, _)| *name == word)
            .map(|(_, v)| *v)?;
        group += value;
    }
    matched.then_some(total + group)
}

/// Convert a number and unit into seconds (unit defaults to seconds)
pub fn parse_duration(number: &str, unit: Option<&str>) -> Option<f64> {
    let n = parse_number(number)?;
    let unit = unit.unwrap_or("s").to_lowercase();
    let factor = match unit.as_str() {
        "ms" | "millisecond" | "milliseconds" => 0.001,
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        _ => return None,
    };
    Some(n * factor)
}

/// First duration mentioned in the text, in seconds
pub fn find_duration(text: &str) -> Option<f64> {
    DURATION.captures(&text.to_lowercase()).and_then(|caps| {
        let number = caps.name("number")?;
        parse_duration(number.as_str(), caps.name("unit").map(|u| u.as_str()))
    })
}

/// Canonical contact name: strips trailing noise and applies nickname aliases
pub fn normalize_contact(raw: &str) -> String {
    let mut name = raw.trim().trim_matches(|c: char| c == ',' || c == '.').to_string();
    loop {
        let stripped = CONTACT_NOISE.replace(&name, "").trim().to_string();
        if stripped == name {
            break;
        }
        name = stripped;
    }

    let lowered = name.to_lowercase();
    if let Some((_, canonical)) = CONTACT_ALIASES.iter().find(|(alias, _)| *alias == lowered) {
        return canonical.to_string();
    }
    name
}

/// Split "Mom and Dad, Sarah" into canonical recipients
pub fn split_recipients(text: &str) -> Vec<String> {
    let mut recipients = Vec::new();
    for part in RECIPIENT_SEPARATOR.split(text) {
        let contact = normalize_contact(part);
        if !contact.is_empty() {
            push_unique(&mut recipients, contact);
        }
    }
    recipients
}

/// Canonical application name for a spoken name, if known
pub fn canonical_app(spoken: &str) -> Option<&'static str> {
    let lowered = spoken.trim().to_lowercase();
    KNOWN_APPS
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, canonical)| *canonical)
}

/// Parse explicit slot bindings: "contact Dad, message good morning",
/// "contact=Dad", "contact as Dad"
pub fn parse_bindings(text: &str) -> Params {
    let mut bindings = Params::new();
    for part in BINDING_SEPARATOR.split(text.trim()) {
        let Some(caps) = BINDING.captures(part.trim()) else {
            continue;
        };
        let (Some(key), Some(value)) = (caps.name("key"), caps.name("value")) else {
            continue;
        };
        let key = key.as_str().to_lowercase();
        let value = value.as_str().trim();
        let value = match slot_kind(&key) {
            Some(EntityKind::Person) => Value::String(normalize_contact(value)),
            Some(EntityKind::Number) | Some(EntityKind::Duration) => parse_number(value)
                .map(number_value)
                .unwrap_or_else(|| Value::String(value.to_string())),
            _ => Value::String(value.to_string()),
        };
        bindings.insert(key, value);
    }
    bindings
}

/// JSON number, integral when possible
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlu::normalizer::normalize;
    use serde_json::json;

    #[test]
    fn test_number_words() {
        assert_eq!(parse_number("fifty"), Some(50.0));
        assert_eq!(parse_number("twenty five"), Some(25.0));
        assert_eq!(parse_number("forty-two"), Some(42.0));
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("lots"), None);
    }

    #[test]
    fn test_parse_number_scales() {
        assert_eq!(parse_number("one hundred"), Some(100.0));
        assert_eq!(parse_number("two hundred"), Some(200.0));
        assert_eq!(parse_number("a hundred"), Some(100.0));
        assert_eq!(parse_number("one hundred twenty five"), Some(125.0));
        assert_eq!(parse_number("three thousand"), Some(3000.0));
        assert_eq!(parse_number("two thousand five hundred ten"), Some(2510.0));
    }

    #[test]
    fn test_durations() {
        assert_eq!(parse_duration("5", Some("minutes")), Some(300.0));
        assert_eq!(parse_duration("500", Some("ms")), Some(0.5));
        assert_eq!(parse_duration("an", Some("hour")), Some(3600.0));
        assert_eq!(parse_duration("3", None), Some(3.0));
        assert_eq!(find_duration("set a timer for five minutes"), Some(300.0));
        assert_eq!(find_duration("for 1 hour"), Some(3600.0));
    }

    #[test]
    fn test_extract_numbers_skip_durations() {
        let entities = extract(&normalize("press f5 3 times for 10 seconds"));
        assert_eq!(entities.durations, vec![10.0]);
        assert_eq!(entities.numbers, vec![3.0]);
    }

    #[test]
    fn test_extract_persons() {
        let entities = extract(&normalize("send hello to Sarah"));
        assert_eq!(entities.persons, vec!["Sarah".to_string()]);

        let entities = extract(&normalize("call mum"));
        assert_eq!(entities.persons, vec!["Mom".to_string()]);
    }

    #[test]
    fn test_extract_apps_and_states() {
        let entities = extract(&normalize("open google chrome"));
        assert_eq!(entities.apps.first().map(String::as_str), Some("Chrome"));

        let entities = extract(&normalize("bluetooth off"));
        assert_eq!(entities.states, vec!["off".to_string()]);
    }

    #[test]
    fn test_value_for_slot_kinds() {
        let entities = extract(&normalize("set the volume to fifty"));
        assert_eq!(entities.value_for("percent"), Some(json!(50)));
        assert_eq!(entities.value_for("message"), None);

        let entities = extract(&normalize("brightness 150"));
        assert_eq!(entities.value_for("level"), Some(json!(100)));

        let entities = extract(&normalize("timer for 90 seconds"));
        assert_eq!(entities.value_for("duration_seconds"), Some(json!(90)));
    }

    #[test]
    fn test_contact_normalization() {
        assert_eq!(normalize_contact("mom on whatsapp"), "Mom");
        assert_eq!(normalize_contact("Sarah too"), "Sarah");
        assert_eq!(normalize_contact("dad"), "Papa");
        assert_eq!(
            split_recipients("Mom and Dad, Sarah"),
            vec!["Mom".to_string(), "Papa".to_string(), "Sarah".to_string()]
        );
    }

    #[test]
    fn test_bindings() {
        let bindings = parse_bindings("contact Dad, message good morning");
        assert_eq!(bindings["contact"], json!("Papa"));
        assert_eq!(bindings["message"], json!("good morning"));

        let bindings = parse_bindings("level=40");
        assert_eq!(bindings["level"], json!(40));

        assert!(parse_bindings("Dad").is_empty());
    }

    #[test]
    fn test_canonical_app() {
        assert_eq!(canonical_app("Calculator"), Some("calc.exe"));
        assert_eq!(canonical_app("minesweeper"), None);
    }
}
