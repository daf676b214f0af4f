//! Deterministic pattern stage
//!
//! A prioritized table of trigger patterns evaluated top to bottom against
//! the normalized (lower-cased) utterance. The first rule whose trigger
//! matches wins and extracts its parameters from the capture groups, taking
//! names and free text from the case-preserving rendition.
//!
//! Rule order matters:
//! 1. teaching / learned-task controls and the interrupt word (atomic, never
//!    split by the compound splitter)
//! 2. anchored free-text commands (messaging, search, typing, media, apps)
//! 3. keyword-containment device controls (volume, brightness, radios, power)
//!
//! Free-text rules come before containment rules so "search how to turn on
//! wifi" stays a search.

use crate::config::RuleConfig;
use crate::errors::{AssistantError, Result};
use crate::nlu::anaphora::is_anaphoric;
use crate::nlu::entities::{canonical_app, find_duration, normalize_contact, number_value, parse_duration};
use crate::nlu::normalizer::Normalized;
use crate::types::{action, Params};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

/// Required parameter policy of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Required {
    #[default]
    Nothing,
    /// Every listed slot must be present
    All(&'static [&'static str]),
    /// At least one listed slot must be present
    AnyOf(&'static [&'static str]),
}

impl Required {
    /// Slots still missing from `params`
    pub fn missing(&self, params: &Params) -> Vec<String> {
        let present = |slot: &str| match params.get(slot) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        match self {
            Required::Nothing => Vec::new(),
            Required::All(slots) => slots
                .iter()
                .copied()
                .filter(|&slot| !present(slot))
                .map(str::to_string)
                .collect(),
            Required::AnyOf(slots) => {
                if slots.iter().copied().any(present) {
                    Vec::new()
                } else {
                    slots.first().map(|s| vec![s.to_string()]).unwrap_or_default()
                }
            }
        }
    }
}

type Extractor = fn(&Captures<'_>, &Normalized) -> Params;

#[derive(Debug, Clone)]
enum Extraction {
    Captures(Extractor),
    Fixed(Params),
}

/// One trigger → action rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    action_type: String,
    trigger: Regex,
    extraction: Extraction,
    required: Required,
    atomic: bool,
    fan_out: Option<&'static str>,
}

impl PatternRule {
    fn builtin(name: &str, action_type: &str, pattern: &str, extractor: Extractor) -> Self {
        Self {
            name: name.to_string(),
            action_type: action_type.to_string(),
            trigger: Regex::new(pattern).expect("built-in rule pattern"),
            extraction: Extraction::Captures(extractor),
            required: Required::Nothing,
            atomic: false,
            fan_out: None,
        }
    }

    /// Build a user rule: case-insensitive whole-word containment of `trigger`
    pub fn from_config(rule: &RuleConfig) -> Result<Self> {
        let trigger = rule.trigger.trim().to_lowercase();
        if trigger.is_empty() || rule.action.trim().is_empty() {
            return Err(AssistantError::ConfigError(format!(
                "rule needs a trigger and an action (trigger='{}', action='{}')",
                rule.trigger, rule.action
            )));
        }
        let pattern = format!(r"(?:^|\b|\s){}(?:\b|\s|$)", regex::escape(&trigger));
        let trigger_re = Regex::new(&pattern)
            .map_err(|e| AssistantError::ConfigError(format!("invalid rule trigger '{}': {}", rule.trigger, e)))?;

        Ok(Self {
            name: format!("custom:{}", trigger),
            action_type: rule.action.trim().to_string(),
            trigger: trigger_re,
            extraction: Extraction::Fixed(rule.params.clone()),
            required: Required::Nothing,
            atomic: false,
            fan_out: None,
        })
    }

    fn required(mut self, required: Required) -> Self {
        self.required = required;
        self
    }

    fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    fn fan_out(mut self, key: &'static str) -> Self {
        self.fan_out = Some(key);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    fn apply(&self, normalized: &Normalized) -> Option<RuleMatch> {
        let caps = self.trigger.captures(normalized.text())?;
        let params = match &self.extraction {
            Extraction::Captures(extract) => extract(&caps, normalized),
            Extraction::Fixed(params) => params.clone(),
        };
        Some(RuleMatch {
            rule: self.name.clone(),
            action_type: self.action_type.clone(),
            params,
            span: normalized.cased().to_string(),
            required: self.required,
            fan_out: self.fan_out,
        })
    }
}

/// A rule hit with its extracted parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule: String,
    pub action_type: String,
    pub params: Params,
    pub span: String,
    pub required: Required,
    /// Parameter whose comma/"and" separated value yields one request per item
    pub fan_out: Option<&'static str>,
}

/// Ordered rule table
#[derive(Debug, Clone)]
pub struct PatternRules {
    rules: Vec<PatternRule>,
}

impl PatternRules {
    /// Built-in rules only
    pub fn builtin() -> Self {
        Self { rules: builtin_rules() }
    }

    /// Built-in rules preceded by user rules from configuration
    pub fn with_custom(custom: &[RuleConfig]) -> Result<Self> {
        let mut rules = custom
            .iter()
            .map(PatternRule::from_config)
            .collect::<Result<Vec<_>>>()?;
        rules.extend(builtin_rules());
        Ok(Self { rules })
    }

    /// First matching rule
    pub fn match_first(&self, normalized: &Normalized) -> Option<RuleMatch> {
        self.rules.iter().find_map(|rule| rule.apply(normalized))
    }

    /// First matching atomic rule (checked before compound splitting)
    pub fn match_atomic(&self, normalized: &Normalized) -> Option<RuleMatch> {
        self.rules
            .iter()
            .filter(|rule| rule.atomic)
            .find_map(|rule| rule.apply(normalized))
    }

    /// Required-parameter policy for an action type (first rule wins)
    pub fn required_for(&self, action_type: &str) -> Required {
        self.rules
            .iter()
            .find(|rule| rule.action_type == action_type)
            .map(|rule| rule.required)
            .unwrap_or_default()
    }

    /// Every action type some rule can produce, in first-appearance order
    pub fn action_types(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.action_type) {
                seen.push(rule.action_type.clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn builtin_rules() -> Vec<PatternRule> {
    use Required::{All, AnyOf};

    vec![
        // Teaching and learned tasks
        PatternRule::builtin(
            "start_teaching",
            action::START_TEACHING,
            r"^(?:start\s+teaching|teach\s+you|let\s+me\s+teach\s+you|learn\s+(?:a\s+)?(?:new\s+)?task)\b(?:\s+(?:how\s+to\s+)?(?:called\s+|named\s+)?(?P<name>.+))?$",
            extract_task_name,
        )
        .atomic(),
        PatternRule::builtin(
            "stop_teaching",
            action::STOP_TEACHING,
            r"^(?:stop|done|finish(?:ed)?|end)\s+teaching\b(?:\s+(?:with|using|keeping)\s+(?P<slots>.+))?$",
            extract_template_slots,
        )
        .atomic(),
        PatternRule::builtin(
            "list_learned_tasks",
            action::LIST_LEARNED_TASKS,
            r"^(?:list|show)(?:\s+me)?(?:\s+(?:my|all|the))?\s+(?:learned\s+)?(?:tasks|routines)$|^what\s+(?:tasks\s+)?(?:have\s+you\s+learned|can\s+you\s+do)$",
            no_params,
        )
        .atomic(),
        PatternRule::builtin(
            "forget_learned_task",
            action::FORGET_LEARNED_TASK,
            r"^(?:forget|delete|remove)\s+(?:the\s+)?(?:learned\s+)?(?:task|routine)\s+(?P<name>.+)$",
            extract_task,
        )
        .atomic()
        .required(All(&["task"])),
        PatternRule::builtin(
            "do_learned_task",
            action::DO_LEARNED_TASK,
            r"^(?:(?:do|run|repeat|execute)\s+(?:the\s+|my\s+)?(?:learned\s+)?(?:task|routine)|perform(?:\s+(?:the\s+)?(?:learned\s+)?task)?)\s+(?P<name>.+?)(?:\s+(?:with|for|to|using)\s+.+)?$",
            extract_task,
        )
        .atomic()
        .required(All(&["task"])),
        PatternRule::builtin(
            "cancel",
            action::CANCEL,
            r"^(?:stop|cancel|abort|never\s*mind|stop\s+(?:it|that)|cancel\s+(?:it|that))$",
            no_params,
        )
        .atomic(),
        PatternRule::builtin(
            "screen_describe",
            "screen_describe",
            r"^(?:describe|analy[sz]e|read)\s+(?:the\s+|my\s+)?screen$|^what(?:'s|\s+is)\s+on\s+(?:the\s+|my\s+)?screen$",
            no_params,
        ),
        // Messaging
        PatternRule::builtin(
            "whatsapp_send",
            "whatsapp_send",
            r"^(?:send|msg|message|text|whatsapp)\s+(?:a\s+)?(?:(?:whatsapp\s+)?message\s+|msg\s+)?(?:saying\s+)?(?P<message>.+?)\s+(?:to|for)\s+(?P<contact>.+)$",
            extract_message,
        )
        .required(All(&["message", "contact"]))
        .fan_out("contact"),
        PatternRule::builtin(
            "whatsapp_send_ko",
            "whatsapp_send",
            r"^send\s+(?P<message>.+?)\s+(?P<contact>\S+)\s+ko$",
            extract_message,
        )
        .required(All(&["message", "contact"])),
        PatternRule::builtin(
            "whatsapp_tell",
            "whatsapp_send",
            r"^(?:tell|ask)\s+(?P<contact>\S+)\s+(?:that\s+|to\s+)?(?P<message>.+)$",
            extract_message,
        )
        .required(All(&["message", "contact"])),
        PatternRule::builtin(
            "whatsapp_call",
            "whatsapp_call",
            r"^(?P<video>video\s+)?(?:call|ring|dial)\s+(?P<contact>.+?)(?:\s+on\s+whatsapp)?$",
            extract_call,
        )
        .required(All(&["contact"])),
        // Web and text
        PatternRule::builtin(
            "search",
            "search",
            r"^(?:search|google|look\s+up|lookup|find)\s+(?:for\s+)?(?P<query>.+?)(?:\s+on\s+(?P<site>youtube|google|amazon|wikipedia|github|flipkart))?$",
            extract_search,
        )
        .required(All(&["query"])),
        PatternRule::builtin(
            "reminder",
            "reminder",
            r"^remind\s+me\s+(?:to\s+)?(?P<text>.+?)(?:\s+in\s+(?P<when>.+))?$",
            extract_reminder,
        )
        .required(All(&["text", "delay_seconds"])),
        PatternRule::builtin(
            "type_text",
            "type_text",
            r"^(?:type|write|likho)\s+(?P<text>.+)$",
            extract_text,
        )
        .required(All(&["text"])),
        PatternRule::builtin(
            "hotkey_loop",
            "hotkey_loop",
            r"^(?:press|hit)\s+(?P<keys>.+?)\s+(?:every|each)\s+(?P<every>\d+(?:\.\d+)?)\s*(?P<unit>[a-z]+)?(?P<rest>.*)$",
            extract_hotkey_loop,
        )
        .required(All(&["keys", "interval_seconds"])),
        PatternRule::builtin("hotkey", "hotkey", r"^(?:press|hit)\s+(?P<keys>.+)$", extract_keys)
            .required(All(&["keys"])),
        // Media
        PatternRule::builtin(
            "stop_music",
            "stop_music",
            r"^(?:stop|pause|rok|roko)\s+(?:the\s+)?(?:song|music|gaana|gana|track|playback|spotify)$|^pause(?:\s+it)?$",
            no_params,
        ),
        PatternRule::builtin(
            "next_song",
            "next_song",
            r"^(?:play\s+)?(?:the\s+)?(?:next|skip|agla|agli)(?:\s+(?:the\s+)?(?:song|track|one|gaana))?$",
            no_params,
        ),
        PatternRule::builtin(
            "previous_song",
            "previous_song",
            r"^(?:play\s+)?(?:the\s+)?(?:previous|prev|pichla|pichli|last)\s+(?:song|track|one|gaana)$",
            no_params,
        ),
        PatternRule::builtin(
            "spotify_play",
            "spotify_play",
            r"^(?:play|resume|start|chalao|bajao)\s+(?:some\s+|the\s+|a\s+)?(?:music|songs?|spotify|playback)$|^(?:resume|play)$",
            no_params,
        ),
        PatternRule::builtin(
            "play_song",
            "play_song",
            r"^(?:play|bajao|chalao)\s+(?P<song>.+?)(?:\s+on\s+(?:spotify|youtube(?:\s+music)?))?$",
            extract_song,
        )
        .required(All(&["song"])),
        PatternRule::builtin(
            "play_song_hinglish",
            "play_song",
            r"^(?P<song>.+?)\s+(?:bajao|chalao)$",
            extract_song,
        )
        .required(All(&["song"])),
        // Applications
        PatternRule::builtin(
            "close_app",
            "close_app",
            r"^(?:close|exit|quit|kill)\s+(?:the\s+)?(?P<app>.+?)(?:\s+app)?$",
            extract_app,
        )
        .required(All(&["app"])),
        PatternRule::builtin(
            "open_url",
            "open_url",
            r"^(?:open|go\s+to|visit)\s+(?P<url>(?:https?://|www\.)\S+|[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:com|org|net|io|in|dev|co)(?:/\S*)?)$",
            extract_url,
        )
        .required(All(&["url"])),
        PatternRule::builtin(
            "launch_app",
            "launch_app",
            r"^(?:open|launch|start|run|khol|kholo)\s+(?:the\s+)?(?:app\s+)?(?P<app>.+?)(?:\s+app)?$",
            extract_app,
        )
        .required(All(&["app"])),
        // Device controls
        PatternRule::builtin(
            "timer",
            "timer",
            r"\b(?:timer|countdown)\b",
            extract_timer,
        )
        .required(All(&["duration_seconds"])),
        PatternRule::builtin(
            "volume",
            "volume",
            r"\b(?:volume|sound|speaker|audio|awaz|awaaz|mute|unmute|louder|quieter|softer)\b",
            extract_volume,
        )
        .required(AnyOf(&["percent", "delta", "mute"])),
        PatternRule::builtin(
            "brightness",
            "brightness",
            r"\b(?:brightness|brighten|brighter|dim|dimmer|darker)\b",
            extract_brightness,
        )
        .required(All(&["level"])),
        PatternRule::builtin("wifi", "wifi", r"\b(?:wifi|wireless)\b", extract_state)
            .required(All(&["state"])),
        PatternRule::builtin("bluetooth", "bluetooth", r"\bbluetooth\b", extract_state)
            .required(All(&["state"])),
        PatternRule::builtin(
            "power",
            "power",
            r"\b(?:shut\s*down|restart|reboot|hibernate|sleep|lock\s+(?:the\s+|my\s+)?(?:pc|computer|system|screen|laptop))\b",
            extract_power,
        )
        .required(All(&["mode"])),
    ]
}

/// Trimmed cased text of a named capture
fn cased(caps: &Captures<'_>, name: &str, normalized: &Normalized) -> Option<String> {
    let m = caps.name(name)?;
    let text = normalized
        .cased_span(m.range())
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn insert_str(params: &mut Params, key: &str, value: Option<String>) {
    if let Some(value) = value {
        params.insert(key.to_string(), Value::String(value));
    }
}

fn no_params(_: &Captures<'_>, _: &Normalized) -> Params {
    Params::new()
}

fn extract_task_name(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    params.insert(
        "task_name".to_string(),
        Value::String(cased(caps, "name", n).unwrap_or_default()),
    );
    params
}

fn extract_task(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(&mut params, "task", cased(caps, "name", n));
    params
}

static SLOT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:,|\band\b|\s)\s*").expect("slot separator regex"));

fn extract_template_slots(caps: &Captures<'_>, _: &Normalized) -> Params {
    let slots: Vec<Value> = caps
        .name("slots")
        .map(|m| {
            SLOT_SEPARATOR
                .split(m.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty() && !matches!(*s, "the" | "and"))
                .map(|s| Value::String(s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let mut params = Params::new();
    params.insert("slots".to_string(), Value::Array(slots));
    params
}

fn extract_message(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(&mut params, "message", cased(caps, "message", n));
    insert_str(
        &mut params,
        "contact",
        cased(caps, "contact", n).map(|c| normalize_contact(&c)),
    );
    params
}

fn extract_call(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(
        &mut params,
        "contact",
        cased(caps, "contact", n).map(|c| normalize_contact(&c)),
    );
    if caps.name("video").is_some() {
        params.insert("video".to_string(), Value::Bool(true));
    }
    params
}

fn extract_search(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(&mut params, "query", cased(caps, "query", n));
    insert_str(&mut params, "site", caps.name("site").map(|m| m.as_str().to_string()));
    params
}

fn extract_reminder(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(&mut params, "text", cased(caps, "text", n));
    if let Some(delay) = caps.name("when").and_then(|m| find_duration(m.as_str())) {
        params.insert("delay_seconds".to_string(), number_value(delay));
    }
    params
}

fn extract_text(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(&mut params, "text", cased(caps, "text", n));
    params
}

fn extract_keys(caps: &Captures<'_>, _: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(
        &mut params,
        "keys",
        caps.name("keys").map(|m| m.as_str().trim().replace(' ', "")),
    );
    params
}

static REPEAT_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:repeat|repeats)\s*(?P<a>\d+)\b|\b(?P<b>\d+)\s*(?:times|x)\b").expect("repeat regex")
});

fn extract_hotkey_loop(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = extract_keys(caps, n);

    if let Some(every) = caps.name("every") {
        let unit = caps.name("unit").map(|u| u.as_str());
        let interval = parse_duration(every.as_str(), unit).or_else(|| parse_duration(every.as_str(), None));
        if let Some(interval) = interval {
            params.insert("interval_seconds".to_string(), number_value(interval));
        }
    }

    let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();
    if let Some(total) = find_duration(rest) {
        params.insert("duration_seconds".to_string(), number_value(total));
    }
    if let Some(count) = REPEAT_COUNT
        .captures(rest)
        .and_then(|c| c.name("a").or_else(|| c.name("b")))
        .and_then(|m| m.as_str().parse::<i64>().ok())
    {
        params.insert("repeat_count".to_string(), Value::from(count));
    }
    params
}

fn extract_song(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(&mut params, "song", cased(caps, "song", n));
    params
}

/// Canonical app name; unknown names are title-cased, placeholders kept
fn display_app(spoken: &str) -> String {
    if let Some(canonical) = canonical_app(spoken) {
        return canonical.to_string();
    }
    if is_anaphoric(spoken) || spoken.chars().any(char::is_uppercase) {
        return spoken.to_string();
    }
    spoken
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn extract_app(caps: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    insert_str(&mut params, "app", cased(caps, "app", n).map(|a| display_app(&a)));
    params
}

fn extract_url(caps: &Captures<'_>, _: &Normalized) -> Params {
    let mut params = Params::new();
    if let Some(m) = caps.name("url") {
        let url = m.as_str();
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };
        params.insert("url".to_string(), Value::String(url));
    }
    params
}

fn extract_timer(_: &Captures<'_>, n: &Normalized) -> Params {
    let mut params = Params::new();
    if let Some(seconds) = find_duration(n.text()) {
        params.insert("duration_seconds".to_string(), number_value(seconds));
    }
    params
}

static LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<n>\d{1,3})\b\s*(?:%|percent)?").expect("level regex"));
static BY_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bby\s+(?P<n>\d{1,3})\b").expect("by-amount regex"));
static MUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:mute|silent)\b").expect("mute regex"));
static UP_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:increase|raise|up|louder|brighter|brighten|badhao|badha|zyada)\b").expect("up regex")
});
static DOWN_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:decrease|lower|down|reduce|quieter|softer|dim|dimmer|darker|kam)\b").expect("down regex")
});

/// First 0-100 level spelled with digits, or a level word
fn extract_level(text: &str) -> Option<i64> {
    if let Some(n) = LEVEL
        .captures(text)
        .and_then(|c| c.name("n"))
        .and_then(|m| m.as_str().parse::<i64>().ok())
    {
        return Some(n.clamp(0, 100));
    }
    if text.contains("max") || text.contains("full") {
        Some(100)
    } else if text.contains("half") {
        Some(50)
    } else if text.contains("min") || text.contains("zero") {
        Some(0)
    } else {
        None
    }
}

fn extract_volume(_: &Captures<'_>, n: &Normalized) -> Params {
    let text = n.text();
    let mut params = Params::new();

    if text.contains("unmute") {
        params.insert("mute".to_string(), Value::Bool(false));
        return params;
    }
    if MUTE.is_match(text) {
        params.insert("mute".to_string(), Value::Bool(true));
        return params;
    }

    let step = BY_AMOUNT
        .captures(text)
        .and_then(|c| c.name("n"))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(10);
    if UP_WORDS.is_match(text) {
        params.insert("delta".to_string(), Value::from(step));
    } else if DOWN_WORDS.is_match(text) {
        params.insert("delta".to_string(), Value::from(-step));
    } else if let Some(level) = extract_level(text) {
        params.insert("percent".to_string(), Value::from(level));
    }
    params
}

fn extract_brightness(_: &Captures<'_>, n: &Normalized) -> Params {
    let text = n.text();
    let level = extract_level(text).or_else(|| {
        if UP_WORDS.is_match(text) {
            Some(80)
        } else if DOWN_WORDS.is_match(text) {
            Some(30)
        } else {
            None
        }
    });

    let mut params = Params::new();
    if let Some(level) = level {
        params.insert("level".to_string(), Value::from(level));
    }
    params
}

static STATE_OFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:turn|switch)\b.{0,20}\boff\b|\b(?:off|disable|deactivate|disconnect)\b").expect("off regex")
});
static STATE_ON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:turn|switch)\b.{0,20}\bon\b|\b(?:on|enable|activate|connect)\b").expect("on regex")
});
static STATE_TOGGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:toggle|flip)\b").expect("toggle regex"));

fn extract_state(_: &Captures<'_>, n: &Normalized) -> Params {
    let text = n.text();
    let state = if STATE_OFF.is_match(text) {
        Some("off")
    } else if STATE_ON.is_match(text) {
        Some("on")
    } else if STATE_TOGGLE.is_match(text) {
        Some("toggle")
    } else {
        None
    };

    let mut params = Params::new();
    insert_str(&mut params, "state", state.map(str::to_string));
    params
}

fn extract_power(_: &Captures<'_>, n: &Normalized) -> Params {
    let text = n.text();
    let mode = if text.contains("restart") || text.contains("reboot") {
        "restart"
    } else if text.contains("hibernate") {
        "hibernate"
    } else if text.contains("sleep") {
        "sleep"
    } else if text.contains("lock") {
        "lock"
    } else {
        "shutdown"
    };

    let mut params = Params::new();
    params.insert("mode".to_string(), Value::String(mode.to_string()));
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlu::normalizer::normalize;
    use serde_json::json;

    fn hit(text: &str) -> RuleMatch {
        PatternRules::builtin()
            .match_first(&normalize(text))
            .unwrap_or_else(|| panic!("no rule matched '{}'", text))
    }

    #[test]
    fn test_whatsapp_send_keeps_casing() {
        let m = hit("send hi to Mom");
        assert_eq!(m.action_type, "whatsapp_send");
        assert_eq!(m.params["message"], json!("hi"));
        assert_eq!(m.params["contact"], json!("Mom"));
        assert_eq!(m.fan_out, Some("contact"));
        assert!(m.required.missing(&m.params).is_empty());
    }

    #[test]
    fn test_hinglish_send() {
        let m = hit("bhej hello papa ko");
        assert_eq!(m.action_type, "whatsapp_send");
        assert_eq!(m.params["contact"], json!("Papa"));
        assert_eq!(m.params["message"], json!("hello"));
    }

    #[test]
    fn test_call_with_pronoun() {
        let m = hit("call him");
        assert_eq!(m.action_type, "whatsapp_call");
        assert_eq!(m.params["contact"], json!("him"));
    }

    #[test]
    fn test_teaching_controls() {
        let m = hit("start teaching open_excel");
        assert_eq!(m.action_type, action::START_TEACHING);
        assert_eq!(m.params["task_name"], json!("open_excel"));

        let m = hit("stop teaching with contact and message");
        assert_eq!(m.action_type, action::STOP_TEACHING);
        assert_eq!(m.params["slots"], json!(["contact", "message"]));

        let m = hit("do the task greet with contact Dad");
        assert_eq!(m.action_type, action::DO_LEARNED_TASK);
        assert_eq!(m.params["task"], json!("greet"));

        assert_eq!(hit("list my tasks").action_type, action::LIST_LEARNED_TASKS);
        assert_eq!(hit("forget the task greet").params["task"], json!("greet"));
    }

    #[test]
    fn test_cancel_is_exact() {
        assert_eq!(hit("stop").action_type, action::CANCEL);
        assert_eq!(hit("never mind").action_type, action::CANCEL);
        assert_eq!(hit("stop the music").action_type, "stop_music");
    }

    #[test]
    fn test_media_rules() {
        assert_eq!(hit("play next song").action_type, "next_song");
        assert_eq!(hit("play some music").action_type, "spotify_play");
        let m = hit("play Tum Hi Ho on spotify");
        assert_eq!(m.action_type, "play_song");
        assert_eq!(m.params["song"], json!("Tum Hi Ho"));
    }

    #[test]
    fn test_apps_and_urls() {
        assert_eq!(hit("open excel").params["app"], json!("Excel"));
        assert_eq!(hit("open calculator").params["app"], json!("calc.exe"));
        assert_eq!(hit("open my budget").params["app"], json!("My Budget"));
        let m = hit("open github.com");
        assert_eq!(m.action_type, "open_url");
        assert_eq!(m.params["url"], json!("https://github.com"));
        assert_eq!(hit("close it").params["app"], json!("it"));
    }

    #[test]
    fn test_volume_variants() {
        assert_eq!(hit("set volume to 50").params["percent"], json!(50));
        assert_eq!(hit("mute").params["mute"], json!(true));
        assert_eq!(hit("unmute the sound").params["mute"], json!(false));
        assert_eq!(hit("increase volume by 20").params["delta"], json!(20));
        assert_eq!(hit("volume down").params["delta"], json!(-10));

        let m = hit("set the volume to fifty");
        assert_eq!(m.action_type, "volume");
        assert_eq!(m.required.missing(&m.params), vec!["percent".to_string()]);
    }

    #[test]
    fn test_radio_states() {
        assert_eq!(hit("turn on bluetooth").params["state"], json!("on"));
        assert_eq!(hit("wifi turn off").params["state"], json!("off"));
        assert_eq!(hit("toggle wifi").params["state"], json!("toggle"));
    }

    #[test]
    fn test_free_text_beats_device_keywords() {
        let m = hit("search how to turn on wifi");
        assert_eq!(m.action_type, "search");
        assert_eq!(m.params["query"], json!("how to turn on wifi"));
    }

    #[test]
    fn test_hotkey_loop() {
        let m = hit("press ctrl+s every 5 seconds for 1 minute");
        assert_eq!(m.action_type, "hotkey_loop");
        assert_eq!(m.params["keys"], json!("ctrl+s"));
        assert_eq!(m.params["interval_seconds"], json!(5));
        assert_eq!(m.params["duration_seconds"], json!(60));

        let m = hit("press f5 every 2s 3 times");
        assert_eq!(m.params["interval_seconds"], json!(2));
        assert_eq!(m.params["repeat_count"], json!(3));
    }

    #[test]
    fn test_timer_and_reminder() {
        assert_eq!(hit("set a timer for 5 minutes").params["duration_seconds"], json!(300));
        let m = hit("set a timer");
        assert_eq!(m.required.missing(&m.params), vec!["duration_seconds".to_string()]);

        let m = hit("remind me to call mom in 10 minutes");
        assert_eq!(m.params["text"], json!("call mom"));
        assert_eq!(m.params["delay_seconds"], json!(600));
    }

    #[test]
    fn test_power_modes() {
        assert_eq!(hit("lock the screen").params["mode"], json!("lock"));
        assert_eq!(hit("shutdown the computer").params["mode"], json!("shutdown"));
        assert_eq!(hit("reboot").params["mode"], json!("restart"));
    }

    #[test]
    fn test_unmatched() {
        assert!(PatternRules::builtin().match_first(&normalize("what a lovely day")).is_none());
    }

    #[test]
    fn test_custom_rules_first() {
        let custom = vec![RuleConfig {
            trigger: "work setup".to_string(),
            action: "launch_app".to_string(),
            params: crate::types::params([("app", "Slack")]),
        }];
        let rules = PatternRules::with_custom(&custom).unwrap();
        let m = rules.match_first(&normalize("open my work setup")).unwrap();
        assert_eq!(m.rule, "custom:work setup");
        assert_eq!(m.params["app"], json!("Slack"));
        assert_eq!(rules.len(), PatternRules::builtin().len() + 1);
    }

    #[test]
    fn test_custom_rule_validation() {
        let bad = RuleConfig {
            trigger: "  ".to_string(),
            action: "x".to_string(),
            params: Params::new(),
        };
        assert!(PatternRules::with_custom(&[bad]).is_err());
    }

    #[test]
    fn test_required_any_of() {
        let required = Required::AnyOf(&["percent", "delta"]);
        assert!(required.missing(&crate::types::params([("delta", 5)])).is_empty());
        assert_eq!(required.missing(&Params::new()), vec!["percent".to_string()]);
    }

    #[test]
    fn test_action_types_unique() {
        let types = PatternRules::builtin().action_types();
        assert_eq!(types.iter().filter(|t| *t == "whatsapp_send").count(), 1);
        assert!(types.contains(&"hotkey_loop".to_string()));
    }
}
