//! Transcript normalization for the three payload shapes a record can carry.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static SPEAKER_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(bot|human)\s*:").expect("speaker marker regex is valid")
});

/// One chat message in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub text: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl TranscriptMessage {
    fn spoken(sender: &str, text: &str) -> Self {
        Self {
            text: text.to_string(),
            sender: Some(sender.to_string()),
            timestamp: None,
        }
    }

    pub fn speaker(&self) -> Speaker {
        match self.sender.as_deref().map(str::to_lowercase).as_deref() {
            Some("bot") | Some("assistant") => Speaker::Bot,
            _ => Speaker::Customer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Bot,
    Customer,
}

/// A render-ready transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
    /// `mm:ss.d` offset from the first timestamped message.
    pub offset: Option<String>,
}

/// Split a flat `bot: ... human: ...` transcript into messages.
///
/// Text before the first marker is discarded. A non-empty string without any
/// marker becomes a single customer message.
pub fn parse_flat_transcript(s: &str) -> Vec<TranscriptMessage> {
    if s.is_empty() {
        return Vec::new();
    }

    let markers: Vec<_> = SPEAKER_MARKER.captures_iter(s).collect();
    let mut out = Vec::new();
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(role)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(s.len());
        let text = s[whole.end()..end].trim();
        if !text.is_empty() {
            out.push(TranscriptMessage::spoken(&role.as_str().to_lowercase(), text));
        }
    }

    if out.is_empty() {
        out.push(TranscriptMessage::spoken("human", s));
    }
    out
}

/// Normalize any supported transcript shape into messages.
///
/// Order: object with an array `transcript`, bare array, flat string, then
/// the `fallback_text` flat string.
pub fn normalize_transcript(
    value: Option<&Value>,
    fallback_text: Option<&str>,
) -> Vec<TranscriptMessage> {
    match value {
        Some(Value::Object(obj)) if matches!(obj.get("transcript"), Some(Value::Array(_))) => {
            match obj.get("transcript") {
                Some(Value::Array(items)) => messages_from_array(items),
                _ => Vec::new(),
            }
        }
        Some(Value::Array(items)) => messages_from_array(items),
        Some(Value::String(s)) => parse_flat_transcript(s),
        _ => fallback_text.map(parse_flat_transcript).unwrap_or_default(),
    }
}

fn messages_from_array(items: &[Value]) -> Vec<TranscriptMessage> {
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<TranscriptMessage>(item.clone()).ok())
        .collect()
}

/// Interpret a timestamp as milliseconds; values above 1e12 already are.
fn to_ms(ts: &Value) -> Option<f64> {
    let n = match ts {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(if n > 1e12 { n } else { n * 1000.0 })
}

/// Format a millisecond offset as `mm:ss.d`.
pub fn format_timecode(ms_from_start: f64) -> String {
    let total = (ms_from_start / 1000.0).max(0.0);
    let m = (total / 60.0).floor() as u64;
    let s = (total % 60.0).floor() as u64;
    let d = ((total - total.floor()) * 10.0).floor() as u64;
    format!("{m:02}:{s:02}.{d}")
}

/// Attach speaker roles and relative offsets to messages.
pub fn transcript_lines(messages: &[TranscriptMessage]) -> Vec<TranscriptLine> {
    let first_ms = messages
        .iter()
        .filter_map(|m| m.timestamp.as_ref().and_then(to_ms))
        .fold(None, |acc: Option<f64>, ms| Some(acc.map_or(ms, |a| a.min(ms))));

    messages
        .iter()
        .map(|m| {
            let offset = match (first_ms, m.timestamp.as_ref().and_then(to_ms)) {
                (Some(first), Some(ms)) => Some(format_timecode((ms - first).max(0.0))),
                _ => None,
            };
            TranscriptLine {
                speaker: m.speaker(),
                text: m.text.clone(),
                offset,
            }
        })
        .collect()
}
