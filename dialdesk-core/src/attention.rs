//! Attention records: one logged voicebot interaction per table row.
//!
//! Server payloads are validated against the typed shape first. When that
//! fails the record is rebuilt field by field with lenient coercions so a
//! single malformed field never drops the row.

use crate::agent::sanitize_extension;
use crate::case_type::{normalize_case_type, CaseType};
use crate::transcript::{normalize_transcript, TranscriptMessage};
use crate::EMPTY_CELL;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row of the attention table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionRecord {
    pub id: i64,
    #[serde(default)]
    pub id_dialvox_: Option<i64>,
    #[serde(default)]
    pub id_llamada: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default)]
    pub extension: Option<i64>,
    #[serde(default)]
    pub nombre_cliente: Option<String>,
    #[serde(default)]
    pub empresa_cliente: Option<String>,
    #[serde(default)]
    pub correo_cliente: Option<String>,
    #[serde(default)]
    pub numero_caso: Option<String>,
    #[serde(default)]
    pub estado_caso: Option<String>,
    #[serde(default)]
    pub tipo_solicitud: Option<String>,
    #[serde(default)]
    pub es_vip: Option<bool>,
    #[serde(default)]
    pub en_horario: Option<bool>,
    #[serde(default)]
    pub extracted_variables: Option<Value>,
    #[serde(default)]
    pub transcript: Option<Value>,
    #[serde(default)]
    pub transcript_text: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub ticket_ivanti: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
    /// Every field the typed shape does not name, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of validating one server item.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub record: AttentionRecord,
    /// `false` when the strict shape was rejected and coercion was used.
    pub schema_valid: bool,
    /// Why strict validation failed, when it did.
    pub issue: Option<String>,
}

impl AttentionRecord {
    /// Validate a raw server item, falling back to best-effort coercion.
    pub fn from_wire(value: Value) -> ValidatedRecord {
        match serde_json::from_value::<AttentionRecord>(value.clone()) {
            Ok(mut record) => {
                record.extension = record.extension.and_then(sanitize_extension);
                ValidatedRecord {
                    record,
                    schema_valid: true,
                    issue: None,
                }
            }
            Err(err) => ValidatedRecord {
                record: Self::coerce(value),
                schema_valid: false,
                issue: Some(err.to_string()),
            },
        }
    }

    /// Rebuild a record from an arbitrary value without failing.
    ///
    /// `id` is forced to a number (0 when it cannot be read); every other
    /// known field is coerced leniently and unknown fields land in `extra`.
    pub fn coerce(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        let mut take = |key: &str| map.remove(key).filter(|v| !v.is_null());

        let id = take("id").as_ref().and_then(lenient_i64).unwrap_or(0);
        let id_dialvox_ = take("id_dialvox_").as_ref().and_then(lenient_i64);
        let id_llamada = take("id_llamada").as_ref().and_then(lenient_string);
        let phone = take("phone").as_ref().and_then(lenient_string);
        let duration_sec = take("duration_sec").as_ref().and_then(lenient_f64);
        let extension = take("extension").as_ref().and_then(coerce_extension);
        let nombre_cliente = take("nombre_cliente").as_ref().and_then(lenient_string);
        let empresa_cliente = take("empresa_cliente").as_ref().and_then(lenient_string);
        let correo_cliente = take("correo_cliente").as_ref().and_then(lenient_string);
        let numero_caso = take("numero_caso").as_ref().and_then(lenient_string);
        let estado_caso = take("estado_caso").as_ref().and_then(lenient_string);
        let tipo_solicitud = take("tipo_solicitud").as_ref().and_then(lenient_string);
        let es_vip = take("es_vip").as_ref().and_then(lenient_bool);
        let en_horario = take("en_horario").as_ref().and_then(lenient_bool);
        let extracted_variables = take("extracted_variables");
        let transcript = take("transcript");
        let transcript_text = take("transcript_text").as_ref().and_then(lenient_string);
        let recording_url = take("recording_url").as_ref().and_then(lenient_string);
        let ticket_ivanti = take("ticket_ivanti").as_ref().and_then(lenient_string);
        let created_at = take("created_at")
            .as_ref()
            .and_then(lenient_string)
            .unwrap_or_default();
        let updated_at = take("updated_at").as_ref().and_then(lenient_string);
        let started_at = take("started_at").as_ref().and_then(lenient_string);
        let ended_at = take("ended_at").as_ref().and_then(lenient_string);

        Self {
            id,
            id_dialvox_,
            id_llamada,
            phone,
            duration_sec,
            extension,
            nombre_cliente,
            empresa_cliente,
            correo_cliente,
            numero_caso,
            estado_caso,
            tipo_solicitud,
            es_vip,
            en_horario,
            extracted_variables,
            transcript,
            transcript_text,
            recording_url,
            ticket_ivanti,
            created_at,
            updated_at,
            started_at,
            ended_at,
            extra: map,
        }
    }

    /// The correlation id linking this row to its case detail record.
    pub fn correlation_id(&self) -> Option<i64> {
        self.id_dialvox_
    }

    pub fn case_type(&self) -> CaseType {
        normalize_case_type(self.tipo_solicitud.as_deref())
    }

    /// Label of the "Id atención" cell.
    pub fn header_text(&self) -> String {
        match (self.id_dialvox_, self.id_llamada.as_deref()) {
            (Some(id), _) => id.to_string(),
            (None, Some(call)) if !call.is_empty() => call.to_string(),
            _ => EMPTY_CELL.to_string(),
        }
    }

    /// Transcript payload nested under `body.transcript.transcript`.
    pub fn nested_transcript(&self) -> Option<&Value> {
        self.extra
            .get("body")
            .and_then(|body| body.get("transcript"))
            .and_then(|t| t.get("transcript"))
            .filter(|v| !v.is_null())
    }

    pub fn has_transcript(&self) -> bool {
        self.transcript.as_ref().is_some_and(is_truthy)
            || self.nested_transcript().is_some_and(is_truthy)
            || self.transcript_text.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Chat messages from whichever transcript shape the record carries.
    pub fn transcript_messages(&self) -> Vec<TranscriptMessage> {
        let raw = self
            .transcript
            .as_ref()
            .or_else(|| self.nested_transcript())
            .cloned()
            .or_else(|| self.transcript_text.clone().map(Value::String));
        normalize_transcript(raw.as_ref(), self.transcript_text.as_deref())
    }

    /// Extracted variables as a JSON object, parsing JSON-encoded strings.
    ///
    /// Empty objects and non-object payloads yield `None`.
    pub fn extracted_variables(&self) -> Option<Map<String, Value>> {
        let object = match self.extracted_variables.as_ref()? {
            Value::Object(map) => map.clone(),
            Value::String(s) if !s.is_empty() => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => map,
                _ => return None,
            },
            _ => return None,
        };
        if object.is_empty() {
            None
        } else {
            Some(object)
        }
    }

    pub fn duration_label(&self) -> String {
        seconds_to_hms(self.duration_sec)
    }
}

/// Coerce a raw extension value to `None`, `Some(-1)` or `Some(positive)`.
///
/// Numeric strings are accepted; anything else becomes `None`.
pub fn coerce_extension(value: &Value) -> Option<i64> {
    lenient_i64(value).and_then(sanitize_extension)
}

/// Render seconds as `h:mm:ss` or `m:ss`.
pub fn seconds_to_hms(total: Option<f64>) -> String {
    let secs = total
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| s.trunc() as u64)
        .unwrap_or(0);
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "si" | "sí" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
