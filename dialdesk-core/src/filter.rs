//! Client-side column filter predicates.
//!
//! These run over the already-fetched page only and never trigger a refetch.
//! Every predicate is a plain function of its inputs.

use crate::attention::AttentionRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive date range over ISO-8601 bounds. Blank bounds mean no bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl DateRange {
    pub fn new(from: Option<&str>, to: Option<&str>) -> Self {
        Self {
            from: non_blank(from).map(str::to_string),
            to: non_blank(to).map(str::to_string),
        }
    }

    pub fn from_bound(&self) -> Option<&str> {
        non_blank(self.from.as_deref())
    }

    pub fn to_bound(&self) -> Option<&str> {
        non_blank(self.to.as_deref())
    }

    pub fn is_unbounded(&self) -> bool {
        self.from_bound().is_none() && self.to_bound().is_none()
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| !s.trim().is_empty())
}

/// Tri-state boolean filter value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    #[default]
    All,
    True,
    False,
}

impl TriState {
    /// Parse `"all" | "true" | "false"`; anything else is `All`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => TriState::True,
            "false" => TriState::False,
            _ => TriState::All,
        }
    }
}

/// Parse a timestamp the way the backend emits them.
///
/// RFC 3339 first, then naive date-times and plain dates read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Date-range predicate: unbounded passes, unparsable cells fail.
pub fn date_range_matches(cell: Option<&str>, range: &DateRange) -> bool {
    if range.is_unbounded() {
        return true;
    }
    let Some(ts) = cell.and_then(parse_timestamp) else {
        return false;
    };
    let from_ok = match range.from_bound() {
        Some(from) => parse_timestamp(from).is_some_and(|bound| ts >= bound),
        None => true,
    };
    let to_ok = match range.to_bound() {
        Some(to) => parse_timestamp(to).is_some_and(|bound| ts <= bound),
        None => true,
    };
    from_ok && to_ok
}

/// Tri-state predicate over a nullable boolean cell.
pub fn tri_state_matches(cell: Option<bool>, filter: TriState) -> bool {
    let value = cell.unwrap_or(false);
    match filter {
        TriState::All => true,
        TriState::True => value,
        TriState::False => !value,
    }
}

/// Substring predicate; an empty needle passes everything.
pub fn search_matches(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.contains(&needle.to_lowercase())
}

/// Lower-cased text of the hidden `search` column.
pub fn search_text(record: &AttentionRecord) -> String {
    // Only the correlation id is shown, so only it is searchable.
    let id = record.id_dialvox_.map(|id| id.to_string());
    let vars = match record.extracted_variables.as_ref() {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    [
        id,
        record.id_llamada.clone(),
        record.phone.clone(),
        record.nombre_cliente.clone(),
        record.tipo_solicitud.clone(),
        record.empresa_cliente.clone(),
        record.transcript_text.clone(),
        Some(vars),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

/// The full set of column-local filters bound to the table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFilters {
    #[serde(default)]
    pub started_at: DateRange,
    #[serde(default)]
    pub es_vip: TriState,
    #[serde(default)]
    pub en_horario: TriState,
    #[serde(default)]
    pub search: String,
}

impl ColumnFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.started_at.is_unbounded()
            && self.es_vip == TriState::All
            && self.en_horario == TriState::All
            && self.search.is_empty()
    }

    /// Apply every column filter to one record. `search_haystack` is the
    /// precomputed [`search_text`] of the same record.
    pub fn matches(&self, record: &AttentionRecord, search_haystack: &str) -> bool {
        date_range_matches(record.started_at.as_deref(), &self.started_at)
            && tri_state_matches(record.es_vip, self.es_vip)
            && tri_state_matches(record.en_horario, self.en_horario)
            && search_matches(search_haystack, &self.search)
    }
}
