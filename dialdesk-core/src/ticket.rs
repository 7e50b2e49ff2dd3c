//! Case detail records and the patch payloads built from them.

use crate::error::CaseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Detail payload of one case, keyed by `id_dialvox_`.
///
/// The record is kept as an open JSON object so fields this client does not
/// know about survive a read-modify-patch cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketRecord(Map<String, Value>);

impl TicketRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// String view of a field; numbers and booleans are rendered.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// First present text among `keys`, in order.
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.text(k))
    }

    pub fn correlation_id(&self) -> Option<i64> {
        match self.get("id_dialvox_")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// External ticket reference: `ticket`, else `ticket_number`.
    pub fn ticket_reference(&self) -> Option<String> {
        self.get("ticket")
            .and_then(reference_from_value)
            .or_else(|| self.get("ticket_number").and_then(reference_from_value))
    }
}

/// Render a ticket reference value; blank strings count as absent.
pub fn reference_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Field edits made in a detail view, keyed by backend field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditSet(BTreeMap<String, Value>);

impl EditSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Drop edits whose value equals what `original` already holds.
    ///
    /// A `null` edit of a missing field is also a no-op.
    pub fn changes_from(&self, original: &TicketRecord) -> EditSet {
        EditSet(
            self.0
                .iter()
                .filter(|(field, value)| match original.fields().get(field.as_str()) {
                    Some(current) => current != *value,
                    None => !value.is_null(),
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Full patch payload: the original record overlaid with the edits.
    ///
    /// Fails with [`CaseError::NoChanges`] when no edit changes anything.
    pub fn build_patch(&self, original: &TicketRecord) -> Result<TicketRecord, CaseError> {
        let changes = self.changes_from(original);
        if changes.is_empty() {
            return Err(CaseError::NoChanges);
        }
        let mut merged = original.fields().clone();
        for (field, value) in changes.0 {
            merged.insert(field, value);
        }
        Ok(TicketRecord(merged))
    }
}

/// Body of the forward-to-ITSM call: the correlation id and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub id_dialvox_: i64,
}

/// Response of the forward-to-ITSM call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardResponse {
    #[serde(default)]
    pub ticket: Option<Value>,
    #[serde(default)]
    pub ticket_number: Option<Value>,
}

impl ForwardResponse {
    pub fn ticket_reference(&self) -> Option<String> {
        self.ticket
            .as_ref()
            .and_then(reference_from_value)
            .or_else(|| self.ticket_number.as_ref().and_then(reference_from_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> TicketRecord {
        serde_json::from_value(json!({
            "id_dialvox_": 9001,
            "status": "Abierto",
            "subject": "PBX caída",
            "owner_team": "Gestores Nivel 1",
            "server_only": { "sla": 4 }
        }))
        .unwrap()
    }

    #[test]
    fn patch_merges_edits_over_original() {
        let edits = EditSet::new().with("status", "Cerrado");
        let patch = edits.build_patch(&record()).unwrap();
        assert_eq!(patch.text("status").as_deref(), Some("Cerrado"));
        assert_eq!(patch.text("subject").as_deref(), Some("PBX caída"));
        assert_eq!(patch.get("server_only"), Some(&json!({ "sla": 4 })));
        assert_eq!(patch.correlation_id(), Some(9001));
    }

    #[test]
    fn empty_edit_set_is_rejected() {
        assert_eq!(EditSet::new().build_patch(&record()), Err(CaseError::NoChanges));
    }

    #[test]
    fn unchanged_edits_count_as_no_changes() {
        let edits = EditSet::new()
            .with("status", "Abierto")
            .with("missing_field", Value::Null);
        assert!(edits.changes_from(&record()).is_empty());
        assert_eq!(edits.build_patch(&record()), Err(CaseError::NoChanges));
    }

    #[test]
    fn new_fields_are_changes() {
        let edits = EditSet::new().with("impact", "Alto");
        assert_eq!(edits.changes_from(&record()).len(), 1);
    }

    #[test]
    fn ticket_reference_prefers_ticket() {
        let rec: TicketRecord = serde_json::from_value(json!({
            "ticket": "INC-77", "ticket_number": 12
        }))
        .unwrap();
        assert_eq!(rec.ticket_reference().as_deref(), Some("INC-77"));

        let rec: TicketRecord = serde_json::from_value(json!({
            "ticket": "  ", "ticket_number": 12
        }))
        .unwrap();
        assert_eq!(rec.ticket_reference().as_deref(), Some("12"));
        assert_eq!(record().ticket_reference(), None);
    }

    #[test]
    fn forward_request_carries_only_the_id() {
        let body = serde_json::to_value(ForwardRequest { id_dialvox_: 5 }).unwrap();
        assert_eq!(body, json!({ "id_dialvox_": 5 }));
    }

    #[test]
    fn forward_response_reference() {
        let resp: ForwardResponse =
            serde_json::from_value(json!({ "ticket_number": "REQ-1" })).unwrap();
        assert_eq!(resp.ticket_reference().as_deref(), Some("REQ-1"));
        assert_eq!(ForwardResponse::default().ticket_reference(), None);
    }
}
