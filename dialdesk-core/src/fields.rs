//! Field-shape adapter: the normalized classification view of a case record.
//!
//! Backend payloads spell the same concept several ways (`service` vs
//! `r_service`, `subject` vs `asunto`) and carry free-form values. The
//! adapter snaps them onto the option lists of each case kind so a detail
//! view always starts from a valid selection.

use crate::case_type::CaseKind;
use crate::ticket::{EditSet, TicketRecord};
use serde::{Deserialize, Serialize};

/// Option lists offered by one case kind. Empty lists mean free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOptions {
    pub servicio: &'static [&'static str],
    pub categoria: &'static [&'static str],
    pub subcategoria: &'static [&'static str],
    pub estado: &'static [&'static str],
    pub equipo: &'static [&'static str],
    pub urgencia: &'static [&'static str],
    pub impacto: &'static [&'static str],
}

const LEVELS: &[&str] = &["Bajo", "Medio", "Alto"];

const INCIDENT_OPTIONS: FieldOptions = FieldOptions {
    servicio: &["Comunicaciones Avanzadas", "Correo", "Infraestructura"],
    categoria: &["IPPBX", "NGFW", "Servidores"],
    subcategoria: &["IPPBX", "Otros"],
    estado: &["Abierto", "En Progreso", "Cerrado"],
    equipo: &["Gestores Nivel 1", "Gestores Nivel 2"],
    urgencia: LEVELS,
    impacto: LEVELS,
};

const REQUEST_OPTIONS: FieldOptions = FieldOptions {
    servicio: &["Configuraciones NGFW", "Soporte NGFW", "Altas/Bajas"],
    categoria: &[],
    subcategoria: &[],
    estado: &["Abierto", "Cerrado"],
    equipo: &["Gestores Nivel 1", "Gestores Nivel 2"],
    urgencia: LEVELS,
    impacto: LEVELS,
};

const FPQRS_OPTIONS: FieldOptions = FieldOptions {
    servicio: &[],
    categoria: &[],
    subcategoria: &[],
    estado: &["Abierto", "En Progreso", "Cerrado"],
    equipo: &["Gestores Nivel 1", "Gestores Nivel 2"],
    urgencia: LEVELS,
    impacto: LEVELS,
};

impl CaseKind {
    pub fn options(self) -> &'static FieldOptions {
        match self {
            CaseKind::Incident => &INCIDENT_OPTIONS,
            CaseKind::Request => &REQUEST_OPTIONS,
            CaseKind::Fpqrs => &FPQRS_OPTIONS,
        }
    }
}

/// Normalized, editable classification fields of a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFields {
    pub servicio: String,
    pub categoria: String,
    pub subcategoria: String,
    pub detalle: String,
    pub estado: String,
    pub equipo: String,
    pub urgencia: String,
    pub impacto: String,
    pub prioridad: String,
    pub resumen: String,
    pub descripcion: String,
    pub vip: bool,
}

impl CaseFields {
    /// Derive the normalized view of `record` for `kind`.
    pub fn derive(kind: CaseKind, record: &TicketRecord) -> Self {
        let opts = kind.options();
        let urgencia = snap(
            record.first_text(&["urgency", "priority"]).as_deref(),
            opts.urgencia,
            "Medio",
        );
        let impacto = snap(record.text("impact").as_deref(), opts.impacto, "Medio");
        let prioridad = record
            .first_text(&["priority", "prioridad"])
            .unwrap_or_else(|| {
                match urgencia.as_str() {
                    "Alto" => "1",
                    "Medio" => "2",
                    _ => "3",
                }
                .to_string()
            });

        Self {
            servicio: snap_title(
                record.first_text(&["r_service", "service"]).as_deref(),
                opts.servicio,
            ),
            categoria: snap_title(record.text("category").as_deref(), opts.categoria),
            subcategoria: snap_title(record.text("subcategory").as_deref(), opts.subcategoria),
            detalle: record.text("detalle").unwrap_or_default(),
            estado: snap(
                Some(map_status(record.text("status").as_deref())),
                opts.estado,
                "Abierto",
            ),
            equipo: snap_title(record.text("owner_team").as_deref(), opts.equipo),
            urgencia,
            impacto,
            prioridad,
            resumen: record.first_text(&["asunto", "subject"]).unwrap_or_default(),
            descripcion: record.text("symptom").unwrap_or_default(),
            vip: matches!(record.get("is_vip"), Some(serde_json::Value::Bool(true))),
        }
    }

    /// Edits expressed with backend field names, ready for a patch.
    pub fn to_edits(&self) -> EditSet {
        EditSet::new()
            .with("service", self.servicio.clone())
            .with("category", self.categoria.clone())
            .with("subcategory", self.subcategoria.clone())
            .with("detalle", self.detalle.clone())
            .with("status", self.estado.clone())
            .with("owner_team", self.equipo.clone())
            .with("urgency", self.urgencia.clone())
            .with("impact", self.impacto.clone())
            .with("priority", self.prioridad.clone())
            .with("subject", self.resumen.clone())
            .with("symptom", self.descripcion.clone())
            .with("is_vip", self.vip)
    }
}

/// Map free-form backend status text onto the console's three states.
fn map_status(status: Option<&str>) -> &'static str {
    let v = status.unwrap_or_default().to_lowercase();
    if v.contains("active") || v.contains("open") || v.contains("abierto") {
        "Abierto"
    } else if v.contains("progress") || v.contains("en progreso") {
        "En Progreso"
    } else if v.contains("closed") || v.contains("cerrado") {
        "Cerrado"
    } else {
        "Abierto"
    }
}

fn to_title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// Case-insensitive match against `options`, else `fallback`.
///
/// With no options the trimmed value is kept as free text.
fn snap(value: Option<&str>, options: &[&str], fallback: &str) -> String {
    let value = value.map(str::trim).filter(|v| !v.is_empty());
    if options.is_empty() {
        return value.unwrap_or_default().to_string();
    }
    let Some(value) = value else {
        return fallback.to_string();
    };
    options
        .iter()
        .find(|o| o.eq_ignore_ascii_case(value) || o.to_lowercase() == value.to_lowercase())
        .map(|o| o.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn snap_title(value: Option<&str>, options: &[&str]) -> String {
    let fallback = options.first().copied().unwrap_or_default();
    snap(value.map(to_title).as_deref(), options, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> TicketRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn derive_snaps_to_incident_options() {
        let rec = record(json!({
            "r_service": "CORREO",
            "category": "ngfw",
            "status": "in progress",
            "owner_team": "gestores nivel 2",
            "urgency": "alto",
            "subject": "Caída",
            "symptom": "No hay tono",
        }));
        let fields = CaseFields::derive(CaseKind::Incident, &rec);
        assert_eq!(fields.servicio, "Correo");
        assert_eq!(fields.categoria, "NGFW");
        assert_eq!(fields.subcategoria, "IPPBX");
        assert_eq!(fields.estado, "En Progreso");
        assert_eq!(fields.equipo, "Gestores Nivel 2");
        assert_eq!(fields.urgencia, "Alto");
        assert_eq!(fields.impacto, "Medio");
        assert_eq!(fields.prioridad, "1");
        assert_eq!(fields.resumen, "Caída");
        assert_eq!(fields.descripcion, "No hay tono");
    }

    #[test]
    fn unknown_values_fall_back_to_defaults() {
        let fields = CaseFields::derive(CaseKind::Incident, &record(json!({ "status": "weird" })));
        assert_eq!(fields.servicio, "Comunicaciones Avanzadas");
        assert_eq!(fields.estado, "Abierto");
        assert_eq!(fields.prioridad, "2");
    }

    #[test]
    fn request_kind_keeps_free_text_category() {
        let rec = record(json!({ "category": "Licencias", "status": "closed" }));
        let fields = CaseFields::derive(CaseKind::Request, &rec);
        assert_eq!(fields.categoria, "Licencias");
        assert_eq!(fields.estado, "Cerrado");
    }

    #[test]
    fn edits_use_backend_names() {
        let fields = CaseFields::derive(CaseKind::Fpqrs, &record(json!({ "is_vip": true })));
        let edits = fields.to_edits();
        assert_eq!(edits.get("status"), Some(&json!("Abierto")));
        assert_eq!(edits.get("is_vip"), Some(&json!(true)));
        assert!(edits.get("estado").is_none());
    }

    #[test]
    fn title_case_matches_source_behaviour() {
        assert_eq!(to_title("comunicaciones avanzadas"), "Comunicaciones Avanzadas");
        assert_eq!(to_title("ALTAS/BAJAS"), "Altas/Bajas");
    }
}
