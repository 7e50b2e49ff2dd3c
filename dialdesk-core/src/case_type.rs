//! Case type tags and the case kinds that own a detail controller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of case types a free-form `tipo_solicitud` normalizes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseType {
    #[serde(rename = "Incidente")]
    Incidente,
    #[serde(rename = "Requerimiento")]
    Requerimiento,
    #[serde(rename = "Consulta de caso")]
    ConsultaDeCaso,
    #[serde(rename = "fpqrs")]
    Fpqrs,
    #[serde(rename = "none")]
    Unclassified,
}

impl CaseType {
    pub fn label(self) -> &'static str {
        match self {
            CaseType::Incidente => "Incidente",
            CaseType::Requerimiento => "Requerimiento",
            CaseType::ConsultaDeCaso => "Consulta de caso",
            CaseType::Fpqrs => "fpqrs",
            CaseType::Unclassified => "none",
        }
    }

    /// The detail controller kind for this tag, if it has one.
    pub fn kind(self) -> Option<CaseKind> {
        match self {
            CaseType::Incidente => Some(CaseKind::Incident),
            CaseType::Requerimiento => Some(CaseKind::Request),
            CaseType::Fpqrs => Some(CaseKind::Fpqrs),
            CaseType::ConsultaDeCaso | CaseType::Unclassified => None,
        }
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalize a raw `tipo_solicitud` by case-insensitive substring match.
///
/// Blank values, `-`, `na` and `n/a` are unclassified. The checks run in a
/// fixed order, so `"consulta incidente"` is an incident.
pub fn normalize_case_type(raw: Option<&str>) -> CaseType {
    let s = raw.unwrap_or_default().trim().to_lowercase();
    if s.is_empty() || s == "-" || s == "na" || s == "n/a" {
        return CaseType::Unclassified;
    }
    if s.contains("inc") {
        CaseType::Incidente
    } else if s.contains("req") {
        CaseType::Requerimiento
    } else if s.contains("consult") {
        CaseType::ConsultaDeCaso
    } else if s.contains("fpqrs") {
        CaseType::Fpqrs
    } else {
        CaseType::Unclassified
    }
}

/// Case kinds with a dedicated ITSM endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseKind {
    Incident,
    Request,
    Fpqrs,
}

impl CaseKind {
    pub const ALL: [CaseKind; 3] = [CaseKind::Incident, CaseKind::Request, CaseKind::Fpqrs];

    /// Path segment of the REST resource family (`/{segment}/by-id_dialvox/{id}`).
    pub fn resource_segment(self) -> &'static str {
        match self {
            CaseKind::Incident => "incidents",
            CaseKind::Request => "requests",
            CaseKind::Fpqrs => "fpqrs",
        }
    }

    pub fn case_type(self) -> CaseType {
        match self {
            CaseKind::Incident => CaseType::Incidente,
            CaseKind::Request => CaseType::Requerimiento,
            CaseKind::Fpqrs => CaseType::Fpqrs,
        }
    }
}

impl fmt::Display for CaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.case_type().label())
    }
}
