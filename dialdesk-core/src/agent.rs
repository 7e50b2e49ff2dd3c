//! Agent (gestor) types resolved from a phone extension.

use serde::{Deserialize, Serialize};

/// Sentinel extension meaning "no agent assigned".
pub const UNASSIGNED_EXTENSION: i64 = -1;

/// Lightweight user record returned by the extension lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLite {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nombres: String,
    #[serde(default)]
    pub apellidos: String,
    #[serde(default)]
    pub extension: Option<i64>,
}

impl AgentLite {
    /// Full display name, `None` when both name parts are blank.
    pub fn display_name(&self) -> Option<String> {
        let full = format!("{} {}", self.nombres.trim(), self.apellidos.trim());
        let full = full.trim();
        if full.is_empty() {
            None
        } else {
            Some(full.to_string())
        }
    }
}

/// A resolved agent name, as stored in the resolution cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedAgent {
    pub name: String,
}

/// Enforce the extension invariant: `-1` or a positive integer, else `None`.
pub fn sanitize_extension(value: i64) -> Option<i64> {
    if value == UNASSIGNED_EXTENSION || value > 0 {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_joins_and_trims() {
        let agent = AgentLite {
            id: Some(3),
            nombres: " Ana ".to_string(),
            apellidos: "Ruiz".to_string(),
            extension: Some(1201),
        };
        assert_eq!(agent.display_name().as_deref(), Some("Ana Ruiz"));
    }

    #[test]
    fn display_name_handles_missing_surname() {
        let agent = AgentLite {
            id: None,
            nombres: "Ana".to_string(),
            apellidos: String::new(),
            extension: None,
        };
        assert_eq!(agent.display_name().as_deref(), Some("Ana"));
    }

    #[test]
    fn blank_names_are_not_a_match() {
        let agent = AgentLite {
            id: None,
            nombres: "  ".to_string(),
            apellidos: String::new(),
            extension: Some(7),
        };
        assert_eq!(agent.display_name(), None);
    }

    #[test]
    fn sanitize_extension_keeps_sentinel_and_positives() {
        assert_eq!(sanitize_extension(-1), Some(-1));
        assert_eq!(sanitize_extension(1234), Some(1234));
        assert_eq!(sanitize_extension(0), None);
        assert_eq!(sanitize_extension(-7), None);
    }
}
