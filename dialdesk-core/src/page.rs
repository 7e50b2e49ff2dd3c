//! Server pagination types.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The current server-paginated window. `page_index` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePointer {
    pub page_index: u32,
    pub page_size: u32,
    pub total: u64,
}

impl PagePointer {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_index: 0,
            page_size: page_size.max(1),
            total: 0,
        }
    }

    /// 1-based page number sent on the wire.
    pub fn wire_page(&self) -> u32 {
        self.page_index.saturating_add(1)
    }

    pub fn page_count(&self) -> u64 {
        let size = u64::from(self.page_size.max(1));
        self.total.div_ceil(size)
    }

    pub fn last_page_index(&self) -> u32 {
        let count = self.page_count();
        u32::try_from(count.saturating_sub(1)).unwrap_or(u32::MAX)
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.wire_page()) * u64::from(self.page_size) < self.total
    }

    pub fn has_previous(&self) -> bool {
        self.page_index > 0
    }
}

/// Filters forwarded to the backend query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerFilter {
    Phone,
    CallId,
}

impl ServerFilter {
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        match name {
            "phone" => Ok(ServerFilter::Phone),
            "id_llamada" | "call_id" => Ok(ServerFilter::CallId),
            other => Err(ValidationError::UnknownFilter {
                name: other.to_string(),
            }),
        }
    }

    pub fn query_key(self) -> &'static str {
        match self {
            ServerFilter::Phone => "phone",
            ServerFilter::CallId => "id_llamada",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_llamada: Option<String>,
}

impl ServerFilters {
    /// Set or clear (blank value) one filter. Returns whether it changed.
    pub fn set(&mut self, filter: ServerFilter, value: Option<&str>) -> bool {
        let value = value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        let slot = match filter {
            ServerFilter::Phone => &mut self.phone,
            ServerFilter::CallId => &mut self.id_llamada,
        };
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    pub fn get(&self, filter: ServerFilter) -> Option<&str> {
        match filter {
            ServerFilter::Phone => self.phone.as_deref(),
            ServerFilter::CallId => self.id_llamada.as_deref(),
        }
    }
}

/// Query string of the paginated list call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListAttentionsQuery {
    pub page: u32,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_llamada: Option<String>,
}

impl ListAttentionsQuery {
    pub fn new(pointer: &PagePointer, filters: &ServerFilters) -> Self {
        Self {
            page: pointer.wire_page(),
            page_size: pointer.page_size,
            phone: filters.phone.clone(),
            id_llamada: filters.id_llamada.clone(),
        }
    }
}

/// One page of raw items as returned by the list endpoint.
///
/// Items stay untyped here; row validation happens in the table engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionPage {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_counts_pages() {
        let mut pointer = PagePointer::new(10);
        assert_eq!(pointer.page_count(), 0);
        pointer.total = 25;
        assert_eq!(pointer.page_count(), 3);
        assert_eq!(pointer.last_page_index(), 2);
        assert!(pointer.has_next());
        pointer.page_index = 2;
        assert!(!pointer.has_next());
        assert!(pointer.has_previous());
    }

    #[test]
    fn wire_page_is_one_based() {
        let pointer = PagePointer::new(20);
        assert_eq!(pointer.wire_page(), 1);
    }

    #[test]
    fn zero_page_size_is_clamped() {
        assert_eq!(PagePointer::new(0).page_size, 1);
    }

    #[test]
    fn blank_filter_clears() {
        let mut filters = ServerFilters::default();
        assert!(filters.set(ServerFilter::Phone, Some(" 300 ")));
        assert_eq!(filters.get(ServerFilter::Phone), Some("300"));
        assert!(!filters.set(ServerFilter::Phone, Some("300")));
        assert!(filters.set(ServerFilter::Phone, Some("   ")));
        assert_eq!(filters.phone, None);
    }

    #[test]
    fn unknown_filter_is_rejected() {
        assert!(ServerFilter::parse("nombre").is_err());
        assert_eq!(ServerFilter::parse("id_llamada").unwrap(), ServerFilter::CallId);
    }

    #[test]
    fn query_skips_empty_filters() {
        let pointer = PagePointer::new(10);
        let query = ListAttentionsQuery::new(&pointer, &ServerFilters::default());
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json, serde_json::json!({ "page": 1, "page_size": 10 }));
    }
}
