//! DIALDESK Core - Attention Console Types
//!
//! Pure data structures and pure functions shared by the client engine and
//! its tests. Nothing in this crate performs I/O: records, case types, column
//! filter predicates, transcript parsing and patch merging all live here so
//! they can be exercised without a runtime.

pub mod agent;
pub mod attention;
pub mod case_type;
pub mod error;
pub mod fields;
pub mod filter;
pub mod page;
pub mod ticket;
pub mod transcript;

pub use agent::{sanitize_extension, AgentLite, ResolvedAgent, UNASSIGNED_EXTENSION};
pub use attention::{coerce_extension, seconds_to_hms, AttentionRecord, ValidatedRecord};
pub use case_type::{normalize_case_type, CaseKind, CaseType};
pub use error::{CaseError, ValidationError};
pub use fields::{CaseFields, FieldOptions};
pub use filter::{
    date_range_matches, parse_timestamp, search_matches, search_text, tri_state_matches,
    ColumnFilters, DateRange, TriState,
};
pub use page::{AttentionPage, ListAttentionsQuery, PagePointer, ServerFilter, ServerFilters};
pub use ticket::{reference_from_value, EditSet, ForwardRequest, ForwardResponse, TicketRecord};
pub use transcript::{
    format_timecode, normalize_transcript, parse_flat_transcript, transcript_lines, Speaker,
    TranscriptLine, TranscriptMessage,
};

/// Placeholder rendered for absent values.
pub const EMPTY_CELL: &str = "—";
