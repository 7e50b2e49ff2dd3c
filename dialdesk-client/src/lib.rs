//! DIALDESK console client.
//!
//! Client-side reconciliation engine for the attention console: the
//! paginated attention table, per-row agent resolution over a shared cache,
//! case detail state machines and the push invalidation channel.

pub mod api_client;
pub mod cache;
pub mod case_detail;
pub mod config;
pub mod error;
pub mod events;
pub mod notifications;
pub mod persistence;
pub mod realtime;
pub mod resolver;
pub mod table;
pub mod telemetry;
pub mod traits;

pub use api_client::{ApiClientError, RestClient, SseConnector};
pub use cache::ResolutionCache;
pub use case_detail::{CaseDetailController, DetailError, DetailPhase, DetailState};
pub use config::ConsoleConfig;
pub use realtime::{Backoff, PushChannel};
pub use resolver::{AgentCell, AgentColumn, AgentDisplay, ExtensionResolver};
pub use table::{RefetchOutcome, TableEngine, TableRow};
