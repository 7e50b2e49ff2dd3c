//! Seams between the reconciliation engine and its collaborators.
//!
//! The REST client implements the backend traits; tests substitute mocks.

use crate::api_client::ApiClientError;
use async_trait::async_trait;
use dialdesk_core::{
    AgentLite, AttentionPage, CaseKind, ForwardRequest, ForwardResponse, ListAttentionsQuery,
    TicketRecord,
};
use futures_util::Stream;
use std::pin::Pin;

/// Paginated source of attention records.
#[async_trait]
pub trait AttentionSource: Send + Sync {
    async fn list_attentions(
        &self,
        query: &ListAttentionsQuery,
    ) -> Result<AttentionPage, ApiClientError>;
}

/// Agent lookup by phone extension. `Ok(None)` means no matching agent.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn lookup_extension(&self, extension: i64) -> Result<Option<AgentLite>, ApiClientError>;
}

/// Case detail endpoints, addressed by kind and correlation id.
#[async_trait]
pub trait CaseBackend: Send + Sync {
    async fn fetch_case(&self, kind: CaseKind, id: i64) -> Result<TicketRecord, ApiClientError>;

    async fn patch_case(
        &self,
        kind: CaseKind,
        id: i64,
        payload: &TicketRecord,
    ) -> Result<TicketRecord, ApiClientError>;

    async fn forward_case(
        &self,
        kind: CaseKind,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, ApiClientError>;
}

/// Raw `data` payloads of one push connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<String, ApiClientError>> + Send>>;

/// Opens one push connection per call.
#[async_trait]
pub trait EventStreamConnector: Send + Sync {
    async fn connect(&self) -> Result<EventStream, ApiClientError>;
}

/// Receiver of recognized push invalidations.
pub trait InvalidationSink: Send + Sync {
    fn invalidate(&self, event_type: &str);
}
