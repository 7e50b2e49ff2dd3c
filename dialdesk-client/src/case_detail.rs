//! Case detail controller shared by incidents, requests and FPQRS.
//!
//! One state machine, parameterized by [`CaseKind`]:
//!
//! ```text
//! Idle -> Loading -> Loaded(read-only) <-> Loaded(editing) -> Saving -> Loaded(read-only)
//! Loaded(*) -> Approving -> Loaded(*)
//! ```
//!
//! The fetch is lazy (first `open`), fetch/save/forward failures are kept in
//! separate slots, and business-rule failures never reach the network.

use crate::api_client::ApiClientError;
use crate::config::ForwardConfig;
use crate::traits::CaseBackend;
use dialdesk_core::{CaseError, CaseFields, CaseKind, EditSet, ForwardRequest, TicketRecord};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Bound on a single forward call for controllers built without a config.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailPhase {
    Idle,
    Loading,
    Loaded,
    Saving,
    Approving,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetailError {
    #[error("failed to load case: {0}")]
    Fetch(String),
    #[error("failed to save case: {0}")]
    Save(String),
    #[error("failed to forward case: {0}")]
    Forward(String),
    #[error("forward timed out after {0:?}")]
    ForwardTimeout(Duration),
    #[error(transparent)]
    Rule(#[from] CaseError),
    #[error("operation not allowed while {0:?}")]
    Busy(DetailPhase),
    #[error("case is not in edit mode")]
    NotEditing,
}

/// Observable state of one detail view.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailState {
    pub phase: DetailPhase,
    pub open: bool,
    pub editing: bool,
    /// Set by a successful save, cleared by `close` or the next edit.
    pub saved: bool,
    pub record: Option<TicketRecord>,
    pub ticket_reference: Option<String>,
    pub fetch_error: Option<String>,
    pub save_error: Option<String>,
    pub forward_error: Option<String>,
}

impl DetailState {
    fn new() -> Self {
        Self {
            phase: DetailPhase::Idle,
            open: false,
            editing: false,
            saved: false,
            record: None,
            ticket_reference: None,
            fetch_error: None,
            save_error: None,
            forward_error: None,
        }
    }
}

#[derive(Clone)]
pub struct CaseDetailController {
    kind: CaseKind,
    id_dialvox: Option<i64>,
    backend: Arc<dyn CaseBackend>,
    forward_timeout: Duration,
    state: Arc<Mutex<DetailState>>,
}

impl CaseDetailController {
    pub fn new(kind: CaseKind, id_dialvox: Option<i64>, backend: Arc<dyn CaseBackend>) -> Self {
        Self {
            kind,
            id_dialvox,
            backend,
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
            state: Arc::new(Mutex::new(DetailState::new())),
        }
    }

    /// Controller bounded by the configured forward timeout, the same bound
    /// the REST client applies to the forward request.
    pub fn from_config(
        kind: CaseKind,
        id_dialvox: Option<i64>,
        backend: Arc<dyn CaseBackend>,
        forward: &ForwardConfig,
    ) -> Self {
        Self::new(kind, id_dialvox, backend).with_forward_timeout(forward.timeout())
    }

    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }

    pub fn kind(&self) -> CaseKind {
        self.kind
    }

    pub fn snapshot(&self) -> DetailState {
        self.lock().clone()
    }

    /// Normalized classification fields of the loaded record.
    pub fn fields(&self) -> Option<CaseFields> {
        self.lock()
            .record
            .as_ref()
            .map(|record| CaseFields::derive(self.kind, record))
    }

    /// Open the detail view, fetching on first open or after a failed fetch.
    pub async fn open(&self) -> Result<(), DetailError> {
        {
            let mut state = self.lock();
            state.open = true;
            if state.record.is_some() || state.phase != DetailPhase::Idle {
                return Ok(());
            }
        }
        self.fetch().await
    }

    /// Refetch explicitly, e.g. after a fetch error.
    pub async fn retry(&self) -> Result<(), DetailError> {
        {
            let state = self.lock();
            if state.phase != DetailPhase::Idle && state.phase != DetailPhase::Loaded {
                return Err(DetailError::Busy(state.phase));
            }
        }
        self.fetch().await
    }

    pub fn begin_edit(&self) -> Result<(), DetailError> {
        let mut state = self.lock();
        if state.phase != DetailPhase::Loaded {
            return Err(DetailError::Busy(state.phase));
        }
        state.editing = true;
        state.saved = false;
        state.save_error = None;
        Ok(())
    }

    pub fn cancel_edit(&self) {
        let mut state = self.lock();
        if state.phase == DetailPhase::Loaded {
            state.editing = false;
            state.save_error = None;
        }
    }

    /// Persist `edits` as a full merged payload.
    ///
    /// Edits equal to the loaded values are dropped; if nothing remains the
    /// save is rejected without a network call. Success returns to read-only.
    pub async fn save(&self, edits: &EditSet) -> Result<(), DetailError> {
        let (id, payload) = {
            let mut state = self.lock();
            if state.phase != DetailPhase::Loaded {
                return Err(DetailError::Busy(state.phase));
            }
            if !state.editing {
                return Err(DetailError::NotEditing);
            }
            let Some(id) = self.id_dialvox else {
                return Err(reject(&mut state.save_error, CaseError::MissingCorrelationId));
            };
            let original = state.record.clone().unwrap_or_default();
            let payload = match edits.build_patch(&original) {
                Ok(payload) => payload,
                Err(rule) => return Err(reject(&mut state.save_error, rule)),
            };
            state.phase = DetailPhase::Saving;
            state.save_error = None;
            (id, payload)
        };

        tracing::debug!(kind = %self.kind, id, fields = edits.len(), "Saving case");
        let result = self.backend.patch_case(self.kind, id, &payload).await;

        let mut state = self.lock();
        state.phase = DetailPhase::Loaded;
        match result {
            Ok(updated) => {
                if let Some(reference) = updated.ticket_reference() {
                    state.ticket_reference = Some(reference);
                }
                state.record = Some(updated);
                state.editing = false;
                state.saved = true;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, id, error = %e, "Case save failed");
                let message = e.to_string();
                state.save_error = Some(message.clone());
                Err(DetailError::Save(message))
            }
        }
    }

    /// Forward the case to the ITSM hook, sending only the correlation id.
    ///
    /// `on_forwarded` runs after a successful forward with the returned
    /// ticket reference, if any.
    pub async fn approve<F>(&self, on_forwarded: F) -> Result<Option<String>, DetailError>
    where
        F: FnOnce(Option<&str>) + Send,
    {
        let id = {
            let mut state = self.lock();
            if state.phase != DetailPhase::Loaded {
                return Err(DetailError::Busy(state.phase));
            }
            let Some(id) = self.id_dialvox else {
                return Err(reject(&mut state.forward_error, CaseError::MissingCorrelationId));
            };
            state.phase = DetailPhase::Approving;
            state.forward_error = None;
            id
        };

        let request = ForwardRequest { id_dialvox_: id };
        let result = tokio::time::timeout(
            self.forward_timeout,
            self.backend.forward_case(self.kind, &request),
        )
        .await;

        let outcome = match result {
            Ok(Ok(response)) => Ok(response.ticket_reference()),
            Ok(Err(ApiClientError::Timeout)) | Err(_) => {
                Err(DetailError::ForwardTimeout(self.forward_timeout))
            }
            Ok(Err(e)) => Err(DetailError::Forward(e.to_string())),
        };

        let reference = {
            let mut state = self.lock();
            state.phase = DetailPhase::Loaded;
            match outcome {
                Ok(reference) => {
                    if let Some(reference) = &reference {
                        state.ticket_reference = Some(reference.clone());
                    }
                    reference
                }
                Err(err) => {
                    tracing::warn!(kind = %self.kind, id, error = %err, "Case forward failed");
                    state.forward_error = Some(err.to_string());
                    return Err(err);
                }
            }
        };

        tracing::info!(kind = %self.kind, id, ticket = ?reference, "Case forwarded");
        on_forwarded(reference.as_deref());
        Ok(reference)
    }

    /// Close the view. The fetched record is kept for the next open.
    pub fn close(&self) {
        let mut state = self.lock();
        state.open = false;
        state.editing = false;
        state.saved = false;
    }

    async fn fetch(&self) -> Result<(), DetailError> {
        let id = {
            let mut state = self.lock();
            let Some(id) = self.id_dialvox else {
                return Err(reject(&mut state.fetch_error, CaseError::MissingCorrelationId));
            };
            state.phase = DetailPhase::Loading;
            state.fetch_error = None;
            id
        };

        let result = self.backend.fetch_case(self.kind, id).await;

        let mut state = self.lock();
        match result {
            Ok(record) => {
                state.ticket_reference = record.ticket_reference();
                state.record = Some(record);
                state.phase = DetailPhase::Loaded;
                state.editing = false;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = %self.kind, id, error = %e, "Case fetch failed");
                let message = e.to_string();
                state.fetch_error = Some(message.clone());
                state.phase = if state.record.is_some() {
                    DetailPhase::Loaded
                } else {
                    DetailPhase::Idle
                };
                Err(DetailError::Fetch(message))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, DetailState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn reject(slot: &mut Option<String>, rule: CaseError) -> DetailError {
    *slot = Some(rule.to_string());
    DetailError::Rule(rule)
}
