//! DIALDESK Test Utilities
//!
//! Centralized test infrastructure for the DIALDESK workspace:
//! - Mock backends implementing the client traits
//! - Proptest generators for wire payloads
//! - Test fixtures for common scenarios

pub use dialdesk_client::api_client::ApiClientError;
pub use dialdesk_client::traits::{
    AgentDirectory, AttentionSource, CaseBackend, EventStream, EventStreamConnector,
    InvalidationSink,
};
pub use dialdesk_core::{
    AgentLite, AttentionPage, CaseKind, ForwardRequest, ForwardResponse, ListAttentionsQuery,
    TicketRecord,
};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Wait on `notify` until `ready` holds.
async fn wait_until(notify: &Notify, ready: impl Fn() -> bool) {
    loop {
        let notified = notify.notified();
        if ready() {
            return;
        }
        notified.await;
    }
}

// ============================================================================
// MOCK ATTENTION SOURCE
// ============================================================================

/// Releases one gated mock response.
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

struct QueuedResponse {
    result: Result<AttentionPage, ApiClientError>,
    gate: Option<oneshot::Receiver<()>>,
}

/// Paginated source answering calls in order from a queue of responses.
///
/// Gated responses are held until their [`Gate`] is released, which lets a
/// test complete requests out of order. With an empty queue every call gets
/// an empty page.
#[derive(Default)]
pub struct MockAttentionSource {
    queue: Mutex<VecDeque<QueuedResponse>>,
    calls: Mutex<Vec<ListAttentionsQuery>>,
    called: Notify,
}

impl MockAttentionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, page: AttentionPage) {
        lock(&self.queue).push_back(QueuedResponse {
            result: Ok(page),
            gate: None,
        });
    }

    pub fn push_error(&self, error: ApiClientError) {
        lock(&self.queue).push_back(QueuedResponse {
            result: Err(error),
            gate: None,
        });
    }

    pub fn push_gated(&self, page: AttentionPage) -> Gate {
        let (tx, rx) = oneshot::channel();
        lock(&self.queue).push_back(QueuedResponse {
            result: Ok(page),
            gate: Some(rx),
        });
        Gate(tx)
    }

    pub fn calls(&self) -> Vec<ListAttentionsQuery> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub async fn wait_for_calls(&self, count: usize) {
        wait_until(&self.called, || self.call_count() >= count).await;
    }
}

#[async_trait]
impl AttentionSource for MockAttentionSource {
    async fn list_attentions(
        &self,
        query: &ListAttentionsQuery,
    ) -> Result<AttentionPage, ApiClientError> {
        let queued = {
            lock(&self.calls).push(query.clone());
            lock(&self.queue).pop_front()
        };
        self.called.notify_waiters();

        let Some(queued) = queued else {
            return Ok(AttentionPage {
                items: Vec::new(),
                total: 0,
                page: query.page,
                page_size: query.page_size,
            });
        };
        if let Some(gate) = queued.gate {
            // A dropped gate releases the response too.
            let _ = gate.await;
        }
        queued.result
    }
}

// ============================================================================
// MOCK AGENT DIRECTORY
// ============================================================================

/// Extension lookup backed by a map, counting every call.
#[derive(Default)]
pub struct MockAgentDirectory {
    agents: Mutex<HashMap<i64, AgentLite>>,
    failing: Mutex<HashSet<i64>>,
    calls: Mutex<Vec<i64>>,
    delay: Option<Duration>,
}

impl MockAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(self, extension: i64, nombres: &str, apellidos: &str) -> Self {
        self.add_agent(extension, nombres, apellidos);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_agent(&self, extension: i64, nombres: &str, apellidos: &str) {
        lock(&self.agents).insert(extension, fixtures::agent(extension, nombres, apellidos));
    }

    /// Make lookups of `extension` fail with a transport error.
    pub fn fail_extension(&self, extension: i64) {
        lock(&self.failing).insert(extension);
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, extension: i64) -> usize {
        lock(&self.calls).iter().filter(|e| **e == extension).count()
    }
}

#[async_trait]
impl AgentDirectory for MockAgentDirectory {
    async fn lookup_extension(&self, extension: i64) -> Result<Option<AgentLite>, ApiClientError> {
        lock(&self.calls).push(extension);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.failing).contains(&extension) {
            return Err(ApiClientError::Status {
                status: 503,
                body: "directory unavailable".to_string(),
            });
        }
        Ok(lock(&self.agents).get(&extension).cloned())
    }
}

// ============================================================================
// MOCK CASE BACKEND
// ============================================================================

/// Case endpoints over an in-memory store, capturing every payload sent.
pub struct MockCaseBackend {
    records: Mutex<HashMap<(CaseKind, i64), TicketRecord>>,
    fetches: Mutex<Vec<(CaseKind, i64)>>,
    patches: Mutex<Vec<(CaseKind, i64, TicketRecord)>>,
    forwards: Mutex<Vec<(CaseKind, ForwardRequest)>>,
    forward_response: Mutex<ForwardResponse>,
    forward_delay: Mutex<Option<Duration>>,
    fail_patch: Mutex<bool>,
}

impl Default for MockCaseBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCaseBackend {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fetches: Mutex::new(Vec::new()),
            patches: Mutex::new(Vec::new()),
            forwards: Mutex::new(Vec::new()),
            forward_response: Mutex::new(ForwardResponse::default()),
            forward_delay: Mutex::new(None),
            fail_patch: Mutex::new(false),
        }
    }

    pub fn with_record(self, kind: CaseKind, id: i64, record: TicketRecord) -> Self {
        lock(&self.records).insert((kind, id), record);
        self
    }

    pub fn set_forward_response(&self, response: ForwardResponse) {
        *lock(&self.forward_response) = response;
    }

    pub fn set_forward_delay(&self, delay: Option<Duration>) {
        *lock(&self.forward_delay) = delay;
    }

    pub fn set_fail_patch(&self, fail: bool) {
        *lock(&self.fail_patch) = fail;
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.fetches).len()
    }

    pub fn patches(&self) -> Vec<(CaseKind, i64, TicketRecord)> {
        lock(&self.patches).clone()
    }

    pub fn forwards(&self) -> Vec<(CaseKind, ForwardRequest)> {
        lock(&self.forwards).clone()
    }
}

#[async_trait]
impl CaseBackend for MockCaseBackend {
    async fn fetch_case(&self, kind: CaseKind, id: i64) -> Result<TicketRecord, ApiClientError> {
        lock(&self.fetches).push((kind, id));
        lock(&self.records)
            .get(&(kind, id))
            .cloned()
            .ok_or_else(|| ApiClientError::Status {
                status: 404,
                body: format!("{} {} not found", kind, id),
            })
    }

    async fn patch_case(
        &self,
        kind: CaseKind,
        id: i64,
        payload: &TicketRecord,
    ) -> Result<TicketRecord, ApiClientError> {
        lock(&self.patches).push((kind, id, payload.clone()));
        if *lock(&self.fail_patch) {
            return Err(ApiClientError::Status {
                status: 422,
                body: "rejected".to_string(),
            });
        }
        lock(&self.records).insert((kind, id), payload.clone());
        Ok(payload.clone())
    }

    async fn forward_case(
        &self,
        kind: CaseKind,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, ApiClientError> {
        lock(&self.forwards).push((kind, *request));
        let delay = *lock(&self.forward_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(lock(&self.forward_response).clone())
    }
}

// ============================================================================
// SCRIPTED PUSH CONNECTOR
// ============================================================================

/// How a scripted connection ends after its messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Close,
    Error,
    HoldOpen,
}

#[derive(Debug, Clone)]
pub enum ConnectScript {
    Refuse,
    Messages { messages: Vec<String>, end: StreamEnd },
}

/// Connector playing one script per connection attempt. Once the scripts
/// run out every attempt is refused. Attempt instants use tokio's clock so
/// paused-time tests can measure backoff.
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<ConnectScript>>,
    attempts: Mutex<Vec<tokio::time::Instant>>,
    attempted: Notify,
}

impl ScriptedConnector {
    pub fn new(scripts: impl IntoIterator<Item = ConnectScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<tokio::time::Instant> {
        lock(&self.attempts).clone()
    }

    pub fn attempt_count(&self) -> usize {
        lock(&self.attempts).len()
    }

    /// Gaps between consecutive attempts.
    pub fn gaps(&self) -> Vec<Duration> {
        self.attempts()
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }

    pub async fn wait_for_attempts(&self, count: usize) {
        wait_until(&self.attempted, || self.attempt_count() >= count).await;
    }
}

#[async_trait]
impl EventStreamConnector for ScriptedConnector {
    async fn connect(&self) -> Result<EventStream, ApiClientError> {
        let script = {
            lock(&self.attempts).push(tokio::time::Instant::now());
            lock(&self.scripts).pop_front()
        };
        self.attempted.notify_waiters();

        match script.unwrap_or(ConnectScript::Refuse) {
            ConnectScript::Refuse => Err(ApiClientError::Stream("connection refused".to_string())),
            ConnectScript::Messages { messages, end } => {
                use futures_util::stream::{self, StreamExt};
                let items = stream::iter(messages.into_iter().map(Ok::<String, ApiClientError>));
                let stream: EventStream = match end {
                    StreamEnd::Close => Box::pin(items),
                    StreamEnd::Error => Box::pin(items.chain(stream::once(async {
                        Err(ApiClientError::Stream("connection reset".to_string()))
                    }))),
                    StreamEnd::HoldOpen => Box::pin(items.chain(stream::pending())),
                };
                Ok(stream)
            }
        }
    }
}

// ============================================================================
// RECORDING SINK
// ============================================================================

/// Invalidation sink recording every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
    received: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        lock(&self.events).clone()
    }

    pub async fn wait_for_events(&self, count: usize) {
        wait_until(&self.received, || lock(&self.events).len() >= count).await;
    }
}

impl InvalidationSink for RecordingSink {
    fn invalidate(&self, event_type: &str) {
        lock(&self.events).push(event_type.to_string());
        self.received.notify_waiters();
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for wire payloads.

    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Any value the backend has been seen to put in `extension`.
    pub fn arb_extension_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            Just(json!(-1)),
            (1i64..100_000).prop_map(|n| json!(n)),
            (1i64..100_000).prop_map(|n| json!(n.to_string())),
            (-100_000i64..-1).prop_map(|n| json!(n)),
            Just(json!(0)),
            (0.1f64..1000.0).prop_map(|f| json!(f)),
            "[a-z]{1,6}".prop_map(|s| json!(s)),
            Just(json!(true)),
        ]
    }

    /// Raw case type labels, normalized or not.
    pub fn arb_case_type_label() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Incidente".to_string()),
            Just("INC".to_string()),
            Just("requerimiento".to_string()),
            Just("Consulta de caso".to_string()),
            Just("FPQRS".to_string()),
            Just("n/a".to_string()),
            Just("-".to_string()),
            "[a-zA-Z ]{0,12}",
        ]
    }

    /// A well-formed attention item.
    pub fn arb_attention_item() -> impl Strategy<Value = Value> {
        (
            1i64..1_000_000,
            proptest::option::of(1i64..1_000_000),
            proptest::option::of("[0-9]{7,10}"),
            proptest::option::of(any::<bool>()),
            arb_case_type_label(),
        )
            .prop_map(|(id, id_dialvox, phone, vip, tipo)| {
                json!({
                    "id": id,
                    "id_dialvox_": id_dialvox,
                    "phone": phone,
                    "es_vip": vip,
                    "tipo_solicitud": tipo,
                    "created_at": "2024-05-01T00:00:00Z",
                })
            })
    }

    /// An item whose fields may carry the wrong JSON types.
    pub fn arb_messy_attention_item() -> impl Strategy<Value = Value> {
        (
            prop_oneof![
                (1i64..1_000_000).prop_map(|n| json!(n)),
                (1i64..1_000_000).prop_map(|n| json!(n.to_string())),
                Just(json!("abc")),
                Just(Value::Null),
            ],
            arb_extension_value(),
            prop_oneof![Just(json!("yes")), Just(json!(1)), Just(Value::Null), Just(json!(false))],
        )
            .prop_map(|(id, extension, vip)| {
                json!({
                    "id": id,
                    "extension": extension,
                    "es_vip": vip,
                    "created_at": "2024-05-01T00:00:00Z",
                })
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Common payloads and configurations.

    use dialdesk_client::config::{
        AuthConfig, ConsoleConfig, ForwardConfig, LogConfig, ReconnectConfig, TableConfig,
    };
    use dialdesk_core::{AgentLite, AttentionPage, TicketRecord};
    use serde_json::{json, Value};

    pub fn agent(extension: i64, nombres: &str, apellidos: &str) -> AgentLite {
        AgentLite {
            id: Some(extension),
            nombres: nombres.to_string(),
            apellidos: apellidos.to_string(),
            extension: Some(extension),
        }
    }

    pub fn attention_item(id: i64) -> Value {
        json!({
            "id": id,
            "id_dialvox_": 9000 + id,
            "id_llamada": format!("call-{id}"),
            "phone": "3001234567",
            "extension": 1201,
            "nombre_cliente": "Marta Díaz",
            "tipo_solicitud": "Incidente",
            "es_vip": false,
            "created_at": "2024-05-01T00:00:00Z",
            "started_at": "2024-05-01T10:00:00Z",
        })
    }

    pub fn attention_page(items: Vec<Value>, total: u64) -> AttentionPage {
        AttentionPage {
            items,
            total,
            page: 1,
            page_size: 10,
        }
    }

    pub fn ticket_record(id_dialvox: i64) -> TicketRecord {
        serde_json::from_value(json!({
            "id_dialvox_": id_dialvox,
            "r_service": "Correo",
            "category": "NGFW",
            "status": "Abierto",
            "owner_team": "Gestores Nivel 1",
            "urgency": "Medio",
            "subject": "Caída de PBX",
            "symptom": "Sin tono",
        }))
        .unwrap_or_default()
    }

    pub fn reconnect(initial_ms: u64, max_ms: u64) -> ReconnectConfig {
        ReconnectConfig {
            initial_ms,
            max_ms,
            multiplier: 2.0,
            jitter_ms: 0,
        }
    }

    /// A valid configuration pointing every endpoint at `base_url`.
    pub fn console_config(base_url: &str) -> ConsoleConfig {
        ConsoleConfig {
            api_base_url: base_url.to_string(),
            events_url: format!("{base_url}/webhooks/stream"),
            auth: AuthConfig {
                bearer_token: Some("test-token".to_string()),
            },
            request_timeout_ms: 5_000,
            refresh_interval_ms: 2_000,
            persistence_path: "tmp/dialdesk-state.json".into(),
            invalidation_events: vec![
                "webhook_event_created".to_string(),
                "webhook_event_updated".to_string(),
            ],
            forward: ForwardConfig {
                incident_url: format!("{base_url}/forward/incident"),
                request_url: format!("{base_url}/forward/request"),
                fpqrs_url: format!("{base_url}/forward/fpqrs"),
                timeout_ms: 10_000,
            },
            reconnect: reconnect(1_000, 30_000),
            table: TableConfig {
                page_size: 10,
                page_size_options: vec![10, 20, 50],
            },
            log: LogConfig { json: false },
        }
    }
}
