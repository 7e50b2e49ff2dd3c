//! Reconciliation behavior of the console engine against in-memory backends.

use dialdesk_client::case_detail::{CaseDetailController, DetailError, DetailPhase};
use dialdesk_client::realtime::PushChannel;
use dialdesk_client::resolver::{AgentDisplay, ExtensionResolver};
use dialdesk_client::table::{RefetchOutcome, TableEngine};
use dialdesk_client::traits::InvalidationSink;
use dialdesk_client::ResolutionCache;
use dialdesk_core::{CaseError, CaseType, DateRange, EditSet};
use dialdesk_test_utils::fixtures;
use dialdesk_test_utils::generators::arb_case_type_label;
use dialdesk_test_utils::{
    CaseKind, ConnectScript, ForwardRequest, MockAgentDirectory, MockAttentionSource,
    MockCaseBackend, RecordingSink, ScriptedConnector, StreamEnd,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn engine(source: &Arc<MockAttentionSource>) -> TableEngine {
    TableEngine::new(source.clone(), 10, vec![10, 20, 50])
}

// ============================================================================
// AGENT RESOLUTION
// ============================================================================

#[tokio::test]
async fn cache_is_shared_between_resolvers() {
    let directory = Arc::new(MockAgentDirectory::new().with_agent(1201, "Ana", "Ruiz"));
    let cache = ResolutionCache::new();
    let first = ExtensionResolver::new(cache.clone(), directory.clone());
    let second = ExtensionResolver::new(cache.clone(), directory.clone());

    let resolved = first.resolve(Some(1201)).await;
    assert_eq!(resolved.to_string(), "Ana Ruiz (ext. 1201)");

    assert_eq!(second.resolve_now(Some(1201)), Some(resolved.clone()));
    assert_eq!(second.resolve(Some(1201)).await, resolved);
    assert_eq!(directory.calls_for(1201), 1);
}

#[tokio::test]
async fn rows_sharing_an_extension_reuse_the_cached_name() {
    let directory = Arc::new(MockAgentDirectory::new().with_agent(1201, "Ana", "Ruiz"));
    let resolver = ExtensionResolver::new(ResolutionCache::new(), directory.clone());

    let first = resolver.attach(Some(1201));
    assert_eq!(first.settled().await.to_string(), "Ana Ruiz (ext. 1201)");

    let second = resolver.attach(Some(1201));
    assert!(!second.display().is_pending());
    assert_eq!(directory.call_count(), 1);
}

#[tokio::test]
async fn sentinel_extensions_never_hit_the_directory() {
    let directory = Arc::new(MockAgentDirectory::new());
    let resolver = ExtensionResolver::new(ResolutionCache::new(), directory.clone());

    assert_eq!(resolver.resolve(None).await, AgentDisplay::Placeholder);
    assert_eq!(resolver.resolve(Some(-1)).await, AgentDisplay::Unassigned);
    assert_eq!(resolver.resolve(Some(0)).await, AgentDisplay::Placeholder);
    assert_eq!(resolver.attach(Some(-1)).display().to_string(), "Unassigned");
    assert_eq!(resolver.attach(None).display().to_string(), "—");
    assert_eq!(directory.call_count(), 0);
}

#[tokio::test]
async fn misses_and_failures_render_bare_and_stay_uncached() {
    let directory = Arc::new(MockAgentDirectory::new());
    directory.fail_extension(1300);
    let resolver = ExtensionResolver::new(ResolutionCache::new(), directory.clone());

    assert_eq!(resolver.resolve(Some(1299)).await.to_string(), "Ext. 1299");
    assert_eq!(resolver.resolve(Some(1300)).await.to_string(), "Ext. 1300");
    assert!(resolver.cache().is_empty());

    resolver.resolve(Some(1300)).await;
    assert_eq!(directory.calls_for(1300), 2);
}

#[tokio::test(start_paused = true)]
async fn changed_extension_abandons_the_stale_lookup() {
    let directory = Arc::new(
        MockAgentDirectory::new()
            .with_agent(1201, "Ana", "Ruiz")
            .with_agent(1300, "Luis", "Gómez")
            .with_delay(Duration::from_millis(50)),
    );
    let resolver = ExtensionResolver::new(ResolutionCache::new(), directory.clone());

    let mut cell = resolver.attach(Some(1201));
    assert_eq!(cell.display(), AgentDisplay::Loading { extension: 1201 });
    cell.set_extension(Some(1300));

    assert_eq!(cell.settled().await.to_string(), "Luis Gómez (ext. 1300)");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(cell.display().to_string(), "Luis Gómez (ext. 1300)");
    assert!(!resolver.cache().contains(1201));
}

// ============================================================================
// TABLE ENGINE
// ============================================================================

#[tokio::test]
async fn newest_refetch_wins_when_responses_arrive_out_of_order() {
    let source = Arc::new(MockAttentionSource::new());
    let stale = source.push_gated(fixtures::attention_page(vec![fixtures::attention_item(1)], 1));
    let fresh = source.push_gated(fixtures::attention_page(vec![fixtures::attention_item(2)], 1));
    let table = engine(&source);

    let older = tokio::spawn({
        let table = table.clone();
        async move { table.refetch().await }
    });
    source.wait_for_calls(1).await;
    let newer = tokio::spawn({
        let table = table.clone();
        async move { table.refetch().await }
    });
    source.wait_for_calls(2).await;

    fresh.release();
    assert_eq!(newer.await.unwrap(), RefetchOutcome::Applied);
    stale.release();
    assert_eq!(older.await.unwrap(), RefetchOutcome::Superseded);

    let ids: Vec<i64> = table.rows().iter().map(|row| row.record.id).collect();
    assert_eq!(ids, vec![2]);
    assert!(!table.is_loading());
}

#[tokio::test]
async fn stale_response_keeps_loading_until_newest_lands() {
    let source = Arc::new(MockAttentionSource::new());
    let stale = source.push_gated(fixtures::attention_page(vec![fixtures::attention_item(1)], 1));
    let fresh = source.push_gated(fixtures::attention_page(vec![fixtures::attention_item(2)], 1));
    let table = engine(&source);

    let older = tokio::spawn({
        let table = table.clone();
        async move { table.refetch().await }
    });
    source.wait_for_calls(1).await;
    let newer = tokio::spawn({
        let table = table.clone();
        async move { table.refetch().await }
    });
    source.wait_for_calls(2).await;

    stale.release();
    assert_eq!(older.await.unwrap(), RefetchOutcome::Superseded);
    assert!(table.is_loading());
    assert!(table.rows().is_empty());

    fresh.release();
    assert_eq!(newer.await.unwrap(), RefetchOutcome::Applied);
    assert_eq!(table.rows()[0].record.id, 2);
}

#[tokio::test]
async fn server_filter_resets_to_first_page_and_reaches_the_query() {
    let source = Arc::new(MockAttentionSource::new());
    let table = engine(&source);
    source.push_page(fixtures::attention_page(vec![fixtures::attention_item(1)], 45));
    table.refetch().await;
    table.set_page(3).await;

    table.set_server_filter("phone", Some(" 3001234567 ")).await.unwrap();
    let last = source.calls().pop().unwrap();
    assert_eq!(last.page, 1);
    assert_eq!(last.phone.as_deref(), Some("3001234567"));
    assert!(table.set_server_filter("email", Some("x")).await.is_err());
}

#[tokio::test]
async fn failed_fetch_clears_rows_and_records_error() {
    let source = Arc::new(MockAttentionSource::new());
    source.push_page(fixtures::attention_page(vec![fixtures::attention_item(1)], 1));
    source.push_error(dialdesk_client::ApiClientError::Status {
        status: 502,
        body: "bad gateway".to_string(),
    });
    let table = engine(&source);

    assert_eq!(table.refetch().await, RefetchOutcome::Applied);
    assert_eq!(table.refetch().await, RefetchOutcome::Failed);
    assert!(table.rows().is_empty());
    assert!(table.error().unwrap().contains("bad gateway"));
    assert!(!table.is_loading());
}

#[tokio::test]
async fn date_range_bounds_are_inclusive_to_the_millisecond() {
    let source = Arc::new(MockAttentionSource::new());
    source.push_page(fixtures::attention_page(vec![fixtures::attention_item(1)], 1));
    let table = engine(&source);
    table.refetch().await;

    // started_at is 2024-05-01T10:00:00Z
    let cases = [
        (Some("2024-05-01T10:00:00Z"), Some("2024-05-01T10:00:00Z"), 1),
        (Some("2024-05-01T10:00:00.001Z"), None, 0),
        (Some("2024-05-01T09:59:59.999Z"), None, 1),
        (None, Some("2024-05-01T09:59:59.999Z"), 0),
        (None, Some("2024-05-01T10:00:00.001Z"), 1),
        (Some(""), Some(""), 1),
        (Some(""), Some("2024-05-01T10:00:00Z"), 1),
        (Some(" "), Some("2024-05-01T09:59:59.999Z"), 0),
    ];
    for (from, to, expected) in cases {
        table.set_date_range(DateRange::new(from, to));
        assert_eq!(table.visible_rows().len(), expected, "from={from:?} to={to:?}");
    }
}

#[tokio::test]
async fn empty_search_shows_every_row() {
    let source = Arc::new(MockAttentionSource::new());
    let items = (1..=5).map(fixtures::attention_item).collect();
    source.push_page(fixtures::attention_page(items, 5));
    let table = engine(&source);
    table.refetch().await;

    table.set_search("call-3");
    assert_eq!(table.visible_rows().len(), 1);
    table.set_search("");
    assert_eq!(table.visible_rows().len(), 5);
}

#[tokio::test]
async fn malformed_extension_keeps_the_row_and_its_id() {
    let source = Arc::new(MockAttentionSource::new());
    source.push_page(fixtures::attention_page(
        vec![json!({
            "id": 77,
            "extension": "abc",
            "created_at": "2024-05-01T00:00:00Z",
        })],
        1,
    ));
    let table = engine(&source);
    table.refetch().await;

    let rows = table.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.id, 77);
    assert_eq!(rows[0].record.extension, None);
    assert!(!rows[0].schema_valid);
}

#[tokio::test]
async fn push_invalidation_refetches_the_table() {
    let source = Arc::new(MockAttentionSource::new());
    let table = engine(&source);
    table.invalidate("webhook_event_created");
    source.wait_for_calls(1).await;
    assert_eq!(source.calls()[0].page, 1);
}

proptest! {
    #[test]
    fn prop_case_type_lands_in_closed_set(label in arb_case_type_label()) {
        let row = dialdesk_client::TableRow::from_wire(json!({
            "id": 1,
            "tipo_solicitud": label,
            "created_at": "2024-05-01T00:00:00Z",
        }));
        prop_assert!(matches!(
            row.record.case_type(),
            CaseType::Incidente
                | CaseType::Requerimiento
                | CaseType::ConsultaDeCaso
                | CaseType::Fpqrs
                | CaseType::Unclassified
        ));
    }
}

#[test]
fn case_type_normalization_follows_substring_order() {
    let label = |raw: &str| {
        dialdesk_client::TableRow::from_wire(json!({
            "id": 1,
            "tipo_solicitud": raw,
            "created_at": "2024-05-01T00:00:00Z",
        }))
        .record
        .case_type()
    };
    assert_eq!(label("INCIDENTE"), CaseType::Incidente);
    assert_eq!(label("Requerimiento"), CaseType::Requerimiento);
    assert_eq!(label("consulta incidente"), CaseType::Incidente);
    assert_eq!(label("Consulta"), CaseType::ConsultaDeCaso);
    assert_eq!(label("FPQRS"), CaseType::Fpqrs);
    assert_eq!(label("n/a"), CaseType::Unclassified);
}

// ============================================================================
// CASE DETAIL
// ============================================================================

fn detail(backend: &Arc<MockCaseBackend>, id: Option<i64>) -> CaseDetailController {
    CaseDetailController::new(CaseKind::Request, id, backend.clone())
}

#[tokio::test]
async fn empty_patch_is_rejected_without_a_call() {
    let backend = Arc::new(
        MockCaseBackend::new().with_record(CaseKind::Request, 9001, fixtures::ticket_record(9001)),
    );
    let controller = detail(&backend, Some(9001));
    controller.open().await.unwrap();
    controller.begin_edit().unwrap();

    assert_eq!(
        controller.save(&EditSet::new()).await,
        Err(DetailError::Rule(CaseError::NoChanges))
    );
    assert_eq!(
        controller.save(&EditSet::new().with("status", "Abierto")).await,
        Err(DetailError::Rule(CaseError::NoChanges))
    );
    assert!(backend.patches().is_empty());
    assert!(controller.snapshot().save_error.is_some());
}

#[tokio::test]
async fn save_sends_the_full_merged_record() {
    let backend = Arc::new(
        MockCaseBackend::new().with_record(CaseKind::Request, 9001, fixtures::ticket_record(9001)),
    );
    let controller = detail(&backend, Some(9001));
    controller.open().await.unwrap();
    controller.begin_edit().unwrap();
    controller
        .save(&EditSet::new().with("status", "Cerrado"))
        .await
        .unwrap();

    let patches = backend.patches();
    let (kind, id, payload) = &patches[0];
    assert_eq!((*kind, *id), (CaseKind::Request, 9001));
    assert_eq!(payload.text("status").as_deref(), Some("Cerrado"));
    assert_eq!(payload.text("subject").as_deref(), Some("Caída de PBX"));
    assert!(!controller.snapshot().editing);
}

#[tokio::test]
async fn rejected_patch_keeps_the_edit_open() {
    let backend = Arc::new(
        MockCaseBackend::new().with_record(CaseKind::Request, 9001, fixtures::ticket_record(9001)),
    );
    backend.set_fail_patch(true);
    let controller = detail(&backend, Some(9001));
    controller.open().await.unwrap();
    controller.begin_edit().unwrap();

    let result = controller
        .save(&EditSet::new().with("status", "Cerrado"))
        .await;
    assert!(matches!(result, Err(DetailError::Save(_))));

    let state = controller.snapshot();
    assert_eq!(state.phase, DetailPhase::Loaded);
    assert!(state.editing);
    assert!(state.save_error.is_some());
    assert!(state.fetch_error.is_none());
    assert!(state.forward_error.is_none());
    assert_eq!(backend.patches().len(), 1);
}

#[tokio::test]
async fn approve_forwards_only_the_correlation_id() {
    let backend = Arc::new(
        MockCaseBackend::new().with_record(CaseKind::Request, 9001, fixtures::ticket_record(9001)),
    );
    backend.set_forward_response(dialdesk_test_utils::ForwardResponse {
        ticket: None,
        ticket_number: Some(json!(5512)),
    });
    let controller = detail(&backend, Some(9001));
    controller.open().await.unwrap();

    let reference = controller.approve(|_| {}).await.unwrap();
    assert_eq!(reference.as_deref(), Some("5512"));
    assert_eq!(
        backend.forwards(),
        vec![(CaseKind::Request, ForwardRequest { id_dialvox_: 9001 })]
    );
}

#[tokio::test(start_paused = true)]
async fn slow_forward_times_out_without_losing_the_record() {
    let backend = Arc::new(
        MockCaseBackend::new().with_record(CaseKind::Request, 9001, fixtures::ticket_record(9001)),
    );
    backend.set_forward_delay(Some(Duration::from_secs(30)));
    let controller = detail(&backend, Some(9001)).with_forward_timeout(Duration::from_secs(10));
    controller.open().await.unwrap();

    let err = controller.approve(|_| {}).await.unwrap_err();
    assert_eq!(err, DetailError::ForwardTimeout(Duration::from_secs(10)));
    let state = controller.snapshot();
    assert_eq!(state.phase, DetailPhase::Loaded);
    assert!(state.record.is_some());
}

#[tokio::test(start_paused = true)]
async fn configured_forward_timeout_bounds_approval() {
    let backend = Arc::new(
        MockCaseBackend::new().with_record(CaseKind::Request, 9001, fixtures::ticket_record(9001)),
    );
    let mut config = fixtures::console_config("http://127.0.0.1:9");
    config.forward.timeout_ms = 20_000;
    let controller = CaseDetailController::from_config(
        CaseKind::Request,
        Some(9001),
        backend.clone(),
        &config.forward,
    );
    controller.open().await.unwrap();

    // Past the built-in default but inside the configured bound.
    backend.set_forward_delay(Some(Duration::from_secs(15)));
    assert!(controller.approve(|_| {}).await.is_ok());

    backend.set_forward_delay(Some(Duration::from_secs(25)));
    let err = controller.approve(|_| {}).await.unwrap_err();
    assert_eq!(err, DetailError::ForwardTimeout(Duration::from_secs(20)));
}

#[tokio::test]
async fn missing_case_surfaces_a_fetch_error() {
    let backend = Arc::new(MockCaseBackend::new());
    let controller = detail(&backend, Some(404));
    assert!(matches!(controller.open().await, Err(DetailError::Fetch(_))));
    assert_eq!(controller.snapshot().phase, DetailPhase::Idle);
    assert_eq!(backend.fetch_count(), 1);
}

// ============================================================================
// PUSH CHANNEL
// ============================================================================

#[tokio::test(start_paused = true)]
async fn reconnect_delay_doubles_caps_and_resets_after_open() {
    let connector = Arc::new(ScriptedConnector::new([
        ConnectScript::Refuse,
        ConnectScript::Refuse,
        ConnectScript::Refuse,
        ConnectScript::Refuse,
        ConnectScript::Messages {
            messages: Vec::new(),
            end: StreamEnd::Close,
        },
    ]));
    let channel = PushChannel::spawn(
        connector.clone(),
        Arc::new(RecordingSink::new()),
        Vec::new(),
        &fixtures::reconnect(1_000, 4_000),
    );

    connector.wait_for_attempts(7).await;
    channel.shutdown().await;

    let gaps: Vec<u128> = connector.gaps().iter().take(6).map(Duration::as_millis).collect();
    assert_eq!(gaps, vec![1_000, 2_000, 4_000, 4_000, 1_000, 2_000]);
}

#[tokio::test]
async fn only_whitelisted_events_reach_the_sink() {
    let connector = Arc::new(ScriptedConnector::new([ConnectScript::Messages {
        messages: vec![
            r#"{"type":"heartbeat"}"#.to_string(),
            "garbage".to_string(),
            r#"{"type":"webhook_event_updated","id":4}"#.to_string(),
            r#"{"type":"webhook_event_created","id":5}"#.to_string(),
        ],
        end: StreamEnd::HoldOpen,
    }]));
    let sink = Arc::new(RecordingSink::new());
    let channel = PushChannel::spawn(
        connector.clone(),
        sink.clone(),
        ["webhook_event_created".to_string(), "webhook_event_updated".to_string()],
        &fixtures::reconnect(1_000, 30_000),
    );

    sink.wait_for_events(2).await;
    assert!(channel.is_running());
    channel.shutdown().await;

    assert_eq!(sink.events(), vec!["webhook_event_updated", "webhook_event_created"]);
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_backoff_stops_reconnecting() {
    let connector = Arc::new(ScriptedConnector::new([]));
    let channel = PushChannel::spawn(
        connector.clone(),
        Arc::new(RecordingSink::new()),
        Vec::new(),
        &fixtures::reconnect(1_000, 4_000),
    );

    connector.wait_for_attempts(1).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    channel.shutdown().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_channel_stops_reconnecting() {
    let connector = Arc::new(ScriptedConnector::new([]));
    let channel = PushChannel::spawn(
        connector.clone(),
        Arc::new(RecordingSink::new()),
        Vec::new(),
        &fixtures::reconnect(1_000, 4_000),
    );

    connector.wait_for_attempts(1).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    drop(channel);
    tokio::task::yield_now().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempt_count(), 1);
}
