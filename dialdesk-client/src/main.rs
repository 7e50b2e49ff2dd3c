//! DIALDESK headless console runner.
//!
//! Keeps the attention table reconciled with the backend and the push
//! stream, logging the visible page on every refresh tick.

use dialdesk_client::api_client::{RestClient, SseConnector};
use dialdesk_client::config::ConsoleConfig;
use dialdesk_client::error::ConsoleError;
use dialdesk_client::events::{ChannelSink, ConsoleEvent};
use dialdesk_client::notifications::{
    Notification, NotificationAction, NotificationLevel, Notifications,
};
use dialdesk_client::persistence;
use dialdesk_client::realtime::PushChannel;
use dialdesk_client::resolver::{AgentColumn, ExtensionResolver};
use dialdesk_client::table::{RefetchOutcome, TableEngine};
use dialdesk_client::{telemetry, ResolutionCache};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), ConsoleError> {
    let config = ConsoleConfig::load()?;
    telemetry::init_tracing(&config.log)?;

    let rest = Arc::new(RestClient::new(&config)?);
    let connector = Arc::new(SseConnector::new(&config)?);
    let table = TableEngine::new(
        rest.clone(),
        config.table.page_size,
        config.table.page_size_options.clone(),
    );
    let resolver = ExtensionResolver::new(ResolutionCache::new(), rest.clone());
    let mut agents = AgentColumn::new(resolver);
    let mut notifications = Notifications::new(32);

    match persistence::load(&config.persistence_path) {
        Ok(Some(state)) => table.restore(&state),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable persisted state"),
    }

    let (event_tx, mut event_rx) = mpsc::channel::<ConsoleEvent>(16);
    spawn_shutdown_listener(event_tx.clone());
    let sink = ChannelSink::new(event_tx);

    refresh(&table, &mut notifications).await;
    let push = PushChannel::spawn(
        connector,
        Arc::new(sink.clone()),
        config.invalidation_events.clone(),
        &config.reconnect,
    );

    let mut ticker = tokio::time::interval(config.refresh_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                log_visible_page(&table, &mut agents);
                for notice in notifications.drain() {
                    tracing::info!(
                        level = ?notice.level,
                        action = ?notice.action,
                        "{}",
                        notice.message
                    );
                }
            }
            Some(event) = event_rx.recv() => match event {
                ConsoleEvent::Invalidated(event_type) => {
                    sink.acknowledge();
                    tracing::debug!(event_type = %event_type, "Refreshing after push event");
                    refresh(&table, &mut notifications).await;
                }
                ConsoleEvent::Shutdown => break,
            },
        }
    }

    push.shutdown().await;
    persistence::save(&config.persistence_path, &table.persisted_state())?;
    tracing::info!("DIALDESK runner stopped");
    Ok(())
}

async fn refresh(table: &TableEngine, notifications: &mut Notifications) {
    match table.refetch().await {
        RefetchOutcome::Applied | RefetchOutcome::Superseded => {}
        RefetchOutcome::Failed => {
            let message = table
                .error()
                .unwrap_or_else(|| "attention fetch failed".to_string());
            notifications.push(
                Notification::new(NotificationLevel::Error, message)
                    .with_action(NotificationAction::Retry),
            );
        }
    }
}

/// Log the page with whatever agent names are resolved so far. Pending
/// lookups keep running in their cells and show up on a later tick.
fn log_visible_page(table: &TableEngine, agents: &mut AgentColumn) {
    let pointer = table.pointer();
    let rows = table.visible_rows();
    agents.sync(rows.iter().map(|row| (row.record.id, row.record.extension)));
    tracing::info!(
        page = pointer.wire_page(),
        pages = pointer.page_count(),
        total = pointer.total,
        visible = rows.len(),
        loading = table.is_loading(),
        "Attention page"
    );
    for row in rows {
        tracing::info!(
            id = row.record.correlation_id().unwrap_or(row.record.id),
            case_type = %row.record.case_type(),
            phone = row.record.phone.as_deref().unwrap_or(dialdesk_core::EMPTY_CELL),
            agent = %agents.display(row.record.id),
            duration = %row.record.duration_label(),
            schema_valid = row.schema_valid,
            "Row"
        );
    }
}

fn spawn_shutdown_listener(sender: mpsc::Sender<ConsoleEvent>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        let _ = sender.send(ConsoleEvent::Shutdown).await;
    });
}
