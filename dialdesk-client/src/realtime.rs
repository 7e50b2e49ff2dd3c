//! Push invalidation channel with reconnect backoff.
//!
//! One long-lived event-stream subscription. Each message is a JSON object
//! whose `type` is checked against the configured whitelist; recognized
//! types are handed to the [`InvalidationSink`]. Transport errors and end of
//! stream close the connection, sleep the current backoff and reconnect,
//! with no retry limit.

use crate::config::ReconnectConfig;
use crate::traits::{EventStreamConnector, InvalidationSink};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exponential reconnect delay: floor, multiplied per failure, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor_ms: u64,
    ceiling_ms: u64,
    multiplier: f64,
    jitter_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            floor_ms: config.initial_ms,
            ceiling_ms: config.max_ms.max(config.initial_ms),
            multiplier: config.multiplier.max(1.0),
            jitter_ms: config.jitter_ms,
            current_ms: config.initial_ms,
        }
    }

    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    /// Back to the floor, after a successful open.
    pub fn reset(&mut self) {
        self.current_ms = self.floor_ms;
    }

    /// Delay to sleep now; advances the next delay.
    pub fn next_delay(&mut self) -> Duration {
        let delay = jittered_backoff(self.current_ms, self.jitter_ms);
        let next = (self.current_ms as f64 * self.multiplier) as u64;
        self.current_ms = next.min(self.ceiling_ms);
        Duration::from_millis(delay)
    }
}

fn jittered_backoff(base_ms: u64, jitter_ms: u64) -> u64 {
    if jitter_ms == 0 {
        return base_ms;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base_ms.saturating_add(nanos % jitter_ms)
}

/// What one push message asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    Invalidate(String),
    Ignored(Option<String>),
    Malformed(String),
}

/// Classify one raw `data` payload against the whitelist.
pub fn classify_message(data: &str, whitelist: &HashSet<String>) -> PushMessage {
    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => return PushMessage::Malformed(e.to_string()),
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some(event_type) if whitelist.contains(event_type) => {
            PushMessage::Invalidate(event_type.to_string())
        }
        other => PushMessage::Ignored(other.map(str::to_string)),
    }
}

/// Handle to a running push channel. Dropping it tears the channel down.
pub struct PushChannel {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PushChannel {
    pub fn spawn(
        connector: Arc<dyn EventStreamConnector>,
        sink: Arc<dyn InvalidationSink>,
        events: impl IntoIterator<Item = String>,
        reconnect: &ReconnectConfig,
    ) -> Self {
        let token = CancellationToken::new();
        let whitelist: HashSet<String> = events.into_iter().collect();
        let backoff = Backoff::new(reconnect);
        let task = tokio::spawn(run(connector, sink, whitelist, backoff, token.clone()));
        Self {
            token,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the connection and any pending reconnect, then wait for the
    /// task to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Push channel task ended abnormally");
            }
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run(
    connector: Arc<dyn EventStreamConnector>,
    sink: Arc<dyn InvalidationSink>,
    whitelist: HashSet<String>,
    mut backoff: Backoff,
    token: CancellationToken,
) {
    loop {
        let connected = tokio::select! {
            _ = token.cancelled() => break,
            connected = connector.connect() => connected,
        };

        match connected {
            Ok(mut stream) => {
                backoff.reset();
                tracing::info!("Push channel open");
                loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => return,
                        next = stream.next() => next,
                    };
                    match next {
                        Some(Ok(data)) => match classify_message(&data, &whitelist) {
                            PushMessage::Invalidate(event_type) => sink.invalidate(&event_type),
                            PushMessage::Ignored(event_type) => {
                                tracing::trace!(event_type = ?event_type, "Ignoring push event");
                            }
                            PushMessage::Malformed(error) => {
                                tracing::warn!(error = %error, "Skipping malformed push message");
                            }
                        },
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Push channel transport error");
                            break;
                        }
                        None => {
                            tracing::info!("Push channel closed by server");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Push channel connect failed");
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnecting push channel");
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!("Push channel stopped");
}
