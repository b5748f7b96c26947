//! Push-event fan-out for `/events` subscribers.
//!
//! Every connected client owns a bounded queue. Broadcasts use `try_send`, so a slow or stuck
//! client loses events instead of holding up the others. A sweeper evicts clients that have not
//! been seen for [`IDLE_TIMEOUT`].

use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const CLIENT_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connected,
    Tools,
    ToolExecution,
    Heartbeat,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Tools => "tools",
            Self::ToolExecution => "tool_execution",
            Self::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: Value,
}

impl ServerEvent {
    #[must_use]
    pub fn new(kind: EventKind, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            data,
        }
    }

    #[must_use]
    pub fn heartbeat(at: DateTime<Utc>) -> Self {
        Self::new(EventKind::Heartbeat, json!({ "timestamp": at }))
    }
}

struct ClientEntry {
    tx: mpsc::Sender<ServerEvent>,
    last_seen: Instant,
    cancel: CancellationToken,
}

/// Registry of connected event-stream clients.
pub struct ClientHub {
    clients: Mutex<HashMap<String, ClientEntry>>,
    shutdown: CancellationToken,
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a new client. Its stream ends when it is disconnected, evicted, or the hub
    /// shuts down.
    pub fn connect(self: &Arc<Self>) -> ClientConnection {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        let cancel = self.shutdown.child_token();
        self.clients.lock().insert(
            id.clone(),
            ClientEntry {
                tx,
                last_seen: Instant::now(),
                cancel: cancel.clone(),
            },
        );
        tracing::info!(client = %id, "event client connected");
        ClientConnection {
            id,
            hub: Arc::clone(self),
            rx,
            cancel,
        }
    }

    /// Queue an event for one client. Returns `false` if the client is gone or its queue is full.
    pub fn send_to(&self, id: &str, event: ServerEvent) -> bool {
        let clients = self.clients.lock();
        clients
            .get(id)
            .is_some_and(|entry| entry.tx.try_send(event).is_ok())
    }

    /// Queue an event for every connected client; returns how many accepted it.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let senders: Vec<(String, mpsc::Sender<ServerEvent>)> = self
            .clients
            .lock()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in senders {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(client = %id, error = %e, "dropped event for client"),
            }
        }
        delivered
    }

    pub fn touch(&self, id: &str) {
        if let Some(entry) = self.clients.lock().get_mut(id) {
            entry.last_seen = Instant::now();
        }
    }

    pub fn disconnect(&self, id: &str) -> bool {
        let Some(entry) = self.clients.lock().remove(id) else {
            return false;
        };
        entry.cancel.cancel();
        tracing::info!(client = %id, "event client disconnected");
        true
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Evict clients idle for longer than `idle` as of `now`; returns their ids.
    pub fn sweep(&self, now: Instant, idle: Duration) -> Vec<String> {
        let mut clients = self.clients.lock();
        let stale: Vec<String> = clients
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) > idle)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            if let Some(entry) = clients.remove(id) {
                entry.cancel.cancel();
                tracing::debug!(client = %id, "evicted inactive event client");
            }
        }
        stale
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, idle: Duration) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    () = hub.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        hub.sweep(Instant::now(), idle);
                    }
                }
            }
        })
    }

    /// End every client stream and stop the sweeper.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.clients.lock().clear();
    }
}

/// One subscriber's end of the hub. Dropping it unregisters the client.
pub struct ClientConnection {
    id: String,
    hub: Arc<ClientHub>,
    rx: mpsc::Receiver<ServerEvent>,
    cancel: CancellationToken,
}

impl ClientConnection {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queued events interleaved with a heartbeat every `heartbeat`.
    pub fn into_stream(self, heartbeat: Duration) -> impl Stream<Item = ServerEvent> + Send + 'static {
        let ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
        futures::stream::unfold((self, ticker), |(mut conn, mut ticker)| async move {
            let event = tokio::select! {
                biased;
                () = conn.cancel.cancelled() => return None,
                received = conn.rx.recv() => received?,
                _ = ticker.tick() => ServerEvent::heartbeat(Utc::now()),
            };
            conn.hub.touch(&conn.id);
            Some((event, (conn, ticker)))
        })
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.hub.disconnect(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;

    #[tokio::test]
    async fn queued_events_are_delivered_in_order() {
        let hub = Arc::new(ClientHub::new());
        let conn = hub.connect();
        let id = conn.id().to_string();
        assert_eq!(hub.client_count(), 1);

        assert!(hub.send_to(&id, ServerEvent::new(EventKind::Connected, json!({"clientId": id}))));
        assert!(hub.send_to(&id, ServerEvent::new(EventKind::Tools, json!({"tools": []}))));

        let mut stream = Box::pin(conn.into_stream(Duration::from_secs(3600)));
        assert_eq!(stream.next().await.map(|e| e.kind), Some(EventKind::Connected));
        assert_eq!(stream.next().await.map(|e| e.kind), Some(EventKind::Tools));
    }

    #[tokio::test]
    async fn heartbeat_fires_when_idle() {
        let hub = Arc::new(ClientHub::new());
        let mut stream = Box::pin(hub.connect().into_stream(Duration::from_millis(50)));

        let event = stream.next().await.expect("heartbeat");
        assert_eq!(event.kind, EventKind::Heartbeat);
        assert!(event.data.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn broadcast_skips_full_queues() {
        let hub = Arc::new(ClientHub::new());
        let slow = hub.connect();
        let fast = hub.connect();

        for _ in 0..CLIENT_QUEUE {
            assert!(hub.send_to(slow.id(), ServerEvent::new(EventKind::Tools, Value::Null)));
        }
        let delivered = hub.broadcast(&ServerEvent::new(EventKind::ToolExecution, json!({"toolName": "x"})));
        assert_eq!(delivered, 1);

        let mut stream = Box::pin(fast.into_stream(Duration::from_secs(3600)));
        let event = stream.next().await.expect("event");
        assert_eq!(event.kind, EventKind::ToolExecution);
        assert_eq!(event.data["toolName"], "x");
    }

    #[tokio::test]
    async fn dropping_a_connection_unregisters_it() {
        let hub = Arc::new(ClientHub::new());
        let conn = hub.connect();
        let id = conn.id().to_string();
        drop(conn);
        assert_eq!(hub.client_count(), 0);
        assert!(!hub.send_to(&id, ServerEvent::heartbeat(Utc::now())));
    }

    #[tokio::test]
    async fn sweep_evicts_idle_clients_and_ends_their_streams() {
        let hub = Arc::new(ClientHub::new());
        let idle = hub.connect();
        let idle_id = idle.id().to_string();

        let evicted = hub.sweep(Instant::now() + Duration::from_secs(121), IDLE_TIMEOUT);
        assert_eq!(evicted, vec![idle_id]);
        assert_eq!(hub.client_count(), 0);

        let mut stream = Box::pin(idle.into_stream(Duration::from_secs(3600)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn sweep_keeps_recent_clients() {
        let hub = Arc::new(ClientHub::new());
        let _conn = hub.connect();
        assert!(hub.sweep(Instant::now(), IDLE_TIMEOUT).is_empty());
        assert_eq!(hub.client_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_ends_all_streams() {
        let hub = Arc::new(ClientHub::new());
        let a = hub.connect();
        let b = hub.connect();
        hub.shutdown();
        assert_eq!(hub.client_count(), 0);

        for conn in [a, b] {
            let mut stream = Box::pin(conn.into_stream(Duration::from_secs(3600)));
            assert!(stream.next().await.is_none());
        }
    }

    #[test]
    fn event_kinds_serialize_snake_case() {
        let event = ServerEvent::new(EventKind::ToolExecution, Value::Null);
        let value = serde_json::to_value(&event).expect("json");
        assert_eq!(value["type"], "tool_execution");
        assert_eq!(EventKind::ToolExecution.as_str(), "tool_execution");
    }
}
