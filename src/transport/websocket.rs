//! Persistent JSON-RPC socket transport.
//!
//! # Data Flow
//! ```text
//! send()  → pending[id] = oneshot → writer task → socket
//! socket  → reader task ─┬─ frame with id          → pending[id]
//!                        └─ "subscription" notify  → routes[subscription] → mpsc
//! ```
//!
//! # Design Decisions
//! - One socket per transport, shared by all in-flight calls
//! - Notifications that arrive before `subscribe()` has registered its channel
//!   are parked and replayed on registration. Parking only happens while a
//!   `subscribe()` is waiting for its reply
//! - Ids that were unsubscribed, or whose receiver was dropped, are retired and
//!   their late notifications discarded
//! - When the socket closes, every pending call fails with `Connection`

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::config::TransportConfig;
use crate::observability::metrics;
use crate::transport::types::{
    EventSubscription, RawEvent, RpcRequest, RpcResponse, SubscriptionNotification,
    TransportError, TransportResult,
};
use crate::transport::RpcTransport;

/// Upper bound on parked notifications per unknown subscription id.
const MAX_PARKED_EVENTS: usize = 256;

type PendingMap = DashMap<u64, oneshot::Sender<TransportResult<Value>>>;

/// Routing table for push notifications.
#[derive(Default)]
struct SubscriptionRoutes {
    active: HashMap<String, mpsc::UnboundedSender<RawEvent>>,
    parked: HashMap<String, Vec<RawEvent>>,
    retired: HashSet<String>,
    /// `subscribe()` calls that have not registered their channel yet.
    awaiting: usize,
}

impl SubscriptionRoutes {
    fn deliver(&mut self, subscription: String, event: RawEvent) {
        if let Some(tx) = self.active.get(&subscription) {
            if tx.send(event).is_err() {
                // Receiver dropped without unsubscribing.
                self.retire(&subscription);
            }
            return;
        }
        if self.awaiting == 0 || self.retired.contains(&subscription) {
            tracing::trace!(subscription = %subscription, "Discarding event for inactive subscription");
            return;
        }
        let parked = self.parked.entry(subscription).or_default();
        if parked.len() < MAX_PARKED_EVENTS {
            parked.push(event);
        }
    }

    fn begin_subscribe(&mut self) {
        self.awaiting += 1;
    }

    fn register(&mut self, subscription: &str, tx: mpsc::UnboundedSender<RawEvent>) {
        self.retired.remove(subscription);
        if let Some(parked) = self.parked.remove(subscription) {
            for event in parked {
                let _ = tx.send(event);
            }
        }
        self.active.insert(subscription.to_string(), tx);
    }

    fn end_subscribe(&mut self) {
        self.awaiting = self.awaiting.saturating_sub(1);
        if self.awaiting == 0 {
            // Nobody is left to claim these.
            self.parked.clear();
        }
    }

    fn retire(&mut self, subscription: &str) {
        self.active.remove(subscription);
        self.parked.remove(subscription);
        self.retired.insert(subscription.to_string());
    }

    fn clear(&mut self) {
        self.active.clear();
        self.parked.clear();
        self.retired.clear();
    }
}

/// Keeps parking enabled while one `subscribe()` call is in flight, even if it is cancelled.
struct AwaitingSubscribe<'a>(&'a Mutex<SubscriptionRoutes>);

impl<'a> AwaitingSubscribe<'a> {
    fn start(routes: &'a Mutex<SubscriptionRoutes>) -> Self {
        if let Ok(mut routes) = routes.lock() {
            routes.begin_subscribe();
        }
        Self(routes)
    }
}

impl Drop for AwaitingSubscribe<'_> {
    fn drop(&mut self) {
        if let Ok(mut routes) = self.0.lock() {
            routes.end_subscribe();
        }
    }
}

/// State shared between the transport handle and its background tasks.
struct Shared {
    endpoint: String,
    label: String,
    pending: PendingMap,
    routes: Mutex<SubscriptionRoutes>,
    closed: AtomicBool,
}

impl Shared {
    fn connection_error(&self, reason: impl Into<String>) -> TransportError {
        TransportError::Connection {
            endpoint: self.endpoint.clone(),
            reason: reason.into(),
        }
    }

    fn dispatch(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(transport = %self.label, error = %e, "Dropping non-JSON frame");
                return;
            }
        };

        let frame: RpcResponse = match serde_json::from_value(value.clone()) {
            Ok(frame) => frame,
            Err(e) => {
                // Still fail the caller if we can tell which request this was.
                if let Some(id) = value.get("id").and_then(Value::as_u64) {
                    if let Some((_, tx)) = self.pending.remove(&id) {
                        let _ = tx.send(Err(TransportError::Malformed {
                            endpoint: self.endpoint.clone(),
                            reason: e.to_string(),
                        }));
                    }
                } else {
                    tracing::warn!(transport = %self.label, error = %e, "Dropping malformed frame");
                }
                return;
            }
        };

        if frame.is_notification() {
            let note = frame
                .params
                .map(serde_json::from_value::<SubscriptionNotification>);
            match note {
                Some(Ok(note)) => {
                    if let Ok(mut routes) = self.routes.lock() {
                        routes.deliver(note.subscription, note.result);
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(transport = %self.label, error = %e, "Malformed notification")
                }
                None => tracing::warn!(transport = %self.label, "Notification without params"),
            }
            return;
        }

        match frame.id {
            Some(id) => match self.pending.remove(&id) {
                Some((_, tx)) => {
                    let _ = tx.send(frame.into_result());
                }
                None => tracing::debug!(transport = %self.label, id, "Response for abandoned request"),
            },
            None => tracing::debug!(transport = %self.label, "Ignoring frame without id"),
        }
    }

    fn shutdown(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(self.connection_error(reason)));
            }
        }

        // Dropping the senders ends every subscription stream.
        if let Ok(mut routes) = self.routes.lock() {
            routes.clear();
        }
    }
}

/// JSON-RPC over a persistent WebSocket.
pub struct WsTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Message>,
    timeout_duration: Duration,
    next_id: AtomicU64,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl WsTransport {
    /// Open the socket and start the reader and writer tasks.
    pub async fn connect(config: &TransportConfig) -> TransportResult<Self> {
        let endpoint = config.endpoint_url.clone();
        let timeout_duration = config.timeout();

        let (stream, _response) = match timeout(timeout_duration, connect_async(endpoint.as_str())).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(TransportError::Connection {
                    endpoint,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(TransportError::Timeout {
                    endpoint,
                    timeout_secs: config.timeout_secs,
                })
            }
        };

        let shared = Arc::new(Shared {
            endpoint,
            label: config.label.clone(),
            pending: DashMap::new(),
            routes: Mutex::new(SubscriptionRoutes::default()),
            closed: AtomicBool::new(false),
        });

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer_shared = shared.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(transport = %writer_shared.label, error = %e, "Socket write failed");
                    writer_shared.shutdown("socket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_shared = shared.clone();
        let reader_task = tokio::spawn(async move {
            let reason = loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => reader_shared.dispatch(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => reader_shared.dispatch(text),
                        Err(_) => tracing::warn!(transport = %reader_shared.label, "Dropping non-UTF-8 frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => break "socket closed by peer",
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(transport = %reader_shared.label, error = %e, "Socket read failed");
                        break "socket read failed";
                    }
                }
            };
            tracing::info!(transport = %reader_shared.label, reason, "Socket closed");
            reader_shared.shutdown(reason);
        });

        Ok(Self {
            shared,
            outbound,
            timeout_duration,
            next_id: AtomicU64::new(1),
            reader_task,
            writer_task,
        })
    }

    /// Whether the socket has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    async fn round_trip(&self, method: &str, params: &Value) -> TransportResult<Value> {
        if self.is_closed() {
            return Err(self.shared.connection_error("socket closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&RpcRequest::new(id, method, params)).map_err(|e| {
            TransportError::Malformed {
                endpoint: self.shared.endpoint.clone(),
                reason: format!("request encoding failed: {}", e),
            }
        })?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(id, tx);

        if self.outbound.send(Message::Text(text.into())).is_err() {
            self.shared.pending.remove(&id);
            return Err(self.shared.connection_error("socket writer stopped"));
        }

        match timeout(self.timeout_duration, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(self.shared.connection_error("socket closed")),
            Err(_) => {
                self.shared.pending.remove(&id);
                Err(TransportError::Timeout {
                    endpoint: self.shared.endpoint.clone(),
                    timeout_secs: self.timeout_duration.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl RpcTransport for WsTransport {
    fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    fn label(&self) -> &str {
        &self.shared.label
    }

    async fn send(&self, method: &str, params: Value) -> TransportResult<Value> {
        let start = Instant::now();
        let result = self.round_trip(method, &params).await;

        match &result {
            Ok(_) => metrics::record_rpc(&self.shared.label, method, "ok", start),
            Err(e) => {
                tracing::debug!(transport = %self.shared.label, method, error = %e, "RPC failed");
                metrics::record_rpc(&self.shared.label, method, e.kind(), start);
            }
        }
        result
    }

    async fn subscribe(&self, topics: Vec<String>) -> TransportResult<EventSubscription> {
        let _awaiting = AwaitingSubscribe::start(&self.shared.routes);
        let result = self.send("subscribe", json!({ "topics": topics })).await?;
        let id = result
            .as_str()
            .ok_or_else(|| TransportError::Malformed {
                endpoint: self.shared.endpoint.clone(),
                reason: format!("subscription id must be a string, got {}", result),
            })?
            .to_string();

        let (tx, rx) = mpsc::unbounded_channel();
        match self.shared.routes.lock() {
            Ok(mut routes) => routes.register(&id, tx),
            Err(_) => return Err(self.shared.connection_error("subscription table poisoned")),
        }

        tracing::debug!(transport = %self.shared.label, subscription = %id, "Subscribed");
        Ok(EventSubscription { id, events: rx })
    }

    async fn unsubscribe(&self, subscription: &str) -> TransportResult<()> {
        if let Ok(mut routes) = self.shared.routes.lock() {
            routes.retire(subscription);
        }
        self.send("unsubscribe", json!({ "subscription": subscription }))
            .await
            .map(|_| ())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
        self.shared.shutdown("transport dropped");
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("endpoint", &self.shared.endpoint)
            .field("label", &self.shared.label)
            .field("closed", &self.is_closed())
            .finish()
    }
}
