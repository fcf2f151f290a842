//! WebSocket protocol client for the Deriv API
//!
//! Owns one persistent connection and multiplexes over it:
//!
//! - correlated calls: every request gets a fresh `req_id`; the reply that
//!   echoes it completes exactly that call
//! - push subscriptions keyed by `(kind, sub-key)`
//! - a keep-alive ping while the connection is open
//! - reconnection with exponential backoff after an unexpected close

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{ErrorPayload, PingRequest};
use crate::common::channels::{create_status_channel, SubscriptionKey};
use crate::common::errors::{ClientError, Result};
use crate::common::types::ConnectionStatus;
use crate::config::types::AppSettings;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingReply = oneshot::Sender<Result<Value>>;

/// Timeouts and recovery limits for a connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub keepalive_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Attempt `n` waits `reconnect_base_delay * 2^n`
    pub reconnect_base_delay: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&AppSettings> for ConnectionSettings {
    fn from(settings: &AppSettings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(settings.connect_timeout_seconds),
            request_timeout: Duration::from_secs(settings.request_timeout_seconds),
            keepalive_interval: Duration::from_secs(settings.keepalive_interval_seconds),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            reconnect_base_delay: Duration::from_millis(settings.reconnect_base_delay_ms),
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-based)
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

/// State shared between the client handle and its connection task
struct Shared {
    next_req_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingReply>>,
    subscriptions: Mutex<HashMap<SubscriptionKey, mpsc::UnboundedSender<Value>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    is_connected: AtomicBool,
    intentional_close: AtomicBool,
    reconnect_attempts: AtomicU32,
    exhausted: AtomicBool,
    status_sender: Mutex<Option<mpsc::UnboundedSender<ConnectionStatus>>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            next_req_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            is_connected: AtomicBool::new(false),
            intentional_close: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            exhausted: AtomicBool::new(false),
            status_sender: Mutex::new(None),
        }
    }

    async fn emit(&self, status: ConnectionStatus) {
        let mut sender = self.status_sender.lock().await;
        if let Some(tx) = sender.as_ref() {
            if tx.send(status).is_err() {
                *sender = None;
            }
        }
    }

    /// Open a fresh outbound queue for a newly established connection
    async fn open_outbound(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().await = Some(tx);
        self.is_connected.store(true, Ordering::SeqCst);
        rx
    }

    /// Tear down per-connection state; outstanding calls fail immediately
    async fn close_connection(&self) {
        self.is_connected.store(false, Ordering::SeqCst);
        *self.outbound.lock().await = None;
        let dropped = {
            let mut pending = self.pending.lock().await;
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            debug!(dropped, "Failed outstanding calls on connection close");
        }
    }

    /// Route one inbound frame to a pending call or a subscription
    async fn dispatch(&self, text: &str) {
        let message: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse message: {} - {}", e, text);
                return;
            }
        };

        if let Some(req_id) = message.get("req_id").and_then(Value::as_u64) {
            let pending = self.pending.lock().await.remove(&req_id);
            if let Some(reply) = pending {
                let _ = reply.send(parse_reply(message));
                return;
            }
        }

        if let Some(key) = SubscriptionKey::from_message(&message) {
            let mut subscriptions = self.subscriptions.lock().await;
            let target = if subscriptions.contains_key(&key) {
                Some(key)
            } else {
                Some(key.wildcard()).filter(|wildcard| subscriptions.contains_key(wildcard))
            };
            if let Some(target) = target {
                let delivered = subscriptions
                    .get(&target)
                    .map(|tx| tx.send(message).is_ok())
                    .unwrap_or(false);
                if !delivered {
                    debug!(key = %target, "Removing subscription with dropped receiver");
                    subscriptions.remove(&target);
                }
                return;
            }
        }

        debug!("Dropping unmatched message: {}", text);
    }
}

/// Turn a correlated reply into the caller's result
fn parse_reply(message: Value) -> Result<Value> {
    match message.get("error") {
        Some(error) => {
            let payload: ErrorPayload =
                serde_json::from_value(error.clone()).unwrap_or_else(|_| ErrorPayload {
                    code: "UnknownError".to_string(),
                    message: error.to_string(),
                });
            Err(ClientError::Remote {
                code: payload.code,
                message: payload.message,
            })
        }
        None => Ok(message),
    }
}

async fn open_transport(url: &str, connect_timeout: Duration) -> Result<WsStream> {
    match timeout(connect_timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(ClientError::Connect(e.to_string())),
        Err(_) => Err(ClientError::Connect(format!(
            "no connection within {:?}",
            connect_timeout
        ))),
    }
}

/// WebSocket client for the Deriv API
pub struct DerivWebSocketClient {
    /// WebSocket URL including the app id
    url: String,
    settings: ConnectionSettings,
    shared: Arc<Shared>,
    /// Task driving the current connection and its recovery
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

impl DerivWebSocketClient {
    pub fn new(url: impl Into<String>, settings: ConnectionSettings) -> Self {
        Self {
            url: url.into(),
            settings,
            shared: Arc::new(Shared::new()),
            connection_task: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected.load(Ordering::SeqCst)
    }

    /// Receive connection status changes; replaces any earlier receiver
    pub async fn status_events(&self) -> mpsc::UnboundedReceiver<ConnectionStatus> {
        let (tx, rx) = create_status_channel();
        *self.shared.status_sender.lock().await = Some(tx);
        rx
    }

    /// Number of calls still waiting for a reply
    pub async fn pending_requests(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    /// Open the connection.
    ///
    /// Resets the reconnection counter and starts the keep-alive timer.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn connect(&self) -> Result<()> {
        let mut task = self.connection_task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
            self.shared.close_connection().await;
        }

        self.shared.intentional_close.store(false, Ordering::SeqCst);
        info!("Connecting to Deriv WebSocket");
        let stream = open_transport(&self.url, self.settings.connect_timeout).await?;

        self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
        self.shared.exhausted.store(false, Ordering::SeqCst);
        let outbound = self.shared.open_outbound().await;
        info!("WebSocket connection established");
        self.shared.emit(ConnectionStatus::Connected).await;

        *task = Some(tokio::spawn(run_connection(
            self.url.clone(),
            self.settings.clone(),
            self.shared.clone(),
            stream,
            outbound,
        )));
        Ok(())
    }

    /// Send a request and wait for the reply that echoes its `req_id`
    pub async fn call<R: Serialize>(&self, request: &R) -> Result<Value> {
        let mut payload = serde_json::to_value(request)?;
        let Some(fields) = payload.as_object_mut() else {
            return Err(ClientError::Internal("request must be a JSON object".to_string()));
        };

        let req_id = self.shared.next_req_id.fetch_add(1, Ordering::SeqCst);
        fields.insert("req_id".to_string(), Value::from(req_id));

        // Registered first so a racing close either hides the queue or fails
        // this completion
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(req_id, reply_tx);

        let outbound = self.shared.outbound.lock().await.clone();
        let Some(outbound) = outbound else {
            self.shared.pending.lock().await.remove(&req_id);
            if self.shared.exhausted.load(Ordering::SeqCst) {
                return Err(ClientError::ReconnectExhausted {
                    attempts: self.settings.max_reconnect_attempts,
                });
            }
            return Err(ClientError::Disconnected("not connected".to_string()));
        };

        let text = payload.to_string();
        debug!(req_id, "Sending request: {}", text);
        if outbound.send(Message::Text(text)).is_err() {
            self.shared.pending.lock().await.remove(&req_id);
            return Err(ClientError::Disconnected("connection closed".to_string()));
        }

        match timeout(self.settings.request_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ClientError::Disconnected(format!(
                "connection closed before reply to request {}",
                req_id
            ))),
            Err(_) => {
                self.shared.pending.lock().await.remove(&req_id);
                warn!(req_id, "Request timed out");
                Err(ClientError::RequestTimeout {
                    req_id,
                    timeout: self.settings.request_timeout,
                })
            }
        }
    }

    /// Register the receiver for pushes matching `key`.
    ///
    /// Registering the same key again replaces the earlier receiver, which
    /// then yields `None`.
    pub async fn subscribe(&self, key: SubscriptionKey) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.shared.subscriptions.lock().await.insert(key.clone(), tx).is_some() {
            debug!(key = %key, "Replaced existing subscription");
        }
        rx
    }

    pub async fn unsubscribe(&self, key: &SubscriptionKey) {
        self.shared.subscriptions.lock().await.remove(key);
    }

    /// Close the connection for good. Idempotent.
    ///
    /// Cancels keep-alive and any pending reconnect, fails outstanding calls
    /// and drops every subscription.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        self.shared.intentional_close.store(true, Ordering::SeqCst);

        if let Some(outbound) = self.shared.outbound.lock().await.as_ref() {
            let _ = outbound.send(Message::Close(None));
        }
        if let Some(task) = self.connection_task.lock().await.take() {
            task.abort();
        }

        let was_connected = self.is_connected();
        self.shared.close_connection().await;
        self.shared.subscriptions.lock().await.clear();

        if was_connected {
            info!("Disconnected from Deriv");
            self.shared
                .emit(ConnectionStatus::Disconnected(Some("closed by client".to_string())))
                .await;
        }
    }
}

impl Drop for DerivWebSocketClient {
    fn drop(&mut self) {
        if let Ok(mut task) = self.connection_task.try_lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

/// Drive the connection, reconnecting after unexpected closes
async fn run_connection(
    url: String,
    settings: ConnectionSettings,
    shared: Arc<Shared>,
    mut stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        let reason = drive_connection(&shared, stream, &mut outbound, settings.keepalive_interval).await;
        shared.close_connection().await;
        if shared.intentional_close.load(Ordering::SeqCst) {
            return;
        }

        warn!(reason = ?reason, "WebSocket closed unexpectedly");
        shared.emit(ConnectionStatus::Disconnected(reason)).await;

        match reconnect(&url, &settings, &shared).await {
            Some(next) => {
                stream = next;
                outbound = shared.open_outbound().await;
                info!("WebSocket connection re-established");
                shared.emit(ConnectionStatus::Connected).await;
            }
            None => return,
        }
    }
}

/// Retry with exponential backoff until connected or out of attempts
async fn reconnect(url: &str, settings: &ConnectionSettings, shared: &Shared) -> Option<WsStream> {
    loop {
        if shared.intentional_close.load(Ordering::SeqCst) {
            return None;
        }

        let attempts = shared.reconnect_attempts.load(Ordering::SeqCst);
        if attempts >= settings.max_reconnect_attempts {
            error!(attempts, "Max reconnection attempts reached");
            shared.exhausted.store(true, Ordering::SeqCst);
            shared.emit(ConnectionStatus::ReconnectExhausted { attempts }).await;
            return None;
        }

        let attempt = attempts + 1;
        shared.reconnect_attempts.store(attempt, Ordering::SeqCst);
        let delay = backoff_delay(settings.reconnect_base_delay, attempt);
        info!(attempt, ?delay, "Scheduling reconnect");
        shared.emit(ConnectionStatus::Reconnecting { attempt, delay }).await;
        sleep(delay).await;

        match open_transport(url, settings.connect_timeout).await {
            Ok(stream) => {
                shared.reconnect_attempts.store(0, Ordering::SeqCst);
                return Some(stream);
            }
            Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
        }
    }
}

/// Pump one open connection until it closes; returns the close reason
async fn drive_connection(
    shared: &Shared,
    stream: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    keepalive_interval: Duration,
) -> Option<String> {
    let (mut write, mut read) = stream.split();
    let mut keepalive = interval_at(Instant::now() + keepalive_interval, keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => shared.dispatch(&text).await,
                    Some(Ok(Message::Ping(_))) => {
                        debug!("Received Ping");
                        // Pong is queued by tungstenite and flushed on the next write
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("WebSocket closed: {:?}", frame);
                        return Some(
                            frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "closed by server".to_string()),
                        );
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return Some(e.to_string());
                    }
                    None => {
                        info!("WebSocket stream ended");
                        return Some("stream ended".to_string());
                    }
                }
            }
            out = outbound.recv() => {
                let Some(message) = out else {
                    return Some("outbound queue closed".to_string());
                };
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    return Some(e.to_string());
                }
                if closing {
                    return None;
                }
            }
            _ = keepalive.tick() => {
                let ping = match serde_json::to_string(&PingRequest::default()) {
                    Ok(ping) => ping,
                    Err(e) => {
                        error!("Failed to encode ping: {}", e);
                        continue;
                    }
                };
                debug!("Sending keep-alive ping");
                if let Err(e) = write.send(Message::Text(ping)).await {
                    return Some(e.to_string());
                }
            }
        }
    }
}
