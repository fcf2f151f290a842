//! Common test utilities and fixtures
//!
//! `MockVenue` is an in-process WebSocket server standing in for the Deriv
//! endpoint. Each accepted connection is handed to the test, which scripts
//! the venue side frame by frame.

#![allow(dead_code)]

use dual_barrier_trader::deriv::ConnectionSettings;
use dual_barrier_trader::ConnectionStatus;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Upper bound on any single wait in these tests
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings with short bounds so recovery paths finish quickly
pub fn fast_settings() -> ConnectionSettings {
    ConnectionSettings {
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        keepalive_interval: Duration::from_secs(60),
        max_reconnect_attempts: 3,
        reconnect_base_delay: Duration::from_millis(10),
    }
}

/// Local WebSocket server
pub struct MockVenue {
    pub url: String,
    connections: mpsc::UnboundedReceiver<VenueConnection>,
    accept_task: JoinHandle<()>,
}

impl MockVenue {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock venue");
        let addr = listener.local_addr().expect("local addr");
        let (tx, connections) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        if tx.send(VenueConnection { ws }).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("mock venue handshake failed: {}", e),
                }
            }
        });

        Self {
            url: format!("ws://{}", addr),
            connections,
            accept_task,
        }
    }

    /// Wait for the next client connection
    pub async fn accept(&mut self) -> VenueConnection {
        timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("mock venue stopped")
    }

    /// Stop listening; later connection attempts are refused
    pub async fn shutdown(&mut self) {
        self.accept_task.abort();
        let _ = (&mut self.accept_task).await;
    }
}

/// Venue side of one client connection
pub struct VenueConnection {
    ws: WebSocketStream<TcpStream>,
}

impl VenueConnection {
    /// Next JSON frame from the client; `None` once the client closed
    pub async fn next_frame(&mut self) -> Option<Value> {
        loop {
            let message = timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for a client frame")?;
            match message {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).expect("client sent invalid JSON"))
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Next request frame, skipping keep-alive pings
    pub async fn next_request(&mut self) -> Value {
        loop {
            let frame = self.next_frame().await.expect("client closed the connection");
            if frame.get("ping").is_none() {
                return frame;
            }
        }
    }

    pub async fn send(&mut self, message: Value) {
        self.ws
            .send(Message::Text(message.to_string()))
            .await
            .expect("send to client");
    }

    /// Answer `request`, echoing its `req_id` and payload like the venue does
    pub async fn reply(&mut self, request: &Value, msg_type: &str, body: Value) {
        let mut reply = json!({
            "msg_type": msg_type,
            "req_id": request["req_id"],
            "echo_req": request,
        });
        if let (Some(reply), Some(body)) = (reply.as_object_mut(), body.as_object()) {
            reply.extend(body.clone());
        }
        self.send(reply).await;
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Next connection status event, failing the test after a bound
pub async fn next_status(events: &mut mpsc::UnboundedReceiver<ConnectionStatus>) -> ConnectionStatus {
    timeout(STEP_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a status event")
        .expect("status channel closed")
}

/// A tick push as the venue sends it
pub fn tick_push(symbol: &str, quote: f64) -> Value {
    json!({
        "msg_type": "tick",
        "tick": {"symbol": symbol, "quote": quote, "epoch": 1_700_000_000, "pip_size": 2},
        "subscription": {"id": format!("sub-{}", symbol)}
    })
}
