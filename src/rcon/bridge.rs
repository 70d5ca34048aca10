/// WebSocket client for the game-server bridge
///
/// Frames sent: `{"id": n, "event": "...", "args": [...]}`.
/// Acknowledgements: `{"id": n, "data": ...}` or `{"id": n, "error": "..."}`.
use super::{RconConnection, ResponsePayload};
use crate::error::{DashboardError, DashboardResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

type AckSender = oneshot::Sender<Result<Value, String>>;

#[derive(Debug, Deserialize)]
struct Ack {
    id: u64,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Default)]
struct Shared {
    next_id: AtomicU64,
    connected: AtomicBool,
    pending: Mutex<HashMap<u64, AckSender>>,
}

impl Shared {
    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, AckSender>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle(&self, text: &str) {
        let ack: Ack = match serde_json::from_str(text) {
            Ok(ack) => ack,
            Err(e) => {
                debug!("Ignoring non-ack frame from bridge: {}", e);
                return;
            }
        };

        let Some(sender) = self.pending().remove(&ack.id) else {
            debug!(id = ack.id, "Acknowledgement for unknown or expired emit");
            return;
        };

        let result = match ack.error {
            Some(error) => Err(error),
            None => Ok(ack.data),
        };
        let _ = sender.send(result);
    }

    fn fail_all(&self, reason: &str) {
        let drained: Vec<AckSender> = self.pending().drain().map(|(_, tx)| tx).collect();
        if !drained.is_empty() {
            warn!(count = drained.len(), "Failing pending emits: {}", reason);
        }
        for sender in drained {
            let _ = sender.send(Err(reason.to_string()));
        }
    }
}

/// Removes a pending emit when its caller stops waiting
struct PendingAck<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        self.shared.pending().remove(&self.id);
    }
}

/// Persistent bridge connection, reconnecting on a fixed interval
#[derive(Clone)]
pub struct SocketBridge {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
}

impl SocketBridge {
    /// Start the connection task and return a handle to it.
    /// The task stops once every handle has been dropped.
    pub fn connect(url: impl Into<String>, reconnect_interval: Duration) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        tokio::spawn(run_connection(
            url.into(),
            shared.clone(),
            rx,
            reconnect_interval,
        ));

        Self { shared, outbound }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RconConnection for SocketBridge {
    async fn emit(&self, event: &str, args: Vec<Value>) -> DashboardResult<ResponsePayload> {
        if !self.is_connected() {
            return Err(DashboardError::Upstream(
                "game server bridge is not connected".to_string(),
            ));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(id, tx);
        let _guard = PendingAck {
            shared: &self.shared,
            id,
        };

        let frame = json!({ "id": id, "event": event, "args": args }).to_string();
        self.outbound
            .send(frame)
            .map_err(|_| DashboardError::Upstream("game server bridge stopped".to_string()))?;

        match rx.await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(error)) => Err(DashboardError::Upstream(error)),
            Err(_) => Err(DashboardError::Upstream(
                "connection dropped before acknowledgement".to_string(),
            )),
        }
    }
}

async fn run_connection(
    url: String,
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    reconnect_interval: Duration,
) {
    loop {
        info!("Connecting to game server bridge: {}", url);

        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Connected to game server bridge: {}", url);
                shared.connected.store(true, Ordering::SeqCst);
                let (mut sink, mut stream) = ws_stream.split();

                loop {
                    tokio::select! {
                        frame = outbound.recv() => match frame {
                            Some(frame) => {
                                if let Err(e) = sink.send(Message::Text(frame)).await {
                                    error!("Failed to send frame to bridge: {}", e);
                                    break;
                                }
                            }
                            None => {
                                info!("All bridge handles dropped, closing connection");
                                shared.connected.store(false, Ordering::SeqCst);
                                let _ = sink.send(Message::Close(None)).await;
                                return;
                            }
                        },
                        msg = stream.next() => match msg {
                            Some(Ok(Message::Text(text))) => shared.settle(&text),
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = sink.send(Message::Pong(data)).await {
                                    error!("Failed to send pong: {}", e);
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                info!("Bridge closed connection: {}", url);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("Bridge WebSocket error: {}", e);
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) => {
                error!("Failed to connect to game server bridge {}: {}", url, e);
            }
        }

        shared.connected.store(false, Ordering::SeqCst);

        // Frames queued for the dead connection will never be acknowledged
        loop {
            match outbound.try_recv() {
                Ok(_) => continue,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return,
            }
        }
        shared.fail_all("connection to game server lost");

        info!("Reconnecting in {:?}...", reconnect_interval);
        tokio::time::sleep(reconnect_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn wait_connected(bridge: &SocketBridge) {
        for _ in 0..200 {
            if bridge.is_connected() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bridge never connected");
    }

    #[tokio::test]
    async fn test_emit_round_trip_against_local_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let frame: Value = serde_json::from_str(&text).unwrap();
                let reply = if frame["event"] == "rcon.execute" {
                    json!({ "id": frame["id"], "data": format!("ran {}", frame["args"][0].as_str().unwrap()) })
                } else {
                    json!({ "id": frame["id"], "error": "unknown event" })
                };
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
        });

        let bridge = SocketBridge::connect(format!("ws://{}", addr), Duration::from_millis(50));
        wait_connected(&bridge).await;

        let ack = bridge
            .emit("rcon.execute", vec![json!("AdminKick 1 afk")])
            .await
            .unwrap();
        assert_eq!(ack, json!("ran AdminKick 1 afk"));

        let err = bridge.emit("rcon.selfDestruct", vec![]).await.unwrap_err();
        assert!(matches!(err, DashboardError::Upstream(msg) if msg == "unknown event"));
    }

    #[tokio::test]
    async fn test_emit_fails_fast_without_connection() {
        let bridge = SocketBridge::connect("ws://127.0.0.1:1", Duration::from_secs(60));

        let err = bridge.emit("players", vec![]).await.unwrap_err();
        assert!(matches!(err, DashboardError::Upstream(_)));
    }

    #[test]
    fn test_dropped_waiter_clears_pending_entry() {
        let shared = Shared::default();
        let (tx, _rx) = oneshot::channel();
        shared.pending().insert(7, tx);

        drop(PendingAck {
            shared: &shared,
            id: 7,
        });
        assert!(shared.pending().is_empty());

        shared.settle(r#"{"id": 7, "data": "late"}"#);
    }
}
