//! Protocol server (C8): the WebSocket upgrade route, admission-gated
//! session table, and graceful-stop barrier.
//!
//! Grounded on the `axum::extract::ws` handler shape in the retrieval
//! pack's `omnichain-demo-relayer::server` (`ws_handler`/`handle_ws`, split
//! sender/receiver, `tokio::select!` between the send and receive sides) —
//! the only pack example using this exact `WebSocketUpgrade` shape. The
//! admission gate is acquired *before* `ws.on_upgrade` runs, inside the
//! plain HTTP handler, so a queue-timeout rejection can still be answered
//! with an ordinary HTTP response instead of an upgraded-then-closed
//! socket (spec §4.7: reject "before upgrade completes").

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{info, warn};

use neuron_core::NeuronError;
use neuron_handshake::{AdmissionGate, Frame, HandshakeEngine, HandshakeTransport};

/// A `HandshakeTransport` over a real `axum` WebSocket, used outside of
/// tests (`neuron-handshake`'s own tests drive the engine over an
/// in-memory channel pair instead).
struct AxumTransport {
    sender: SplitSink<WebSocket, Message>,
    receiver: SplitStream<WebSocket>,
    closed: bool,
}

impl HandshakeTransport for AxumTransport {
    async fn recv(&mut self) -> Result<Option<Frame>, NeuronError> {
        loop {
            return match self.receiver.next().await {
                None => Ok(None),
                Some(Ok(Message::Text(text))) => Ok(Some(Frame::Text(text))),
                Some(Ok(Message::Binary(bytes))) => Ok(Some(Frame::Binary(bytes))),
                Some(Ok(Message::Close(_))) => Ok(None),
                // Ping/Pong are transport-level keepalive, not handshake
                // frames — axum answers Ping automatically; just keep
                // waiting for the next real frame.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Err(e)) => Err(NeuronError::Internal(e.to_string())),
            };
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), NeuronError> {
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|e| NeuronError::Internal(e.to_string()))
    }

    async fn close(&mut self, code: u16) -> Result<(), NeuronError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code,
            reason: std::borrow::Cow::Borrowed(""),
        };
        // A best-effort send: the peer may already be gone.
        let _ = self.sender.send(Message::Close(Some(frame))).await;
        Ok(())
    }
}

struct Inner {
    admission: Arc<AdmissionGate>,
    engine: Arc<HandshakeEngine>,
    handshake_path: String,
    stopping: AtomicBool,
    shutdown: broadcast::Sender<()>,
    open_streams: AtomicUsize,
}

/// Owns the WebSocket upgrade route for the handshake path. Cheap to
/// clone (an `Arc` inside) — `axum` state must be `Clone`.
#[derive(Clone)]
pub struct ProtocolServer(Arc<Inner>);

impl ProtocolServer {
    pub fn new(
        admission: Arc<AdmissionGate>,
        engine: Arc<HandshakeEngine>,
        handshake_path: impl Into<String>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(16);
        Self(Arc::new(Inner {
            admission,
            engine,
            handshake_path: handshake_path.into(),
            stopping: AtomicBool::new(false),
            shutdown,
            open_streams: AtomicUsize::new(0),
        }))
    }

    /// The route table for the handshake path. An external REST API layer
    /// can `.merge()` this into its own router to share one listening
    /// socket (spec §4.8) — the core never owns that router itself.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.0.handshake_path, get(upgrade_handler))
            .with_state(self.clone())
    }

    /// Currently admitted sessions, including any not yet authenticated —
    /// the admission gate's own count, per spec §9 open-question #3.
    pub fn active_sessions(&self) -> usize {
        self.0.admission.active_count()
    }

    /// Graceful-stop barrier (spec §4.8): refuse new admissions, close
    /// every open stream with code 1001, wait for every handler to finish,
    /// then return. Idempotent — a second call is a no-op.
    pub async fn stop(&self) {
        if self.0.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.0.shutdown.send(());
        while self.0.open_streams.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn upgrade_handler(
    State(server): State<ProtocolServer>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if server.0.stopping.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is stopping").into_response();
    }

    match server.0.admission.admit_owned().await {
        Ok(admission) => ws
            .on_upgrade(move |socket| async move {
                server.0.open_streams.fetch_add(1, Ordering::SeqCst);
                let mut shutdown_rx = server.0.shutdown.subscribe();
                let (sender, receiver) = socket.split();
                let mut transport = AxumTransport {
                    sender,
                    receiver,
                    closed: false,
                };

                tokio::select! {
                    result = server.0.engine.run(&mut transport) => {
                        match result {
                            Ok(outcome) => info!(relationship_id = %outcome.relationship_id, status = ?outcome.status, "handshake completed"),
                            Err(e) => warn!(error = %e, "handshake ended with an error"),
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = transport.close(1001).await;
                    }
                }

                drop(admission);
                server.0.open_streams.fetch_sub(1, Ordering::SeqCst);
            })
            .into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "admission queue deadline exceeded").into_response(),
    }
}
