//! WebSocket transport server using Axum.
//!
//! Handles HTTP upgrade to WebSocket and moves messages between clients and
//! the message handler. Each text frame carries one message; each response
//! goes back as its own text frame, in the order the handler emits them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use repl_protocol::{Message, Response, Status};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Trait implemented by the router to handle incoming messages.
/// The transport calls this once per decoded message, in arrival order.
pub trait MessageHandler: Send + Sync + 'static {
    /// Admit a message and return the channel its responses arrive on.
    /// The channel closes once the message is fully processed.
    fn dispatch(&self, message: Message) -> mpsc::UnboundedReceiver<Response>;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7070,
            hostname: "127.0.0.1".into(),
            max_connections: Some(32),
        }
    }
}

/// Shared state for the transport server.
struct AppState<H: MessageHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    /// Connected client count (for health check)
    client_count: AtomicUsize,
}

/// The transport server: accepts WebSocket connections and routes messages.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given message handler.
    pub async fn start<H: MessageHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Self::start_shared(config, Arc::new(handler)).await
    }

    /// Start the transport server with a handler shared with other
    /// subsystems.
    pub async fn start_shared<H: MessageHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            client_count: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("REPL transport listening on ws://{}:{}/ws", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("REPL transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: MessageHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    if let Some(max) = state.config.max_connections {
        let current = state.client_count.load(Ordering::Relaxed);
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler<H: MessageHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Relaxed),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection<H: MessageHandler>(socket: WebSocket, state: Arc<AppState<H>>) {
    state.client_count.fetch_add(1, Ordering::Relaxed);

    let client_id = uuid::Uuid::new_v4().to_string();
    info!("Client connected: {client_id}");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Responses from every message of this connection funnel through here.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Response>();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match decode_frame(&text) {
                            Ok(message) => {
                                // Dispatch inline so admission follows arrival order.
                                let mut responses = state.handler.dispatch(message);
                                let out = out_tx.clone();
                                tokio::spawn(async move {
                                    while let Some(response) = responses.recv().await {
                                        if out.send(response).is_err() {
                                            break;
                                        }
                                    }
                                });
                            }
                            Err(response) => {
                                debug!("Malformed frame from {client_id}");
                                let _ = out_tx.send(response);
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = ws_tx.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("Client disconnected: {client_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {client_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            Some(response) = out_rx.recv() => {
                let text = match serde_json::to_string(&response) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode response {}: {e}", response.id);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(WsMessage::Text(text.into())).await {
                    error!("Failed to send response to {client_id}: {e}");
                    break;
                }
            }
        }
    }

    state.client_count.fetch_sub(1, Ordering::Relaxed);
    info!(
        "Client disconnected: {client_id} (total: {})",
        state.client_count.load(Ordering::Relaxed)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Decode one text frame. A frame that is not a valid message becomes the
/// `{error, malformed-message}` response to send back instead, echoing the
/// id when one can be read.
pub fn decode_frame(text: &str) -> Result<Message, Response> {
    let value: Value = serde_json::from_str(text).map_err(|e| malformed(None, e.to_string()))?;
    let id = value.get("id").and_then(Value::as_str).map(str::to_owned);
    Message::from_value(value).map_err(|e| malformed(id, e.to_string()))
}

fn malformed(id: Option<String>, err: String) -> Response {
    Response::new(id.unwrap_or_default())
        .with_status([Status::ERROR, Status::MALFORMED_MESSAGE])
        .with_field("err", err)
}
