//! WebSocket transport.
//!
//! One endpoint carries both directions: clients send `add`/`cancel`
//! commands and receive the shared broadcast feed of `book` and `trade`
//! frames. Each new subscriber gets a full `snapshot` first. The matching
//! worker never writes to sockets; its sinks serialize frames into a
//! broadcast channel and the per-client tasks relay them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::command::{Command, DepthSnapshot, OrderId, OrderSpec};
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::protocol::{qty_to_lots, ClientMessage, PriceScale, ServerMessage};

/// Shared transport state.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    feed: broadcast::Sender<String>,
    scale: PriceScale,
    next_order_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, feed: broadcast::Sender<String>, scale: PriceScale) -> Self {
        Self {
            engine,
            feed,
            scale,
            next_order_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Fresh order id for an inbound add.
    fn assign_order_id(&self) -> OrderId {
        self.next_order_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Submits block only on a full command queue; keep that off the
    /// async runtime.
    async fn submit(&self, command: Command) -> Result<(), EngineError> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.submit(command))
            .await
            .unwrap_or(Err(EngineError::Shutdown))
    }

    async fn snapshot(&self) -> Result<DepthSnapshot, EngineError> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.snapshot())
            .await
            .unwrap_or(Err(EngineError::Shutdown))
    }
}

/// Bind and serve until the listener fails or the process is stopped.
pub async fn run(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr} (feed at ws://{addr}/ws)");
    axum::serve(listener, app).await
}

async fn index() -> impl IntoResponse {
    Html(include_str!("../static/index.html"))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: AppState) {
    info!("subscriber attached");
    let (mut outbound, mut inbound) = socket.split();
    // Subscribe before the snapshot so no update between the two is lost;
    // a duplicated book frame is harmless, every frame is a full view.
    let mut feed = state.feed.subscribe();

    if !send_snapshot(&mut outbound, &state).await {
        return;
    }

    loop {
        tokio::select! {
            message = inbound.next() => match message {
                Some(Ok(Message::Text(text))) => handle_client_text(&text, &state).await,
                Some(Ok(Message::Ping(payload))) => {
                    let _ = outbound.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!("websocket receive error: {err}");
                    break;
                }
            },
            frame = feed.recv() => match frame {
                Ok(json) => {
                    if outbound.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "subscriber lagged behind the feed; resyncing");
                    if !send_snapshot(&mut outbound, &state).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    info!("subscriber detached");
}

async fn send_snapshot(outbound: &mut SplitSink<WebSocket, Message>, state: &AppState) -> bool {
    let depth = match state.snapshot().await {
        Ok(depth) => depth,
        Err(err) => {
            warn!("snapshot unavailable: {err}");
            return false;
        }
    };
    let message = ServerMessage::snapshot(&depth, state.scale);
    match serde_json::to_string(&message) {
        Ok(json) => outbound.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            warn!("failed to encode snapshot: {err}");
            false
        }
    }
}

/// Parse and validate one inbound frame. Anything a client got wrong is
/// logged and dropped here; the core only sees well-formed commands.
async fn handle_client_text(text: &str, state: &AppState) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!("malformed client message: {err}");
            return;
        }
    };

    match message {
        ClientMessage::Add { side, price, qty } => {
            let price = match state.scale.to_ticks(price) {
                Ok(price) => price,
                Err(err) => {
                    warn!("rejected add: {err}");
                    return;
                }
            };
            let qty = match qty_to_lots(qty) {
                Ok(qty) => qty,
                Err(err) => {
                    warn!("rejected add: {err}");
                    return;
                }
            };
            let spec = OrderSpec::new(state.assign_order_id(), side, price, qty);
            if let Err(err) = state.submit(Command::Submit(spec)).await {
                warn!(order_id = spec.id, "submit failed: {err}");
            }
        }
        ClientMessage::Cancel { order_id } => {
            if let Err(err) = state.submit(Command::Cancel(order_id)).await {
                warn!(order_id, "cancel failed: {err}");
            }
        }
    }
}
