//! The tickmatch server binary: matching engine plus WebSocket transport.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use tickmatch::config::ServerConfig;
use tickmatch::protocol::ServerMessage;
use tickmatch::server::{self, AppState};
use tickmatch::Engine;

/// Frames buffered per subscriber before a slow one is forced to resync.
const FEED_DEPTH: usize = 1024;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    let scale = config.scale();
    let engine = Arc::new(Engine::new(config.engine()));
    let (feed, _) = broadcast::channel::<String>(FEED_DEPTH);

    // The sinks run on the matching worker: serialize, hand to the feed,
    // return. Socket writes happen on the subscriber tasks.
    let trade_feed = feed.clone();
    engine.install_trade_sink(move |trades| {
        match serde_json::to_string(&ServerMessage::trades(trades, scale)) {
            Ok(json) => {
                let _ = trade_feed.send(json);
            }
            Err(err) => warn!("failed to encode trade frame: {err}"),
        }
    });
    let book_feed = feed.clone();
    engine.install_book_sink(move |depth| {
        match serde_json::to_string(&ServerMessage::book(depth, scale)) {
            Ok(json) => {
                let _ = book_feed.send(json);
            }
            Err(err) => warn!("failed to encode book frame: {err}"),
        }
    });

    engine.start();
    info!("matching engine running");

    let state = AppState::new(engine.clone(), feed, scale);
    if let Err(err) = server::run(&config, state).await {
        warn!("server terminated: {err}");
    }

    engine.stop();
}
