//! # tickmatch
//!
//! A continuous-auction limit order book for a single instrument, matched
//! under strict price-time priority and published over a WebSocket
//! broadcast feed.
//!
//! ## Design
//!
//! - **Single-writer**: one worker thread owns the book; producers only
//!   enqueue commands
//! - **O(1) cancels**: the order index stores handles into intrusive
//!   per-level queues
//! - **Integer prices**: decimal conversion happens at the wire boundary,
//!   never on the matching path
//! - **Full-snapshot feed**: every book change broadcasts the whole depth,
//!   so subscribers need no delta bookkeeping
//!
//! ## Architecture
//!
//! ```text
//! [WebSocket clients] --add/cancel--> [bounded queue] --> [worker thread]
//!          ^                                                   |
//!          |                                            trade + book sinks
//!          `------------- broadcast feed <---------------------'
//! ```

pub mod arena;
pub mod book;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod price_level;
pub mod protocol;
pub mod server;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
pub use book::{OrderBook, OrderLocation};
pub use command::{
    Command, DepthSnapshot, LevelDepth, OrderId, OrderSpec, Price, Qty, Side, Trade,
};
pub use engine::{Engine, EngineConfig};
pub use error::{BookError, EngineError};
pub use matching::{ApplyOutcome, MatchingEngine};
pub use price_level::PriceLevel;
