//! Commands and market events.
//!
//! Commands are inputs from producers (network handlers, test drivers).
//! Trades and depth snapshots are what the engine hands back out.

use serde::{Deserialize, Serialize};

/// Price in integer ticks. The engine never compares floats; the transport
/// converts decimal prices to ticks at the boundary.
pub type Price = u64;

/// Order quantity in lots.
pub type Qty = u32;

/// Client-visible order identifier, assigned by the transport before
/// submission.
pub type OrderId = u64;

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Returns the side an incoming order matches against.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

// ============================================================================
// Input Commands
// ============================================================================

/// Payload of a submit command. `arrival_seq` is not part of the payload;
/// the engine assigns it when the command is dequeued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderSpec {
    /// Transport-assigned order id.
    pub id: OrderId,
    pub side: Side,
    /// Limit price in ticks.
    pub price: Price,
    /// Initial quantity, strictly positive.
    pub qty: Qty,
}

impl OrderSpec {
    #[inline]
    pub const fn new(id: OrderId, side: Side, price: Price, qty: Qty) -> Self {
        Self { id, side, price, qty }
    }
}

/// Commands accepted by the engine queue.
#[derive(Clone, Copy, Debug)]
pub enum Command {
    /// Place a new limit order.
    Submit(OrderSpec),
    /// Cancel a resting order by id.
    Cancel(OrderId),
    /// Drain marker. The worker exits when it dequeues this; `Engine::stop`
    /// enqueues it and joins.
    Shutdown,
}

// ============================================================================
// Output Events
// ============================================================================

/// A single fill. `maker_id` is the resting order, `taker_id` the incoming
/// one. Trades execute at the maker's price.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trade {
    pub price: Price,
    pub qty: Qty,
    pub maker_id: OrderId,
    pub taker_id: OrderId,
    /// Wall-clock time of the fill, unix milliseconds.
    pub ts_ms: i64,
}

/// Aggregated volume at one price.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelDepth {
    pub price: Price,
    pub volume: u64,
}

/// Aggregated view of the whole book, best-first on each side.
/// Individual orders are not exposed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DepthSnapshot {
    /// Bid levels, highest price first.
    pub bids: Vec<LevelDepth>,
    /// Ask levels, lowest price first.
    pub asks: Vec<LevelDepth>,
}

impl DepthSnapshot {
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
