//! JSON wire schema and boundary conversions.
//!
//! Every message carries a `type` discriminator. Prices and quantities
//! arrive as decimals and are converted to the integer tick and lot
//! representation the core uses; the core never sees a float.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{DepthSnapshot, LevelDepth, OrderId, Price, Qty, Side, Trade};

/// Messages a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Place a limit order. The transport assigns the order id.
    Add { side: Side, price: Decimal, qty: Decimal },
    /// Cancel by the id previously reported for an add.
    Cancel {
        #[serde(rename = "orderId")]
        order_id: OrderId,
    },
}

/// Messages pushed to subscribers.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full book, sent once when a subscriber attaches.
    Snapshot { bids: Vec<WireLevel>, asks: Vec<WireLevel> },
    /// Full book, sent after every book-changing command. No deltas.
    Book { bids: Vec<WireLevel>, asks: Vec<WireLevel> },
    /// All trades one matching command generated, in emission order.
    Trade { trades: Vec<WireTrade> },
}

#[derive(Debug, Serialize)]
pub struct WireLevel {
    pub price: Decimal,
    pub qty: u64,
}

#[derive(Debug, Serialize)]
pub struct WireTrade {
    pub price: Decimal,
    pub qty: Qty,
    pub maker: OrderId,
    pub taker: OrderId,
}

impl ServerMessage {
    pub fn snapshot(depth: &DepthSnapshot, scale: PriceScale) -> Self {
        ServerMessage::Snapshot {
            bids: wire_levels(&depth.bids, scale),
            asks: wire_levels(&depth.asks, scale),
        }
    }

    pub fn book(depth: &DepthSnapshot, scale: PriceScale) -> Self {
        ServerMessage::Book {
            bids: wire_levels(&depth.bids, scale),
            asks: wire_levels(&depth.asks, scale),
        }
    }

    pub fn trades(trades: &[Trade], scale: PriceScale) -> Self {
        ServerMessage::Trade {
            trades: trades
                .iter()
                .map(|t| WireTrade {
                    price: scale.to_decimal(t.price),
                    qty: t.qty,
                    maker: t.maker_id,
                    taker: t.taker_id,
                })
                .collect(),
        }
    }
}

fn wire_levels(levels: &[LevelDepth], scale: PriceScale) -> Vec<WireLevel> {
    levels
        .iter()
        .map(|l| WireLevel {
            price: scale.to_decimal(l.price),
            qty: l.volume,
        })
        .collect()
}

/// Boundary validation failures. Logged by the transport; never delivered
/// to the core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),
    #[error("price {0} is not a whole number of ticks")]
    FractionalTick(Decimal),
    #[error("price {0} exceeds the representable tick range")]
    PriceOutOfRange(Decimal),
    #[error("quantity must be a positive integer, got {0}")]
    InvalidQuantity(Decimal),
}

/// Decimal-to-tick conversion at a fixed number of ticks per price unit.
#[derive(Clone, Copy, Debug)]
pub struct PriceScale {
    ticks_per_unit: u32,
}

impl PriceScale {
    /// # Panics
    /// Panics if `ticks_per_unit` is zero.
    pub fn new(ticks_per_unit: u32) -> Self {
        assert!(ticks_per_unit > 0, "ticks_per_unit must be positive");
        Self { ticks_per_unit }
    }

    /// Decimal price to integer ticks. Rejects non-positive prices and
    /// prices that do not land on a tick.
    pub fn to_ticks(&self, price: Decimal) -> Result<Price, WireError> {
        if price <= Decimal::ZERO {
            return Err(WireError::NonPositivePrice(price));
        }
        let scaled = price * Decimal::from(self.ticks_per_unit);
        if !scaled.fract().is_zero() {
            return Err(WireError::FractionalTick(price));
        }
        scaled.to_u64().ok_or(WireError::PriceOutOfRange(price))
    }

    /// Integer ticks back to a decimal price for the wire.
    pub fn to_decimal(&self, ticks: Price) -> Decimal {
        (Decimal::from(ticks) / Decimal::from(self.ticks_per_unit)).normalize()
    }
}

/// Quantity validation: positive whole lots only.
pub fn qty_to_lots(qty: Decimal) -> Result<Qty, WireError> {
    if qty <= Decimal::ZERO || !qty.fract().is_zero() {
        return Err(WireError::InvalidQuantity(qty));
    }
    qty.to_u32().ok_or(WireError::InvalidQuantity(qty))
}
