//! The cross/rest matching procedure.
//!
//! An incoming order first crosses against the opposite side under strict
//! price-time priority (better prices first, FIFO within a level, equality
//! crosses, trades at the maker's price), then any residual rests at the
//! tail of its own side's level.

use chrono::Utc;

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};
use crate::book::OrderBook;
use crate::command::{DepthSnapshot, OrderId, OrderSpec, Price, Qty, Side, Trade};
use crate::error::BookError;

/// What applying one submit command did to the book.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Fills in the order they were generated.
    pub trades: Vec<Trade>,
    /// True if a residual was linked into the book.
    pub rested: bool,
    /// Residual that could not rest because the arena was full. Trades
    /// already generated stand; the caller decides how loudly to complain.
    pub dropped_qty: Qty,
}

/// Matching core: the arena of resting orders plus the book that organizes
/// them. Owned exclusively by the engine worker.
pub struct MatchingEngine {
    pub arena: Arena,
    pub book: OrderBook,
}

impl MatchingEngine {
    /// `capacity` bounds the number of simultaneously resting orders.
    pub fn new(capacity: u32) -> Self {
        Self {
            arena: Arena::new(capacity),
            book: OrderBook::new(),
        }
    }

    /// Apply an incoming limit order.
    ///
    /// Fails with `DuplicateOrderId` when the id is already resting; the
    /// book is untouched in that case. Otherwise crosses, then rests the
    /// residual, and returns the trades in emission order.
    pub fn apply_incoming(
        &mut self,
        spec: &OrderSpec,
        arrival_seq: u64,
    ) -> Result<ApplyOutcome, BookError> {
        debug_assert!(spec.qty > 0, "zero-qty orders are rejected at the transport");

        if self.book.contains(spec.id) {
            return Err(BookError::DuplicateOrderId(spec.id));
        }

        let mut outcome = ApplyOutcome::default();
        let remaining = self.cross(spec, &mut outcome.trades);

        if remaining > 0 {
            if self.rest(spec, remaining, arrival_seq) {
                outcome.rested = true;
            } else {
                outcome.dropped_qty = remaining;
            }
        }

        Ok(outcome)
    }

    /// Cancel a resting order. `false` for unknown ids; that is not an
    /// error.
    pub fn cancel(&mut self, order_id: OrderId) -> bool {
        match self.book.remove_resting(&mut self.arena, order_id) {
            Some(loc) => {
                self.arena.free(loc.node);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Crossing
    // ========================================================================

    /// Walk opposite levels in price order until the taker is exhausted or
    /// the price gate closes. Returns the unfilled quantity.
    fn cross(&mut self, taker: &OrderSpec, trades: &mut Vec<Trade>) -> Qty {
        let mut remaining = taker.qty;

        while remaining > 0 {
            let level_price = match self.book.best_opposite(taker.side) {
                Some(price) => price,
                None => break,
            };
            if !prices_cross(taker.side, taker.price, level_price) {
                break;
            }
            remaining = self.fill_level(taker, level_price, remaining, trades);
        }

        remaining
    }

    /// Consume the FIFO queue at one opposite level, oldest maker first.
    fn fill_level(
        &mut self,
        taker: &OrderSpec,
        price: Price,
        mut remaining: Qty,
        trades: &mut Vec<Trade>,
    ) -> Qty {
        let maker_side = taker.side.opposite();

        while remaining > 0 {
            let head = match self.book.level(maker_side, price) {
                Some(level) => level.head(),
                None => break,
            };
            if head == NULL_INDEX {
                break;
            }

            let (maker_id, maker_remaining) = {
                let node = self.arena.get(head);
                (node.order_id, node.remaining_qty)
            };

            let fill = remaining.min(maker_remaining);
            trades.push(Trade {
                price,
                qty: fill,
                maker_id,
                taker_id: taker.id,
                ts_ms: Utc::now().timestamp_millis(),
            });

            remaining -= fill;
            self.arena.get_mut(head).remaining_qty -= fill;
            let level = self
                .book
                .level_mut(maker_side, price)
                .expect("level vanished mid-fill");
            level.reduce_volume(fill);

            if fill == maker_remaining {
                // Maker fully consumed: unlink, unindex, release the node.
                let emptied = {
                    let level = self
                        .book
                        .level_mut(maker_side, price)
                        .expect("level vanished mid-fill");
                    level.pop_front(&mut self.arena);
                    level.is_empty()
                };
                self.book.unindex(maker_id);
                self.arena.free(head);
                if emptied {
                    self.book.drop_empty_level(maker_side, price);
                    break;
                }
            }
        }

        remaining
    }

    /// Rest the residual at the tail of its own side. Returns `false` when
    /// the arena is out of nodes.
    fn rest(&mut self, taker: &OrderSpec, residual: Qty, arrival_seq: u64) -> bool {
        let idx: ArenaIndex = match self.arena.alloc() {
            Some(idx) => idx,
            None => return false,
        };

        let node = self.arena.get_mut(idx);
        node.order_id = taker.id;
        node.price = taker.price;
        node.initial_qty = taker.qty;
        node.remaining_qty = residual;
        node.arrival_seq = arrival_seq;

        self.book
            .insert_resting(&mut self.arena, taker.id, taker.side, taker.price, idx);
        true
    }

    // ========================================================================
    // Read Side
    // ========================================================================

    /// Aggregated depth, best-first per side.
    #[inline]
    pub fn depth_snapshot(&self) -> DepthSnapshot {
        self.book.depth()
    }

    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.book.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.book.best_ask()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Pre-fault arena pages before the first command.
    pub fn warm_up(&mut self) {
        self.arena.warm_up();
    }

    /// Panic if any book invariant is broken. Invariants are contracts, not
    /// user input; a violation means a bug in the core.
    pub fn assert_invariants(&self) {
        if let Err(violation) = self.book.validate(&self.arena) {
            panic!("order book invariant violated: {violation}");
        }
    }
}

/// Price gate: equality crosses. A buy matches any ask at or below its
/// limit, a sell any bid at or above.
#[inline]
fn prices_cross(taker_side: Side, taker_price: Price, level_price: Price) -> bool {
    match taker_side {
        Side::Buy => taker_price >= level_price,
        Side::Sell => taker_price <= level_price,
    }
}
