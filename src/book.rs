//! The central limit order book.
//!
//! Two ordered maps of price levels (bids walked highest-first, asks
//! lowest-first), a cached best price per side, and the order index that
//! makes cancellation O(1). A level with an empty queue never stays in a
//! map, and the book is never crossed at rest.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex};
use crate::command::{DepthSnapshot, LevelDepth, OrderId, Price, Side};
use crate::price_level::PriceLevel;

/// Where a resting order lives: which side, which level, which node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderLocation {
    pub side: Side,
    pub price: Price,
    pub node: ArenaIndex,
}

/// Book sides plus the cancellation index.
///
/// Ordered maps keep level insertion and empty-level removal at O(log N)
/// in the number of active levels; the cached best prices make best-price
/// reads O(1).
pub struct OrderBook {
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    best_bid: Option<Price>,
    best_ask: Option<Price>,
    /// OrderId -> location, for every resting order and nothing else.
    index: FxHashMap<OrderId, OrderLocation>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            best_bid: None,
            best_ask: None,
            index: FxHashMap::default(),
        }
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Highest resting buy price.
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.best_bid
    }

    /// Lowest resting sell price.
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.best_ask
    }

    /// Best price an incoming order on `taker_side` would match against.
    #[inline]
    pub fn best_opposite(&self, taker_side: Side) -> Option<Price> {
        match taker_side {
            Side::Buy => self.best_ask,
            Side::Sell => self.best_bid,
        }
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    #[inline]
    fn side_levels(&self, side: Side) -> &BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    #[inline]
    fn side_levels_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    #[inline]
    pub fn level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        self.side_levels(side).get(&price)
    }

    #[inline]
    pub fn level_mut(&mut self, side: Side, price: Price) -> Option<&mut PriceLevel> {
        self.side_levels_mut(side).get_mut(&price)
    }

    /// Number of active levels on one side.
    pub fn level_count(&self, side: Side) -> usize {
        self.side_levels(side).len()
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// True if an order with this id is resting in the book.
    #[inline]
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    #[inline]
    pub fn locate(&self, order_id: OrderId) -> Option<&OrderLocation> {
        self.index.get(&order_id)
    }

    /// Link an already-populated node at the tail of its level, creating
    /// the level if absent, and index it for cancellation.
    ///
    /// The caller guarantees the id is not already indexed.
    pub fn insert_resting(
        &mut self,
        arena: &mut Arena,
        order_id: OrderId,
        side: Side,
        price: Price,
        node: ArenaIndex,
    ) {
        debug_assert!(!self.index.contains_key(&order_id), "duplicate id reached the book");

        self.index.insert(order_id, OrderLocation { side, price, node });

        let level = self
            .side_levels_mut(side)
            .entry(price)
            .or_insert_with(PriceLevel::new);
        level.push_back(arena, node);

        self.raise_best(side, price);
    }

    /// Unlink a resting order via its stored handle (the cancel path).
    ///
    /// Returns the order's location so the caller can release the node, or
    /// `None` if the id is unknown.
    pub fn remove_resting(&mut self, arena: &mut Arena, order_id: OrderId) -> Option<OrderLocation> {
        let loc = self.index.remove(&order_id)?;

        if let Some(level) = self.level_mut(loc.side, loc.price) {
            let emptied = level.remove(arena, loc.node);
            if emptied {
                self.drop_empty_level(loc.side, loc.price);
            }
        }

        Some(loc)
    }

    /// Drop the index entry of a maker that was fully consumed by matching.
    /// The matching loop unlinks the node itself.
    #[inline]
    pub fn unindex(&mut self, order_id: OrderId) {
        self.index.remove(&order_id);
    }

    /// Remove a level whose queue just emptied and refresh the cached best
    /// price if it was the best.
    pub fn drop_empty_level(&mut self, side: Side, price: Price) {
        debug_assert!(self.level(side, price).map_or(true, |l| l.is_empty()));

        match side {
            Side::Buy => {
                self.bids.remove(&price);
                if self.best_bid == Some(price) {
                    self.best_bid = self.bids.keys().next_back().copied();
                }
            }
            Side::Sell => {
                self.asks.remove(&price);
                if self.best_ask == Some(price) {
                    self.best_ask = self.asks.keys().next().copied();
                }
            }
        }
    }

    fn raise_best(&mut self, side: Side, price: Price) {
        match side {
            Side::Buy => {
                if self.best_bid.map_or(true, |best| price > best) {
                    self.best_bid = Some(price);
                }
            }
            Side::Sell => {
                if self.best_ask.map_or(true, |best| price < best) {
                    self.best_ask = Some(price);
                }
            }
        }
    }

    // ========================================================================
    // Read Side
    // ========================================================================

    /// Aggregated depth, best-first on each side.
    pub fn depth(&self) -> DepthSnapshot {
        DepthSnapshot {
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(&price, level)| LevelDepth { price, volume: level.total_volume })
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(&price, level)| LevelDepth { price, volume: level.total_volume })
                .collect(),
        }
    }

    /// Number of resting orders.
    #[inline]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Full structural walk. Checks every book invariant: index and queues
    /// agree both ways, level volumes and counts add up, arrival sequence
    /// is strictly increasing head to tail, no empty levels, no zero-qty
    /// orders, the cached best prices are right, and the book is not
    /// crossed. Intended for debug builds and tests; O(book).
    pub fn validate(&self, arena: &Arena) -> Result<(), String> {
        let mut queued: usize = 0;

        for (side, levels) in [(Side::Buy, &self.bids), (Side::Sell, &self.asks)] {
            for (&price, level) in levels {
                if level.is_empty() {
                    return Err(format!("{side:?} level {price} is empty but mapped"));
                }

                let mut volume: u64 = 0;
                let mut count: u32 = 0;
                let mut last_seq: Option<u64> = None;

                for idx in level.iter(arena) {
                    let node = arena.get(idx);
                    if node.remaining_qty == 0 {
                        return Err(format!("order {} queued with zero remaining", node.order_id));
                    }
                    if node.remaining_qty > node.initial_qty {
                        return Err(format!("order {} overfilled", node.order_id));
                    }
                    if node.price != price {
                        return Err(format!(
                            "order {} priced {} inside level {price}",
                            node.order_id, node.price
                        ));
                    }
                    if let Some(prev) = last_seq {
                        if node.arrival_seq <= prev {
                            return Err(format!(
                                "arrival_seq not increasing at {side:?} level {price}"
                            ));
                        }
                    }
                    last_seq = Some(node.arrival_seq);

                    match self.index.get(&node.order_id) {
                        Some(loc) if loc.side == side && loc.price == price && loc.node == idx => {}
                        Some(_) => {
                            return Err(format!("index entry for {} is stale", node.order_id))
                        }
                        None => {
                            return Err(format!("order {} queued but not indexed", node.order_id))
                        }
                    }

                    volume += node.remaining_qty as u64;
                    count += 1;
                    queued += 1;
                }

                if volume != level.total_volume {
                    return Err(format!(
                        "{side:?} level {price} volume {} != sum {volume}",
                        level.total_volume
                    ));
                }
                if count != level.order_count {
                    return Err(format!(
                        "{side:?} level {price} count {} != walked {count}",
                        level.order_count
                    ));
                }
            }
        }

        if queued != self.index.len() {
            return Err(format!(
                "index holds {} entries but {queued} orders are queued",
                self.index.len()
            ));
        }

        if self.best_bid != self.bids.keys().next_back().copied() {
            return Err("cached best bid is stale".to_string());
        }
        if self.best_ask != self.asks.keys().next().copied() {
            return Err("cached best ask is stale".to_string());
        }
        if let (Some(bid), Some(ask)) = (self.best_bid, self.best_ask) {
            if bid >= ask {
                return Err(format!("book crossed at rest: {bid} >= {ask}"));
            }
        }

        Ok(())
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid)
            .field("best_ask", &self.best_ask)
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.index.len())
            .finish()
    }
}
