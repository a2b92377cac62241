//! One price level: a FIFO queue of resting orders.
//!
//! The queue is a doubly-linked list threaded through arena nodes, so
//! head-pop (matching), tail-push (resting) and mid-erase (cancel) are all
//! O(1).
//!
//! Volume accounting rule: every fill subtracts from `total_volume` as it
//! decrements the node's `remaining_qty`, and unlinking subtracts whatever
//! the node still carries. One rule covers fills, pops and cancels.

use crate::arena::{Arena, ArenaIndex, NULL_INDEX};
use crate::command::Qty;

/// FIFO queue of all orders resting at a single price.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    /// Oldest order, first to match.
    head: ArenaIndex,
    /// Newest order, last to match.
    tail: ArenaIndex,
    /// Sum of `remaining_qty` over the queue.
    pub total_volume: u64,
    /// Number of orders in the queue.
    pub order_count: u32,
}

impl PriceLevel {
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_volume: 0,
            order_count: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.order_count == 0
    }

    /// Oldest order in the queue, or `NULL_INDEX` when empty.
    #[inline]
    pub const fn head(&self) -> ArenaIndex {
        self.head
    }

    /// Append a node at the tail. The node's `remaining_qty` joins the
    /// level volume.
    #[inline]
    pub fn push_back(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let qty = arena.get(index).remaining_qty;

        if self.tail == NULL_INDEX {
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
            let node = arena.get_mut(index);
            node.prev = NULL_INDEX;
            node.next = NULL_INDEX;
        } else {
            arena.get_mut(self.tail).next = index;
            let node = arena.get_mut(index);
            node.prev = self.tail;
            node.next = NULL_INDEX;
            self.tail = index;
        }

        self.order_count += 1;
        self.total_volume += qty as u64;
    }

    /// Unlink and return the head. The node's current `remaining_qty` leaves
    /// the level volume; the node itself stays allocated for the caller.
    #[inline]
    pub fn pop_front(&mut self, arena: &mut Arena) -> Option<ArenaIndex> {
        if self.head == NULL_INDEX {
            return None;
        }

        let index = self.head;
        let node = arena.get(index);
        let next = node.next;
        let qty = node.remaining_qty;

        if next == NULL_INDEX {
            self.head = NULL_INDEX;
            self.tail = NULL_INDEX;
        } else {
            self.head = next;
            arena.get_mut(next).prev = NULL_INDEX;
        }

        self.order_count -= 1;
        self.total_volume -= qty as u64;

        let node = arena.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        Some(index)
    }

    /// Unlink a node from anywhere in the queue (the cancel path).
    ///
    /// Returns `true` when the level is now empty. The node stays allocated
    /// for the caller to release.
    #[inline]
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) -> bool {
        let node = arena.get(index);
        let prev = node.prev;
        let next = node.next;
        let qty = node.remaining_qty;

        match (prev, next) {
            (NULL_INDEX, NULL_INDEX) => {
                debug_assert!(self.head == index && self.tail == index);
                self.head = NULL_INDEX;
                self.tail = NULL_INDEX;
            }
            (NULL_INDEX, next) => {
                debug_assert!(self.head == index);
                self.head = next;
                arena.get_mut(next).prev = NULL_INDEX;
            }
            (prev, NULL_INDEX) => {
                debug_assert!(self.tail == index);
                self.tail = prev;
                arena.get_mut(prev).next = NULL_INDEX;
            }
            (prev, next) => {
                arena.get_mut(prev).next = next;
                arena.get_mut(next).prev = prev;
            }
        }

        self.order_count -= 1;
        self.total_volume -= qty as u64;

        let node = arena.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.is_empty()
    }

    /// Account for a partial or full fill of a queued order. The caller
    /// decrements the node's `remaining_qty` by the same amount.
    #[inline]
    pub fn reduce_volume(&mut self, qty: Qty) {
        debug_assert!(self.total_volume >= qty as u64);
        self.total_volume -= qty as u64;
    }

    /// Walk the queue head to tail.
    pub fn iter<'a>(&self, arena: &'a Arena) -> LevelIter<'a> {
        LevelIter {
            arena,
            cursor: self.head,
        }
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

/// Head-to-tail iterator over a level's arena indices.
pub struct LevelIter<'a> {
    arena: &'a Arena,
    cursor: ArenaIndex,
}

impl Iterator for LevelIter<'_> {
    type Item = ArenaIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NULL_INDEX {
            return None;
        }
        let index = self.cursor;
        self.cursor = self.arena.get(index).next;
        Some(index)
    }
}
