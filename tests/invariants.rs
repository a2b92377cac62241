//! Randomized differential test against a naive reference book.
//!
//! The reference is slow and obviously correct: ordered maps of plain
//! FIFO queues. After every applied command the optimized core must agree
//! with it on depth, best prices and generated fills, and the core's own
//! invariant walk must pass.

use std::collections::{BTreeMap, HashMap, VecDeque};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tickmatch::{MatchingEngine, OrderSpec, Side};

/// Minimal price-time book: price -> FIFO of (order_id, remaining).
struct ReferenceBook {
    bids: BTreeMap<u64, VecDeque<(u64, u32)>>,
    asks: BTreeMap<u64, VecDeque<(u64, u32)>>,
    resting: HashMap<u64, (Side, u64)>,
}

impl ReferenceBook {
    fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            resting: HashMap::new(),
        }
    }

    /// Returns fills as (price, qty, maker_id).
    fn place(&mut self, id: u64, side: Side, price: u64, mut qty: u32) -> Vec<(u64, u32, u64)> {
        if self.resting.contains_key(&id) {
            return Vec::new();
        }

        let mut fills = Vec::new();
        let opposite_prices: Vec<u64> = match side {
            Side::Buy => self.asks.range(..=price).map(|(&p, _)| p).collect(),
            Side::Sell => self.bids.range(price..).rev().map(|(&p, _)| p).collect(),
        };

        for level_price in opposite_prices {
            if qty == 0 {
                break;
            }
            let book = match side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let queue = book.get_mut(&level_price).unwrap();
            while let Some(&(maker_id, maker_qty)) = queue.front() {
                if qty == 0 {
                    break;
                }
                let fill = qty.min(maker_qty);
                fills.push((level_price, fill, maker_id));
                qty -= fill;
                if fill == maker_qty {
                    queue.pop_front();
                    self.resting.remove(&maker_id);
                } else {
                    queue.front_mut().unwrap().1 -= fill;
                }
            }
            if queue.is_empty() {
                book.remove(&level_price);
            }
        }

        if qty > 0 {
            let book = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            book.entry(price).or_default().push_back((id, qty));
            self.resting.insert(id, (side, price));
        }

        fills
    }

    fn cancel(&mut self, id: u64) -> bool {
        let Some((side, price)) = self.resting.remove(&id) else {
            return false;
        };
        let book = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let Some(queue) = book.get_mut(&price) {
            queue.retain(|&(queued_id, _)| queued_id != id);
            if queue.is_empty() {
                book.remove(&price);
            }
        }
        true
    }

    /// (bids highest-first, asks lowest-first) as (price, volume).
    fn depth(&self) -> (Vec<(u64, u64)>, Vec<(u64, u64)>) {
        let side_depth = |levels: &BTreeMap<u64, VecDeque<(u64, u32)>>| -> Vec<(u64, u64)> {
            levels
                .iter()
                .map(|(&p, q)| (p, q.iter().map(|&(_, qty)| qty as u64).sum()))
                .collect()
        };
        let mut bids = side_depth(&self.bids);
        bids.reverse();
        (bids, side_depth(&self.asks))
    }
}

fn compare_depth(matcher: &MatchingEngine, reference: &ReferenceBook, op: usize) {
    let depth = matcher.depth_snapshot();
    let (ref_bids, ref_asks) = reference.depth();
    let bids: Vec<(u64, u64)> = depth.bids.iter().map(|l| (l.price, l.volume)).collect();
    let asks: Vec<(u64, u64)> = depth.asks.iter().map(|l| (l.price, l.volume)).collect();
    assert_eq!(bids, ref_bids, "bid depth diverged at op {op}");
    assert_eq!(asks, ref_asks, "ask depth diverged at op {op}");
}

#[test]
fn random_workload_matches_reference() {
    const SEED: u64 = 0x5EED_50DA;
    const OPS: usize = 10_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut matcher = MatchingEngine::new(65_536);
    let mut reference = ReferenceBook::new();

    let mut seq = 0u64;
    let mut next_id = 1u64;
    let mut live_ids: Vec<u64> = Vec::new();
    // order id -> (initial qty, filled so far), for the overfill property.
    let mut fill_ledger: HashMap<u64, (u32, u64)> = HashMap::new();

    for op in 0..OPS {
        if live_ids.is_empty() || rng.gen_bool(0.7) {
            let id = next_id;
            next_id += 1;
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let price = rng.gen_range(9_800..10_200);
            let qty = rng.gen_range(1..200);

            seq += 1;
            let outcome = matcher
                .apply_incoming(&OrderSpec::new(id, side, price, qty), seq)
                .expect("ids are unique");
            let ref_fills = reference.place(id, side, price, qty);

            let fills: Vec<(u64, u32, u64)> = outcome
                .trades
                .iter()
                .map(|t| (t.price, t.qty, t.maker_id))
                .collect();
            assert_eq!(fills, ref_fills, "fills diverged at op {op}");

            fill_ledger.insert(id, (qty, 0));
            for trade in &outcome.trades {
                assert_eq!(trade.taker_id, id, "taker is always the incoming order");
                let maker = fill_ledger.get_mut(&trade.maker_id).expect("maker was submitted");
                maker.1 += trade.qty as u64;
                assert!(
                    maker.1 <= maker.0 as u64,
                    "maker {} overfilled at op {op}",
                    trade.maker_id
                );
                let taker = fill_ledger.get_mut(&id).unwrap();
                taker.1 += trade.qty as u64;
                assert!(taker.1 <= taker.0 as u64, "taker {id} overfilled at op {op}");
            }

            if outcome.rested {
                live_ids.push(id);
            }
            assert_eq!(outcome.dropped_qty, 0, "arena sized for the workload");
        } else {
            let slot = rng.gen_range(0..live_ids.len());
            let id = live_ids.swap_remove(slot);
            let hit = matcher.cancel(id);
            let ref_hit = reference.cancel(id);
            // The optimized book may have filled the order since it rested.
            assert_eq!(hit, ref_hit, "cancel outcome diverged at op {op}");
        }

        matcher.assert_invariants();
        compare_depth(&matcher, &reference, op);
        assert_eq!(
            matcher.order_count(),
            reference.resting.len(),
            "resting count diverged at op {op}"
        );
    }
}

#[test]
fn duplicate_ids_are_ignored_like_the_reference() {
    let mut matcher = MatchingEngine::new(1024);
    let mut reference = ReferenceBook::new();

    let mut seq = 0u64;
    for (id, side, price, qty) in [
        (1u64, Side::Buy, 100u64, 10u32),
        (2, Side::Sell, 105, 10),
        (1, Side::Sell, 90, 50), // duplicate id, dropped
        (3, Side::Sell, 100, 4),
    ] {
        seq += 1;
        let fills = match matcher.apply_incoming(&OrderSpec::new(id, side, price, qty), seq) {
            Ok(outcome) => outcome
                .trades
                .iter()
                .map(|t| (t.price, t.qty, t.maker_id))
                .collect(),
            Err(_) => Vec::new(),
        };
        let ref_fills = reference.place(id, side, price, qty);
        assert_eq!(fills, ref_fills);
        matcher.assert_invariants();
    }

    compare_depth(&matcher, &reference, 0);
}

#[test]
fn heavy_churn_single_level() {
    const OPS: usize = 5_000;
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
    let mut matcher = MatchingEngine::new(8_192);
    let mut reference = ReferenceBook::new();

    let mut seq = 0u64;
    let mut live: Vec<u64> = Vec::new();
    for op in 0..OPS {
        let id = op as u64 + 1;
        // Everything lands on one of two adjacent prices, maximizing
        // same-level FIFO churn and level create/drop cycles.
        let price = 10_000 + u64::from(rng.gen_bool(0.5));
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };

        seq += 1;
        let outcome = matcher
            .apply_incoming(&OrderSpec::new(id, side, price, 10), seq)
            .unwrap();
        reference.place(id, side, price, 10);
        if outcome.rested {
            live.push(id);
        }

        if live.len() > 32 {
            let cancel_id = live.swap_remove(rng.gen_range(0..live.len()));
            assert_eq!(matcher.cancel(cancel_id), reference.cancel(cancel_id));
        }

        matcher.assert_invariants();
        compare_depth(&matcher, &reference, op);
    }
}
