//! Golden-master determinism: the same command sequence must produce the
//! same fills and the same final book on every run.
//!
//! Trade timestamps are wall-clock and excluded from the hashes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tickmatch::{Command, MatchingEngine, OrderSpec, Side};

fn generate_commands(seed: u64, count: usize) -> Vec<Command> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut commands = Vec::with_capacity(count);
    let mut live_ids: Vec<u64> = Vec::new();
    let mut next_id = 1u64;

    for _ in 0..count {
        if live_ids.is_empty() || rng.gen_bool(0.7) {
            let id = next_id;
            next_id += 1;
            commands.push(Command::Submit(OrderSpec::new(
                id,
                if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
                rng.gen_range(9_500..10_500),
                rng.gen_range(1..500),
            )));
            live_ids.push(id);
        } else {
            let slot = rng.gen_range(0..live_ids.len());
            commands.push(Command::Cancel(live_ids.swap_remove(slot)));
        }
    }

    commands
}

/// Replay the sequence and hash everything observable except timestamps.
fn run_and_hash(commands: &[Command]) -> (u64, u64) {
    let mut matcher = MatchingEngine::new(100_000);
    let mut seq = 0u64;
    let mut event_hasher = DefaultHasher::new();

    for command in commands {
        match command {
            Command::Submit(spec) => {
                seq += 1;
                if let Ok(outcome) = matcher.apply_incoming(spec, seq) {
                    for trade in &outcome.trades {
                        "trade".hash(&mut event_hasher);
                        trade.price.hash(&mut event_hasher);
                        trade.qty.hash(&mut event_hasher);
                        trade.maker_id.hash(&mut event_hasher);
                        trade.taker_id.hash(&mut event_hasher);
                    }
                    outcome.rested.hash(&mut event_hasher);
                }
            }
            Command::Cancel(id) => {
                matcher.cancel(*id).hash(&mut event_hasher);
            }
            Command::Shutdown => break,
        }
    }

    let mut state_hasher = DefaultHasher::new();
    let depth = matcher.depth_snapshot();
    for level in depth.bids.iter().chain(depth.asks.iter()) {
        level.price.hash(&mut state_hasher);
        level.volume.hash(&mut state_hasher);
    }
    matcher.order_count().hash(&mut state_hasher);

    (event_hasher.finish(), state_hasher.finish())
}

#[test]
fn identical_runs_small() {
    const SEED: u64 = 0xDEAD_BEEF;
    const COUNT: usize = 1_000;
    const RUNS: usize = 10;

    let commands = generate_commands(SEED, COUNT);
    let (event_hash, state_hash) = run_and_hash(&commands);

    for run in 1..RUNS {
        let (events, state) = run_and_hash(&commands);
        assert_eq!(events, event_hash, "event hash mismatch on run {run}");
        assert_eq!(state, state_hash, "state hash mismatch on run {run}");
    }
}

#[test]
fn identical_runs_large() {
    const SEED: u64 = 0xCAFE_BABE;
    const COUNT: usize = 100_000;
    const RUNS: usize = 3;

    let commands = generate_commands(SEED, COUNT);
    let (event_hash, state_hash) = run_and_hash(&commands);

    for run in 1..RUNS {
        let (events, state) = run_and_hash(&commands);
        assert_eq!(events, event_hash, "event hash mismatch on run {run}");
        assert_eq!(state, state_hash, "state hash mismatch on run {run}");
    }
}

#[test]
fn different_seeds_diverge() {
    let first = generate_commands(1, 1_000);
    let second = generate_commands(2, 1_000);

    let (events_a, _) = run_and_hash(&first);
    let (events_b, _) = run_and_hash(&second);
    assert_ne!(events_a, events_b);
}
