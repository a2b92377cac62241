//! Offline latency percentile report for the matching core.
//!
//! Feeds a pre-generated command mix straight into the matcher and prints
//! an hdrhistogram breakdown. No queue, no sockets: this measures the
//! apply path alone.

use std::time::Instant;

use hdrhistogram::Histogram;

use tickmatch::{MatchingEngine, OrderSpec, Side};

const WARMUP_OPS: usize = 10_000;
const ITERATIONS: u64 = 1_000_000;

fn main() {
    println!("preparing matcher...");
    let mut matcher = MatchingEngine::new(1 << 20);
    matcher.warm_up();

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000_000, 3).expect("histogram");

    // Alternating sides around a narrow band: a healthy mix of rests,
    // partial fills and full sweeps.
    let specs: Vec<OrderSpec> = (0..WARMUP_OPS as u64)
        .map(|i| {
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            OrderSpec::new(i + 1, side, 10_000 + (i % 100), 10)
        })
        .collect();

    println!("warming up ({WARMUP_OPS} ops)...");
    let mut seq: u64 = 0;
    for spec in &specs {
        seq += 1;
        let _ = std::hint::black_box(matcher.apply_incoming(spec, seq));
    }

    println!("running {ITERATIONS} iterations...");
    let mut total = std::time::Duration::ZERO;
    let mut next_id = WARMUP_OPS as u64 + 1;

    for i in 0..ITERATIONS {
        let base = &specs[(i % WARMUP_OPS as u64) as usize];
        let spec = OrderSpec::new(next_id, base.side, base.price, base.qty);
        next_id += 1;
        seq += 1;

        let start = Instant::now();
        let _ = std::hint::black_box(matcher.apply_incoming(&spec, seq));
        let elapsed = start.elapsed();

        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total += elapsed;
    }

    println!("\n=== apply_incoming latency (ns) ===");
    println!("ops:        {ITERATIONS}");
    println!("throughput: {:.2} ops/sec", ITERATIONS as f64 / total.as_secs_f64());
    println!("-----------------------------------");
    println!("min:    {:7}", histogram.min());
    println!("p50:    {:7}", histogram.value_at_quantile(0.50));
    println!("p90:    {:7}", histogram.value_at_quantile(0.90));
    println!("p99:    {:7}", histogram.value_at_quantile(0.99));
    println!("p99.9:  {:7}", histogram.value_at_quantile(0.999));
    println!("max:    {:7}", histogram.max());
    println!("-----------------------------------");
    println!("resting orders at exit: {}", matcher.order_count());
}
