//! The serialized command pipeline.
//!
//! Any number of producers enqueue commands; one worker thread owns the
//! matching core and applies them in queue order. Event sinks run on the
//! worker, one command at a time, so they always observe a quiescent book.
//!
//! ```text
//! [producers] --submit--> [bounded queue] --> [worker thread]
//!                                                  |-- trade sink
//!                                                  `-- book sink
//! ```
//!
//! Snapshots ride the same queue: a snapshot request is answered by the
//! worker over a one-shot channel, so snapshots interleave with mutations
//! in one total order visible to every producer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::command::{Command, DepthSnapshot, Trade};
use crate::error::EngineError;
use crate::matching::MatchingEngine;

/// Hook receiving the trades one command generated, in emission order.
pub type TradeSink = Box<dyn FnMut(&[Trade]) + Send>;

/// Hook receiving the depth after a command that changed the book.
pub type BookSink = Box<dyn FnMut(&DepthSnapshot) + Send>;

/// Engine tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Maximum number of simultaneously resting orders.
    pub arena_capacity: u32,
    /// Command queue bound. Producers block while the queue is full.
    pub queue_capacity: usize,
    /// Pin the worker to the last CPU core.
    pub pin_worker: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arena_capacity: 1 << 20,
            queue_capacity: 1 << 16,
            pin_worker: false,
        }
    }
}

enum Envelope {
    Cmd(Command),
    Depth(Sender<DepthSnapshot>),
}

struct EngineState {
    rx: Option<Receiver<Envelope>>,
    matcher: Option<MatchingEngine>,
    trade_sink: Option<TradeSink>,
    book_sink: Option<BookSink>,
    worker: Option<JoinHandle<()>>,
}

/// Single-writer matching engine.
///
/// Lifecycle: install sinks, `start`, any number of `submit`/`snapshot`
/// calls from any thread, `stop`. `stop` is terminal; a stopped engine
/// rejects further submissions. Sinks must not call back into `submit`,
/// `snapshot` or `stop` - they run on the worker itself.
pub struct Engine {
    tx: Sender<Envelope>,
    state: Mutex<EngineState>,
    stopping: AtomicBool,
    pin_worker: bool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let (tx, rx) = bounded(config.queue_capacity);
        Self {
            tx,
            state: Mutex::new(EngineState {
                rx: Some(rx),
                matcher: Some(MatchingEngine::new(config.arena_capacity)),
                trade_sink: None,
                book_sink: None,
                worker: None,
            }),
            stopping: AtomicBool::new(false),
            pin_worker: config.pin_worker,
        }
    }

    /// Install the trade hook. Must happen before `start`; afterwards the
    /// sinks live on the worker and installation is a logged no-op.
    pub fn install_trade_sink<F>(&self, sink: F)
    where
        F: FnMut(&[Trade]) + Send + 'static,
    {
        let mut state = self.state.lock().unwrap();
        if state.worker.is_some() {
            warn!("trade sink ignored: engine already running");
            return;
        }
        state.trade_sink = Some(Box::new(sink));
    }

    /// Install the book-changed hook. Same timing rule as the trade sink.
    pub fn install_book_sink<F>(&self, sink: F)
    where
        F: FnMut(&DepthSnapshot) + Send + 'static,
    {
        let mut state = self.state.lock().unwrap();
        if state.worker.is_some() {
            warn!("book sink ignored: engine already running");
            return;
        }
        state.book_sink = Some(Box::new(sink));
    }

    /// Spawn the worker. Starting a running or stopped engine is a logged
    /// no-op.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        if state.worker.is_some() {
            warn!("engine already running; start ignored");
            return;
        }
        let (rx, matcher) = match (state.rx.take(), state.matcher.take()) {
            (Some(rx), Some(matcher)) => (rx, matcher),
            _ => {
                warn!("engine already stopped; start ignored");
                return;
            }
        };
        let trade_sink = state.trade_sink.take();
        let book_sink = state.book_sink.take();
        let pin = self.pin_worker;

        let handle = thread::Builder::new()
            .name("tickmatch-engine".into())
            .spawn(move || worker_loop(matcher, rx, trade_sink, book_sink, pin))
            .expect("failed to spawn engine worker");
        state.worker = Some(handle);
        info!("engine worker started");
    }

    /// Enqueue a shutdown marker, wait for the worker to drain up to it and
    /// join. Safe from any producer and safe to call repeatedly; calling it
    /// before `start` is a silent no-op that leaves the engine stopped.
    ///
    /// Commands enqueued before this call are applied; commands racing with
    /// it may land behind the marker and are dropped.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        // Stopped-before-start engines keep no worker; make them terminal.
        state.rx = None;
        state.matcher = None;
        if let Some(handle) = state.worker.take() {
            let _ = self.tx.send(Envelope::Cmd(Command::Shutdown));
            if handle.join().is_err() {
                panic!("engine worker panicked");
            }
            info!("engine worker stopped");
        }
    }

    /// Enqueue a command. Blocks only while the queue is full; never waits
    /// on matching work. Fails once the engine is stopped.
    pub fn submit(&self, command: Command) -> Result<(), EngineError> {
        if self.stopping.load(Ordering::SeqCst) {
            return Err(EngineError::Shutdown);
        }
        self.tx
            .send(Envelope::Cmd(command))
            .map_err(|_| EngineError::Shutdown)
    }

    /// Consistent read of the book. On a running engine the request rides
    /// the command queue and is answered by the worker; before `start` it
    /// is served directly.
    pub fn snapshot(&self) -> Result<DepthSnapshot, EngineError> {
        {
            let state = self.state.lock().unwrap();
            if let Some(matcher) = state.matcher.as_ref() {
                return Ok(matcher.depth_snapshot());
            }
            if state.worker.is_none() {
                return Err(EngineError::Shutdown);
            }
        }

        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Envelope::Depth(reply_tx))
            .map_err(|_| EngineError::Shutdown)?;
        reply_rx.recv().map_err(|_| EngineError::Shutdown)
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().worker.is_some()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best effort: a leaked worker would block the process on exit.
        if self.state.get_mut().map_or(false, |s| s.worker.is_some()) {
            self.stop();
        }
    }
}

fn worker_loop(
    mut matcher: MatchingEngine,
    rx: Receiver<Envelope>,
    mut trade_sink: Option<TradeSink>,
    mut book_sink: Option<BookSink>,
    pin: bool,
) {
    if pin {
        pin_to_last_core();
    }
    matcher.warm_up();

    // Monotonic in apply order; defines time priority.
    let mut arrival_seq: u64 = 0;

    for envelope in rx.iter() {
        match envelope {
            Envelope::Cmd(Command::Submit(spec)) => {
                arrival_seq += 1;
                match matcher.apply_incoming(&spec, arrival_seq) {
                    Ok(outcome) => {
                        if outcome.dropped_qty > 0 {
                            warn!(
                                order_id = spec.id,
                                qty = outcome.dropped_qty,
                                "book capacity exhausted; residual dropped"
                            );
                        }
                        if !outcome.trades.is_empty() {
                            if let Some(sink) = trade_sink.as_mut() {
                                sink(&outcome.trades);
                            }
                        }
                        if !outcome.trades.is_empty() || outcome.rested {
                            if let Some(sink) = book_sink.as_mut() {
                                sink(&matcher.depth_snapshot());
                            }
                        }
                    }
                    Err(reject) => debug!(order_id = spec.id, %reject, "submit dropped"),
                }
            }
            Envelope::Cmd(Command::Cancel(order_id)) => {
                if matcher.cancel(order_id) {
                    if let Some(sink) = book_sink.as_mut() {
                        sink(&matcher.depth_snapshot());
                    }
                } else {
                    debug!(order_id, "cancel for unknown order id");
                }
            }
            Envelope::Cmd(Command::Shutdown) => break,
            Envelope::Depth(reply) => {
                // Requester may have given up; that is fine.
                let _ = reply.send(matcher.depth_snapshot());
            }
        }

        #[cfg(debug_assertions)]
        matcher.assert_invariants();
    }
}

/// The last core is the usual choice for an isolated worker.
fn pin_to_last_core() {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(last) = core_ids.last() {
            core_affinity::set_for_current(*last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{OrderSpec, Side};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn small_engine() -> Engine {
        Engine::new(EngineConfig {
            arena_capacity: 1024,
            queue_capacity: 256,
            pin_worker: false,
        })
    }

    #[test]
    fn test_snapshot_before_start_is_direct() {
        let engine = small_engine();
        let depth = engine.snapshot().unwrap();
        assert!(depth.is_empty());
    }

    #[test]
    fn test_submit_and_snapshot() {
        let engine = small_engine();
        engine.start();

        engine
            .submit(Command::Submit(OrderSpec::new(1, Side::Buy, 100, 10)))
            .unwrap();
        engine
            .submit(Command::Submit(OrderSpec::new(2, Side::Sell, 105, 4)))
            .unwrap();

        let depth = engine.snapshot().unwrap();
        assert_eq!(depth.best_bid(), Some(100));
        assert_eq!(depth.best_ask(), Some(105));

        engine.stop();
    }

    #[test]
    fn test_sinks_fire_in_order() {
        let engine = small_engine();

        #[derive(Debug, PartialEq)]
        enum Event {
            Trades(usize),
            Book,
        }
        let events = Arc::new(Mutex::new(Vec::new()));

        let sink_events = events.clone();
        engine.install_trade_sink(move |trades| {
            sink_events.lock().unwrap().push(Event::Trades(trades.len()));
        });
        let sink_events = events.clone();
        engine.install_book_sink(move |_| {
            sink_events.lock().unwrap().push(Event::Book);
        });

        engine.start();
        engine
            .submit(Command::Submit(OrderSpec::new(1, Side::Sell, 100, 10)))
            .unwrap();
        engine
            .submit(Command::Submit(OrderSpec::new(2, Side::Buy, 100, 10)))
            .unwrap();
        engine.stop();

        let events = events.lock().unwrap();
        // First submit rests: book only. Second crosses: trades then book.
        assert_eq!(*events, vec![Event::Book, Event::Trades(1), Event::Book]);
    }

    #[test]
    fn test_no_sink_for_duplicate_or_unknown_cancel() {
        let engine = small_engine();

        let book_events = Arc::new(AtomicUsize::new(0));
        let counter = book_events.clone();
        engine.install_book_sink(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.start();
        engine
            .submit(Command::Submit(OrderSpec::new(1, Side::Buy, 100, 10)))
            .unwrap();
        // Duplicate id: silently dropped, no notification.
        engine
            .submit(Command::Submit(OrderSpec::new(1, Side::Buy, 101, 10)))
            .unwrap();
        // Unknown cancel: returns false inside, no notification.
        engine.submit(Command::Cancel(999)).unwrap();
        engine.stop();

        assert_eq!(book_events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_drains_pending_commands() {
        let engine = small_engine();
        engine.start();

        for i in 0..100u64 {
            engine
                .submit(Command::Submit(OrderSpec::new(i + 1, Side::Buy, 100 + i, 1)))
                .unwrap();
        }
        let depth = engine.snapshot().unwrap();
        assert_eq!(depth.bids.len(), 100);
        engine.stop();
    }

    #[test]
    fn test_submit_after_stop_fails() {
        let engine = small_engine();
        engine.start();
        engine.stop();

        let err = engine
            .submit(Command::Submit(OrderSpec::new(1, Side::Buy, 100, 10)))
            .unwrap_err();
        assert_eq!(err, EngineError::Shutdown);
        assert_eq!(engine.snapshot().unwrap_err(), EngineError::Shutdown);
    }

    #[test]
    fn test_stop_before_start_is_silent() {
        let engine = small_engine();
        engine.stop();
        assert!(!engine.is_running());

        // The engine is terminally stopped: start is a no-op now.
        engine.start();
        assert!(!engine.is_running());
        assert_eq!(engine.snapshot().unwrap_err(), EngineError::Shutdown);
    }

    #[test]
    fn test_stop_twice() {
        let engine = small_engine();
        engine.start();
        engine.stop();
        engine.stop();
    }

    #[test]
    fn test_start_twice_is_noop() {
        let engine = small_engine();
        engine.start();
        engine.start();
        assert!(engine.is_running());
        engine.stop();
    }
}
