//! Server configuration.
//!
//! Everything has a sensible default; `TICKMATCH_*` environment variables
//! override individual knobs. The listen port is the only contract with the
//! outside world, the rest are tuning parameters.

use std::fmt::Display;
use std::str::FromStr;

use tracing::{info, warn};

use crate::engine::EngineConfig;
use crate::protocol::PriceScale;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// WebSocket listen port.
    pub port: u16,
    /// Ticks per price unit at the wire boundary (100 = cent ticks).
    pub ticks_per_unit: u32,
    /// Command queue bound.
    pub queue_capacity: usize,
    /// Maximum simultaneously resting orders.
    pub arena_capacity: u32,
    /// Pin the matching worker to the last CPU core.
    pub pin_worker: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            ticks_per_unit: 100,
            queue_capacity: 1 << 16,
            arena_capacity: 1 << 20,
            pin_worker: false,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `TICKMATCH_PORT`, `TICKMATCH_TICKS_PER_UNIT`,
    /// `TICKMATCH_QUEUE_CAPACITY`, `TICKMATCH_ARENA_CAPACITY` and
    /// `TICKMATCH_PIN_WORKER`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env_override("TICKMATCH_PORT") {
            config.port = port;
        }
        if let Some(ticks) = env_override("TICKMATCH_TICKS_PER_UNIT") {
            if ticks == 0 {
                warn!("TICKMATCH_TICKS_PER_UNIT must be positive; keeping default");
            } else {
                config.ticks_per_unit = ticks;
            }
        }
        if let Some(capacity) = env_override("TICKMATCH_QUEUE_CAPACITY") {
            config.queue_capacity = capacity;
        }
        if let Some(capacity) = env_override("TICKMATCH_ARENA_CAPACITY") {
            config.arena_capacity = capacity;
        }
        if let Some(pin) = env_override("TICKMATCH_PIN_WORKER") {
            config.pin_worker = pin;
        }
        info!(
            port = config.port,
            ticks_per_unit = config.ticks_per_unit,
            "configuration loaded"
        );
        config
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            arena_capacity: self.arena_capacity,
            queue_capacity: self.queue_capacity,
            pin_worker: self.pin_worker,
        }
    }

    pub fn scale(&self) -> PriceScale {
        PriceScale::new(self.ticks_per_unit)
    }
}

fn env_override<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("ignoring {key}={raw}: {err}");
            None
        }
    }
}
