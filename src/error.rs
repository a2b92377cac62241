//! Error taxonomy.
//!
//! Conditions a client can legitimately cause (duplicate ids, cancels of
//! unknown ids) are absorbed where they arise and logged; they never
//! corrupt state. Broken invariants are bugs and panic the worker.

use thiserror::Error;

use crate::command::OrderId;

/// Rejections raised by the book itself.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BookError {
    /// An order with this id is already resting. The submit is dropped and
    /// the book is unchanged.
    #[error("order id {0} is already resting in the book")]
    DuplicateOrderId(OrderId),
}

/// Failures of the command pipeline as seen by producers.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// The engine has been stopped; no further commands are accepted.
    #[error("engine is shut down")]
    Shutdown,
}
