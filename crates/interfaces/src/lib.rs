//! Error types shared across the `reth` p2p and sync-core crates.
//!
//! This crate intentionally owns no logic beyond error taxonomy: concrete
//! behavior (retries, back-off, logging) lives with the caller that
//! produced the error.

#![warn(missing_docs, unreachable_pub)]

pub mod p2p;

/// A catch-all result alias for interfaces that don't need a richer error
/// taxonomy of their own.
pub type RethResult<T> = Result<T, RethError>;

/// A catch-all error for interfaces that don't need a richer error
/// taxonomy of their own.
#[derive(Debug, thiserror::Error)]
pub enum RethError {
    /// Wraps any other error with a bit of context.
    #[error("{0}")]
    Other(String),
}
