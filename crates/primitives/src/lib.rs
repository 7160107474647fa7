//! Commonly used types in reth.
//!
//! This crate only carries the data model the reverse-range sync core
//! reads and writes; it does not own block execution or state types.

#![warn(missing_docs, unreachable_pub)]

mod block;
mod payload;

pub use alloy_primitives::{B256, B512};
pub use block::BlockRef;
pub use payload::{check_block_hash, ExecutionPayload, OpaqueExecutionPayload, PayloadDecodeError};

/// A 32-byte block or parent hash.
pub type Hash256 = B256;

/// A 64-byte peer identifier (the peer's public key, as used for devp2p/libp2p node IDs).
pub type PeerId = B512;

/// An unsigned block number.
pub type BlockNumber = u64;
