use reth_primitives::{BlockNumber, BlockRef, PeerId};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A boolean cell shared between exactly one writer (the peer worker that
/// owns a request) and one reader (the coordinator), signaling "this
/// number is no longer pending."
///
/// Cloning shares the same underlying cell.
#[derive(Debug, Clone, Default)]
pub struct SharedFlag(Arc<AtomicBool>);

impl SharedFlag {
    /// Creates a new, unset flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Sets the flag. Called by the worker on failure; on success the
    /// coordinator instead removes the in-flight entry directly when it
    /// processes the result, so this is never set on the success path.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// `true` once [`SharedFlag::set`] has been called.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single block fetch, dispatched to exactly one peer worker.
#[derive(Debug, Clone)]
pub struct PeerRequest {
    /// The block number to fetch.
    pub number: BlockNumber,
    /// Set by whichever worker finishes handling this request (success or
    /// failure), so the coordinator can garbage-collect its in-flight
    /// record on the next scheduling pass.
    pub complete: SharedFlag,
}

/// A range of missing blocks to fetch and deliver in reverse chain order,
/// anchored on a trusted future block reference.
#[derive(Debug, Clone, Copy)]
pub struct RangeRequest {
    /// The first block number *not* requested (exclusive lower bound).
    pub start: BlockNumber,
    /// The trusted upper anchor; blocks are fetched and verified backward
    /// from here via parent-hash chaining.
    pub end: BlockRef,
}

/// A block successfully fetched and verified at the header level from a
/// peer.
#[derive(Debug, Clone)]
pub struct SyncResult<P> {
    /// The fetched payload.
    pub payload: P,
    /// The peer that supplied it.
    pub peer: PeerId,
}
