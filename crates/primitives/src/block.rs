use crate::{BlockNumber, Hash256};

/// A trusted reference to a block, anchoring a reverse-range sync at its
/// upper end.
///
/// Only these three fields are ever read by the sync core: callers may
/// embed richer block-header types and convert into a `BlockRef` at the
/// `request_range` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockRef {
    /// The block's own hash.
    pub hash: Hash256,
    /// The hash of this block's parent.
    pub parent_hash: Hash256,
    /// The block number.
    pub number: BlockNumber,
}

impl BlockRef {
    /// Returns `true` if this is the zero value, i.e. an absent/unset
    /// anchor. `request_range` treats a zero `end` as a no-op: there is no
    /// trust anchor to verify anything against.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}
