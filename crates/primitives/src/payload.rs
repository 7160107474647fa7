use crate::{BlockNumber, Hash256};
use sha2::{Digest, Sha256};
use ssz::{Decode, Encode};
use ssz_derive::{Decode as SszDecode, Encode as SszEncode};

/// An opaque block body, as seen by the sync core.
///
/// The core only ever reads these four accessors; everything else about
/// the payload (transactions, withdrawals, execution results) is the
/// receiver's concern.
pub trait ExecutionPayload: Sized + Send + Sync + 'static {
    /// The block's declared hash, as carried in the payload itself.
    fn block_hash(&self) -> Hash256;

    /// The hash of this payload's parent block.
    fn parent_hash(&self) -> Hash256;

    /// This payload's block number.
    fn block_number(&self) -> BlockNumber;

    /// Recomputes the hash from the payload body and reports whether it
    /// matches the declared [`ExecutionPayload::block_hash`].
    ///
    /// A peer that supplies a body whose recomputed hash doesn't match its
    /// own declared hash has sent garbage (or is actively adversarial);
    /// the caller is responsible for treating that as a validation error.
    fn check_block_hash(&self) -> bool;

    /// SSZ-encodes this payload for the wire.
    fn encode_ssz(&self) -> Vec<u8>;

    /// SSZ-decodes a payload previously produced by
    /// [`ExecutionPayload::encode_ssz`].
    fn decode_ssz(bytes: &[u8]) -> Result<Self, PayloadDecodeError>;
}

/// Error returned when a received byte string doesn't decode as a valid
/// [`ExecutionPayload`].
#[derive(Debug, thiserror::Error)]
#[error("failed to decode execution payload: {0}")]
pub struct PayloadDecodeError(String);

/// A concrete, SSZ-encoded execution payload.
///
/// Real rollup nodes embed a full OP-stack execution payload here
/// (transactions, withdrawals, the execution-layer header); this crate
/// only needs the fields the sync core actually reads, plus an opaque
/// body blob that stands in for everything else.
#[derive(Debug, Clone, PartialEq, Eq, SszEncode, SszDecode)]
pub struct OpaqueExecutionPayload {
    block_hash: Hash256,
    parent_hash: Hash256,
    block_number: BlockNumber,
    body: Vec<u8>,
}

impl OpaqueExecutionPayload {
    /// Builds a payload with a correctly computed `block_hash`.
    pub fn new(parent_hash: Hash256, block_number: BlockNumber, body: Vec<u8>) -> Self {
        let block_hash = Self::compute_hash(parent_hash, block_number, &body);
        Self { block_hash, parent_hash, block_number, body }
    }

    /// Builds a payload with an explicitly supplied (possibly wrong)
    /// `block_hash`, for exercising [`ExecutionPayload::check_block_hash`]
    /// failure paths in tests.
    pub fn with_declared_hash(
        block_hash: Hash256,
        parent_hash: Hash256,
        block_number: BlockNumber,
        body: Vec<u8>,
    ) -> Self {
        Self { block_hash, parent_hash, block_number, body }
    }

    fn compute_hash(parent_hash: Hash256, block_number: BlockNumber, body: &[u8]) -> Hash256 {
        let mut hasher = Sha256::new();
        hasher.update(parent_hash.as_slice());
        hasher.update(block_number.to_le_bytes());
        hasher.update(body);
        Hash256::from_slice(&hasher.finalize())
    }
}

impl ExecutionPayload for OpaqueExecutionPayload {
    fn block_hash(&self) -> Hash256 {
        self.block_hash
    }

    fn parent_hash(&self) -> Hash256 {
        self.parent_hash
    }

    fn block_number(&self) -> BlockNumber {
        self.block_number
    }

    fn check_block_hash(&self) -> bool {
        self.block_hash == Self::compute_hash(self.parent_hash, self.block_number, &self.body)
    }

    fn encode_ssz(&self) -> Vec<u8> {
        Encode::as_ssz_bytes(self)
    }

    fn decode_ssz(bytes: &[u8]) -> Result<Self, PayloadDecodeError> {
        Decode::from_ssz_bytes(bytes).map_err(|err| PayloadDecodeError(format!("{err:?}")))
    }
}

/// Recomputes the hash of `payload` from its body and reports whether it
/// matches its declared [`ExecutionPayload::block_hash`].
///
/// Free-function mirror of [`ExecutionPayload::check_block_hash`] for
/// call sites that only hold a `&dyn ExecutionPayload`-shaped reference.
pub fn check_block_hash(payload: &impl ExecutionPayload) -> bool {
    payload.check_block_hash()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_ssz() {
        let payload = OpaqueExecutionPayload::new(Hash256::repeat_byte(1), 42, vec![1, 2, 3, 4]);
        let encoded = payload.encode_ssz();
        let decoded = OpaqueExecutionPayload::decode_ssz(&encoded).unwrap();
        assert_eq!(payload, decoded);
        assert!(decoded.check_block_hash());
    }

    #[test]
    fn detects_forged_hash() {
        let forged = OpaqueExecutionPayload::with_declared_hash(
            Hash256::repeat_byte(0xaa),
            Hash256::repeat_byte(1),
            42,
            vec![1, 2, 3, 4],
        );
        assert!(!forged.check_block_hash());
    }
}
