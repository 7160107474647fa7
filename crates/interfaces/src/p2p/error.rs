use reth_primitives::{BlockNumber, PeerId};
use std::time::Duration;

/// Result alias for fallible peer-to-peer request/response operations.
pub type RequestResult<T> = Result<T, RequestError>;

/// The five error kinds produced by the reverse-range sync core and its
/// mirror server-side admission controller.
///
/// Every variant is log-only from the core's point of view: nothing in
/// this crate retries on its own behalf. See the sync client/server docs
/// for the propagation policy attached to each kind.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Stream open, read, or write failed at the transport layer.
    #[error("transport error talking to peer {peer}: {source}")]
    Transport {
        /// The peer the request was addressed to.
        peer: PeerId,
        /// The underlying transport failure.
        #[source]
        source: std::io::Error,
    },

    /// The peer violated the wire protocol: an oversized length prefix or
    /// an undecodable payload.
    #[error("protocol error from peer {peer}: {message}")]
    Protocol {
        /// The peer that sent the malformed message.
        peer: PeerId,
        /// Human-readable description of the violation.
        message: String,
    },

    /// The decoded payload failed header-level validation: a block number
    /// mismatch, a failed hash check, or (server-side) a request outside
    /// the servable range.
    #[error("validation error from peer {peer} for block {number}: {message}")]
    Validation {
        /// The peer that supplied the invalid payload.
        peer: PeerId,
        /// The block number the validation failure pertains to.
        number: BlockNumber,
        /// Human-readable description of the failed check.
        message: String,
    },

    /// A caller-facing or internal channel was saturated.
    ///
    /// Surfaced to the `request_range` caller when *they* timed out waiting
    /// to enqueue work, or silently dropped when it originates from a
    /// best-effort promotion cascade re-enqueue.
    #[error("backpressure: {context} exceeded its {budget:?} budget")]
    Backpressure {
        /// Which operation ran out of budget.
        context: &'static str,
        /// The budget that was exceeded.
        budget: Duration,
    },

    /// Cancellation was observed mid-operation; the caller's loop is
    /// exiting cleanly, not failing.
    #[error("shutdown observed")]
    Shutdown,
}

impl RequestError {
    /// Returns `true` if this error should count as a strike against the
    /// peer that produced it (reserved for future peer scoring; the
    /// back-off and eviction counters wired into the metrics module stand
    /// in for it today).
    pub fn is_peer_fault(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reth_primitives::PeerId;

    #[test]
    fn transport_and_shutdown_are_not_peer_faults() {
        let transport = RequestError::Transport {
            peer: PeerId::repeat_byte(1),
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        };
        assert_matches::assert_matches!(transport, RequestError::Transport { .. });
        assert!(!transport.is_peer_fault());
        assert!(!RequestError::Shutdown.is_peer_fault());
    }

    #[test]
    fn protocol_and_validation_are_peer_faults() {
        let protocol = RequestError::Protocol { peer: PeerId::repeat_byte(2), message: "x".into() };
        assert!(protocol.is_peer_fault());

        let validation = RequestError::Validation {
            peer: PeerId::repeat_byte(3),
            number: 7,
            message: "mismatch".into(),
        };
        assert!(validation.is_peer_fault());
    }
}
