use async_trait::async_trait;
use reth_primitives::PeerId;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream to a single peer, scoped to one protocol
/// exchange.
///
/// This is deliberately minimal: the transport (opening streams, framing,
/// read/write deadlines beyond what this crate imposes itself) is an
/// injected capability, out of scope for the sync core per the design
/// spec's section 1.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// A boxed, type-erased [`Stream`].
pub type BoxStream = Box<dyn Stream>;

/// Opens outbound streams to peers.
///
/// Injected by the embedding node; the sync core never dials a
/// transport-level connection itself, only asks for a stream on a given
/// protocol id.
#[async_trait]
pub trait NewStream: Send + Sync {
    /// Opens a stream to `peer` negotiating `protocol_id`.
    async fn new_stream(&self, peer: PeerId, protocol_id: &str) -> std::io::Result<BoxStream>;
}
