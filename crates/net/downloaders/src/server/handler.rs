use crate::{config::ServerConfig, metrics, server::admission::Admission, stream::BoxStream, wire};
use futures::FutureExt;
use reth_interfaces::p2p::error::RequestError;
use reth_primitives::{BlockNumber, ExecutionPayload, PeerId};
use std::{panic::AssertUnwindSafe, sync::Arc, time::SystemTime};
use tokio::{io::AsyncWriteExt, time::timeout};

/// The canonical block source, queried after a request clears admission.
///
/// Injected by the embedding node; out of scope for this crate beyond
/// this interface.
#[async_trait::async_trait]
pub trait BlockByNumber<P>: Send + Sync {
    /// Looks up the canonical block at `number`.
    async fn block_by_number(&self, number: BlockNumber) -> Result<P, BlockLookupError>;

    /// The highest block number the chain could plausibly have reached by
    /// wall-clock time `now`, used to reject requests for blocks that
    /// cannot exist yet.
    fn target_block_number(&self, now: SystemTime) -> Result<BlockNumber, BlockLookupError>;
}

/// Failure modes for [`BlockByNumber`].
#[derive(Debug, thiserror::Error)]
pub enum BlockLookupError {
    /// No block exists at the requested number.
    #[error("block not found")]
    NotFound,
    /// Any other lookup failure (storage error, chain-tip computation
    /// failure, etc).
    #[error("{0}")]
    Other(String),
}

/// The server-side admission controller plus the `payload_by_number`
/// request handler (component C5).
pub struct Server<P: ExecutionPayload> {
    config: ServerConfig,
    chain: Arc<dyn BlockByNumber<P>>,
    admission: Admission,
}

impl<P: ExecutionPayload> Server<P> {
    /// Builds a server over `chain`, the injected block source.
    pub fn new(config: ServerConfig, chain: Arc<dyn BlockByNumber<P>>) -> Self {
        let admission = Admission::new(&config);
        Self { config, chain, admission }
    }

    /// The stream-handler callback registered with the transport:
    /// panic-isolated, guaranteed to close `stream` on every exit path,
    /// with a per-stream logging span.
    ///
    /// This is the only place recovery from an unexpected fault occurs;
    /// everywhere else a bug should simply propagate and fail loudly.
    pub async fn handle_sync_request(&self, peer: PeerId, mut stream: BoxStream) {
        let span = tracing::info_span!("sync_request", peer = %peer);
        let _enter = span.enter();

        let outcome = AssertUnwindSafe(self.serve(peer, &mut stream)).catch_unwind().await;
        let _ = stream.shutdown().await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(
                    target: "downloaders::sync",
                    error = %err,
                    "sync request failed, closing without further response"
                );
            }
            Err(_) => {
                tracing::error!(
                    target: "downloaders::sync",
                    "panic while handling sync request, stream closed"
                );
            }
        }
    }

    async fn serve(&self, peer: PeerId, stream: &mut BoxStream) -> Result<(), RequestError> {
        self.admission.admit(peer).await?;

        let number = timeout(self.config.read_timeout, wire::read_request_number(stream))
            .await
            .map_err(|_| RequestError::Backpressure {
                context: "server read",
                budget: self.config.read_timeout,
            })?
            .map_err(|err| wire_err_to_request(peer, err))?;

        if number < self.config.genesis_l2_number {
            return Err(RequestError::Validation {
                peer,
                number,
                message: format!(
                    "requested block {number} precedes genesis {}",
                    self.config.genesis_l2_number
                ),
            })
        }

        let target = self
            .chain
            .target_block_number(SystemTime::now())
            .map_err(|err| RequestError::Protocol { peer, message: err.to_string() })?;
        if number > target {
            return Err(RequestError::Validation {
                peer,
                number,
                message: format!("requested block {number} exceeds target block {target}"),
            })
        }

        let payload = match self.chain.block_by_number(number).await {
            Ok(payload) => payload,
            Err(BlockLookupError::NotFound) => {
                return Err(RequestError::Validation {
                    peer,
                    number,
                    message: "no such block on the canonical chain".to_string(),
                })
            }
            Err(BlockLookupError::Other(message)) => {
                return Err(RequestError::Protocol { peer, message })
            }
        };

        let body = payload.encode_ssz();
        timeout(self.config.write_timeout, wire::write_length_prefixed(stream, &body))
            .await
            .map_err(|_| RequestError::Backpressure {
                context: "server write",
                budget: self.config.write_timeout,
            })?
            .map_err(|err| wire_err_to_request(peer, err))?;

        metrics::record_admission_outcome("served");
        Ok(())
    }
}

fn wire_err_to_request(peer: PeerId, err: wire::WireError) -> RequestError {
    match err {
        wire::WireError::Io(source) => RequestError::Transport { peer, source },
        wire::WireError::TooLarge { announced, limit } => RequestError::Protocol {
            peer,
            message: format!("announced length {announced} exceeds max_gossip_size {limit}"),
        },
    }
}
