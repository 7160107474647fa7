use super::types::{PeerRequest, SyncResult};
use crate::{config::SyncConfig, rate_limit::TokenBucket, stream::NewStream, wire};
use reth_interfaces::p2p::error::RequestError;
use reth_primitives::{ExecutionPayload, PeerId};
use std::{sync::Arc, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    sync::{mpsc, Mutex},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Per-peer worker loop (component C3): a token-bucket rate limiter gating
/// a single-flight request executor that turns one [`PeerRequest`] into a
/// protocol exchange and a [`SyncResult`] on the shared results channel.
pub struct PeerWorker<P> {
    peer: PeerId,
    config: SyncConfig,
    new_stream: Arc<dyn NewStream>,
    peer_requests: Arc<Mutex<mpsc::Receiver<PeerRequest>>>,
    results: mpsc::Sender<SyncResult<P>>,
    limiter: TokenBucket,
    cancel: CancellationToken,
}

impl<P: ExecutionPayload> PeerWorker<P> {
    /// Builds a worker for `peer`, sharing the fan-out request queue and
    /// results channel with every other peer worker the coordinator owns.
    pub fn new(
        peer: PeerId,
        config: SyncConfig,
        new_stream: Arc<dyn NewStream>,
        peer_requests: Arc<Mutex<mpsc::Receiver<PeerRequest>>>,
        results: mpsc::Sender<SyncResult<P>>,
        cancel: CancellationToken,
    ) -> Self {
        let limiter =
            TokenBucket::new(config.peer_rate_limit_period, config.peer_rate_limit_burst);
        Self { peer, config, new_stream, peer_requests, results, limiter, cancel }
    }

    /// Runs the worker loop until cancelled.
    pub async fn run(self) {
        let span = tracing::info_span!("peer_worker", peer = %self.peer);
        let _enter = span.enter();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(target: "downloaders::sync", "peer worker cancelled");
                    return
                }
                _ = self.limiter.acquire() => {}
            }

            let request = {
                let mut receiver = self.peer_requests.lock().await;
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        tracing::debug!(target: "downloaders::sync", "peer worker cancelled");
                        return
                    }
                    request = receiver.recv() => match request {
                        Some(request) => request,
                        None => {
                            tracing::debug!(target: "downloaders::sync", "peer request queue closed");
                            return
                        }
                    },
                }
            };

            let outcome = match self.do_request(request.number).await {
                Ok(payload) => {
                    let result = SyncResult { payload, peer: self.peer };
                    match self.results.try_send(result) {
                        Ok(()) => Ok(()),
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            Err(RequestError::Backpressure {
                                context: "results channel",
                                budget: Duration::ZERO,
                            })
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => Err(RequestError::Shutdown),
                    }
                }
                Err(err) => Err(err),
            };

            if let Err(err) = outcome {
                if matches!(err, RequestError::Shutdown) {
                    tracing::debug!(
                        target: "downloaders::sync",
                        "results channel closed, worker exiting"
                    );
                    return
                }
                request.complete.set();
                tracing::debug!(
                    target: "downloaders::sync",
                    number = request.number,
                    error = %err,
                    "peer request failed, applying back-off"
                );
                self.limiter.consume(self.config.peer_failure_backoff_tokens);
                crate::metrics::record_peer_backoff(self.peer);
            }
        }
    }

    async fn do_request(&self, number: u64) -> Result<P, RequestError> {
        let protocol_id = self.config.protocol_id();

        let mut stream = timeout(
            self.config.stream_open_timeout,
            self.new_stream.new_stream(self.peer, &protocol_id),
        )
        .await
        .map_err(|_| RequestError::Backpressure {
            context: "stream open",
            budget: self.config.stream_open_timeout,
        })?
        .map_err(|source| RequestError::Transport { peer: self.peer, source })?;

        timeout(self.config.write_timeout, async {
            wire::write_request_number(&mut stream, number).await?;
            stream.shutdown().await?;
            Ok::<_, std::io::Error>(())
        })
        .await
        .map_err(|_| RequestError::Backpressure {
            context: "request write",
            budget: self.config.write_timeout,
        })?
        .map_err(|source| RequestError::Transport { peer: self.peer, source })?;

        let max_gossip_size = self.config.max_gossip_size;
        let body = timeout(
            self.config.read_timeout,
            wire::read_length_prefixed(&mut stream, max_gossip_size),
        )
        .await
        .map_err(|_| RequestError::Backpressure {
            context: "response read",
            budget: self.config.read_timeout,
        })?
        .map_err(|err| match err {
            wire::WireError::Io(source) => RequestError::Transport { peer: self.peer, source },
            wire::WireError::TooLarge { announced, limit } => RequestError::Protocol {
                peer: self.peer,
                message: format!("response length {announced} exceeds max_gossip_size {limit}"),
            },
        })?;

        let payload = P::decode_ssz(&body).map_err(|err| RequestError::Protocol {
            peer: self.peer,
            message: err.to_string(),
        })?;

        if payload.block_number() != number {
            return Err(RequestError::Validation {
                peer: self.peer,
                number,
                message: format!(
                    "requested block {number} but received block {}",
                    payload.block_number()
                ),
            })
        }
        if !payload.check_block_hash() {
            return Err(RequestError::Validation {
                peer: self.peer,
                number,
                message: "declared block_hash does not match recomputed hash".to_string(),
            })
        }

        Ok(payload)
    }
}
