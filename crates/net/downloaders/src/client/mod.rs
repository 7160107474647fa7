//! The client half of the reverse-range sync core: trust set, quarantine,
//! per-peer workers, and the coordinator that ties them together behind
//! the public [`Client`] surface.

mod coordinator;
mod quarantine;
mod trust;
mod types;
mod worker;

pub use coordinator::{Coordinator, PeerRegistry, ReceivePayload};
pub use types::{PeerRequest, RangeRequest, SharedFlag, SyncResult};

use crate::{config::SyncConfig, stream::NewStream};
use reth_interfaces::p2p::error::RequestError;
use reth_primitives::{BlockRef, OpaqueExecutionPayload, PeerId};
use reth_tasks::TaskSpawner;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// The public client surface for the reverse-range sync core.
///
/// A thin, cheaply cloneable handle onto a coordinator spawned as a
/// background task. Concretely typed over [`OpaqueExecutionPayload`]: the
/// embedding node supplies its own real execution-payload codec by
/// implementing [`ReceivePayload`] and handing back the decoded type it
/// wants, but the wire-level payload shape itself is this crate's
/// concern, not a further generic the public surface needs to expose.
#[derive(Clone)]
pub struct Client {
    range_tx: mpsc::Sender<RangeRequest>,
    registry: PeerRegistry<OpaqueExecutionPayload>,
    max_request_scheduling: Duration,
}

impl Client {
    /// Builds a client and returns it alongside the coordinator future
    /// that [`Client::start`] expects the caller to spawn.
    ///
    /// `new_stream` opens outbound streams to peers; `receiver` is handed
    /// every verified block in reverse chain order (subject to the
    /// concurrency model's reordering caveats).
    pub fn new(
        config: SyncConfig,
        new_stream: Arc<dyn NewStream>,
        receiver: Arc<dyn ReceivePayload<OpaqueExecutionPayload>>,
    ) -> (Self, Coordinator<OpaqueExecutionPayload>) {
        let max_request_scheduling = config.max_request_scheduling;
        let (coordinator, registry, range_tx) = Coordinator::new(config, new_stream, receiver);
        (Self { range_tx, registry, max_request_scheduling }, coordinator)
    }

    /// Spawns the coordinator's main loop on `spawner`.
    ///
    /// Takes the [`Coordinator`] [`Client::new`] returned alongside this
    /// client by value: the loop owns it for as long as it runs, while
    /// `self` only ever talks to it through the shared [`PeerRegistry`]
    /// and the range-request channel.
    pub fn start(&self, spawner: &dyn TaskSpawner, coordinator: Coordinator<OpaqueExecutionPayload>) {
        spawner.spawn(Box::pin(coordinator.run()));
    }

    /// Registers a peer with the coordinator, spawning its worker.
    pub async fn add_peer(&self, id: PeerId) {
        self.registry.add_peer(id).await;
    }

    /// Removes a peer, cancelling its worker.
    pub async fn remove_peer(&self, id: PeerId) {
        self.registry.remove_peer(id).await;
    }

    /// Requests that every block numbered in `(start, end.number)` be
    /// fetched and delivered in reverse chain order, verified backward
    /// from `end` via parent-hash chaining.
    ///
    /// If `end` is the zero value the request is a silent no-op: there is
    /// no trust anchor to verify against.
    pub async fn request_range(&self, start: BlockRef, end: BlockRef) -> Result<(), RequestError> {
        if end.is_zero() {
            tracing::debug!(
                target: "downloaders::sync",
                "request_range called with zero end ref, ignoring: no trust anchor"
            );
            return Ok(())
        }
        match tokio::time::timeout(
            self.max_request_scheduling,
            self.range_tx.send(RangeRequest { start: start.number, end }),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RequestError::Shutdown),
            Err(_) => Err(RequestError::Backpressure {
                context: "request_range",
                budget: self.max_request_scheduling,
            }),
        }
    }

    /// Cancels every peer worker and blocks until all of them, past and
    /// present, have exited.
    pub async fn close(&self) -> Result<(), RequestError> {
        self.registry.close().await;
        Ok(())
    }
}
