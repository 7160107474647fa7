//! In-memory fakes for the two injected client capabilities
//! ([`NewStream`], [`ReceivePayload`]) and the one injected server
//! capability ([`BlockByNumber`]), plus an in-memory duplex [`Stream`].
//!
//! Exists so the coordinator, worker, and admission-control state
//! machines can be exercised end-to-end without a real transport or
//! chain database behind them.

use crate::{
    client::ReceivePayload,
    server::{BlockByNumber, BlockLookupError},
    stream::{BoxStream, NewStream},
};
use parking_lot::Mutex;
use reth_interfaces::p2p::error::RequestError;
use reth_primitives::{BlockNumber, ExecutionPayload, PeerId};
use std::{collections::HashMap, sync::Arc, time::SystemTime};
use tokio::{io::DuplexStream, sync::mpsc};

/// A [`NewStream`] that opens a fresh in-memory duplex pair per call,
/// handing the "client side" back to the caller and pushing the "server
/// side" onto a shared accept queue, the same way a real transport hands
/// a freshly dialed connection to a listener.
#[derive(Clone)]
pub struct FakeTransport {
    accept_tx: mpsc::UnboundedSender<(PeerId, DuplexStream)>,
}

/// The accept side of a [`FakeTransport`]: a test's fake server loop
/// drains this to learn about every stream opened by a client worker.
pub struct FakeAcceptor {
    accept_rx: mpsc::UnboundedReceiver<(PeerId, DuplexStream)>,
}

impl FakeTransport {
    /// Creates a transport and its paired acceptor.
    pub fn new() -> (Self, FakeAcceptor) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (Self { accept_tx }, FakeAcceptor { accept_rx })
    }
}

impl FakeAcceptor {
    /// Awaits the next stream a client opened, along with the peer id it
    /// was opened for.
    pub async fn accept(&mut self) -> Option<(PeerId, DuplexStream)> {
        self.accept_rx.recv().await
    }
}

#[async_trait::async_trait]
impl NewStream for FakeTransport {
    async fn new_stream(&self, peer: PeerId, _protocol_id: &str) -> std::io::Result<BoxStream> {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        self.accept_tx.send((peer, server_side)).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "fake acceptor dropped")
        })?;
        Ok(Box::new(client_side))
    }
}

/// A [`ReceivePayload`] that records every delivered payload in arrival
/// order, for assertions on delivery order and content.
pub struct RecordingReceiver<P> {
    received: Mutex<Vec<(PeerId, P)>>,
}

impl<P: Clone + Send + Sync> Default for RecordingReceiver<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Clone + Send + Sync> RecordingReceiver<P> {
    /// Creates a receiver with nothing delivered yet.
    pub fn new() -> Self {
        Self { received: Mutex::new(Vec::new()) }
    }

    /// Returns every payload delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<(PeerId, P)> {
        self.received.lock().clone()
    }
}

#[async_trait::async_trait]
impl<P: Clone + Send + Sync + 'static> ReceivePayload<P> for RecordingReceiver<P> {
    async fn receive_payload(&self, peer: PeerId, payload: P) -> Result<(), RequestError> {
        self.received.lock().push((peer, payload));
        Ok(())
    }
}

/// A [`BlockByNumber`] backed by an in-memory map, with a fixed "current
/// time" for [`BlockByNumber::target_block_number`] so tests don't race
/// wall-clock reality.
pub struct FakeChain<P> {
    blocks: HashMap<BlockNumber, P>,
    target: BlockNumber,
}

impl<P: ExecutionPayload + Clone> FakeChain<P> {
    /// Creates a chain that only ever reports `target` as the highest
    /// plausible block number, regardless of wall-clock time.
    pub fn new(blocks: impl IntoIterator<Item = P>, target: BlockNumber) -> Self {
        let blocks = blocks.into_iter().map(|p| (p.block_number(), p)).collect();
        Self { blocks, target }
    }
}

#[async_trait::async_trait]
impl<P: ExecutionPayload + Clone> BlockByNumber<P> for FakeChain<P> {
    async fn block_by_number(&self, number: BlockNumber) -> Result<P, BlockLookupError> {
        self.blocks.get(&number).cloned().ok_or(BlockLookupError::NotFound)
    }

    fn target_block_number(&self, _now: SystemTime) -> Result<BlockNumber, BlockLookupError> {
        Ok(self.target)
    }
}
