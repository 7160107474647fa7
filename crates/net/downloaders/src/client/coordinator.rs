use super::{
    quarantine::Quarantine,
    trust::TrustSet,
    types::{PeerRequest, RangeRequest, SharedFlag, SyncResult},
};
use crate::{config::SyncConfig, metrics, stream::NewStream};
use reth_interfaces::p2p::error::RequestError;
use reth_primitives::{BlockNumber, ExecutionPayload, Hash256, PeerId};
use reth_tasks::GracefulShutdown;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Delivers a verified block to the consumer.
///
/// Injected by the embedding node; errors are logged and the block is
/// simply left un-promoted, on the expectation the consumer re-triggers
/// via a later range request.
#[async_trait::async_trait]
pub trait ReceivePayload<P>: Send + Sync {
    /// Hands `payload`, fetched from `peer`, to the consumer.
    async fn receive_payload(&self, peer: PeerId, payload: P) -> Result<(), RequestError>;
}

/// The peer registry (component C3's lifecycle, as seen from outside the
/// coordinator's main loop).
///
/// `add_peer`/`remove_peer` are called from arbitrary external tasks
/// while the coordinator loop runs concurrently, so this piece is the one
/// part of the coordinator's state that *is* guarded by a lock, held
/// only across the map operation and the (cheap) work of spawning a
/// worker, never across stream I/O. [`PeerRegistry::close`] cancels the
/// shared [`GracefulShutdown`] hierarchy, which cascades to every child a
/// worker was given, then blocks until all of them have actually exited.
#[derive(Clone)]
pub struct PeerRegistry<P: ExecutionPayload + Clone> {
    peers: Arc<Mutex<HashMap<PeerId, CancellationToken>>>,
    shutdown: Arc<Mutex<GracefulShutdown>>,
    new_stream: Arc<dyn NewStream>,
    peer_requests_rx: Arc<Mutex<mpsc::Receiver<PeerRequest>>>,
    results_tx: mpsc::Sender<SyncResult<P>>,
    config: SyncConfig,
}

impl<P: ExecutionPayload + Clone> PeerRegistry<P> {
    /// Registers `id` and spawns its worker, scoped to a cancellation
    /// handle derived from the shutdown hierarchy's root. A duplicate `id`
    /// logs a warning and is a no-op.
    pub async fn add_peer(&self, id: PeerId) {
        let mut peers = self.peers.lock().await;
        if peers.contains_key(&id) {
            tracing::warn!(target: "downloaders::sync", peer = %id, "duplicate add_peer, ignoring");
            return
        }
        let mut shutdown = self.shutdown.lock().await;
        let token = shutdown.child_token();
        peers.insert(id, token.clone());

        let worker = super::worker::PeerWorker::new(
            id,
            self.config.clone(),
            self.new_stream.clone(),
            self.peer_requests_rx.clone(),
            self.results_tx.clone(),
            token,
        );
        shutdown.track(worker.run());
    }

    /// Cancels a peer's worker. A missing `id` logs a warning and is a
    /// no-op. The worker itself is still joined by [`PeerRegistry::close`];
    /// this only signals it to stop.
    pub async fn remove_peer(&self, id: PeerId) {
        let mut peers = self.peers.lock().await;
        match peers.remove(&id) {
            Some(token) => token.cancel(),
            None => {
                tracing::warn!(target: "downloaders::sync", peer = %id, "remove_peer of unknown peer, ignoring")
            }
        }
    }

    /// Cancels every worker (via the shutdown hierarchy's root) and blocks
    /// until all of them, past and present, have exited.
    pub async fn close(&self) {
        self.shutdown.lock().await.shutdown().await;
    }

    async fn root(&self) -> CancellationToken {
        self.shutdown.lock().await.root_token()
    }
}

/// The coordinator's exclusive bookkeeping: trust set, quarantine, and
/// in-flight table. Touched only from [`Coordinator::run`]'s own task, per
/// the single-owner invariant, with no internal synchronization.
struct Book<P> {
    trust: TrustSet,
    quarantine: Quarantine<P>,
    in_flight: HashMap<BlockNumber, SharedFlag>,
}

/// Single-owner main loop over range requests and peer results
/// (component C4). Owns the trust set, quarantine, and in-flight table;
/// schedules work onto per-peer workers via a bounded fan-out queue.
pub struct Coordinator<P: ExecutionPayload + Clone> {
    config: SyncConfig,
    receiver: Arc<dyn ReceivePayload<P>>,
    registry: PeerRegistry<P>,

    peer_requests_tx: mpsc::Sender<PeerRequest>,
    results_tx: mpsc::Sender<SyncResult<P>>,
    results_rx: mpsc::Receiver<SyncResult<P>>,
    range_rx: mpsc::Receiver<RangeRequest>,

    book: Book<P>,
}

impl<P: ExecutionPayload + Clone> Coordinator<P> {
    /// Builds a coordinator and its external handles: the
    /// [`PeerRegistry`] that [`super::Client::add_peer`]/`remove_peer`/
    /// `close` operate on, and the `range_tx` given to
    /// [`super::Client::request_range`].
    pub fn new(
        config: SyncConfig,
        new_stream: Arc<dyn NewStream>,
        receiver: Arc<dyn ReceivePayload<P>>,
    ) -> (Self, PeerRegistry<P>, mpsc::Sender<RangeRequest>) {
        let (peer_requests_tx, peer_requests_rx) =
            mpsc::channel(config.peer_requests_queue_capacity);
        let (results_tx, results_rx) = mpsc::channel(config.results_queue_capacity);
        let (range_tx, range_rx) = mpsc::channel(config.peer_requests_queue_capacity);

        let registry = PeerRegistry {
            peers: Arc::new(Mutex::new(HashMap::new())),
            shutdown: Arc::new(Mutex::new(GracefulShutdown::new())),
            new_stream,
            peer_requests_rx: Arc::new(Mutex::new(peer_requests_rx)),
            results_tx: results_tx.clone(),
            config: config.clone(),
        };

        let book = Book {
            trust: TrustSet::new(config.trust_set_capacity),
            quarantine: Quarantine::new(config.quarantine_capacity),
            in_flight: HashMap::new(),
        };

        let coordinator = Self {
            config,
            receiver,
            registry: registry.clone(),
            peer_requests_tx,
            results_tx,
            results_rx,
            range_rx,
            book,
        };
        (coordinator, registry, range_tx)
    }

    /// Runs the main loop until the registry's root cancellation fires.
    ///
    /// Does not itself join peer workers; that is
    /// [`PeerRegistry::close`]'s job, callable independently of whether
    /// this loop has noticed the cancellation yet.
    pub async fn run(mut self) {
        let root = self.registry.root().await;
        loop {
            tokio::select! {
                biased;
                _ = root.cancelled() => break,
                Some(req) = self.range_rx.recv() => {
                    self.on_range_request(req).await;
                }
                Some(res) = self.results_rx.recv() => {
                    self.on_result(res).await;
                }
                else => break,
            }
        }
    }

    async fn on_range_request(&mut self, req: RangeRequest) {
        if req.end.is_zero() {
            tracing::debug!(
                target: "downloaders::sync",
                "request_range with zero end block ref, no trust anchor, ignoring"
            );
            return
        }
        self.book.trust.add(req.end.hash);
        self.book.trust.add(req.end.parent_hash);
        self.book.in_flight.retain(|_, flag| !flag.is_set());

        if req.end.number == 0 || req.start >= req.end.number - 1 {
            return
        }

        let deadline = tokio::time::Instant::now() + self.config.max_request_scheduling;
        let mut n = req.end.number - 1;
        while n > req.start {
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!(
                    target: "downloaders::sync",
                    "range request scheduling pass hit its deadline, aborting early"
                );
                break
            }

            if let Some(hash) = self.book.quarantine.contains_by_number(n) {
                if self.book.trust.contains(&hash) {
                    self.try_promote(hash).await;
                }
                n -= 1;
                continue
            }
            if self.book.in_flight.contains_key(&n) {
                n -= 1;
                continue
            }

            let flag = SharedFlag::new();
            let request = PeerRequest { number: n, complete: flag.clone() };
            match self.peer_requests_tx.try_send(request) {
                Ok(()) => {
                    self.book.in_flight.insert(n, flag);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(
                        target: "downloaders::sync",
                        "peer requests queue saturated, aborting scheduling pass"
                    );
                    break
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(
                        target: "downloaders::sync",
                        "peer requests queue closed, aborting scheduling pass"
                    );
                    break
                }
            }
            n -= 1;
        }

        metrics::record_bookkeeping_sizes(
            self.book.in_flight.len(),
            self.book.quarantine.len(),
            self.book.trust.len(),
        );
    }

    async fn on_result(&mut self, res: SyncResult<P>) {
        let number = res.payload.block_number();
        self.book.in_flight.remove(&number);
        let hash = res.payload.block_hash();
        self.book.quarantine.put(hash, res.clone(), &self.book.trust);
        if self.book.trust.contains(&hash) {
            self.promote(res).await;
        }
        metrics::record_bookkeeping_sizes(
            self.book.in_flight.len(),
            self.book.quarantine.len(),
            self.book.trust.len(),
        );
    }

    async fn promote(&mut self, res: SyncResult<P>) {
        let hash = res.payload.block_hash();
        let parent_hash = res.payload.parent_hash();
        let number = res.payload.block_number();

        let delivered = tokio::time::timeout(
            self.config.max_result_processing,
            self.receiver.receive_payload(res.peer, res.payload.clone()),
        )
        .await;

        match delivered {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(
                    target: "downloaders::sync",
                    %hash,
                    number,
                    error = %err,
                    "receive_payload failed, leaving trust unchanged for a later retry"
                );
                return
            }
            Err(_) => {
                tracing::debug!(
                    target: "downloaders::sync",
                    %hash,
                    number,
                    budget = ?self.config.max_result_processing,
                    "receive_payload exceeded its result-processing budget, leaving trust unchanged for a later retry"
                );
                return
            }
        }
        metrics::record_promotion();

        // `hash` was already trusted (that's why this was eligible);
        // `parent_hash` is the newly-established trust anchor.
        self.book.trust.add(parent_hash);
        self.book.quarantine.remove(&hash, &self.book.trust);

        self.try_promote(parent_hash).await;

        if number > 0 {
            self.book.quarantine.remove_by_number(number - 1, &self.book.trust);
        }
    }

    async fn try_promote(&mut self, hash: Hash256) {
        if let Some(result) = self.book.quarantine.get(&hash) {
            if self.results_tx.try_send(result).is_err() {
                tracing::debug!(
                    target: "downloaders::sync",
                    %hash,
                    "results channel full, dropping promotion cascade trigger"
                );
            }
        }
    }
}
