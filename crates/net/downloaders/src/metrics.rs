//! Internal instrumentation for the sync core.
//!
//! These are not part of the crate's public surface: process lifecycle,
//! metrics export, and the rest of the ambient observability stack are
//! the embedding node's concern. This
//! module only emits the counters/gauges via the `metrics` crate's global
//! recorder, the same way the rest of this workspace instruments itself;
//! wiring up an exporter is out of scope here.

/// Quarantine eviction, split by whether the evicted hash was trusted.
pub fn record_quarantine_eviction(trusted: bool) {
    if trusted {
        metrics::increment_counter!("downloaders.sync.quarantine_evictions", "trusted" => "true");
    } else {
        metrics::increment_counter!("downloaders.sync.quarantine_evictions", "trusted" => "false");
    }
}

/// A block was promoted to the consumer.
pub fn record_promotion() {
    metrics::increment_counter!("downloaders.sync.promotions");
}

/// A peer worker applied the failure back-off.
pub fn record_peer_backoff(peer: reth_primitives::PeerId) {
    metrics::increment_counter!("downloaders.sync.peer_backoffs", "peer" => peer.to_string());
}

/// Snapshot of the coordinator's bookkeeping sizes, recorded after every
/// scheduling pass and result.
pub fn record_bookkeeping_sizes(in_flight: usize, quarantine: usize, trust_set: usize) {
    metrics::gauge!("downloaders.sync.in_flight", in_flight as f64);
    metrics::gauge!("downloaders.sync.quarantine_len", quarantine as f64);
    metrics::gauge!("downloaders.sync.trust_set_len", trust_set as f64);
}

/// The server throttled or rejected an inbound request.
pub fn record_admission_outcome(outcome: &'static str) {
    metrics::increment_counter!("downloaders.sync.server.admission", "outcome" => outcome);
}
