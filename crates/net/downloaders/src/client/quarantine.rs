use super::types::SyncResult;
use crate::metrics;
use reth_primitives::{BlockNumber, ExecutionPayload, Hash256};
use schnellru::{ByLength, LruMap};
use std::collections::HashMap;

/// The bounded LRU of fetched-but-not-yet-verified blocks (component C2).
///
/// Maintains a secondary `by_number` index in lockstep with the primary
/// LRU: at most one hash is ever indexed per block number (the most
/// recently inserted one), and eviction always removes the matching
/// `by_number` entry before the value is dropped.
///
/// Exclusively owned and driven by the coordinator; no internal
/// synchronization.
#[derive(Debug)]
pub struct Quarantine<P: ExecutionPayload + Clone> {
    lru: LruMap<Hash256, SyncResult<P>, ByLength>,
    by_number: HashMap<BlockNumber, Hash256>,
    capacity: u32,
}

impl<P: ExecutionPayload + Clone> Quarantine<P> {
    /// Creates an empty quarantine with the given LRU capacity.
    pub fn new(capacity: u32) -> Self {
        Self {
            lru: LruMap::new(ByLength::new(capacity)),
            by_number: HashMap::new(),
            capacity,
        }
    }

    /// Inserts `result` under `hash`, evicting the least-recently-used
    /// entry first if the quarantine is already at capacity.
    ///
    /// If a different hash was previously indexed for this block number,
    /// that older entry is left in the LRU (it ages out on its own) but is
    /// no longer reachable via [`Quarantine::contains_by_number`].
    pub fn put(&mut self, hash: Hash256, result: SyncResult<P>, trust: &super::trust::TrustSet) {
        if self.lru.len() as u32 >= self.capacity && self.lru.peek(&hash).is_none() {
            if let Some((evicted_hash, evicted_result)) = self.lru.pop_oldest() {
                self.on_evict(evicted_hash, evicted_result, trust);
            }
        }
        let number = result.payload.block_number();
        self.lru.insert(hash, result);
        self.by_number.insert(number, hash);
    }

    /// Looks up `hash`, promoting its recency on hit.
    pub fn get(&mut self, hash: &Hash256) -> Option<SyncResult<P>> {
        self.lru.get(hash).cloned()
    }

    /// Looks up `hash` without affecting recency.
    pub fn peek(&self, hash: &Hash256) -> Option<&SyncResult<P>> {
        self.lru.peek(hash)
    }

    /// Removes `hash` explicitly (the normal path after a successful
    /// promotion), firing the eviction bookkeeping the same as an LRU
    /// eviction would.
    pub fn remove(&mut self, hash: &Hash256, trust: &super::trust::TrustSet) -> bool {
        match self.lru.remove(hash) {
            Some(result) => {
                self.on_evict(*hash, result, trust);
                true
            }
            None => false,
        }
    }

    /// Removes whatever entry the by-number index points at for `number`,
    /// without touching the LRU entry for any other number. Used by
    /// `promote`'s conflict-eviction step: the number one below a freshly
    /// promoted block can no longer be its true parent (the cascade would
    /// already have caught that), so its slot is freed for the next fetch.
    pub fn remove_by_number(&mut self, number: BlockNumber, trust: &super::trust::TrustSet) {
        if let Some(hash) = self.by_number.get(&number).copied() {
            self.remove(&hash, trust);
        }
    }

    /// Returns the hash currently indexed for block `number`, if any.
    /// Index lookup only; does not touch LRU recency.
    pub fn contains_by_number(&self, number: BlockNumber) -> Option<Hash256> {
        self.by_number.get(&number).copied()
    }

    /// Number of entries currently in the LRU.
    pub fn len(&self) -> usize {
        self.lru.len() as usize
    }

    /// `true` if the quarantine holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lru.len() == 0
    }

    fn on_evict(&mut self, hash: Hash256, result: SyncResult<P>, trust: &super::trust::TrustSet) {
        let number = result.payload.block_number();
        if self.by_number.get(&number) == Some(&hash) {
            self.by_number.remove(&number);
        }
        if trust.contains(&hash) {
            tracing::debug!(
                target: "downloaders::sync",
                %hash,
                number,
                "trusted eviction from quarantine"
            );
            metrics::record_quarantine_eviction(true);
        } else {
            tracing::debug!(
                target: "downloaders::sync",
                %hash,
                number,
                peer = %result.peer,
                "untrusted eviction from quarantine"
            );
            metrics::record_quarantine_eviction(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::trust::TrustSet;
    use reth_primitives::{OpaqueExecutionPayload, PeerId};

    fn result(parent: Hash256, number: u64) -> (Hash256, SyncResult<OpaqueExecutionPayload>) {
        let payload = OpaqueExecutionPayload::new(parent, number, vec![]);
        let hash = payload.block_hash();
        (hash, SyncResult { payload, peer: PeerId::repeat_byte(7) })
    }

    #[test]
    fn capacity_eviction_removes_exactly_one_by_number_entry() {
        let trust = TrustSet::new(10_000);
        let mut quarantine = Quarantine::new(100);
        for n in 0..101u64 {
            let (hash, result) = result(Hash256::repeat_byte(n as u8), n);
            quarantine.put(hash, result, &trust);
        }
        assert_eq!(quarantine.len(), 100);
        // The very first entry (number 0) must have aged out, along with its index.
        assert!(quarantine.contains_by_number(0).is_none());
        assert!(quarantine.contains_by_number(100).is_some());
    }

    #[test]
    fn by_number_points_at_most_recently_inserted_hash() {
        let trust = TrustSet::new(10_000);
        let mut quarantine = Quarantine::new(100);
        let (hash_a, result_a) = result(Hash256::repeat_byte(1), 9);
        quarantine.put(hash_a, result_a, &trust);
        let (hash_b, result_b) = result(Hash256::repeat_byte(2), 9);
        quarantine.put(hash_b, result_b, &trust);

        assert_eq!(quarantine.contains_by_number(9), Some(hash_b));
        // The older entry is still reachable directly by hash until it ages out.
        assert!(quarantine.peek(&hash_a).is_some());
    }
}
