use reth_primitives::Hash256;
use std::collections::{HashSet, VecDeque};

/// The bounded recency set of block hashes known to be canonical relative
/// to the current sync horizon (component C1).
///
/// Capacity-bounded with FIFO eviction: insertion order is sufficient
/// since membership queries never reorder entries. Exclusively owned and
/// driven by the coordinator; no internal synchronization.
#[derive(Debug)]
pub struct TrustSet {
    capacity: usize,
    order: VecDeque<Hash256>,
    members: HashSet<Hash256>,
}

impl TrustSet {
    /// Creates an empty trust set bounded at `capacity` entries.
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity as usize;
        Self { capacity, order: VecDeque::with_capacity(capacity), members: HashSet::new() }
    }

    /// Adds `hash` to the trust set, evicting the oldest entry if already
    /// at capacity. A no-op if `hash` is already a member.
    pub fn add(&mut self, hash: Hash256) {
        if self.members.contains(&hash) {
            return
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(hash);
        self.members.insert(hash);
    }

    /// `true` if `hash` is currently trusted.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.members.contains(hash)
    }

    /// Number of hashes currently trusted.
    pub fn len(&self) -> usize {
        self.members.len()
    }
}
