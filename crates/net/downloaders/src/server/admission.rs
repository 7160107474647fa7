use crate::{config::ServerConfig, metrics, rate_limit::TokenBucket};
use reth_interfaces::p2p::error::RequestError;
use reth_primitives::PeerId;
use schnellru::{ByLength, LruMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The server-side admission controller (component C5): a global token
/// bucket shared by every peer, plus an LRU-bounded map of per-peer
/// buckets.
///
/// Gates every inbound request before it reaches the block source, so
/// that rate-limit failures never touch the block source at all.
pub struct Admission {
    global: TokenBucket,
    peers: Mutex<LruMap<PeerId, Arc<TokenBucket>, ByLength>>,
    peer_rate_limit_period: std::time::Duration,
    peer_rate_limit_burst: u32,
    max_throttle_delay: std::time::Duration,
}

impl Admission {
    /// Builds an admission controller from server configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            global: TokenBucket::new(config.global_rate_limit_period, config.global_rate_limit_burst),
            peers: Mutex::new(LruMap::new(ByLength::new(config.peer_bucket_capacity))),
            peer_rate_limit_period: config.peer_rate_limit_period,
            peer_rate_limit_burst: config.peer_rate_limit_burst,
            max_throttle_delay: config.max_throttle_delay,
        }
    }

    /// Runs the admission sequence for one inbound request from `peer`,
    /// under the overall `max_throttle_delay` wall-clock budget.
    ///
    /// A fresh per-peer bucket reserves its first token instead of
    /// waiting (a full bucket's `Wait` would be a no-op, letting a new
    /// peer bypass its own limit on first contact); the reservation is
    /// paid back by the peer's *next* request instead.
    pub async fn admit(&self, peer: PeerId) -> Result<(), RequestError> {
        let outcome = tokio::time::timeout(self.max_throttle_delay, async {
            self.global.acquire().await;

            let known_bucket = {
                let mut peers = self.peers.lock().await;
                match peers.get(&peer) {
                    Some(bucket) => Some(bucket.clone()),
                    None => {
                        let bucket = Arc::new(TokenBucket::new(
                            self.peer_rate_limit_period,
                            self.peer_rate_limit_burst,
                        ));
                        bucket.reserve();
                        peers.insert(peer, bucket);
                        None
                    }
                }
            };

            if let Some(bucket) = known_bucket {
                bucket.acquire().await;
            }
        })
        .await;

        match outcome {
            Ok(()) => {
                metrics::record_admission_outcome("admitted");
                Ok(())
            }
            Err(_) => {
                metrics::record_admission_outcome("throttled");
                Err(RequestError::Backpressure {
                    context: "server admission",
                    budget: self.max_throttle_delay,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_contact_is_admitted_immediately_via_reserve() {
        let config = ServerConfig {
            global_rate_limit_burst: 100,
            peer_rate_limit_burst: 1,
            ..Default::default()
        };
        let admission = Admission::new(&config);
        let peer = PeerId::repeat_byte(1);

        let start = tokio::time::Instant::now();
        admission.admit(peer).await.unwrap();
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn known_peers_second_request_waits_out_the_reservation() {
        let config = ServerConfig {
            global_rate_limit_burst: 100,
            peer_rate_limit_burst: 1,
            peer_rate_limit_period: std::time::Duration::from_millis(100),
            ..Default::default()
        };
        let admission = Admission::new(&config);
        let peer = PeerId::repeat_byte(1);

        admission.admit(peer).await.unwrap();
        let start = tokio::time::Instant::now();
        admission.admit(peer).await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(90));
    }

    #[tokio::test(start_paused = true)]
    async fn global_limit_throttles_distinct_unknown_peers_too() {
        let config = ServerConfig {
            global_rate_limit_burst: 1,
            global_rate_limit_period: std::time::Duration::from_millis(100),
            peer_rate_limit_burst: 100,
            ..Default::default()
        };
        let admission = Admission::new(&config);

        admission.admit(PeerId::repeat_byte(1)).await.unwrap();
        let start = tokio::time::Instant::now();
        admission.admit(PeerId::repeat_byte(2)).await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(90));
    }
}
