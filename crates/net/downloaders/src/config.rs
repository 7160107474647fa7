use std::time::Duration;

/// Client-side sync configuration: rate limits, buffer capacities, and
/// timeouts for the reverse-range sync core.
///
/// All defaults match the reverse-range sync protocol's own constants;
/// nothing here is tuned per-deployment beyond `l2_chain_id` and
/// `max_gossip_size`, which the embedding node must supply.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The L2 chain id, interpolated into the reqresp protocol id.
    pub l2_chain_id: u64,
    /// Maximum accepted response body length, shared with the server side.
    pub max_gossip_size: u64,

    /// Trust set capacity (FIFO eviction).
    pub trust_set_capacity: u32,
    /// Quarantine LRU capacity.
    pub quarantine_capacity: u32,
    /// Capacity of the bounded `peer_requests` fan-out queue.
    pub peer_requests_queue_capacity: usize,
    /// Capacity of the bounded `results` queue.
    pub results_queue_capacity: usize,

    /// Per-peer rate limiter: time to accumulate one token.
    pub peer_rate_limit_period: Duration,
    /// Per-peer rate limiter burst size.
    pub peer_rate_limit_burst: u32,
    /// Tokens burned as back-off after a failed request.
    pub peer_failure_backoff_tokens: u32,

    /// Deadline for a single `on_range_request` scheduling pass.
    pub max_request_scheduling: Duration,
    /// Deadline for processing a single result.
    pub max_result_processing: Duration,

    /// Stream open timeout.
    pub stream_open_timeout: Duration,
    /// Request write deadline.
    pub write_timeout: Duration,
    /// Response read deadline (covers length prefix and body).
    pub read_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            l2_chain_id: 10,
            max_gossip_size: 10 * 1024 * 1024,

            trust_set_capacity: 10_000,
            quarantine_capacity: 100,
            peer_requests_queue_capacity: 128,
            results_queue_capacity: 128,

            peer_rate_limit_period: Duration::from_millis(10),
            peer_rate_limit_burst: 10,
            peer_failure_backoff_tokens: 100,

            max_request_scheduling: Duration::from_secs(3),
            max_result_processing: Duration::from_secs(3),

            stream_open_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(20),
        }
    }
}

impl SyncConfig {
    /// The reqresp protocol id for this chain:
    /// `/opstack/{l2_chain_id}/reqresp/payload_by_number/0.1.0`.
    pub fn protocol_id(&self) -> String {
        format!("/opstack/{}/reqresp/payload_by_number/0.1.0", self.l2_chain_id)
    }
}

/// Server-side admission control configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum accepted response body length, shared with the client side.
    pub max_gossip_size: u64,
    /// The genesis L2 block number; requests below this are rejected.
    pub genesis_l2_number: u64,

    /// Global rate limiter: time to accumulate one token.
    pub global_rate_limit_period: Duration,
    /// Global rate limiter burst size.
    pub global_rate_limit_burst: u32,
    /// Per-peer rate limiter: time to accumulate one token.
    pub peer_rate_limit_period: Duration,
    /// Per-peer rate limiter burst size.
    pub peer_rate_limit_burst: u32,
    /// Capacity of the per-peer bucket LRU.
    pub peer_bucket_capacity: u32,

    /// Overall wall-clock budget for the admission phase (global + per-peer
    /// token acquisition).
    pub max_throttle_delay: Duration,
    /// Request read deadline.
    pub read_timeout: Duration,
    /// Response write deadline.
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_gossip_size: 10 * 1024 * 1024,
            genesis_l2_number: 0,

            global_rate_limit_period: Duration::from_millis(1000 / 3),
            global_rate_limit_burst: 2,
            peer_rate_limit_period: Duration::from_millis(250),
            peer_rate_limit_burst: 3,
            peer_bucket_capacity: 1_000,

            max_throttle_delay: Duration::from_secs(20),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}
