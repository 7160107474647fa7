//! The peer-to-peer reverse-range block sync core.
//!
//! Given a contiguous range of missing block numbers anchored on a
//! trusted future block reference, [`client::Client`] fetches each block
//! from a dynamically changing peer set and delivers verified blocks to a
//! consumer in reverse chain order, verifying backward through parent
//! hashes. [`server::Server`] is the mirror-image admission controller
//! that gates inbound requests for the same protocol on the serving
//! side.
//!
//! Neither side owns the wire transport (stream opening, read/write
//! deadlines beyond what this crate itself imposes) or block storage;
//! both are injected capabilities, see [`stream::NewStream`] and
//! [`server::BlockByNumber`].

#![warn(missing_docs, unreachable_pub)]

pub mod client;
mod config;
mod metrics;
mod rate_limit;
pub mod server;
mod stream;
mod wire;

pub use client::{
    Client, Coordinator, PeerRegistry, PeerRequest, RangeRequest, ReceivePayload, SharedFlag,
    SyncResult,
};
pub use config::{ServerConfig, SyncConfig};
pub use rate_limit::TokenBucket;
pub use server::Server;
pub use stream::{BoxStream, NewStream, Stream};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
