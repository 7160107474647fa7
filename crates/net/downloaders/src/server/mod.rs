//! The server half of the reverse-range sync core: admission control and
//! the stream-handler wrapper registered with the transport.

mod admission;
mod handler;

pub use admission::Admission;
pub use handler::{BlockByNumber, BlockLookupError, Server};
