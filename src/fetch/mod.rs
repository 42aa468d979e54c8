//! Fetch Layer
//!
//! Origin transport, request coalescing and the fetch-through-cache client.

mod client;
mod coalescer;
mod transport;

pub use client::{FetchConfig, OriginCache, PayloadFormat};
pub use coalescer::{Coalescer, SharedFetch};
pub use transport::{HttpTransport, OriginResponse, Transport};
