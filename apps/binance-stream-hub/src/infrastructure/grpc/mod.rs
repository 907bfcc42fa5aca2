//! gRPC Streaming Gateway
//!
//! Implements the `StreamHubService` gRPC service that exposes raw
//! exchange frames to downstream clients.
//!
//! # Architecture
//!
//! Each streaming RPC resolves a receiver from the raw feed hub (per
//! symbol, or the firehose) and runs its own forwarding loop. Calls
//! share nothing but the read-only broadcast channel, so concurrent
//! calls for the same symbol never block each other.

pub mod server;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod coinwatch {
        pub mod v1 {
            include!(concat!(env!("OUT_DIR"), "/coinwatch.v1.rs"));
        }
    }
}

pub use server::{StreamHubServer, StreamHubServerConfig};
