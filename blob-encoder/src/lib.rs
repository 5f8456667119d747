#![allow(dead_code)]

//! CPU-bound erasure encoding of a single blob.
//!
//! Data Flow:
//! ```text
//! payload ──► split into `primary` shards (zero padded)
//!                 │
//!                 ├─► parity rows over GF(2^8) ──► `secondary` shards
//!                 │
//!                 └─► SHA-256 per shard ──► blob id = SHA-256(identifier, len, digests)
//! ```
//!
//! Everything here is synchronous and runs to completion on the calling
//! thread. Callers that care about latency must not invoke it from a
//! cooperative scheduler; callers that want to demonstrate starvation do.

pub mod encoder;
pub mod gf;
pub mod shard;

pub use encoder::{EncodedBlob, Settings, encode};
