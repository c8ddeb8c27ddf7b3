//! Tanda — automatic call batching for blocking workloads.
//!
//! Deferred handles intercept navigation and invocation, a replay driver
//! re-runs the calling body until the discovered-call set stabilizes, and a
//! bounded worker pool dispatches each stabilized batch concurrently.
//! BLAKE3 call fingerprints provide deduplication and result caching.

pub mod capability;
pub mod core;
pub mod primitives;
pub mod trace;
