//! Trace — append-only JSONL record of rounds, passes, batches, and calls.

pub mod eventlog;
