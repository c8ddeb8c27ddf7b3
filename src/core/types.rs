//! Shared types of the batching engine.
//!
//! Defines the dynamic `Value` vocabulary exchanged with collaborators, call
//! outcomes, round/batch reports, engine statistics, trace events, and the
//! engine error enum.

use crate::capability::{Callable, Object};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Values
// ============================================================================

/// A dynamic value passed into and returned from batched calls.
///
/// Values are cheap to clone (compound variants are `Arc`-shared) and cross
/// into worker threads as call arguments; only the driver thread ever writes
/// engine state.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Fixed-length sequence. Iteration over a deferred handle snapshots it.
    List(Arc<Vec<Value>>),
    /// Order-preserving string-keyed map.
    Map(Arc<IndexMap<String, Value>>),
    /// An opaque collaborator object, navigable by member name.
    Object(Arc<dyn Object>),
    /// A call target; invoking a handle over it queues a batched call.
    Callable(Arc<dyn Callable>),
}

impl Value {
    /// Build a string value.
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Build a list value.
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Arc::new(items))
    }

    /// Build a map value.
    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Self::Map(Arc::new(entries))
    }

    /// Wrap a collaborator object.
    pub fn object(obj: impl Object + 'static) -> Self {
        Self::Object(Arc::new(obj))
    }

    /// Wrap a call target.
    pub fn callable(call: impl Callable + 'static) -> Self {
        Self::Callable(Arc::new(call))
    }

    /// Variant name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(obj) => obj.type_name(),
            Self::Callable(_) => "callable",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({})", b),
            Self::Int(n) => write!(f, "Int({})", n),
            Self::Float(x) => write!(f, "Float({})", x),
            Self::Str(s) => write!(f, "Str({:?})", s),
            Self::List(items) => write!(f, "List(len={})", items.len()),
            Self::Map(entries) => write!(f, "Map(len={})", entries.len()),
            Self::Object(obj) => write!(f, "Object({})", obj.type_name()),
            Self::Callable(call) => write!(f, "Callable({})", call.token()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}

// ============================================================================
// Call outcomes
// ============================================================================

/// Published result of a dispatched call, keyed by fingerprint in the
/// result cache. A fingerprint is never simultaneously queued and resolved;
/// it moves from the queue to the cache exactly once per batch dispatch.
#[derive(Clone)]
pub enum CallOutcome {
    /// Plain resolved value.
    Value(Value),
    /// Sequence-generator result; consumption wraps it back into a fresh
    /// deferred handle so downstream navigation and iteration stay lazy.
    Sequence(Vec<Value>),
    /// The call failed; the failure is re-raised to whichever pass next
    /// consumes this fingerprint, never retried.
    Failed(String),
}

impl fmt::Debug for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "Value({:?})", v),
            Self::Sequence(items) => write!(f, "Sequence(len={})", items.len()),
            Self::Failed(e) => write!(f, "Failed({:?})", e),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Result of one batch dispatch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Calls dispatched in this batch.
    pub dispatched: u32,

    /// Calls whose outcome was a failure.
    pub failed: u32,

    /// Wall-clock duration of the full-batch barrier.
    pub total_duration: Duration,
}

/// Result of one converged round.
#[derive(Debug)]
pub struct RoundReport<T> {
    /// Whatever the body returned on its clean completion.
    pub value: T,

    /// Replay passes executed, including the converging one.
    pub passes: u32,

    /// Batch executor invocations.
    pub batches: u32,

    /// Wall-clock duration of the round.
    pub total_duration: Duration,
}

/// Cumulative engine counters, kept across rounds.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Distinct calls inserted into the queue.
    pub calls_enqueued: u64,

    /// Enqueue attempts that were no-ops (fingerprint already queued).
    pub dedup_hits: u64,

    /// Invocations served synchronously from the result cache.
    pub cache_hits: u64,

    /// Batches that dispatched at least one call.
    pub batches: u64,

    /// Calls handed to worker threads.
    pub dispatched: u64,

    /// Dispatched calls that failed.
    pub failed: u64,
}

// ============================================================================
// Trace events
// ============================================================================

/// Trace event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    RoundStarted {
        run_id: String,
        engine_version: String,
    },
    PassObserved {
        run_id: String,
        pass: u32,
        queued: usize,
    },
    BatchDispatched {
        run_id: String,
        batch: u64,
        calls: usize,
    },
    CallResolved {
        run_id: String,
        fingerprint: String,
        duration_seconds: f64,
    },
    CallFailed {
        run_id: String,
        fingerprint: String,
        error: String,
    },
    RoundConverged {
        run_id: String,
        passes: u32,
        batches: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper. Timestamps are unix epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: f64,
    #[serde(flatten)]
    pub event: TraceEvent,
}

// ============================================================================
// Errors
// ============================================================================

/// Engine error. `NotReady` is the internal control signal of the replay
/// protocol and never escapes `auto`; every other variant is user-visible.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A deferred call's result is not yet cached. Aborts the current
    /// replay pass; consumed by the driver's convergence check.
    #[error("call at `{path}` is not yet resolved")]
    NotReady { path: String },

    /// Name resolution found nothing in members, scope, or builtins.
    #[error("unresolved name `{name}`")]
    UnresolvedName { name: String },

    /// Comparison, ordering, hashing, or iteration misuse on a handle.
    #[error("unsupported operation on deferred handle: {op}")]
    Unsupported { op: &'static str },

    /// Invocation of a handle over a non-callable value.
    #[error("`{path}` is not callable")]
    NotCallable { path: String },

    /// An argument has no canonical encoding. Hard usage error.
    #[error("cannot fingerprint {what}")]
    NotFingerprintable { what: String },

    /// Propagated callee failure, cached against the call's fingerprint.
    #[error("call at `{path}` failed: {message}")]
    CallFailed { path: String, message: String },

    /// The per-round batch safety bound tripped before convergence.
    #[error("round did not converge within {limit} batch dispatches")]
    RoundLimit { limit: u32 },

    /// Worker pool construction failed.
    #[error("worker pool error: {0}")]
    Pool(String),

    /// Configuration parse or validation failure.
    #[error("invalid configuration: {0}")]
    Config(String),
}
