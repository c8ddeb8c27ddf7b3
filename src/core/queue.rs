//! Pending-call queue — deduplicated registry of discovered calls.

use crate::capability::Callable;
use crate::core::fingerprint::Fingerprint;
use crate::core::types::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// A call discovered but not yet dispatched.
#[derive(Clone)]
pub struct PendingCall {
    /// Dedup/cache identity.
    pub fingerprint: Fingerprint,

    /// The resolved call target.
    pub callable: Arc<dyn Callable>,

    /// Concrete arguments at discovery time.
    pub args: Vec<Value>,

    /// Dotted navigation path of the call site, for diagnostics.
    pub path: String,
}

/// Order-preserving queue with at most one entry per fingerprint.
#[derive(Default)]
pub struct CallQueue {
    entries: IndexMap<Fingerprint, PendingCall>,
}

impl CallQueue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Insert a pending call. Re-inserting an already-queued fingerprint is
    /// a no-op, which keeps the replay driver's stabilization check sound.
    /// Returns whether the call was newly inserted.
    pub fn insert(&mut self, call: PendingCall) -> bool {
        if self.entries.contains_key(&call.fingerprint) {
            return false;
        }
        self.entries.insert(call.fingerprint.clone(), call);
        true
    }

    /// Snapshot every queued call and clear the queue in one step.
    pub fn take_batch(&mut self) -> Vec<PendingCall> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
