//! Capability interface — the contract between the engine and the opaque
//! object graphs it batches calls into.
//!
//! Collaborators implement `Object` (member lookup plus an identity token)
//! and `Callable` (identity token plus a blocking call). The engine imposes
//! nothing else on them: a callable runs to completion or fails with a
//! message, and its token folds bound receiver state into fingerprints.

use crate::core::types::Value;
use std::sync::Arc;

/// A member reached by navigating a name on an object.
pub enum Member {
    /// A plain value member.
    Value(Value),
    /// A bound method; the callable's token must cover the receiver state.
    Method(Arc<dyn Callable>),
}

/// An opaque object the engine can navigate into.
pub trait Object: Send + Sync {
    /// Short type name for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Look up a member by name. `None` means the object has no such
    /// member, which sends resolution onward to scope and builtins.
    fn member(&self, name: &str) -> Option<Member>;

    /// Identity token folded into fingerprints when this object appears in
    /// call arguments. `None` marks the object as non-fingerprintable, a
    /// hard usage error when it reaches a deferred call.
    fn token(&self) -> Option<String> {
        None
    }
}

/// A blocking call target dispatched on the worker pool.
pub trait Callable: Send + Sync {
    /// Stable identity for fingerprinting. Two callables with the same
    /// token and the same arguments are the same logical call.
    fn token(&self) -> String;

    /// Execute the call. Runs on a worker thread during batch dispatch, or
    /// on the driver thread in serial mode. Must not touch engine state.
    fn call(&self, args: &[Value]) -> Result<Value, String>;

    /// Sequence-generating primitives return `true` so their list result
    /// is republished as a deferred sequence instead of a flat value.
    fn yields_sequence(&self) -> bool {
        false
    }
}
