//! Deferred handles — lazy references over the values a batched body
//! navigates, invokes, and iterates.
//!
//! A handle always wraps a concrete value; a deferred invocation whose
//! result is not yet published surfaces as the `NotReady` outcome of
//! `call`, which aborts the current replay pass. Navigation goes through
//! the attribute cache, so re-walking the same path in a later pass returns
//! the identical core — including its iteration cursor, which is what lets
//! loops discover one new call per pass until the queue stabilizes.

use crate::core::fingerprint::{fingerprint_call, fingerprint_member};
use crate::core::queue::PendingCall;
use crate::core::resolver;
use crate::core::scheduler::Scheduler;
use crate::core::types::{CallOutcome, EngineError, Value};
use std::cell::{Cell, RefCell};
use std::sync::Arc;

/// Resolution mode, inherited from the root that created the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Calls are fingerprinted, queued, and dispatched in batches.
    Deferred,
    /// Calls execute eagerly on the driver thread, with no batching.
    Serial,
}

/// Shared state of a handle. Cached in the attribute cache so repeated
/// navigation to the same logical child shares one core per round.
pub struct HandleCore {
    pub(crate) value: Value,
    pub(crate) path: String,
    pub(crate) mode: Mode,
    /// Iteration cursor; wraps modulo the snapshot length.
    cursor: Cell<usize>,
    /// Materialized on first iteration; fixed for the round.
    snapshot: RefCell<Option<Arc<Vec<Value>>>>,
}

impl HandleCore {
    pub(crate) fn new(value: Value, path: String, mode: Mode) -> Self {
        Self {
            value,
            path,
            mode,
            cursor: Cell::new(0),
            snapshot: RefCell::new(None),
        }
    }
}

/// A lazy reference into the scheduler's deferred-call graph.
pub struct Handle<'s> {
    sched: &'s Scheduler,
    core: Arc<HandleCore>,
}

impl<'s> Clone for Handle<'s> {
    fn clone(&self) -> Self {
        Self {
            sched: self.sched,
            core: self.core.clone(),
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

impl<'s> Handle<'s> {
    pub(crate) fn from_core(sched: &'s Scheduler, core: Arc<HandleCore>) -> Self {
        Self { sched, core }
    }

    pub(crate) fn core(&self) -> &Arc<HandleCore> {
        &self.core
    }

    /// The concrete value this handle wraps.
    pub fn value(&self) -> Value {
        self.core.value.clone()
    }

    /// Dotted navigation path, for diagnostics.
    pub fn path(&self) -> &str {
        &self.core.path
    }

    pub fn mode(&self) -> Mode {
        self.core.mode
    }

    /// Identity of this handle as an attribute-cache parent. Tokenless
    /// objects fall back to pointer identity, which is stable for as long
    /// as the round's handles keep the object alive.
    fn cache_token(&self) -> String {
        match &self.core.value {
            Value::Object(obj) => obj
                .token()
                .unwrap_or_else(|| format!("obj:{:p}", Arc::as_ptr(obj))),
            Value::Callable(callable) => callable.token(),
            _ => format!("path:{}", self.core.path),
        }
    }

    /// Navigate to a child handle.
    ///
    /// Resolution order: member of this handle's concrete object, then the
    /// scheduler's capture scope (innermost frame first), then builtins.
    /// The resolved child is cached per (parent, name), so re-navigating
    /// the same step returns the identical core within a round.
    pub fn get(&self, name: &str) -> Result<Handle<'s>, EngineError> {
        let key = fingerprint_member(&self.cache_token(), name);
        if let Some(core) = self.sched.cached_attr(&key) {
            return Ok(Handle::from_core(self.sched, core));
        }

        let value = resolver::resolve_member(Some(&self.core.value), self.sched.scope(), name)?;
        let core = Arc::new(HandleCore::new(
            value,
            join_path(&self.core.path, name),
            self.core.mode,
        ));
        self.sched.cache_attr(key, core.clone());
        Ok(Handle::from_core(self.sched, core))
    }

    /// Invoke this handle.
    ///
    /// Serial mode executes immediately and returns a handle over the
    /// concrete result. Deferred mode serves a published outcome from the
    /// result cache, or queues the call (idempotently) and returns
    /// `NotReady` to abort the current replay pass. A cached failure is
    /// re-raised, never retried.
    pub fn call(&self, args: Vec<Value>) -> Result<Handle<'s>, EngineError> {
        let callable = match &self.core.value {
            Value::Callable(callable) => callable.clone(),
            _ => {
                return Err(EngineError::NotCallable {
                    path: self.core.path.clone(),
                })
            }
        };
        let result_path = format!("{}()", self.core.path);

        if self.core.mode == Mode::Serial {
            let value = callable
                .call(&args)
                .map_err(|message| EngineError::CallFailed {
                    path: result_path.clone(),
                    message,
                })?;
            let core = Arc::new(HandleCore::new(value, result_path, self.core.mode));
            return Ok(Handle::from_core(self.sched, core));
        }

        let fingerprint = fingerprint_call(callable.as_ref(), &args)?;
        if let Some(outcome) = self.sched.cached_result(&fingerprint) {
            self.sched.note_cache_hit();
            return match outcome {
                CallOutcome::Value(value) => {
                    let core = Arc::new(HandleCore::new(value, result_path, self.core.mode));
                    Ok(Handle::from_core(self.sched, core))
                }
                CallOutcome::Sequence(items) => {
                    // Shared per fingerprint so the iteration cursor
                    // persists across replay passes within the round.
                    if let Some(core) = self.sched.cached_attr(&fingerprint) {
                        return Ok(Handle::from_core(self.sched, core));
                    }
                    let core = Arc::new(HandleCore::new(
                        Value::list(items),
                        result_path,
                        self.core.mode,
                    ));
                    self.sched.cache_attr(fingerprint, core.clone());
                    Ok(Handle::from_core(self.sched, core))
                }
                CallOutcome::Failed(message) => Err(EngineError::CallFailed {
                    path: result_path,
                    message,
                }),
            };
        }

        self.sched.enqueue(PendingCall {
            fingerprint,
            callable,
            args,
            path: self.core.path.clone(),
        });
        Err(EngineError::NotReady {
            path: self.core.path.clone(),
        })
    }

    /// Iterate over the handle's list value.
    ///
    /// The first use materializes a fixed snapshot; the stream is infinite
    /// and cyclic, wrapping modulo the snapshot length, and the cursor is
    /// shared through the core so a later pass resumes where the previous
    /// one stopped. Bound consumption with `take` or `zip`. An empty list
    /// yields an immediately exhausted iterator.
    pub fn iter(&self) -> Result<CyclicIter<'s>, EngineError> {
        let items = {
            let mut snapshot = self.core.snapshot.borrow_mut();
            if snapshot.is_none() {
                match &self.core.value {
                    Value::List(items) => *snapshot = Some(items.clone()),
                    _ => {
                        return Err(EngineError::Unsupported {
                            op: "iteration over a non-list handle",
                        })
                    }
                }
            }
            snapshot.clone().unwrap_or_default()
        };
        Ok(CyclicIter {
            handle: self.clone(),
            items,
        })
    }

    /// Equality on deferred handles is unsupported; any attempt fails
    /// immediately rather than treating an unresolved value as comparable.
    pub fn try_eq(&self, _other: &Handle<'_>) -> Result<bool, EngineError> {
        Err(EngineError::Unsupported {
            op: "equality on deferred handles",
        })
    }

    /// Ordering on deferred handles is unsupported; see `try_eq`.
    pub fn try_cmp(&self, _other: &Handle<'_>) -> Result<std::cmp::Ordering, EngineError> {
        Err(EngineError::Unsupported {
            op: "ordering on deferred handles",
        })
    }

    /// Hashing a deferred handle is unsupported; see `try_eq`.
    pub fn try_hash(&self) -> Result<u64, EngineError> {
        Err(EngineError::Unsupported {
            op: "hashing a deferred handle",
        })
    }
}

/// Infinite cyclic iterator over a handle's materialized snapshot.
pub struct CyclicIter<'s> {
    handle: Handle<'s>,
    items: Arc<Vec<Value>>,
}

impl<'s> Iterator for CyclicIter<'s> {
    type Item = Handle<'s>;

    fn next(&mut self) -> Option<Handle<'s>> {
        if self.items.is_empty() {
            return None;
        }
        let cursor = self.handle.core.cursor.get();
        self.handle.core.cursor.set(cursor.wrapping_add(1));
        let index = cursor % self.items.len();
        let core = Arc::new(HandleCore::new(
            self.items[index].clone(),
            format!("{}[{}]", self.handle.core.path, index),
            self.handle.core.mode,
        ));
        Some(Handle::from_core(self.handle.sched, core))
    }
}
