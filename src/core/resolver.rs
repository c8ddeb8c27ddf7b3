//! Name resolution — explicit capture scope and the member → scope →
//! builtin lookup chain.
//!
//! Deferred roots and the variables a batched body depends on are bound by
//! name into the scope before the body runs. Lookup searches frames from
//! the innermost outward; builtins are the final fallback. A missing name
//! is an explicit error, distinguishable from a name bound to `Null`.

use crate::capability::Member;
use crate::core::types::{EngineError, Value};
use crate::primitives;
use rustc_hash::FxHashMap;

/// Named captures visible to a batched body, as a stack of frames.
pub struct Scope {
    frames: Vec<FxHashMap<String, Value>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            frames: vec![FxHashMap::default()],
        }
    }

    /// Open a nested frame; bindings in it shadow outer frames.
    pub fn push(&mut self) {
        self.frames.push(FxHashMap::default());
    }

    /// Close the innermost frame. The root frame always remains.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Bind a name in the innermost frame.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    /// Look a name up, innermost frame first.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.get(name) {
                return Some(value.clone());
            }
        }
        None
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Resolve a free name: scope frames innermost-outward, then builtins.
pub fn resolve_name(scope: &Scope, name: &str) -> Result<Value, EngineError> {
    if let Some(value) = scope.lookup(name) {
        return Ok(value);
    }
    if let Some(value) = primitives::lookup(name) {
        return Ok(value);
    }
    Err(EngineError::UnresolvedName {
        name: name.to_string(),
    })
}

/// Resolve a name navigated from a handle: member of the parent's concrete
/// object first, then the free-name chain.
pub fn resolve_member(
    parent: Option<&Value>,
    scope: &Scope,
    name: &str,
) -> Result<Value, EngineError> {
    if let Some(Value::Object(obj)) = parent {
        if let Some(member) = obj.member(name) {
            return Ok(match member {
                Member::Value(value) => value,
                Member::Method(callable) => Value::Callable(callable),
            });
        }
    }
    resolve_name(scope, name)
}
