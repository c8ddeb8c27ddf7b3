//! BLAKE3 call fingerprinting over a canonical argument encoding.
//!
//! A fingerprint is the sole identity used for deduplication and caching:
//! two calls with the same callable token and structurally identical
//! arguments must fingerprint identically, so the encoding sorts map keys
//! and rejects anything without a stable canonical form (tokenless objects,
//! non-finite floats).

use crate::capability::Callable;
use crate::core::types::{EngineError, Value};
use std::fmt;

/// A `blake3:{hex}` digest identifying a call or an attribute-cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint a call: callable identity token plus canonical arguments.
pub fn fingerprint_call(
    callable: &dyn Callable,
    args: &[Value],
) -> Result<Fingerprint, EngineError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(callable.token().as_bytes());
    hasher.update(b"\0");

    let mut encoded = Vec::with_capacity(args.len());
    for arg in args {
        encoded.push(canonical_value(arg)?);
    }
    let bytes = serde_json::to_vec(&encoded)
        .map_err(|e| EngineError::NotFingerprintable {
            what: format!("arguments ({})", e),
        })?;
    hasher.update(&bytes);

    Ok(Fingerprint(format!("blake3:{}", hasher.finalize().to_hex())))
}

/// Fingerprint an attribute-cache slot: parent identity plus member name.
pub fn fingerprint_member(parent_token: &str, name: &str) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    hasher.update(parent_token.as_bytes());
    hasher.update(b"\0");
    hasher.update(name.as_bytes());
    Fingerprint(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Canonical JSON form of a value: map keys sorted, opaque values replaced
/// by their identity tokens. Fails on anything without a stable encoding.
fn canonical_value(value: &Value) -> Result<serde_json::Value, EngineError> {
    use serde_json::Value as Json;

    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(n) => Ok(Json::from(*n)),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(Json::Number)
            .ok_or_else(|| EngineError::NotFingerprintable {
                what: format!("non-finite float {}", x),
            }),
        Value::Str(s) => Ok(Json::String(s.clone())),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(canonical_value(item)?);
            }
            Ok(Json::Array(out))
        }
        Value::Map(entries) => {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::with_capacity(keys.len());
            for key in keys {
                out.insert(key.clone(), canonical_value(&entries[key.as_str()])?);
            }
            Ok(Json::Object(out))
        }
        Value::Object(obj) => {
            let token = obj.token().ok_or_else(|| EngineError::NotFingerprintable {
                what: format!("object of type `{}` without an identity token", obj.type_name()),
            })?;
            let mut out = serde_json::Map::with_capacity(1);
            out.insert("$object".to_string(), Json::String(token));
            Ok(Json::Object(out))
        }
        Value::Callable(call) => {
            let mut out = serde_json::Map::with_capacity(1);
            out.insert("$callable".to_string(), Json::String(call.token()));
            Ok(Json::Object(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Object;
    use indexmap::IndexMap;
    use proptest::prelude::*;

    struct Probe;

    impl Callable for Probe {
        fn token(&self) -> String {
            "probe".to_string()
        }

        fn call(&self, _args: &[Value]) -> Result<Value, String> {
            Ok(Value::Null)
        }
    }

    struct Anonymous;

    impl Object for Anonymous {
        fn type_name(&self) -> &'static str {
            "anonymous"
        }

        fn member(&self, _name: &str) -> Option<crate::capability::Member> {
            None
        }
    }

    struct Tagged(i64);

    impl Object for Tagged {
        fn type_name(&self) -> &'static str {
            "tagged"
        }

        fn member(&self, _name: &str) -> Option<crate::capability::Member> {
            None
        }

        fn token(&self) -> Option<String> {
            Some(format!("tagged:{}", self.0))
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let args = vec![Value::Int(1), Value::from("x")];
        let a = fingerprint_call(&Probe, &args).unwrap();
        let b = fingerprint_call(&Probe, &args).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("blake3:"));
        assert_eq!(a.as_str().len(), 7 + 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_args() {
        let a = fingerprint_call(&Probe, &[Value::Int(1)]).unwrap();
        let b = fingerprint_call(&Probe, &[Value::Int(2)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_map_key_order_insensitive() {
        let mut first = IndexMap::new();
        first.insert("a".to_string(), Value::Int(1));
        first.insert("b".to_string(), Value::Int(2));

        let mut second = IndexMap::new();
        second.insert("b".to_string(), Value::Int(2));
        second.insert("a".to_string(), Value::Int(1));

        let a = fingerprint_call(&Probe, &[Value::map(first)]).unwrap();
        let b = fingerprint_call(&Probe, &[Value::map(second)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_object_tokens() {
        let a = fingerprint_call(&Probe, &[Value::object(Tagged(1))]).unwrap();
        let b = fingerprint_call(&Probe, &[Value::object(Tagged(1))]).unwrap();
        let c = fingerprint_call(&Probe, &[Value::object(Tagged(2))]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_tokenless_object_rejected() {
        let result = fingerprint_call(&Probe, &[Value::object(Anonymous)]);
        assert!(matches!(
            result,
            Err(EngineError::NotFingerprintable { .. })
        ));
    }

    #[test]
    fn test_fingerprint_nan_rejected() {
        let result = fingerprint_call(&Probe, &[Value::Float(f64::NAN)]);
        assert!(matches!(
            result,
            Err(EngineError::NotFingerprintable { .. })
        ));
    }

    #[test]
    fn test_fingerprint_member_distinct() {
        let a = fingerprint_member("counter:0", "advance");
        let b = fingerprint_member("counter:0", "value");
        let c = fingerprint_member("counter:1", "advance");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    proptest! {
        #[test]
        fn prop_int_args_deterministic(values in prop::collection::vec(any::<i64>(), 0..8)) {
            let args: Vec<Value> = values.iter().copied().map(Value::Int).collect();
            let a = fingerprint_call(&Probe, &args).unwrap();
            let b = fingerprint_call(&Probe, &args).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_distinct_strings_distinct(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
            prop_assume!(a != b);
            let fa = fingerprint_call(&Probe, &[Value::str(a)]).unwrap();
            let fb = fingerprint_call(&Probe, &[Value::str(b)]).unwrap();
            prop_assert_ne!(fa, fb);
        }
    }
}
