//! Builtin primitives — the final fallback of name resolution.
//!
//! `range` is the sequence-generating special case: its result is
//! republished as a deferred sequence so iteration over it stays lazy.

use crate::capability::Callable;
use crate::core::types::Value;
use std::sync::Arc;

/// Look a builtin up by name.
pub fn lookup(name: &str) -> Option<Value> {
    match name {
        "range" => Some(Value::Callable(Arc::new(RangeFn))),
        "len" => Some(Value::Callable(Arc::new(LenFn))),
        "sum" => Some(Value::Callable(Arc::new(SumFn))),
        _ => None,
    }
}

/// `range(stop)`, `range(start, stop)`, or `range(start, stop, step)`.
struct RangeFn;

impl Callable for RangeFn {
    fn token(&self) -> String {
        "builtin:range".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, String> {
        let ints: Vec<i64> = args
            .iter()
            .map(|a| a.as_int().ok_or_else(|| format!("range expects integer arguments, got {}", a.type_name())))
            .collect::<Result<_, _>>()?;

        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => return Err(format!("range expects 1 to 3 arguments, got {}", ints.len())),
        };
        if step == 0 {
            return Err("range step must not be zero".to_string());
        }

        let mut items = Vec::new();
        let mut current = start;
        while (step > 0 && current < stop) || (step < 0 && current > stop) {
            items.push(Value::Int(current));
            current += step;
        }
        Ok(Value::list(items))
    }

    fn yields_sequence(&self) -> bool {
        true
    }
}

/// `len(list | str | map)`.
struct LenFn;

impl Callable for LenFn {
    fn token(&self) -> String {
        "builtin:len".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, String> {
        let [arg] = args else {
            return Err(format!("len expects 1 argument, got {}", args.len()));
        };
        let len = match arg {
            Value::List(items) => items.len(),
            Value::Str(s) => s.chars().count(),
            Value::Map(entries) => entries.len(),
            other => return Err(format!("len is undefined for {}", other.type_name())),
        };
        Ok(Value::Int(len as i64))
    }
}

/// `sum(list)` over integers and floats.
struct SumFn;

impl Callable for SumFn {
    fn token(&self) -> String {
        "builtin:sum".to_string()
    }

    fn call(&self, args: &[Value]) -> Result<Value, String> {
        let [arg] = args else {
            return Err(format!("sum expects 1 argument, got {}", args.len()));
        };
        let items = arg
            .as_list()
            .ok_or_else(|| format!("sum is undefined for {}", arg.type_name()))?;

        let mut int_total: i64 = 0;
        let mut float_total: f64 = 0.0;
        let mut saw_float = false;
        for item in items {
            match item {
                Value::Int(n) => int_total += n,
                Value::Float(x) => {
                    saw_float = true;
                    float_total += x;
                }
                other => return Err(format!("sum is undefined over {}", other.type_name())),
            }
        }
        if saw_float {
            Ok(Value::Float(float_total + int_total as f64))
        } else {
            Ok(Value::Int(int_total))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, String> {
        match lookup(name) {
            Some(Value::Callable(c)) => c.call(args),
            _ => panic!("unknown builtin {}", name),
        }
    }

    #[test]
    fn test_lookup_known_and_unknown() {
        assert!(lookup("range").is_some());
        assert!(lookup("len").is_some());
        assert!(lookup("sum").is_some());
        assert!(lookup("print").is_none());
    }

    #[test]
    fn test_range_forms() {
        let ints = |v: Value| -> Vec<i64> {
            v.as_list().unwrap().iter().map(|x| x.as_int().unwrap()).collect()
        };
        assert_eq!(ints(call("range", &[Value::Int(4)]).unwrap()), vec![0, 1, 2, 3]);
        assert_eq!(
            ints(call("range", &[Value::Int(2), Value::Int(5)]).unwrap()),
            vec![2, 3, 4]
        );
        assert_eq!(
            ints(call("range", &[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap()),
            vec![5, 3, 1]
        );
        assert!(ints(call("range", &[Value::Int(0)]).unwrap()).is_empty());
    }

    #[test]
    fn test_range_rejects_bad_args() {
        assert!(call("range", &[Value::from("x")]).is_err());
        assert!(call("range", &[Value::Int(0), Value::Int(5), Value::Int(0)]).is_err());
        assert!(call("range", &[]).is_err());
    }

    #[test]
    fn test_range_yields_sequence() {
        let Some(Value::Callable(range)) = lookup("range") else {
            panic!("range missing");
        };
        assert!(range.yields_sequence());
        let Some(Value::Callable(len)) = lookup("len") else {
            panic!("len missing");
        };
        assert!(!len.yields_sequence());
    }

    #[test]
    fn test_len() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(call("len", &[list]).unwrap().as_int(), Some(2));
        assert_eq!(call("len", &[Value::from("héllo")]).unwrap().as_int(), Some(5));
        assert!(call("len", &[Value::Int(3)]).is_err());
    }

    #[test]
    fn test_sum() {
        let ints = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(call("sum", &[ints]).unwrap().as_int(), Some(6));

        let mixed = Value::list(vec![Value::Int(1), Value::Float(0.5)]);
        assert_eq!(call("sum", &[mixed]).unwrap().as_float(), Some(1.5));

        let bad = Value::list(vec![Value::from("x")]);
        assert!(call("sum", &[bad]).is_err());
    }
}
