//! Host data exchange: JSON values in and out of script values.
//!
//! JSON objects become string-keyed tables, arrays become sequences keyed
//! 1..=n, and `null` becomes `nil`. Going the other way, a table that is
//! exactly a sequence becomes an array and anything else becomes an
//! object; functions (script or native) have no JSON form and refuse to
//! convert.

use serde_json::{json, Map, Number};

use tarn_lang::{Key, Table, Value};

use crate::error::SandboxError;

/// Convert a JSON value into a script value. Total: every JSON value has
/// a script representation.
pub fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => {
            Value::Table(Table::from_values(items.iter().map(value_from_json)))
        }
        serde_json::Value::Object(entries) => {
            let mut table = Table::new();
            for (key, value) in entries {
                table.insert(Key::str(key), value_from_json(value));
            }
            Value::Table(table)
        }
    }
}

/// Convert a script value into JSON. Fails on functions and non-finite
/// numbers, which have no JSON form.
pub fn value_to_json(value: &Value) -> Result<serde_json::Value, SandboxError> {
    match value {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(json!(b)),
        Value::Number(n) => Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| {
                SandboxError::RuntimeFailure(format!("cannot convert non-finite number {n} to JSON"))
            }),
        Value::Str(s) => Ok(json!(s.as_ref())),
        Value::Table(table) => table_to_json(table),
        Value::Func(_) | Value::Native(_) => Err(SandboxError::RuntimeFailure(
            "cannot convert a function value to JSON".to_string(),
        )),
    }
}

fn table_to_json(table: &Table) -> Result<serde_json::Value, SandboxError> {
    let seq_len = table.seq_len();
    if seq_len == table.len() && seq_len > 0 {
        // Pure sequence: render as an array.
        let mut items = Vec::with_capacity(seq_len);
        for i in 1..=seq_len {
            items.push(value_to_json(&table.get_int(i as i64))?);
        }
        return Ok(serde_json::Value::Array(items));
    }
    let mut object = Map::new();
    let mut keys: Vec<&Key> = table.iter().map(|(k, _)| k).collect();
    keys.sort();
    for key in keys {
        object.insert(key.to_string(), value_to_json(&table.get(key))?);
    }
    Ok(serde_json::Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_object_becomes_string_keyed_table() {
        let v = value_from_json(&json!({"name": "ada", "age": 36}));
        match v {
            Value::Table(t) => {
                assert_eq!(t.get_str("name"), Value::str("ada"));
                assert_eq!(t.get_str("age"), Value::from(36));
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn json_array_becomes_sequence() {
        let v = value_from_json(&json!([10, 20, 30]));
        match v {
            Value::Table(t) => {
                assert_eq!(t.seq_len(), 3);
                assert_eq!(t.get_int(2), Value::from(20));
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn null_is_nil_both_ways() {
        assert_eq!(value_from_json(&serde_json::Value::Null), Value::Nil);
        assert_eq!(value_to_json(&Value::Nil).unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn sequences_round_trip_as_arrays() {
        let table = Table::from_values([Value::from(1), Value::from(2)]);
        let json = value_to_json(&Value::Table(table)).unwrap();
        assert_eq!(json, json!([1.0, 2.0]));
    }

    #[test]
    fn mixed_tables_become_objects() {
        let table = Table::new()
            .set_str("a", Value::from(1))
            .set(Key::Int(1), Value::from(2));
        let json = value_to_json(&Value::Table(table)).unwrap();
        assert_eq!(json, json!({"1": 2.0, "a": 1.0}));
    }

    #[test]
    fn functions_refuse_to_convert() {
        let state = crate::state::State::sandboxed();
        let tostring = state.globals().get_str("tostring");
        assert!(value_to_json(&tostring).is_err());
    }

    #[test]
    fn non_finite_numbers_refuse_to_convert() {
        assert!(value_to_json(&Value::Number(f64::INFINITY)).is_err());
        assert!(value_to_json(&Value::Number(f64::NAN)).is_err());
    }
}
