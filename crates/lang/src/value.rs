//! Runtime values and persistent tables.
//!
//! # Design Invariants
//!
//! 1. **Values are snapshots.** `Table` wraps its map in an `Arc`; cloning a
//!    value never copies table contents, and mutation goes through
//!    copy-on-write (`Arc::make_mut`). Two forks of one table share every
//!    entry neither of them has touched.
//! 2. **Setting a key to `Nil` removes it.** Absent and nil are the same
//!    observable thing, so the map never stores explicit nils.
//! 3. **Keys are integers or strings.** A float with no fraction is an
//!    integer key; any other float is rejected at the table boundary.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ast::Block;
use crate::budget::Meter;
use crate::eval::EvalError;

/// A table key: integer or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Str(Arc<str>),
}

impl Key {
    pub fn str(name: &str) -> Key {
        Key::Str(Arc::from(name))
    }

    /// Convert a value to a key. Integral numbers become `Int`, strings
    /// become `Str`; everything else is not a valid key.
    pub fn from_value(value: &Value) -> Result<Key, String> {
        match value {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Ok(Key::Int(*n as i64)),
            Value::Number(n) => Err(format!("table index must be integral, got {n}")),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            other => Err(format!("table index must be a number or string, got {}", other.type_name())),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A persistent table. Cloning is O(1); writes copy the spine only when
/// the map is shared.
#[derive(Clone, Default)]
pub struct Table {
    map: Arc<FxHashMap<Key, Value>>,
}

impl Table {
    pub fn new() -> Table {
        Table::default()
    }

    pub fn get(&self, key: &Key) -> Value {
        self.map.get(key).cloned().unwrap_or(Value::Nil)
    }

    pub fn get_str(&self, name: &str) -> Value {
        self.get(&Key::str(name))
    }

    pub fn get_int(&self, index: i64) -> Value {
        self.get(&Key::Int(index))
    }

    /// Persistent write: returns a new table, leaving `self` untouched.
    /// Writing `Nil` removes the key.
    pub fn set(&self, key: Key, value: Value) -> Table {
        let mut map = self.map.clone();
        let entries = Arc::make_mut(&mut map);
        if matches!(value, Value::Nil) {
            entries.remove(&key);
        } else {
            entries.insert(key, value);
        }
        Table { map }
    }

    pub fn set_str(&self, name: &str, value: Value) -> Table {
        self.set(Key::str(name), value)
    }

    /// In-place write for tables under construction. Copies only if the
    /// map is currently shared.
    pub fn insert(&mut self, key: Key, value: Value) {
        let entries = Arc::make_mut(&mut self.map);
        if matches!(value, Value::Nil) {
            entries.remove(&key);
        } else {
            entries.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sequence length: the number of consecutive integer keys from 1.
    pub fn seq_len(&self) -> usize {
        let mut n = 0i64;
        while self.map.contains_key(&Key::Int(n + 1)) {
            n += 1;
        }
        n as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.map.iter()
    }

    /// Build a sequence table from values, keyed 1..=len.
    pub fn from_values<I: IntoIterator<Item = Value>>(values: I) -> Table {
        let mut table = Table::new();
        for (i, v) in values.into_iter().enumerate() {
            table.insert(Key::Int(i as i64 + 1), v);
        }
        table
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.map, &other.map) || self.map == other.map
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&Key> = self.map.keys().collect();
        keys.sort();
        let mut map = f.debug_map();
        for key in keys {
            map.entry(&format_args!("{key}"), &self.map[key]);
        }
        map.finish()
    }
}

/// A script-defined function: parameter names plus a shared body block.
/// No upvalue capture; names resolve locals-then-globals at call time.
#[derive(Clone)]
pub struct ScriptFn {
    pub params: Vec<String>,
    pub body: Arc<Block>,
}

impl PartialEq for ScriptFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body) && self.params == other.params
    }
}

impl fmt::Debug for ScriptFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function({})", self.params.join(", "))
    }
}

/// Calling convention for host-implemented functions: current globals,
/// ordered arguments, and the run's meter; returns the result list and
/// the globals to continue with.
pub type NativeFn =
    dyn Fn(&Table, &[Value], &mut Meter) -> Result<(Vec<Value>, Table), EvalError> + Send + Sync;

/// A named host function embedded as a value. Compares by identity.
#[derive(Clone)]
pub struct Native {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl Native {
    pub fn new<F>(name: &str, func: F) -> Native
    where
        F: Fn(&Table, &[Value], &mut Meter) -> Result<(Vec<Value>, Table), EvalError>
            + Send
            + Sync
            + 'static,
    {
        Native {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(
        &self,
        globals: &Table,
        args: &[Value],
        meter: &mut Meter,
    ) -> Result<(Vec<Value>, Table), EvalError> {
        (self.func)(globals, args, meter)
    }
}

impl PartialEq for Native {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native:{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    Table(Table),
    Func(ScriptFn),
    Native(Native),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Func(_) | Value::Native(_) => "function",
        }
    }

    /// Only `nil` and `false` are falsy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Value {
        Value::Table(t)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                // No trailing ".0" for integral values
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{n:.0}")
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Table(_) => write!(f, "table"),
            Value::Func(_) => write!(f, "function"),
            Value::Native(n) => write!(f, "function:{}", n.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_new_table_and_leaves_original() {
        let base = Table::new().set_str("x", Value::from(1));
        let forked = base.set_str("x", Value::from(2));
        assert_eq!(base.get_str("x"), Value::from(1));
        assert_eq!(forked.get_str("x"), Value::from(2));
    }

    #[test]
    fn setting_nil_removes_the_key() {
        let t = Table::new().set_str("x", Value::from(1));
        let t = t.set_str("x", Value::Nil);
        assert!(t.is_empty());
        assert_eq!(t.get_str("x"), Value::Nil);
    }

    #[test]
    fn untouched_nested_tables_stay_shared() {
        let inner = Table::new().set_str("deep", Value::from(9));
        let base = Table::new().set_str("inner", Value::Table(inner));
        let forked = base.set_str("other", Value::from(1));
        // Both outer tables point at the same inner map.
        match (base.get_str("inner"), forked.get_str("inner")) {
            (Value::Table(a), Value::Table(b)) => assert!(Arc::ptr_eq(&a.map, &b.map)),
            _ => panic!("expected tables"),
        }
    }

    #[test]
    fn integral_float_keys_normalize_to_int() {
        let key = Key::from_value(&Value::from(3.0)).unwrap();
        assert_eq!(key, Key::Int(3));
        assert!(Key::from_value(&Value::from(3.5)).is_err());
        assert!(Key::from_value(&Value::Bool(true)).is_err());
    }

    #[test]
    fn seq_len_counts_consecutive_from_one() {
        let t = Table::from_values([Value::from(10), Value::from(20), Value::from(30)]);
        assert_eq!(t.seq_len(), 3);
        let gappy = t.set(Key::Int(5), Value::from(50));
        assert_eq!(gappy.seq_len(), 3);
    }

    #[test]
    fn number_display_drops_integral_fraction() {
        assert_eq!(Value::from(7.0).to_string(), "7");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(-3).to_string(), "-3");
    }

    #[test]
    fn truthiness_is_lua_like() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::from(0).truthy());
        assert!(Value::str("").truthy());
    }
}
