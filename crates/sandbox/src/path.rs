//! Dotted-path addressing into the global table.
//!
//! A path is an ordered list of identifier segments. The string form
//! (`"a.b.c"`) and the segment form (`["a", "b", "c"]`) normalize to the
//! same sequence and behave identically everywhere.

use std::fmt;

use tarn_lang::{Budget, Key, Table, Value};

use crate::error::SandboxError;
use crate::state::State;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn new<I, S>(segments: I) -> Path
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Path {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Dot-joined form, used for synthesized source and error messages.
    pub fn join(&self) -> String {
        self.segments.join(".")
    }

    /// A usable path has at least one segment and no empty segments
    /// (`"a..b"` is not an address).
    pub(crate) fn check(&self) -> Result<(), SandboxError> {
        if self.segments.is_empty() || self.segments.iter().any(|s| s.is_empty()) {
            return Err(SandboxError::RuntimeFailure(format!(
                "invalid path '{}'",
                self.join()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.join())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Path {
        Path::new(s.split('.'))
    }
}

impl From<String> for Path {
    fn from(s: String) -> Path {
        Path::from(s.as_str())
    }
}

impl From<&[&str]> for Path {
    fn from(segments: &[&str]) -> Path {
        Path::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(segments: [&str; N]) -> Path {
        Path::new(segments)
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Path {
        Path { segments }
    }
}

impl State {
    /// Read the value at `path`. Implemented by evaluating
    /// `return <joined path>`, so an undefined segment anywhere along the
    /// way resolves to `Nil` (the evaluator's absent sentinel), not an
    /// error. Reading through a non-table value is a `RuntimeFailure`.
    pub fn get(&self, path: impl Into<Path>) -> Result<Value, SandboxError> {
        let path = path.into();
        path.check()?;
        let source = format!("return {}", path.join());
        self.evaluate(source.as_str(), Budget::Unlimited)
    }

    /// Write `value` at `path`, returning the new state.
    ///
    /// With `create` false, a missing or non-table intermediate fails with
    /// `PathMissingTable`. With `create` true, missing intermediates are
    /// materialized as empty tables — but an existing non-table value at
    /// an intermediate segment still fails hard rather than being
    /// silently overwritten.
    pub fn set(
        &self,
        path: impl Into<Path>,
        value: impl Into<Value>,
        create: bool,
    ) -> Result<State, SandboxError> {
        let path = path.into();
        path.check()?;
        let globals = set_in(&self.globals, path.segments(), value.into(), create, &path)?;
        Ok(self.with_globals(globals))
    }
}

fn set_in(
    table: &Table,
    segments: &[String],
    value: Value,
    create: bool,
    full: &Path,
) -> Result<Table, SandboxError> {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Ok(table.clone()),
    };
    if rest.is_empty() {
        return Ok(table.set(Key::str(head), value));
    }
    match table.get_str(head) {
        Value::Table(inner) => {
            let inner = set_in(&inner, rest, value, create, full)?;
            Ok(table.set_str(head, Value::Table(inner)))
        }
        Value::Nil if create => {
            let inner = set_in(&Table::new(), rest, value, create, full)?;
            Ok(table.set_str(head, Value::Table(inner)))
        }
        // Missing without permission to create, or an existing non-table
        // value in the way: hard failure either way.
        _ => Err(SandboxError::PathMissingTable {
            path: full.join(),
            segment: head.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_and_list_forms_normalize_identically() {
        assert_eq!(Path::from("a.b.c"), Path::from(["a", "b", "c"]));
        assert_eq!(Path::from("x"), Path::from(["x"]));
    }

    #[test]
    fn join_round_trips() {
        assert_eq!(Path::from("a.b.c").join(), "a.b.c");
    }

    #[test]
    fn empty_segments_are_invalid() {
        assert!(Path::from("a..b").check().is_err());
        assert!(Path::new(Vec::<String>::new()).check().is_err());
    }

    #[test]
    fn single_segment_set_and_get() {
        let state = State::sandboxed();
        let state = state.set("answer", 42, false).unwrap();
        assert_eq!(state.get("answer").unwrap(), Value::from(42));
    }

    #[test]
    fn missing_parent_without_create_fails() {
        let state = State::sandboxed();
        let err = state.set("a.b.c", 1, false).unwrap_err();
        match err {
            SandboxError::PathMissingTable { path, segment } => {
                assert_eq!(path, "a.b.c");
                assert_eq!(segment, "a");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn create_materializes_each_prefix_as_a_table() {
        let state = State::sandboxed().set("a.b.c", 7, true).unwrap();
        assert_eq!(state.get("a.b.c").unwrap(), Value::from(7));
        assert!(matches!(state.get("a").unwrap(), Value::Table(_)));
        assert!(matches!(state.get("a.b").unwrap(), Value::Table(_)));
    }

    #[test]
    fn create_refuses_to_overwrite_a_scalar_prefix() {
        let state = State::sandboxed().set("a", 5, false).unwrap();
        let err = state.set("a.b", 1, true).unwrap_err();
        assert!(matches!(err, SandboxError::PathMissingTable { .. }));
        // The scalar is untouched.
        assert_eq!(state.get("a").unwrap(), Value::from(5));
    }

    #[test]
    fn get_of_undefined_path_is_nil() {
        let state = State::sandboxed();
        assert_eq!(state.get("no.such.slot").unwrap(), Value::Nil);
    }

    #[test]
    fn get_through_scalar_is_a_runtime_failure() {
        let state = State::sandboxed().set("x", 5, false).unwrap();
        assert!(matches!(
            state.get("x.y"),
            Err(SandboxError::RuntimeFailure(_))
        ));
    }

    #[test]
    fn failed_write_leaves_state_readable_and_unchanged() {
        let state = State::sandboxed().set("keep", "me", false).unwrap();
        let before = state.get("a.b").unwrap();
        assert!(state.set("a.b", 1, false).is_err());
        assert_eq!(state.get("a.b").unwrap(), before);
        assert_eq!(state.get("keep").unwrap(), Value::str("me"));
    }
}
