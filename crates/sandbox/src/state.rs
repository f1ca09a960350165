//! The immutable interpreter state.
//!
//! # Design Invariants
//!
//! 1. **No in-place mutation.** Every state-changing operation returns a
//!    new `State`; the input stays valid and independently usable. Forking
//!    a session is `clone()` — O(1), no locking.
//! 2. **No bypass mode.** Sandboxed and unrestricted are distinct
//!    initialization paths with distinct library surfaces; there is no
//!    flag that turns enforcement off on a sandboxed state after the fact.

use tarn_lang::{Chunk, Table};

use crate::error::SandboxError;
use crate::stdlib;

/// How a state was initialized. Decides the library surface and whether
/// execution budgets are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Restricted library surface; budgets enforced.
    Sandboxed,
    /// Full library surface; budgets ignored.
    Unrestricted,
}

/// An immutable snapshot of the interpreter heap: the global table
/// (including installed native bindings) plus the initialization mode.
#[derive(Debug, Clone)]
pub struct State {
    pub(crate) globals: Table,
    pub(crate) mode: Mode,
}

impl State {
    /// Baseline state for untrusted scripts: pure-computation stdlib only,
    /// budget enforcement active.
    pub fn sandboxed() -> State {
        State {
            globals: stdlib::globals_for(Mode::Sandboxed),
            mode: Mode::Sandboxed,
        }
    }

    /// Baseline state for trusted scripts: full library surface including
    /// `print` and `os`, and no budget enforcement.
    pub fn unrestricted() -> State {
        State {
            globals: stdlib::globals_for(Mode::Unrestricted),
            mode: Mode::Unrestricted,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The underlying global table snapshot.
    pub fn globals(&self) -> &Table {
        &self.globals
    }

    /// Compile source against this state's structural conventions. The
    /// resulting chunk is not bound to this state's data and may run
    /// against any structurally compatible state.
    pub fn compile(&self, source: &str) -> Result<Chunk, SandboxError> {
        tarn_lang::compile(source).map_err(SandboxError::CompileFailure)
    }

    pub(crate) fn from_parts(globals: Table, mode: Mode) -> State {
        State { globals, mode }
    }

    pub(crate) fn with_globals(&self, globals: Table) -> State {
        State { globals, mode: self.mode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_lang::Value;

    #[test]
    fn sandboxed_state_has_math_but_no_os() {
        let state = State::sandboxed();
        assert!(matches!(state.globals().get_str("math"), Value::Table(_)));
        assert_eq!(state.globals().get_str("os"), Value::Nil);
        assert_eq!(state.globals().get_str("print"), Value::Nil);
    }

    #[test]
    fn unrestricted_state_has_the_full_surface() {
        let state = State::unrestricted();
        assert!(matches!(state.globals().get_str("os"), Value::Table(_)));
        assert!(matches!(state.globals().get_str("print"), Value::Native(_)));
    }

    #[test]
    fn forks_are_independent() {
        let base = State::sandboxed();
        let fork = base.clone();
        assert_eq!(base.mode(), fork.mode());
    }

    #[test]
    fn compile_failure_is_its_own_kind() {
        let state = State::sandboxed();
        match state.compile("if then") {
            Err(SandboxError::CompileFailure(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn chunks_cross_states() {
        let chunk = State::sandboxed().compile("return 7").unwrap();
        let other = State::sandboxed();
        assert_eq!(
            other.evaluate(&chunk, tarn_lang::Budget::Unlimited).unwrap(),
            Value::from(7)
        );
    }
}
