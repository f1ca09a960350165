//! Budgeted execution against a state snapshot.
//!
//! Every run consumes one `State` and produces a fresh one (or an error);
//! the input is never touched. The evaluator reports failures through one
//! generic channel, and classification into `ResourceExhausted` vs
//! `RuntimeFailure` happens here — once — so every higher-level operation
//! preserves the distinction.

use log::debug;

use tarn_lang::{eval_chunk, Budget, Chunk, EvalError, Outcome, Table, Value};

use crate::bridge::Args;
use crate::error::SandboxError;
use crate::path::Path;
use crate::state::{Mode, State};

/// Prefix reserved for the bridge's own global slots. Script code must
/// not use names starting with this.
pub const RESERVED_PREFIX: &str = "__tarn";

/// Where path-based calls stage their argument list. Overwritten on every
/// call, never appended to.
const ARGS_SLOT: &str = "__tarn_args";

/// A unit of code to run: raw source or a precompiled [`Chunk`].
#[derive(Debug, Clone, Copy)]
pub enum Code<'a> {
    Source(&'a str),
    Chunk(&'a Chunk),
}

impl<'a> From<&'a str> for Code<'a> {
    fn from(s: &'a str) -> Code<'a> {
        Code::Source(s)
    }
}

impl<'a> From<&'a String> for Code<'a> {
    fn from(s: &'a String) -> Code<'a> {
        Code::Source(s)
    }
}

impl<'a> From<&'a Chunk> for Code<'a> {
    fn from(c: &'a Chunk) -> Code<'a> {
        Code::Chunk(c)
    }
}

impl State {
    /// Run code for its value; any state mutation it performed is
    /// discarded. Returns the first produced value, `Nil` when the code
    /// returned nothing.
    pub fn evaluate<'a>(
        &self,
        code: impl Into<Code<'a>>,
        budget: Budget,
    ) -> Result<Value, SandboxError> {
        let outcome = self.run(code.into(), budget)?;
        Ok(outcome.values.into_iter().next().unwrap_or(Value::Nil))
    }

    /// Run code, keeping both the produced value and the resulting state.
    pub fn apply<'a>(
        &self,
        code: impl Into<Code<'a>>,
        budget: Budget,
    ) -> Result<(Value, State), SandboxError> {
        let outcome = self.run(code.into(), budget)?;
        let value = outcome.values.into_iter().next().unwrap_or(Value::Nil);
        Ok((value, self.with_globals(outcome.globals)))
    }

    /// Run code for its state effect only; produced values are discarded.
    pub fn exec<'a>(
        &self,
        code: impl Into<Code<'a>>,
        budget: Budget,
    ) -> Result<State, SandboxError> {
        let outcome = self.run(code.into(), budget)?;
        Ok(self.with_globals(outcome.globals))
    }

    /// Call the function bound at `path` for its value only.
    ///
    /// The arguments are staged in the reserved `__tarn_args` slot, source
    /// unpacking them into a call at the path is synthesized, and the run
    /// goes through [`State::evaluate`] — so state mutation is discarded.
    pub fn call(
        &self,
        path: impl Into<Path>,
        args: impl Into<Args>,
        budget: Budget,
    ) -> Result<Value, SandboxError> {
        let (staged, source) = self.stage_call(path.into(), args.into())?;
        staged.evaluate(source.as_str(), budget)
    }

    /// Call the function bound at `path`, keeping the resulting state.
    pub fn call_apply(
        &self,
        path: impl Into<Path>,
        args: impl Into<Args>,
        budget: Budget,
    ) -> Result<(Value, State), SandboxError> {
        let (staged, source) = self.stage_call(path.into(), args.into())?;
        staged.apply(source.as_str(), budget)
    }

    /// Evaluate, aborting the process on any failure. The panic message
    /// carries the specific error kind, so exhaustion is still
    /// distinguishable from a broken script in the abort output.
    pub fn must_evaluate<'a>(&self, code: impl Into<Code<'a>>, budget: Budget) -> Value {
        match self.evaluate(code, budget) {
            Ok(value) => value,
            Err(err) => panic!("tarn: evaluate failed: {err}"),
        }
    }

    /// Apply, aborting the process on any failure.
    pub fn must_apply<'a>(&self, code: impl Into<Code<'a>>, budget: Budget) -> (Value, State) {
        match self.apply(code, budget) {
            Ok(result) => result,
            Err(err) => panic!("tarn: apply failed: {err}"),
        }
    }

    /// Exec, aborting the process on any failure.
    pub fn must_exec<'a>(&self, code: impl Into<Code<'a>>, budget: Budget) -> State {
        match self.exec(code, budget) {
            Ok(state) => state,
            Err(err) => panic!("tarn: exec failed: {err}"),
        }
    }

    fn run(&self, code: Code<'_>, budget: Budget) -> Result<Outcome, SandboxError> {
        let compiled;
        let chunk = match code {
            Code::Chunk(chunk) => chunk,
            Code::Source(source) => {
                // Syntax errors on directly evaluated source are evaluator
                // failures, not compile failures; `CompileFailure` is the
                // explicit `compile` operation's kind.
                compiled = tarn_lang::compile(source)
                    .map_err(|e| SandboxError::RuntimeFailure(format!("syntax error: {e}")))?;
                &compiled
            }
        };
        // Unrestricted states do not enforce budgets at all.
        let effective = match self.mode {
            Mode::Sandboxed => budget,
            Mode::Unrestricted => Budget::Unlimited,
        };
        debug!("run: mode={:?} budget={effective}", self.mode);
        eval_chunk(&self.globals, chunk, effective).map_err(classify)
    }

    fn stage_call(&self, path: Path, args: Args) -> Result<(State, String), SandboxError> {
        let values = args.into_values();
        let source = call_source(&path, values.len());
        let staged = self.set(ARGS_SLOT, Value::Table(Table::from_values(values)), false)?;
        Ok((staged, source))
    }
}

/// Split the evaluator's single error channel into the two kinds callers
/// must be able to tell apart.
fn classify(err: EvalError) -> SandboxError {
    match err {
        EvalError::StepLimit { spent } => {
            debug!("classified as resource exhaustion ({spent} steps)");
            SandboxError::ResourceExhausted { spent }
        }
        EvalError::Runtime { message } => SandboxError::RuntimeFailure(message),
    }
}

/// `return a.b.f(__tarn_args[1], __tarn_args[2], ...)`
fn call_source(path: &Path, argc: usize) -> String {
    let mut source = format!("return {}(", path.join());
    for i in 1..=argc {
        if i > 1 {
            source.push_str(", ");
        }
        source.push_str(&format!("{ARGS_SLOT}[{i}]"));
    }
    source.push(')');
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_source_unpacks_positionally() {
        assert_eq!(call_source(&Path::from("f"), 0), "return f()");
        assert_eq!(
            call_source(&Path::from("a.b"), 2),
            "return a.b(__tarn_args[1], __tarn_args[2])"
        );
    }

    #[test]
    fn evaluate_discards_mutation() {
        let state = State::sandboxed();
        let value = state.evaluate("x = 1 return 7", Budget::Unlimited).unwrap();
        assert_eq!(value, Value::from(7));
        assert_eq!(state.get("x").unwrap(), Value::Nil);
    }

    #[test]
    fn apply_keeps_value_and_state() {
        let state = State::sandboxed();
        let (value, next) = state.apply("x = 1 return x + 1", Budget::Unlimited).unwrap();
        assert_eq!(value, Value::from(2));
        assert_eq!(next.get("x").unwrap(), Value::from(1));
        assert_eq!(state.get("x").unwrap(), Value::Nil);
    }

    #[test]
    fn exec_discards_values() {
        let state = State::sandboxed();
        let next = state.exec("x = 41 return 'ignored'", Budget::Unlimited).unwrap();
        assert_eq!(next.get("x").unwrap(), Value::from(41));
    }

    #[test]
    fn syntax_error_in_evaluated_source_is_a_runtime_failure() {
        let state = State::sandboxed();
        match state.evaluate("if then", Budget::Unlimited) {
            Err(SandboxError::RuntimeFailure(message)) => {
                assert!(message.contains("syntax error"), "{message}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn exhaustion_survives_every_entrypoint() {
        let state = State::sandboxed();
        let loops = "while true do end";
        assert!(state
            .evaluate(loops, Budget::Bounded(500))
            .unwrap_err()
            .is_resource_exhausted());
        assert!(state
            .apply(loops, Budget::Bounded(500))
            .unwrap_err()
            .is_resource_exhausted());
        assert!(state
            .exec(loops, Budget::Bounded(500))
            .unwrap_err()
            .is_resource_exhausted());
    }

    #[test]
    fn unrestricted_states_ignore_budgets() {
        let state = State::unrestricted();
        let value = state
            .evaluate("s = 0 for i = 1, 100000 do s = s + i end return s", Budget::Bounded(10))
            .unwrap();
        assert_eq!(value, Value::from(5_000_050_000i64));
    }

    #[test]
    #[should_panic(expected = "step budget exhausted")]
    fn must_evaluate_aborts_with_the_kind() {
        let state = State::sandboxed();
        state.must_evaluate("while true do end", Budget::Bounded(100));
    }
}
