//! Host functions as script-callable values.
//!
//! A host closure is wrapped into the evaluator's native calling
//! convention (globals + ordered args + meter in, result list + globals
//! out) in exactly one of three capability shapes:
//!
//! - **Pure** observes the state and computes a value.
//! - **Mutating-Return** computes a value and replaces the state.
//! - **Mutating-Replace** replaces the state; no value reaches the script.
//!
//! The shape is fixed at install time by the entrypoint used, never
//! inferred from what the closure happens to return.

use std::fmt;

use tarn_lang::{Exhausted, EvalError, Meter, Native, Value};

use crate::error::SandboxError;
use crate::path::Path;
use crate::state::{Mode, State};

/// Why a host binding failed.
///
/// `Exhausted` exists so `meter.charge(...)?` inside a binding keeps the
/// budget kind intact all the way back out; a plain message would collapse
/// it into a generic runtime failure.
#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    Failed(String),
    Exhausted(Exhausted),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Failed(message) => write!(f, "{message}"),
            HostError::Exhausted(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HostError {}

impl From<Exhausted> for HostError {
    fn from(e: Exhausted) -> HostError {
        HostError::Exhausted(e)
    }
}

impl From<String> for HostError {
    fn from(message: String) -> HostError {
        HostError::Failed(message)
    }
}

impl From<&str> for HostError {
    fn from(message: &str) -> HostError {
        HostError::Failed(message.to_string())
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// An ordered argument list for path-based calls. A single scalar
/// converts into a one-element list; a `Vec<Value>` passes through
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn none() -> Args {
        Args(Vec::new())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Args {
        Args(values)
    }
}

impl From<Value> for Args {
    fn from(value: Value) -> Args {
        Args(vec![value])
    }
}

impl From<f64> for Args {
    fn from(n: f64) -> Args {
        Args(vec![Value::from(n)])
    }
}

impl From<i64> for Args {
    fn from(n: i64) -> Args {
        Args(vec![Value::from(n)])
    }
}

impl From<i32> for Args {
    fn from(n: i32) -> Args {
        Args(vec![Value::from(n)])
    }
}

impl From<bool> for Args {
    fn from(b: bool) -> Args {
        Args(vec![Value::from(b)])
    }
}

impl From<&str> for Args {
    fn from(s: &str) -> Args {
        Args(vec![Value::from(s)])
    }
}

impl State {
    /// Install a pure binding at `path`: it may read the state and charge
    /// the meter, but the state it returns to the script is unchanged.
    pub fn install_pure<F>(&self, path: impl Into<Path>, f: F) -> Result<State, SandboxError>
    where
        F: Fn(&State, &[Value], &mut Meter) -> HostResult<Value> + Send + Sync + 'static,
    {
        let path = path.into();
        let native = wrap_pure(&path.join(), self.mode, f);
        self.set(path, Value::Native(native), true)
    }

    /// Install a mutating binding: the value and the new state it returns
    /// are both adopted.
    pub fn install_mutating<F>(&self, path: impl Into<Path>, f: F) -> Result<State, SandboxError>
    where
        F: Fn(&State, &[Value], &mut Meter) -> HostResult<(Value, State)> + Send + Sync + 'static,
    {
        let path = path.into();
        let native = wrap_mutating(&path.join(), self.mode, f);
        self.set(path, Value::Native(native), true)
    }

    /// Install a replacing binding: only the new state is adopted; the
    /// script caller sees no result value.
    pub fn install_replacing<F>(&self, path: impl Into<Path>, f: F) -> Result<State, SandboxError>
    where
        F: Fn(&State, &[Value], &mut Meter) -> HostResult<State> + Send + Sync + 'static,
    {
        let path = path.into();
        let native = wrap_replacing(&path.join(), self.mode, f);
        self.set(path, Value::Native(native), true)
    }
}

fn host_error_to_eval(err: HostError) -> EvalError {
    match err {
        HostError::Failed(message) => EvalError::runtime(message),
        HostError::Exhausted(e) => e.into(),
    }
}

pub(crate) fn wrap_pure<F>(name: &str, mode: Mode, f: F) -> Native
where
    F: Fn(&State, &[Value], &mut Meter) -> HostResult<Value> + Send + Sync + 'static,
{
    Native::new(name, move |globals, args, meter| {
        let state = State::from_parts(globals.clone(), mode);
        match f(&state, args, meter) {
            Ok(value) => Ok((vec![value], globals.clone())),
            Err(err) => Err(host_error_to_eval(err)),
        }
    })
}

pub(crate) fn wrap_mutating<F>(name: &str, mode: Mode, f: F) -> Native
where
    F: Fn(&State, &[Value], &mut Meter) -> HostResult<(Value, State)> + Send + Sync + 'static,
{
    Native::new(name, move |globals, args, meter| {
        let state = State::from_parts(globals.clone(), mode);
        match f(&state, args, meter) {
            Ok((value, next)) => Ok((vec![value], next.globals)),
            Err(err) => Err(host_error_to_eval(err)),
        }
    })
}

pub(crate) fn wrap_replacing<F>(name: &str, mode: Mode, f: F) -> Native
where
    F: Fn(&State, &[Value], &mut Meter) -> HostResult<State> + Send + Sync + 'static,
{
    Native::new(name, move |globals, args, meter| {
        let state = State::from_parts(globals.clone(), mode);
        match f(&state, args, meter) {
            Ok(next) => Ok((Vec::new(), next.globals)),
            Err(err) => Err(host_error_to_eval(err)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_lang::Budget;

    #[test]
    fn scalar_args_become_one_element_lists() {
        assert_eq!(Args::from(4).into_values(), vec![Value::from(4)]);
        assert_eq!(Args::from("hi").into_values(), vec![Value::str("hi")]);
        let list = Args::from(vec![Value::from(1), Value::from(2)]);
        assert_eq!(list.into_values().len(), 2);
    }

    #[test]
    fn pure_binding_leaves_state_alone() {
        let state = State::sandboxed()
            .install_pure("double", |_state, args, _meter| {
                match args.first() {
                    Some(Value::Number(n)) => Ok(Value::Number(n * 2.0)),
                    _ => Err(HostError::from("double: expected a number")),
                }
            })
            .unwrap();
        let (value, next) = state.apply("return double(21)", Budget::Unlimited).unwrap();
        assert_eq!(value, Value::from(42));
        // Nothing new in the globals besides the binding itself.
        assert_eq!(next.get("x").unwrap(), Value::Nil);
    }

    #[test]
    fn pure_binding_can_read_the_current_state() {
        let state = State::sandboxed()
            .set("greeting", "hello", false)
            .unwrap()
            .install_pure("greet", |state, args, _meter| {
                let greeting = state.get("greeting").map_err(|e| e.to_string())?;
                let who = args.first().cloned().unwrap_or(Value::Nil);
                Ok(Value::from(format!("{greeting}, {who}")))
            })
            .unwrap();
        let value = state.evaluate("return greet('world')", Budget::Unlimited).unwrap();
        assert_eq!(value, Value::str("hello, world"));
    }

    #[test]
    fn mutating_binding_adopts_value_and_state() {
        let state = State::sandboxed()
            .set("x", 3, false)
            .unwrap()
            .install_mutating("move", |state, args, _meter| {
                let d = match args.first() {
                    Some(Value::Number(n)) => *n,
                    _ => return Err(HostError::from("move: expected a number")),
                };
                let x = match state.get("x").map_err(|e| e.to_string())? {
                    Value::Number(n) => n,
                    _ => 0.0,
                };
                let next = state.set("x", x + d, false).map_err(|e| e.to_string())?;
                Ok((Value::Number(x + d), next))
            })
            .unwrap();
        let (value, next) = state.apply("return move(4)", Budget::Unlimited).unwrap();
        assert_eq!(value, Value::from(7));
        assert_eq!(next.get("x").unwrap(), Value::from(7));
        // Input state untouched.
        assert_eq!(state.get("x").unwrap(), Value::from(3));
    }

    #[test]
    fn replacing_binding_surfaces_no_value() {
        let state = State::sandboxed()
            .install_replacing("reset", |state, _args, _meter| {
                state.set("x", 0, false).map_err(|e| HostError::from(e.to_string()))
            })
            .unwrap()
            .set("x", 99, false)
            .unwrap();
        let (value, next) = state.apply("return reset()", Budget::Unlimited).unwrap();
        assert_eq!(value, Value::Nil);
        assert_eq!(next.get("x").unwrap(), Value::from(0));
    }

    #[test]
    fn binding_failure_is_a_runtime_failure() {
        let state = State::sandboxed()
            .install_pure("boom", |_state, _args, _meter| {
                Err::<Value, _>(HostError::from("boom: no"))
            })
            .unwrap();
        match state.evaluate("return boom()", Budget::Unlimited) {
            Err(SandboxError::RuntimeFailure(message)) => assert!(message.contains("boom: no")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn binding_installed_at_nested_path_creates_tables() {
        let state = State::sandboxed()
            .install_pure("host.util.id", |_state, args, _meter| {
                Ok(args.first().cloned().unwrap_or(Value::Nil))
            })
            .unwrap();
        let value = state
            .evaluate("return host.util.id('through')", Budget::Unlimited)
            .unwrap();
        assert_eq!(value, Value::str("through"));
    }

    #[test]
    fn meter_charges_in_bindings_exhaust_the_budget() {
        let state = State::sandboxed()
            .install_pure("work", |_state, _args, meter| {
                for _ in 0..10_000 {
                    meter.charge(1)?;
                }
                Ok(Value::Bool(true))
            })
            .unwrap();
        let err = state.apply("return work()", Budget::Bounded(2_000)).unwrap_err();
        assert!(err.is_resource_exhausted(), "got {err:?}");
        // Unlimited lets the same binding finish.
        let (value, _) = state.apply("return work()", Budget::Unlimited).unwrap();
        assert_eq!(value, Value::Bool(true));
    }
}
