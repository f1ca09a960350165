//! Script loading from disk: success paths and the IOFailure boundary.

use std::io::Write;

use tarn_sandbox::{read_source, Budget, SandboxError, State, Value};

fn script_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn exec_file_applies_the_script() {
    let file = script_file("answer = 6 * 7");
    let state = State::sandboxed()
        .exec_file(file.path(), Budget::Unlimited)
        .unwrap();
    assert_eq!(state.get("answer").unwrap(), Value::from(42));
}

#[test]
fn eval_file_returns_the_value() {
    let file = script_file("return 'from disk'");
    let state = State::sandboxed();
    let value = state.eval_file(file.path(), Budget::Unlimited).unwrap();
    assert_eq!(value, Value::str("from disk"));
    // Value-only: no state kept.
    let file = script_file("x = 1 return x");
    let _ = state.eval_file(file.path(), Budget::Unlimited).unwrap();
    assert_eq!(state.get("x").unwrap(), Value::Nil);
}

#[test]
fn missing_file_is_an_io_failure() {
    let err = read_source("/no/such/script.tarn").unwrap_err();
    match &err {
        SandboxError::IOFailure { path, .. } => {
            assert!(path.ends_with("script.tarn"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // And it never masquerades as an interpreter kind.
    assert!(!err.is_resource_exhausted());
}

#[test]
fn unreadable_file_via_state_helpers() {
    let state = State::sandboxed();
    assert!(matches!(
        state.eval_file("/no/such/script.tarn", Budget::Unlimited),
        Err(SandboxError::IOFailure { .. })
    ));
}

#[test]
fn broken_script_from_disk_is_not_an_io_failure() {
    let file = script_file("if then");
    let state = State::sandboxed();
    match state.eval_file(file.path(), Budget::Unlimited) {
        Err(SandboxError::RuntimeFailure(message)) => {
            assert!(message.contains("syntax error"), "{message}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn loaded_scripts_respect_budgets() {
    let file = script_file("while true do end");
    let state = State::sandboxed();
    let err = state.exec_file(file.path(), Budget::Bounded(1_000)).unwrap_err();
    assert!(err.is_resource_exhausted());
}
