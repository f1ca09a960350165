//! Script source loading.
//!
//! Read failures surface as `IOFailure`, a kind of their own — they are
//! never folded into the interpreter error kinds. On success the text is
//! handed to the engine as an ordinary code unit.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use tarn_lang::{Budget, Value};

use crate::error::SandboxError;
use crate::state::State;

/// Read a script file to a string.
pub fn read_source(path: impl AsRef<Path>) -> Result<String, SandboxError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|err| {
        warn!("failed to read script {}: {err}", path.display());
        SandboxError::IOFailure {
            path: PathBuf::from(path),
            message: err.to_string(),
        }
    })
}

impl State {
    /// Load a file and run it for its value; state mutation is discarded.
    pub fn eval_file(&self, path: impl AsRef<Path>, budget: Budget) -> Result<Value, SandboxError> {
        let source = read_source(path)?;
        self.evaluate(source.as_str(), budget)
    }

    /// Load a file and run it for its state effect.
    pub fn exec_file(&self, path: impl AsRef<Path>, budget: Budget) -> Result<State, SandboxError> {
        let source = read_source(path)?;
        self.exec(source.as_str(), budget)
    }
}
