use std::fmt;
use std::path::PathBuf;

use tarn_lang::ParseError;

/// Everything a sandbox operation can fail with.
///
/// `ResourceExhausted` is a stable, distinct kind: callers that want to
/// retry with a larger budget must never have to parse it out of a
/// generic runtime failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// The step budget was hit.
    ResourceExhausted { spent: u64 },
    /// Malformed source handed to `compile`.
    CompileFailure(ParseError),
    /// Any other evaluator-level failure: nil call target, type
    /// mismatch, arity problems, syntax in dynamically built source.
    RuntimeFailure(String),
    /// A write walked through a missing or non-table intermediate
    /// without permission to create it.
    PathMissingTable { path: String, segment: String },
    /// A source file could not be read.
    IOFailure { path: PathBuf, message: String },
}

impl SandboxError {
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, SandboxError::ResourceExhausted { .. })
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted { spent } => {
                write!(f, "step budget exhausted after {spent} steps")
            }
            Self::CompileFailure(err) => write!(f, "compile failed: {err}"),
            Self::RuntimeFailure(message) => write!(f, "runtime failure: {message}"),
            Self::PathMissingTable { path, segment } => {
                write!(f, "path '{path}': segment '{segment}' is not a table")
            }
            Self::IOFailure { path, message } => {
                write!(f, "cannot read '{}': {message}", path.display())
            }
        }
    }
}

impl std::error::Error for SandboxError {}
