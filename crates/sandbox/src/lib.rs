//! Embeddable Tarn sandbox.
//!
//! Host code runs untrusted script snippets under a step budget, exchanges
//! values through a table-structured global namespace, and exposes its own
//! functions back into scripts as callable values.
//!
//! # Architecture Notes
//!
//! The language itself lives in `tarn-lang`, which knows nothing about
//! sandboxing policy. This crate owns the embedding contract:
//!
//! - [`State`] — an immutable heap snapshot; every operation takes a state
//!   and returns a new one, so forking sessions is `clone()`.
//! - The engine ([`State::evaluate`], [`State::apply`], [`State::exec`])
//!   runs code under a [`Budget`] and classifies failures into
//!   [`SandboxError::ResourceExhausted`] vs
//!   [`SandboxError::RuntimeFailure`].
//! - [`Path`] addresses nested slots in the global table, as a dotted
//!   string or a segment list.
//! - The bridge ([`State::install_pure`], [`State::install_mutating`],
//!   [`State::install_replacing`]) wraps host closures in one of three
//!   fixed capability shapes.
//!
//! Names starting with [`engine::RESERVED_PREFIX`] (`__tarn`) are reserved
//! for the bridge's own slots.
//!
//! ```
//! use tarn_sandbox::{Budget, State, Value};
//!
//! let state = State::sandboxed().set("greeting", "hi", false).unwrap();
//! let value = state.evaluate("return greeting .. '!'", Budget::Bounded(1_000)).unwrap();
//! assert_eq!(value, Value::str("hi!"));
//! ```

pub mod bridge;
pub mod convert;
pub mod engine;
pub mod error;
pub mod load;
pub mod path;
pub mod state;
mod stdlib;

pub use bridge::{Args, HostError, HostResult};
pub use convert::{value_from_json, value_to_json};
pub use engine::{Code, RESERVED_PREFIX};
pub use error::SandboxError;
pub use load::read_source;
pub use path::Path;
pub use state::{Mode, State};

// Re-exported language types that cross the embedding boundary.
pub use tarn_lang::{Budget, Chunk, Exhausted, Key, Meter, Table, Value};
