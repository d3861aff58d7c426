//! bindforge compiles declarative interface specifications — classes,
//! methods, attributes, enums and free functions annotated with binding
//! metadata — into pybind11 C++ source exposing a compiled library to
//! Python.
//!
//! Pipeline, in phase order:
//!
//! 1. [`model`] — the specification document, deserialized once per run and
//!    read-only afterwards.
//! 2. [`attrs`] — attribute resolution along the class hierarchy (C3 MRO,
//!    memoized per declaration).
//! 3. [`template`] — expansion of generic declarations into concrete
//!    instantiations via fixed-point parameter substitution.
//! 4. [`trampoline`] / [`publicist`] — virtual-dispatch and
//!    protected-access shims.
//! 5. [`emit`] — class, enum, container, function and attribute bindings.
//! 6. [`assemble`] — phase orchestration, staging, and the incremental
//!    reconcile-with-committed protocol.

pub mod assemble;
pub mod attrs;
pub mod emit;
pub mod error;
pub mod model;
pub mod publicist;
pub mod template;
pub mod trampoline;

#[cfg(test)]
mod attrs_tests;
#[cfg(test)]
mod emit_tests;

pub use assemble::{generate, OutputOptions, Reconciliation, SKIP_SENTINEL};
pub use emit::GenConfig;
pub use error::{GenError, Result};
pub use model::ModuleSpec;
