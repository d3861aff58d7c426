//! Error taxonomy for the binding generator.
//!
//! Every variant aborts the current run; there is no partial output because
//! all writes land in the staging directory first (see `assemble`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    /// Malformed specification: unknown metadata key, bad base reference,
    /// unlinearizable hierarchy, inconsistent flag combination.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A positional or scalar template binding disagrees in count with the
    /// declared parameter list.
    #[error("template arity mismatch for `{decl}`: expected {expected} parameter(s), got {got}")]
    Arity {
        decl: String,
        expected: usize,
        got: usize,
    },

    /// A named template binding omits a declared parameter.
    #[error("template binding for `{decl}` is missing parameter `{parameter}`")]
    MissingParameter { decl: String, parameter: String },

    /// Fixed-point substitution failed to terminate, or a placeholder
    /// survived into emitted text.
    #[error("unresolved template parameter `{placeholder}` in `{decl}`")]
    UnresolvedTemplate { decl: String, placeholder: String },

    /// Two concrete declarations resolve to the same export name.
    #[error("duplicate export name `{0}`")]
    DuplicateExportName(String),

    /// A non-pure virtual method has no compiled default the trampoline can
    /// forward to (it carries a custom `implementation`).
    #[error("virtual method `{class}::{method}` has no forwardable default implementation")]
    MissingDefault { class: String, method: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse specification: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GenError>;

impl GenError {
    pub fn config(msg: impl Into<String>) -> Self {
        GenError::Configuration(msg.into())
    }
}
