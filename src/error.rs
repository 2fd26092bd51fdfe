//! Crate-wide error taxonomy (spec §7).
//!
//! Fatal errors abort the whole compilation (`MalformedXml`,
//! `InternalInvariantViolated`). Everything else attaches to a single chain or
//! record and is meant to be collected by [`crate::diag::Diagnostics`] rather
//! than propagated, so callers in `--allow-errors` mode can keep going.

use thiserror::Error;

/// Fatal or chain-local error produced anywhere in the compilation pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("malformed XML: {0}")]
    MalformedXml(String),

    #[error("malformed pragma on {path}: {reason}")]
    MalformedPragma { path: String, reason: String },

    #[error("unresolved type {type_name:?} referenced from {path}")]
    UnresolvedType { path: String, type_name: String },

    #[error("invalid chain {tcname}: {reason}")]
    InvalidChain { tcname: String, reason: String },

    #[error("unsupported type {type_name} at {tcname}")]
    UnsupportedType { tcname: String, type_name: String },

    #[error("lint error on record {pv}: {message}")]
    LintError { pv: String, message: String },

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolated(String),
}

impl CompileError {
    /// Whether this error is fatal to the whole compilation, as opposed to
    /// local to one chain or record (spec §7).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompileError::MalformedXml(_) | CompileError::InternalInvariantViolated(_)
        )
    }

    /// The chain `tcname` this error is attached to, if any, for traceability
    /// (spec §7: "attach the chain's tcname ... for traceability").
    pub fn tcname(&self) -> Option<&str> {
        match self {
            CompileError::InvalidChain { tcname, .. }
            | CompileError::UnsupportedType { tcname, .. } => Some(tcname),
            CompileError::MalformedPragma { path, .. }
            | CompileError::UnresolvedType { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
