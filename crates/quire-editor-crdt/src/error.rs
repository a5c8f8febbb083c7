//! Error types for CRDT operations.

use quire_editor_core::SchemaViolation;
use smol_str::SmolStr;
use thiserror::Error;

/// Errors that can occur during CRDT operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CrdtError {
    /// The edit was rejected before reaching the CRDT.
    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    /// Failed to import CRDT data.
    #[error("failed to import CRDT data: {0}")]
    Import(String),

    /// Failed to export CRDT data.
    #[error("failed to export CRDT data: {0}")]
    Export(String),

    /// The replicated tree does not have the expected shape.
    #[error("malformed replicated tree at {path:?}: {reason}")]
    Malformed { path: Vec<usize>, reason: &'static str },

    /// Version vector bytes could not be decoded.
    #[error("invalid version vector: {0}")]
    Version(String),

    /// No open document with this id.
    #[error("document {0} is not open")]
    UnknownDocument(SmolStr),

    /// Loro CRDT error.
    #[error("loro error: {0}")]
    Loro(String),
}

impl From<loro::LoroError> for CrdtError {
    fn from(e: loro::LoroError) -> Self {
        CrdtError::Loro(e.to_string())
    }
}
