//! Error types for unshroud
//!
//! Parse and pass failures are propagated to the caller unchanged. Formatting
//! failures have their own type but never leave the pipeline.

use thiserror::Error;

use crate::config::SourceType;

/// Strict parse failure (or a loose parse that could not produce any tree).
#[derive(Debug, Clone, Error)]
#[error("Syntax error at offset {position} ({source_type}): {message}")]
pub struct ParseError {
    /// Parser message
    pub message: String,
    /// Byte offset into the parsed text
    pub position: u32,
    /// Grammar the failing parse was attempted with
    pub source_type: SourceType,
}

/// Invalid configuration, detected while building a pipeline.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No built-in transformer has this name
    #[error("Unknown transformer: {0}")]
    UnknownTransformer(String),

    /// Options for a transformer could not be merged with its defaults
    #[error("Invalid options for transformer {transformer}: {message}")]
    InvalidOptions {
        /// Transformer name
        transformer: String,
        /// Deserializer message
        message: String,
    },

    /// Unrecognized `ecma_version` value
    #[error("Invalid ECMAScript version: {0}")]
    InvalidEcmaVersion(String),

    /// Unrecognized `source_type` value
    #[error("Invalid source type: {0} (expected module, script or both)")]
    InvalidSourceType(String),
}

/// A pass failed; the whole run is aborted.
#[derive(Debug, Clone, Error)]
#[error("Transformer {transformer} failed: {message}")]
pub struct TransformError {
    /// Name of the failing pass
    pub transformer: String,
    /// Failure description
    pub message: String,
}

impl TransformError {
    /// Create a pass failure
    pub fn new(transformer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transformer: transformer.into(),
            message: message.into(),
        }
    }
}

/// Serializing a tree back to text failed.
#[derive(Debug, Clone, Error)]
#[error("Codegen error: {0}")]
pub struct CodegenError(pub String);

/// Cosmetic formatting failure. Always absorbed by the pipeline.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Generated text did not re-parse
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Re-emission failed
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

/// Errors surfaced by the public deobfuscation operations
#[derive(Debug, Error)]
pub enum DeobfuscateError {
    /// Input text did not parse
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Pipeline could not be built from the configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pass failed
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Regenerated text did not re-parse for the rename stage
    #[error("Regenerated source failed to parse: {0}")]
    Regenerate(ParseError),

    /// Serializing the tree failed
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

/// Result type alias for deobfuscation operations
pub type DeobfuscateResult<T> = Result<T, DeobfuscateError>;

/// Result type alias for a single pass
pub type TransformResult<T> = Result<T, TransformError>;
