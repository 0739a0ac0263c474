//! Error types for bintable

use thiserror::Error;

/// bintable error type
#[derive(Error, Debug)]
pub enum Error {
    /// An expression or binning references a column absent from the chunk
    #[error("unknown column: '{0}'")]
    UnknownColumn(String),

    /// Malformed or unsupported expression syntax
    #[error("expression error: {0}")]
    Expression(String),

    /// Jagged columns disagree on per-row lengths
    #[error("jaggedness error: {0}")]
    Jaggedness(String),

    /// Invalid construction-time configuration
    #[error("config error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
