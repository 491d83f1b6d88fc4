//! Error types for bundle transformation

use std::path::PathBuf;
use thiserror::Error;

use crate::path::PathError;

/// Main error type for recast operations
#[derive(Debug, Error)]
pub enum RecastError {
    /// A mapping definition that cannot be loaded or is internally inconsistent
    #[error("Mapping error: {message}")]
    MappingError { message: String },

    /// Path expression failures that make a mapping unusable
    #[error("Path error in '{path}': {source}")]
    PathError {
        path: String,
        #[source]
        source: PathError,
    },

    /// A reference target that a mapping requires could not be found
    #[error(
        "Unresolved reference in mapping '{mapping}' (source {source_document}): {target}"
    )]
    UnresolvedReference {
        mapping: String,
        source_document: String,
        target: String,
    },

    /// Documents or bundles that do not have the expected shape
    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },

    /// Date arithmetic and value transform failures
    #[error("Temporal error: {message}")]
    TemporalError { message: String },

    /// Script host failures
    #[error("Script error in '{function}': {message}")]
    ScriptError { function: String, message: String },

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON or YAML decoding errors
    #[error("Parse error in '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Mapping,
    Path,
    Reference,
    Document,
    Temporal,
    Script,
    Config,
    Io,
    Parse,
    Internal,
}

impl RecastError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecastError::MappingError { .. } => ErrorKind::Mapping,
            RecastError::PathError { .. } => ErrorKind::Path,
            RecastError::UnresolvedReference { .. } => ErrorKind::Reference,
            RecastError::InvalidDocument { .. } => ErrorKind::Document,
            RecastError::TemporalError { .. } => ErrorKind::Temporal,
            RecastError::ScriptError { .. } => ErrorKind::Script,
            RecastError::ConfigError { .. } => ErrorKind::Config,
            RecastError::IoError { .. } => ErrorKind::Io,
            RecastError::ParseError { .. } => ErrorKind::Parse,
            RecastError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable (processing of the current field may be skipped)
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Temporal | ErrorKind::Document)
    }

    /// Create a mapping error
    pub fn mapping_error(message: impl Into<String>) -> Self {
        Self::MappingError {
            message: message.into(),
        }
    }

    /// Create a path error for the given expression text
    pub fn path_error(path: impl Into<String>, source: PathError) -> Self {
        Self::PathError {
            path: path.into(),
            source,
        }
    }

    /// Create an unresolved reference error
    pub fn unresolved_reference(
        mapping: impl Into<String>,
        source_document: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::UnresolvedReference {
            mapping: mapping.into(),
            source_document: source_document.into(),
            target: target.into(),
        }
    }

    /// Create an invalid document error
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Create a temporal error
    pub fn temporal_error(message: impl Into<String>) -> Self {
        Self::TemporalError {
            message: message.into(),
        }
    }

    /// Create a script error
    pub fn script_error(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScriptError {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    /// Create a decoding error with path context
    pub fn parse_error(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ParseError {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for RecastError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}
