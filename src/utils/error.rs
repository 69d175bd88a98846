//! Error types for the compression engine.
//!
//! Provides a hierarchy of error types using `thiserror` for ergonomic error handling.
//! [`EncodeError`] is what a single encoder invocation can fail with; [`EngineError`]
//! is what the consumer-facing operations return.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use serde::Serialize;
use crate::core::SessionId;
use crate::utils::FormatId;

/// Validation errors for paths and encoder parameters.
#[derive(Error, Debug, Clone, Serialize)]
pub enum ValidationError {
    /// Path-related validation error
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    /// Parameter value outside its declared range
    #[error("Parameter error: {0}")]
    Parameters(String),
}

/// File path errors.
#[derive(Error, Debug, Clone, Serialize)]
pub enum PathError {
    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    /// Path exists but is not a file
    #[error("Not a file: {0}")]
    NotFile(PathBuf),
    /// IO error accessing the path
    #[error("IO error: {0}")]
    IO(String),
}

/// Failure of a single encoder invocation.
///
/// Every variant except `MissingDependency` is an invocation failure: it is
/// recorded on the result of that one request and nothing else.
#[derive(Error, Debug, Clone, Serialize)]
pub enum EncodeError {
    /// Encoder binary could not be located. Disables the format for good.
    #[error("{format} encoder not found: {program}")]
    MissingDependency { format: FormatId, program: PathBuf },

    /// Process could not be started for a reason other than a missing binary
    #[error("Failed to start {program}: {reason}")]
    Spawn { program: PathBuf, reason: String },

    /// Encoder ran and exited unsuccessfully
    #[error("{program} exited with {status}: {diagnostics}")]
    NonZeroExit { program: PathBuf, status: String, diagnostics: String },

    /// Encoder did not finish inside the configured bound and was killed
    #[error("{program} timed out after {timeout_ms}ms")]
    TimedOut { program: PathBuf, timeout_ms: u64 },

    /// Encoder reported success but the artifact is missing or unreadable
    #[error("Output missing: {path}: {diagnostics}")]
    MissingOutput { path: PathBuf, diagnostics: String },

    /// Parameters were built for a different encoder
    #[error("Parameters for {given} passed to the {expected} encoder")]
    WrongFormat { expected: FormatId, given: FormatId },
}

impl EncodeError {
    /// Whether the failure is fatal to all future use of the format.
    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, Self::MissingDependency { .. })
    }
}

/// Main error type for the engine.
///
/// All errors surfaced to a consumer are converted to this type.
#[derive(Error, Debug, Serialize)]
pub enum EngineError {
    /// Input path or parameter validation failed
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An encoder binary is missing
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Encoder invocation failed
    #[error("Invocation error: {0}")]
    Invocation(String),

    /// stat/copy/read failure on an original or an artifact
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// No open session with this id
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// The format's encoder is unavailable on this host
    #[error("Format unavailable: {0}")]
    FormatUnavailable(FormatId),

    /// None of the encoders can be used
    #[error("No encoders available")]
    NoEncodersAvailable,

    /// Save stopped part way; copies already written are left in place
    #[error("Save incomplete after {} copies: {error}", completed.len())]
    SaveIncomplete { completed: Vec<PathBuf>, error: String },

    /// The engine has been shut down
    #[error("Engine is shut down")]
    Shutdown,
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// Helper methods for error creation
impl EngineError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(ValidationError::Parameters(msg.into()))
    }

    pub fn filesystem<T: Into<String>>(msg: T) -> Self {
        Self::Filesystem(msg.into())
    }
}

// Helper methods for validation error creation
impl ValidationError {
    pub fn path_not_found(path: impl Into<PathBuf>) -> Self {
        Self::Path(PathError::NotFound(path.into()))
    }

    pub fn not_a_file(path: impl Into<PathBuf>) -> Self {
        Self::Path(PathError::NotFile(path.into()))
    }

    pub fn parameters(msg: impl Into<String>) -> Self {
        Self::Parameters(msg.into())
    }
}

// Convert std::io::Error to EngineError
impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        Self::Filesystem(err.to_string())
    }
}

// Convert io::Error to PathError
impl From<io::Error> for PathError {
    fn from(err: io::Error) -> Self {
        Self::IO(err.to_string())
    }
}

// Convert PathError to EngineError
impl From<PathError> for EngineError {
    fn from(err: PathError) -> Self {
        Self::Validation(ValidationError::Path(err))
    }
}

// Encoder failures reach the consumer either as a missing dependency or as an
// invocation failure
impl From<EncodeError> for EngineError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::MissingDependency { .. } => Self::MissingDependency(err.to_string()),
            other => Self::Invocation(other.to_string()),
        }
    }
}
