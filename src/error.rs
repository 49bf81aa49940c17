//! Sorting errors.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;

use crate::compare::SortColumn;

/// Boxed error raised by a caller-supplied input stream or sink.
pub type BoxedError = Box<dyn Error + Send + Sync>;

/// Invalid sorter or sort specification configuration. Always raised before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Sort key refers to a column the schema does not have.
    ColumnOutOfRange { column: usize, width: usize },
    /// The same column appears twice with opposite directions.
    ConflictingDirections { column: SortColumn },
    /// Projection refers to a column the schema does not have.
    ProjectionOutOfRange { column: usize, width: usize },
    /// Projection selects the same column twice.
    DuplicateProjection { column: usize },
    /// Projection refers to a column name the schema does not have.
    UnknownColumn(String),
    /// A sorter option has an unusable value.
    InvalidOption { name: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ColumnOutOfRange { column, width } => {
                write!(f, "sort column {} out of range (table has {} columns)", column, width)
            }
            ConfigError::ConflictingDirections { column } => {
                write!(f, "sort key on {} used twice with conflicting directions", column)
            }
            ConfigError::ProjectionOutOfRange { column, width } => {
                write!(f, "projected column {} out of range (table has {} columns)", column, width)
            }
            ConfigError::DuplicateProjection { column } => write!(f, "column {} projected twice", column),
            ConfigError::UnknownColumn(name) => write!(f, "unknown column '{}'", name),
            ConfigError::InvalidOption { name, reason } => write!(f, "invalid option {}: {}", name, reason),
        }
    }
}

impl Error for ConfigError {}

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Invalid configuration or sort specification.
    Config(ConfigError),
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Common I/O error.
    IO(io::Error),
    /// Run serialization error.
    SerializationError(rmp_serde::encode::Error),
    /// Run deserialization error.
    DeserializationError(rmp_serde::decode::Error),
    /// Input data stream error.
    InputError(BoxedError),
    /// Result sink error.
    SinkError(BoxedError),
    /// Input row width does not match the schema.
    InvalidRow { expected: usize, actual: usize },
    /// The execution context requested cancellation.
    Canceled,
}

impl SortError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, SortError::Canceled)
    }
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Config(err) => Some(err),
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::SerializationError(err) => Some(err),
            SortError::DeserializationError(err) => Some(err),
            SortError::InputError(err) => Some(err.as_ref()),
            SortError::SinkError(err) => Some(err.as_ref()),
            SortError::InvalidRow { .. } | SortError::Canceled => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Config(err) => write!(f, "configuration error: {}", err),
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::SerializationError(err) => write!(f, "run serialization error: {}", err),
            SortError::DeserializationError(err) => write!(f, "run deserialization error: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::SinkError(err) => write!(f, "result sink error: {}", err),
            SortError::InvalidRow { expected, actual } => {
                write!(f, "row has {} cells, expected {}", actual, expected)
            }
            SortError::Canceled => write!(f, "sorting canceled"),
        }
    }
}

impl From<ConfigError> for SortError {
    fn from(err: ConfigError) -> Self {
        SortError::Config(err)
    }
}

impl From<io::Error> for SortError {
    fn from(err: io::Error) -> Self {
        SortError::IO(err)
    }
}

impl From<rmp_serde::encode::Error> for SortError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        SortError::SerializationError(err)
    }
}

impl From<rmp_serde::decode::Error> for SortError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        SortError::DeserializationError(err)
    }
}
