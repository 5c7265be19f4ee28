//! Error types for metrics queries

use std::fmt;

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug)]
pub enum MetricsError {
    /// The platform does not expose this resource
    Unsupported(&'static str),

    /// The resource exists but reported nothing usable
    Unavailable(String),

    /// Raw system data could not be parsed
    ParseFailed(String),

    /// I/O error while reading system files
    IoError(std::io::Error),
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::Unsupported(what) => write!(f, "{what} not supported on this platform"),
            MetricsError::Unavailable(msg) => write!(f, "metric unavailable: {msg}"),
            MetricsError::ParseFailed(msg) => write!(f, "failed to parse system data: {msg}"),
            MetricsError::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for MetricsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetricsError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MetricsError {
    fn from(err: std::io::Error) -> Self {
        MetricsError::IoError(err)
    }
}
