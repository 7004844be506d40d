//! Error taxonomy for the whole crate.
//!
//! `CoreError` consolidates every failure mode named in the error-handling
//! design: bad I/O, malformed containers, invalid caller input, series
//! compatibility violations, and the reserved slot for exporter/algorithm
//! failures. Every public function returns `CoreResult<T>`; nothing is
//! swallowed below the outermost call.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Open/read/write/seek failed, a path was missing, or a write was
    /// truncated.
    #[error("FileIO: {message}{}", path_suffix(.path))]
    FileIo {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Header JSON missing a required field, unknown version, type
    /// mismatch, or a trailer offset pointing outside the file.
    #[error("DataIO: {message}{}", path_suffix(.path))]
    DataIo {
        message: String,
        path: Option<PathBuf>,
    },

    /// Argument out of range, wrong modality for the requested operation,
    /// or an unrecognized file extension.
    #[error("UserInput: {0}")]
    UserInput(String),

    /// A `Series::insert` compatibility rule failed.
    #[error("Series: {0}")]
    Series(String),

    /// Reserved for exporter/algorithm failures (pixel-level work this
    /// crate does not implement, or an exporter precondition).
    #[error("Algorithm: {0}")]
    Algorithm(String),
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" (path: {})", p.display()),
        None => String::new(),
    }
}

impl CoreError {
    pub fn file_io(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        CoreError::FileIo {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    pub fn file_io_source(
        message: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        CoreError::FileIo {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source),
        }
    }

    pub fn data_io(message: impl Into<String>) -> Self {
        CoreError::DataIo {
            message: message.into(),
            path: None,
        }
    }

    pub fn data_io_at(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        CoreError::DataIo {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn user_input(message: impl Into<String>) -> Self {
        CoreError::UserInput(message.into())
    }

    pub fn series(message: impl Into<String>) -> Self {
        CoreError::Series(message.into())
    }

    pub fn algorithm(message: impl Into<String>) -> Self {
        CoreError::Algorithm(message.into())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(source: std::io::Error) -> Self {
        CoreError::FileIo {
            message: source.to_string(),
            path: None,
            source: Some(source),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(source: serde_json::Error) -> Self {
        CoreError::DataIo {
            message: format!("invalid header JSON: {source}"),
            path: None,
        }
    }
}

/// Pinned, verbatim messages the test suite checks for.
pub mod messages {
    pub const SERIES_NOT_ORDERED: &str = "Members of series are not ordered in time.";
    pub const MOVIE_NO_FRAME_TIMESTAMPS: &str =
        "Input movie does not have frame timestamps stored in file.";
}
