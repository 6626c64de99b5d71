use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Log tailing errors
#[derive(Error, Debug)]
pub enum TailError {
    /// Listing the log directory failed
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Opening or seeking the current log file failed
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading from the current log file failed
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TailError {
    /// Path of the file or directory the error relates to
    pub fn path(&self) -> &PathBuf {
        match self {
            TailError::Scan { path, .. }
            | TailError::Open { path, .. }
            | TailError::Read { path, .. } => path,
        }
    }
}
