//! Error types for the chartscan library

use std::io;

/// Library error type for chartscan operations
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Structurally invalid content in a file whose format was recognized
    #[error("parsing error: {0}")]
    ParsingError(String),

    /// Failure while following the block chain of a container archive
    #[error("archive error in {archive}: {source}")]
    ArchiveError {
        archive: String,
        #[source]
        source: io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ScanError {
    pub fn parsing(message: impl Into<String>) -> Self {
        Self::ParsingError(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    pub fn archive(archive: &str, source: io::Error) -> Self {
        Self::ArchiveError {
            archive: archive.to_string(),
            source,
        }
    }
}

impl From<io::Error> for ScanError {
    fn from(error: io::Error) -> Self {
        Self::IoError(error.to_string())
    }
}
