//! # Error Handling
//!
//! This module defines the centralized error type for the `winfs-injector`
//! library. It uses the `thiserror` library to create an `Error` enum covering
//! every way a tile repackaging run can fail.
//!
//! The variants follow the failure categories of the pipeline:
//!
//! - **Usage errors** (`Usage`): a required input was not supplied. These are
//!   reported before any I/O takes place.
//! - **Structural errors** (`Structure`): the tile does not have the shape the
//!   injector expects (more than one embedded component, more than one product
//!   metadata file, and so on).
//! - **Parse errors** (`Parse`, `ImageReference`): a structured document inside
//!   the tile is malformed, or the blob manifest does not name a root file
//!   system image in the expected layout.
//! - **I/O errors** (`Io`, `FileAccess`, `Archive`): reading or
//!   writing the tile or its working tree failed.
//! - **Collaborator errors** (`ReleaseCreation`): an external tool used to
//!   build the release (image fetcher, BOSH CLI, git) failed.
//!
//! The `Result` type alias is used to return `Result<T, Error>` from functions
//! throughout the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for winfs-injector operations
#[derive(Error, Debug)]
pub enum Error {
    /// A required input was missing. The message is shown to the user as-is.
    #[error("{message}")]
    Usage { message: String },

    /// The tile does not have the expected layout.
    #[error("{message}")]
    Structure { message: String },

    /// A YAML document inside the tile could not be parsed.
    #[error("failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No blob key in the component's blob manifest matched the root file
    /// system image pattern.
    #[error("unable to parse tag from embedded root filesystem in '{}': please confirm that you are using the appropriate winfs-injector version for this tile", path.display())]
    ImageReference { path: PathBuf },

    /// An archive could not be read or written.
    #[error("archive error for '{}': {message}", path.display())]
    Archive { path: PathBuf, message: String },

    /// A file or directory inside the working tree could not be accessed.
    #[error("I/O error for '{}': {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external release builder failed.
    #[error("release creation failed: {command}: {message}")]
    ReleaseCreation { command: String, message: String },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML serialization error, wrapped from `serde_yaml::Error`.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

impl Error {
    /// Builds a `Usage` error.
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage {
            message: message.into(),
        }
    }

    /// Builds a `Structure` error.
    pub fn structure(message: impl Into<String>) -> Self {
        Error::Structure {
            message: message.into(),
        }
    }

    /// Builds a `FileAccess` error for `path`.
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileAccess {
            path: path.into(),
            source,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
