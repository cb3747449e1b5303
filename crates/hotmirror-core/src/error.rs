//! Error types for Hotmirror.
//!
//! This module provides a unified error type for the sync engine, with
//! specific variants for framing, filesystem, extraction and discovery
//! failures.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Hotmirror operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Hotmirror.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed binary bulk frame (E001)
    #[error("malformed bulk frame: {0}")]
    Framing(String),

    /// Archive could not be extracted (E002)
    #[error("archive extraction failed: {0}")]
    Extraction(String),

    /// Required tag missing from a control message (E003)
    #[error("control message is missing the '{0}' field")]
    ProtocolFieldMissing(&'static str),

    /// Control message carries a type this engine does not handle
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Remote path cannot be mapped inside the project sandbox (E004)
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// File change received before any project was established (E005)
    #[error("no active project; waiting for a folder change or project import")]
    NoActiveProject,

    /// An import is already running
    #[error("an import is already in progress")]
    ImportBusy,

    /// Discovery socket could not be bound or joined to its group (E006)
    #[error("unable to start discovery: {0}")]
    DiscoveryBind(String),

    /// Connection to the host failed or was lost (E007)
    #[error("connection error: {0}")]
    Connection(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::Framing(_) => Some("E001"),
            Self::Extraction(_) => Some("E002"),
            Self::ProtocolFieldMissing(_) => Some("E003"),
            Self::InvalidPath(_) => Some("E004"),
            Self::NoActiveProject => Some("E005"),
            Self::DiscoveryBind(_) => Some("E006"),
            Self::Connection(_) => Some("E007"),
            _ => None,
        }
    }

    /// Returns whether the host can fix this by pushing again.
    ///
    /// Nothing in the engine retries on its own; this only guides how a
    /// front end words the status line.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Framing(_)
                | Self::Extraction(_)
                | Self::ProtocolFieldMissing(_)
                | Self::NoActiveProject
                | Self::ImportBusy
                | Self::Connection(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoActiveProject => {
                Some("Open a project on the host so it pushes the project folder first.")
            }
            Self::DiscoveryBind(_) => Some(
                "Another process may hold the discovery port exclusively.\n\
                 Pass the host address directly: hotmirror connect <HOST:PORT>",
            ),
            Self::Connection(_) => Some(
                "Check that the host is running and reachable on the client port.",
            ),
            _ => None,
        }
    }
}
