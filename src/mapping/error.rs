//! Error definitions for the mapping module.

use thiserror::Error;

/// Failure families of sessions, catalogs and layout files.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The requested layout name exists neither as a built-in nor as a
    /// custom layout.
    #[error("Unknown layout: {0}")]
    UnknownLayout(String),

    /// A layout file could not be interpreted.
    #[error("Malformed layout file: {0}")]
    MalformedLayoutFile(String),

    /// A complete layout was required but buttons were left unassigned.
    #[error("Incomplete layout: {assigned} of {expected} buttons assigned")]
    IncompleteLayout { assigned: usize, expected: usize },

    /// The session never saw a committed event, so no joystick was selected.
    #[error("No joystick selected for this session")]
    NoJoystickSelected,

    /// Filesystem error while reading or writing a layout file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
