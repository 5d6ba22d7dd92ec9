//! Error types for hevcdec
//!
//! Errors follow the recovery granularity of the decoder:
//!
//! - parse errors drop a single NAL unit
//! - reference and callback errors drop the picture being decoded
//! - flow errors stop the current input buffer and reach the caller

use thiserror::Error;

/// Result type alias for hevcdec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hevcdec
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed syntax in one NAL unit
    #[error("Failed to parse {nal}: {msg}")]
    Parse { nal: &'static str, msg: String },

    /// A parameter set refers to one that was never received
    #[error("Broken link: {0}")]
    BrokenLink(String),

    /// Reference picture set could not be derived for the current picture
    #[error("Reference error: {0}")]
    Reference(String),

    /// A backend callback reported failure
    #[error("{callback} failed: {msg}")]
    Callback { callback: &'static str, msg: String },

    /// Sequence-level failure escalated to the caller
    #[error("Flow error: {0}")]
    Flow(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a parse error for the named syntax structure
    pub fn parse<S: Into<String>>(nal: &'static str, msg: S) -> Self {
        Error::Parse {
            nal,
            msg: msg.into(),
        }
    }

    /// Create a broken link error
    pub fn broken_link<S: Into<String>>(msg: S) -> Self {
        Error::BrokenLink(msg.into())
    }

    /// Create a reference error
    pub fn reference<S: Into<String>>(msg: S) -> Self {
        Error::Reference(msg.into())
    }

    /// Create a callback error
    pub fn callback<S: Into<String>>(callback: &'static str, msg: S) -> Self {
        Error::Callback {
            callback,
            msg: msg.into(),
        }
    }

    /// Create a flow error
    pub fn flow<S: Into<String>>(msg: S) -> Self {
        Error::Flow(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Error::InvalidState(msg.into())
    }

    /// True for errors confined to one NAL unit
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse { .. } | Error::BrokenLink(_))
    }

    /// True for errors that abandon the current picture only
    pub fn is_picture_error(&self) -> bool {
        matches!(
            self,
            Error::Reference(_) | Error::Callback { .. } | Error::BrokenLink(_)
        )
    }

    /// True for errors that must reach the caller of `decode`
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Flow(_) | Error::InvalidState(_) | Error::Io(_))
    }
}
