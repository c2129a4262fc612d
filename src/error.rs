//! Error types for finsheet.
//!
//! Internally the crate uses `anyhow` (`Res<T>`) so that context can be added freely as errors
//! bubble up. Errors that belong to a known class are created with [`tagged`] at their origin; the
//! tag survives any context added later. Public functions return [`Result<T>`], whose [`Error`]
//! carries an [`ErrorType`] that callers (and `main`) can act on.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

pub(crate) type Res<T> = std::result::Result<T, anyhow::Error>;
pub type Result<T> = std::result::Result<T, Error>;

/// The class of an error. This decides whether an operation is retried and what exit code the
/// program returns.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Credentials are missing or malformed. Not retried.
    AuthConfig,
    /// The refresh token was rejected. Run `finsheet auth` again.
    AuthExpired,
    /// A transient network or service fault. Retried with backoff up to a bound.
    RemoteUnavailable,
    /// The credential does not have access to the spreadsheet. Not retried.
    Permission,
    /// A row could not be parsed. Recorded in the run summary, never fatal on its own.
    DataValidation,
    /// The configuration file or a command argument is invalid.
    Config,
    /// Anything else.
    Internal,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

impl ErrorType {
    /// Only transient faults are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorType::RemoteUnavailable)
    }

    /// The process exit code used when an error of this type ends the program.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorType::AuthConfig => 2,
            ErrorType::AuthExpired => 3,
            ErrorType::RemoteUnavailable => 4,
            ErrorType::Permission => 5,
            ErrorType::Config => 6,
            ErrorType::DataValidation | ErrorType::Internal => 1,
        }
    }
}

/// The public error type. It wraps the `anyhow` chain so that no diagnostic context is lost.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub(crate) fn new(error_type: ErrorType, inner: anyhow::Error) -> Self {
        Self { error_type, inner }
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn exit_code(&self) -> u8 {
        self.error_type.exit_code()
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {:?}", self.error_type, self.inner)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// The marker that is placed at the bottom of an `anyhow` chain to record its `ErrorType`.
#[derive(Debug)]
struct Tagged {
    error_type: ErrorType,
    message: String,
}

impl Display for Tagged {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Tagged {}

/// Creates an `anyhow::Error` that is classified as `error_type`.
pub(crate) fn tagged(error_type: ErrorType, message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(Tagged {
        error_type,
        message: message.into(),
    })
}

/// Finds the `ErrorType` of an error, if one was attached anywhere in its chain.
pub(crate) fn error_type_of(e: &anyhow::Error) -> Option<ErrorType> {
    e.chain().find_map(|cause| {
        if let Some(t) = cause.downcast_ref::<Tagged>() {
            return Some(t.error_type);
        }
        cause.downcast_ref::<Error>().map(|pub_err| pub_err.error_type)
    })
}

/// Converts an internal `Res<T>` into the public `Result<T>`.
pub(crate) trait IntoResult<T> {
    /// Keeps the `ErrorType` already attached to the error, or uses `fallback` when there is none.
    fn pub_result(self, fallback: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for Res<T> {
    fn pub_result(self, fallback: ErrorType) -> Result<T> {
        self.map_err(|e| {
            let error_type = error_type_of(&e).unwrap_or(fallback);
            Error::new(error_type, e)
        })
    }
}
