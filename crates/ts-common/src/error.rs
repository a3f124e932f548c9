//! Error types for the timesync core.
//!
//! Provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification matching the taxonomy (transient / configuration / fatal)
//! - A `StructuredError` projection matching the control API's `error{type, code}` reply
//!
//! # Agent-facing output
//!
//! ```json
//! { "code": 20, "category": "configuration", "message": "failed to resolve host: ntp.example.invalid", "recoverable": false, "wire_type": "eai_error" }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for timesync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors, matching the taxonomy in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Duplicate/rejected samples, lost replies, interpolation retries. Counted, never fatal.
    Transient,
    /// Unresolved hostnames, malformed config, unknown ids. Surfaced as a typed reply.
    Configuration,
    /// Malformed wire data from a peer.
    Protocol,
    /// Socket/syscall failures.
    Io,
    /// No timecounter at startup, corrupted parameter publication. Aborts during init only.
    Fatal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Fatal => write!(f, "fatal"),
        }
    }
}

/// The wire-level `error.type` enumeration from §6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireErrorType {
    NotFound,
    EaiError,
    ZmqError,
    CustomError,
}

/// Unified error type for the timesync core.
#[derive(Error, Debug)]
pub enum Error {
    /// §4.4.5: a sample with a server-receive time already present in history.
    #[error("duplicate sample")]
    Duplicate,

    /// §4.3: `insert` invariant violated (`Tf <= Ta`, RTT overflow, or `(Te-Tb).sec != 0`).
    #[error("sample out of domain: {0}")]
    OutOfDomain(String),

    /// §6.2: a `list_counters`/`list_sources`/`del_source` request referenced an unknown id.
    #[error("not found: {0}")]
    NotFound(String),

    /// §4.7 / §6.2: `getaddrinfo` failed while resolving a time source's
    /// `node`/`service`. `errno` is the resolver's own numeric code (`-1` if
    /// the platform didn't surface one), carried through to the wire reply.
    #[error("failed to resolve time source address {host}: errno {errno}")]
    UnresolvedHost { host: String, errno: i32 },

    /// §6.3: a source configuration failed validation (id too long, service empty, etc).
    #[error("invalid time source configuration: {0}")]
    InvalidConfig(String),

    /// Malformed data received from a peer (short NTP packet, bad control-protocol frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// §7: no timecounter registered at startup. Fatal; the process aborts during init.
    #[error("no timecounter available at startup")]
    NoTimecounter,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable numeric error code, grouped by category:
    /// 1x transient, 2x configuration, 3x protocol, 4x io, 9x fatal.
    pub fn code(&self) -> u32 {
        match self {
            Error::Duplicate => 10,
            Error::OutOfDomain(_) => 11,
            Error::NotFound(_) => 20,
            Error::UnresolvedHost { errno, .. } => *errno as u32,
            Error::InvalidConfig(_) => 22,
            Error::Protocol(_) => 30,
            Error::Io(_) => 40,
            Error::Json(_) => 41,
            Error::NoTimecounter => 90,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Duplicate | Error::OutOfDomain(_) => ErrorCategory::Transient,
            Error::NotFound(_) | Error::UnresolvedHost { .. } | Error::InvalidConfig(_) => {
                ErrorCategory::Configuration
            }
            Error::Protocol(_) => ErrorCategory::Protocol,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
            Error::NoTimecounter => ErrorCategory::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::NoTimecounter)
    }

    /// The wire-level `error.type` this error reports as, per §6.2.
    pub fn wire_type(&self) -> WireErrorType {
        match self {
            Error::NotFound(_) => WireErrorType::NotFound,
            Error::UnresolvedHost { .. } => WireErrorType::EaiError,
            _ => WireErrorType::CustomError,
        }
    }
}

/// Structured error response for the control API's `error{type, code}` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: u32,
    pub category: ErrorCategory,
    pub wire_type: WireErrorType,
    pub message: String,
    pub recoverable: bool,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        StructuredError {
            code: err.code(),
            category: err.category(),
            wire_type: err.wire_type(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_per_variant() {
        assert_eq!(Error::Duplicate.code(), 10);
        assert_eq!(Error::NotFound("abc".into()).code(), 20);
        assert_eq!(Error::NoTimecounter.code(), 90);
    }

    #[test]
    fn unresolved_host_code_carries_the_resolver_errno() {
        let err = Error::UnresolvedHost {
            host: "ntp.example.invalid:123".into(),
            errno: 8, // EAI_NONAME
        };
        assert_eq!(err.code(), 8);
    }

    #[test]
    fn category_groups_match_taxonomy() {
        assert_eq!(Error::Duplicate.category(), ErrorCategory::Transient);
        assert_eq!(
            Error::UnresolvedHost { host: "x".into(), errno: -1 }.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(Error::NoTimecounter.category(), ErrorCategory::Fatal);
    }

    #[test]
    fn fatal_errors_are_not_recoverable() {
        assert!(!Error::NoTimecounter.is_recoverable());
        assert!(Error::Duplicate.is_recoverable());
    }

    #[test]
    fn wire_type_mapping() {
        assert_eq!(
            Error::NotFound("x".into()).wire_type(),
            WireErrorType::NotFound
        );
        assert_eq!(
            Error::UnresolvedHost { host: "x".into(), errno: -1 }.wire_type(),
            WireErrorType::EaiError
        );
        assert_eq!(
            Error::OutOfDomain("x".into()).wire_type(),
            WireErrorType::CustomError
        );
    }

    #[test]
    fn structured_error_serializes() {
        let err = Error::NotFound("ntp0".into());
        let structured = StructuredError::from(&err);
        let json = serde_json::to_string(&structured).unwrap();
        assert!(json.contains("\"code\":20"));
        assert!(json.contains("\"wire_type\":\"NOT_FOUND\""));
    }
}
