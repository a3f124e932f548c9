//! Shared identity and error types for the timesync core.

pub mod error;
pub mod id;

pub use error::{Error, ErrorCategory, Result, StructuredError, WireErrorType};
pub use id::SourceId;
