//! Structured event definitions for logging.
//!
//! Events follow a consistent schema for machine-parseable JSONL output.
//! All events include correlation IDs (run_id, session_id) and stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Processing stages in the ts-core timesync pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup: timecounter selection, keeper setup, config load.
    Init,
    /// NTP request/reply polling.
    Poll,
    /// Per-sample clock discipline (history insert, parameter updates).
    Clock,
    /// Control-protocol request handling.
    Api,
    /// Server shutdown / source teardown.
    Shutdown,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Poll => "poll",
            Stage::Clock => "clock",
            Stage::Api => "api",
            Stage::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Startup
    pub const INIT_STARTED: &str = "init.started";
    pub const INIT_COUNTER_SELECTED: &str = "init.counter_selected";
    pub const INIT_FINISHED: &str = "init.finished";

    // Poll stage
    pub const POLL_SCHEDULED: &str = "poll.scheduled";
    pub const POLL_SENT: &str = "poll.sent";
    pub const POLL_REPLY_RECEIVED: &str = "poll.reply_received";
    pub const POLL_REPLY_MALFORMED: &str = "poll.reply_malformed";
    pub const POLL_TIMEOUT: &str = "poll.timeout";

    // Clock stage
    pub const CLOCK_SAMPLE_APPLIED: &str = "clock.sample_applied";
    pub const CLOCK_SAMPLE_DUPLICATE: &str = "clock.sample_duplicate";
    pub const CLOCK_FREQ_ACCEPTED: &str = "clock.freq_accepted";
    pub const CLOCK_FREQ_REJECTED: &str = "clock.freq_rejected";
    pub const CLOCK_OFFSET_ACCEPTED: &str = "clock.offset_accepted";
    pub const CLOCK_OFFSET_REJECTED: &str = "clock.offset_rejected";
    pub const CLOCK_LEVEL_SHIFT_DETECTED: &str = "clock.level_shift_detected";
    pub const CLOCK_SYNCED: &str = "clock.synced";

    // Api stage
    pub const API_REQUEST_RECEIVED: &str = "api.request_received";
    pub const API_SOURCE_ADDED: &str = "api.source_added";
    pub const API_SOURCE_REMOVED: &str = "api.source_removed";
    pub const API_ERROR_REPLY: &str = "api.error_reply";

    // Shutdown
    pub const SHUTDOWN_STARTED: &str = "shutdown.started";
    pub const SHUTDOWN_FINISHED: &str = "shutdown.finished";

    // Error events
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// A structured log event for JSONL output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// Log level.
    pub level: Level,

    /// Event name (e.g., "poll.sent", "clock.synced").
    pub event: String,

    /// Unique ID for this invocation of ts-core.
    pub run_id: String,

    /// Source id, when the event concerns a specific NTP source (nullable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Current processing stage.
    pub stage: Stage,

    /// Host identifier.
    pub host_id: String,

    /// Human-readable message.
    pub message: String,

    /// Additional structured fields (stable keys).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, serde_json::Value>,

    /// Process ID, included on startup/shutdown events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Source id shorthand, when redundant with `session_id` is undesirable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_id: Option<String>,
}

impl LogEvent {
    /// Create a new log event with required fields.
    pub fn new(
        level: Level,
        event: impl Into<String>,
        run_id: impl Into<String>,
        host_id: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: run_id.into(),
            session_id: None,
            stage,
            host_id: host_id.into(),
            message: message.into(),
            fields: HashMap::new(),
            pid: None,
            start_id: None,
        }
    }

    /// Set the session ID (the NTP source id this event concerns).
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Add a field to the event.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    /// Set process context.
    pub fn with_process(mut self, pid: u32, start_id: impl Into<String>) -> Self {
        self.pid = Some(pid);
        self.start_id = Some(start_id.into());
        self
    }

    /// Serialize to a single JSON line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Context for generating log events with consistent run/session IDs.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Unique ID for this invocation.
    pub run_id: String,
    /// NTP source id (if one is currently configured).
    pub session_id: Option<String>,
    /// Host identifier.
    pub host_id: String,
}

impl LogContext {
    /// Create a new log context.
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            session_id: None,
            host_id: host_id.into(),
        }
    }

    /// Set the session ID.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Create an event with this context.
    pub fn event(
        &self,
        level: Level,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        let mut e = LogEvent::new(level, event, &self.run_id, &self.host_id, stage, message);
        if let Some(ref sid) = self.session_id {
            e.session_id = Some(sid.clone());
        }
        e
    }

    /// Shortcut for info-level event.
    pub fn info(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Info, event, stage, message)
    }

    /// Shortcut for debug-level event.
    pub fn debug(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Debug, event, stage, message)
    }

    /// Shortcut for warn-level event.
    pub fn warn(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Warn, event, stage, message)
    }

    /// Shortcut for error-level event.
    pub fn error(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Error, event, stage, message)
    }
}
