//! The control protocol's message shapes: requests, replies, and the
//! source-add configuration object.
//!
//! Modeled as a `serde`-tagged JSON enum per the wire description in §6.2 —
//! the transport that carries these frames (ZeroMQ request/reply, or
//! anything else) is out of scope; only the shapes are specified here.

use crate::bintime::Bintime;
use crate::counter::{Hz, TimecounterInfo};
use ts_common::error::{Error, StructuredError};
use ts_common::id::SourceId;

/// Descriptor of an NTP time source's endpoint configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimeSourceConfigNtp {
    pub node: String,
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_service() -> String {
    "ntp".to_string()
}

/// §6.3: `{ id: string(<=36), config: { node, service } }`, with a generated
/// id when the caller omits one.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TimeSourceConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub config: TimeSourceConfigNtp,
}

impl TimeSourceConfig {
    /// Validate the node/service lengths and resolve the effective id.
    pub fn validate(&self) -> Result<SourceId, Error> {
        if self.config.node.is_empty() || self.config.node.len() > 255 {
            return Err(Error::InvalidConfig(format!(
                "node must be 1-255 bytes, got {}",
                self.config.node.len()
            )));
        }
        if self.config.service.is_empty() || self.config.service.len() > 31 {
            return Err(Error::InvalidConfig(format!(
                "service must be 1-31 bytes, got {}",
                self.config.service.len()
            )));
        }
        match &self.id {
            Some(id) => SourceId::parse(id)
                .ok_or_else(|| Error::InvalidConfig(format!("invalid source id: {id}"))),
            None => Ok(SourceId::generate()),
        }
    }
}

/// A live time source's public-facing statistics.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct TimeSourceStats {
    pub rx: u64,
    pub tx: u64,
}

/// A time source as exposed by `list_sources`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimeSource {
    pub id: String,
    pub config: TimeSourceConfigNtp,
    pub stats: TimeSourceStats,
}

/// Per-parameter clock statistics, part of `get_keeper`'s reply.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct TimeKeeperRttStats {
    pub maximum: Option<f64>,
    pub median: Option<f64>,
    pub minimum: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct TimeKeeperStats {
    pub frequency_updates: u64,
    pub local_frequency_updates: u64,
    pub theta_updates: u64,
    pub timestamps: u64,
    pub updates: u64,
    pub rtts: TimeKeeperRttStats,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct TimeKeeperInfo {
    pub frequency: Option<f64>,
    pub frequency_error_ppm: f64,
    pub local_frequency: Option<f64>,
    pub local_frequency_error_ppm: f64,
    pub offset: Bintime,
    pub synced: bool,
    pub theta: Option<Bintime>,
}

/// `get_keeper`'s full reply payload: current wall time, the active
/// counter/source ids, and per-parameter stats.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimeKeeper {
    pub timestamp: Bintime,
    pub counter_id: Option<String>,
    pub source_id: Option<String>,
    pub info: TimeKeeperInfo,
    pub stats: TimeKeeperStats,
}

/// `list_counters`'s reply item: a registered timecounter's descriptor,
/// flattened for the wire.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimeCounter {
    pub id: String,
    pub name: String,
    pub frequency: Hz,
    pub priority: i32,
}

impl From<TimecounterInfo> for TimeCounter {
    fn from(info: TimecounterInfo) -> Self {
        TimeCounter {
            id: info.id.to_string(),
            name: info.name,
            frequency: info.frequency,
            priority: info.static_priority,
        }
    }
}

/// A control-protocol request: `{"type": "...", "payload": {...}}`.
///
/// Adjacently rather than internally tagged, since the `error` reply's own
/// payload needs a `type` field (§6.2's `error{type, code}`) and an
/// internal tag would collide with it on the wire.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Request {
    ListCounters { id: Option<String> },
    GetKeeper,
    ListSources { id: Option<String> },
    AddSource { source: TimeSourceConfig },
    DelSource { id: String },
}

/// A control-protocol reply: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Reply {
    Counters { counters: Vec<TimeCounter> },
    Keeper { keeper: Box<TimeKeeper> },
    Sources { sources: Vec<TimeSource> },
    Ok,
    Error {
        #[serde(rename = "type")]
        error_type: ts_common::error::WireErrorType,
        code: u32,
        message: String,
    },
}

impl From<&Error> for Reply {
    fn from(err: &Error) -> Self {
        let structured = StructuredError::from(err);
        Reply::Error {
            error_type: structured.wire_type,
            code: structured.code,
            message: structured.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tagged_enum_parses_by_type_field() {
        let json = r#"{"type":"get_keeper"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req, Request::GetKeeper));
    }

    #[test]
    fn add_source_request_defaults_service_to_ntp() {
        let json = r#"{"type":"add_source","payload":{"source":{"config":{"node":"pool.ntp.org"}}}}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        match req {
            Request::AddSource { source } => {
                assert_eq!(source.config.service, "ntp");
                assert!(source.id.is_none());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn validate_generates_id_when_missing() {
        let cfg = TimeSourceConfig {
            id: None,
            config: TimeSourceConfigNtp {
                node: "pool.ntp.org".into(),
                service: "ntp".into(),
            },
        };
        let id = cfg.validate().unwrap();
        assert!(!id.0.is_empty());
    }

    #[test]
    fn validate_rejects_empty_node() {
        let cfg = TimeSourceConfig {
            id: None,
            config: TimeSourceConfigNtp {
                node: "".into(),
                service: "ntp".into(),
            },
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reply_error_serializes_with_screaming_snake_type() {
        let err = Error::NotFound("abc".into());
        let reply = Reply::from(&err);
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"type\":\"NOT_FOUND\""));
        assert!(json.contains("\"code\":20"));
    }

    #[test]
    fn ok_reply_serializes_with_bare_type_tag() {
        let json = serde_json::to_string(&Reply::Ok).unwrap();
        assert_eq!(json, r#"{"type":"ok"}"#);
    }
}
