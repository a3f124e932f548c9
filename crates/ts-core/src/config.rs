//! Process-lifetime configuration: the NTP service name, an optional
//! timecounter priority override, and the logging config.
//!
//! §6.4: there is no persistent state — this config is read once at
//! startup from CLI flags and environment variables and never written
//! back.

use crate::logging::LogConfig;

/// Default NTP service/port name, per §6.3.
pub const DEFAULT_NTP_SERVICE: &str = "ntp";

/// Top-level process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `node` to poll at startup, if one is configured via `--source`.
    pub source_node: Option<String>,
    /// `service` to poll at startup; defaults to [`DEFAULT_NTP_SERVICE`].
    pub source_service: String,
    /// Logging configuration.
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_node: None,
            source_service: DEFAULT_NTP_SERVICE.to_string(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset. CLI flags (parsed in `main.rs`) take
    /// precedence and are applied by the caller after this returns.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(node) = std::env::var("TS_SOURCE_NODE") {
            if !node.is_empty() {
                config.source_node = Some(node);
            }
        }
        if let Ok(service) = std::env::var("TS_SOURCE_SERVICE") {
            if !service.is_empty() {
                config.source_service = service;
            }
        }
        config.log = LogConfig::from_env(None, None);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_source_and_default_service() {
        let config = Config::default();
        assert!(config.source_node.is_none());
        assert_eq!(config.source_service, "ntp");
    }

    #[test]
    fn from_env_reads_source_node() {
        std::env::set_var("TS_SOURCE_NODE", "pool.ntp.org");
        std::env::set_var("TS_SOURCE_SERVICE", "123");
        let config = Config::from_env();
        assert_eq!(config.source_node.as_deref(), Some("pool.ntp.org"));
        assert_eq!(config.source_service, "123");
        std::env::remove_var("TS_SOURCE_NODE");
        std::env::remove_var("TS_SOURCE_SERVICE");
    }
}
