// src/config.rs
use crate::error::ConfigError;
use crate::esl::EventFormat;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8021;
pub const DEFAULT_PASSWORD: &str = "ClueCon";

#[derive(Debug, Clone)]
pub struct Config {
    pub freeswitch: FreeSwitchServer,
    pub log_dir: PathBuf,
    pub log_file: String,
    pub log_format: LogFormat,
    pub event_format: EventFormat,
    pub reconnect_delay: Duration,
    pub liveness_poll_interval: Duration,
    pub connect_timeout: Duration,
    pub event_idle_timeout: Option<Duration>,
    pub stale_call_age: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreeSwitchServer {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl FreeSwitchServer {
    pub fn server_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup; missing keys
    /// fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let log_format = match get("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let event_format = match get("EVENT_FORMAT", "plain").to_ascii_lowercase().as_str() {
            "plain" => EventFormat::Plain,
            "json" => EventFormat::Json,
            other => {
                return Err(ConfigError::Invalid {
                    key: "EVENT_FORMAT".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let event_idle_timeout = match lookup("EVENT_IDLE_TIMEOUT_SECS") {
            Some(raw) if !raw.trim().is_empty() => {
                match parse_value::<u64>("EVENT_IDLE_TIMEOUT_SECS", &raw)? {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                }
            }
            _ => None,
        };

        Ok(Config {
            freeswitch: FreeSwitchServer {
                host: get("FS_HOST", DEFAULT_HOST),
                port: parse_value("FS_PORT", &get("FS_PORT", "8021"))?,
                password: get("FS_PASSWORD", DEFAULT_PASSWORD),
            },
            log_dir: PathBuf::from(get("LOG_DIR", "logs")),
            log_file: get("LOG_FILE", "call_log.txt"),
            log_format,
            event_format,
            reconnect_delay: secs("RECONNECT_DELAY_SECS", &get("RECONNECT_DELAY_SECS", "5"))?,
            liveness_poll_interval: secs("LIVENESS_POLL_SECS", &get("LIVENESS_POLL_SECS", "1"))?,
            connect_timeout: secs("CONNECT_TIMEOUT_SECS", &get("CONNECT_TIMEOUT_SECS", "10"))?,
            event_idle_timeout,
            stale_call_age: secs("STALE_CALL_SECS", &get("STALE_CALL_SECS", "86400"))?,
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    parse_value::<u64>(key, raw).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.freeswitch.host, "127.0.0.1");
        assert_eq!(config.freeswitch.port, 8021);
        assert_eq!(config.freeswitch.password, "ClueCon");
        assert_eq!(config.log_path(), PathBuf::from("logs").join("call_log.txt"));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.event_format, EventFormat::Plain);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.liveness_poll_interval, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.event_idle_timeout, None);
        assert_eq!(config.stale_call_age, Duration::from_secs(86400));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FS_HOST", "10.0.0.5"),
            ("FS_PORT", "8022"),
            ("FS_PASSWORD", "secret"),
            ("LOG_FORMAT", "JSON"),
            ("EVENT_FORMAT", "json"),
            ("RECONNECT_DELAY_SECS", "2"),
            ("EVENT_IDLE_TIMEOUT_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(config.freeswitch.server_id(), "10.0.0.5:8022");
        assert_eq!(config.freeswitch.password, "secret");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.event_format, EventFormat::Json);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.event_idle_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_idle_timeout_disables_it() {
        let config = Config::from_lookup(lookup(&[("EVENT_IDLE_TIMEOUT_SECS", "0")])).unwrap();
        assert_eq!(config.event_idle_timeout, None);
    }

    #[test]
    fn test_invalid_port() {
        let err = Config::from_lookup(lookup(&[("FS_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "FS_PORT"));
    }

    #[test]
    fn test_invalid_log_format() {
        assert!(Config::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
    }

    #[test]
    fn test_invalid_event_format() {
        let err = Config::from_lookup(lookup(&[("EVENT_FORMAT", "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "EVENT_FORMAT"));
    }
}
