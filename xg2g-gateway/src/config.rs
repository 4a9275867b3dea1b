//! Command line and configuration file handling.
//!
//! Precedence: command line > `xg2g-gateway.toml` > built-in defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::admission::AdmissionLimits;
use crate::playback::ServerCapabilities;
use crate::resilience::BreakerConfig;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "xg2g-gateway.toml";

const DEFAULT_LISTEN: &str = "0.0.0.0:8088";
const DEFAULT_DATABASE: &str = "xg2g-gateway.db";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid listen address {0:?}")]
    InvalidListen(String),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// xg2g-gateway - session admission and playback decision gateway
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on [default: 0.0.0.0:8088]
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Path to the state database [default: xg2g-gateway.db]
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Keep state in memory only
    #[arg(long)]
    pub memory_store: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory where log files are stored [default: logs]
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Number of days to keep log files [default: 7]
    #[arg(long)]
    pub log_retention_days: Option<u64>,
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub leases: LeasesSection,
    #[serde(default)]
    pub breaker: BreakerSection,
    #[serde(default)]
    pub playback: PlaybackSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    pub listen: Option<String>,
    /// Bearer token required by the playback endpoints.
    pub api_token: Option<String>,
    /// Seconds between metrics reports in the log; 0 disables.
    pub metrics_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct EngineSection {
    pub enabled: Option<bool>,
    pub tuner_slots: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LimitsSection {
    pub max_sessions: Option<i64>,
    pub max_transcodes: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LeasesSection {
    pub lease_ttl_secs: Option<u64>,
    pub idempotency_ttl_secs: Option<u64>,
    pub retry_after_secs: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct BreakerSection {
    pub threshold: Option<u32>,
    pub min_attempts: Option<u32>,
    pub window_secs: Option<u64>,
    pub reset_timeout_secs: Option<u64>,
    pub half_open_successes: Option<u32>,
    pub consecutive_failures: Option<u32>,
    pub panic_recovery: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PlaybackSection {
    pub hw_accel: Option<bool>,
    pub hw_codecs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DatabaseSection {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

/// Read and parse a config file.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Effective gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub database: PathBuf,
    pub memory_store: bool,
    pub tuner_slots: Vec<u32>,
    pub limits: AdmissionLimits,
    pub lease_ttl: Duration,
    pub idempotency_ttl: Duration,
    pub breaker: BreakerConfig,
    pub server_caps: ServerCapabilities,
    pub api_token: Option<String>,
    pub metrics_interval_secs: u64,
    pub log_dir: PathBuf,
    pub log_retention_days: u64,
    pub log_level: Option<String>,
    pub verbose: bool,
}

fn positive_secs(key: &'static str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(value))
}

fn non_negative(key: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must not be negative".to_string(),
        });
    }
    Ok(value)
}

impl GatewayConfig {
    /// Resolve the config file location, load it and merge it with `args`.
    pub fn load(args: Args) -> Result<Self, ConfigError> {
        let path = args.config.clone().or_else(|| {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            default_path.exists().then_some(default_path)
        });
        let file = match &path {
            Some(path) => load_config(path)?,
            None => ConfigFile::default(),
        };
        Self::merge(args, file)
    }

    /// Merge command line values over file values over defaults.
    pub fn merge(args: Args, file: ConfigFile) -> Result<Self, ConfigError> {
        let listen = match (args.listen, file.server.listen) {
            (Some(addr), _) => addr,
            (None, Some(raw)) => raw.parse().map_err(|_| ConfigError::InvalidListen(raw))?,
            (None, None) => DEFAULT_LISTEN
                .parse()
                .map_err(|_| ConfigError::InvalidListen(DEFAULT_LISTEN.to_string()))?,
        };

        let database = args
            .database
            .or_else(|| file.database.path.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

        let defaults = AdmissionLimits::default();
        let limits = AdmissionLimits {
            engine_enabled: file.engine.enabled.unwrap_or(defaults.engine_enabled),
            max_sessions: non_negative(
                "limits.max_sessions",
                file.limits.max_sessions.unwrap_or(defaults.max_sessions),
            )?,
            max_transcodes: non_negative(
                "limits.max_transcodes",
                file.limits.max_transcodes.unwrap_or(defaults.max_transcodes),
            )?,
            retry_after_secs: file.leases.retry_after_secs.unwrap_or(defaults.retry_after_secs).max(1),
        };

        let b = BreakerConfig::default();
        let breaker = BreakerConfig {
            threshold: file.breaker.threshold.unwrap_or(b.threshold),
            min_attempts: file.breaker.min_attempts.unwrap_or(b.min_attempts),
            window: positive_secs(
                "breaker.window_secs",
                file.breaker.window_secs.unwrap_or(b.window.as_secs()),
            )?,
            reset_timeout: positive_secs(
                "breaker.reset_timeout_secs",
                file.breaker.reset_timeout_secs.unwrap_or(b.reset_timeout.as_secs()),
            )?,
            half_open_successes: file.breaker.half_open_successes.unwrap_or(b.half_open_successes),
            consecutive_failures: file.breaker.consecutive_failures.unwrap_or(b.consecutive_failures),
            panic_recovery: file.breaker.panic_recovery.unwrap_or(b.panic_recovery),
        };
        if breaker.threshold == 0 || breaker.half_open_successes == 0 {
            return Err(ConfigError::Invalid {
                key: "breaker",
                reason: "threshold and half_open_successes must be greater than zero".to_string(),
            });
        }

        let mut tuner_slots = file.engine.tuner_slots.unwrap_or_else(|| vec![0]);
        let mut seen = std::collections::HashSet::new();
        tuner_slots.retain(|slot| seen.insert(*slot));

        Ok(Self {
            listen,
            database,
            memory_store: args.memory_store,
            tuner_slots,
            limits,
            lease_ttl: positive_secs("leases.lease_ttl_secs", file.leases.lease_ttl_secs.unwrap_or(30))?,
            idempotency_ttl: positive_secs(
                "leases.idempotency_ttl_secs",
                file.leases.idempotency_ttl_secs.unwrap_or(300),
            )?,
            breaker,
            server_caps: ServerCapabilities {
                hw_accel_available: file.playback.hw_accel.unwrap_or(false),
                hw_codecs: file.playback.hw_codecs.unwrap_or_default(),
            },
            api_token: file.server.api_token.filter(|t| !t.trim().is_empty()),
            metrics_interval_secs: file.server.metrics_interval_secs.unwrap_or(0),
            log_dir: args
                .log_dir
                .or_else(|| file.logging.log_dir.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            log_retention_days: args
                .log_retention_days
                .or(file.logging.retention_days)
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            log_level: file.logging.level,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> ConfigFile {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::merge(Args::default(), ConfigFile::default()).unwrap();
        assert_eq!(config.listen.to_string(), DEFAULT_LISTEN);
        assert_eq!(config.tuner_slots, vec![0]);
        assert_eq!(config.limits, AdmissionLimits::default());
        assert_eq!(config.lease_ttl, Duration::from_secs(30));
        assert_eq!(config.idempotency_ttl, Duration::from_secs(300));
        assert_eq!(config.breaker, BreakerConfig::default());
        assert_eq!(config.database, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn test_file_values() {
        let file = parse(
            r#"
            [server]
            listen = "127.0.0.1:9000"
            api_token = "secret"

            [engine]
            enabled = false
            tuner_slots = [2, 0, 2]

            [limits]
            max_sessions = 4

            [breaker]
            consecutive_failures = 3
            reset_timeout_secs = 10

            [playback]
            hw_accel = true
            hw_codecs = ["hevc"]
            "#,
        );
        let config = GatewayConfig::merge(Args::default(), file).unwrap();
        assert_eq!(config.listen.to_string(), "127.0.0.1:9000");
        assert!(!config.limits.engine_enabled);
        assert_eq!(config.limits.max_sessions, 4);
        assert_eq!(config.tuner_slots, vec![2, 0]);
        assert_eq!(config.breaker.consecutive_failures, 3);
        assert_eq!(config.breaker.reset_timeout, Duration::from_secs(10));
        assert!(config.server_caps.hw_accel_available);
        assert_eq!(config.api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_command_line_wins() {
        let args = Args::try_parse_from([
            "xg2g-gateway",
            "--listen",
            "127.0.0.1:7000",
            "--database",
            "cli.db",
            "--log-retention-days",
            "3",
        ])
        .unwrap();
        let file = parse(
            r#"
            [server]
            listen = "127.0.0.1:9000"
            [database]
            path = "file.db"
            [logging]
            retention_days = 30
            "#,
        );
        let config = GatewayConfig::merge(args, file).unwrap();
        assert_eq!(config.listen.to_string(), "127.0.0.1:7000");
        assert_eq!(config.database, PathBuf::from("cli.db"));
        assert_eq!(config.log_retention_days, 3);
    }

    #[test]
    fn test_empty_tuner_list_is_legal() {
        let config = GatewayConfig::merge(Args::default(), parse("[engine]\ntuner_slots = []")).unwrap();
        assert!(config.tuner_slots.is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let zero_ttl = GatewayConfig::merge(Args::default(), parse("[leases]\nlease_ttl_secs = 0"));
        assert!(matches!(
            zero_ttl,
            Err(ConfigError::Invalid { key: "leases.lease_ttl_secs", .. })
        ));

        let zero_window = GatewayConfig::merge(Args::default(), parse("[breaker]\nwindow_secs = 0"));
        assert!(matches!(zero_window, Err(ConfigError::Invalid { .. })));

        let bad_listen = GatewayConfig::merge(Args::default(), parse("[server]\nlisten = \"nope\""));
        assert!(matches!(bad_listen, Err(ConfigError::InvalidListen(_))));

        assert!(toml::from_str::<ConfigFile>("[unknown]\nx = 1").is_err());
    }

    #[test]
    fn test_load_config_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.toml");
        std::fs::write(&path, "[limits]\nmax_transcodes = 1\n").unwrap();

        let args = Args {
            config: Some(path),
            ..Default::default()
        };
        let config = GatewayConfig::load(args).unwrap();
        assert_eq!(config.limits.max_transcodes, 1);

        let missing = Args {
            config: Some(dir.path().join("missing.toml")),
            ..Default::default()
        };
        assert!(matches!(GatewayConfig::load(missing), Err(ConfigError::Io { .. })));
    }
}
