//! Server Configuration
//!
//! Command-line flags for the `ttlkv` binary. Parsing is kept free of
//! process side effects (no printing, no exiting) so it can be tested;
//! `main.rs` decides what to do with the result.

use crate::service::{ReaperConfig, ServiceConfig, DEFAULT_REAP_INTERVAL, DEFAULT_TTL_SECS};
use crate::storage::{MemoryStorage, SqliteStorage, Storage, StorageResult};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DB_PATH: &str = "ttlkv.db";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Which [`Storage`] implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Sqlite,
}

impl std::str::FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            _ => Err(()),
        }
    }
}

/// Result of parsing the command line.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    Run(Config),
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Seconds applied to `SET` without a TTL
    pub default_ttl: u64,
    pub reap_interval: Duration,
    pub auto_remove_expired: bool,
    pub backend: BackendKind,
    /// Database file for the sqlite backend
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            default_ttl: DEFAULT_TTL_SECS,
            reap_interval: DEFAULT_REAP_INTERVAL,
            auto_remove_expired: false,
            backend: BackendKind::Memory,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl Config {
    /// Parses flags, excluding the program name.
    pub fn from_args<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(flag) = args.next() {
            match flag.as_str() {
                "--host" | "-h" => config.host = value_for(&flag, &mut args)?,
                "--port" | "-p" => config.port = parsed_value(&flag, &mut args)?,
                "--default-ttl" => {
                    config.default_ttl = parsed_value(&flag, &mut args)?;
                    if config.default_ttl == 0 {
                        return Err(invalid(&flag, "0"));
                    }
                }
                "--reap-interval-ms" => {
                    let ms: u64 = parsed_value(&flag, &mut args)?;
                    if ms == 0 {
                        return Err(invalid(&flag, "0"));
                    }
                    config.reap_interval = Duration::from_millis(ms);
                }
                "--auto-remove-expired" => config.auto_remove_expired = true,
                "--backend" => config.backend = parsed_value(&flag, &mut args)?,
                "--db-path" => config.db_path = PathBuf::from(value_for(&flag, &mut args)?),
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(flag)),
            }
        }

        Ok(CliAction::Run(config))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            default_ttl: self.default_ttl,
            auto_remove_expired: self.auto_remove_expired,
        }
    }

    pub fn reaper_config(&self) -> ReaperConfig {
        ReaperConfig {
            interval: self.reap_interval,
        }
    }

    /// Opens the configured backend.
    pub fn open_storage(&self) -> StorageResult<Box<dyn Storage>> {
        Ok(match self.backend {
            BackendKind::Memory => Box::new(MemoryStorage::new()),
            BackendKind::Sqlite => Box::new(SqliteStorage::open(&self.db_path)?),
        })
    }
}

fn value_for(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String, ConfigError> {
    args.next()
        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parsed_value<T: std::str::FromStr>(
    flag: &str,
    args: &mut impl Iterator<Item = String>,
) -> Result<T, ConfigError> {
    let value = value_for(flag, args)?;
    value.parse().map_err(|_| invalid(flag, &value))
}

fn invalid(flag: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    }
}

pub fn help_text() -> String {
    format!(
        r#"
TtlKV - A key-value store where every entry expires

USAGE:
    ttlkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (default: {host})
    -p, --port <PORT>              Port to listen on (default: {port})
        --default-ttl <SECS>       TTL for SET without one (default: {ttl})
        --reap-interval-ms <MS>    Delay between eviction passes (default: {reap})
        --auto-remove-expired      Delete expired entries when a read finds them
        --backend <memory|sqlite>  Storage backend (default: memory)
        --db-path <PATH>           Database file for sqlite (default: {db})
    -v, --version                  Print version information
        --help                     Print this help message

CONNECTING:
    $ redis-cli -p {port}
    127.0.0.1:{port}> SET session abc 60
    OK
    127.0.0.1:{port}> GET session
    "abc"
"#,
        host = crate::DEFAULT_HOST,
        port = crate::DEFAULT_PORT,
        ttl = DEFAULT_TTL_SECS,
        reap = DEFAULT_REAP_INTERVAL.as_millis(),
        db = DEFAULT_DB_PATH,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliAction, ConfigError> {
        Config::from_args(args.iter().map(|s| s.to_string()))
    }

    fn run_config(args: &[&str]) -> Config {
        match parse(args).unwrap() {
            CliAction::Run(config) => config,
            other => panic!("expected a run config, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = run_config(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_address(), "127.0.0.1:6380");
        assert_eq!(config.default_ttl, 120);
        assert_eq!(config.reap_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_all_flags() {
        let config = run_config(&[
            "--host",
            "0.0.0.0",
            "-p",
            "7000",
            "--default-ttl",
            "30",
            "--reap-interval-ms",
            "250",
            "--auto-remove-expired",
            "--backend",
            "SQLite",
            "--db-path",
            "/tmp/kv.db",
        ]);

        assert_eq!(config.bind_address(), "0.0.0.0:7000");
        assert_eq!(config.default_ttl, 30);
        assert_eq!(config.reaper_config().interval, Duration::from_millis(250));
        assert!(config.service_config().auto_remove_expired);
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.db_path, PathBuf::from("/tmp/kv.db"));
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["--help"]).unwrap(), CliAction::Help);
        assert_eq!(parse(&["-v"]).unwrap(), CliAction::Version);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse(&["--port"]),
            Err(ConfigError::MissingValue("--port".to_string()))
        );
        assert!(matches!(
            parse(&["--port", "lots"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse(&["--default-ttl", "-5"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse(&["--reap-interval-ms", "0"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse(&["--backend", "redis"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            parse(&["--verbose"]),
            Err(ConfigError::UnknownArgument("--verbose".to_string()))
        );
    }

    #[test]
    fn test_open_memory_storage() {
        let storage = run_config(&[]).open_storage().unwrap();
        assert!(storage.is_empty().unwrap());
    }
}
