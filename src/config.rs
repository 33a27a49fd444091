//! Server Configuration
//!
//! Settings are layered: built-in defaults, then environment variables, then
//! command-line flags.
//!
//! | Setting          | Flag                  | Environment             | Default     |
//! |------------------|-----------------------|-------------------------|-------------|
//! | bind host        | `--host`, `-h`        |                         | `127.0.0.1` |
//! | bind port        | `--port`, `-p`        |                         | `7379`      |
//! | snapshot file    | `--snapshot-file`     | `TREAPKV_SNAPSHOT_FILE` | none        |
//! | SQLite database  | `--database`          | `TREAPKV_DATABASE`      | none        |
//! | sweep interval   | `--sweep-interval`    | `TREAPKV_SWEEP_SECS`    | 60 seconds  |
//! | log level        | `--log-level`         |                         | `info`      |

use crate::persistence::{FileStore, Persistence, PersistenceResult, SqlStore};
use crate::storage::ExpiryConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_SNAPSHOT_FILE: &str = "TREAPKV_SNAPSHOT_FILE";
pub const ENV_DATABASE: &str = "TREAPKV_DATABASE";
pub const ENV_SWEEP_SECS: &str = "TREAPKV_SWEEP_SECS";

/// Default time between expiry sweeps (and periodic snapshots)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Errors from parsing configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// JSON snapshot file, if file persistence is enabled
    pub snapshot_file: Option<PathBuf>,
    /// SQLite database, if SQL persistence is enabled
    pub database: Option<PathBuf>,
    /// Time between expiry sweeps
    pub sweep_interval: Duration,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot_file: None,
            database: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            log_level: "info".to_string(),
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Serve(Config),
    Help,
    Version,
}

impl Config {
    /// Builds the configuration from the process environment and arguments.
    pub fn load() -> Result<Invocation, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        config.apply_args(std::env::args().skip(1))
    }

    /// Applies environment overrides, looking variables up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(path) = var(ENV_SNAPSHOT_FILE).filter(|v| !v.is_empty()) {
            self.snapshot_file = Some(PathBuf::from(path));
        }
        if let Some(path) = var(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database = Some(PathBuf::from(path));
        }
        if let Some(secs) = var(ENV_SWEEP_SECS) {
            self.sweep_interval = parse_interval(ENV_SWEEP_SECS, &secs)?;
        }
        Ok(())
    }

    /// Applies command-line flags (without the program name).
    pub fn apply_args<I>(mut self, args: I) -> Result<Invocation, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| args.next().ok_or_else(|| ConfigError::MissingValue(flag.to_string()));

            match arg.as_str() {
                "--host" | "-h" => self.host = value(&arg)?,
                "--port" | "-p" => {
                    let raw = value(&arg)?;
                    self.port = raw.parse().map_err(|_| ConfigError::InvalidValue {
                        flag: arg.clone(),
                        value: raw,
                    })?;
                }
                "--snapshot-file" => self.snapshot_file = Some(PathBuf::from(value(&arg)?)),
                "--database" => self.database = Some(PathBuf::from(value(&arg)?)),
                "--sweep-interval" => {
                    let raw = value(&arg)?;
                    self.sweep_interval = parse_interval(&arg, &raw)?;
                }
                "--log-level" => self.log_level = value(&arg)?,
                "--help" => return Ok(Invocation::Help),
                "--version" | "-v" => return Ok(Invocation::Version),
                other => return Err(ConfigError::UnknownArgument(other.to_string())),
            }
        }

        Ok(Invocation::Serve(self))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn expiry(&self) -> ExpiryConfig {
        ExpiryConfig {
            interval: self.sweep_interval,
        }
    }

    /// Opens every configured snapshot store.
    pub fn persistence(&self) -> PersistenceResult<Persistence> {
        let mut persistence = Persistence::new();
        if let Some(path) = &self.snapshot_file {
            persistence = persistence.with_store(FileStore::new(path));
        }
        if let Some(path) = &self.database {
            persistence = persistence.with_store(SqlStore::open(path)?);
        }
        Ok(persistence)
    }
}

fn parse_interval(flag: &str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            flag: flag.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Usage text for `--help`.
pub fn help_text() -> String {
    format!(
        r#"
TreapKV - An In-Memory Key-Value Store with Positional Arrays

USAGE:
    treapkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>              Host to bind to (default: {host})
    -p, --port <PORT>              Port to listen on (default: {port})
        --snapshot-file <PATH>     Write JSON snapshots to PATH [env: {file}]
        --database <PATH>          Write snapshots to an SQLite database [env: {db}]
        --sweep-interval <SECS>    Seconds between expiry sweeps (default: 60) [env: {sweep}]
        --log-level <LEVEL>        Log level when RUST_LOG is unset (default: info)
    -v, --version                  Print version information
        --help                     Print this help message

EXAMPLES:
    treapkv                                  # Start on {host}:{port}, memory only
    treapkv --snapshot-file data/kv.json     # Snapshot to a JSON file
    treapkv --database data/kv.db            # Snapshot to SQLite

PROTOCOL:
    One JSON object per line:
    $ nc {host} {port}
    {{"command": "RPUSH", "key": "queue", "args": [1, "two"]}}
    {{"status":true,"value":2}}
"#,
        host = DEFAULT_HOST,
        port = DEFAULT_PORT,
        file = ENV_SNAPSHOT_FILE,
        db = ENV_DATABASE,
        sweep = ENV_SWEEP_SECS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn serve(invocation: Invocation) -> Config {
        match invocation {
            Invocation::Serve(config) => config,
            other => panic!("expected Serve, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = serve(Config::default().apply_args(args(&[])).unwrap());
        assert_eq!(config.bind_address(), "127.0.0.1:7379");
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert!(config.snapshot_file.is_none());
        assert!(config.database.is_none());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_flags() {
        let config = serve(
            Config::default()
                .apply_args(args(&[
                    "--host",
                    "0.0.0.0",
                    "-p",
                    "9000",
                    "--snapshot-file",
                    "/tmp/kv.json",
                    "--database",
                    "/tmp/kv.db",
                    "--sweep-interval",
                    "5",
                    "--log-level",
                    "debug",
                ]))
                .unwrap(),
        );

        assert_eq!(config.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.snapshot_file, Some(PathBuf::from("/tmp/kv.json")));
        assert_eq!(config.database, Some(PathBuf::from("/tmp/kv.db")));
        assert_eq!(config.expiry().interval, Duration::from_secs(5));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(
            Config::default().apply_args(args(&["--help"])).unwrap(),
            Invocation::Help
        );
        assert_eq!(
            Config::default().apply_args(args(&["-v"])).unwrap(),
            Invocation::Version
        );
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(
            Config::default().apply_args(args(&["--port"])),
            Err(ConfigError::MissingValue("--port".into()))
        );
        assert!(matches!(
            Config::default().apply_args(args(&["--port", "99999"])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::default().apply_args(args(&["--sweep-interval", "0"])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            Config::default().apply_args(args(&["--bogus"])),
            Err(ConfigError::UnknownArgument("--bogus".into()))
        );
    }

    #[test]
    fn test_env_then_flags() {
        let env: HashMap<&str, &str> = [
            (ENV_SNAPSHOT_FILE, "env.json"),
            (ENV_DATABASE, "env.db"),
            (ENV_SWEEP_SECS, "30"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(30));

        // Flags win over the environment
        let config = serve(config.apply_args(args(&["--database", "flag.db"])).unwrap());
        assert_eq!(config.snapshot_file, Some(PathBuf::from("env.json")));
        assert_eq!(config.database, Some(PathBuf::from("flag.db")));
    }

    #[test]
    fn test_invalid_env_interval() {
        let mut config = Config::default();
        let result = config.apply_env(|name| (name == ENV_SWEEP_SECS).then(|| "soon".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_persistence_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            snapshot_file: Some(dir.path().join("kv.json")),
            database: Some(dir.path().join("kv.db")),
            ..Config::default()
        };
        assert_eq!(config.persistence().unwrap().store_count(), 2);
        assert!(!Config::default().persistence().unwrap().is_enabled());
    }
}
