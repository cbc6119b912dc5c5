use crate::route::{Destination, DestinationSettings, RouteError, RouteTable};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the default destination, matchable from a check's handler
/// list like any other.
pub const DEFAULT_DESTINATION: &str = "influxdb";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Destination error: {0}")]
    RouteError(#[from] RouteError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Buffers monitoring-check metrics and ships them to InfluxDB")]
pub struct Config {
    /// InfluxDB hostname
    #[arg(long, env = "INFLUX_HOSTNAME")]
    pub hostname: Option<String>,

    /// InfluxDB port
    #[arg(long, env = "INFLUX_PORT", default_value = "8086")]
    pub port: u16,

    /// Target database
    #[arg(long, env = "INFLUX_DATABASE")]
    pub database: Option<String>,

    /// Write over https instead of http
    #[arg(long, env = "INFLUX_SSL")]
    pub ssl: bool,

    /// Timestamp precision (s, ms or ns)
    #[arg(long, env = "INFLUX_PRECISION", default_value = "s")]
    pub precision: String,

    /// Retention policy for writes
    #[arg(long, env = "INFLUX_RETENTION_POLICY")]
    pub retention_policy: Option<String>,

    /// Username for the write endpoint
    #[arg(long, env = "INFLUX_USERNAME")]
    pub username: Option<String>,

    /// Password for the write endpoint
    #[arg(long, env = "INFLUX_PASSWORD")]
    pub password: Option<String>,

    /// Points buffered per destination before a size-based flush
    #[arg(long, env = "BUFFER_SIZE", default_value = "100")]
    pub buffer_size: usize,

    /// Maximum buffer age in seconds before an age-based flush
    #[arg(long, env = "BUFFER_MAX_AGE", default_value = "10")]
    pub buffer_max_age: u64,

    /// Forward check output unmodified (it is already line protocol)
    #[arg(long, env = "PROXY_MODE")]
    pub proxy_mode: bool,

    /// HTTP write timeout in seconds
    #[arg(long, env = "WRITE_TIMEOUT_SECS", default_value = "30")]
    pub write_timeout_secs: u64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// TOML configuration file for multi-destination setups
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Config::parse_from(args)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Builds the route table: the default destination from CLI flags,
    /// optionally overlaid and extended by the TOML config file.
    pub fn build_route_table(&self) -> Result<RouteTable, ConfigError> {
        let cli_settings = self.destination_settings();

        let Some(path) = &self.config_file else {
            let default = Destination::from_settings(DEFAULT_DESTINATION, &cli_settings)?;
            return Ok(RouteTable::new(default, Vec::new())?);
        };

        let settings = Settings::from_file(path)?;
        let default_settings = settings.influxdb.merged_over(&cli_settings);
        let default = Destination::from_settings(DEFAULT_DESTINATION, &default_settings)?;

        // Additional destinations inherit the default's settings.
        let mut additional = Vec::with_capacity(settings.destinations.len());
        for (name, overrides) in &settings.destinations {
            let merged = overrides.merged_over(&default_settings);
            additional.push(Destination::from_settings(name, &merged)?);
        }
        Ok(RouteTable::new(default, additional)?)
    }

    fn destination_settings(&self) -> DestinationSettings {
        DestinationSettings {
            hostname: self.hostname.clone(),
            port: Some(self.port),
            database: self.database.clone(),
            ssl: Some(self.ssl),
            precision: Some(self.precision.clone()),
            retention_policy: self.retention_policy.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            buffer_size: Some(self.buffer_size),
            buffer_max_age: Some(self.buffer_max_age),
            proxy_mode: Some(self.proxy_mode),
        }
    }
}

/// TOML configuration file shape:
///
/// ```toml
/// [influxdb]
/// hostname = "influx.example.net"
/// database = "metrics"
///
/// [destinations.events]
/// database = "events"
/// buffer_size = 20
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub influxdb: DestinationSettings,
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationSettings>,
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
