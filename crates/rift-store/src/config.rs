//! Runtime configuration for the rift-store binary.
//!
//! Values come from three layers: command-line flags (with environment
//! fallbacks), an optional YAML file, then built-in defaults. Earlier layers
//! win.

use crate::imposters::StorageConfig;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_PORT: u16 = 2525;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[command(
    name = "rift-store",
    version,
    about = "Mountebank-compatible imposter and stub store"
)]
pub struct Args {
    /// Admin API port
    #[arg(long, env = "RIFT_STORE_PORT")]
    pub port: Option<u16>,

    /// Admin API bind address
    #[arg(long)]
    pub host: Option<String>,

    /// Persist imposters under this directory instead of in memory
    #[arg(long, env = "RIFT_STORE_DATADIR")]
    pub datadir: Option<PathBuf>,

    /// Accept stubs that use JavaScript injection
    #[arg(long)]
    pub allow_injection: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Settings read from the YAML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub datadir: Option<PathBuf>,
    pub allow_injection: Option<bool>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: FileConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }
}

/// Effective settings after merging every layer
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub host: String,
    pub datadir: Option<PathBuf>,
    pub allow_injection: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self::merge(Args::default(), FileConfig::default())
    }
}

impl Settings {
    /// Load the config file named by `args`, if any, and merge
    pub fn load(args: Args) -> Result<Self, anyhow::Error> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    pub fn merge(args: Args, file: FileConfig) -> Self {
        Self {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            host: args
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            datadir: args.datadir.or(file.datadir),
            allow_injection: args.allow_injection || file.allow_injection.unwrap_or(false),
            log_level: args
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: args.log_format.or(file.log_format).unwrap_or_default(),
        }
    }

    pub fn admin_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid admin address {}:{}", self.host, self.port))
    }

    pub fn storage(&self) -> StorageConfig {
        StorageConfig::from_datadir(self.datadir.clone())
    }
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// `level`; safe to call more than once.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}
