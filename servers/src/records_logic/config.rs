use anyhow::{Context, Result, bail};
use clap::Parser;
use lib_common::api::{BasicCredentials, EncoderOptions};
use lib_common::records::{HandoffPolicy, PipelineConfig, ScanMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "server_records.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Records HTTP server with streaming substring search", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "RECORDS_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "RECORDS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RECORDS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(
        long,
        env = "RECORDS_LOG_LEVEL",
        help = "Logging level (trace, debug, info, warn, error).",
    )]
    pub log_level: Option<String>,

    #[clap(long, env = "RECORDS_AUTH_USER", help = "HTTP Basic auth user.")]
    pub auth_user: Option<String>,

    #[clap(long, env = "RECORDS_AUTH_PASSWORD", help = "HTTP Basic auth password.")]
    pub auth_password: Option<String>,

    #[clap(
        long,
        env = "RECORDS_HANDOFF_POLICY",
        help = "Search hand-off policy: `drop` (give up after the timeout) or `block`.",
    )]
    pub handoff_policy: Option<String>,

    #[clap(
        long,
        env = "RECORDS_HANDOFF_TIMEOUT_MS",
        help = "Per-item search hand-off timeout in milliseconds (drop policy).",
    )]
    pub handoff_timeout_ms: Option<u64>,

    #[clap(
        long,
        env = "RECORDS_SCAN_MODE",
        help = "Search scan mode: `locked` (hold the store lock) or `snapshot`.",
    )]
    pub scan_mode: Option<String>,

    #[clap(long, env = "RECORDS_STORE_BUFFER", help = "Capacity of the store to relay channel.")]
    pub store_buffer: Option<usize>,

    #[clap(long, env = "RECORDS_RELAY_BUFFER", help = "Capacity of the relay to encoder channel.")]
    pub relay_buffer: Option<usize>,

    #[clap(
        long,
        env = "RECORDS_STRICT_TRUNCATION",
        help = "Leave the search array unterminated when results were truncated.",
    )]
    pub strict_truncation: Option<bool>,

    #[clap(
        long,
        env = "RECORDS_SHUTDOWN_GRACE_SECS",
        help = "Seconds to wait for in-flight requests on shutdown.",
    )]
    pub shutdown_grace_secs: Option<u64>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub credentials: BasicCredentials,
    pub pipeline: PipelineConfig,
    pub encoder: EncoderOptions,
    pub shutdown_grace: Duration,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            auth_user: other.auth_user.or(self.auth_user),
            auth_password: other.auth_password.or(self.auth_password),
            handoff_policy: other.handoff_policy.or(self.handoff_policy),
            handoff_timeout_ms: other.handoff_timeout_ms.or(self.handoff_timeout_ms),
            scan_mode: other.scan_mode.or(self.scan_mode),
            store_buffer: other.store_buffer.or(self.store_buffer),
            relay_buffer: other.relay_buffer.or(self.relay_buffer),
            strict_truncation: other.strict_truncation.or(self.strict_truncation),
            shutdown_grace_secs: other.shutdown_grace_secs.or(self.shutdown_grace_secs),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(8080),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            auth_user: Some("admin".to_string()),
            auth_password: Some("admin".to_string()),
            handoff_policy: Some("drop".to_string()),
            handoff_timeout_ms: Some(2000),
            scan_mode: Some("locked".to_string()),
            store_buffer: Some(100),
            relay_buffer: Some(100),
            strict_truncation: Some(false),
            shutdown_grace_secs: Some(10),
            ..Default::default()
        }
    }

    fn resolve(self) -> Result<Settings> {
        let defaults = Config::defaults();
        let handoff_policy = self.handoff_policy.as_deref().unwrap_or("drop").to_lowercase();
        let handoff = match handoff_policy.as_str() {
            "drop" => {
                let ms = self.handoff_timeout_ms.or(defaults.handoff_timeout_ms).unwrap_or(2000);
                if ms == 0 {
                    bail!("handoffTimeoutMs must be greater than zero");
                }
                HandoffPolicy::DropAfterTimeout(Duration::from_millis(ms))
            }
            "block" => HandoffPolicy::BlockUntilDelivered,
            other => bail!("unknown handoffPolicy {:?} (expected `drop` or `block`)", other),
        };
        let scan_mode = self.scan_mode.as_deref().unwrap_or("locked").to_lowercase();
        let scan_mode = match scan_mode.as_str() {
            "locked" => ScanMode::HoldLock,
            "snapshot" => ScanMode::Snapshot,
            other => bail!("unknown scanMode {:?} (expected `locked` or `snapshot`)", other),
        };
        let store_capacity = self.store_buffer.or(defaults.store_buffer).unwrap_or(100);
        let relay_capacity = self.relay_buffer.or(defaults.relay_buffer).unwrap_or(100);
        if store_capacity == 0 || relay_capacity == 0 {
            bail!("storeBuffer and relayBuffer must be greater than zero");
        }

        Ok(Settings {
            port: self.port.or(defaults.port).unwrap_or(8080),
            log_dir: self.log_dir.or(defaults.log_dir).unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.or(defaults.log_level).unwrap_or_else(|| "info".to_string()),
            credentials: BasicCredentials::new(
                self.auth_user.or(defaults.auth_user).unwrap_or_default(),
                self.auth_password.or(defaults.auth_password).unwrap_or_default(),
            ),
            pipeline: PipelineConfig {
                handoff,
                scan_mode,
                store_capacity,
                relay_capacity,
            },
            encoder: EncoderOptions {
                strict_truncation: self.strict_truncation.unwrap_or(false),
            },
            shutdown_grace: Duration::from_secs(
                self.shutdown_grace_secs
                    .or(defaults.shutdown_grace_secs)
                    .unwrap_or(10),
            ),
        })
    }
}

fn read_config_file(path: &Path) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str::<Config>(&config_str)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Layers defaults, the JSON config file and CLI/environment values (in that order).
pub fn load_from(cli_args: Config) -> Result<Settings> {
    let mut current_config = Config::defaults();

    let explicit_path = cli_args.config_path.is_some();
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        current_config = current_config.merge(read_config_file(&config_file_path)?);
    } else if explicit_path {
        bail!("config file not found: {}", config_file_path.display());
    }

    current_config.merge(cli_args).resolve()
}

pub fn load_config() -> Result<Settings> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    load_from(Config::parse())
}
