//! Configuration management for the publisher agent.
//!
//! Loads configuration from a TOML file, with per-field
//! `#[serde(default = "...")]` fallbacks so a config file only needs to
//! specify what it wants to override.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub destinations: HashMap<String, DestinationConfig>,
    pub log: LogConfig,
    pub daemon: DaemonConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier.
    pub id: String,

    /// HTTP/WebSocket server port for the local health/introspection surface.
    pub port: u16,

    /// Workspace root where archives are staged and extracted.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// URL of the external job queue/orchestrator this worker dials out to.
    pub url: String,

    /// Opaque pre-shared token. Signature verification is out of scope for
    /// this worker - the queue is trusted transport, not an auth boundary.
    pub token: String,

    /// Queue-assigned ID for this worker, set during deployment.
    #[serde(default)]
    pub server_id: Option<String>,
}

/// One named remote destination a publish job can target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationConfig {
    Ftp(FtpDestinationConfig),
    Ftps(FtpDestinationConfig),
    Sftp(SftpDestinationConfig),
    LiveHosting(LiveHostingDestinationConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpDestinationConfig {
    pub host: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub basedir: String,
    #[serde(default = "default_permission_map")]
    pub permission_map: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftpDestinationConfig {
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default)]
    pub basedir: String,
    #[serde(default = "default_permission_map")]
    pub permission_map: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveHostingDestinationConfig {
    pub host: String,
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    pub username: String,
    pub private_key_path: PathBuf,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default)]
    pub basedir: String,
    pub live_domain: String,
    /// CNAME symlink pointing at `live_domain`. Left unset, no CNAME is
    /// managed and only the live-hosting folder itself is kept in sync.
    #[serde(default)]
    pub live_cname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output (journald, file, stdout).
    #[serde(default = "default_log_output")]
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// PID file location.
    pub pid_file: PathBuf,

    /// User to run as.
    #[serde(default = "default_user")]
    pub user: String,

    /// Group to run as.
    #[serde(default = "default_group")]
    pub group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum concurrent publish jobs.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Number of I/O worker threads.
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,
}

fn default_ftp_port() -> u16 {
    21
}

fn default_sftp_port() -> u16 {
    22
}

fn default_permission_map() -> HashMap<String, String> {
    HashMap::from([
        ("r".to_string(), "644".to_string()),
        ("w".to_string(), "664".to_string()),
        ("c".to_string(), "664".to_string()),
    ])
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_output() -> String {
    "stdout".to_string()
}

fn default_user() -> String {
    "publisher".to_string()
}

fn default_group() -> String {
    "publisher".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_io_threads() -> usize {
    4
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Create a default configuration.
    pub fn default() -> Self {
        Config {
            agent: AgentConfig {
                id: hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "publisher-agent-01".to_string()),
                port: 9990,
                data_dir: PathBuf::from("/var/lib/publisher-agent"),
            },
            queue: QueueConfig {
                url: "http://localhost:3000".to_string(),
                token: String::new(),
                server_id: None,
            },
            destinations: HashMap::new(),
            log: LogConfig {
                level: default_log_level(),
                output: default_log_output(),
            },
            daemon: DaemonConfig {
                pid_file: PathBuf::from("/var/run/publisher-agent.pid"),
                user: default_user(),
                group: default_group(),
            },
            performance: PerformanceConfig {
                max_concurrent_jobs: default_max_concurrent_jobs(),
                io_threads: default_io_threads(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_destination_table_from_toml() {
        let toml_str = r#"
            [agent]
            id = "worker-1"
            port = 9990
            data_dir = "/var/lib/publisher-agent"

            [queue]
            url = "http://queue.internal"
            token = "secret"

            [destinations.main]
            kind = "ftp"
            host = "ftp.example.com"
            username = "site"
            password = "hunter2"

            [log]
            [daemon]
            pid_file = "/var/run/publisher-agent.pid"
            [performance]
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.destinations.len(), 1);
        match &config.destinations["main"] {
            DestinationConfig::Ftp(ftp) => assert_eq!(ftp.port, 21),
            _ => panic!("expected ftp destination"),
        }
    }
}
