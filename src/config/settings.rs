//! Edge process configuration settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;

use crate::rpc::PoolOptions;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "edge.yml";

/// Main configuration for the edge process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Logging configuration
    pub log: LogConfig,

    /// Backend RPC server
    pub rpcserver: RpcServerConfig,

    /// Connection pool sizing and timing
    pub pool: PoolConfig,

    /// Runtime configuration
    pub runtime: RuntimeConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file path; logs go to the console only when unset
    pub file: Option<String>,

    /// Filter directives, e.g. "info" or "info,ums_edge=debug"
    pub level: String,

    /// Rotated daily; files older than this many days are removed
    pub max_days: usize,
}

/// Backend RPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcServerConfig {
    /// Backend address, host:port
    pub addr: String,

    /// Dial timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened at startup and never reaped
    pub init_size: usize,

    /// Maximum live connections
    pub capacity: usize,

    /// Idle connections older than this are closed, in seconds
    pub max_idle_secs: u64,

    /// How often the reaper runs, in milliseconds
    pub reap_interval_ms: u64,

    /// How long a call waits for a connection, in milliseconds
    pub acquire_timeout_ms: u64,

    /// How long shutdown waits for checked-out connections, in seconds
    pub shutdown_grace_secs: u64,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime mode: "single_threaded" or "multi_threaded"
    pub mode: String,

    /// Number of worker threads for multi-threaded mode (None or 0 = auto-detect CPU cores)
    pub worker_threads: Option<usize>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            rpcserver: RpcServerConfig::default(),
            pool: PoolConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
            max_days: 7,
        }
    }
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:50051".to_string(),
            connect_timeout_ms: 1000,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            init_size: 2,
            capacity: 32,
            max_idle_secs: 60,
            reap_interval_ms: 1000,
            acquire_timeout_ms: 10,
            shutdown_grace_secs: 5,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: "multi_threaded".to_string(),
            worker_threads: None, // Auto-detect CPU cores
        }
    }
}

impl RpcServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl PoolConfig {
    /// Pool options for [`crate::rpc::Pool::new`]
    pub fn to_options(&self) -> PoolOptions {
        PoolOptions::new(
            self.init_size,
            self.capacity,
            Duration::from_secs(self.max_idle_secs),
        )
        .with_reap_interval(Duration::from_millis(self.reap_interval_ms))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl EdgeConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: EdgeConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load configuration with environment variable overrides
    ///
    /// An explicit `path` must exist. Without one, `edge.yml` is used when
    /// present and the defaults otherwise.
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_yaml_file(DEFAULT_CONFIG_PATH)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Override settings from `UMS_*` environment variables and `RUST_LOG`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.log.level = log_level;
        }

        if let Ok(file) = std::env::var("UMS_LOG_FILE") {
            self.log.file = Some(file);
        }

        if let Ok(addr) = std::env::var("UMS_RPC_ADDR") {
            self.rpcserver.addr = addr;
        }

        if let Ok(timeout) = std::env::var("UMS_RPC_CONNECT_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                self.rpcserver.connect_timeout_ms = timeout;
            }
        }

        if let Ok(size) = std::env::var("UMS_POOL_INIT_SIZE") {
            if let Ok(size) = size.parse() {
                self.pool.init_size = size;
            }
        }

        if let Ok(capacity) = std::env::var("UMS_POOL_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                self.pool.capacity = capacity;
            }
        }

        if let Ok(secs) = std::env::var("UMS_POOL_MAX_IDLE_SECS") {
            if let Ok(secs) = secs.parse() {
                self.pool.max_idle_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("UMS_POOL_ACQUIRE_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                self.pool.acquire_timeout_ms = timeout;
            }
        }

        if let Ok(mode) = std::env::var("UMS_RUNTIME_MODE") {
            self.runtime.mode = mode;
        }

        if let Ok(threads) = std::env::var("UMS_WORKER_THREADS") {
            if let Ok(threads) = threads.parse() {
                self.runtime.worker_threads = Some(threads);
            }
        }
    }

    /// Reject settings the pool or the connector can't work with
    pub fn validate(&self) -> Result<()> {
        self.pool
            .to_options()
            .validate()
            .context("Invalid pool configuration")?;

        if self.pool.acquire_timeout_ms == 0 {
            anyhow::bail!("pool.acquire_timeout_ms must be greater than 0");
        }

        if self.rpcserver.connect_timeout_ms == 0 {
            anyhow::bail!("rpcserver.connect_timeout_ms must be greater than 0");
        }

        if self.log.file.is_some() && self.log.max_days == 0 {
            anyhow::bail!("log.max_days must be greater than 0");
        }

        // Resolves host names too, so an unknown host fails here rather than on first dial
        self.rpcserver
            .addr
            .to_socket_addrs()
            .with_context(|| format!("Invalid rpcserver.addr: {}", self.rpcserver.addr))?;

        match self.runtime.mode.as_str() {
            "single_threaded" | "multi_threaded" => Ok(()),
            other => anyhow::bail!("Unknown runtime mode '{}'", other),
        }
    }

    /// Render the configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}
