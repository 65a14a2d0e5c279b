//! Configuration loading

pub mod settings;

pub use settings::{EdgeConfig, LogConfig, PoolConfig, RpcServerConfig, RuntimeConfig, DEFAULT_CONFIG_PATH};
