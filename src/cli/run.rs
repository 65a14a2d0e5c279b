//! `run` command: keep the backend pool open until interrupted

use crate::config::settings::EdgeConfig;
use crate::logging::log_pool_status;
use crate::rpc::{Pool, TcpConnector};
use anyhow::{Context, Result};
use clap::Args;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds between pool status reports
    #[arg(long, default_value = "30")]
    pub status_interval_secs: u64,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            status_interval_secs: 30,
        }
    }
}

impl RunArgs {
    /// Build the pool from `config` and serve until Ctrl-C
    pub async fn start(&self, config: &EdgeConfig) -> Result<()> {
        info!("🚀 Starting ums-edge");
        info!("📋 Backend Configuration:");
        info!("   RPC server: {}", config.rpcserver.addr);
        info!("   Connect timeout: {}ms", config.rpcserver.connect_timeout_ms);
        info!(
            "   Pool: init {} / capacity {}",
            config.pool.init_size, config.pool.capacity
        );
        info!("   Max idle: {}s", config.pool.max_idle_secs);
        info!("   Acquire timeout: {}ms", config.pool.acquire_timeout_ms);

        let connector = TcpConnector::new(
            config.rpcserver.addr.clone(),
            config.rpcserver.connect_timeout(),
        );
        let pool = Pool::new(connector, config.pool.to_options())
            .await
            .with_context(|| format!("Failed to open RPC pool to {}", config.rpcserver.addr))?;

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.status_interval_secs.max(1)));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = pool.status();
                    info!("📊 {}", status.summary());
                    if let Err(e) = log_pool_status(&status) {
                        warn!("Failed to log pool status: {}", e);
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    info!("🛑 Shutdown requested");
                    break;
                }
            }
        }

        let grace = config.pool.shutdown_grace();
        if pool.close_graceful(grace).await {
            info!("✅ All RPC connections returned and closed");
        } else {
            warn!(
                "⚠️  {} RPC connections still checked out after {}s",
                pool.status().checked_out,
                grace.as_secs()
            );
        }

        Ok(())
    }
}
