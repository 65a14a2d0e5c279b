//! `probe` command: exercise the pool against the live backend

use crate::config::settings::EdgeConfig;
use crate::rpc::{CallError, Pool, RpcClient, TcpConnector};
use anyhow::{Context, Result};
use clap::Args;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Concurrent workers
    #[arg(long, default_value = "8")]
    pub workers: usize,

    /// Calls per worker
    #[arg(long, default_value = "100")]
    pub iterations: usize,

    /// How long each call holds its connection, in milliseconds
    #[arg(long, default_value = "0")]
    pub hold_ms: u64,
}

/// Outcome counts of one probe run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub ok: usize,
    pub failed: usize,
}

impl ProbeArgs {
    /// Run the probe and print the final pool status as JSON
    pub async fn start(&self, config: &EdgeConfig) -> Result<()> {
        let connector = TcpConnector::new(
            config.rpcserver.addr.clone(),
            config.rpcserver.connect_timeout(),
        );
        let pool = Pool::new(connector, config.pool.to_options())
            .await
            .with_context(|| format!("Failed to open RPC pool to {}", config.rpcserver.addr))?;
        let client = RpcClient::new(pool.clone(), config.pool.acquire_timeout());

        info!(
            "🔍 Probing {} with {} workers x {} calls",
            config.rpcserver.addr, self.workers, self.iterations
        );
        let report = self.drive(&client).await?;
        info!("✅ Probe finished: {} ok, {} failed", report.ok, report.failed);

        let status = pool.status();
        println!(
            "{}",
            serde_json::to_string_pretty(&status).context("Failed to serialize pool status")?
        );

        pool.close();
        Ok(())
    }

    /// Issue `workers * iterations` calls through `client`
    ///
    /// Each call waits for the connection to be writable, which fails once
    /// the backend has hung up.
    pub async fn drive(&self, client: &RpcClient<TcpConnector>) -> Result<ProbeReport> {
        let hold = Duration::from_millis(self.hold_ms);
        let mut handles = Vec::with_capacity(self.workers);

        for worker in 0..self.workers {
            let client = client.clone();
            let iterations = self.iterations;

            handles.push(tokio::spawn(async move {
                let mut report = ProbeReport::default();

                for i in 0..iterations {
                    let uuid = format!("probe-{}-{}", worker, i);
                    let result = client
                        .call(&uuid, |conn| {
                            Box::pin(async move {
                                conn.stream().writable().await?;
                                if !hold.is_zero() {
                                    tokio::time::sleep(hold).await;
                                }
                                Ok::<_, CallError>(())
                            })
                        })
                        .await;

                    match result {
                        Ok(()) => report.ok += 1,
                        Err(e) => {
                            debug!("{} -- probe call failed: {}", uuid, e);
                            report.failed += 1;
                        }
                    }
                }

                report
            }));
        }

        let mut total = ProbeReport::default();
        for handle in handles {
            match handle.await {
                Ok(report) => {
                    total.ok += report.ok;
                    total.failed += report.failed;
                }
                Err(e) => warn!("Probe worker panicked: {}", e),
            }
        }

        Ok(total)
    }
}
