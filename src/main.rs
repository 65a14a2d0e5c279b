//! Main entry point for the ums-edge process

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ums_edge::{
    cli::{ProbeArgs, RunArgs},
    init_logger, log_error, log_info,
    runtime::run_with_runtime,
    EdgeConfig,
};

#[derive(Parser)]
#[command(name = "ums-edge")]
#[command(about = "Edge process for the user-account service, with pooled backend RPC connections")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (defaults to edge.yml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the backend pool and serve until Ctrl-C
    #[command(name = "run")]
    Run(RunArgs),

    /// Drive concurrent calls through the pool and print its status
    #[command(name = "probe")]
    Probe(ProbeArgs),

    /// Print the effective configuration
    #[command(name = "config")]
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match EdgeConfig::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let mut log_config = config.log.clone();
    if cli.verbose {
        log_config.level = "debug".to_string();
    } else if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
    }

    // Flushes the log file on the way out
    let _log_guard = match init_logger(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(1);
        }
    };

    let runtime_config = config.runtime.clone();
    run_with_runtime(&runtime_config, async_main(cli, config))
}

async fn async_main(cli: Cli, config: EdgeConfig) -> anyhow::Result<()> {
    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            log_info!("📋 Version: {}", env!("CARGO_PKG_VERSION"));

            if let Err(e) = args.start(&config).await {
                log_error!("Failed to run edge: {:#}", e);
                return Err(e);
            }
        }
        Commands::Probe(args) => {
            args.start(&config).await?;
        }
        Commands::Config => {
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}
