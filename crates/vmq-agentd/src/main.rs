use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::{info, warn};

use vmq_core::prelude::{
    CommandBatchPlugin, CommandCloudProvider, ControlLoop, InstanceStateStore, LoopSettings,
    ShutdownCoordinator,
};
use vmq_model::{ResolvedConfig, defaults};
use vmq_observe::{LoggerConfig, LoggerFormat, LoggerLevel, init_logger};

/// Elastic batch-farm controller daemon.
#[derive(Debug, Parser)]
#[command(name = "vmq-agentd", version, about)]
struct Args {
    /// Path to the daemon configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Path of the owned-instances state file.
    #[arg(long)]
    statefile: PathBuf,

    /// Directory to append a plain-text log file into.
    #[arg(long)]
    logdir: Option<PathBuf>,

    /// Log level filter (e.g. "info", "vmq_core=debug,info").
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: text, json or journald.
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1) logger
    let mut logger = LoggerConfig {
        level: match &args.log_level {
            Some(l) => LoggerLevel::new(l.as_str())?,
            None => LoggerLevel::default(),
        },
        ..Default::default()
    };
    if let Some(fmt) = &args.log_format {
        logger.format = fmt.parse::<LoggerFormat>()?;
    }
    if let Some(dir) = &args.logdir {
        std::fs::create_dir_all(dir)?;
        logger.file = Some(dir.join("vmq-agentd.log"));
    }
    init_logger(&logger)?;
    info!("logger initialized");

    // 2) configuration
    let cfg = ResolvedConfig::load(&defaults(), &args.config);
    if !cfg.fully_loaded() {
        warn!(path = %args.config.display(), "configuration not fully loaded, running on defaults");
    }
    let settings = LoopSettings::from_config(&cfg);

    // 3) owned-instances state
    let store = InstanceStateStore::open(&args.statefile)?;

    // 4) shutdown on SIGTERM / SIGINT
    let shutdown = ShutdownCoordinator::new();
    spawn_signal_listener(shutdown.clone())?;

    // 5) plugins
    let cancel = shutdown.token();
    let batch = Arc::new(CommandBatchPlugin::from_config(&cfg, cancel.clone()));
    let cloud = Arc::new(CommandCloudProvider::from_config(&cfg, cancel));

    // 6) control loop, runs until a stop is requested
    ControlLoop::new(settings, batch, cloud, store, shutdown)
        .run()
        .await?;
    Ok(())
}

fn spawn_signal_listener(shutdown: ShutdownCoordinator) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        shutdown.request_stop();
    });
    Ok(())
}
