//! Flow Statistics Synchronization Daemon
//!
//! Main entry point for the flowstatsyncd daemon.
//! Polls OpenFlow switches for flow/port counters and expires idle rules.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-3: Content of Audit Records - Structured logging
//! - AU-12: Audit Record Generation - Log daemon lifecycle
//! - CP-10: System Recovery - Cache image restore on startup
//! - SI-4: System Monitoring - Periodic flow telemetry collection

use async_trait::async_trait;
use clap::Parser;
use fsfw_flowstatsyncd::config::{self, FlowstatConfig};
use fsfw_flowstatsyncd::{persist, FlowStatCache, FlowStatError, Result, StatsPoller};
use fsfw_openflow::{
    DatapathId, FlowStatsEntry, FlowStatsRequest, PortStatsEntry, PortStatsRequest,
    StatsQueryError, SwitchStatsClient,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// FlowSpace Firewall Flow Statistics Daemon
#[derive(Parser, Debug)]
#[command(name = "flowstatsyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the daemon configuration file
    #[arg(short = 'c', long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the cache image path from the configuration file
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

/// Stats client used when no controller connection is wired in.
///
/// The daemon binary runs the poll loop against an empty switch set; the
/// policy layer embeds [`StatsPoller`] as a library and supplies the client
/// backed by its live switch connections.
struct DisconnectedClient;

#[async_trait]
impl SwitchStatsClient for DisconnectedClient {
    fn switches(&self) -> Vec<DatapathId> {
        Vec::new()
    }

    async fn flow_stats(
        &self,
        dpid: DatapathId,
        _request: FlowStatsRequest,
    ) -> std::result::Result<Vec<FlowStatsEntry>, StatsQueryError> {
        Err(StatsQueryError::NotConnected(dpid))
    }

    async fn port_stats(
        &self,
        dpid: DatapathId,
        _request: PortStatsRequest,
    ) -> std::result::Result<Vec<PortStatsEntry>, StatsQueryError> {
        Err(StatsQueryError::NotConnected(dpid))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    // NIST: AU-3, AU-12 - Audit logging setup
    init_logging(&args.log_level)?;

    info!("flowstatsyncd: Starting flow statistics daemon");

    match run_daemon(args).await {
        Ok(()) => {
            info!("flowstatsyncd: Daemon exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "flowstatsyncd: Daemon exiting with error");
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}

/// Initialize structured logging
///
/// # NIST Controls
/// - AU-3: Content of Audit Records - Structured format
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| FlowStatError::Configuration(format!("Invalid log level: {}", e)))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| FlowStatError::Configuration(format!("Failed to set logger: {}", e)))?;

    Ok(())
}

/// Main daemon loop
///
/// # NIST Controls
/// - CP-10: System Recovery - Warm start from the persisted image
/// - SI-4: System Monitoring - Poll loop
async fn run_daemon(args: Args) -> Result<()> {
    let mut config = FlowstatConfig::load_or_default(&args.config)?;
    if let Some(cache_file) = args.cache_file {
        config.persistence.cache_file = cache_file;
    }
    config.validate()?;
    info!(
        interval_secs = config.polling.poll_interval_secs,
        cache_file = %config.persistence.cache_file.display(),
        "flowstatsyncd: Configuration loaded"
    );

    // Setup signal handlers for graceful shutdown
    // NIST: AU-12 - Log shutdown events
    let shutdown = setup_signal_handlers();

    let cache = Arc::new(FlowStatCache::new());

    // Warm start from the last persisted image when one exists. A corrupt
    // image is logged and discarded; polling rebuilds the cache.
    match persist::load(&config.persistence.cache_file) {
        Ok(Some(image)) => {
            info!(
                switches = image.switches.len(),
                saved_at = %image.saved_at,
                "flowstatsyncd: Restored cache image"
            );
            cache.restore(image);
        }
        Ok(None) => {
            info!("flowstatsyncd: No cache image found, starting cold");
        }
        Err(e) => {
            warn!(error = %e, "flowstatsyncd: Ignoring unreadable cache image, starting cold");
        }
    }

    let client: Arc<dyn SwitchStatsClient> = Arc::new(DisconnectedClient);
    let mut poller = StatsPoller::new(config, client, cache);
    poller.run(shutdown).await;

    info!("flowstatsyncd: Graceful shutdown complete");
    Ok(())
}

/// Setup signal handlers for graceful shutdown
///
/// # NIST Controls
/// - AU-12: Audit Record Generation - Log shutdown signals
fn setup_signal_handlers() -> Arc<AtomicBool> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("flowstatsyncd: Received SIGINT/SIGTERM");
            shutdown_flag_clone.store(true, Ordering::Relaxed);
        }
    });

    shutdown_flag
}
