//! # WiFi iBUS Bridge
//!
//! Fly a small drone from a phone over Wi-Fi.
//!
//! This application discovers a phone controller on the local network, ingests
//! its UDP control datagrams and streams them to the flight controller as iBUS
//! frames, holding failsafe values whenever the Wi-Fi link drops.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use wifi_ibus_bridge::channels::SharedChannels;
use wifi_ibus_bridge::config::{Config, LoggingConfig};
use wifi_ibus_bridge::control::ingestor::Ingestor;
use wifi_ibus_bridge::link::supervisor::{LinkSupervisor, SupervisorSettings};
use wifi_ibus_bridge::link::{PolledLinkMonitor, SysfsLinkMonitor};
use wifi_ibus_bridge::serial::IbusSerial;
use wifi_ibus_bridge::session::discovery::Discovery;
use wifi_ibus_bridge::telemetry::events::{EventJournal, LinkEvent};

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix for the rolling file appender
const LOG_FILE_PREFIX: &str = "wifi-ibus-bridge.log";

/// Main entry point for the WiFi iBUS Bridge application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, `config/default.toml`, or built-in defaults)
///    - Set up logging with tracing subscriber
///    - Open the flight controller UART
///
/// 2. **Discovery**
///    - Broadcast `DRONE|<ip>` until a phone answers `PHONE|<ip>`
///
/// 3. **Main Loop**
///    - Ingest control datagrams from the bound phone
///    - Send iBUS frames every 7 ms, substituting failsafe on link loss
///
/// 4. **Graceful Shutdown**
///    - Ctrl+C stops discovery, the ingestor and the supervisor
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(std::env::args().nth(1))?;
    let _log_guard = init_logging(&config.logging);

    info!("WiFi iBUS Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let serial = IbusSerial::open_with_paths(&[config.serial.port.as_str()], config.serial.baud_rate)?;

    // Journal writes happen on the blocking pool, off the frame loop
    let (journal, journal_writer) = if config.telemetry.enabled {
        let (handle, writer) = EventJournal::new(&config.telemetry)?.spawn();
        (Some(handle), Some(writer))
    } else {
        (None, None)
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => warn!("Cannot listen for Ctrl+C ({}), shutting down", e),
        }
        let _ = shutdown_tx.send(true);
    });

    // Discovery runs alone until a phone is bound
    let discovery = Discovery::bind(&config.network).await?;
    let Some(session) = discovery.run(&mut shutdown_rx).await? else {
        return Ok(());
    };

    if let Some(journal) = &journal {
        journal.record(LinkEvent::SessionBound {
            peer: session.peer.to_string(),
            advertised: session.advertised.to_string(),
        });
    }

    let channels = SharedChannels::default();

    let ingestor = Ingestor::new(channels.clone(), session.peer, config.network.control_channels);
    let ingest_task = tokio::spawn(ingestor.run(session.control_socket, shutdown_rx.clone()));

    let settings = SupervisorSettings {
        period: config.link.frame_period(),
        failsafe: config.failsafe.channel_set(),
        peer_timeout: config.failsafe.peer_timeout(),
        status_log_interval: config.link.status_log_interval_frames,
    };
    let monitor = PolledLinkMonitor::spawn(
        SysfsLinkMonitor::new(&config.network.interface),
        config.link.frame_period(),
        shutdown_rx.clone(),
    )
    .await;
    let mut supervisor = LinkSupervisor::new(monitor, serial, channels, settings);
    if let Some(journal) = journal {
        supervisor = supervisor.with_journal(journal);
    }
    let supervisor_task = tokio::spawn(supervisor.run(shutdown_rx));

    let (ingest, supervise) = tokio::join!(ingest_task, supervisor_task);
    ingest.context("ingestor task failed")?;
    supervise.context("supervisor task failed")?;
    if let Some(writer) = journal_writer {
        writer.await.context("journal writer failed")?;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from an explicit path, the default path, or defaults
fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("loading {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

/// Initialize stdout logging, plus a daily-rolling log file when configured
///
/// The returned guard must stay alive for buffered file output to be flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}
