//! # Link Module
//!
//! Wi-Fi association status and the supervisor that turns it into a steady
//! stream of iBUS frames.
//!
//! This module handles:
//! - Polling the wireless interface's association state
//! - Switching between live channels and the failsafe set
//! - Driving the serial frame cadence

pub mod supervisor;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

/// Association state of the wireless interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Associated with the access point
    Joined,
    /// Not associated (or state unknown)
    NotJoined,
}

/// Read-only source of link status, queried once per supervisor tick.
///
/// Implementations must answer without blocking.
#[cfg_attr(test, mockall::automock)]
pub trait LinkMonitor: Send {
    /// Current association state
    fn status(&self) -> LinkStatus;
}

/// Reader for `/sys/class/net/<iface>/operstate`
///
/// Reports `Joined` only when the kernel says the interface is `up`; `dormant`
/// (authenticating), `down`, a missing interface or an unreadable file all
/// count as `NotJoined`.
#[derive(Debug, Clone)]
pub struct SysfsLinkMonitor {
    operstate_path: PathBuf,
}

impl SysfsLinkMonitor {
    /// Monitor a network interface by name (e.g. `wlan0`)
    pub fn new(interface: &str) -> Self {
        Self::with_path(PathBuf::from("/sys/class/net").join(interface).join("operstate"))
    }

    /// Monitor an arbitrary operstate file
    pub fn with_path(operstate_path: PathBuf) -> Self {
        Self { operstate_path }
    }

    /// Read the operstate file once
    pub async fn read_status(&self) -> LinkStatus {
        match tokio::fs::read_to_string(&self.operstate_path).await {
            Ok(state) if state.trim() == "up" => LinkStatus::Joined,
            Ok(state) => {
                trace!("Interface operstate: {}", state.trim());
                LinkStatus::NotJoined
            }
            Err(e) => {
                trace!("Cannot read {}: {}", self.operstate_path.display(), e);
                LinkStatus::NotJoined
            }
        }
    }
}

/// Latest sysfs reading, refreshed by a background task so the frame loop
/// never touches the filesystem
#[derive(Debug, Clone)]
pub struct PolledLinkMonitor {
    status: watch::Receiver<LinkStatus>,
}

impl PolledLinkMonitor {
    /// Read the link state once, then re-read it every `period` until
    /// shutdown. After shutdown the last reading is kept.
    pub async fn spawn(
        source: SysfsLinkMonitor,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (tx, rx) = watch::channel(source.read_status().await);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }

                    _ = ticker.tick() => {
                        let status = source.read_status().await;
                        tx.send_if_modified(|current| {
                            let modified = *current != status;
                            *current = status;
                            modified
                        });
                    }
                }
            }
            debug!("Link status poller stopped");
        });

        Self { status: rx }
    }
}

impl LinkMonitor for PolledLinkMonitor {
    fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }
}
