//! # Link Supervisor
//!
//! The single driver of outbound iBUS frames. Runs at a fixed cadence whether
//! or not control data arrives, and decides on every tick whether to transmit
//! the latest live channels or the failsafe set.
//!
//! ## State Machine
//!
//! ```text
//!             link down / peer silent
//!   Linked ─────────────────────────────▶ Failsafe
//!     ▲      (overwrite with failsafe,      │
//!     │        log once)                    │ every tick: overwrite + send
//!     └─────────────────────────────────────┘
//!             link up (log once)
//! ```
//!
//! While in failsafe, a change of cause (link down vs. peer silent) is logged
//! and journaled once as well.
//!
//! Each tick is strictly sequential: read link status, optionally substitute
//! failsafe, snapshot, encode, write. A tick never starts before the previous
//! frame has been flushed.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::{LinkMonitor, LinkStatus};
use crate::channels::SharedChannels;
use crate::ibus::encoder::encode_frame;
use crate::ibus::protocol::{ChannelSet, IbusFrame};
use crate::serial::port_trait::SerialPortIO;
use crate::serial::IbusSerial;
use crate::telemetry::events::{JournalHandle, LinkEvent, LossCause};

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Transmitting live channels
    Linked,
    /// Transmitting the failsafe set
    Failsafe(LossCause),
}

/// Supervisor timing and failsafe settings
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Frame period (7 ms ≈ 143 Hz)
    pub period: Duration,
    /// Channel set to hold while the link is down
    pub failsafe: ChannelSet,
    /// Treat a bound peer silent for this long as link loss; `None` disables
    pub peer_timeout: Option<Duration>,
    /// Frames between periodic status log lines
    pub status_log_interval: u64,
}

/// Fixed-rate failsafe supervisor
pub struct LinkSupervisor<L, P> {
    monitor: L,
    serial: IbusSerial<P>,
    channels: SharedChannels,
    settings: SupervisorSettings,
    journal: Option<JournalHandle>,
    state: SupervisorState,
    started: Instant,
    frames_sent: u64,
    failsafe_frames: u64,
    write_errors: u64,
    last_log_count: u64,
}

impl<L: LinkMonitor, P: SerialPortIO> LinkSupervisor<L, P> {
    /// Create a supervisor. It starts in `Linked`; the first tick corrects that
    /// if the link is already down.
    pub fn new(
        monitor: L,
        serial: IbusSerial<P>,
        channels: SharedChannels,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            monitor,
            serial,
            channels,
            settings,
            journal: None,
            state: SupervisorState::Linked,
            started: Instant::now(),
            frames_sent: 0,
            failsafe_frames: 0,
            write_errors: 0,
            last_log_count: 0,
        }
    }

    /// Record state transitions to a link event journal
    pub fn with_journal(mut self, journal: JournalHandle) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Current state
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Frames successfully written
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Failsafe frames encoded since the supervisor started
    pub fn failsafe_frames(&self) -> u64 {
        self.failsafe_frames
    }

    /// Why live channels cannot be trusted right now, if they cannot
    fn loss_cause(&self) -> Option<LossCause> {
        if self.monitor.status() == LinkStatus::NotJoined {
            return Some(LossCause::LinkDown);
        }

        let timeout = self.settings.peer_timeout?;
        let last_heard = self.channels.last_update().unwrap_or(self.started);
        if last_heard.elapsed() > timeout {
            return Some(LossCause::PeerSilent);
        }

        None
    }

    /// Run one cycle: decide, snapshot, encode, write.
    ///
    /// Returns the frame that was handed to the serial port. A failed write is
    /// logged and counted; the next tick sends fresh data.
    pub async fn tick(&mut self) -> IbusFrame {
        let snapshot = match self.loss_cause() {
            None => {
                if let SupervisorState::Failsafe(_) = self.state {
                    info!("Link restored, resuming live channels");
                    self.record_event(LinkEvent::LinkRestored {
                        failsafe_frames: self.failsafe_frames,
                    });
                    self.state = SupervisorState::Linked;
                }
                self.channels.snapshot()
            }
            Some(cause) => {
                match self.state {
                    SupervisorState::Linked => {
                        warn!("Link lost ({:?}), holding failsafe channels", cause);
                        self.record_event(LinkEvent::LinkLost { cause });
                    }
                    SupervisorState::Failsafe(previous) if previous != cause => {
                        warn!("Failsafe cause changed from {:?} to {:?}", previous, cause);
                        self.record_event(LinkEvent::LinkLost { cause });
                    }
                    SupervisorState::Failsafe(_) => {}
                }
                self.state = SupervisorState::Failsafe(cause);
                self.failsafe_frames += 1;
                self.channels.overwrite_and_snapshot(self.settings.failsafe)
            }
        };

        let frame = encode_frame(&snapshot);

        match self.serial.send_frame(&frame).await {
            Ok(()) => {
                self.frames_sent += 1;
                if self.frames_sent - self.last_log_count >= self.settings.status_log_interval {
                    info!(
                        "Sent {} frames ({:?}, {} failsafe, {} write errors)",
                        self.frames_sent, self.state, self.failsafe_frames, self.write_errors
                    );
                    self.last_log_count = self.frames_sent;
                }
            }
            Err(e) => {
                self.write_errors += 1;
                warn!("Failed to send frame: {}", e);
            }
        }

        frame
    }

    fn record_event(&self, event: LinkEvent) {
        if let Some(journal) = &self.journal {
            journal.record(event);
        }
    }

    /// Tick at the configured period until shutdown is requested
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.settings.period;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        info!(
            "Starting iBUS frame loop every {:?} on {}",
            period,
            self.serial.device_path()
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.tick().await;
                    let elapsed = started.elapsed();
                    if elapsed > period {
                        warn!("Frame cycle overran: {:?} (period {:?})", elapsed, period);
                    }
                }
            }
        }

        info!(
            "Link supervisor stopped: {} frames sent, {} failsafe, {} write errors",
            self.frames_sent, self.failsafe_frames, self.write_errors
        );
    }
}
