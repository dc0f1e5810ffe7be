//! # Shared Channel State
//!
//! The only state that crosses between the network-facing tasks (discovery and
//! ingestion) and the link supervisor.
//!
//! Every access takes the inner lock for the duration of one fixed-size copy.
//! Callers never receive a reference into the cell, only owned `ChannelSet`
//! copies, so a reader can never observe a half-written set and no lock is held
//! across socket or serial I/O.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use crate::ibus::protocol::{neutral_channels, ChannelSet, IBUS_NUM_CHANNELS};

#[derive(Debug)]
struct Inner {
    channels: ChannelSet,
    /// When the ingestor last wrote live values
    last_update: Option<Instant>,
}

/// Cloneable handle to the process-wide channel set
#[derive(Debug, Clone)]
pub struct SharedChannels {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SharedChannels {
    fn default() -> Self {
        Self::new(neutral_channels())
    }
}

impl SharedChannels {
    /// Create the shared cell with an initial channel set
    pub fn new(initial: ChannelSet) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                channels: initial,
                last_update: None,
            })),
        }
    }

    /// Acquire the critical section.
    ///
    /// A panic while the guard was held cannot leave a torn set behind (all
    /// writes are single array copies), so a poisoned lock is recovered.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy the current channel set out of the cell
    pub fn snapshot(&self) -> ChannelSet {
        self.lock().channels
    }

    /// Overwrite the leading `values.len()` channels with live values.
    ///
    /// Trailing channels keep whatever they held before: a controller that
    /// sends 4 axes leaves the auxiliary channels untouched. Values beyond the
    /// 14th are ignored.
    pub fn update_leading(&self, values: &[u16]) {
        let n = values.len().min(IBUS_NUM_CHANNELS);
        let now = Instant::now();

        let mut inner = self.lock();
        inner.channels[..n].copy_from_slice(&values[..n]);
        inner.last_update = Some(now);
    }

    /// Replace the whole set (failsafe substitution) and return the resulting
    /// snapshot within one critical section, so no ingestor write can land in
    /// between. Does not count as a live update.
    pub fn overwrite_and_snapshot(&self, channels: ChannelSet) -> ChannelSet {
        let mut inner = self.lock();
        inner.channels = channels;
        inner.channels
    }

    /// Instant of the most recent live update, if any
    pub fn last_update(&self) -> Option<Instant> {
        self.lock().last_update
    }
}
