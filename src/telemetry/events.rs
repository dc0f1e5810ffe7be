//! # Link Event Journal
//!
//! Append-only JSONL record of the transitions an operator cares about after a
//! flight: when the phone bound, when the link dropped and why, and when it
//! came back.
//!
//! ```text
//! {"timestamp":"2026-05-01T10:00:00.000Z","event":"session_bound","peer":"192.168.1.42","advertised":"192.168.1.42"}
//! {"timestamp":"2026-05-01T10:03:12.500Z","event":"link_lost","cause":"link_down"}
//! {"timestamp":"2026-05-01T10:03:14.010Z","event":"link_restored","failsafe_frames":216}
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::TelemetryConfig;
use crate::error::{BridgeError, Result};

/// Journal file name prefix
const FILE_PREFIX: &str = "link_events_";

/// Journal file extension
const FILE_EXTENSION: &str = "jsonl";

/// Why the supervisor switched to failsafe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossCause {
    /// Wi-Fi association lost
    LinkDown,
    /// Link up, but the bound phone stopped sending
    PeerSilent,
}

/// A journaled event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    SessionBound { peer: String, advertised: String },
    LinkLost { cause: LossCause },
    LinkRestored { failsafe_frames: u64 },
}

#[derive(Serialize)]
struct Record<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a LinkEvent,
}

/// Rotating JSONL event journal
#[derive(Debug)]
pub struct EventJournal {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    current: Option<File>,
    records_in_file: usize,
    files_opened: u32,
}

impl EventJournal {
    /// Create a journal writing into `config.log_dir`
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir).map_err(|e| {
            BridgeError::Telemetry(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file,
            max_files_to_keep: config.max_files_to_keep,
            current: None,
            records_in_file: 0,
            files_opened: 0,
        })
    }

    /// Append one event, rotating files as needed
    pub fn record(&mut self, event: &LinkEvent) -> Result<()> {
        if self.current.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = Record {
            timestamp: Utc::now(),
            event,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| BridgeError::Telemetry(format!("Failed to serialize event: {}", e)))?;

        if let Some(file) = self.current.as_mut() {
            writeln!(file, "{}", line)?;
            file.flush()?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    /// Directory the journal writes into
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move the journal onto the blocking pool, fed through a channel.
    ///
    /// The returned task finishes once every [`JournalHandle`] is dropped and
    /// all queued events are written.
    pub fn spawn(mut self) -> (JournalHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<LinkEvent>();
        let writer = tokio::task::spawn_blocking(move || {
            while let Some(event) = rx.blocking_recv() {
                if let Err(e) = self.record(&event) {
                    warn!("Failed to journal {:?}: {}", event, e);
                }
            }
        });
        (JournalHandle { tx }, writer)
    }

    fn rotate(&mut self) -> Result<()> {
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.files_opened,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| BridgeError::Telemetry(format!("Failed to open {}: {}", path.display(), e)))?;

        debug!("Journaling link events to {}", path.display());
        self.current = Some(file);
        self.records_in_file = 0;
        self.files_opened += 1;

        self.prune()
    }

    /// Delete the oldest journal files beyond `max_files_to_keep`
    fn prune(&self) -> Result<()> {
        let mut files = journal_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            debug!("Removing old journal {}", path.display());
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Non-blocking sender into a spawned [`EventJournal`]
#[derive(Debug, Clone)]
pub struct JournalHandle {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl JournalHandle {
    /// Queue an event for the writer; never blocks
    pub fn record(&self, event: LinkEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("Journal writer stopped, dropping {:?}", e.0);
        }
    }
}

/// Journal files in `dir`, unsorted
fn journal_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_journal = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_EXTENSION))
            .unwrap_or(false);
        if is_journal {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, per_file: usize, keep: usize) -> TelemetryConfig {
        TelemetryConfig {
            enabled: true,
            log_dir: dir.path().to_string_lossy().to_string(),
            max_records_per_file: per_file,
            max_files_to_keep: keep,
        }
    }

    fn read_lines(dir: &Path) -> Vec<serde_json::Value> {
        let mut files = journal_files(dir).unwrap();
        files.sort();
        files
            .iter()
            .flat_map(|p| {
                fs::read_to_string(p)
                    .unwrap()
                    .lines()
                    .map(|l| serde_json::from_str(l).unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(&LinkEvent::LinkLost { cause: LossCause::PeerSilent }).unwrap();
        assert_eq!(json["event"], "link_lost");
        assert_eq!(json["cause"], "peer_silent");

        let json = serde_json::to_value(&LinkEvent::LinkRestored { failsafe_frames: 12 }).unwrap();
        assert_eq!(json["event"], "link_restored");
        assert_eq!(json["failsafe_frames"], 12);
    }

    #[test]
    fn test_record_writes_jsonl() {
        let dir = TempDir::new().unwrap();
        let mut journal = EventJournal::new(&config(&dir, 100, 10)).unwrap();

        journal.record(&LinkEvent::SessionBound {
            peer: "192.168.1.42".to_string(),
            advertised: "192.168.1.42".to_string(),
        }).unwrap();
        journal.record(&LinkEvent::LinkLost { cause: LossCause::LinkDown }).unwrap();

        let lines = read_lines(dir.path());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "session_bound");
        assert_eq!(lines[0]["peer"], "192.168.1.42");
        assert!(lines[0]["timestamp"].is_string());
        assert_eq!(lines[1]["cause"], "link_down");
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = TempDir::new().unwrap();
        let mut journal = EventJournal::new(&config(&dir, 2, 3)).unwrap();

        for i in 0..9 {
            journal.record(&LinkEvent::LinkRestored { failsafe_frames: i }).unwrap();
        }

        // 9 records at 2 per file -> 5 files opened, 3 kept
        let files = journal_files(dir.path()).unwrap();
        assert_eq!(files.len(), 3);

        let lines = read_lines(dir.path());
        let frames: Vec<u64> = lines.iter().map(|l| l["failsafe_frames"].as_u64().unwrap()).collect();
        assert_eq!(frames, vec![4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_spawned_journal_writes_queued_events_in_order() {
        let dir = TempDir::new().unwrap();
        let (handle, writer) = EventJournal::new(&config(&dir, 100, 10)).unwrap().spawn();

        let clone = handle.clone();
        handle.record(LinkEvent::LinkLost { cause: LossCause::LinkDown });
        clone.record(LinkEvent::LinkRestored { failsafe_frames: 7 });
        drop(handle);
        drop(clone);
        writer.await.unwrap();

        let lines = read_lines(dir.path());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "link_lost");
        assert_eq!(lines[1]["failsafe_frames"], 7);
    }

    #[test]
    fn test_new_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let config = TelemetryConfig {
            enabled: true,
            log_dir: nested.to_string_lossy().to_string(),
            max_records_per_file: 10,
            max_files_to_keep: 1,
        };

        let journal = EventJournal::new(&config).unwrap();
        assert!(journal.dir().is_dir());
    }
}
