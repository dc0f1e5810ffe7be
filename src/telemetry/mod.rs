//! # Telemetry Module
//!
//! Journals link events to JSONL files with rotation.
//!
//! This module handles:
//! - Recording session binding, link loss and link recovery
//! - Formatting as JSONL (JSON Lines) with UTC timestamps
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod events;
