//! # Control Module
//!
//! Receives channel values from the bound phone controller.
//!
//! This module handles:
//! - Filtering datagrams to the bound peer
//! - Length-checking and decoding little-endian 16-bit channel values
//! - Writing the leading channels into the shared channel state

pub mod ingestor;
