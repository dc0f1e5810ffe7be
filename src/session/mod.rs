//! # Session Module
//!
//! Discovery handshake with the paired phone controller.
//!
//! This module handles:
//! - Broadcasting `DRONE|<ip>` announcements until a controller answers
//! - Parsing `PHONE|<ip>` acknowledgments
//! - Binding the session to the first acknowledging peer
//! - Handing the control socket over to the ingestor

pub mod message;
pub mod discovery;
