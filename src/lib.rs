//! # WiFi iBUS Bridge Library
//!
//! Fly a small drone from a phone over Wi-Fi.
//!
//! This library provides the pieces that sit between a phone controller on the
//! local network and an iBUS flight controller on a UART: the discovery
//! handshake, the control datagram ingestor, the shared channel state, the
//! link-loss failsafe supervisor and the iBUS frame encoder.

pub mod config;
pub mod error;
pub mod ibus;
pub mod channels;
pub mod session;
pub mod control;
pub mod link;
pub mod serial;
pub mod telemetry;
