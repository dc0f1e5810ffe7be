//! # Discovery
//!
//! Announces this device on the local network until a phone acknowledges,
//! then binds the session to that phone exactly once.
//!
//! ## Handshake
//!
//! ```text
//! bridge ──"DRONE|192.168.1.10"──▶ 255.255.255.255:8888   (every other tick)
//! bridge ◀──"PHONE|192.168.1.42"── phone                   (on control port 9877)
//! ```
//!
//! Once bound, announcements stop for good and the control socket is handed to
//! the ingestor as part of [`BoundSession`]. There is no re-discovery.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, trace, warn};

use super::message::{announcement, parse_ack};
use crate::config::NetworkConfig;
use crate::error::{BridgeError, Result};

/// Largest acknowledgment accepted; anything longer is discarded unparsed
const MAX_ACK_SIZE: usize = 64;

/// Announcements go out on every `ANNOUNCE_EVERY_TICKS`-th tick
const ANNOUNCE_EVERY_TICKS: u64 = 2;

/// Discovery session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet
    Announcing,
    /// At least one announcement sent, no acknowledgment yet
    AwaitingAck,
    /// Bound to a controller; terminal
    Bound(IpAddr),
}

/// Result of a successful handshake
#[derive(Debug)]
pub struct BoundSession {
    /// Address the acknowledgment came from; the ingestor only accepts this IP
    pub peer: IpAddr,
    /// Address the phone wrote into its acknowledgment
    pub advertised: Ipv4Addr,
    /// Control socket, now owned by whoever ingests channel data
    pub control_socket: UdpSocket,
}

/// Discovery handshake driver
pub struct Discovery {
    broadcast_socket: UdpSocket,
    control_socket: UdpSocket,
    local_address: Ipv4Addr,
    broadcast_target: SocketAddr,
    announce_interval: Duration,
    state: SessionState,
    ticks: u64,
    announcements_sent: u64,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("local_address", &self.local_address)
            .field("broadcast_target", &self.broadcast_target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Discovery {
    /// Bind both discovery sockets on all interfaces
    ///
    /// # Errors
    ///
    /// Returns error if either port cannot be bound, broadcast cannot be
    /// enabled, or the local IPv4 address cannot be determined
    pub async fn bind(config: &NetworkConfig) -> Result<Self> {
        let broadcast_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.discovery_port))
            .await
            .map_err(|e| BridgeError::Network(format!(
                "Failed to bind discovery port {}: {}", config.discovery_port, e
            )))?;
        broadcast_socket.set_broadcast(true)?;

        let control_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.control_port))
            .await
            .map_err(|e| BridgeError::Network(format!(
                "Failed to bind control port {}: {}", config.control_port, e
            )))?;

        let local_address = resolve_local_ipv4(config)?;
        info!("Bridge IP address: {}", local_address);

        Ok(Self::new(
            broadcast_socket,
            control_socket,
            local_address,
            config.broadcast_target(),
            config.announce_interval(),
        ))
    }

    /// Create a discovery driver from already bound sockets
    pub fn new(
        broadcast_socket: UdpSocket,
        control_socket: UdpSocket,
        local_address: Ipv4Addr,
        broadcast_target: SocketAddr,
        announce_interval: Duration,
    ) -> Self {
        Self {
            broadcast_socket,
            control_socket,
            local_address,
            broadcast_target,
            announce_interval,
            state: SessionState::Announcing,
            ticks: 0,
            announcements_sent: 0,
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of announcements sent so far
    pub fn announcements_sent(&self) -> u64 {
        self.announcements_sent
    }

    /// Handle a datagram received on the control port while unbound.
    ///
    /// Binds to `sender`'s IP when the payload is a valid acknowledgment and
    /// returns the advertised address. Anything else, including any ack after
    /// the session is already bound, is ignored.
    pub fn handle_ack(&mut self, payload: &[u8], sender: SocketAddr) -> Option<Ipv4Addr> {
        if let SessionState::Bound(peer) = self.state {
            trace!("Ignoring datagram from {} (already bound to {})", sender, peer);
            return None;
        }

        if payload.len() > MAX_ACK_SIZE {
            trace!("Discarding oversized {}-byte datagram from {}", payload.len(), sender);
            return None;
        }

        let Some(advertised) = parse_ack(payload) else {
            trace!("Discarding {}-byte non-ack datagram from {}", payload.len(), sender);
            return None;
        };

        if IpAddr::V4(advertised) != sender.ip() {
            warn!(
                "Phone advertised {} but acknowledged from {}; binding to sender",
                advertised, sender.ip()
            );
        }

        info!("Received acknowledgement from phone: {}", advertised);
        self.state = SessionState::Bound(sender.ip());
        Some(advertised)
    }

    /// Advance the announce schedule by one tick, announcing on every
    /// `ANNOUNCE_EVERY_TICKS`-th tick starting with the first
    async fn on_tick(&mut self) {
        if self.ticks % ANNOUNCE_EVERY_TICKS == 0 {
            self.announce().await;
        }
        self.ticks += 1;
    }

    /// Send one announcement. Send failures are logged, not fatal: the next
    /// announcement is only two ticks away.
    async fn announce(&mut self) {
        let msg = announcement(self.local_address);
        match self.broadcast_socket.send_to(msg.as_bytes(), self.broadcast_target).await {
            Ok(_) => {
                self.announcements_sent += 1;
                if self.state == SessionState::Announcing {
                    self.state = SessionState::AwaitingAck;
                }
                debug!("Broadcast: {}", msg);
            }
            Err(e) => warn!("Failed to broadcast announcement: {}", e),
        }
    }

    /// Announce until a phone acknowledges or shutdown is requested
    ///
    /// # Returns
    ///
    /// * `Ok(Some(BoundSession))` - A phone acknowledged
    /// * `Ok(None)` - Shutdown was requested before binding
    pub async fn run(mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Option<BoundSession>> {
        let mut ticker = interval(self.announce_interval);
        // One spare byte so oversized acks show up as such instead of truncated
        let mut buf = [0u8; MAX_ACK_SIZE + 1];

        info!(
            "Announcing {} to {} until a phone acknowledges",
            self.local_address, self.broadcast_target
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Discovery stopped before a phone acknowledged");
                        return Ok(None);
                    }
                }

                _ = ticker.tick() => self.on_tick().await,

                received = self.control_socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, sender)) => {
                            if let Some(advertised) = self.handle_ack(&buf[..len], sender) {
                                return Ok(Some(self.into_bound(advertised)));
                            }
                        }
                        Err(e) => debug!("Control socket receive error during discovery: {}", e),
                    }
                }
            }
        }
    }

    fn into_bound(self, advertised: Ipv4Addr) -> BoundSession {
        let peer = match self.state {
            SessionState::Bound(peer) => peer,
            _ => IpAddr::V4(advertised),
        };
        info!(
            "Phone connected at {} after {} announcements",
            peer, self.announcements_sent
        );
        BoundSession {
            peer,
            advertised,
            control_socket: self.control_socket,
        }
    }
}

/// Determine the IPv4 address to announce.
///
/// Uses `advertise_address` when configured. Otherwise connects a throwaway UDP
/// socket toward the broadcast target and reads back the local address the
/// kernel picked; nothing is sent.
pub fn resolve_local_ipv4(config: &NetworkConfig) -> Result<Ipv4Addr> {
    if let Some(address) = config.advertise_address {
        return Ok(address);
    }

    let probe = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    probe.set_broadcast(true)?;
    probe.connect(config.broadcast_target())?;

    match probe.local_addr()?.ip() {
        IpAddr::V4(address) if !address.is_unspecified() => Ok(address),
        other => Err(BridgeError::Network(format!(
            "Could not determine local IPv4 address on {} (got {})",
            config.interface, other
        ))),
    }
}
