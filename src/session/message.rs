//! # Discovery Messages
//!
//! ASCII announcement and acknowledgment payloads exchanged during discovery.

use std::net::Ipv4Addr;

/// Prefix of the announcement broadcast by the bridge
pub const ANNOUNCE_PREFIX: &str = "DRONE|";

/// Prefix of the acknowledgment sent back by the phone
pub const ACK_PREFIX: &str = "PHONE|";

/// Build the announcement payload for this device's address
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
/// use wifi_ibus_bridge::session::message::announcement;
///
/// let msg = announcement(Ipv4Addr::new(192, 168, 1, 10));
/// assert_eq!(msg, "DRONE|192.168.1.10");
/// ```
pub fn announcement(address: Ipv4Addr) -> String {
    format!("{}{}", ANNOUNCE_PREFIX, address)
}

/// Parse an acknowledgment payload.
///
/// Returns the IPv4 address the phone advertised, or `None` when the payload
/// is not a well-formed `PHONE|<dotted-quad>` message. Surrounding ASCII
/// whitespace (a trailing newline from some senders) is tolerated.
pub fn parse_ack(payload: &[u8]) -> Option<Ipv4Addr> {
    let text = std::str::from_utf8(payload).ok()?;
    let address = text.trim().strip_prefix(ACK_PREFIX)?;
    address.trim().parse().ok()
}
