//! # Control Channel Ingestor
//!
//! Turns fixed-length control datagrams into channel updates.
//!
//! ## Datagram Format
//!
//! N little-endian `u16` values, no header, no sequence number:
//!
//! ```text
//! 4 channels:  [roll lo, roll hi, pitch lo, pitch hi, thr lo, thr hi, yaw lo, yaw hi]
//! ```
//!
//! Any datagram whose length is not exactly `2 * N` is dropped without reply.
//! The newest valid datagram always wins. Only the leading N channels are
//! overwritten; channels N..14 keep their previous values.

use std::net::{IpAddr, SocketAddr};

use bytes::Buf;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::channels::SharedChannels;
use crate::ibus::protocol::IBUS_NUM_CHANNELS;

/// Receive buffer size. Larger than any valid datagram so oversized ones are
/// seen at full length and rejected rather than truncated into validity.
const RECV_BUFFER_SIZE: usize = 1500;

/// Why a datagram was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Sent by someone other than the bound peer
    UnknownPeer(IpAddr),
    /// Payload length differs from `2 * channel_count`
    WrongLength { expected: usize, actual: usize },
}

/// Control datagram ingestor bound to a single peer
#[derive(Debug)]
pub struct Ingestor {
    channels: SharedChannels,
    peer: IpAddr,
    channel_count: usize,
    accepted: u64,
    rejected: u64,
}

impl Ingestor {
    /// Create an ingestor for `peer` expecting `channel_count` values per datagram
    ///
    /// `channel_count` is capped at 14.
    pub fn new(channels: SharedChannels, peer: IpAddr, channel_count: usize) -> Self {
        Self {
            channels,
            peer,
            channel_count: channel_count.min(IBUS_NUM_CHANNELS),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Expected payload length in bytes
    pub fn expected_len(&self) -> usize {
        self.channel_count * 2
    }

    /// Bound peer address
    pub fn peer(&self) -> IpAddr {
        self.peer
    }

    /// Number of datagrams applied to the channel state
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Number of datagrams dropped
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Apply one datagram.
    ///
    /// Decoding happens on a local buffer; the shared state is touched once,
    /// for the final copy.
    pub fn on_datagram(&mut self, payload: &[u8], sender: SocketAddr) -> Result<(), Rejection> {
        if sender.ip() != self.peer {
            self.rejected += 1;
            return Err(Rejection::UnknownPeer(sender.ip()));
        }

        let expected = self.expected_len();
        if payload.len() != expected {
            self.rejected += 1;
            return Err(Rejection::WrongLength {
                expected,
                actual: payload.len(),
            });
        }

        let mut values = [0u16; IBUS_NUM_CHANNELS];
        let mut buf = payload;
        for value in values[..self.channel_count].iter_mut() {
            *value = buf.get_u16_le();
        }

        self.channels.update_leading(&values[..self.channel_count]);
        self.accepted += 1;
        trace!("Applied channels {:?}", &values[..self.channel_count]);
        Ok(())
    }

    /// Receive and apply datagrams until shutdown is requested
    pub async fn run(mut self, socket: UdpSocket, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        info!(
            "Listening for {}-channel control datagrams from {}",
            self.channel_count, self.peer
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, sender)) => {
                            if let Err(reason) = self.on_datagram(&buf[..len], sender) {
                                trace!("Dropped datagram from {}: {:?}", sender, reason);
                            }
                        }
                        Err(e) => debug!("Control socket receive error: {}", e),
                    }
                }
            }
        }

        info!(
            "Ingestor stopped ({} accepted, {} rejected)",
            self.accepted, self.rejected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibus::protocol::neutral_channels;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42));

    fn from_peer() -> SocketAddr {
        SocketAddr::new(PEER, 40000)
    }

    fn le_bytes(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_expected_len() {
        let shared = SharedChannels::default();
        assert_eq!(Ingestor::new(shared.clone(), PEER, 4).expected_len(), 8);
        assert_eq!(Ingestor::new(shared.clone(), PEER, 5).expected_len(), 10);
        assert_eq!(Ingestor::new(shared, PEER, 40).expected_len(), 28);
    }

    #[test]
    fn test_five_channel_update_keeps_trailing() {
        let shared = SharedChannels::default();
        let mut ingestor = Ingestor::new(shared.clone(), PEER, 5);

        let payload = le_bytes(&[1000, 1100, 1200, 1300, 1400]);
        assert_eq!(payload.len(), 10);
        assert!(ingestor.on_datagram(&payload, from_peer()).is_ok());

        let set = shared.snapshot();
        assert_eq!(&set[..5], &[1000, 1100, 1200, 1300, 1400]);
        assert_eq!(&set[5..], &neutral_channels()[5..]);
        assert_eq!(ingestor.accepted(), 1);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let shared = SharedChannels::default();
        let mut ingestor = Ingestor::new(shared.clone(), PEER, 5);

        let result = ingestor.on_datagram(&[0u8; 8], from_peer());
        assert_eq!(result, Err(Rejection::WrongLength { expected: 10, actual: 8 }));
        assert_eq!(shared.snapshot(), neutral_channels());
        assert!(shared.last_update().is_none());
        assert_eq!(ingestor.rejected(), 1);
    }

    #[test]
    fn test_oversized_rejected() {
        let shared = SharedChannels::default();
        let mut ingestor = Ingestor::new(shared.clone(), PEER, 4);

        let payload = le_bytes(&[1900, 1900, 1900, 1900, 1900]);
        assert!(ingestor.on_datagram(&payload, from_peer()).is_err());
        assert_eq!(shared.snapshot(), neutral_channels());
    }

    #[test]
    fn test_unknown_peer_rejected() {
        let shared = SharedChannels::default();
        let mut ingestor = Ingestor::new(shared.clone(), PEER, 4);

        let stranger: SocketAddr = "192.168.1.77:40000".parse().unwrap();
        let payload = le_bytes(&[1900, 1900, 1900, 1900]);
        assert_eq!(
            ingestor.on_datagram(&payload, stranger),
            Err(Rejection::UnknownPeer(stranger.ip()))
        );
        assert_eq!(shared.snapshot(), neutral_channels());
    }

    #[test]
    fn test_late_ack_from_other_phone_has_no_effect() {
        let shared = SharedChannels::default();
        let mut ingestor = Ingestor::new(shared.clone(), PEER, 4);

        let other: SocketAddr = "192.168.1.77:9877".parse().unwrap();
        assert!(ingestor.on_datagram(b"PHONE|192.168.1.77", other).is_err());
        assert_eq!(ingestor.peer(), PEER);
        assert_eq!(shared.snapshot(), neutral_channels());
    }

    #[test]
    fn test_any_source_port_accepted() {
        let shared = SharedChannels::default();
        let mut ingestor = Ingestor::new(shared.clone(), PEER, 4);

        for port in [1024u16, 9877, 65000] {
            let payload = le_bytes(&[port % 1000 + 1000, 1500, 1500, 1500]);
            assert!(ingestor.on_datagram(&payload, SocketAddr::new(PEER, port)).is_ok());
        }
        assert_eq!(ingestor.accepted(), 3);
    }

    #[test]
    fn test_newest_datagram_wins() {
        let shared = SharedChannels::default();
        let mut ingestor = Ingestor::new(shared.clone(), PEER, 4);

        ingestor.on_datagram(&le_bytes(&[1200, 1200, 1200, 1200]), from_peer()).unwrap();
        ingestor.on_datagram(&le_bytes(&[1800, 1700, 1600, 1500]), from_peer()).unwrap();
        assert_eq!(&shared.snapshot()[..4], &[1800, 1700, 1600, 1500]);
    }

    #[tokio::test]
    async fn test_run_over_loopback() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = socket.local_addr().unwrap();
        let phone = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let shared = SharedChannels::default();
        let ingestor = Ingestor::new(shared.clone(), IpAddr::V4(Ipv4Addr::LOCALHOST), 4);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(ingestor.run(socket, rx));

        phone.send_to(&[0u8; 3], target).await.unwrap();
        phone.send_to(&le_bytes(&[1100, 1200, 1300, 1400]), target).await.unwrap();

        let mut applied = false;
        for _ in 0..100 {
            if shared.snapshot()[..4] == [1100, 1200, 1300, 1400] {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(applied, "control datagram was not applied");

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("ingestor did not stop")
            .unwrap();
    }
}
