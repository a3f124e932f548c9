//! A thin UDP wrapper that turns one NTP request/reply round trip into the
//! four-timestamp tuple the clock consumes.
//!
//! The event loop that decides *when* to poll lives in [`crate::server`];
//! this module only owns the socket and the wire exchange itself, mirroring
//! the original's `ntp::socket` / `handle_ntp_poll` / `handle_ntp_reply`
//! split between transport and scheduling.

use super::{deserialize, serialize, LeapStatus, Mode, Packet, RootStats, PACKET_SIZE};
use crate::bintime::Bintime;
use crate::counter::{self, Ticks};
use std::net::UdpSocket;
use std::time::Duration;
use ts_common::error::{Error, Result};

/// An outstanding NTP client socket, bound to exactly one remote peer.
pub struct Socket {
    inner: UdpSocket,
}

/// The default request this client sends: `LI=unknown, VN=4, Mode=client`,
/// a conservative stratum/poll/precision, matching the original's
/// `handle_ntp_poll` request template.
fn request_packet() -> Packet {
    Packet {
        leap: LeapStatus::Unknown,
        mode: Mode::Client,
        stratum: 0,
        poll: 4,
        precision: -6,
        root: RootStats {
            delay: Bintime::new(1, 0),
            dispersion: Bintime::new(1, 0),
        },
        refid: 0,
        reference: Bintime::zero(),
        origin: Bintime::zero(),
        receive: Bintime::zero(),
        transmit: Bintime::zero(),
    }
}

impl Socket {
    /// Connect a UDP socket to `node:service`, resolving via the standard
    /// library resolver (the spec's `getaddrinfo` call).
    pub fn connect(node: &str, service: &str) -> Result<Self> {
        let inner = UdpSocket::bind(("0.0.0.0", 0)).map_err(Error::Io)?;
        let addr = format!("{node}:{service}");
        inner.connect(&addr).map_err(|e| Error::UnresolvedHost {
            host: addr.clone(),
            errno: e.raw_os_error().unwrap_or(-1),
        })?;
        inner
            .set_read_timeout(Some(Duration::from_millis(100)))
            .map_err(Error::Io)?;
        Ok(Socket { inner })
    }

    /// The raw fd-equivalent: a socket handle identity, used by the server
    /// to track which source a readable event belongs to.
    pub fn local_addr_string(&self) -> String {
        self.inner
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default()
    }

    /// Send one NTP request, returning the client-side transmit time in
    /// counter ticks (`Ta`).
    pub fn send_request(&self) -> Result<Ticks> {
        let buf = serialize(&request_packet());
        self.inner.send(&buf).map_err(Error::Io)?;
        Ok(counter::now())
    }

    /// Poll for one reply without blocking past the socket's read timeout.
    /// Returns `Ok(None)` on a timeout (nothing to read yet), the decoded
    /// reply plus the client-side receive time (`Tf`) on success.
    pub fn recv_reply(&self) -> Result<Option<(Packet, Ticks)>> {
        let mut buf = [0u8; PACKET_SIZE];
        match self.inner.recv(&mut buf) {
            Ok(len) => {
                let tf = counter::now();
                match deserialize(&buf[..len]) {
                    Some(packet) => Ok(Some((packet, tf))),
                    None => Err(Error::Protocol(format!(
                        "short NTP reply: {len} bytes, need {PACKET_SIZE}"
                    ))),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_to_loopback_succeeds_and_exposes_local_addr() {
        let socket = Socket::connect("127.0.0.1", "123").expect("loopback connect");
        assert!(!socket.local_addr_string().is_empty());
    }

    #[test]
    fn request_packet_is_client_mode() {
        let pkt = request_packet();
        assert_eq!(pkt.mode, Mode::Client);
        assert_eq!(pkt.stratum, 0);
    }
}
