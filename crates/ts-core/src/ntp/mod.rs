//! The NTPv4 wire codec: a 48-byte RFC 5905 header, serialized and
//! deserialized without any heap allocation.
//!
//! NTP timestamps measure seconds since 1900; bintime (like everything
//! else in this crate) measures seconds since the Unix epoch. `ntp_fudge`
//! is the fixed offset between the two: 17 leap years fell between 1900
//! and 1970.

use crate::bintime::Bintime;

pub mod socket;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_FUDGE: i64 = ((1970 - 1900) * 365 + 17) * 24 * 60 * 60;
const NTP_VERSION: u8 = 4;

pub const PORT: u16 = 123;
pub const PACKET_SIZE: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum LeapStatus {
    NoWarning = 0,
    LastMinute61 = 1,
    LastMinute59 = 2,
    Unknown = 3,
}

impl LeapStatus {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => LeapStatus::NoWarning,
            1 => LeapStatus::LastMinute61,
            2 => LeapStatus::LastMinute59,
            _ => LeapStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Mode {
    Reserved = 0,
    SymmetricActive = 1,
    SymmetricPassive = 2,
    Client = 3,
    Server = 4,
    Broadcast = 5,
    Control = 6,
    Private = 7,
}

impl Mode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Mode::Reserved,
            1 => Mode::SymmetricActive,
            2 => Mode::SymmetricPassive,
            3 => Mode::Client,
            4 => Mode::Server,
            5 => Mode::Broadcast,
            6 => Mode::Control,
            _ => Mode::Private,
        }
    }
}

/// Kiss-o'-Death codes: the four-character ASCII meaning of `refid` when
/// `stratum == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KissCode {
    Deny,
    Rstr,
    RateExceeded,
    Other([u8; 4]),
}

impl KissCode {
    pub fn from_refid(refid: u32) -> Self {
        let bytes = refid.to_be_bytes();
        match &bytes {
            b"DENY" => KissCode::Deny,
            b"RSTR" => KissCode::Rstr,
            b"RATE" => KissCode::RateExceeded,
            other => KissCode::Other(*other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootStats {
    pub delay: Bintime,
    pub dispersion: Bintime,
}

/// A decoded NTPv4 packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Packet {
    pub leap: LeapStatus,
    pub mode: Mode,
    pub stratum: u8,
    pub poll: u8,
    pub precision: i8,
    pub root: RootStats,
    pub refid: u32,
    pub reference: Bintime,
    pub origin: Bintime,
    pub receive: Bintime,
    pub transmit: Bintime,
}

fn to_ntp32(bt: Bintime) -> [u8; 4] {
    let secs = (bt.sec + NTP_FUDGE) as u32;
    [
        ((secs >> 8) & 0xff) as u8,
        (secs & 0xff) as u8,
        ((bt.frac >> 56) & 0xff) as u8,
        ((bt.frac >> 48) & 0xff) as u8,
    ]
}

fn to_ntp64(bt: Bintime) -> [u8; 8] {
    let secs = (bt.sec + NTP_FUDGE) as u32;
    [
        ((secs >> 24) & 0xff) as u8,
        ((secs >> 16) & 0xff) as u8,
        ((secs >> 8) & 0xff) as u8,
        (secs & 0xff) as u8,
        ((bt.frac >> 56) & 0xff) as u8,
        ((bt.frac >> 48) & 0xff) as u8,
        ((bt.frac >> 40) & 0xff) as u8,
        ((bt.frac >> 32) & 0xff) as u8,
    ]
}

fn from_ntp32(b: &[u8]) -> Bintime {
    let secs = ((b[0] as i64) << 8 | (b[1] as i64)) - NTP_FUDGE;
    let frac = (b[2] as u64) << 56 | (b[3] as u64) << 48;
    Bintime::new(secs, frac)
}

fn from_ntp64(b: &[u8]) -> Bintime {
    let secs = ((b[0] as i64) << 24
        | (b[1] as i64) << 16
        | (b[2] as i64) << 8
        | (b[3] as i64))
        - NTP_FUDGE;
    let frac = (b[4] as u64) << 56
        | (b[5] as u64) << 48
        | (b[6] as u64) << 40
        | (b[7] as u64) << 32;
    Bintime::new(secs, frac)
}

/// Serialize a packet to its 48-byte wire representation.
pub fn serialize(from: &Packet) -> [u8; PACKET_SIZE] {
    let mut to = [0u8; PACKET_SIZE];
    to[0] = ((from.leap as u8) << 6) | (NTP_VERSION << 3) | (from.mode as u8);
    to[1] = from.stratum;
    to[2] = from.poll;
    to[3] = from.precision as u8;
    to[4..8].copy_from_slice(&to_ntp32(from.root.delay));
    to[8..12].copy_from_slice(&to_ntp32(from.root.dispersion));
    to[12] = ((from.refid >> 24) & 0xff) as u8;
    to[13] = ((from.refid >> 16) & 0xff) as u8;
    to[14] = ((from.refid >> 8) & 0xff) as u8;
    to[15] = (from.refid & 0xff) as u8;
    to[16..24].copy_from_slice(&to_ntp64(from.reference));
    to[24..32].copy_from_slice(&to_ntp64(from.origin));
    to[32..40].copy_from_slice(&to_ntp64(from.receive));
    to[40..48].copy_from_slice(&to_ntp64(from.transmit));
    to
}

/// Deserialize a packet from the wire. Returns `None` if fewer than
/// [`PACKET_SIZE`] bytes are given.
pub fn deserialize(from: &[u8]) -> Option<Packet> {
    if from.len() < PACKET_SIZE {
        return None;
    }
    Some(Packet {
        leap: LeapStatus::from_bits(from[0] >> 6),
        mode: Mode::from_bits(from[0]),
        stratum: from[1],
        poll: from[2],
        precision: from[3] as i8,
        root: RootStats {
            delay: from_ntp32(&from[4..8]),
            dispersion: from_ntp32(&from[8..12]),
        },
        refid: (from[12] as u32) << 24
            | (from[13] as u32) << 16
            | (from[14] as u32) << 8
            | (from[15] as u32),
        reference: from_ntp64(&from[16..24]),
        origin: from_ntp64(&from[24..32]),
        receive: from_ntp64(&from[32..40]),
        transmit: from_ntp64(&from[40..48]),
    })
}

/// Format a decoded packet's fields for trace-level diagnostics.
pub fn dump(packet: &Packet) -> String {
    format!(
        "NTPv4 packet: stratum={} poll={} precision={} root_delay={}.{:x} root_dispersion={}.{:x} refid={:08x} reference={}.{:x} origin={}.{:x} receive={}.{:x} transmit={}.{:x}",
        packet.stratum,
        packet.poll,
        packet.precision,
        packet.root.delay.sec,
        packet.root.delay.frac >> 48,
        packet.root.dispersion.sec,
        packet.root.dispersion.frac >> 48,
        packet.refid,
        packet.reference.sec,
        packet.reference.frac,
        packet.origin.sec,
        packet.origin.frac,
        packet.receive.sec,
        packet.receive.frac,
        packet.transmit.sec,
        packet.transmit.frac,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> Packet {
        Packet {
            leap: LeapStatus::NoWarning,
            mode: Mode::Server,
            stratum: 3,
            poll: 6,
            precision: -20,
            root: RootStats {
                delay: Bintime::new(0, 1 << 40),
                dispersion: Bintime::new(0, 1 << 39),
            },
            refid: 0x7F7F_0101,
            reference: Bintime::new(1_672_531_200, 0),
            origin: Bintime::new(1_672_531_199, 1 << 32),
            receive: Bintime::new(1_672_531_199, 1 << 33),
            transmit: Bintime::new(1_672_531_200, 0),
        }
    }

    #[test]
    fn round_trip_preserves_all_fields() {
        let pkt = sample_packet();
        let bytes = serialize(&pkt);
        assert_eq!(bytes.len(), PACKET_SIZE);
        let back = deserialize(&bytes).expect("48 bytes should decode");
        assert_eq!(back.stratum, pkt.stratum);
        assert_eq!(back.poll, pkt.poll);
        assert_eq!(back.precision, pkt.precision);
        assert_eq!(back.refid, pkt.refid);
        assert_eq!(back.leap, pkt.leap);
        assert_eq!(back.mode, pkt.mode);
        // Transmit/origin/receive/reference only round-trip to 32-bit
        // sub-second resolution (the wire format's native precision).
        assert_eq!(back.transmit.sec, pkt.transmit.sec);
        assert_eq!(back.transmit.frac, pkt.transmit.frac);
    }

    #[test]
    fn short_buffer_fails_to_decode() {
        let short = [0u8; 47];
        assert!(deserialize(&short).is_none());
    }

    #[test]
    fn mode_field_round_trips_through_header_byte() {
        let pkt = sample_packet();
        let bytes = serialize(&pkt);
        assert_eq!(bytes[0] & 0b111, Mode::Server as u8);
        assert_eq!((bytes[0] >> 3) & 0b11111, NTP_VERSION);
    }

    #[test]
    fn kiss_code_decodes_known_ascii_codes() {
        let deny = u32::from_be_bytes(*b"DENY");
        assert_eq!(KissCode::from_refid(deny), KissCode::Deny);
        let other = u32::from_be_bytes(*b"XXXX");
        assert_eq!(KissCode::from_refid(other), KissCode::Other(*b"XXXX"));
    }

    #[test]
    fn dump_includes_stratum_and_refid() {
        let pkt = sample_packet();
        let s = dump(&pkt);
        assert!(s.contains("stratum=3"));
        assert!(s.contains("7f7f0101"));
    }
}
