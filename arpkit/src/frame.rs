//! # Ethernet/ARP Frame Codec
//!
//! ## Purpose
//!
//! This module builds and parses the 42-byte Ethernet II + ARP frames the
//! engine sends and receives on raw sockets.
//!
//! ## How it works
//!
//! `etherparse` handles the Ethernet II layer; the 28-byte ARP payload is
//! serialized field by field in network byte order, so the wire layout is
//! exact regardless of host endianness. Construction is pure and performs no
//! I/O.
//!
//! ## Main components
//!
//! - `ArpFrame`: both header layers as typed fields, with `to_bytes()` and
//!   `from_slice()`.
//! - `ArpOperation`: the request/reply opcode.

use etherparse::{EtherType, Ethernet2Header};

use crate::ipv4::Ipv4Addr;
use crate::mac::MacAddr;

/// Total length of an Ethernet+ARP frame on the wire.
pub const ARP_FRAME_LEN: usize = 42;

const ETH_HEADER_LEN: usize = 14;
const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;
const IPV4_LEN: u8 = 4;

/// ARP opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOperation {
    Request = 1,
    Reply = 2,
}

impl ArpOperation {
    fn from_wire(value: u16) -> Option<ArpOperation> {
        match value {
            1 => Some(ArpOperation::Request),
            2 => Some(ArpOperation::Reply),
            _ => None,
        }
    }
}

/// A complete Ethernet II + ARP frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpFrame {
    pub dest_mac: MacAddr,
    pub src_mac: MacAddr,
    pub operation: ArpOperation,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpFrame {
    /// Builds a frame field by field.
    pub fn new(
        src_mac: MacAddr,
        dest_mac: MacAddr,
        operation: ArpOperation,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> ArpFrame {
        ArpFrame {
            dest_mac,
            src_mac,
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// The broadcast request asking who owns `target_ip`.
    pub fn request(our_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> ArpFrame {
        ArpFrame::new(
            our_mac,
            MacAddr::BROADCAST,
            ArpOperation::Request,
            our_mac,
            sender_ip,
            MacAddr::ZERO,
            target_ip,
        )
    }

    /// Serializes the frame into its exact wire layout: Ethertype 0x0806,
    /// hardware type 1, protocol type 0x0800, and every multi-byte field in
    /// network order.
    pub fn to_bytes(&self) -> [u8; ARP_FRAME_LEN] {
        let mut buf = [0u8; ARP_FRAME_LEN];
        let eth = Ethernet2Header {
            source: self.src_mac.octets(),
            destination: self.dest_mac.octets(),
            ether_type: EtherType::ARP,
        };
        buf[..ETH_HEADER_LEN].copy_from_slice(&eth.to_bytes());
        buf[14..16].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        buf[16..18].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
        buf[18] = MacAddr::LEN as u8;
        buf[19] = IPV4_LEN;
        buf[20..22].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buf[22..28].copy_from_slice(&self.sender_mac.octets());
        buf[28..32].copy_from_slice(&self.sender_ip.octets());
        buf[32..38].copy_from_slice(&self.target_mac.octets());
        buf[38..42].copy_from_slice(&self.target_ip.octets());
        buf
    }

    /// Parses a received frame. Returns `None` for anything that is not a
    /// complete Ethernet-over-IPv4 ARP frame.
    pub fn from_slice(buf: &[u8]) -> Option<ArpFrame> {
        let (eth, rest) = Ethernet2Header::from_slice(buf).ok()?;
        if eth.ether_type != EtherType::ARP || rest.len() < ARP_FRAME_LEN - ETH_HEADER_LEN {
            return None;
        }
        if u16::from_be_bytes([rest[0], rest[1]]) != HTYPE_ETHERNET
            || u16::from_be_bytes([rest[2], rest[3]]) != PTYPE_IPV4
            || rest[4] != MacAddr::LEN as u8
            || rest[5] != IPV4_LEN
        {
            return None;
        }
        let operation = ArpOperation::from_wire(u16::from_be_bytes([rest[6], rest[7]]))?;
        Some(ArpFrame {
            dest_mac: MacAddr::from_octets(eth.destination),
            src_mac: MacAddr::from_octets(eth.source),
            operation,
            sender_mac: MacAddr::from_octets(rest[8..14].try_into().ok()?),
            sender_ip: Ipv4Addr::from(u32::from_be_bytes(rest[14..18].try_into().ok()?)),
            target_mac: MacAddr::from_octets(rest[18..24].try_into().ok()?),
            target_ip: Ipv4Addr::from(u32::from_be_bytes(rest[24..28].try_into().ok()?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ARP_FRAME_LEN, ArpFrame, ArpOperation};
    use crate::ipv4::Ipv4Addr;
    use crate::mac::MacAddr;

    fn sample_frame() -> ArpFrame {
        ArpFrame::new(
            "11:11:11:11:11:11".parse().unwrap(),
            "22:22:22:22:22:22".parse().unwrap(),
            ArpOperation::Reply,
            "33:33:33:33:33:33".parse().unwrap(),
            "1.2.3.4".parse().unwrap(),
            "44:44:44:44:44:44".parse().unwrap(),
            "5.6.7.8".parse().unwrap(),
        )
    }

    #[test]
    fn wire_layout_is_exact() {
        let bytes = sample_frame().to_bytes();
        assert_eq!(bytes.len(), ARP_FRAME_LEN);
        assert_eq!(&bytes[..6], &[0x22; 6]);
        assert_eq!(&bytes[6..12], &[0x11; 6]);
        assert_eq!(&bytes[12..14], &[0x08, 0x06]);
        assert_eq!(&bytes[14..16], &[0x00, 0x01]);
        assert_eq!(&bytes[16..18], &[0x08, 0x00]);
        assert_eq!(bytes[18], 6);
        assert_eq!(bytes[19], 4);
        assert_eq!(&bytes[20..22], &[0x00, 0x02]);
        assert_eq!(&bytes[28..32], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[38..42], &[0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn request_is_broadcast_with_unknown_target() {
        let our_mac: MacAddr = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let sender: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let target: Ipv4Addr = "10.0.0.2".parse().unwrap();
        let frame = ArpFrame::request(our_mac, sender, target);
        assert_eq!(frame.dest_mac, MacAddr::BROADCAST);
        assert_eq!(frame.src_mac, our_mac);
        assert_eq!(frame.operation, ArpOperation::Request);
        assert_eq!(frame.target_mac, MacAddr::ZERO);
        assert_eq!(frame.target_ip, target);
    }

    #[test]
    fn serialization_round_trip() {
        let frame = sample_frame();
        let parsed = ArpFrame::from_slice(&frame.to_bytes()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn parse_tolerates_trailing_padding() {
        // Short Ethernet frames arrive padded to the 60-byte minimum.
        let mut padded = [0u8; 60];
        padded[..ARP_FRAME_LEN].copy_from_slice(&sample_frame().to_bytes());
        assert_eq!(ArpFrame::from_slice(&padded).unwrap(), sample_frame());
    }

    #[test]
    fn parse_rejects_foreign_frames() {
        let mut bytes = sample_frame().to_bytes();
        bytes[12] = 0x08;
        bytes[13] = 0x00; // IPv4, not ARP
        assert!(ArpFrame::from_slice(&bytes).is_none());

        let bytes = sample_frame().to_bytes();
        assert!(ArpFrame::from_slice(&bytes[..20]).is_none());

        let mut bytes = sample_frame().to_bytes();
        bytes[21] = 9; // unknown opcode
        assert!(ArpFrame::from_slice(&bytes).is_none());
    }
}
