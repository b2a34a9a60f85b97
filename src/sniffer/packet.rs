//! Header parsing: raw capture bytes to `PacketInfo`, the minimal per-packet
//! view the counter dispatcher fans out. Mirrors the teacher's
//! `ParsedPacket::from_packet` (Ethernet → IPv4/IPv6 → TCP/UDP/ICMP), pared
//! down to the fields §4.1's counters actually read.

use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::IcmpPacket;
use pnet::packet::icmpv6::Icmpv6Packet;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::Packet;
use std::net::IpAddr;

use crate::counter::{PacketInfo, TcpFlags};

/// Parses one captured Ethernet frame. Returns `None` for anything that
/// isn't an IPv4/IPv6 frame — the dispatcher only ever sees IP traffic.
pub fn parse(data: &[u8]) -> Option<PacketInfo> {
    let eth = EthernetPacket::new(data)?;
    match eth.get_ethertype() {
        EtherTypes::Ipv4 => parse_ipv4(eth.payload()),
        EtherTypes::Ipv6 => parse_ipv6(eth.payload()),
        _ => None,
    }
}

fn parse_ipv4(payload: &[u8]) -> Option<PacketInfo> {
    let ip = Ipv4Packet::new(payload)?;
    let src_ip = IpAddr::V4(ip.get_source());
    let dst_ip = IpAddr::V4(ip.get_destination());
    let ip_payload_len = ip.payload().len() as u32;
    let proto = ip.get_next_level_protocol();
    let has_icmp = proto == IpNextHeaderProtocols::Icmp && IcmpPacket::new(ip.payload()).is_some();
    let tcp_flags = if proto == IpNextHeaderProtocols::Tcp {
        TcpPacket::new(ip.payload()).map(|tcp| TcpFlags(tcp.get_flags()))
    } else {
        None
    };
    Some(PacketInfo {
        src_ip,
        dst_ip,
        ip_payload_len,
        has_icmp,
        tcp_flags,
    })
}

fn parse_ipv6(payload: &[u8]) -> Option<PacketInfo> {
    let ip = Ipv6Packet::new(payload)?;
    let src_ip = IpAddr::V6(ip.get_source());
    let dst_ip = IpAddr::V6(ip.get_destination());
    let ip_payload_len = ip.payload().len() as u32;
    let proto = ip.get_next_header();
    let has_icmp =
        proto == IpNextHeaderProtocols::Icmpv6 && Icmpv6Packet::new(ip.payload()).is_some();
    let tcp_flags = if proto == IpNextHeaderProtocols::Tcp {
        TcpPacket::new(ip.payload()).map(|tcp| TcpFlags(tcp.get_flags()))
    } else {
        None
    };
    Some(PacketInfo {
        src_ip,
        dst_ip,
        ip_payload_len,
        has_icmp,
        tcp_flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_ipv4_tcp(flags: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(14 + 20 + 20);
        data.extend_from_slice(&[0x00; 6]); // dst mac
        data.extend_from_slice(&[0x01; 6]); // src mac
        data.extend_from_slice(&[0x08, 0x00]); // EtherType IPv4
        let ipv4 = [
            0x45, 0x00, 0x00, 0x28, // version/ihl, dscp, total len = 40
            0x00, 0x00, 0x00, 0x00, // id, flags/frag
            0x40, 0x06, 0x00, 0x00, // ttl, proto=TCP, checksum
            0x7F, 0x00, 0x00, 0x01, // src
            0x7F, 0x00, 0x00, 0x02, // dst
        ];
        data.extend_from_slice(&ipv4);
        let tcp = [
            0x00, 0x50, 0x00, 0x51, // ports
            0x00, 0x00, 0x00, 0x00, // seq
            0x00, 0x00, 0x00, 0x00, // ack
            0x50, flags, 0xFF, 0xFF, // offset, flags, window
            0x00, 0x00, 0x00, 0x00, // checksum, urgent
        ];
        data.extend_from_slice(&tcp);
        data
    }

    #[test]
    fn parses_ipv4_tcp_syn() {
        let data = eth_ipv4_tcp(0x02);
        let pkt = parse(&data).unwrap();
        assert_eq!(pkt.src_ip.to_string(), "127.0.0.1");
        assert_eq!(pkt.dst_ip.to_string(), "127.0.0.2");
        assert!(pkt.tcp_flags.unwrap().is_syn());
        assert!(!pkt.tcp_flags.unwrap().is_ack());
        assert!(!pkt.has_icmp);
    }

    #[test]
    fn non_ip_ethertype_is_skipped() {
        let mut data = vec![0x00; 12];
        data.extend_from_slice(&[0x08, 0x06]); // ARP
        data.extend_from_slice(&[0u8; 28]);
        assert!(parse(&data).is_none());
    }
}
