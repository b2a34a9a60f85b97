//! Per-packet accumulators.
//!
//! Concrete counters are represented as variants of a single `Counter` enum
//! rather than an abstract-base-class hierarchy: the dispatcher never needs
//! dynamic dispatch across an open set of types, only the fixed catalogue of
//! §4.1, so a closed enum keeps `process`/`get`/`reset` as plain `match`
//! arms.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{NetSpotError, Result};

/// The lowest protocol layer a counter needs touched. Informational only.
pub const LAYER_IP: u8 = 1;
pub const LAYER_IP_PAYLOAD: u8 = 2;
pub const LAYER_TCP: u8 = 3;

/// TCP control bits relevant to the SYN/ACK counters, decoded once by the
/// sniffer's packet parser and handed to every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const SYN: u8 = 0x02;
    pub const ACK: u8 = 0x10;

    pub fn is_syn(&self) -> bool {
        self.0 & Self::SYN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.0 & Self::ACK != 0
    }
}

/// The minimal per-packet view every counter needs. Built once per packet by
/// the sniffer's parser and fanned out to every registered counter.
#[derive(Debug, Clone, Copy)]
pub struct PacketInfo {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    /// Length of the IP packet beyond the IP header (IP_BYTES reading).
    pub ip_payload_len: u32,
    pub has_icmp: bool,
    pub tcp_flags: Option<TcpFlags>,
}

/// Concrete counter catalogue (§4.1). Identity (for the dispatcher's
/// counter map and a Statistic's `needs`) is the string returned by `name`,
/// which already encodes the parametric key for `IpToIp`.
#[derive(Debug, Clone)]
pub enum Counter {
    Ip(u64),
    Icmp(u64),
    Syn(u64),
    Ack(u64),
    IpBytes(u64),
    UniqueSrcAddr(HashSet<IpAddr>),
    UniqueDstAddr(HashSet<IpAddr>),
    IpToIp { a: IpAddr, b: IpAddr, count: u64 },
}

impl Counter {
    pub fn ip() -> Self {
        Counter::Ip(0)
    }
    pub fn icmp() -> Self {
        Counter::Icmp(0)
    }
    pub fn syn() -> Self {
        Counter::Syn(0)
    }
    pub fn ack() -> Self {
        Counter::Ack(0)
    }
    pub fn ip_bytes() -> Self {
        Counter::IpBytes(0)
    }
    pub fn unique_src_addr() -> Self {
        Counter::UniqueSrcAddr(HashSet::new())
    }
    pub fn unique_dst_addr() -> Self {
        Counter::UniqueDstAddr(HashSet::new())
    }

    /// Constructs the IP-pair counter, validating both addresses and that
    /// they differ (§4.1).
    pub fn ip_to_ip(a: &str, b: &str) -> Result<Self> {
        let a: IpAddr = a
            .parse()
            .map_err(|_| NetSpotError::InvalidConfig(format!("not a valid IP address: {a}")))?;
        let b: IpAddr = b
            .parse()
            .map_err(|_| NetSpotError::InvalidConfig(format!("not a valid IP address: {b}")))?;
        if a == b {
            return Err(NetSpotError::InvalidConfig(
                "IP_TO_IP requires two distinct addresses".into(),
            ));
        }
        Ok(Counter::IpToIp { a, b, count: 0 })
    }

    pub fn layer(&self) -> u8 {
        match self {
            Counter::Ip(_) => LAYER_IP,
            Counter::Icmp(_) => LAYER_IP_PAYLOAD,
            Counter::Syn(_) | Counter::Ack(_) => LAYER_TCP,
            Counter::IpBytes(_) => LAYER_IP_PAYLOAD,
            Counter::UniqueSrcAddr(_) | Counter::UniqueDstAddr(_) => LAYER_IP_PAYLOAD,
            Counter::IpToIp { .. } => LAYER_IP_PAYLOAD,
        }
    }

    /// Stable identity, used as the key in the sniffer's counter map.
    pub fn name(&self) -> String {
        match self {
            Counter::Ip(_) => "IP".to_string(),
            Counter::Icmp(_) => "ICMP".to_string(),
            Counter::Syn(_) => "SYN".to_string(),
            Counter::Ack(_) => "ACK".to_string(),
            Counter::IpBytes(_) => "IP_BYTES".to_string(),
            Counter::UniqueSrcAddr(_) => "UNIQUE_SRC_ADDR".to_string(),
            Counter::UniqueDstAddr(_) => "UNIQUE_DST_ADDR".to_string(),
            Counter::IpToIp { a, b, .. } => {
                // Unordered pair: sort lexicographically so identity and
                // matching are direction-agnostic.
                let (lo, hi) = Self::sorted_pair(*a, *b);
                format!("IP_TO_IP_{lo}_{hi}")
            }
        }
    }

    fn sorted_pair(a: IpAddr, b: IpAddr) -> (IpAddr, IpAddr) {
        if a.to_string() <= b.to_string() {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Reconstructs a fresh, zeroed counter from its `name()` identity. Used
    /// by the monitor to register the counters a newly loaded Statistic
    /// `needs()`, without the monitor having to know each counter's own
    /// constructor.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "IP" => Ok(Counter::ip()),
            "ICMP" => Ok(Counter::icmp()),
            "SYN" => Ok(Counter::syn()),
            "ACK" => Ok(Counter::ack()),
            "IP_BYTES" => Ok(Counter::ip_bytes()),
            "UNIQUE_SRC_ADDR" => Ok(Counter::unique_src_addr()),
            "UNIQUE_DST_ADDR" => Ok(Counter::unique_dst_addr()),
            other => {
                let rest = other.strip_prefix("IP_TO_IP_").ok_or_else(|| {
                    NetSpotError::InvalidConfig(format!("unknown counter: {other}"))
                })?;
                let (a, b) = rest.split_once('_').ok_or_else(|| {
                    NetSpotError::InvalidConfig(format!("malformed IP_TO_IP counter name: {other}"))
                })?;
                Counter::ip_to_ip(a, b)
            }
        }
    }

    pub fn process(&mut self, pkt: &PacketInfo) {
        match self {
            Counter::Ip(c) => *c += 1,
            Counter::Icmp(c) => {
                if pkt.has_icmp {
                    *c += 1;
                }
            }
            Counter::Syn(c) => {
                if pkt.tcp_flags.is_some_and(|f| f.is_syn()) {
                    *c += 1;
                }
            }
            Counter::Ack(c) => {
                if pkt.tcp_flags.is_some_and(|f| f.is_ack()) {
                    *c += 1;
                }
            }
            Counter::IpBytes(c) => *c += pkt.ip_payload_len as u64,
            Counter::UniqueSrcAddr(set) => {
                set.insert(pkt.src_ip);
            }
            Counter::UniqueDstAddr(set) => {
                set.insert(pkt.dst_ip);
            }
            Counter::IpToIp { a, b, count } => {
                let (lo, hi) = Self::sorted_pair(*a, *b);
                let (plo, phi) = Self::sorted_pair(pkt.src_ip, pkt.dst_ip);
                if lo == plo && hi == phi {
                    *count += 1;
                }
            }
        }
    }

    /// Numeric reading. All readings are exact integers; `f64` is used only
    /// so statistics can divide without an intermediate cast.
    pub fn get(&self) -> f64 {
        match self {
            Counter::Ip(c) | Counter::Icmp(c) | Counter::Syn(c) | Counter::Ack(c)
            | Counter::IpBytes(c) => *c as f64,
            Counter::UniqueSrcAddr(set) | Counter::UniqueDstAddr(set) => set.len() as f64,
            Counter::IpToIp { count, .. } => *count as f64,
        }
    }

    pub fn reset(&mut self) {
        match self {
            Counter::Ip(c) | Counter::Icmp(c) | Counter::Syn(c) | Counter::Ack(c)
            | Counter::IpBytes(c) => *c = 0,
            Counter::UniqueSrcAddr(set) | Counter::UniqueDstAddr(set) => set.clear(),
            Counter::IpToIp { count, .. } => *count = 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(src: &str, dst: &str) -> PacketInfo {
        PacketInfo {
            src_ip: src.parse().unwrap(),
            dst_ip: dst.parse().unwrap(),
            ip_payload_len: 40,
            has_icmp: false,
            tcp_flags: None,
        }
    }

    #[test]
    fn ip_counter_counts_every_packet() {
        let mut c = Counter::ip();
        c.process(&pkt("10.0.0.1", "10.0.0.2"));
        c.process(&pkt("10.0.0.3", "10.0.0.4"));
        assert_eq!(c.get(), 2.0);
        c.reset();
        assert_eq!(c.get(), 0.0);
    }

    #[test]
    fn syn_and_ack_are_independent() {
        let mut syn = Counter::syn();
        let mut ack = Counter::ack();
        let mut p = pkt("10.0.0.1", "10.0.0.2");
        p.tcp_flags = Some(TcpFlags(TcpFlags::SYN));
        syn.process(&p);
        ack.process(&p);
        assert_eq!(syn.get(), 1.0);
        assert_eq!(ack.get(), 0.0);
    }

    #[test]
    fn unique_addr_counters_use_set_cardinality() {
        let mut src = Counter::unique_src_addr();
        src.process(&pkt("10.0.0.1", "10.0.0.9"));
        src.process(&pkt("10.0.0.1", "10.0.0.8"));
        src.process(&pkt("10.0.0.2", "10.0.0.8"));
        assert_eq!(src.get(), 2.0);
    }

    #[test]
    fn ip_to_ip_requires_distinct_valid_addresses() {
        assert!(Counter::ip_to_ip("10.0.0.1", "10.0.0.1").is_err());
        assert!(Counter::ip_to_ip("10.0.0.1", "not-an-ip").is_err());
        assert!(Counter::ip_to_ip("10.0.0.1", "10.0.0.2").is_ok());
    }

    #[test]
    fn ip_to_ip_is_direction_agnostic() {
        let mut c = Counter::ip_to_ip("10.0.0.1", "10.0.0.2").unwrap();
        c.process(&pkt("10.0.0.1", "10.0.0.2"));
        c.process(&pkt("10.0.0.2", "10.0.0.1"));
        c.process(&pkt("10.0.0.1", "10.0.0.9"));
        assert_eq!(c.get(), 2.0);
    }

    #[test]
    fn from_name_reconstructs_registrable_counter() {
        let original = Counter::ip_to_ip("10.0.0.2", "10.0.0.1").unwrap();
        let rebuilt = Counter::from_name(&original.name()).unwrap();
        assert_eq!(rebuilt.name(), original.name());
        assert!(Counter::from_name("SYN").is_ok());
        assert!(Counter::from_name("NOT_A_COUNTER").is_err());
    }

    #[test]
    fn name_is_unordered_pair() {
        let a = Counter::ip_to_ip("10.0.0.1", "10.0.0.2").unwrap();
        let b = Counter::ip_to_ip("10.0.0.2", "10.0.0.1").unwrap();
        assert_eq!(a.name(), b.name());
    }
}
