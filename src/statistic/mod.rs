//! Derived statistics: a scalar function of a fixed tuple of counter
//! readings, paired with its own SPOT detector.
//!
//! Mirrors the `Counter` design: a closed enum of concrete kinds instead of
//! an abstract base class, since §4.4 fixes the catalogue. Parametric
//! statistics (`NB_IP_TO_IP_PKTS(a,b)`) carry the counter name they read
//! from as enum payload, same trick as `Counter::IpToIp`'s stored pair.

use crate::counter::Counter;
use crate::error::{NetSpotError, Result};
use crate::spot::{Spot, SpotConfig, SpotStatus, STATUS_ALARM_DOWN, STATUS_ALARM_UP, STATUS_CALIBRATED};

/// Non-parametric statistic names, in the order `stat` lists them.
pub const AVAILABLE_STATS: &[&str] = &[
    "R_SYN",
    "R_ACK",
    "R_ICMP",
    "AVG_PKT_BYTES",
    "NB_IP_PKTS",
    "SRC_DST_RATIO",
];

/// Parametric statistic class names (need `-p` arguments at `stat load`).
pub const PARAMETRIC_STATS: &[&str] = &["NB_IP_TO_IP_PKTS"];

#[derive(Debug, Clone)]
enum Kind {
    RSyn,
    RAck,
    RIcmp,
    AvgPktBytes,
    NbIpPkts,
    SrcDstRatio,
    NbIpToIpPkts { counter_name: String },
}

impl Kind {
    fn class_name(&self) -> &'static str {
        match self {
            Kind::RSyn => "R_SYN",
            Kind::RAck => "R_ACK",
            Kind::RIcmp => "R_ICMP",
            Kind::AvgPktBytes => "AVG_PKT_BYTES",
            Kind::NbIpPkts => "NB_IP_PKTS",
            Kind::SrcDstRatio => "SRC_DST_RATIO",
            Kind::NbIpToIpPkts { .. } => "NB_IP_TO_IP_PKTS",
        }
    }

    fn needs(&self) -> Vec<String> {
        match self {
            Kind::RSyn => vec![Counter::syn().name(), Counter::ip().name()],
            Kind::RAck => vec![Counter::ack().name(), Counter::ip().name()],
            Kind::RIcmp => vec![Counter::icmp().name(), Counter::ip().name()],
            Kind::AvgPktBytes => vec![Counter::ip_bytes().name(), Counter::ip().name()],
            Kind::NbIpPkts => vec![Counter::ip().name()],
            Kind::SrcDstRatio => vec![
                Counter::unique_src_addr().name(),
                Counter::unique_dst_addr().name(),
            ],
            Kind::NbIpToIpPkts { counter_name } => vec![counter_name.clone()],
        }
    }

    fn fmt(&self) -> &'static str {
        match self {
            Kind::NbIpPkts | Kind::NbIpToIpPkts { .. } => "%d",
            _ => "%.3f",
        }
    }

    /// `readings` are in exactly the order returned by `needs()`.
    fn compute(&self, readings: &[f64]) -> f64 {
        match self {
            Kind::RSyn => {
                let (syn, ip) = (readings[0], readings[1]);
                if syn == 0.0 || ip == 0.0 {
                    0.0
                } else {
                    100.0 * syn / ip
                }
            }
            Kind::RAck => {
                let (ack, ip) = (readings[0], readings[1]);
                if ack == 0.0 || ip == 0.0 {
                    0.0
                } else {
                    100.0 * ack / ip
                }
            }
            Kind::RIcmp => {
                let (icmp, ip) = (readings[0], readings[1]);
                if icmp == 0.0 || ip == 0.0 {
                    0.0
                } else {
                    100.0 * icmp / ip
                }
            }
            Kind::AvgPktBytes => {
                let (bytes, ip) = (readings[0], readings[1]);
                if bytes == 0.0 || ip == 0.0 {
                    0.0
                } else {
                    bytes / ip
                }
            }
            Kind::NbIpPkts => readings[0],
            Kind::SrcDstRatio => {
                let (src, dst) = (readings[0], readings[1]);
                if src == 0.0 || dst == 0.0 {
                    0.0
                } else {
                    src / dst
                }
            }
            Kind::NbIpToIpPkts { .. } => readings[0],
        }
    }
}

/// Outcome of one `compute_and_monitor` call, already classified per §4.4's
/// status table. `log_line`, when present, is the message the caller should
/// emit at the paired level.
#[derive(Debug, Clone)]
pub struct MonitorOutcome {
    pub value: f64,
    pub status: i32,
    pub warning: Option<String>,
    pub info: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Statistic {
    kind: Kind,
    /// Full identity: class name, plus a parametric suffix for parametric
    /// stats (mirrors `Counter::name`'s unordered-pair suffix).
    name: String,
    spot: Spot,
}

impl Statistic {
    fn new(kind: Kind, name: String, spot_config: SpotConfig) -> Self {
        Statistic {
            kind,
            name,
            spot: Spot::new(spot_config),
        }
    }

    pub fn r_syn(spot_config: SpotConfig) -> Self {
        Statistic::new(Kind::RSyn, "R_SYN".into(), spot_config)
    }
    pub fn r_ack(spot_config: SpotConfig) -> Self {
        Statistic::new(Kind::RAck, "R_ACK".into(), spot_config)
    }
    pub fn r_icmp(spot_config: SpotConfig) -> Self {
        Statistic::new(Kind::RIcmp, "R_ICMP".into(), spot_config)
    }
    pub fn avg_pkt_bytes(spot_config: SpotConfig) -> Self {
        Statistic::new(Kind::AvgPktBytes, "AVG_PKT_BYTES".into(), spot_config)
    }
    pub fn nb_ip_pkts(spot_config: SpotConfig) -> Self {
        Statistic::new(Kind::NbIpPkts, "NB_IP_PKTS".into(), spot_config)
    }
    pub fn src_dst_ratio(spot_config: SpotConfig) -> Self {
        Statistic::new(Kind::SrcDstRatio, "SRC_DST_RATIO".into(), spot_config)
    }

    /// Builds the IP-pair statistic, routed through `Counter::ip_to_ip` so
    /// both stat and counter reject the same malformed input the same way.
    pub fn nb_ip_to_ip_pkts(a: &str, b: &str, spot_config: SpotConfig) -> Result<Self> {
        let counter = Counter::ip_to_ip(a, b)?;
        let counter_name = counter.name();
        let name = format!("NB_IP_TO_IP_PKTS_{}", &counter_name["IP_TO_IP_".len()..]);
        Ok(Statistic::new(
            Kind::NbIpToIpPkts { counter_name },
            name,
            spot_config,
        ))
    }

    /// Builds any non-parametric statistic by class name; used by config and
    /// shell parsing. Parametric stats go through their own constructor
    /// since they need `-p` arguments.
    pub fn from_name(name: &str, spot_config: SpotConfig) -> Result<Self> {
        match name {
            "R_SYN" => Ok(Statistic::r_syn(spot_config)),
            "R_ACK" => Ok(Statistic::r_ack(spot_config)),
            "R_ICMP" => Ok(Statistic::r_icmp(spot_config)),
            "AVG_PKT_BYTES" => Ok(Statistic::avg_pkt_bytes(spot_config)),
            "NB_IP_PKTS" => Ok(Statistic::nb_ip_pkts(spot_config)),
            "SRC_DST_RATIO" => Ok(Statistic::src_dst_ratio(spot_config)),
            other => Err(NetSpotError::InvalidConfig(format!(
                "unknown statistic: {other}"
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Counter names this statistic reads from, in the order `compute`
    /// expects readings.
    pub fn needs(&self) -> Vec<String> {
        self.kind.needs()
    }

    pub fn fmt(&self) -> &'static str {
        self.kind.fmt()
    }

    pub fn config(&self) -> SpotConfig {
        self.spot.config()
    }

    pub fn spot_status(&self) -> SpotStatus {
        self.spot.status()
    }

    pub fn up_probability(&self, value: f64) -> f64 {
        self.spot.up_probability(value)
    }

    pub fn down_probability(&self, value: f64) -> f64 {
        self.spot.down_probability(value)
    }

    pub fn reset(&mut self) {
        self.spot.reset(None);
    }

    /// §4.4: compute the scalar, step the detector, classify the result.
    /// Fails with `DetectorError` if the underlying SPOT fit degenerates;
    /// the caller (the Monitor's window loop) skips the window on error.
    pub fn compute_and_monitor(&mut self, readings: &[f64]) -> Result<MonitorOutcome> {
        let value = self.kind.compute(readings);
        let status = self.spot.step(value)?;
        let (warning, info) = match status {
            STATUS_ALARM_UP => (
                Some(format!(
                    "{}: up alarm, value={:.3}, up_probability={:.6}",
                    self.name,
                    value,
                    self.spot.up_probability(value)
                )),
                None,
            ),
            STATUS_ALARM_DOWN => (
                Some(format!(
                    "{}: down alarm, value={:.3}, down_probability={:.6}",
                    self.name,
                    value,
                    self.spot.down_probability(value)
                )),
                None,
            ),
            STATUS_CALIBRATED => (None, Some(format!("{}: calibration completed", self.name))),
            _ => (None, None),
        };
        Ok(MonitorOutcome {
            value,
            status,
            warning,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rule_avoids_division_by_zero() {
        let s = Statistic::r_syn(SpotConfig::default());
        assert_eq!(s.kind.compute(&[0.0, 0.0]), 0.0);
        assert_eq!(s.kind.compute(&[5.0, 0.0]), 0.0);
    }

    #[test]
    fn r_syn_percentage() {
        let s = Statistic::r_syn(SpotConfig::default());
        assert_eq!(s.kind.compute(&[5.0, 100.0]), 5.0);
    }

    #[test]
    fn nb_ip_pkts_has_no_denominator() {
        let s = Statistic::nb_ip_pkts(SpotConfig::default());
        assert_eq!(s.kind.compute(&[42.0]), 42.0);
    }

    #[test]
    fn nb_ip_to_ip_pkts_rejects_invalid_params() {
        assert!(Statistic::nb_ip_to_ip_pkts("10.0.0.1", "not-an-ip", SpotConfig::default()).is_err());
    }

    #[test]
    fn nb_ip_to_ip_pkts_name_matches_its_counter() {
        let s = Statistic::nb_ip_to_ip_pkts("10.0.0.2", "10.0.0.1", SpotConfig::default()).unwrap();
        assert_eq!(s.needs(), vec![Counter::ip_to_ip("10.0.0.1", "10.0.0.2").unwrap().name()]);
    }

    #[test]
    fn compute_and_monitor_reports_calibration_then_alarm() {
        let mut s = Statistic::r_syn(SpotConfig {
            q: 1e-3,
            n_init: 20,
            level: 0.9,
            up: true,
            down: false,
            bounded: true,
            max_excess: 50,
        });
        let mut last = None;
        for i in 0..20u32 {
            let syn_ratio = 5.0 + (i % 3) as f64 * 0.1;
            last = Some(s.compute_and_monitor(&[syn_ratio, 100.0]).unwrap());
        }
        assert_eq!(last.unwrap().status, STATUS_CALIBRATED);
        let alarm = s.compute_and_monitor(&[95.0, 100.0]).unwrap();
        assert_eq!(alarm.status, STATUS_ALARM_UP);
        assert!(alarm.warning.is_some());
    }
}
