//! Integration-style scenario tests (§8), driving the pipeline over
//! synthetic in-memory packet batches — no live capture or `.pcap` fixture.

use std::net::IpAddr;

use netspot::config::MonitorConfig;
use netspot::counter::{Counter, PacketInfo, TcpFlags};
use netspot::monitor::Monitor;
use netspot::sniffer::Sniffer;
use netspot::spot::SpotConfig;
use netspot::statistic::Statistic;

fn ip_packet(src: &str, dst: &str, tcp_flags: Option<TcpFlags>) -> PacketInfo {
    PacketInfo {
        src_ip: src.parse::<IpAddr>().unwrap(),
        dst_ip: dst.parse::<IpAddr>().unwrap(),
        ip_payload_len: 64,
        has_icmp: false,
        tcp_flags,
    }
}

/// Scenario 1: file replay, no SYNs. 100 windows of one plain IP packet
/// each; R_SYN must read 0 every window and never alarm.
#[test]
fn scenario_1_no_syns_never_alarms() {
    let sniffer = Sniffer::new();
    sniffer.load(vec![Counter::syn(), Counter::ip()]);
    let mut stat = Statistic::r_syn(SpotConfig {
        q: 1e-3,
        n_init: 10,
        level: 0.98,
        up: true,
        down: false,
        bounded: true,
        max_excess: 50,
    });

    let mut windows = 0u64;
    for i in 0..100 {
        sniffer.dispatch(&ip_packet("10.0.0.1", "10.0.0.2", None), i as f64 * 0.01);
        let readings = sniffer.get_values(&stat.needs());
        let outcome = stat.compute_and_monitor(&readings).unwrap();
        assert_eq!(outcome.value, 0.0);
        assert_ne!(outcome.status, 1);
        assert_ne!(outcome.status, -1);
        sniffer.reset();
        windows += 1;
    }

    let status = stat.spot_status();
    assert_eq!(status.n, windows);
    assert_eq!(status.up.al, Some(0));
}

/// Scenario 2: a SYN flood in one window after a calm calibrated baseline
/// raises exactly one up alarm, with `up_probability` below the risk `q`.
#[test]
fn scenario_2_syn_flood_raises_one_alarm() {
    let mut stat = Statistic::r_syn(SpotConfig {
        q: 1e-3,
        n_init: 50,
        level: 0.98,
        up: true,
        down: false,
        bounded: true,
        max_excess: 100,
    });

    let mut alarms = 0;
    let mut alarm_value = 0.0;
    let mut alarm_probability = 1.0;

    for i in 0..100u32 {
        // ~5% SYN ratio with small deterministic jitter.
        let jitter = (i % 7) as f64 * 0.1 - 0.3;
        let syn_ratio = (5.0 + jitter).max(0.0);
        let outcome = stat.compute_and_monitor(&[syn_ratio, 100.0]).unwrap();
        if outcome.status == 1 {
            alarms += 1;
            alarm_value = outcome.value;
            alarm_probability = stat.up_probability(alarm_value);
        }
    }

    let outcome = stat.compute_and_monitor(&[90.0, 100.0]).unwrap();
    if outcome.status == 1 {
        alarms += 1;
        alarm_value = outcome.value;
        alarm_probability = stat.up_probability(alarm_value);
    }

    assert_eq!(alarms, 1, "expected exactly one up alarm from the flood window");
    assert!(alarm_value > 50.0);
    assert!(alarm_probability < 1e-2);
}

/// Scenario 3: two disjoint IP-pair counters stay isolated from each other
/// and count packets regardless of src/dst direction.
#[test]
fn scenario_3_ip_to_ip_counters_are_isolated() {
    let sniffer = Sniffer::new();
    let ab = Counter::ip_to_ip("10.0.0.1", "10.0.0.2").unwrap();
    let cd = Counter::ip_to_ip("10.0.0.3", "10.0.0.4").unwrap();
    let ab_name = ab.name();
    let cd_name = cd.name();
    sniffer.load(vec![ab, cd]);

    for i in 0..10 {
        let (src, dst) = if i % 2 == 0 {
            ("10.0.0.1", "10.0.0.2")
        } else {
            ("10.0.0.2", "10.0.0.1")
        };
        sniffer.dispatch(&ip_packet(src, dst, None), i as f64);
    }
    for i in 0..3 {
        sniffer.dispatch(&ip_packet("10.0.0.3", "10.0.0.4", None), (100 + i) as f64);
    }

    let values = sniffer.get_values(&[ab_name, cd_name]);
    assert_eq!(values, vec![10.0, 3.0]);
}

/// Scenario 6: loading a parametric stat with an invalid address fails with
/// `InvalidConfig` and leaves the loaded list unchanged.
#[test]
fn scenario_6_invalid_ip_pair_rejected() {
    let monitor = Monitor::new(MonitorConfig::default());
    let result = monitor.load_stat(
        "NB_IP_TO_IP_PKTS",
        &["10.0.0.1".to_string(), "not-an-ip".to_string()],
        SpotConfig::default(),
    );
    assert!(result.is_err());
    assert!(monitor.loaded_stat_names().is_empty());
}
