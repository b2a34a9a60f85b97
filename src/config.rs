//! CLI argument parsing (`clap`) and INI-style config-file loading (§6),
//! producing the `MonitorConfig` and per-statistic SPOT overrides consumed
//! by `Monitor::from_config_file`. Grounded in the teacher's `config.rs`
//! (`clap::Parser`-derived `CliArgs`, a `load_config` entry point merging
//! CLI overrides onto a file-backed config), swapped from TOML/`toml` to
//! INI/`ini` because §6 specifies INI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use ini::Ini;

use crate::error::{NetSpotError, Result};
use crate::sniffer::SourceKind;
use crate::spot::SpotConfig;

/// The five keys of §4.3, plus the SPOT defaults and per-statistic
/// overrides loaded from the `[DEFAULT]`/per-stat INI sections.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: f64,
    pub record_file: Option<PathBuf>,
    pub source: String,
    pub source_type: SourceKind,
    pub sniffing_filter: Option<String>,
    pub default_spot: SpotConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval: 2.0,
            record_file: None,
            source: "all".to_string(),
            source_type: SourceKind::Iface,
            sniffing_filter: None,
            default_spot: SpotConfig::default(),
        }
    }
}

/// One statistic to load at startup: its class name, any positional
/// parameters (for parametric stats), and its SPOT configuration (already
/// merged with `[DEFAULT]`).
#[derive(Debug, Clone)]
pub struct StatSpec {
    pub class_name: String,
    pub params: Vec<String>,
    pub spot: SpotConfig,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub monitor: MonitorConfig,
    pub stats: Vec<StatSpec>,
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// INI config file to load.
    #[arg(short, long, default_value = "config.ini")]
    pub config: String,

    /// Overrides `source`/`source_type` to a live interface.
    #[arg(long)]
    pub iface: Option<String>,

    /// Overrides `record_file`.
    #[arg(long = "record-file")]
    pub record_file: Option<String>,

    /// Raises the terminal log level; repeatable.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(NetSpotError::InvalidConfig(format!(
            "not a boolean: {other}"
        ))),
    }
}

fn parse_f64(key: &str, s: &str) -> Result<f64> {
    s.trim()
        .parse()
        .map_err(|_| NetSpotError::InvalidConfig(format!("{key} is not numeric: {s}")))
}

fn parse_u32(key: &str, s: &str) -> Result<u32> {
    s.trim()
        .parse()
        .map_err(|_| NetSpotError::InvalidConfig(format!("{key} is not an integer: {s}")))
}

/// Applies recognised SPOT keys from an INI section onto a base config,
/// leaving unrecognised keys (e.g. `param`, handled by the caller) alone.
fn apply_spot_overrides(base: SpotConfig, props: &ini::Properties) -> Result<SpotConfig> {
    let mut cfg = base;
    if let Some(v) = props.get("q") {
        cfg.q = parse_f64("q", v)?;
    }
    if let Some(v) = props.get("n_init") {
        cfg.n_init = parse_u32("n_init", v)?;
    }
    if let Some(v) = props.get("level") {
        cfg.level = parse_f64("level", v)?;
    }
    if let Some(v) = props.get("up") {
        cfg.up = parse_bool(v)?;
    }
    if let Some(v) = props.get("down") {
        cfg.down = parse_bool(v)?;
    }
    if let Some(v) = props.get("bounded") {
        cfg.bounded = parse_bool(v)?;
    }
    if let Some(v) = props.get("max_excess") {
        cfg.max_excess = parse_u32("max_excess", v)?;
    }
    Ok(cfg)
}

/// Parses the §6 INI format into a `LoadedConfig`. `[config]` supplies the
/// five `MonitorConfig` keys; `[DEFAULT]`/`[default]` supplies SPOT
/// defaults; `[statistics]` selects parameter-less stats; any other section
/// is a dedicated per-stat section — parametric (carrying `param = a, b`) or
/// simply a tuned non-parametric stat, loaded even when it's absent (or
/// `false`) under `[statistics]`.
pub fn from_ini_str(contents: &str) -> Result<LoadedConfig> {
    let ini = Ini::load_from_str(contents)
        .map_err(|e| NetSpotError::InvalidConfig(e.to_string()))?;

    let mut monitor = MonitorConfig::default();
    if let Some(section) = ini.section(Some("config")) {
        if let Some(v) = section.get("interval") {
            monitor.interval = parse_f64("interval", v)?;
        }
        if let Some(v) = section.get("record_file") {
            monitor.record_file = Some(PathBuf::from(v));
        }
        if let Some(v) = section.get("source") {
            monitor.source = v.to_string();
        }
        if let Some(v) = section.get("source_type") {
            monitor.source_type = match v {
                "iface" => SourceKind::Iface,
                "file" => SourceKind::File,
                other => {
                    return Err(NetSpotError::InvalidConfig(format!(
                        "source_type must be iface or file, got {other}"
                    )))
                }
            };
        }
        if let Some(v) = section.get("sniffing_filter") {
            monitor.sniffing_filter = Some(v.to_string());
        }
    }

    let default_section = ini
        .section(Some("DEFAULT"))
        .or_else(|| ini.section(Some("default")));
    if let Some(section) = default_section {
        monitor.default_spot = apply_spot_overrides(monitor.default_spot, section)?;
    }

    let mut stats = Vec::new();
    if let Some(section) = ini.section(Some("statistics")) {
        for (name, value) in section.iter() {
            if parse_bool(value)? {
                let overrides = ini.section(Some(name));
                let spot = match overrides {
                    Some(props) => apply_spot_overrides(monitor.default_spot, props)?,
                    None => monitor.default_spot,
                };
                stats.push(StatSpec {
                    class_name: name.to_string(),
                    params: Vec::new(),
                    spot,
                });
            }
        }
    }

    // A standalone section names either a parametric stat (carrying
    // `param = a, b`, and not listed under `[statistics]`: its presence
    // there would be boolean, not parametric) or a non-parametric stat that
    // is tuned but never flagged `true` under `[statistics]` — both load the
    // stat with its merged SPOT config.
    for (section_name, props) in ini.iter() {
        let Some(section_name) = section_name else {
            continue;
        };
        if matches!(section_name, "config" | "DEFAULT" | "default" | "statistics") {
            continue;
        }
        if stats.iter().any(|s| s.class_name == section_name) {
            continue;
        }
        if let Some(param_list) = props.get("param") {
            let params = param_list.split(',').map(|s| s.trim().to_string()).collect();
            let spot = apply_spot_overrides(monitor.default_spot, props)?;
            stats.push(StatSpec {
                class_name: section_name.to_string(),
                params,
                spot,
            });
        } else if crate::statistic::AVAILABLE_STATS.contains(&section_name) {
            let spot = apply_spot_overrides(monitor.default_spot, props)?;
            stats.push(StatSpec {
                class_name: section_name.to_string(),
                params: Vec::new(),
                spot,
            });
        }
    }

    Ok(LoadedConfig { monitor, stats })
}

pub fn from_file(path: &Path) -> Result<LoadedConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| NetSpotError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    from_ini_str(&contents)
}

/// Parses `CliArgs`, loads the named INI file if present, then applies CLI
/// overrides on top — same merge order as the teacher's `load_config`.
pub fn load() -> Result<(LoadedConfig, CliArgs)> {
    let cli_args = CliArgs::parse();
    let mut loaded = if Path::new(&cli_args.config).is_file() {
        from_file(Path::new(&cli_args.config))?
    } else {
        LoadedConfig::default()
    };

    if let Some(iface) = &cli_args.iface {
        loaded.monitor.source = iface.clone();
        loaded.monitor.source_type = SourceKind::Iface;
    }
    if let Some(record_file) = &cli_args.record_file {
        loaded.monitor.record_file = Some(PathBuf::from(record_file));
    }

    Ok((loaded, cli_args))
}

/// Human-readable `(key, value)` pairs for the `config` shell command.
pub fn monitor_config_entries(cfg: &MonitorConfig) -> Vec<(&'static str, String)> {
    vec![
        ("interval", cfg.interval.to_string()),
        (
            "record_file",
            cfg.record_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ),
        ("source", cfg.source.clone()),
        ("source_type", cfg.source_type.as_str().to_string()),
        (
            "sniffing_filter",
            cfg.sniffing_filter.clone().unwrap_or_default(),
        ),
    ]
}

/// Sets one of the five `MonitorConfig` keys by name, auto-detecting
/// `source_type` when `source` is set (§6, §9's accepted open question).
pub fn set_key(cfg: &mut MonitorConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "interval" => cfg.interval = parse_f64("interval", value)?,
        "record_file" => cfg.record_file = Some(PathBuf::from(value)),
        "source" => {
            cfg.source = value.to_string();
            cfg.source_type = if Path::new(value).is_file() {
                SourceKind::File
            } else {
                SourceKind::Iface
            };
        }
        "source_type" => {
            cfg.source_type = match value {
                "iface" => SourceKind::Iface,
                "file" => SourceKind::File,
                other => {
                    return Err(NetSpotError::InvalidConfig(format!(
                        "source_type must be iface or file, got {other}"
                    )))
                }
            }
        }
        "sniffing_filter" => cfg.sniffing_filter = Some(value.to_string()),
        other => {
            return Err(NetSpotError::InvalidConfig(format!(
                "unknown config key: {other}"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.interval, 2.0);
        assert_eq!(cfg.source, "all");
        assert_eq!(cfg.source_type, SourceKind::Iface);
        assert!(cfg.record_file.is_none());
    }

    #[test]
    fn parses_config_section_and_defaults() {
        let ini = r#"
[config]
interval = 5
source = eth0
source_type = iface

[DEFAULT]
q = 0.0001
n_init = 500

[statistics]
R_SYN = true
R_ACK = false
"#;
        let loaded = from_ini_str(ini).unwrap();
        assert_eq!(loaded.monitor.interval, 5.0);
        assert_eq!(loaded.monitor.source, "eth0");
        assert_eq!(loaded.monitor.default_spot.q, 0.0001);
        assert_eq!(loaded.monitor.default_spot.n_init, 500);
        assert_eq!(loaded.stats.len(), 1);
        assert_eq!(loaded.stats[0].class_name, "R_SYN");
        assert_eq!(loaded.stats[0].spot.n_init, 500);
    }

    #[test]
    fn standalone_tuned_section_loads_without_statistics_flag() {
        let ini = r#"
[DEFAULT]
q = 0.0001

[R_ICMP]
q = 0.05
n_init = 200
"#;
        let loaded = from_ini_str(ini).unwrap();
        assert_eq!(loaded.stats.len(), 1);
        assert_eq!(loaded.stats[0].class_name, "R_ICMP");
        assert!(loaded.stats[0].params.is_empty());
        assert_eq!(loaded.stats[0].spot.q, 0.05);
        assert_eq!(loaded.stats[0].spot.n_init, 200);
    }

    #[test]
    fn parametric_section_carries_params() {
        let ini = r#"
[NB_IP_TO_IP_PKTS]
param = 10.0.0.1, 10.0.0.2
q = 0.01
"#;
        let loaded = from_ini_str(ini).unwrap();
        assert_eq!(loaded.stats.len(), 1);
        assert_eq!(loaded.stats[0].params, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(loaded.stats[0].spot.q, 0.01);
    }

    #[test]
    fn set_key_auto_detects_source_type() {
        let mut cfg = MonitorConfig::default();
        set_key(&mut cfg, "source", "eth0").unwrap();
        assert_eq!(cfg.source_type, SourceKind::Iface);
    }

    #[test]
    fn set_key_rejects_unknown_key() {
        let mut cfg = MonitorConfig::default();
        assert!(set_key(&mut cfg, "bogus", "x").is_err());
    }
}
