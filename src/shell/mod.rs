//! Interactive CLI shell (§6): a blocking stdin reader dispatching into a
//! `Shell` struct that owns the `Monitor`. Grounded in the original `cmd`-
//! module-derived line splitting (whitespace tokenizing, no shell-quoting)
//! and coloured with `shell::color` the way the original's `ShellColor`
//! marks errors/warnings/confirmations.

pub mod color;

use std::io::{self, BufRead, Write};

use log::LevelFilter;

use crate::config::monitor_config_entries;
use crate::error::NetSpotError;
use crate::monitor::Monitor;
use crate::spot::{SpotStatus, STATUS_CALIBRATED};
use crate::statistic::{AVAILABLE_STATS, PARAMETRIC_STATS};

const PROMPT: &str = "(netspot) # ";

const HELP_TEXT: &str = "\
monitor {start [-l|--live] | stop | status | reset}   lifecycle
stat                                                   list available/loaded stats
stat load <NAME...> [-p ARG...]                        load one or more statistics
stat unload <NAME...|*>                                unload statistics
inspect [NAME] [--full]                                print detector status
config [KEY [VALUE]]                                   get/set a config key
live                                                    toggle live printing of a running monitor
log                                                     toggle terminal log level
help                                                    this text
exit                                                    quit";

pub struct Shell {
    monitor: Monitor,
    runtime: tokio::runtime::Handle,
    verbose: bool,
}

impl Shell {
    pub fn new(monitor: Monitor, runtime: tokio::runtime::Handle) -> Self {
        Shell {
            monitor,
            runtime,
            verbose: false,
        }
    }

    /// Reads lines from stdin until EOF (`Ctrl-D`) or `exit`. Returns the
    /// process exit code.
    pub fn run(&mut self) -> i32 {
        let stdin = io::stdin();
        print!("{PROMPT}");
        let _ = io::stdout().flush();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                print!("{PROMPT}");
                let _ = io::stdout().flush();
                continue;
            }
            if tokens[0] == "exit" {
                return 0;
            }
            self.dispatch(&tokens);
            print!("{PROMPT}");
            let _ = io::stdout().flush();
        }
        0
    }

    fn dispatch(&mut self, tokens: &[&str]) {
        match tokens[0] {
            "monitor" => self.cmd_monitor(&tokens[1..]),
            "stat" => self.cmd_stat(&tokens[1..]),
            "inspect" => self.cmd_inspect(&tokens[1..]),
            "config" => self.cmd_config(&tokens[1..]),
            "live" => match self.monitor.toggle_live() {
                Ok(live) => println!("{}", color::ok_line(&format!("live = {live}"))),
                Err(e) => println!("{}", color::error_line(&e.to_string())),
            },
            "log" => {
                self.verbose = !self.verbose;
                let level = if self.verbose {
                    LevelFilter::Debug
                } else {
                    LevelFilter::Info
                };
                log::set_max_level(level);
                println!("{}", color::ok_line(&format!("log level = {level}")));
            }
            "help" => println!("{HELP_TEXT}"),
            other => println!("{}", color::error_line(&format!("unknown command: {other}"))),
        }
    }

    fn cmd_monitor(&mut self, args: &[&str]) {
        match args.first() {
            Some(&"start") => {
                let live = args.contains(&"-l") || args.contains(&"--live");
                match self.runtime.block_on(self.monitor.start(live)) {
                    Ok(()) => println!("{}", color::ok_line("monitor started")),
                    Err(e) => println!("{}", color::error_line(&e.to_string())),
                }
            }
            Some(&"stop") => {
                self.monitor.stop();
                println!("{}", color::ok_line("stop requested"));
            }
            Some(&"status") => {
                let state = if self.monitor.is_running() {
                    "running"
                } else {
                    "idle"
                };
                println!("monitor: {state}");
            }
            Some(&"reset") => match self.monitor.reset_all_stats() {
                Ok(()) => println!("{}", color::ok_line("all detectors reset")),
                Err(e) => println!("{}", color::error_line(&e.to_string())),
            },
            other => println!(
                "{}",
                color::error_line(&format!("usage: monitor {{start|stop|status|reset}}, got {other:?}"))
            ),
        }
    }

    fn cmd_stat(&mut self, args: &[&str]) {
        match args.first() {
            None => {
                let loaded = self.monitor.loaded_stat_names();
                for name in AVAILABLE_STATS {
                    let marker = if loaded.iter().any(|l| l == name) {
                        color::italic(&color::green(name))
                    } else {
                        name.to_string()
                    };
                    println!("{marker}");
                }
                for name in PARAMETRIC_STATS {
                    println!("{name}(...)");
                    for l in loaded.iter().filter(|l| l.starts_with(name)) {
                        println!("  {}", color::italic(&color::green(l)));
                    }
                }
            }
            Some(&"load") => {
                let rest = &args[1..];
                let split = rest.iter().position(|a| *a == "-p");
                let (names, params): (&[&str], &[&str]) = match split {
                    Some(i) => (&rest[..i], &rest[i + 1..]),
                    None => (rest, &[]),
                };
                let spot = self.monitor.config().default_spot;
                for name in names {
                    let params: Vec<String> = params.iter().map(|s| s.to_string()).collect();
                    match self.monitor.load_stat(name, &params, spot) {
                        Ok(()) => println!("{}", color::ok_line(&format!("loaded {name}"))),
                        Err(e) => report(e),
                    }
                }
            }
            Some(&"unload") => {
                for name in &args[1..] {
                    match self.monitor.unload_stat(name) {
                        Ok(()) => println!("{}", color::ok_line(&format!("unloaded {name}"))),
                        Err(e) => report(e),
                    }
                }
            }
            other => println!(
                "{}",
                color::error_line(&format!("usage: stat {{load|unload}} ..., got {other:?}"))
            ),
        }
    }

    fn cmd_inspect(&mut self, args: &[&str]) {
        let full = args.contains(&"--full");
        let name = args.iter().find(|a| !a.starts_with('-')).copied();
        let stats = self.monitor.stats();
        let stats = stats.lock().unwrap();
        let rows: Vec<_> = stats
            .iter()
            .filter(|s| match name {
                Some(n) => s.name() == n,
                None => true,
            })
            .collect();
        if rows.is_empty() {
            println!("{}", color::error_line("no matching loaded statistic"));
            return;
        }
        let header = if full {
            "statistics        n  al_up  z_up  al_down  z_down  t_up  Nt_up  ex_up  t_down  Nt_down  ex_down"
        } else {
            "statistics        n  al_up  z_up  al_down  z_down"
        };
        println!("{header}");
        for stat in rows {
            println!("{}", format_status_row(stat.name(), &stat.spot_status(), full));
        }
    }

    fn cmd_config(&mut self, args: &[&str]) {
        match args {
            [] => {
                let cfg = self.monitor.config();
                for (k, v) in monitor_config_entries(&cfg) {
                    println!("{k} = {v}");
                }
            }
            [key] => {
                let cfg = self.monitor.config();
                match monitor_config_entries(&cfg).into_iter().find(|(k, _)| k == key) {
                    Some((_, v)) => println!("{v}"),
                    None => println!("{}", color::error_line(&format!("unknown config key: {key}"))),
                }
            }
            [key, value] => match self.monitor.set_config_key(key, value) {
                Ok(()) => println!("{}", color::ok_line(&format!("{key} = {value}"))),
                Err(e) => report(e),
            },
            _ => println!("{}", color::error_line("usage: config [KEY [VALUE]]")),
        }
    }
}

/// Prints a malformed-input error (`InvalidConfig`) as a warning and any
/// other error kind as a hard error — the same split the original shell
/// drew between `ValueError` (bad arguments) and other failures.
fn report(e: NetSpotError) {
    let msg = e.to_string();
    match e {
        NetSpotError::InvalidConfig(_) => println!("{}", color::warning_line(&msg)),
        _ => println!("{}", color::error_line(&msg)),
    }
}

fn fmt_opt_f64(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.3}")).unwrap_or_else(|| "-".to_string())
}

fn fmt_opt_u64(v: Option<u64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string())
}

fn format_status_row(name: &str, status: &SpotStatus, full: bool) -> String {
    let mut cols = vec![
        name.to_string(),
        status.n.to_string(),
        fmt_opt_u64(status.up.al),
        fmt_opt_f64(status.up.z),
        fmt_opt_u64(status.down.al),
        fmt_opt_f64(status.down.z),
    ];
    if full {
        cols.push(fmt_opt_f64(status.up.t));
        cols.push(fmt_opt_u64(status.up.nt));
        cols.push(fmt_opt_u64(status.up.ex));
        cols.push(fmt_opt_f64(status.down.t));
        cols.push(fmt_opt_u64(status.down.nt));
        cols.push(fmt_opt_u64(status.down.ex));
    }
    cols.join("  ")
}

/// Whether a just-stepped status code is worth surfacing via `inspect`
/// without `--full` (used by tests; the live path logs directly).
pub fn is_notable(status: i32) -> bool {
    status == STATUS_CALIBRATED || status == 1 || status == -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spot::SideStatus;

    #[test]
    fn format_status_row_renders_dash_for_null_fields() {
        let status = SpotStatus {
            n: 10,
            up: SideStatus {
                al: Some(0),
                z: None,
                t: None,
                nt: Some(0),
                ex: Some(0),
            },
            down: SideStatus::default(),
        };
        let row = format_status_row("R_SYN", &status, false);
        assert!(row.contains('-'));
        assert!(row.starts_with("R_SYN"));
    }

    #[test]
    fn notable_statuses_are_alarms_and_calibration() {
        assert!(is_notable(STATUS_CALIBRATED));
        assert!(is_notable(1));
        assert!(is_notable(-1));
        assert!(!is_notable(0));
    }

    #[test]
    fn toggling_live_on_an_idle_monitor_reports_not_running() {
        let monitor = Monitor::default();
        assert!(matches!(monitor.toggle_live(), Err(NetSpotError::NotRunning)));
    }
}
