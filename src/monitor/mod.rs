//! The scheduler (§4.3): owns the Sniffer, the ordered loaded-Statistic
//! list, and the Recorder; runs the windowing loop and wires computation
//! results to the log channel and the recorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::config::{MonitorConfig, StatSpec};
use crate::counter::Counter;
use crate::error::{NetSpotError, Result};
use crate::recorder::Recorder;
use crate::sniffer::Sniffer;
use crate::spot::SpotConfig;
use crate::statistic::Statistic;

pub struct Monitor {
    sniffer: Sniffer,
    recorder: Arc<Mutex<Recorder>>,
    stats: Arc<Mutex<Vec<Statistic>>>,
    config: Mutex<MonitorConfig>,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Monitor {
            sniffer: Sniffer::new(),
            recorder: Arc::new(Mutex::new(Recorder::new())),
            stats: Arc::new(Mutex::new(Vec::new())),
            config: Mutex::new(config),
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Builds a Monitor with its Sniffer and loaded Statistics already
    /// configured from a parsed INI file (§6).
    pub fn from_loaded(loaded: crate::config::LoadedConfig) -> Result<Self> {
        let monitor = Monitor::new(loaded.monitor.clone());
        monitor
            .sniffer
            .set_source(loaded.monitor.source_type, &loaded.monitor.source)?;
        if let Some(filter) = &loaded.monitor.sniffing_filter {
            monitor.sniffer.set_filter(Some(filter.clone()))?;
        }
        for spec in loaded.stats {
            monitor.load_stat(&spec.class_name, &spec.params, spec.spot)?;
        }
        Ok(monitor)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> MonitorConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn set_config_key(&self, key: &str, value: &str) -> Result<()> {
        if self.is_running() {
            return Err(NetSpotError::AlreadyRunning);
        }
        let mut cfg = self.config.lock().unwrap();
        crate::config::set_key(&mut cfg, key, value)?;
        if key == "source" || key == "source_type" {
            self.sniffer.set_source(cfg.source_type, &cfg.source)?;
        }
        if key == "sniffing_filter" {
            self.sniffer.set_filter(cfg.sniffing_filter.clone())?;
        }
        Ok(())
    }

    pub fn loaded_stat_names(&self) -> Vec<String> {
        self.stats
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Instantiates and loads a statistic by class name, registering
    /// whatever counters it needs with the sniffer. Idle-only.
    pub fn load_stat(&self, class_name: &str, params: &[String], spot: SpotConfig) -> Result<()> {
        if self.is_running() {
            return Err(NetSpotError::AlreadyRunning);
        }
        let stat = if class_name == "NB_IP_TO_IP_PKTS" {
            let [a, b] = params else {
                return Err(NetSpotError::InvalidConfig(
                    "NB_IP_TO_IP_PKTS requires two address parameters".to_string(),
                ));
            };
            Statistic::nb_ip_to_ip_pkts(a, b, spot)?
        } else {
            Statistic::from_name(class_name, spot)?
        };

        let mut stats = self.stats.lock().unwrap();
        if stats.iter().any(|s| s.name() == stat.name()) {
            return Err(NetSpotError::InvalidConfig(format!(
                "{} is already loaded",
                stat.name()
            )));
        }
        let counters: std::result::Result<Vec<Counter>, _> =
            stat.needs().iter().map(|n| Counter::from_name(n)).collect();
        self.sniffer.load(counters?);
        stats.push(stat);
        Ok(())
    }

    /// Unloads by statistic name, or every loaded stat when `name == "*"`.
    pub fn unload_stat(&self, name: &str) -> Result<()> {
        if self.is_running() {
            return Err(NetSpotError::AlreadyRunning);
        }
        let mut stats = self.stats.lock().unwrap();
        if name == "*" {
            stats.clear();
            return Ok(());
        }
        let before = stats.len();
        stats.retain(|s| s.name() != name);
        if stats.len() == before {
            return Err(NetSpotError::InvalidConfig(format!(
                "{name} is not loaded"
            )));
        }
        Ok(())
    }

    pub fn reset_all_stats(&self) -> Result<()> {
        if self.is_running() {
            return Err(NetSpotError::AlreadyRunning);
        }
        for stat in self.stats.lock().unwrap().iter_mut() {
            stat.reset();
        }
        Ok(())
    }

    /// §4.3 `start()`. Spawns the window loop as its own `tokio` task.
    pub async fn start(&self, live: bool) -> Result<()> {
        if self.is_running() {
            return Err(NetSpotError::AlreadyRunning);
        }

        {
            let stats = self.stats.lock().unwrap();
            let header: Vec<String> = stats.iter().map(|s| s.name().to_string()).collect();
            let formats: Vec<String> = stats.iter().map(|s| s.fmt().to_string()).collect();
            let mut recorder = self.recorder.lock().unwrap();
            recorder.init_formatters(header, formats);
            recorder.set_live(live);
            let record_file = self.config.lock().unwrap().record_file.clone();
            if let Some(path) = record_file {
                recorder.set_record_file(&path)?;
            }
        }

        if !self.sniffer.is_sniffing() {
            self.sniffer.start()?;
        }
        self.sniffer.reset();

        self.running.store(true, Ordering::Release);
        self.stop_requested.store(false, Ordering::Release);

        let sniffer = self.sniffer.clone();
        let stats = Arc::clone(&self.stats);
        let recorder = Arc::clone(&self.recorder);
        let running = Arc::clone(&self.running);
        let stop_requested = Arc::clone(&self.stop_requested);
        let interval_secs = self.config.lock().unwrap().interval;

        let handle = tokio::spawn(async move {
            let mut t_begin = sniffer.time();
            let mut ticker = interval(Duration::from_secs_f64((interval_secs / 20.0).max(0.01)));
            loop {
                ticker.tick().await;
                if stop_requested.load(Ordering::Acquire) || !sniffer.is_sniffing() {
                    break;
                }
                let now = sniffer.time();
                if now - t_begin > interval_secs {
                    let mut stats = stats.lock().unwrap();
                    let mut values = Vec::with_capacity(stats.len());
                    let mut window_failed = false;
                    for stat in stats.iter_mut() {
                        let readings = sniffer.get_values(&stat.needs());
                        match stat.compute_and_monitor(&readings) {
                            Ok(outcome) => {
                                if let Some(msg) = &outcome.warning {
                                    warn!("{msg}");
                                }
                                if let Some(msg) = &outcome.info {
                                    info!("{msg}");
                                }
                                values.push(outcome.value);
                            }
                            Err(e) => {
                                warn!("{}: {e}", stat.name());
                                window_failed = true;
                                break;
                            }
                        }
                    }
                    // §4.3: a failed window is skipped entirely — no row
                    // written — but counters still reset and the loop
                    // continues.
                    if !window_failed {
                        recorder.lock().unwrap().save(now, values);
                    }
                    sniffer.reset();
                    t_begin = now;
                }
            }
            running.store(false, Ordering::Release);
            info!("monitor stopped");
        });
        *self.task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Requests a stop; the window task observes this at the top of its
    /// next tick (§5 cancellation).
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.sniffer.stop();
    }

    /// Toggles live printing of each window on the running recorder.
    /// Fails with `NotRunning` when idle, per §7.
    pub fn toggle_live(&self) -> Result<bool> {
        if !self.is_running() {
            return Err(NetSpotError::NotRunning);
        }
        let mut recorder = self.recorder.lock().unwrap();
        let live = !recorder.is_live();
        recorder.set_live(live);
        Ok(live)
    }

    pub fn sniffer(&self) -> &Sniffer {
        &self.sniffer
    }

    pub fn stats(&self) -> Arc<Mutex<Vec<Statistic>>> {
        Arc::clone(&self.stats)
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Monitor::new(MonitorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_stat_registers_required_counters() {
        let monitor = Monitor::default();
        monitor
            .load_stat("R_SYN", &[], SpotConfig::default())
            .unwrap();
        assert_eq!(monitor.loaded_stat_names(), vec!["R_SYN".to_string()]);
        let names = monitor.sniffer().loaded_names();
        assert!(names.contains(&"SYN".to_string()));
        assert!(names.contains(&"IP".to_string()));
    }

    #[test]
    fn loading_same_stat_twice_fails() {
        let monitor = Monitor::default();
        monitor
            .load_stat("R_SYN", &[], SpotConfig::default())
            .unwrap();
        assert!(monitor
            .load_stat("R_SYN", &[], SpotConfig::default())
            .is_err());
    }

    #[test]
    fn unload_star_with_nothing_loaded_succeeds() {
        let monitor = Monitor::default();
        assert!(monitor.unload_stat("*").is_ok());
    }

    #[test]
    fn toggle_live_fails_when_idle() {
        let monitor = Monitor::default();
        assert!(matches!(monitor.toggle_live(), Err(NetSpotError::NotRunning)));
    }

    #[test]
    fn nb_ip_to_ip_pkts_requires_two_params() {
        let monitor = Monitor::default();
        assert!(monitor
            .load_stat("NB_IP_TO_IP_PKTS", &["10.0.0.1".to_string()], SpotConfig::default())
            .is_err());
    }
}
