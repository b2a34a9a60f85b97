//! Streaming Peaks-Over-Threshold (SPOT) extreme-value detector.
//!
//! This is a from-scratch implementation of the algorithm the spec's
//! glossary describes (Siffer et al., peaks-over-threshold with a
//! generalised-Pareto tail fit via the method of moments), not a binding to
//! any particular native SPOT library: §4.4 of the design fixes the
//! external contract (`step`/`status`/`config`/`*_probability`), and this
//! module is the one concrete implementation of it netspot ships with.

use std::collections::VecDeque;

use crate::error::{NetSpotError, Result};

/// `step` return codes (§4.4).
pub const STATUS_NORMAL: i32 = 0;
pub const STATUS_ALARM_UP: i32 = 1;
pub const STATUS_ALARM_DOWN: i32 = -1;
pub const STATUS_CALIBRATED: i32 = 4;

/// Immutable construction parameters. Defaults per §9's design notes.
/// Built by hand from INI key/value pairs in `config::apply_spot_overrides`
/// — there's no serde derive here since nothing ever deserialises this from
/// a self-describing format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotConfig {
    pub q: f64,
    pub n_init: u32,
    pub level: f64,
    pub up: bool,
    pub down: bool,
    pub bounded: bool,
    pub max_excess: u32,
}

impl Default for SpotConfig {
    fn default() -> Self {
        SpotConfig {
            q: 1e-3,
            n_init: 1000,
            level: 0.98,
            up: true,
            down: false,
            bounded: true,
            max_excess: 200,
        }
    }
}

/// Fitted generalised-Pareto tail plus the bookkeeping needed to recompute
/// the decision threshold and report status, for one side (up or down).
#[derive(Debug, Clone, Default)]
struct Side {
    /// Initial (transitional) threshold, the `level`-quantile of the
    /// calibration sample.
    t: f64,
    /// Current decision threshold, recomputed every time the tail is refit.
    z: f64,
    /// Total number of observations that have ever exceeded `t`.
    nt: u64,
    /// Peaks (excesses over `t`) currently held for the fit, bounded by
    /// `max_excess`.
    peaks: VecDeque<f64>,
    /// Alarm count.
    alarms: u64,
    gamma: f64,
    sigma: f64,
}

impl Side {
    /// Method-of-moments fit of the generalised Pareto distribution to the
    /// currently stored peaks, followed by a threshold recompute. Fails with
    /// `DetectorError` if the fit yields a non-finite decision threshold
    /// (e.g. a near-degenerate tail), per §7.
    fn refit(&mut self, q: f64, n: u64, max_excess: u32) -> Result<()> {
        while self.peaks.len() > max_excess as usize {
            self.peaks.pop_front();
        }
        let m = self.peaks.len() as f64;
        if m < 2.0 {
            return Ok(());
        }
        let mean = self.peaks.iter().sum::<f64>() / m;
        let var = self.peaks.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / m;
        if var <= 0.0 {
            return Ok(());
        }
        self.gamma = 0.5 * (mean * mean / var - 1.0);
        self.sigma = 0.5 * mean * (mean * mean / var + 1.0);
        let z = self.threshold_for_risk(q, n);
        if !z.is_finite() {
            return Err(NetSpotError::DetectorError(format!(
                "non-finite decision threshold fit (gamma={:.6}, sigma={:.6})",
                self.gamma, self.sigma
            )));
        }
        self.z = z;
        Ok(())
    }

    /// Decision threshold at which the fitted tail's exceedance probability
    /// equals `q`.
    fn threshold_for_risk(&self, q: f64, n: u64) -> f64 {
        let ratio = (q * n as f64) / self.nt.max(1) as f64;
        if self.gamma.abs() < 1e-8 {
            self.t - self.sigma * ratio.ln()
        } else {
            self.t + (self.sigma / self.gamma) * (ratio.powf(-self.gamma) - 1.0)
        }
    }

    /// Tail probability estimate at an excess `e = x - t` (up side) or
    /// `e = t - x` (down side).
    fn probability(&self, e: f64, n: u64) -> f64 {
        if n == 0 {
            return 1.0;
        }
        let p = if e <= 0.0 {
            1.0
        } else if self.gamma.abs() < 1e-8 {
            (self.nt as f64 / n as f64) * (-e / self.sigma).exp()
        } else {
            let base = 1.0 + self.gamma * e / self.sigma;
            if base <= 0.0 {
                0.0
            } else {
                (self.nt as f64 / n as f64) * base.powf(-1.0 / self.gamma)
            }
        };
        p.clamp(0.0, 1.0)
    }
}

/// A complete `(al, z, t, Nt, ex)` tuple for one side, as reported by
/// `status()`; `None` before calibration or when the side is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SideStatus {
    pub al: Option<u64>,
    pub z: Option<f64>,
    pub t: Option<f64>,
    pub nt: Option<u64>,
    pub ex: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpotStatus {
    pub n: u64,
    pub up: SideStatus,
    pub down: SideStatus,
}

#[derive(Debug, Clone)]
pub struct Spot {
    config: SpotConfig,
    n: u64,
    calibration: Vec<f64>,
    calibrated: bool,
    up: Side,
    down: Side,
}

impl Spot {
    pub fn new(config: SpotConfig) -> Self {
        Spot {
            config,
            n: 0,
            calibration: Vec::with_capacity(config.n_init as usize),
            calibrated: false,
            up: Side::default(),
            down: Side::default(),
        }
    }

    pub fn config(&self) -> SpotConfig {
        self.config
    }

    /// Rebuild from the stored config, or `overrides` if given (§4.3
    /// `reset_all_stats`). Callable at any time; the caller is responsible
    /// for only calling it while the monitor is idle.
    pub fn reset(&mut self, overrides: Option<SpotConfig>) {
        *self = Spot::new(overrides.unwrap_or(self.config));
    }

    fn calibrate(&mut self) -> Result<()> {
        let mut sorted = self.calibration.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let m = sorted.len();
        if self.config.up {
            let idx = ((self.config.level * m as f64) as usize).min(m - 1);
            self.up.t = sorted[idx];
            for &x in &sorted {
                if x > self.up.t {
                    self.up.peaks.push_back(x - self.up.t);
                    self.up.nt += 1;
                }
            }
            self.up.refit(self.config.q, self.n, self.config.max_excess)?;
        }
        if self.config.down {
            let idx = (((1.0 - self.config.level) * m as f64) as usize).min(m - 1);
            self.down.t = sorted[idx];
            for &x in &sorted {
                if x < self.down.t {
                    self.down.peaks.push_back(self.down.t - x);
                    self.down.nt += 1;
                }
            }
            self.down.refit(self.config.q, self.n, self.config.max_excess)?;
        }
        self.calibrated = true;
        self.calibration.clear();
        Ok(())
    }

    /// Feeds one observation, returns the §4.4 status code. Fails with
    /// `DetectorError` if the tail refit triggered by this observation
    /// degenerates (§7); the caller (the owning `Statistic`) propagates this
    /// up to the window loop, which skips the window rather than recording
    /// a row built from a stale fit.
    pub fn step(&mut self, x: f64) -> Result<i32> {
        self.n += 1;
        if !self.calibrated {
            self.calibration.push(x);
            if self.n >= self.config.n_init as u64 {
                self.calibrate()?;
                return Ok(STATUS_CALIBRATED);
            }
            return Ok(STATUS_NORMAL);
        }

        if self.config.up && x > self.up.z {
            self.up.alarms += 1;
            return Ok(STATUS_ALARM_UP);
        }
        if self.config.down && x < self.down.z {
            self.down.alarms += 1;
            return Ok(STATUS_ALARM_DOWN);
        }
        if self.config.up && x > self.up.t {
            self.up.nt += 1;
            self.up.peaks.push_back(x - self.up.t);
            self.up.refit(self.config.q, self.n, self.config.max_excess)?;
            return Ok(STATUS_NORMAL);
        }
        if self.config.down && x < self.down.t {
            self.down.nt += 1;
            self.down.peaks.push_back(self.down.t - x);
            self.down.refit(self.config.q, self.n, self.config.max_excess)?;
            return Ok(STATUS_NORMAL);
        }
        Ok(STATUS_NORMAL)
    }

    pub fn status(&self) -> SpotStatus {
        let side = |enabled: bool, s: &Side| -> SideStatus {
            if !enabled {
                return SideStatus::default();
            }
            if !self.calibrated {
                return SideStatus {
                    al: Some(0),
                    z: None,
                    t: None,
                    nt: Some(0),
                    ex: Some(0),
                };
            }
            SideStatus {
                al: Some(s.alarms),
                z: Some(s.z),
                t: Some(s.t),
                nt: Some(s.nt),
                ex: Some(s.peaks.len() as u64),
            }
        };
        SpotStatus {
            n: self.n,
            up: side(self.config.up, &self.up),
            down: side(self.config.down, &self.down),
        }
    }

    pub fn up_probability(&self, x: f64) -> f64 {
        if !self.config.up || !self.calibrated {
            return 1.0;
        }
        self.up.probability(x - self.up.t, self.n)
    }

    pub fn down_probability(&self, x: f64) -> f64 {
        if !self.config.down || !self.calibrated {
            return 1.0;
        }
        self.down.probability(self.down.t - x, self.n)
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }
}
