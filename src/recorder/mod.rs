//! Buffered append-only serialiser for windowed results (§4.5), grounded in
//! the original `Recorder` (chunked CSV writer + live-print mode), expressed
//! with `std::fs`/`std::io::BufWriter` and `chrono` for timestamp
//! formatting, in keeping with the teacher's dependency stack.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{Duration as ChronoDuration, NaiveTime};
use log::warn;

use crate::error::{NetSpotError, Result};

const DEFAULT_CHUNK_SIZE: usize = 15;
const MIN_COLUMN_WIDTH: usize = 7;

/// One windowed row awaiting flush.
#[derive(Debug, Clone)]
struct Row {
    time: f64,
    values: Vec<f64>,
}

pub struct Recorder {
    header: Vec<String>,
    /// Per-column print spec, `%d` or `%.3f` as declared by each Statistic.
    formats: Vec<String>,
    widths: Vec<usize>,
    buffer: Vec<Row>,
    chunk_size: usize,
    file: Option<BufWriter<File>>,
    header_written_to_file: bool,
    live: bool,
    rows_printed_since_header: usize,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder {
            header: Vec::new(),
            formats: Vec::new(),
            widths: Vec::new(),
            buffer: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            file: None,
            header_written_to_file: false,
            live: false,
            rows_printed_since_header: 0,
        }
    }

    /// §4.5: rebuild header and per-column widths from the currently loaded
    /// Statistics. Called by `Monitor::start` before every run.
    pub fn init_formatters(&mut self, header: Vec<String>, formats: Vec<String>) {
        self.widths = header
            .iter()
            .map(|name| name.len().max(MIN_COLUMN_WIDTH))
            .collect();
        self.header = header;
        self.formats = formats;
        self.header_written_to_file = false;
        self.rows_printed_since_header = 0;
    }

    pub fn set_live(&mut self, live: bool) {
        self.live = live;
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Closes any existing buffer and opens a new one in write-truncate
    /// mode. Fails with `InvalidPath` if the parent directory doesn't exist.
    pub fn set_record_file(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(NetSpotError::InvalidPath {
                    path: path.to_path_buf(),
                    reason: "parent directory does not exist".to_string(),
                });
            }
        }
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .map_err(|e| NetSpotError::InvalidPath {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        self.file = Some(BufWriter::new(file));
        self.header_written_to_file = false;
        Ok(())
    }

    fn format_value(&self, idx: usize, v: f64) -> String {
        match self.formats.get(idx).map(|s| s.as_str()) {
            Some("%d") => format!("{}", v as i64),
            _ => format!("{v:.3}"),
        }
    }

    fn format_time(secs: f64) -> String {
        let whole = secs.floor() as i64;
        let micros = ((secs - secs.floor()) * 1_000_000.0).round() as i64;
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let t = midnight
            + ChronoDuration::seconds(whole.rem_euclid(86_400))
            + ChronoDuration::microseconds(micros);
        t.format("%H:%M:%S%.6f").to_string()
    }

    fn print_header(&self) {
        let cols: Vec<String> = std::iter::once("Time".to_string())
            .chain(
                self.header
                    .iter()
                    .zip(&self.widths)
                    .map(|(name, w)| format!("{name:>w$}")),
            )
            .collect();
        println!("{}", cols.join(" "));
    }

    fn print_row(&self, row: &Row) {
        let mut cols = vec![Self::format_time(row.time)];
        for (i, v) in row.values.iter().enumerate() {
            let w = self.widths.get(i).copied().unwrap_or(MIN_COLUMN_WIDTH);
            cols.push(format!("{:>w$}", self.format_value(i, *v), w = w));
        }
        println!("{}", cols.join(" "));
    }

    /// §4.5: append a row; flush to the CSV buffer every `chunk_size` rows.
    /// Live mode additionally prints every row and reprints the header
    /// every `chunk_size` rows.
    pub fn save(&mut self, time: f64, values: Vec<f64>) {
        let row = Row { time, values };
        if self.live {
            if self.rows_printed_since_header % self.chunk_size == 0 {
                self.print_header();
            }
            self.print_row(&row);
            self.rows_printed_since_header += 1;
        }
        self.buffer.push(row);
        if self.buffer.len() >= self.chunk_size {
            if let Err(e) = self.export_records() {
                warn!("failed to flush record buffer: {e}");
            }
        }
    }

    fn export_records(&mut self) -> std::io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            self.buffer.clear();
            return Ok(());
        };
        if !self.header_written_to_file {
            let mut cols = vec!["Time".to_string()];
            cols.extend(self.header.iter().cloned());
            writeln!(file, "{}", cols.join(","))?;
            self.header_written_to_file = true;
        }
        for row in &self.buffer {
            let mut cols = vec![Self::format_time(row.time)];
            for (i, v) in row.values.iter().enumerate() {
                cols.push(self.format_value(i, *v));
            }
            writeln!(file, "{}", cols.join(","))?;
        }
        file.flush()?;
        self.buffer.clear();
        Ok(())
    }

    /// Clears the in-memory buffer without flushing.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.rows_printed_since_header = 0;
    }

}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn column_width_is_at_least_seven() {
        let mut r = Recorder::new();
        r.init_formatters(vec!["IP".to_string()], vec!["%d".to_string()]);
        assert_eq!(r.widths, vec![7]);
    }

    #[test]
    fn column_width_grows_with_long_names() {
        let mut r = Recorder::new();
        r.init_formatters(vec!["NB_IP_TO_IP_PKTS".to_string()], vec!["%d".to_string()]);
        assert_eq!(r.widths, vec!["NB_IP_TO_IP_PKTS".len()]);
    }

    #[test]
    fn set_record_file_rejects_missing_parent() {
        let mut r = Recorder::new();
        assert!(r
            .set_record_file(Path::new("/no/such/dir/out.csv"))
            .is_err());
    }

    #[test]
    fn flushes_header_then_rows_at_chunk_boundary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut r = Recorder::new();
        r.chunk_size = 2;
        r.init_formatters(vec!["R_SYN".to_string()], vec!["%.3f".to_string()]);
        r.set_record_file(&path).unwrap();
        r.save(1.0, vec![0.0]);
        r.save(2.0, vec![5.5]);
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "Time,R_SYN");
        assert!(lines.next().unwrap().ends_with(",0.000"));
        assert!(lines.next().unwrap().ends_with(",5.500"));
    }

    #[test]
    fn reset_clears_buffer_without_flushing() {
        let mut r = Recorder::new();
        r.init_formatters(vec!["IP".to_string()], vec!["%d".to_string()]);
        r.save(1.0, vec![1.0]);
        r.reset();
        assert!(r.buffer.is_empty());
    }

    #[test]
    fn format_time_renders_hh_mm_ss_micros() {
        assert_eq!(Recorder::format_time(3661.5), "01:01:01.500000");
    }
}
