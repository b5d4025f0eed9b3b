//! Human-readable progress text for Downloading notifications.

use std::time::Duration;

const BAR_CELLS: usize = 20;

/// Snapshot of one job's transfer progress.
#[derive(Debug, Clone, Copy)]
pub struct ProgressStats {
    pub bytes_done: u64,
    /// 0 when the size is unknown.
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl ProgressStats {
    /// Average rate in bytes per second (0 if no time has passed).
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / secs
    }

    /// Estimated seconds remaining; None when the size or rate is unknown.
    pub fn eta_secs(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]; None when the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some((self.bytes_done as f64 / self.total_bytes as f64).min(1.0))
    }

    /// Multi-line message: bar, sizes, rate and ETA.
    pub fn message(&self) -> String {
        let rate = format!("{}/s", human_size(self.bytes_per_sec() as u64));
        match self.fraction() {
            Some(f) => {
                let eta = self
                    .eta_secs()
                    .map(|s| format_eta(s as u64))
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "{}\n{} / {} at {}, ETA {}",
                    progress_bar(f * 100.0),
                    human_size(self.bytes_done),
                    human_size(self.total_bytes),
                    rate,
                    eta
                )
            }
            None => format!("{} downloaded at {}", human_size(self.bytes_done), rate),
        }
    }
}

/// `1536` → `1.50 KiB`. Bytes below 1 KiB print as an integer.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// 20-cell bar with one cell per 5%, followed by the percentage.
pub fn progress_bar(percent: f64) -> String {
    let percent = percent.clamp(0.0, 100.0);
    let filled = ((percent / 5.0) as usize).min(BAR_CELLS);
    format!(
        "{}{} {:.1}%",
        "█".repeat(filled),
        "░".repeat(BAR_CELLS - filled),
        percent
    )
}

fn format_eta(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
