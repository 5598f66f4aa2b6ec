//! Weighted progress reporting for a publish job (spec.md §4.9).
//!
//! A publish job's "percent done" has to blend two very different kinds
//! of task: non-upload tasks (delete a file, create a folder, chmod an
//! entry) which are all roughly equal effort, and uploads, whose effort
//! is proportional to file size. The original's `_update_state` weights
//! every non-upload task at a flat 4096 "bytes" and adds upload byte
//! counts on top, so a job with a handful of huge uploads and thousands
//! of tiny chmod tasks still reports sane progress. `PublishProgress`
//! reproduces that formula exactly.

use std::time::Instant;

/// Flat weight given to a single non-upload task, matching the
/// original's `weight = 4096`.
const NON_UPLOAD_TASK_WEIGHT: u64 = 4096;

/// Running totals `PublishProgress` needs to compute percent/ETA. The
/// engine updates this after every task completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskCounts {
    pub non_upload_total: u64,
    pub non_upload_done: u64,
    pub upload_bytes_total: u64,
    pub upload_bytes_done: u64,
}

/// Tracks a publish job's progress from the first task to the last,
/// producing `(percent, eta)` pairs the way the original's
/// `_update_state` does.
pub struct PublishProgress {
    start_time: Option<Instant>,
}

impl Default for PublishProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishProgress {
    pub fn new() -> Self {
        Self { start_time: None }
    }

    /// Computes the current percent complete and, once enough progress
    /// has been made to trust the estimate, an ETA in seconds. Returns
    /// `(percent, eta)`; `eta` is `None` until `percent` exceeds 5%,
    /// matching the original's guard against wildly inaccurate estimates
    /// early in a job.
    pub fn update(&mut self, counts: TaskCounts) -> (f64, Option<f64>) {
        let start = *self.start_time.get_or_insert_with(Instant::now);

        let dividend = counts.non_upload_done * NON_UPLOAD_TASK_WEIGHT + counts.upload_bytes_done;
        let divisor = counts.non_upload_total * NON_UPLOAD_TASK_WEIGHT + counts.upload_bytes_total;

        let percent = if divisor > 0 {
            dividend as f64 / divisor as f64
        } else {
            0.0
        };

        let elapsed = start.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 { percent / elapsed } else { 0.0 };
        let remaining = 1.0 - percent;

        let eta = if speed > 0.0 && percent > 0.05 {
            Some(remaining / speed)
        } else {
            None
        };

        (percent, eta)
    }
}

/// Format bytes as a human-readable string, for log lines and the
/// `/jobs` introspection endpoint.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_total_work_reports_zero_percent() {
        let mut progress = PublishProgress::new();
        let (percent, eta) = progress.update(TaskCounts::default());
        assert_eq!(percent, 0.0);
        assert!(eta.is_none());
    }

    #[test]
    fn mixes_task_weight_and_upload_bytes() {
        let mut progress = PublishProgress::new();
        let counts = TaskCounts {
            non_upload_total: 10,
            non_upload_done: 5,
            upload_bytes_total: 1_000_000,
            upload_bytes_done: 500_000,
        };
        let (percent, _eta) = progress.update(counts);
        let expected_dividend = 5 * NON_UPLOAD_TASK_WEIGHT + 500_000;
        let expected_divisor = 10 * NON_UPLOAD_TASK_WEIGHT + 1_000_000;
        let expected = expected_dividend as f64 / expected_divisor as f64;
        assert!((percent - expected).abs() < 1e-9);
    }

    #[test]
    fn eta_withheld_below_five_percent() {
        let mut progress = PublishProgress::new();
        let counts = TaskCounts {
            non_upload_total: 1000,
            non_upload_done: 1,
            upload_bytes_total: 0,
            upload_bytes_done: 0,
        };
        let (percent, eta) = progress.update(counts);
        assert!(percent < 0.05);
        assert!(eta.is_none());
    }

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn format_duration_switches_units() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
