use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::MediaItemId;

/// Global progress observer, called with `(downloaded_bytes, total_bytes)`
/// for the job currently downloading.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Minimum window over which the transfer speed is recomputed
const SPEED_WINDOW: Duration = Duration::from_millis(500);

/// Progress information for the active download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub id: MediaItemId,
    pub downloaded_bytes: u64,
    /// 0 while the length is unknown
    pub total_bytes: u64,
    /// Download speed in bytes per second
    pub speed_bps: u64,
    /// Estimated time remaining
    pub eta_seconds: Option<u64>,
}

impl DownloadProgress {
    pub fn new(id: MediaItemId, downloaded_bytes: u64, total_bytes: u64) -> Self {
        Self {
            id,
            downloaded_bytes,
            total_bytes,
            speed_bps: 0,
            eta_seconds: None,
        }
    }

    /// Calculate download progress as percentage (0.0 to 1.0)
    pub fn progress_percent(&self) -> f64 {
        if self.total_bytes > 0 {
            return self.downloaded_bytes as f64 / self.total_bytes as f64;
        }
        0.0
    }

    /// Update progress with new byte counts and speed
    pub fn update(&mut self, downloaded_bytes: u64, total_bytes: u64, speed: u64) {
        self.downloaded_bytes = downloaded_bytes;
        self.total_bytes = total_bytes;
        self.speed_bps = speed;

        if total_bytes > downloaded_bytes && speed > 0 {
            self.eta_seconds = Some((total_bytes - downloaded_bytes) / speed);
        } else {
            self.eta_seconds = None;
        }
    }
}

/// Transfer speed over windows of at least 500 ms.
#[derive(Debug)]
pub struct SpeedMeter {
    window_start: Instant,
    bytes_in_window: u64,
    speed_bps: u64,
}

impl SpeedMeter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            bytes_in_window: 0,
            speed_bps: 0,
        }
    }

    /// Count `bytes` and return the current speed. The value only changes
    /// when a window closes.
    pub fn record(&mut self, bytes: u64) -> u64 {
        self.record_at(bytes, Instant::now())
    }

    fn record_at(&mut self, bytes: u64, now: Instant) -> u64 {
        self.bytes_in_window += bytes;

        let elapsed = now.duration_since(self.window_start);
        if elapsed >= SPEED_WINDOW {
            let elapsed_secs = elapsed.as_secs_f64();
            self.speed_bps = (self.bytes_in_window as f64 / elapsed_secs) as u64;
            self.window_start = now;
            self.bytes_in_window = 0;
        }

        self.speed_bps
    }

    pub fn speed_bps(&self) -> u64 {
        self.speed_bps
    }
}

impl Default for SpeedMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_update_computes_eta() {
        let mut progress = DownloadProgress::new(MediaItemId::new("1"), 0, 1000);
        progress.update(500, 1000, 100);

        assert_eq!(progress.downloaded_bytes, 500);
        assert_eq!(progress.speed_bps, 100);
        assert_eq!(progress.eta_seconds, Some(5));
        assert_eq!(progress.progress_percent(), 0.5);
    }

    #[test]
    fn test_unknown_total_has_no_eta() {
        let mut progress = DownloadProgress::new(MediaItemId::new("1"), 0, 0);
        progress.update(500, 0, 100);
        assert_eq!(progress.eta_seconds, None);
        assert_eq!(progress.progress_percent(), 0.0);
    }

    #[test]
    fn test_speed_only_changes_after_window() {
        let start = Instant::now();
        let mut meter = SpeedMeter::starting_at(start);

        assert_eq!(meter.record_at(1000, start + Duration::from_millis(100)), 0);
        assert_eq!(meter.record_at(1000, start + Duration::from_millis(400)), 0);

        // 3000 bytes over one second
        let speed = meter.record_at(1000, start + Duration::from_secs(1));
        assert_eq!(speed, 3000);

        // New window, old speed holds until it closes
        assert_eq!(meter.record_at(10, start + Duration::from_millis(1100)), 3000);
        assert_eq!(meter.speed_bps(), 3000);
    }
}
