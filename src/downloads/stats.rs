use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for the download worker
#[derive(Debug, Clone)]
pub struct DownloaderStats {
    /// Total number of downloads started
    pub downloads_started: Arc<AtomicU64>,
    /// Total number of downloads completed
    pub downloads_completed: Arc<AtomicU64>,
    /// Total number of downloads failed
    pub downloads_failed: Arc<AtomicU64>,
    /// Downloads interrupted by pause or cancel
    pub downloads_interrupted: Arc<AtomicU64>,
    /// Total bytes written to disk
    pub total_bytes_downloaded: Arc<AtomicU64>,
    /// Start time for calculating uptime
    pub start_time: Instant,
}

impl DownloaderStats {
    pub fn new() -> Self {
        Self {
            downloads_started: Arc::new(AtomicU64::new(0)),
            downloads_completed: Arc::new(AtomicU64::new(0)),
            downloads_failed: Arc::new(AtomicU64::new(0)),
            downloads_interrupted: Arc::new(AtomicU64::new(0)),
            total_bytes_downloaded: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn increment_started(&self) {
        self.downloads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_interrupted(&self) {
        self.downloads_interrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_downloaded(&self, bytes: u64) {
        self.total_bytes_downloaded
            .fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.downloads_completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.downloads_failed.load(Ordering::Relaxed)
    }

    pub fn format_report(&self, queued: usize) -> String {
        let uptime_secs = self.start_time.elapsed().as_secs();
        let hours = uptime_secs / 3600;
        let minutes = (uptime_secs % 3600) / 60;
        let seconds = uptime_secs % 60;

        let total_mb =
            self.total_bytes_downloaded.load(Ordering::Relaxed) as f64 / (1024.0 * 1024.0);
        let avg_speed_mbps = if uptime_secs > 0 {
            total_mb / uptime_secs as f64
        } else {
            0.0
        };

        let mut report = format!(
            "Downloader stats [{}h {}m {}s] | Started: {} | Completed: {} | Failed: {} | Interrupted: {} | Total: {:.1} MB | Avg: {:.2} MB/s",
            hours,
            minutes,
            seconds,
            self.downloads_started.load(Ordering::Relaxed),
            self.downloads_completed.load(Ordering::Relaxed),
            self.downloads_failed.load(Ordering::Relaxed),
            self.downloads_interrupted.load(Ordering::Relaxed),
            total_mb,
            avg_speed_mbps
        );

        if queued > 0 {
            report.push_str(&format!(" | Queued: {}", queued));
        }

        report
    }
}

impl Default for DownloaderStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_shared_between_clones() {
        let stats = DownloaderStats::new();
        let clone = stats.clone();

        clone.increment_started();
        clone.increment_completed();
        clone.add_bytes_downloaded(2 * 1024 * 1024);

        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.failed(), 0);
        let report = stats.format_report(0);
        assert!(report.contains("Started: 1"));
        assert!(report.contains("Total: 2.0 MB"));
        assert!(!report.contains("Queued"));
    }

    #[test]
    fn test_report_mentions_queue() {
        let stats = DownloaderStats::new();
        assert!(stats.format_report(3).contains("Queued: 3"));
    }
}
