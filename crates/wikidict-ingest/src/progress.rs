//! Run counters and progress display
//!
//! Every stage bumps its own counter in [`GenerationStats`]; the spinner
//! reads them from its own thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Counters shared by all stages of one run
#[derive(Debug, Default)]
pub struct GenerationStats {
    raw_bytes: AtomicU64,
    decompressed_bytes: AtomicU64,
    content_bytes: AtomicU64,
    pages: AtomicU64,
    words_added: AtomicU64,
    words_rejected: AtomicU64,
}

/// Point-in-time copy of [`GenerationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub raw_bytes: u64,
    pub decompressed_bytes: u64,
    pub content_bytes: u64,
    pub pages: u64,
    pub words_added: u64,
    pub words_rejected: u64,
}

impl GenerationStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_raw_bytes(&self, n: usize) {
        self.raw_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_decompressed_bytes(&self, n: usize) {
        self.decompressed_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_content_bytes(&self, n: usize) {
        self.content_bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn page_seen(&self) {
        self.pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn word_added(&self) {
        self.words_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn word_rejected(&self) {
        self.words_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            raw_bytes: self.raw_bytes.load(Ordering::Relaxed),
            decompressed_bytes: self.decompressed_bytes.load(Ordering::Relaxed),
            content_bytes: self.content_bytes.load(Ordering::Relaxed),
            pages: self.pages.load(Ordering::Relaxed),
            words_added: self.words_added.load(Ordering::Relaxed),
            words_rejected: self.words_rejected.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} read, {} decompressed, {} pages, {} words",
            format_bytes(self.raw_bytes),
            format_bytes(self.decompressed_bytes),
            self.pages,
            self.words_added
        )?;
        if self.words_rejected > 0 {
            write!(f, " ({} rejected)", self.words_rejected)?;
        }
        Ok(())
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Spinner refreshed from [`GenerationStats`] until dropped
pub struct StatsSpinner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    pb: ProgressBar,
}

impl StatsSpinner {
    pub fn start(label: &str, stats: Arc<GenerationStats>) -> Self {
        let pb = create_spinner(label);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let pb = pb.clone();
            let stop = Arc::clone(&stop);
            let label = label.to_string();
            std::thread::Builder::new()
                .name("progress".to_string())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        pb.set_message(format!("{}: {}", label, stats.snapshot()));
                        std::thread::sleep(Duration::from_millis(250));
                    }
                })
                .ok()
        };
        Self { stop, handle, pb }
    }

    pub fn finish(mut self, message: &str) {
        self.shutdown();
        self.pb.finish_with_message(message.to_string());
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatsSpinner {
    fn drop(&mut self) {
        self.shutdown();
        if !self.pb.is_finished() {
            self.pb.finish_and_clear();
        }
    }
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = GenerationStats::new();
        stats.add_raw_bytes(2048);
        stats.page_seen();
        stats.page_seen();
        stats.word_added();
        stats.word_rejected();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.raw_bytes, 2048);
        assert_eq!(snapshot.pages, 2);
        assert_eq!(
            snapshot.to_string(),
            "2.00 KB read, 0 B decompressed, 2 pages, 1 words (1 rejected)"
        );
    }

    #[test]
    fn test_snapshot_json() {
        let stats = GenerationStats::new();
        stats.word_added();
        let json = serde_json::to_value(stats.snapshot()).unwrap_or_default();
        assert_eq!(json["words_added"], 1);
        assert_eq!(json["words_rejected"], 0);
    }

    #[test]
    fn test_spinner_stops() {
        let stats = GenerationStats::new();
        let spinner = StatsSpinner::start("frwiktionary", Arc::clone(&stats));
        spinner.finish("done");
    }
}
