//! Per-pipeline counters and progress reporting

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Which kind of run a [`MigrationStats`] belongs to; only affects wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsKind {
    /// Snapshot replay; successful rows are "inserted"
    Migration,
    /// Vector regeneration; successful rows are "processed"
    Reembed,
}

/// Counters for one pipeline run.
///
/// `written + skipped <= total` holds throughout; equality holds after a
/// successful run of a pipeline with a skip path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStats {
    /// Pipeline name, e.g. `vectors_chunks`
    pub name: String,
    /// Wording used when logging
    pub kind: StatsKind,
    /// Records seen (or counted up front for table scans)
    pub total: u64,
    /// Records written successfully
    pub written: u64,
    /// Records rejected by validation
    pub skipped: u64,
}

impl MigrationStats {
    /// Counters for a snapshot migration pipeline
    #[must_use]
    pub fn migration(name: impl Into<String>) -> Self {
        Self::new(name, StatsKind::Migration)
    }

    /// Counters for a re-embedding pipeline
    #[must_use]
    pub fn reembed(name: impl Into<String>) -> Self {
        Self::new(name, StatsKind::Reembed)
    }

    fn new(name: impl Into<String>, kind: StatsKind) -> Self {
        Self {
            name: name.into(),
            kind,
            total: 0,
            written: 0,
            skipped: 0,
        }
    }

    /// Every counted record was either written or explicitly skipped
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.written + self.skipped == self.total
    }

    /// Log the final counters
    pub fn log(&self) {
        match self.kind {
            StatsKind::Migration => tracing::info!(
                name = %self.name,
                total = self.total,
                inserted = self.written,
                skipped = self.skipped,
                "Migration {}: total={} inserted={} skipped={}",
                self.name,
                self.total,
                self.written,
                self.skipped
            ),
            StatsKind::Reembed => tracing::info!(
                name = %self.name,
                total = self.total,
                processed = self.written,
                skipped = self.skipped,
                "Re-embed {}: total={} processed={} skipped={}",
                self.name,
                self.total,
                self.written,
                self.skipped
            ),
        }
    }
}

/// Tracks scan progress with ETA calculation
pub struct ProgressTracker {
    label: String,
    total_records: Option<u64>,
    processed_records: Arc<AtomicU64>,
    start_time: Instant,
    last_report_time: Arc<Mutex<Instant>>,
    report_interval: Duration,
}

impl ProgressTracker {
    /// Create a new progress tracker
    #[must_use]
    pub fn new(label: impl Into<String>, total_records: Option<u64>, report_interval: Duration) -> Self {
        Self {
            label: label.into(),
            total_records,
            processed_records: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
            last_report_time: Arc::new(Mutex::new(Instant::now())),
            report_interval,
        }
    }

    /// Increment processed count
    pub fn increment(&self, count: u64) {
        self.processed_records.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current processed count
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed_records.load(Ordering::Relaxed)
    }

    /// Check if it's time to report progress
    #[must_use]
    pub fn should_report(&self) -> bool {
        let last_report = *self.last_report_time.lock();
        last_report.elapsed() >= self.report_interval
    }

    /// Report if the interval has elapsed
    pub fn maybe_report(&self) {
        if self.should_report() {
            self.report();
        }
    }

    /// Report current progress
    #[allow(clippy::cast_precision_loss)]
    pub fn report(&self) {
        let processed = self.processed();
        let elapsed = self.start_time.elapsed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            processed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        if let Some(total) = self.total_records.filter(|&t| t > 0) {
            let remaining = total.saturating_sub(processed);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let eta = if rate > 0.0 {
                Duration::from_secs((remaining as f64 / rate) as u64)
            } else {
                Duration::from_secs(0)
            };
            let percentage = (processed as f64 / total as f64) * 100.0;

            tracing::info!(
                label = %self.label,
                processed = processed,
                total = total,
                percentage = format!("{percentage:.1}%"),
                rate = format!("{rate:.0} records/sec"),
                eta = format!("{eta:?}"),
                "{} progress: {}/{}",
                self.label,
                processed,
                total
            );
        } else {
            tracing::info!(
                label = %self.label,
                processed = processed,
                rate = format!("{rate:.0} records/sec"),
                elapsed = format!("{elapsed:?}"),
                "{} progress: {}",
                self.label,
                processed
            );
        }

        *self.last_report_time.lock() = Instant::now();
    }

    /// Elapsed time since the tracker was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
