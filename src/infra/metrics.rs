//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the scheduler, the pipeline and the HTTP endpoint can
//! record and read without sharing a mutex.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Run duration bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, ≤30000, ≤60000, >60000
pub const RUN_DURATION_BOUNDS_MS: [u64; 10] =
    [50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000, 60000];
pub const NUM_BUCKETS: usize = 11;

/// Whole milliseconds, saturating at `u64::MAX`
#[inline]
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Compute bucket index for a duration using binary search
#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    RUN_DURATION_BOUNDS_MS.partition_point(|&bound| bound < duration_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Lock-free metrics collector for the expiry job
pub struct Metrics {
    /// Runs that finished all three stages (monotonic)
    runs_completed: AtomicU64,
    /// Runs aborted by an error (monotonic)
    runs_failed: AtomicU64,
    /// Triggers ignored because a run was still in progress (monotonic)
    runs_skipped: AtomicU64,
    /// Items moved to the warning category (monotonic)
    items_warned: AtomicU64,
    /// Items moved to the danger category (monotonic)
    items_dangered: AtomicU64,
    /// Classified IDs that no longer matched a stored item (monotonic)
    items_missing: AtomicU64,
    /// Notification calls issued (monotonic)
    notifications_sent: AtomicU64,
    /// Run duration histogram buckets
    duration_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of run durations in milliseconds
    duration_sum_ms: AtomicU64,
    /// Longest run observed
    duration_max_ms: AtomicU64,
    /// Duration of the most recent run
    last_duration_ms: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_skipped: AtomicU64::new(0),
            items_warned: AtomicU64::new(0),
            items_dangered: AtomicU64::new(0),
            items_missing: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            duration_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            duration_sum_ms: AtomicU64::new(0),
            duration_max_ms: AtomicU64::new(0),
            last_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record a completed run with its per-stage counts
    pub fn record_run_completed(
        &self,
        duration_ms: u64,
        warned: usize,
        dangered: usize,
        missing: usize,
        notifications: usize,
    ) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.items_warned.fetch_add(warned as u64, Ordering::Relaxed);
        self.items_dangered.fetch_add(dangered as u64, Ordering::Relaxed);
        self.items_missing.fetch_add(missing as u64, Ordering::Relaxed);
        self.notifications_sent.fetch_add(notifications as u64, Ordering::Relaxed);
        self.record_duration(duration_ms);
    }

    /// Record a run aborted by an error
    pub fn record_run_failed(&self, duration_ms: u64) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        self.record_duration(duration_ms);
    }

    /// Record a trigger skipped because a run was in progress
    #[inline]
    pub fn record_run_skipped(&self) {
        self.runs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_duration(&self, duration_ms: u64) {
        let bucket = bucket_index(duration_ms);
        self.duration_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.last_duration_ms.store(duration_ms, Ordering::Relaxed);
        update_atomic_max(&self.duration_max_ms, duration_ms);
    }

    #[inline]
    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn runs_skipped(&self) -> u64 {
        self.runs_skipped.load(Ordering::Relaxed)
    }

    /// Take a consistent-enough snapshot of every counter
    pub fn report(&self) -> MetricsSummary {
        let duration_buckets = load_buckets(&self.duration_buckets);
        let runs_total = duration_buckets.iter().sum::<u64>();
        let duration_sum_ms = self.duration_sum_ms.load(Ordering::Relaxed);

        MetricsSummary {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_skipped: self.runs_skipped.load(Ordering::Relaxed),
            items_warned: self.items_warned.load(Ordering::Relaxed),
            items_dangered: self.items_dangered.load(Ordering::Relaxed),
            items_missing: self.items_missing.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            duration_buckets,
            duration_sum_ms,
            duration_avg_ms: if runs_total > 0 { duration_sum_ms / runs_total } else { 0 },
            duration_max_ms: self.duration_max_ms.load(Ordering::Relaxed),
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_skipped: u64,
    pub items_warned: u64,
    pub items_dangered: u64,
    pub items_missing: u64,
    pub notifications_sent: u64,
    pub duration_buckets: [u64; NUM_BUCKETS],
    pub duration_sum_ms: u64,
    pub duration_avg_ms: u64,
    pub duration_max_ms: u64,
    pub last_duration_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            runs_completed = %self.runs_completed,
            runs_failed = %self.runs_failed,
            runs_skipped = %self.runs_skipped,
            items_warned = %self.items_warned,
            items_dangered = %self.items_dangered,
            notifications = %self.notifications_sent,
            avg_duration_ms = %self.duration_avg_ms,
            max_duration_ms = %self.duration_max_ms,
            "metrics"
        );
    }
}
