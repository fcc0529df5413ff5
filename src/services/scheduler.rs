//! Periodic trigger for the expiry pipeline
//!
//! The scheduler owns the "running" flag. Every trigger (interval tick, CLI
//! `--once`, HTTP `POST /jobs/expiry/run`) goes through [`ExpiryScheduler::trigger_at`],
//! which refuses to start while another run is in flight.

use crate::infra::metrics::{duration_ms, Metrics};
use crate::services::pipeline::{ExpiryPipeline, RunReport};
use chrono::{DateTime, Local, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, interval_at, MissedTickBehavior};
use tracing::{error, info, warn};

/// Result of a single trigger
#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(RunReport),
    Failed(String),
    /// Another run was in progress
    Skipped,
}

/// Last finished run, exposed on the health endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LastRun {
    Completed { finished_at: DateTime<Utc>, report: RunReport },
    Failed { finished_at: DateTime<Utc>, error: String },
}

/// Holds the running flag; cleared on drop, including during unwind
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct Inner {
    pipeline: ExpiryPipeline,
    metrics: Arc<Metrics>,
    running: AtomicBool,
    last_run: Mutex<Option<LastRun>>,
    /// Runs started outside the interval loop (HTTP trigger)
    detached: Mutex<JoinSet<()>>,
    period: Duration,
    run_on_startup: bool,
}

#[derive(Clone)]
pub struct ExpiryScheduler {
    inner: Arc<Inner>,
}

impl ExpiryScheduler {
    pub fn new(
        pipeline: ExpiryPipeline,
        metrics: Arc<Metrics>,
        period: Duration,
        run_on_startup: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                metrics,
                running: AtomicBool::new(false),
                last_run: Mutex::new(None),
                detached: Mutex::new(JoinSet::new()),
                period,
                run_on_startup,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn last_run(&self) -> Option<LastRun> {
        self.inner.last_run.lock().clone()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Run the pipeline for the local calendar date
    pub async fn trigger(&self) -> TriggerOutcome {
        self.trigger_at(Local::now().date_naive()).await
    }

    /// Start a run on a task owned by the scheduler
    ///
    /// The run is not tied to the caller: dropping the receiver does not
    /// cancel it, and [`ExpiryScheduler::run`] waits for it on shutdown.
    pub fn spawn_trigger(&self) -> oneshot::Receiver<TriggerOutcome> {
        let (tx, rx) = oneshot::channel();
        let scheduler = self.clone();

        let mut detached = self.inner.detached.lock();
        // reap finished runs so the set does not grow
        while detached.try_join_next().is_some() {}
        detached.spawn(async move {
            let _ = tx.send(scheduler.trigger().await);
        });
        rx
    }

    /// Run the pipeline for `today` unless a run is already in progress
    pub async fn trigger_at(&self, today: NaiveDate) -> TriggerOutcome {
        let Some(_guard) = RunGuard::try_acquire(&self.inner.running) else {
            self.inner.metrics.record_run_skipped();
            warn!(today = %today, "expiry_run_skipped_in_progress");
            return TriggerOutcome::Skipped;
        };

        let start = Instant::now();
        match self.inner.pipeline.run_at(today).await {
            Ok(report) => {
                self.inner.metrics.record_run_completed(
                    duration_ms(report.elapsed),
                    report.reclassified.warned,
                    report.reclassified.dangered,
                    report.reclassified.missing,
                    report.notifications,
                );
                *self.inner.last_run.lock() =
                    Some(LastRun::Completed { finished_at: Utc::now(), report: report.clone() });
                TriggerOutcome::Completed(report)
            }
            Err(e) => {
                let elapsed_ms = duration_ms(start.elapsed());
                let message = e.to_string();
                let err = anyhow::Error::new(e);
                error!(
                    today = %today,
                    elapsed_ms = %elapsed_ms,
                    error = %message,
                    error_chain = %format!("{err:#}"),
                    "expiry_run_failed"
                );
                self.inner.metrics.record_run_failed(elapsed_ms);
                *self.inner.last_run.lock() =
                    Some(LastRun::Failed { finished_at: Utc::now(), error: message.clone() });
                TriggerOutcome::Failed(message)
            }
        }
    }

    /// Fire a trigger every period until shutdown
    ///
    /// Each tick spawns its own task, so a run longer than the period overlaps
    /// the next tick and that tick is skipped by the guard. On shutdown the
    /// in-flight run is awaited before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.inner.period;
        let mut ticker = if self.inner.run_on_startup {
            interval(period)
        } else {
            interval_at(tokio::time::Instant::now() + period, period)
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks: JoinSet<TriggerOutcome> = JoinSet::new();
        info!(
            period_ms = %duration_ms(period),
            run_on_startup = %self.inner.run_on_startup,
            "expiry_scheduler_started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    tasks.spawn(async move { scheduler.trigger().await });
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, "expiry_run_task_panicked");
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let mut detached = std::mem::take(&mut *self.inner.detached.lock());
        let pending = tasks.len() + detached.len();
        if pending > 0 {
            info!(pending = %pending, "expiry_scheduler_waiting_for_run");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "expiry_run_task_panicked");
            }
        }
        while let Some(joined) = detached.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "expiry_run_task_panicked");
            }
        }
        info!("expiry_scheduler_stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::freshness::{ExpiryPolicy, ShelfLifeScorer};
    use crate::domain::types::{
        FoodId, FoodItem, FoodNotice, NotificationReason, RefreshId, RefrigeratorId,
    };
    use crate::io::memory_store::MemoryFoodStore;
    use crate::io::notifier::{LogNotifier, Notifier};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Notifier that parks until released
    #[derive(Default)]
    struct GateNotifier {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Notifier for GateNotifier {
        async fn send_notification(&self, _items: &[FoodNotice], _reason: NotificationReason) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn store_with_expired_item() -> Arc<MemoryFoodStore> {
        let store = MemoryFoodStore::with_default_categories();
        store.insert_item(FoodItem {
            id: FoodId(1),
            name: "milk".to_string(),
            refrigerator_id: RefrigeratorId(1),
            refresh: RefreshId::NORMAL,
            prev_refresh: None,
            registered_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2024, 5, 8).unwrap(),
        });
        Arc::new(store)
    }

    fn scheduler_with(
        store: Arc<MemoryFoodStore>,
        notifier: Arc<dyn Notifier>,
        period: Duration,
    ) -> ExpiryScheduler {
        scheduler_with_options(store, notifier, period, true)
    }

    fn scheduler_with_options(
        store: Arc<MemoryFoodStore>,
        notifier: Arc<dyn Notifier>,
        period: Duration,
        run_on_startup: bool,
    ) -> ExpiryScheduler {
        let pipeline = ExpiryPipeline::new(
            store,
            notifier,
            Arc::new(ShelfLifeScorer::new(3)),
            ExpiryPolicy::default(),
        );
        ExpiryScheduler::new(pipeline, Arc::new(Metrics::new()), period, run_on_startup)
    }

    async fn wait_for_last_run(scheduler: &ExpiryScheduler) -> LastRun {
        for _ in 0..200 {
            if let Some(last_run) = scheduler.last_run() {
                return last_run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no run finished in time");
    }

    #[tokio::test]
    async fn test_trigger_during_run_is_skipped() {
        let notifier = Arc::new(GateNotifier::default());
        let scheduler =
            scheduler_with(store_with_expired_item(), notifier.clone(), Duration::from_secs(60));

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger_at(today()).await }
        });
        notifier.entered.notified().await;

        assert!(scheduler.is_running());
        assert!(matches!(scheduler.trigger_at(today()).await, TriggerOutcome::Skipped));

        notifier.release.notify_one();
        let outcome = first.await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Completed(_)));
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.metrics().runs_completed(), 1);
        assert_eq!(scheduler.metrics().runs_skipped(), 1);
    }

    #[tokio::test]
    async fn test_failed_run_does_not_block_next_trigger() {
        let store = store_with_expired_item();
        store.reject_updates_for(FoodId(1));
        let scheduler = scheduler_with(store.clone(), Arc::new(LogNotifier), Duration::from_secs(60));

        let outcome = scheduler.trigger_at(today()).await;
        assert!(matches!(outcome, TriggerOutcome::Failed(_)));
        assert!(!scheduler.is_running());
        assert!(matches!(scheduler.last_run(), Some(LastRun::Failed { .. })));
        assert_eq!(store.item(FoodId(1)).unwrap().refresh, RefreshId::NORMAL);

        store.clear_rejections();
        let outcome = scheduler.trigger_at(today()).await;
        let TriggerOutcome::Completed(report) = outcome else {
            panic!("expected completed run, got {outcome:?}");
        };
        assert_eq!(report.reclassified.dangered, 1);
        assert!(matches!(scheduler.last_run(), Some(LastRun::Completed { .. })));
        assert_eq!(scheduler.metrics().runs_failed(), 1);
        assert_eq!(scheduler.metrics().runs_completed(), 1);
    }

    #[tokio::test]
    async fn test_run_fires_on_startup_and_stops_on_shutdown() {
        let scheduler = scheduler_with(
            store_with_expired_item(),
            Arc::new(LogNotifier),
            Duration::from_secs(3600),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(shutdown_rx).await }
        });

        for _ in 0..100 {
            if scheduler.last_run().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        assert_eq!(scheduler.metrics().runs_completed(), 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_slow_run_skips_overlapping_ticks() {
        let notifier = Arc::new(GateNotifier::default());
        let scheduler =
            scheduler_with(store_with_expired_item(), notifier.clone(), Duration::from_millis(20));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(shutdown_rx).await }
        });

        // first tick is parked in the notifier; later ticks must bounce off the guard
        notifier.entered.notified().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(scheduler.is_running());
        assert!(scheduler.metrics().runs_skipped() >= 1);
        assert_eq!(scheduler.metrics().runs_completed(), 0);

        notifier.release.notify_one();
        wait_for_last_run(&scheduler).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        assert!(scheduler.metrics().runs_completed() >= 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_spawned_trigger_outlives_dropped_caller() {
        let store = store_with_expired_item();
        let notifier = Arc::new(GateNotifier::default());
        let scheduler = scheduler_with(store.clone(), notifier.clone(), Duration::from_secs(60));

        // caller goes away while the run is between stage 2 and stage 3
        drop(scheduler.spawn_trigger());
        notifier.entered.notified().await;
        assert_eq!(store.item(FoodId(1)).unwrap().refresh, RefreshId::DANGER);
        notifier.release.notify_one();

        let last_run = wait_for_last_run(&scheduler).await;
        let LastRun::Completed { report, .. } = last_run else {
            panic!("expected completed run, got {last_run:?}");
        };
        assert_eq!(report.notifications, 1);
        assert_eq!(scheduler.metrics().runs_completed(), 1);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_spawned_trigger() {
        let notifier = Arc::new(GateNotifier::default());
        let scheduler = scheduler_with_options(
            store_with_expired_item(),
            notifier.clone(),
            Duration::from_secs(3600),
            false,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(shutdown_rx).await }
        });

        let outcome = scheduler.spawn_trigger();
        notifier.entered.notified().await;
        shutdown_tx.send(true).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        notifier.release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        assert!(matches!(outcome.await.unwrap(), TriggerOutcome::Completed(_)));
        assert!(matches!(scheduler.last_run(), Some(LastRun::Completed { .. })));
    }

    #[test]
    fn test_guard_released_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = RunGuard::try_acquire(&flag).unwrap();
            assert!(flag.load(Ordering::Acquire));
            assert!(RunGuard::try_acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
