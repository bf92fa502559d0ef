use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use futures_util::FutureExt;

use crate::daemon::downloader::Downloader;
use crate::errors::ArchiverError;
use crate::models::watch::format_timestamp;
use crate::models::Watch;
use crate::storage::JsonWatchStore;

// ---------------------------------------------------------------------------
// Clock trait + implementations
// ---------------------------------------------------------------------------

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date used for watch windows, in the host's local time zone.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }
}

/// Real clock backed by system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Uses std::sync::RwLock so it can be
/// read from sync and async code alike.
pub struct FakeClock {
    time: std::sync::RwLock<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: std::sync::RwLock::new(time),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write().unwrap_or_else(|p| p.into_inner()) = time;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut t = self.time.write().unwrap_or_else(|p| p.into_inner());
        *t += duration;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap_or_else(|p| p.into_inner())
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Whether `watch` should run at `now`, given the calendar date `today`.
///
/// An unparsable `last_run` counts as never run.
pub fn is_due(watch: &Watch, now: DateTime<Utc>, today: NaiveDate) -> bool {
    if !watch.enabled {
        return false;
    }
    if !watch.is_active_on(today) {
        return false;
    }
    match watch.last_run_at() {
        Some(last) => {
            let elapsed_hours = (now - last).num_seconds() as f64 / 3600.0;
            elapsed_hours >= f64::from(watch.interval_hours)
        }
        None => true,
    }
}

// ---------------------------------------------------------------------------
// WatchScheduler
// ---------------------------------------------------------------------------

/// Periodically runs every due watch, one at a time, in store order.
pub struct WatchScheduler {
    store: Arc<JsonWatchStore>,
    downloader: Arc<Downloader>,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl WatchScheduler {
    pub fn new(
        store: Arc<JsonWatchStore>,
        downloader: Arc<Downloader>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            downloader,
            clock,
            period,
        }
    }

    /// One pass over the store. Returns how many watches ran.
    ///
    /// Downloads happen outside the store lock; the new `last_run` values are
    /// merged back by id in a single save at the end of the pass.
    pub async fn tick(&self) -> Result<usize, ArchiverError> {
        let watches = self.store.load().await;
        let now = self.clock.now();
        let today = self.clock.today();

        let mut runs: Vec<(String, String)> = Vec::new();
        for watch in watches.iter().filter(|w| is_due(w, now, today)) {
            let ok = self.downloader.run_watch(watch).await;
            tracing::debug!("Watch '{}' run finished (success={})", watch.name, ok);
            runs.push((watch.id.clone(), format_timestamp(self.clock.now())));
        }

        if !runs.is_empty() {
            self.store.record_runs(&runs).await?;
        }
        Ok(runs.len())
    }

    /// Loop forever: sleep one period, then tick. Errors and panics inside a
    /// tick are logged and the loop carries on.
    pub async fn run(&self) {
        tracing::info!(
            "Scheduler started (every {}s)",
            self.period.as_secs()
        );
        loop {
            tokio::time::sleep(self.period).await;

            match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(Ok(0)) => tracing::debug!("Scheduler tick: nothing due"),
                Ok(Ok(ran)) => tracing::info!("Scheduler tick: ran {} watch(es)", ran),
                Ok(Err(e)) => tracing::error!("Scheduler tick failed: {}", e),
                Err(_) => tracing::error!("Scheduler tick panicked"),
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
