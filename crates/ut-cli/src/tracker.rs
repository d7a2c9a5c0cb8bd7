//! The tracker: single owner of the accounting engine.
//!
//! Two drivers touch the engine: the poll driver (every `poll_interval`) and
//! the flush driver (every `flush_interval`). Both go through one engine
//! mutex, held only while the engine computes.
//!
//! Store writes are serialized by the ledger mutex, which is always taken
//! before the engine mutex. Writes therefore land in the order the engine
//! produced them, and a flush can never overwrite a newer day rollover. The
//! drivers run every write on the blocking pool.
//!
//! Storage failures are logged and otherwise ignored: the in-memory totals
//! stay authoritative and the next flush rewrites the durable mirror.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use serde::Serialize;
use tracing::{debug, info, warn};
use ut_core::{AccountingEngine, DaySnapshot, EngineEvent, Observation, Observer, Snapshot};
use ut_db::DailyStat;

use crate::scheduler::PeriodicTask;
use crate::store::UsageStore;

/// Upper bound on a single observer query.
pub const OBSERVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Driver periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub poll_interval: Duration,
    pub flush_interval: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(30),
        }
    }
}

/// What the tracker reports to the API and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub running: bool,
    pub session_id: Option<i64>,
    pub snapshot: Snapshot,
}

/// Durable identities of the running session.
#[derive(Debug, Default)]
struct Ledger {
    session_id: Option<i64>,
    segment_id: Option<i64>,
}

#[derive(Debug, Default)]
struct Drivers {
    poll: Option<PeriodicTask>,
    flush: Option<PeriodicTask>,
}

/// Runs the accounting engine against an observer and a store.
pub struct Tracker {
    engine: Mutex<AccountingEngine>,
    ledger: Mutex<Ledger>,
    store: Arc<dyn UsageStore>,
    observer: Arc<Mutex<Box<dyn Observer>>>,
    settings: TrackerSettings,
    drivers: tokio::sync::Mutex<Drivers>,
}

impl Tracker {
    pub fn new(
        engine: AccountingEngine,
        observer: Box<dyn Observer>,
        store: Arc<dyn UsageStore>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            engine: Mutex::new(engine),
            ledger: Mutex::new(Ledger::default()),
            store,
            observer: Arc::new(Mutex::new(observer)),
            settings,
            drivers: tokio::sync::Mutex::new(Drivers::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_engine().is_running()
    }

    /// Starts a session and both drivers.
    ///
    /// Returns `false` when already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut drivers = self.drivers.lock().await;
        let started = self
            .on_blocking_pool(|tracker| tracker.begin_session_at(Local::now()))
            .await;
        if started != Some(true) {
            return false;
        }

        let tracker = Arc::clone(self);
        drivers.poll = Some(PeriodicTask::spawn(
            "poll",
            self.settings.poll_interval,
            move || {
                let tracker = Arc::clone(&tracker);
                async move { tracker.poll_once().await }
            },
        ));
        let tracker = Arc::clone(self);
        drivers.flush = Some(PeriodicTask::spawn(
            "flush",
            self.settings.flush_interval,
            move || {
                let tracker = Arc::clone(&tracker);
                async move {
                    tracker
                        .on_blocking_pool(|tracker| tracker.flush_at(Local::now()))
                        .await;
                }
            },
        ));
        true
    }

    /// Stops both drivers, then closes the session with a final flush.
    ///
    /// Idempotent: returns the final snapshot only for the call that stopped
    /// a running session.
    pub async fn stop(self: &Arc<Self>) -> Option<Snapshot> {
        let mut drivers = self.drivers.lock().await;
        if let Some(poll) = drivers.poll.take() {
            poll.cancel().await;
        }
        if let Some(flush) = drivers.flush.take() {
            flush.cancel().await;
        }
        self.on_blocking_pool(|tracker| tracker.finish_session_at(Local::now()))
            .await
            .flatten()
    }

    /// Current state, copied under the engine lock.
    pub fn status(&self) -> TrackerStatus {
        let (running, snapshot) = {
            let engine = self.lock_engine();
            (engine.is_running(), engine.snapshot(Local::now()))
        };
        TrackerStatus {
            running,
            session_id: self.lock_ledger().session_id,
            snapshot,
        }
    }

    /// Starts the engine and opens a durable session without any driver.
    ///
    /// Seeds the day totals from storage so a second session on the same day
    /// keeps counting from where the first left off.
    pub fn begin_session_at(&self, now: DateTime<Local>) -> bool {
        let mut ledger = self.lock_ledger();
        if self.is_running() {
            return false;
        }
        let baseline = match self.store.day_baseline(now.date_naive()) {
            Ok(baseline) => Some(baseline),
            Err(err) => {
                warn!(error = %err, "failed to read day baseline");
                None
            }
        };
        let session_id = match self.store.create_session(now) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(error = %err, "failed to create session, segments will not be stored");
                None
            }
        };

        if !self.lock_engine().start(now, baseline) {
            return false;
        }
        *ledger = Ledger {
            session_id,
            segment_id: None,
        };
        info!(session_id, "tracking started");
        true
    }

    /// Feeds one observation to the engine and persists the resulting events.
    pub fn tick_at(&self, observation: Option<&Observation>, now: DateTime<Local>) {
        let mut ledger = self.lock_ledger();
        let events = self.lock_engine().tick(observation, now);
        self.dispatch(&mut ledger, events);
    }

    /// Writes the running totals of the session and the day.
    pub fn flush_at(&self, now: DateTime<Local>) {
        let ledger = self.lock_ledger();
        let snapshot = {
            let engine = self.lock_engine();
            if !engine.is_running() {
                return;
            }
            engine.snapshot(now)
        };
        self.persist_snapshot(&ledger, &snapshot);
        debug!(total_ms = snapshot.session.total_ms, "flushed snapshot");
    }

    /// Stops the engine, persists the final events and totals and closes the
    /// durable session. Returns `None` when not running.
    pub fn finish_session_at(&self, now: DateTime<Local>) -> Option<Snapshot> {
        let mut ledger = self.lock_ledger();
        let (events, snapshot) = self.lock_engine().stop(now)?;
        self.dispatch(&mut ledger, events);
        self.persist_snapshot(&ledger, &snapshot);

        ledger.segment_id = None;
        let session_id = ledger.session_id.take();
        if let Some(id) = session_id {
            if let Err(err) = self.store.close_session(id, &snapshot.session, now) {
                warn!(error = %err, session_id = id, "failed to close session");
            }
        }
        info!(
            session_id,
            total_secs = snapshot.session.total_secs(),
            active_secs = snapshot.session.active_secs(),
            "tracking stopped"
        );
        Some(snapshot)
    }

    async fn poll_once(self: &Arc<Self>) {
        let observer = Arc::clone(&self.observer);
        let query = tokio::task::spawn_blocking(move || {
            observer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .poll()
        });
        let observation = match tokio::time::timeout(OBSERVE_TIMEOUT, query).await {
            Ok(Ok(Ok(observation))) => observation,
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "skipping observation");
                None
            }
            Ok(Err(err)) => {
                warn!(error = %err, "observer task failed");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = OBSERVE_TIMEOUT.as_millis(),
                    "observer timed out"
                );
                None
            }
        };
        let now = Local::now();
        self.on_blocking_pool(move |tracker| tracker.tick_at(observation.as_ref(), now))
            .await;
    }

    /// Runs engine and store work off the async workers.
    async fn on_blocking_pool<T, F>(self: &Arc<Self>, work: F) -> Option<T>
    where
        F: FnOnce(&Self) -> T + Send + 'static,
        T: Send + 'static,
    {
        let tracker = Arc::clone(self);
        match tokio::task::spawn_blocking(move || work(&tracker)).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "tracker task failed");
                None
            }
        }
    }

    fn persist_snapshot(&self, ledger: &Ledger, snapshot: &Snapshot) {
        if let Some(id) = ledger.session_id {
            if let Err(err) = self
                .store
                .update_session(id, &snapshot.session, snapshot.taken_at)
            {
                warn!(error = %err, session_id = id, "failed to flush session totals");
            }
        }
        if let Err(err) = self.store.upsert_daily(&daily_stat(&snapshot.day)) {
            warn!(error = %err, day = %snapshot.day.day, "failed to flush daily totals");
        }
    }

    fn dispatch(&self, ledger: &mut Ledger, events: Vec<EngineEvent>) {
        for event in events {
            let result = match event {
                EngineEvent::SegmentOpened(segment) => match ledger.session_id {
                    Some(session_id) => {
                        debug!(
                            app = %segment.app_name,
                            category = %segment.category,
                            "app switched"
                        );
                        self.store
                            .open_segment(session_id, &segment)
                            .map(|id| ledger.segment_id = Some(id))
                    }
                    None => Ok(()),
                },
                EngineEvent::SegmentProgress { duration_ms, .. } => match ledger.segment_id {
                    Some(id) => self.store.extend_segment(id, duration_ms),
                    None => Ok(()),
                },
                EngineEvent::SegmentClosed {
                    duration_ms, at, ..
                } => match ledger.segment_id.take() {
                    Some(id) => self.store.close_segment(id, duration_ms, at),
                    None => Ok(()),
                },
                EngineEvent::Tick {
                    delta_ms,
                    idle: false,
                    at,
                } if delta_ms > 0 => {
                    self.store
                        .add_hourly_active(at.date_naive(), at.hour(), delta_ms)
                }
                EngineEvent::DayRolled(day) => {
                    info!(
                        day = %day.day,
                        active_secs = day.totals.active_secs(),
                        "day rolled over"
                    );
                    self.store.upsert_daily(&daily_stat(&day))
                }
                EngineEvent::IdleChanged { idle, at } => {
                    debug!(idle, %at, "idle state changed");
                    Ok(())
                }
                EngineEvent::Tick { .. } => Ok(()),
            };
            if let Err(err) = result {
                warn!(error = %err, "failed to persist usage event");
            }
        }
    }

    fn lock_engine(&self) -> MutexGuard<'_, AccountingEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn daily_stat(day: &DaySnapshot) -> DailyStat {
    DailyStat {
        date: day.day,
        totals: day.totals,
        apps_used: i64::try_from(day.distinct_apps).unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use ut_core::{
        CategoryTable, EngineConfig, PrivacyFilter, PrivacyMode, ScriptedObserver, WindowHandle,
    };
    use ut_db::Database;

    use crate::store::SqliteStore;

    fn at(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn observation(handle: u64, app: &str) -> Observation {
        Observation::new(
            WindowHandle::new(handle),
            app,
            app.to_lowercase(),
            "window",
            Duration::ZERO,
        )
    }

    fn tracker() -> (Tracker, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new(Database::open_in_memory().unwrap()));
        let engine = AccountingEngine::new(
            EngineConfig::default(),
            CategoryTable::builtin(),
            PrivacyFilter::new(PrivacyMode::Full, ["bank"]),
        );
        let tracker = Tracker::new(
            engine,
            Box::new(ScriptedObserver::new()),
            Arc::clone(&store) as Arc<dyn UsageStore>,
            TrackerSettings::default(),
        );
        (tracker, store)
    }

    #[test]
    fn status_reports_session_and_snapshot() {
        let (tracker, _store) = tracker();
        assert!(!tracker.status().running);

        assert!(tracker.begin_session_at(at(0)));
        tracker.tick_at(Some(&observation(1, "Editor")), at(0));
        tracker.tick_at(Some(&observation(1, "Editor")), at(4));

        let status = tracker.status();
        assert!(status.running);
        assert!(status.session_id.is_some());
        assert_eq!(status.snapshot.current_app.as_deref(), Some("Editor"));
        assert_eq!(status.snapshot.session.active_ms, 4_000);
    }

    #[test]
    fn begin_twice_is_a_no_op() {
        let (tracker, store) = tracker();
        assert!(tracker.begin_session_at(at(0)));
        let first = tracker.status().session_id;
        assert!(!tracker.begin_session_at(at(1)));
        assert_eq!(tracker.status().session_id, first);

        let open = store.read(|db| db.open_session()).unwrap().unwrap();
        assert_eq!(Some(open.id), first);
    }

    #[test]
    fn finish_without_session_is_a_no_op() {
        let (tracker, _store) = tracker();
        assert!(tracker.finish_session_at(at(0)).is_none());
    }

    #[test]
    fn flush_writes_session_and_day() {
        let (tracker, store) = tracker();
        tracker.begin_session_at(at(0));
        tracker.tick_at(Some(&observation(1, "Editor")), at(0));
        tracker.tick_at(Some(&observation(1, "Editor")), at(6));
        tracker.flush_at(at(6));

        let session_id = tracker.status().session_id.unwrap();
        let session = store.read(|db| db.session(session_id)).unwrap().unwrap();
        assert_eq!(session.totals.active_ms, 6_000);

        let daily = store
            .read(|db| db.daily_stats(at(0).date_naive()))
            .unwrap()
            .unwrap();
        assert_eq!(daily.totals.active_ms, 6_000);
        assert_eq!(daily.apps_used, 1);
    }

    #[test]
    fn flush_when_stopped_writes_nothing() {
        let (tracker, store) = tracker();
        tracker.flush_at(at(0));
        let daily = store.read(|db| db.daily_stats(at(0).date_naive())).unwrap();
        assert!(daily.is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (tracker, store) = tracker();
        let tracker = Arc::new(tracker);
        assert!(tracker.start().await);
        assert!(!tracker.start().await, "second start is a no-op");

        assert!(tracker.stop().await.is_some());
        assert!(tracker.stop().await.is_none());
        assert!(!tracker.is_running());
        assert!(store.read(|db| db.open_session()).unwrap().is_none());
    }
}
