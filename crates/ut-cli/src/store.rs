//! Storage adapter used by the tracker.
//!
//! [`UsageStore`] is the narrow write contract the tracker needs. The SQLite
//! implementation serializes every call through one mutex, which is the single
//! exclusion discipline the rollup upserts rely on.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, NaiveDate};
use ut_core::{DayBaseline, SegmentStart, UsageTotals};
use ut_db::{DailyStat, Database, DbError, RecoveryStats};

/// Durable writes performed by the tracker.
pub trait UsageStore: Send + Sync {
    /// Closes sessions and segments left open by a crash.
    fn recover(&self) -> Result<RecoveryStats, DbError>;

    /// Stored totals and launched apps for `day`, used to continue the day.
    fn day_baseline(&self, day: NaiveDate) -> Result<DayBaseline, DbError>;

    fn create_session(&self, started_at: DateTime<Local>) -> Result<i64, DbError>;

    fn update_session(
        &self,
        id: i64,
        totals: &UsageTotals,
        at: DateTime<Local>,
    ) -> Result<(), DbError>;

    fn close_session(
        &self,
        id: i64,
        totals: &UsageTotals,
        ended_at: DateTime<Local>,
    ) -> Result<(), DbError>;

    /// Opens a segment and records its launch; returns the segment id.
    fn open_segment(&self, session_id: i64, segment: &SegmentStart) -> Result<i64, DbError>;

    fn extend_segment(&self, id: i64, duration_ms: i64) -> Result<(), DbError>;

    fn close_segment(
        &self,
        id: i64,
        duration_ms: i64,
        ended_at: DateTime<Local>,
    ) -> Result<(), DbError>;

    /// Replaces the stored totals of a day.
    fn upsert_daily(&self, stat: &DailyStat) -> Result<(), DbError>;

    /// Adds active time to an hourly bucket.
    fn add_hourly_active(&self, date: NaiveDate, hour: u32, active_ms: i64)
    -> Result<(), DbError>;
}

/// [`UsageStore`] backed by a SQLite [`Database`].
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open(path: &Path) -> Result<Self, DbError> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Runs a read against the database under the store lock.
    pub fn read<T>(&self, f: impl FnOnce(&Database) -> Result<T, DbError>) -> Result<T, DbError> {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        // Writes are single statements or transactions; nothing is torn.
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UsageStore for SqliteStore {
    fn recover(&self) -> Result<RecoveryStats, DbError> {
        self.lock().close_orphaned_sessions()
    }

    fn day_baseline(&self, day: NaiveDate) -> Result<DayBaseline, DbError> {
        let db = self.lock();
        let totals = db
            .daily_stats(day)?
            .map(|stat| stat.totals)
            .unwrap_or_default();
        let apps = db.apps_seen_on(day)?;
        Ok(DayBaseline { day, totals, apps })
    }

    fn create_session(&self, started_at: DateTime<Local>) -> Result<i64, DbError> {
        self.lock().create_session(&started_at)
    }

    fn update_session(
        &self,
        id: i64,
        totals: &UsageTotals,
        at: DateTime<Local>,
    ) -> Result<(), DbError> {
        self.lock().update_session(id, totals, &at)
    }

    fn close_session(
        &self,
        id: i64,
        totals: &UsageTotals,
        ended_at: DateTime<Local>,
    ) -> Result<(), DbError> {
        self.lock().close_session(id, totals, &ended_at)
    }

    fn open_segment(&self, session_id: i64, segment: &SegmentStart) -> Result<i64, DbError> {
        self.lock().open_segment(session_id, segment)
    }

    fn extend_segment(&self, id: i64, duration_ms: i64) -> Result<(), DbError> {
        self.lock().extend_segment(id, duration_ms)
    }

    fn close_segment(
        &self,
        id: i64,
        duration_ms: i64,
        ended_at: DateTime<Local>,
    ) -> Result<(), DbError> {
        self.lock().close_segment(id, duration_ms, &ended_at)
    }

    fn upsert_daily(&self, stat: &DailyStat) -> Result<(), DbError> {
        self.lock().upsert_daily_stats(stat)
    }

    fn add_hourly_active(
        &self,
        date: NaiveDate,
        hour: u32,
        active_ms: i64,
    ) -> Result<(), DbError> {
        self.lock().add_hourly_active(date, hour, active_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> SqliteStore {
        SqliteStore::new(Database::open_in_memory().unwrap())
    }

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn day_baseline_reads_totals_and_launched_apps() {
        let store = store();
        let day = at(9).date_naive();
        let session = store.create_session(at(9)).unwrap();
        for app in ["Editor", "Browser", "Editor"] {
            let segment = SegmentStart {
                app_name: app.to_string(),
                exe_name: app.to_lowercase(),
                title: String::new(),
                category: "work".to_string(),
                started_at: at(9),
            };
            store.open_segment(session, &segment).unwrap();
        }
        store
            .upsert_daily(&DailyStat {
                date: day,
                totals: UsageTotals::from_parts(60_000, 1_000),
                apps_used: 2,
            })
            .unwrap();

        let baseline = store.day_baseline(day).unwrap();
        assert_eq!(baseline.totals, UsageTotals::from_parts(60_000, 1_000));
        assert_eq!(baseline.apps, vec!["Browser", "Editor"]);
    }

    #[test]
    fn day_baseline_is_empty_for_unseen_day() {
        let store = store();
        let day = at(9).date_naive();
        let baseline = store.day_baseline(day).unwrap();
        assert_eq!(
            baseline,
            DayBaseline {
                day,
                totals: UsageTotals::default(),
                apps: Vec::new(),
            }
        );
    }

    #[test]
    fn read_exposes_queries() {
        let store = store();
        store.add_hourly_active(at(9).date_naive(), 9, 1_000).unwrap();
        let hourly = store
            .read(|db| db.hourly_stats(at(9).date_naive()))
            .unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].active_ms, 1_000);
    }
}
