//! Storage layer for the usage tracker.
//!
//! Provides persistence for sessions, application segments and rollups using
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Callers that write from more than one task must serialize access, for
//! example with a `Mutex<Database>`. The tracker uses exactly one such mutex
//! for every write path, which is what keeps the read-modify-write upserts
//! below atomic with respect to each other.
//!
//! # Schema
//!
//! ## Units
//!
//! Durations are stored as integer milliseconds (`*_ms` columns). Reports
//! convert to seconds at the edge.
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`), so lexicographic order matches
//! chronological order. Date buckets (`date` columns) are the local calendar
//! date as `YYYY-MM-DD`, and `hour` is the local hour 0-23.
//!
//! ## Rollups
//!
//! `daily_stats` rows are replaced on every upsert. `hourly_stats` rows are
//! accumulated: every write adds to the bucket.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc, Weekday};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use ut_core::{SegmentStart, UsageTotals};

const DATE_FORMAT: &str = "%Y-%m-%d";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored date bucket could not be parsed.
    #[error("invalid date in {table}: {value}")]
    InvalidDate {
        table: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A tracking session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub totals: UsageTotals,
}

/// One application usage segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentRecord {
    pub id: i64,
    pub session_id: i64,
    pub app_name: String,
    pub exe_name: String,
    pub title: String,
    pub category: String,
    pub date: NaiveDate,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_ms: i64,
    pub is_open: bool,
}

/// Totals for one day, replaced on every flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub totals: UsageTotals,
    pub apps_used: i64,
}

/// Active time accumulated in one local hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyStat {
    pub hour: u32,
    pub active_ms: i64,
}

/// Usage aggregated per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppTotal {
    pub app_name: String,
    /// Category that accounts for most of the application's time.
    pub category: String,
    pub duration_ms: i64,
    /// Number of segments.
    pub segments: i64,
}

/// Usage aggregated per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub duration_ms: i64,
}

/// Number of times an application took the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchCount {
    pub app_name: String,
    pub launches: i64,
}

/// Average daily active time for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekdayAverage {
    pub weekday: Weekday,
    pub avg_active_ms: i64,
    /// Number of recorded days that contributed to the average.
    pub days: i64,
}

/// Summary of crash recovery at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub sessions_closed: usize,
    pub segments_closed: usize,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                total_ms INTEGER NOT NULL DEFAULT 0,
                active_ms INTEGER NOT NULL DEFAULT 0,
                idle_ms INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            -- One row per contiguous foreground interval of an application.
            -- date: local date the segment started in
            -- is_open: 1 while the application still holds the foreground
            CREATE TABLE IF NOT EXISTS app_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                app_name TEXT NOT NULL,
                exe_name TEXT NOT NULL,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                date TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                is_open INTEGER NOT NULL DEFAULT 1,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_app_usage_date ON app_usage(date);
            CREATE INDEX IF NOT EXISTS idx_app_usage_app ON app_usage(app_name);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_app_usage_one_open
                ON app_usage(session_id) WHERE is_open = 1;

            CREATE TABLE IF NOT EXISTS app_launches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_name TEXT NOT NULL,
                exe_name TEXT NOT NULL,
                launched_at TEXT NOT NULL,
                date TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_app_launches_date ON app_launches(date);

            CREATE TABLE IF NOT EXISTS daily_stats (
                date TEXT PRIMARY KEY,
                total_ms INTEGER NOT NULL DEFAULT 0,
                active_ms INTEGER NOT NULL DEFAULT 0,
                idle_ms INTEGER NOT NULL DEFAULT 0,
                apps_used INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS hourly_stats (
                date TEXT NOT NULL,
                hour INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
                active_ms INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (date, hour)
            );
            ",
        )?;
        Ok(())
    }

    // ========== Sessions ==========

    /// Creates an open session and returns its id.
    pub fn create_session<Tz: TimeZone>(
        &mut self,
        started_at: &DateTime<Tz>,
    ) -> Result<i64, DbError> {
        let started_at = format_timestamp(started_at);
        self.conn.execute(
            "INSERT INTO sessions (started_at, updated_at) VALUES (?, ?)",
            params![started_at, started_at],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(session_id = id, "session created");
        Ok(id)
    }

    /// Replaces the running totals of a session.
    pub fn update_session<Tz: TimeZone>(
        &mut self,
        id: i64,
        totals: &UsageTotals,
        at: &DateTime<Tz>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            UPDATE sessions
            SET total_ms = ?, active_ms = ?, idle_ms = ?, updated_at = ?
            WHERE id = ?
            ",
            params![
                totals.total_ms,
                totals.active_ms,
                totals.idle_ms,
                format_timestamp(at),
                id
            ],
        )?;
        Ok(())
    }

    /// Writes final totals and marks the session ended.
    pub fn close_session<Tz: TimeZone>(
        &mut self,
        id: i64,
        totals: &UsageTotals,
        ended_at: &DateTime<Tz>,
    ) -> Result<(), DbError> {
        let ended_at = format_timestamp(ended_at);
        self.conn.execute(
            "
            UPDATE sessions
            SET total_ms = ?, active_ms = ?, idle_ms = ?, updated_at = ?, ended_at = ?
            WHERE id = ?
            ",
            params![
                totals.total_ms,
                totals.active_ms,
                totals.idle_ms,
                ended_at,
                ended_at,
                id
            ],
        )?;
        info!(session_id = id, "session closed");
        Ok(())
    }

    pub fn session(&self, id: i64) -> Result<Option<SessionRecord>, DbError> {
        let session = self
            .conn
            .query_row(
                "
                SELECT id, started_at, ended_at, total_ms, active_ms, idle_ms
                FROM sessions
                WHERE id = ?
                ",
                [id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Returns the most recently started session that has not ended.
    pub fn open_session(&self) -> Result<Option<SessionRecord>, DbError> {
        let session = self
            .conn
            .query_row(
                "
                SELECT id, started_at, ended_at, total_ms, active_ms, idle_ms
                FROM sessions
                WHERE ended_at IS NULL
                ORDER BY started_at DESC, id DESC
                LIMIT 1
                ",
                [],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Closes sessions and segments left open by a process that did not stop
    /// cleanly.
    ///
    /// Segments are extended on every tick but sessions only on a flush, so an
    /// open segment ends at `started_at + duration_ms` and a session ends at
    /// the later of its last flush and its last segment end.
    pub fn close_orphaned_sessions(&mut self) -> Result<RecoveryStats, DbError> {
        let tx = self.conn.transaction()?;
        let segments_closed = tx.execute(
            "
            UPDATE app_usage
            SET is_open = 0,
                ended_at = strftime(
                    '%Y-%m-%dT%H:%M:%fZ',
                    julianday(started_at) + duration_ms / 86400000.0
                )
            WHERE is_open = 1
              AND session_id IN (SELECT id FROM sessions WHERE ended_at IS NULL)
            ",
            [],
        )?;
        let sessions_closed = tx.execute(
            "
            UPDATE sessions
            SET ended_at = MAX(
                updated_at,
                COALESCE(
                    (
                        SELECT MAX(ended_at) FROM app_usage
                        WHERE app_usage.session_id = sessions.id
                    ),
                    updated_at
                )
            )
            WHERE ended_at IS NULL
            ",
            [],
        )?;
        tx.commit()?;
        if sessions_closed > 0 {
            info!(sessions_closed, segments_closed, "recovered orphaned sessions");
        }
        Ok(RecoveryStats {
            sessions_closed,
            segments_closed,
        })
    }

    // ========== Segments ==========

    /// Opens a segment and records a launch event in one transaction.
    ///
    /// Any segment still open in the same session is closed first, so a
    /// session never has more than one open segment.
    pub fn open_segment(
        &mut self,
        session_id: i64,
        segment: &SegmentStart,
    ) -> Result<i64, DbError> {
        let started_at = format_timestamp(&segment.started_at);
        let date = format_date(segment.started_at.date_naive());
        let tx = self.conn.transaction()?;
        let stale = tx.execute(
            "
            UPDATE app_usage
            SET is_open = 0, ended_at = ?
            WHERE session_id = ? AND is_open = 1
            ",
            params![started_at, session_id],
        )?;
        if stale > 0 {
            debug!(session_id, "closed stale open segment");
        }
        tx.execute(
            "
            INSERT INTO app_usage
            (session_id, app_name, exe_name, title, category, date, started_at,
             duration_ms, is_open)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, 1)
            ",
            params![
                session_id,
                segment.app_name,
                segment.exe_name,
                segment.title,
                segment.category,
                date,
                started_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "
            INSERT INTO app_launches (app_name, exe_name, launched_at, date)
            VALUES (?, ?, ?, ?)
            ",
            params![segment.app_name, segment.exe_name, started_at, date],
        )?;
        tx.commit()?;
        Ok(id)
    }

    /// Updates the running duration of an open segment.
    pub fn extend_segment(&mut self, id: i64, duration_ms: i64) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE app_usage SET duration_ms = ? WHERE id = ? AND is_open = 1",
            params![duration_ms, id],
        )?;
        Ok(())
    }

    /// Finalizes a segment.
    pub fn close_segment<Tz: TimeZone>(
        &mut self,
        id: i64,
        duration_ms: i64,
        ended_at: &DateTime<Tz>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            UPDATE app_usage
            SET duration_ms = ?, ended_at = ?, is_open = 0
            WHERE id = ?
            ",
            params![duration_ms, format_timestamp(ended_at), id],
        )?;
        Ok(())
    }

    /// Lists the segments of a session in start order.
    pub fn session_segments(&self, session_id: i64) -> Result<Vec<SegmentRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, session_id, app_name, exe_name, title, category, date,
                   started_at, ended_at, duration_ms, is_open
            FROM app_usage
            WHERE session_id = ?
            ORDER BY started_at ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok(SegmentRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                app_name: row.get(2)?,
                exe_name: row.get(3)?,
                title: row.get(4)?,
                category: row.get(5)?,
                date: row.get(6)?,
                started_at: row.get(7)?,
                ended_at: row.get(8)?,
                duration_ms: row.get(9)?,
                is_open: row.get(10)?,
            })
        })?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?.into_record()?);
        }
        Ok(segments)
    }

    // ========== Rollups ==========

    /// Inserts or replaces the totals for a day.
    pub fn upsert_daily_stats(&mut self, stat: &DailyStat) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO daily_stats (date, total_ms, active_ms, idle_ms, apps_used)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(date) DO UPDATE SET
                total_ms = excluded.total_ms,
                active_ms = excluded.active_ms,
                idle_ms = excluded.idle_ms,
                apps_used = excluded.apps_used
            ",
            params![
                format_date(stat.date),
                stat.totals.total_ms,
                stat.totals.active_ms,
                stat.totals.idle_ms,
                stat.apps_used,
            ],
        )?;
        Ok(())
    }

    /// Adds active time to an hourly bucket.
    ///
    /// This is not idempotent: writing the same delta twice doubles it.
    pub fn add_hourly_active(
        &mut self,
        date: NaiveDate,
        hour: u32,
        active_ms: i64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO hourly_stats (date, hour, active_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(date, hour) DO UPDATE SET
                active_ms = hourly_stats.active_ms + excluded.active_ms
            ",
            params![format_date(date), hour, active_ms],
        )?;
        Ok(())
    }

    // ========== Reports ==========

    pub fn daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStat>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT total_ms, active_ms, idle_ms, apps_used
                FROM daily_stats
                WHERE date = ?
                ",
                [format_date(date)],
                |row| {
                    let totals = totals_from_row(row, 0)?;
                    Ok(DailyStat {
                        date,
                        totals,
                        apps_used: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Lists daily totals for an inclusive date range, oldest first.
    pub fn daily_stats_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStat>, DbError> {
        if end < start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT date, total_ms, active_ms, idle_ms, apps_used
            FROM daily_stats
            WHERE date BETWEEN ? AND ?
            ORDER BY date ASC
            ",
        )?;
        let rows = stmt.query_map([format_date(start), format_date(end)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                totals_from_row(row, 1)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        let mut stats = Vec::new();
        for row in rows {
            let (date, totals, apps_used) = row?;
            stats.push(DailyStat {
                date: parse_date(&date, "daily_stats")?,
                totals,
                apps_used,
            });
        }
        Ok(stats)
    }

    /// Lists the non-empty hourly buckets of a day, ordered by hour.
    pub fn hourly_stats(&self, date: NaiveDate) -> Result<Vec<HourlyStat>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT hour, active_ms
            FROM hourly_stats
            WHERE date = ?
            ORDER BY hour ASC
            ",
        )?;
        let rows = stmt.query_map([format_date(date)], |row| {
            Ok(HourlyStat {
                hour: row.get(0)?,
                active_ms: row.get(1)?,
            })
        })?;
        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }
        Ok(stats)
    }

    /// Applications ordered by total segment duration, longest first.
    ///
    /// `date` restricts the result to segments that started on that day.
    pub fn top_apps(
        &self,
        date: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<AppTotal>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT app_name, category, SUM(duration_ms), COUNT(*)
            FROM app_usage
            WHERE ?1 IS NULL OR date = ?1
            GROUP BY app_name, category
            ",
        )?;
        let rows = stmt.query_map([date.map(format_date)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        // An application can land in different categories depending on its
        // title; report the category holding most of its time.
        let mut by_app: HashMap<String, (AppTotal, i64)> = HashMap::new();
        for row in rows {
            let (app_name, category, duration_ms, segments) = row?;
            let entry = by_app.entry(app_name.clone()).or_insert_with(|| {
                (
                    AppTotal {
                        app_name,
                        category: category.clone(),
                        duration_ms: 0,
                        segments: 0,
                    },
                    i64::MIN,
                )
            });
            let (total, best) = entry;
            total.duration_ms += duration_ms;
            total.segments += segments;
            if duration_ms > *best || (duration_ms == *best && category < total.category) {
                *best = duration_ms;
                total.category = category;
            }
        }

        let mut apps: Vec<AppTotal> = by_app.into_values().map(|(total, _)| total).collect();
        apps.sort_by(|a, b| {
            b.duration_ms
                .cmp(&a.duration_ms)
                .then_with(|| a.app_name.cmp(&b.app_name))
        });
        apps.truncate(limit);
        Ok(apps)
    }

    /// Total segment duration per category, longest first.
    pub fn category_totals(&self, date: Option<NaiveDate>) -> Result<Vec<CategoryTotal>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT category, SUM(duration_ms) AS total
            FROM app_usage
            WHERE ?1 IS NULL OR date = ?1
            GROUP BY category
            ORDER BY total DESC, category ASC
            ",
        )?;
        let rows = stmt.query_map([date.map(format_date)], |row| {
            Ok(CategoryTotal {
                category: row.get(0)?,
                duration_ms: row.get(1)?,
            })
        })?;
        let mut totals = Vec::new();
        for row in rows {
            totals.push(row?);
        }
        Ok(totals)
    }

    /// Launch counts per application, most launched first.
    pub fn launch_counts(&self, date: Option<NaiveDate>) -> Result<Vec<LaunchCount>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT app_name, COUNT(*) AS launches
            FROM app_launches
            WHERE ?1 IS NULL OR date = ?1
            GROUP BY app_name
            ORDER BY launches DESC, app_name ASC
            ",
        )?;
        let rows = stmt.query_map([date.map(format_date)], |row| {
            Ok(LaunchCount {
                app_name: row.get(0)?,
                launches: row.get(1)?,
            })
        })?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Distinct applications launched on a day, sorted by name.
    pub fn apps_seen_on(&self, date: NaiveDate) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT DISTINCT app_name
            FROM app_launches
            WHERE date = ?
            ORDER BY app_name ASC
            ",
        )?;
        let rows = stmt.query_map([format_date(date)], |row| row.get::<_, String>(0))?;
        let mut apps = Vec::new();
        for row in rows {
            apps.push(row?);
        }
        Ok(apps)
    }

    /// Average daily active time per weekday, Monday first.
    ///
    /// Weekdays without any recorded day are omitted.
    pub fn weekday_averages(&self) -> Result<Vec<WeekdayAverage>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT CAST(strftime('%w', date) AS INTEGER) AS day_num,
                   CAST(AVG(active_ms) AS INTEGER),
                   COUNT(*)
            FROM daily_stats
            GROUP BY day_num
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut averages = Vec::new();
        for row in rows {
            let (day_num, avg_active_ms, days) = row?;
            if let Some(weekday) = weekday_from_sunday(day_num) {
                averages.push(WeekdayAverage {
                    weekday,
                    avg_active_ms,
                    days,
                });
            }
        }
        averages.sort_by_key(|avg| avg.weekday.num_days_from_monday());
        Ok(averages)
    }
}

#[derive(Debug)]
struct SegmentRow {
    id: i64,
    session_id: i64,
    app_name: String,
    exe_name: String,
    title: String,
    category: String,
    date: String,
    started_at: String,
    ended_at: Option<String>,
    duration_ms: i64,
    is_open: bool,
}

impl SegmentRow {
    fn into_record(self) -> Result<SegmentRecord, DbError> {
        Ok(SegmentRecord {
            id: self.id,
            session_id: self.session_id,
            app_name: self.app_name,
            exe_name: self.exe_name,
            title: self.title,
            category: self.category,
            date: parse_date(&self.date, "app_usage")?,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_ms: self.duration_ms,
            is_open: self.is_open,
        })
    }
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        ended_at: row.get(2)?,
        totals: totals_from_row(row, 3)?,
    })
}

/// Reads `total_ms, active_ms, idle_ms` starting at column `first`.
fn totals_from_row(row: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<UsageTotals> {
    Ok(UsageTotals {
        total_ms: row.get(first)?,
        active_ms: row.get(first + 1)?,
        idle_ms: row.get(first + 2)?,
    })
}

const fn weekday_from_sunday(day_num: i64) -> Option<Weekday> {
    match day_num {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

fn format_timestamp<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String {
    timestamp
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(value: &str, table: &'static str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|source| DbError::InvalidDate {
        table,
        value: value.to_string(),
        source,
    })
}
