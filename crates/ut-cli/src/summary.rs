//! Report data shared by the CLI and the HTTP API.
//!
//! Everything here reads from the database and converts stored milliseconds
//! into the shapes the presentation layers render.

use chrono::NaiveDate;
use serde::Serialize;
use ut_core::{CategoryTable, UsageTotals};
use ut_db::{AppTotal, CategoryTotal, DailyStat, Database, DbError, HourlyStat};

/// Whole seconds of a millisecond duration.
pub const fn secs(ms: i64) -> i64 {
    ms / 1_000
}

/// `part / whole` as a percentage rounded to one decimal; 0 when `whole` is 0.
#[allow(clippy::cast_precision_loss)]
pub fn percent(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 * 1_000.0 / whole as f64).round() / 10.0
}

/// Share of tracked time that was active.
pub fn productivity(totals: &UsageTotals) -> f64 {
    percent(totals.active_ms, totals.total_ms)
}

/// Spreads stored hourly rows over 24 buckets of active milliseconds.
pub fn hourly_buckets(stats: &[HourlyStat]) -> [i64; 24] {
    let mut buckets = [0; 24];
    for stat in stats {
        if let Some(bucket) = usize::try_from(stat.hour)
            .ok()
            .and_then(|hour| buckets.get_mut(hour))
        {
            *bucket += stat.active_ms;
        }
    }
    buckets
}

/// Daily totals for the `days` days ending at `end`, oldest first.
///
/// Days without a stored row are reported as zero.
pub fn last_days(db: &Database, end: NaiveDate, days: u32) -> Result<Vec<DailyStat>, DbError> {
    let start = end - chrono::Duration::days(i64::from(days.saturating_sub(1)));
    let stored = db.daily_stats_in_range(start, end)?;
    Ok(start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|date| {
            stored
                .iter()
                .find(|stat| stat.date == date)
                .cloned()
                .unwrap_or(DailyStat {
                    date,
                    totals: UsageTotals::default(),
                    apps_used: 0,
                })
        })
        .collect())
}

/// An application row with its display category and share of the total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppShare {
    pub app_name: String,
    pub category: String,
    pub category_name: String,
    pub duration_ms: i64,
    pub percent: f64,
}

/// A category row with its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub name: String,
    pub duration_ms: i64,
}

/// Attaches display names and percentages to top application rows.
pub fn app_shares(apps: Vec<AppTotal>, categories: &CategoryTable) -> Vec<AppShare> {
    let total: i64 = apps.iter().map(|app| app.duration_ms).sum();
    apps.into_iter()
        .map(|app| AppShare {
            category_name: categories.display_name(&app.category).to_string(),
            percent: percent(app.duration_ms, total),
            app_name: app.app_name,
            category: app.category,
            duration_ms: app.duration_ms,
        })
        .collect()
}

pub fn category_shares(
    totals: Vec<CategoryTotal>,
    categories: &CategoryTable,
) -> Vec<CategoryShare> {
    totals
        .into_iter()
        .map(|total| CategoryShare {
            name: categories.display_name(&total.category).to_string(),
            category: total.category,
            duration_ms: total.duration_ms,
        })
        .collect()
}

/// Everything recorded for one local day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayReport {
    pub date: NaiveDate,
    pub totals: UsageTotals,
    pub apps_used: i64,
    pub apps: Vec<AppShare>,
    pub categories: Vec<CategoryShare>,
    pub hourly: [i64; 24],
}

impl DayReport {
    pub fn is_empty(&self) -> bool {
        self.totals.total_ms == 0 && self.apps.is_empty()
    }
}

/// Loads the report of `date` with at most `app_limit` applications.
pub fn load_day_report(
    db: &Database,
    categories: &CategoryTable,
    date: NaiveDate,
    app_limit: usize,
) -> Result<DayReport, DbError> {
    let (totals, apps_used) = db
        .daily_stats(date)?
        .map_or((UsageTotals::default(), 0), |stat| (stat.totals, stat.apps_used));
    Ok(DayReport {
        date,
        totals,
        apps_used,
        apps: app_shares(db.top_apps(Some(date), app_limit)?, categories),
        categories: category_shares(db.category_totals(Some(date))?, categories),
        hourly: hourly_buckets(&db.hourly_stats(date)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn percent_rounds_to_one_decimal() {
        assert!((percent(1, 3) - 33.3).abs() < f64::EPSILON);
        assert!((percent(2, 3) - 66.7).abs() < f64::EPSILON);
        assert!((percent(5, 5) - 100.0).abs() < f64::EPSILON);
        assert!(percent(5, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn productivity_is_active_share() {
        let totals = UsageTotals::from_parts(45_000, 15_000);
        assert!((productivity(&totals) - 75.0).abs() < f64::EPSILON);
        assert!(productivity(&UsageTotals::default()).abs() < f64::EPSILON);
    }

    #[test]
    fn secs_truncates() {
        assert_eq!(secs(1_999), 1);
        assert_eq!(secs(60_000), 60);
    }

    #[test]
    fn hourly_buckets_fill_missing_hours_with_zero() {
        let buckets = hourly_buckets(&[
            HourlyStat {
                hour: 9,
                active_ms: 1_000,
            },
            HourlyStat {
                hour: 23,
                active_ms: 2_000,
            },
        ]);
        assert_eq!(buckets[9], 1_000);
        assert_eq!(buckets[23], 2_000);
        assert_eq!(buckets.iter().sum::<i64>(), 3_000);
    }

    #[test]
    fn last_days_fills_gaps() {
        let mut db = Database::open_in_memory().unwrap();
        db.upsert_daily_stats(&DailyStat {
            date: date(9),
            totals: UsageTotals::from_parts(10_000, 0),
            apps_used: 2,
        })
        .unwrap();

        let days = last_days(&db, date(10), 3).unwrap();
        let dates: Vec<_> = days.iter().map(|day| day.date).collect();
        assert_eq!(dates, vec![date(8), date(9), date(10)]);
        assert_eq!(days[0].totals.total_ms, 0);
        assert_eq!(days[1].totals.active_ms, 10_000);
        assert_eq!(days[1].apps_used, 2);
    }

    #[test]
    fn app_shares_use_display_names() {
        let shares = app_shares(
            vec![
                AppTotal {
                    app_name: "Code".to_string(),
                    category: "development".to_string(),
                    duration_ms: 3_000,
                    segments: 1,
                },
                AppTotal {
                    app_name: "Mystery".to_string(),
                    category: "other".to_string(),
                    duration_ms: 1_000,
                    segments: 2,
                },
            ],
            &CategoryTable::builtin(),
        );
        assert_eq!(shares[0].category_name, "Development");
        assert!((shares[0].percent - 75.0).abs() < f64::EPSILON);
        assert_eq!(shares[1].category_name, "Other");
    }

    #[test]
    fn empty_day_report() {
        let db = Database::open_in_memory().unwrap();
        let report = load_day_report(&db, &CategoryTable::builtin(), date(10), 10).unwrap();
        assert!(report.is_empty());
        assert_eq!(report.hourly, [0; 24]);
    }
}
