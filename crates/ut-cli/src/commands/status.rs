//! Status command for showing the tracking session and today's totals.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use ut_db::{Database, SessionRecord};

use crate::Config;
use crate::commands::report::format_duration;

const STATUS_APPS: usize = 5;

#[derive(Debug, Serialize)]
struct JsonStatus {
    database: String,
    tracking: bool,
    session: Option<SessionRecord>,
    today: JsonToday,
    top_apps: Vec<JsonApp>,
}

#[derive(Debug, Serialize)]
struct JsonToday {
    date: NaiveDate,
    total_secs: i64,
    active_secs: i64,
    idle_secs: i64,
    apps_used: i64,
}

#[derive(Debug, Serialize)]
struct JsonApp {
    name: String,
    duration_secs: i64,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    today: NaiveDate,
    json: bool,
) -> Result<()> {
    let session = db.open_session()?;
    let daily = db.daily_stats(today)?;
    let apps = db.top_apps(Some(today), STATUS_APPS)?;

    if json {
        let totals = daily.as_ref().map(|stat| stat.totals).unwrap_or_default();
        let status = JsonStatus {
            database: config.database_path.display().to_string(),
            tracking: session.is_some(),
            session,
            today: JsonToday {
                date: today,
                total_secs: totals.total_secs(),
                active_secs: totals.active_secs(),
                idle_secs: totals.idle_secs(),
                apps_used: daily.map_or(0, |stat| stat.apps_used),
            },
            top_apps: apps
                .into_iter()
                .map(|app| JsonApp {
                    name: app.app_name,
                    duration_secs: app.duration_ms / 1_000,
                })
                .collect(),
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&status)?)?;
        return Ok(());
    }

    writeln!(writer, "Usage tracker status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    match &session {
        Some(session) => writeln!(
            writer,
            "Tracking: session {} running since {}",
            session.id, session.started_at
        )?,
        None => writeln!(writer, "Tracking: not running")?,
    }

    let Some(daily) = daily else {
        writeln!(writer, "No usage recorded today.")?;
        return Ok(());
    };
    writeln!(
        writer,
        "Today ({today}): {} active, {} tracked",
        format_duration(daily.totals.active_ms),
        format_duration(daily.totals.total_ms)
    )?;

    if !apps.is_empty() {
        writeln!(writer, "Top apps:")?;
        for app in apps {
            writeln!(writer, "- {}: {}", app.app_name, format_duration(app.duration_ms))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Local, TimeZone, Utc};
    use insta::assert_snapshot;
    use ut_core::{SegmentStart, UsageTotals};
    use ut_db::DailyStat;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn config(path: &std::path::Path) -> Config {
        Config {
            database_path: path.to_path_buf(),
            ..Config::default()
        }
    }

    fn seed(db: &mut Database) {
        let session = db
            .create_session(&Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap())
            .unwrap();
        let started_at = Local.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        for (app, duration_ms) in [("Code", 3_600_000), ("Firefox", 1_800_000)] {
            let segment = SegmentStart {
                app_name: app.to_string(),
                exe_name: app.to_lowercase(),
                title: String::new(),
                category: "work".to_string(),
                started_at,
            };
            let id = db.open_segment(session, &segment).unwrap();
            db.close_segment(id, duration_ms, &started_at).unwrap();
        }
        db.upsert_daily_stats(&DailyStat {
            date: today(),
            totals: UsageTotals::from_parts(5_400_000, 1_800_000),
            apps_used: 2,
        })
        .unwrap();
    }

    fn render(db: &Database, json: bool) -> String {
        let config = config(std::path::Path::new("/data/ut/usage.db"));
        let mut output = Vec::new();
        run(&mut output, db, &config, today(), json).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn status_command_without_data() {
        let db = Database::open_in_memory().unwrap();
        assert_snapshot!(render(&db, false), @r"
        Usage tracker status
        Database: /data/ut/usage.db
        Tracking: not running
        No usage recorded today.
        ");
    }

    #[test]
    fn status_command_outputs_session_and_top_apps() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db);
        assert_snapshot!(render(&db, false), @r"
        Usage tracker status
        Database: /data/ut/usage.db
        Tracking: session 1 running since 2025-03-10T08:00:00.000Z
        Today (2025-03-10): 1h 30m active, 2h 0m tracked
        Top apps:
        - Code: 1h 0m
        - Firefox: 30m
        ");
    }

    #[test]
    fn status_command_json() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db);
        let json: serde_json::Value = serde_json::from_str(&render(&db, true)).unwrap();
        assert_eq!(json["tracking"], true);
        assert_eq!(json["session"]["id"], 1);
        assert_eq!(json["today"]["active_secs"], 5_400);
        assert_eq!(json["today"]["apps_used"], 2);
        assert_eq!(json["top_apps"][1]["name"], "Firefox");
        assert_eq!(json["top_apps"][1]["duration_secs"], 1_800);
    }
}
