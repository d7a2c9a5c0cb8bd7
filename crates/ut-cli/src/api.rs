//! HTTP API over the tracker and the usage database.
//!
//! # Endpoints
//!
//! - `GET /api/status`: tracker state and the live snapshot
//! - `GET /api/stats/today`, `GET /api/stats/week`: daily totals
//! - `GET /api/apps`, `GET /api/categories`, `GET /api/launches`: breakdowns,
//!   `?period=today|all`
//! - `GET /api/hourly`, `GET /api/week-comparison`, `GET /api/trend`: charts
//! - `POST /api/start`, `POST /api/stop`: tracker control
//!
//! Durations are reported in whole seconds.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use ut_core::CategoryTable;
use ut_db::{Database, DbError};

use crate::store::SqliteStore;
use crate::summary::{self, AppShare, CategoryShare, productivity, secs};
use crate::tracker::Tracker;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;
const WEEK_DAYS: u32 = 7;

// ============================================================================
// Application State
// ============================================================================

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub store: Arc<SqliteStore>,
    pub categories: Arc<CategoryTable>,
}

impl AppState {
    pub const fn new(
        tracker: Arc<Tracker>,
        store: Arc<SqliteStore>,
        categories: Arc<CategoryTable>,
    ) -> Self {
        Self {
            tracker,
            store,
            categories,
        }
    }

    /// Runs a query on the blocking pool.
    async fn read<T, F>(&self, query: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Database, &CategoryTable) -> Result<T, DbError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let categories = Arc::clone(&self.categories);
        let result =
            tokio::task::spawn_blocking(move || store.read(|db| query(db, &categories))).await?;
        Ok(result?)
    }
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/stats/today", get(get_today))
        .route("/api/stats/week", get(get_week))
        .route("/api/apps", get(get_apps))
        .route("/api/hourly", get(get_hourly))
        .route("/api/categories", get(get_categories))
        .route("/api/launches", get(get_launches))
        .route("/api/week-comparison", get(get_week_comparison))
        .route("/api/trend", get(get_trend))
        .route("/api/start", post(post_start))
        .route("/api/stop", post(post_stop))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Failures surfaced as `500 Internal Server Error`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(error = %self, "API request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Query Parameters
// ============================================================================

/// Which days a breakdown covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Today,
    All,
}

impl Period {
    fn date(self) -> Option<NaiveDate> {
        match self {
            Self::Today => Some(today()),
            Self::All => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    pub period: Period,
    pub limit: Option<usize>,
}

impl PeriodQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub session_id: Option<i64>,
    pub total_secs: i64,
    pub active_secs: i64,
    pub idle_secs: i64,
    pub current_app: Option<String>,
    pub is_idle: bool,
    pub distinct_apps: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DayResponse {
    pub date: NaiveDate,
    pub total_secs: i64,
    pub active_secs: i64,
    pub idle_secs: i64,
    pub apps_used: i64,
    pub productivity: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeekResponse {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_secs: i64,
    pub active_secs: i64,
    /// Active seconds averaged over all seven days.
    pub avg_daily_active_secs: i64,
    pub days: Vec<DayResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppResponse {
    pub name: String,
    pub category: String,
    pub category_name: String,
    pub duration_secs: i64,
    pub percent: f64,
}

impl From<AppShare> for AppResponse {
    fn from(app: AppShare) -> Self {
        Self {
            name: app.app_name,
            category: app.category,
            category_name: app.category_name,
            duration_secs: secs(app.duration_ms),
            percent: app.percent,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
    pub duration_secs: i64,
}

impl From<CategoryShare> for CategoryResponse {
    fn from(category: CategoryShare) -> Self {
        Self {
            id: category.category,
            name: category.name,
            duration_secs: secs(category.duration_ms),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HourResponse {
    pub hour: usize,
    pub active_secs: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub name: String,
    pub launches: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeekdayResponse {
    pub day: String,
    pub avg_active_secs: i64,
    pub hours: f64,
    pub days: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrendResponse {
    pub date: NaiveDate,
    pub productivity: f64,
    pub active_hours: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: String,
    /// False when the tracker already was in the requested state.
    pub changed: bool,
}

fn day_response(stat: &ut_db::DailyStat) -> DayResponse {
    DayResponse {
        date: stat.date,
        total_secs: stat.totals.total_secs(),
        active_secs: stat.totals.active_secs(),
        idle_secs: stat.totals.idle_secs(),
        apps_used: stat.apps_used,
        productivity: productivity(&stat.totals),
    }
}

/// Hours with one decimal.
#[allow(clippy::cast_precision_loss)]
fn hours(ms: i64) -> f64 {
    (ms as f64 / 360_000.0).round() / 10.0
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.tracker.status();
    let snapshot = status.snapshot;
    Json(StatusResponse {
        running: status.running,
        session_id: status.session_id,
        total_secs: snapshot.session.total_secs(),
        active_secs: snapshot.session.active_secs(),
        idle_secs: snapshot.session.idle_secs(),
        current_app: snapshot.current_app,
        is_idle: snapshot.is_idle,
        distinct_apps: snapshot.day.distinct_apps,
    })
}

async fn get_today(State(state): State<AppState>) -> Result<Json<DayResponse>, ApiError> {
    let date = today();
    let stat = state
        .read(move |db, _| summary::last_days(db, date, 1))
        .await?;
    let response = stat.first().map_or_else(
        || DayResponse {
            date,
            total_secs: 0,
            active_secs: 0,
            idle_secs: 0,
            apps_used: 0,
            productivity: 0.0,
        },
        day_response,
    );
    Ok(Json(response))
}

async fn get_week(State(state): State<AppState>) -> Result<Json<WeekResponse>, ApiError> {
    let end = today();
    let days = state
        .read(move |db, _| summary::last_days(db, end, WEEK_DAYS))
        .await?;
    let total_ms: i64 = days.iter().map(|day| day.totals.total_ms).sum();
    let active_ms: i64 = days.iter().map(|day| day.totals.active_ms).sum();
    Ok(Json(WeekResponse {
        start: days.first().map_or(end, |day| day.date),
        end,
        total_secs: secs(total_ms),
        active_secs: secs(active_ms),
        avg_daily_active_secs: secs(active_ms) / i64::from(WEEK_DAYS),
        days: days.iter().map(day_response).collect(),
    }))
}

async fn get_apps(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<AppResponse>>, ApiError> {
    let date = query.period.date();
    let limit = query.limit();
    let apps = state
        .read(move |db, categories| {
            Ok(summary::app_shares(db.top_apps(date, limit)?, categories))
        })
        .await?;
    Ok(Json(apps.into_iter().map(AppResponse::from).collect()))
}

async fn get_hourly(State(state): State<AppState>) -> Result<Json<Vec<HourResponse>>, ApiError> {
    let date = today();
    let stats = state.read(move |db, _| db.hourly_stats(date)).await?;
    let buckets = summary::hourly_buckets(&stats);
    Ok(Json(
        buckets
            .iter()
            .enumerate()
            .map(|(hour, ms)| HourResponse {
                hour,
                active_secs: secs(*ms),
            })
            .collect(),
    ))
}

async fn get_categories(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let date = query.period.date();
    let totals = state
        .read(move |db, categories| {
            Ok(summary::category_shares(db.category_totals(date)?, categories))
        })
        .await?;
    Ok(Json(totals.into_iter().map(CategoryResponse::from).collect()))
}

async fn get_launches(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<LaunchResponse>>, ApiError> {
    let date = query.period.date();
    let counts = state.read(move |db, _| db.launch_counts(date)).await?;
    Ok(Json(
        counts
            .into_iter()
            .map(|count| LaunchResponse {
                name: count.app_name,
                launches: count.launches,
            })
            .collect(),
    ))
}

async fn get_week_comparison(
    State(state): State<AppState>,
) -> Result<Json<Vec<WeekdayResponse>>, ApiError> {
    let averages = state.read(|db, _| db.weekday_averages()).await?;
    Ok(Json(
        averages
            .into_iter()
            .map(|average| WeekdayResponse {
                day: average.weekday.to_string(),
                avg_active_secs: secs(average.avg_active_ms),
                hours: hours(average.avg_active_ms),
                days: average.days,
            })
            .collect(),
    ))
}

async fn get_trend(State(state): State<AppState>) -> Result<Json<Vec<TrendResponse>>, ApiError> {
    let end = today();
    let days = state
        .read(move |db, _| summary::last_days(db, end, WEEK_DAYS))
        .await?;
    Ok(Json(
        days.iter()
            .map(|day| TrendResponse {
                date: day.date,
                productivity: productivity(&day.totals),
                active_hours: hours(day.totals.active_ms),
            })
            .collect(),
    ))
}

async fn post_start(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.tracker.start().await;
    info!(changed, "start requested over HTTP");
    Json(ControlResponse {
        status: "started".to_string(),
        changed,
    })
}

async fn post_stop(State(state): State<AppState>) -> Json<ControlResponse> {
    let changed = state.tracker.stop().await.is_some();
    info!(changed, "stop requested over HTTP");
    Json(ControlResponse {
        status: "stopped".to_string(),
        changed,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;
    use ut_core::{
        AccountingEngine, EngineConfig, PrivacyFilter, PrivacyMode, ScriptedObserver,
        SegmentStart, UsageTotals,
    };
    use ut_db::DailyStat;

    use crate::store::UsageStore;
    use crate::tracker::TrackerSettings;

    fn test_state() -> AppState {
        let store = Arc::new(SqliteStore::new(Database::open_in_memory().unwrap()));
        let engine = AccountingEngine::new(
            EngineConfig::default(),
            CategoryTable::builtin(),
            PrivacyFilter::new(PrivacyMode::Full, ["bank"]),
        );
        let tracker = Arc::new(Tracker::new(
            engine,
            Box::new(ScriptedObserver::new()),
            Arc::clone(&store) as Arc<dyn UsageStore>,
            TrackerSettings::default(),
        ));
        AppState::new(tracker, store, Arc::new(CategoryTable::builtin()))
    }

    /// Records one closed segment started now.
    fn record_segment(state: &AppState, app: &str, category: &str, duration_ms: i64) {
        let started_at = Local::now();
        let session = state.store.create_session(started_at).unwrap();
        let segment = SegmentStart {
            app_name: app.to_string(),
            exe_name: app.to_lowercase(),
            title: String::new(),
            category: category.to_string(),
            started_at,
        };
        let id = state.store.open_segment(session, &segment).unwrap();
        state
            .store
            .close_segment(id, duration_ms, started_at)
            .unwrap();
        state.store.close_session(session, &UsageTotals::default(), started_at).unwrap();
    }

    async fn send(app: Router, method: &str, uri: &str) -> Response {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn get_json<T: DeserializeOwned>(state: &AppState, uri: &str) -> T {
        let response = send(create_router(state.clone()), "GET", uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn status_reports_stopped_tracker() {
        let state = test_state();
        let status: StatusResponse = get_json(&state, "/api/status").await;
        assert!(!status.running);
        assert_eq!(status.session_id, None);
        assert_eq!(status.total_secs, 0);
        assert_eq!(status.current_app, None);
    }

    #[tokio::test]
    async fn start_and_stop_control_the_tracker() {
        let state = test_state();

        let response = send(create_router(state.clone()), "POST", "/api/start").await;
        assert_eq!(response.status(), StatusCode::OK);
        let status: StatusResponse = get_json(&state, "/api/status").await;
        assert!(status.running);
        assert!(status.session_id.is_some());

        let response = send(create_router(state.clone()), "POST", "/api/stop").await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let control: ControlResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(control.status, "stopped");
        assert!(control.changed);

        let response = send(create_router(state.clone()), "POST", "/api/stop").await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let control: ControlResponse = serde_json::from_slice(&body).unwrap();
        assert!(!control.changed);
    }

    #[tokio::test]
    async fn today_reports_productivity() {
        let state = test_state();
        state
            .store
            .upsert_daily(&DailyStat {
                date: today(),
                totals: UsageTotals::from_parts(90_000, 30_000),
                apps_used: 3,
            })
            .unwrap();

        let day: DayResponse = get_json(&state, "/api/stats/today").await;
        assert_eq!(day.date, today());
        assert_eq!(day.total_secs, 120);
        assert_eq!(day.active_secs, 90);
        assert_eq!(day.idle_secs, 30);
        assert_eq!(day.apps_used, 3);
        assert!((day.productivity - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn week_averages_over_seven_days() {
        let state = test_state();
        for (offset, active_ms) in [(0, 70_000), (3, 70_000)] {
            state
                .store
                .upsert_daily(&DailyStat {
                    date: today() - ChronoDuration::days(offset),
                    totals: UsageTotals::from_parts(active_ms, 0),
                    apps_used: 1,
                })
                .unwrap();
        }

        let week: WeekResponse = get_json(&state, "/api/stats/week").await;
        assert_eq!(week.days.len(), 7);
        assert_eq!(week.end, today());
        assert_eq!(week.start, today() - ChronoDuration::days(6));
        assert_eq!(week.active_secs, 140);
        assert_eq!(week.avg_daily_active_secs, 20);

        let trend: Vec<TrendResponse> = get_json(&state, "/api/trend").await;
        assert_eq!(trend.len(), 7);
        assert!((trend[6].productivity - 100.0).abs() < f64::EPSILON);
        assert!(trend[5].productivity.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn apps_are_ranked_with_category_names() {
        let state = test_state();
        record_segment(&state, "Code", "development", 30_000);
        record_segment(&state, "Firefox", "browsers", 10_000);

        let apps: Vec<AppResponse> = get_json(&state, "/api/apps?period=today").await;
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].name, "Code");
        assert_eq!(apps[0].category_name, "Development");
        assert_eq!(apps[0].duration_secs, 30);
        assert!((apps[0].percent - 75.0).abs() < f64::EPSILON);

        let apps: Vec<AppResponse> = get_json(&state, "/api/apps?period=all&limit=1").await;
        assert_eq!(apps.len(), 1);

        let categories: Vec<CategoryResponse> =
            get_json(&state, "/api/categories?period=all").await;
        assert_eq!(categories[0].id, "development");
        assert_eq!(categories[1].name, "Browsers");

        let launches: Vec<LaunchResponse> = get_json(&state, "/api/launches").await;
        assert_eq!(launches.len(), 2);
        assert!(launches.iter().all(|launch| launch.launches == 1));
    }

    #[tokio::test]
    async fn unknown_period_is_rejected() {
        let state = test_state();
        let response = send(create_router(state), "GET", "/api/apps?period=yesterday").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn hourly_has_24_buckets() {
        let state = test_state();
        state.store.add_hourly_active(today(), 14, 7_000).unwrap();

        let hourly: Vec<HourResponse> = get_json(&state, "/api/hourly").await;
        assert_eq!(hourly.len(), 24);
        assert_eq!(hourly[14].active_secs, 7);
        assert_eq!(hourly.iter().map(|hour| hour.active_secs).sum::<i64>(), 7);
    }

    #[tokio::test]
    async fn week_comparison_reports_hours() {
        let state = test_state();
        let monday = Local
            .with_ymd_and_hms(2025, 3, 10, 12, 0, 0)
            .unwrap()
            .date_naive();
        state
            .store
            .upsert_daily(&DailyStat {
                date: monday,
                totals: UsageTotals::from_parts(5_400_000, 0),
                apps_used: 1,
            })
            .unwrap();

        let days: Vec<WeekdayResponse> = get_json(&state, "/api/week-comparison").await;
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].day, "Mon");
        assert_eq!(days[0].avg_active_secs, 5_400);
        assert!((days[0].hours - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn limit_is_clamped() {
        let query = PeriodQuery {
            period: Period::All,
            limit: Some(10_000),
        };
        assert_eq!(query.limit(), MAX_LIMIT);
        assert_eq!(PeriodQuery::default().limit(), DEFAULT_LIMIT);
    }
}
