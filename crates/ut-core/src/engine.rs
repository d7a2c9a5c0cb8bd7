//! Usage accounting state machine.
//!
//! [`AccountingEngine`] turns a stream of observation ticks into running
//! totals and application segments. It performs no I/O: every tick returns
//! the [`EngineEvent`]s it produced and the owner decides how to persist them,
//! which keeps storage latency out of whatever lock guards the engine.
//!
//! # Accounting rules
//!
//! 1. The time since the previous tick (`delta`) is allocated to idle or
//!    active time. The first tick after [`AccountingEngine::start`] has a
//!    zero delta.
//! 2. The user is idle when the observed idle duration is at least the
//!    threshold. Ticks without an observation keep the previous idle state.
//! 3. A segment switch happens only when the window handle changes. Title
//!    changes within the same window (browser tabs) extend the open segment.
//! 4. Totals are kept per session and per local calendar day. Crossing
//!    midnight emits [`EngineEvent::DayRolled`] with the finished day.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::classify::CategoryTable;
use crate::observer::Observation;
use crate::privacy::PrivacyFilter;
use crate::types::{UsageTotals, WindowHandle};

/// Default idle threshold (3 minutes).
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(180);

/// Configuration for the accounting engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Minimum input idle time before the user counts as idle.
    pub idle_threshold: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
        }
    }
}

/// A freshly opened application segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentStart {
    pub app_name: String,
    pub exe_name: String,
    /// Privacy-filtered window title.
    pub title: String,
    pub category: String,
    pub started_at: DateTime<Local>,
}

/// Totals for one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySnapshot {
    pub day: NaiveDate,
    pub totals: UsageTotals,
    /// Number of distinct applications that held the foreground that day.
    pub distinct_apps: usize,
}

/// Immutable copy of the engine's running state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Local>,
    /// Totals since the session started.
    pub session: UsageTotals,
    /// Totals for the current day, including any stored baseline.
    pub day: DaySnapshot,
    pub current_app: Option<String>,
    pub is_idle: bool,
}

/// Previously stored totals for a day, used to continue counting after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayBaseline {
    pub day: NaiveDate,
    pub totals: UsageTotals,
    pub apps: Vec<String>,
}

/// Notifications produced by the engine, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The user became idle or active.
    IdleChanged { idle: bool, at: DateTime<Local> },
    /// The open segment ended.
    SegmentClosed {
        app_name: String,
        duration_ms: i64,
        at: DateTime<Local>,
    },
    /// A new segment started.
    SegmentOpened(SegmentStart),
    /// The open segment's running duration.
    SegmentProgress {
        app_name: String,
        duration_ms: i64,
        at: DateTime<Local>,
    },
    /// `delta_ms` was allocated to idle or active time at `at`.
    Tick {
        delta_ms: i64,
        idle: bool,
        at: DateTime<Local>,
    },
    /// A local day finished; carries its final totals.
    DayRolled(DaySnapshot),
}

#[derive(Debug, Clone)]
struct OpenSegment {
    handle: WindowHandle,
    app_name: String,
    started_at: DateTime<Local>,
}

impl OpenSegment {
    fn duration_ms(&self, now: DateTime<Local>) -> i64 {
        (now - self.started_at).num_milliseconds().max(0)
    }
}

#[derive(Debug, Clone)]
struct DayState {
    day: NaiveDate,
    totals: UsageTotals,
    apps: HashSet<String>,
}

impl DayState {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            day,
            totals: UsageTotals::default(),
            apps: HashSet::new(),
        }
    }

    fn snapshot(&self) -> DaySnapshot {
        DaySnapshot {
            day: self.day,
            totals: self.totals,
            distinct_apps: self.apps.len(),
        }
    }
}

/// The accounting state machine. See the [module documentation](self).
#[derive(Debug)]
pub struct AccountingEngine {
    config: EngineConfig,
    categories: CategoryTable,
    privacy: PrivacyFilter,
    running: bool,
    last_poll: Option<DateTime<Local>>,
    is_idle: bool,
    current: Option<OpenSegment>,
    session: UsageTotals,
    day: Option<DayState>,
}

impl AccountingEngine {
    pub fn new(config: EngineConfig, categories: CategoryTable, privacy: PrivacyFilter) -> Self {
        Self {
            config,
            categories,
            privacy,
            running: false,
            last_poll: None,
            is_idle: false,
            current: None,
            session: UsageTotals::default(),
            day: None,
        }
    }

    pub const fn is_running(&self) -> bool {
        self.running
    }

    pub const fn is_idle(&self) -> bool {
        self.is_idle
    }

    pub fn current_app(&self) -> Option<&str> {
        self.current.as_ref().map(|segment| segment.app_name.as_str())
    }

    pub const fn session_totals(&self) -> UsageTotals {
        self.session
    }

    /// Begins a fresh session.
    ///
    /// A baseline for the same local day seeds the day totals. Returns `false`
    /// (and changes nothing) when already running.
    pub fn start(&mut self, now: DateTime<Local>, baseline: Option<DayBaseline>) -> bool {
        if self.running {
            return false;
        }
        let today = now.date_naive();
        let day = match baseline {
            Some(baseline) if baseline.day == today => DayState {
                day: today,
                totals: baseline.totals,
                apps: baseline.apps.into_iter().collect(),
            },
            _ => DayState::fresh(today),
        };
        self.running = true;
        self.last_poll = None;
        self.is_idle = false;
        self.current = None;
        self.session = UsageTotals::default();
        self.day = Some(day);
        true
    }

    /// Processes one tick. `observation` is `None` when no window was resolved.
    pub fn tick(
        &mut self,
        observation: Option<&Observation>,
        now: DateTime<Local>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }

        let idle_now =
            observation.map_or(self.is_idle, |obs| obs.idle >= self.config.idle_threshold);
        let delta_ms = self.advance(now, idle_now, &mut events);

        if idle_now != self.is_idle {
            debug!(idle = idle_now, "idle state changed");
            self.is_idle = idle_now;
            events.push(EngineEvent::IdleChanged {
                idle: idle_now,
                at: now,
            });
        }

        if let Some(obs) = observation {
            let switched = self
                .current
                .as_ref()
                .is_none_or(|segment| segment.handle != obs.handle);
            if switched {
                self.close_segment(now, &mut events);
                self.open_segment(obs, now, &mut events);
            }
        }

        if let Some(segment) = &self.current {
            events.push(EngineEvent::SegmentProgress {
                app_name: segment.app_name.clone(),
                duration_ms: segment.duration_ms(now),
                at: now,
            });
        }

        events.push(EngineEvent::Tick {
            delta_ms,
            idle: idle_now,
            at: now,
        });
        events
    }

    /// Copies the running totals.
    pub fn snapshot(&self, now: DateTime<Local>) -> Snapshot {
        let day = self.day.as_ref().map_or_else(
            || DayState::fresh(now.date_naive()).snapshot(),
            DayState::snapshot,
        );
        Snapshot {
            taken_at: now,
            session: self.session,
            day,
            current_app: self.current_app().map(str::to_string),
            is_idle: self.is_idle,
        }
    }

    /// Ends the session.
    ///
    /// Accounts the time since the last tick, closes the open segment and
    /// returns the resulting events with the final snapshot. All state is then
    /// cleared. Returns `None` when not running.
    pub fn stop(&mut self, now: DateTime<Local>) -> Option<(Vec<EngineEvent>, Snapshot)> {
        if !self.running {
            return None;
        }
        let mut events = Vec::new();
        let idle = self.is_idle;
        let delta_ms = self.advance(now, idle, &mut events);
        events.push(EngineEvent::Tick {
            delta_ms,
            idle,
            at: now,
        });
        self.close_segment(now, &mut events);

        let snapshot = self.snapshot(now);
        self.running = false;
        self.last_poll = None;
        self.is_idle = false;
        self.current = None;
        self.session = UsageTotals::default();
        self.day = None;
        Some((events, snapshot))
    }

    /// Moves the poll clock to `now`, rolling the day over if needed, and
    /// allocates the elapsed time. Returns the delta in milliseconds.
    fn advance(&mut self, now: DateTime<Local>, idle: bool, events: &mut Vec<EngineEvent>) -> i64 {
        // A clock that went backwards contributes nothing.
        let delta_ms = self
            .last_poll
            .map_or(0, |last| (now - last).num_milliseconds().max(0));
        self.last_poll = Some(now);

        let today = now.date_naive();
        let day = self.day.get_or_insert_with(|| DayState::fresh(today));
        if day.day != today {
            events.push(EngineEvent::DayRolled(day.snapshot()));
            *day = DayState::fresh(today);
            if let Some(segment) = &self.current {
                day.apps.insert(segment.app_name.clone());
            }
        }

        self.session.record(delta_ms, idle);
        day.totals.record(delta_ms, idle);
        delta_ms
    }

    fn close_segment(&mut self, now: DateTime<Local>, events: &mut Vec<EngineEvent>) {
        if let Some(segment) = self.current.take() {
            events.push(EngineEvent::SegmentClosed {
                duration_ms: segment.duration_ms(now),
                app_name: segment.app_name,
                at: now,
            });
        }
    }

    fn open_segment(
        &mut self,
        obs: &Observation,
        now: DateTime<Local>,
        events: &mut Vec<EngineEvent>,
    ) {
        let category = self
            .categories
            .categorize(&obs.app_name, &obs.exe_name, &obs.title)
            .to_string();
        let title = self.privacy.process_title(&obs.title, &obs.app_name);
        debug!(
            app = %obs.app_name,
            handle = %obs.handle,
            %category,
            "foreground application changed"
        );

        if let Some(day) = self.day.as_mut() {
            day.apps.insert(obs.app_name.clone());
        }
        self.current = Some(OpenSegment {
            handle: obs.handle,
            app_name: obs.app_name.clone(),
            started_at: now,
        });
        events.push(EngineEvent::SegmentOpened(SegmentStart {
            app_name: obs.app_name.clone(),
            exe_name: obs.exe_name.clone(),
            title,
            category,
            started_at: now,
        }));
    }
}
