//! Core domain logic for the usage tracker.
//!
//! This crate contains the OS-independent pieces:
//! - Engine: turning observation ticks into active/idle totals and segments
//! - Classification: mapping applications to categories by keyword
//! - Privacy: filtering window titles before they are stored
//! - Observer: the seam through which platforms report the foreground window

pub mod classify;
mod engine;
pub mod observer;
pub mod privacy;
pub mod types;

pub use classify::{Category, CategoryTable, OTHER_CATEGORY};
pub use engine::{
    AccountingEngine, DEFAULT_IDLE_THRESHOLD, DayBaseline, DaySnapshot, EngineConfig,
    EngineEvent, SegmentStart, Snapshot,
};
pub use observer::{ObserveError, Observation, Observer, ScriptedObserver};
pub use privacy::PrivacyFilter;
pub use types::{PrivacyMode, UsageTotals, ValidationError, WindowHandle};
