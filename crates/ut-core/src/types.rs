//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Unknown privacy mode string.
    #[error("invalid privacy mode: {value} (expected full, masked or anonymous)")]
    InvalidPrivacyMode { value: String },

    /// The same category id appears twice in a category table.
    #[error("duplicate category id: {id}")]
    DuplicateCategory { id: String },

    /// A category table tried to define the fallback category.
    #[error("category id {id} is reserved for unmatched applications")]
    ReservedCategory { id: String },
}

/// How window titles are treated before they are stored or displayed.
///
/// Blacklisted titles are always replaced, whatever the mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    /// Titles are kept verbatim.
    #[default]
    Full,
    /// Emails, phone numbers and card numbers are replaced with placeholders.
    Masked,
    /// Titles are replaced with the application name.
    Anonymous,
}

impl PrivacyMode {
    /// String representation used in configuration files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Masked => "masked",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for PrivacyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PrivacyMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "masked" => Ok(Self::Masked),
            "anonymous" => Ok(Self::Anonymous),
            _ => Err(ValidationError::InvalidPrivacyMode {
                value: s.to_string(),
            }),
        }
    }
}

/// Opaque identity of a top-level window.
///
/// Two observations with the same handle belong to the same window even when
/// the title differs (for example a browser switching tabs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(u64);

impl WindowHandle {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Running total/active/idle time in milliseconds.
///
/// `total_ms` always equals `active_ms + idle_ms`; the only mutator is
/// [`UsageTotals::record`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_ms: i64,
    pub active_ms: i64,
    pub idle_ms: i64,
}

impl UsageTotals {
    /// Builds totals from stored active and idle time.
    #[must_use]
    pub const fn from_parts(active_ms: i64, idle_ms: i64) -> Self {
        Self {
            total_ms: active_ms + idle_ms,
            active_ms,
            idle_ms,
        }
    }

    /// Allocates `delta_ms` to idle or active time.
    pub const fn record(&mut self, delta_ms: i64, idle: bool) {
        self.total_ms += delta_ms;
        if idle {
            self.idle_ms += delta_ms;
        } else {
            self.active_ms += delta_ms;
        }
    }

    #[must_use]
    pub const fn total_secs(&self) -> i64 {
        self.total_ms / 1000
    }

    #[must_use]
    pub const fn active_secs(&self) -> i64 {
        self.active_ms / 1000
    }

    #[must_use]
    pub const fn idle_secs(&self) -> i64 {
        self.idle_ms / 1000
    }
}
