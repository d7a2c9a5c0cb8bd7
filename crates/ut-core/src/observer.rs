//! Foreground window and idle observation.
//!
//! The [`Observer`] trait is the only seam between the accounting logic and the
//! operating system. Real implementations live next to the binary; this module
//! provides [`ScriptedObserver`] so the engine can be driven without any OS.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::WindowHandle;

/// One sample of the foreground window plus the input idle duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Stable identity of the foreground window.
    pub handle: WindowHandle,
    /// Display name of the owning application.
    pub app_name: String,
    /// Executable name of the owning process.
    pub exe_name: String,
    /// Raw window title, before privacy filtering.
    pub title: String,
    /// How long keyboard and mouse have been untouched.
    pub idle: Duration,
}

impl Observation {
    pub fn new(
        handle: WindowHandle,
        app_name: impl Into<String>,
        exe_name: impl Into<String>,
        title: impl Into<String>,
        idle: Duration,
    ) -> Self {
        Self {
            handle,
            app_name: app_name.into(),
            exe_name: exe_name.into(),
            title: title.into(),
            idle,
        }
    }
}

/// Errors raised while querying the operating system.
///
/// Callers treat every variant as a skipped observation.
#[derive(Debug, Error)]
pub enum ObserveError {
    /// A helper program could not be started or failed.
    #[error("{program} failed: {message}")]
    Command {
        program: &'static str,
        message: String,
    },
    /// A helper program did not answer in time.
    #[error("{program} timed out after {timeout:?}")]
    Timeout {
        program: &'static str,
        timeout: Duration,
    },
    /// Output could not be parsed.
    #[error("unexpected output from {program}: {output}")]
    Parse {
        program: &'static str,
        output: String,
    },
    /// Reading process information failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of foreground window observations.
///
/// `Ok(None)` means no foreground window could be resolved (desktop focused,
/// locked screen, permission denied). The idle duration is still carried by
/// `Some` observations only, so callers keep the previous idle state on `None`.
pub trait Observer: Send {
    fn poll(&mut self) -> Result<Option<Observation>, ObserveError>;
}

impl<O: Observer + ?Sized> Observer for Box<O> {
    fn poll(&mut self) -> Result<Option<Observation>, ObserveError> {
        (**self).poll()
    }
}

/// Observer that replays a fixed script, then reports no window.
#[derive(Debug, Default)]
pub struct ScriptedObserver {
    script: VecDeque<Result<Option<Observation>, ObserveError>>,
}

impl ScriptedObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an observation.
    #[must_use]
    pub fn then(mut self, observation: Observation) -> Self {
        self.script.push_back(Ok(Some(observation)));
        self
    }

    /// Queues a tick with no resolvable window.
    #[must_use]
    pub fn then_nothing(mut self) -> Self {
        self.script.push_back(Ok(None));
        self
    }

    /// Queues a failing query.
    #[must_use]
    pub fn then_error(mut self, error: ObserveError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Observer for ScriptedObserver {
    fn poll(&mut self) -> Result<Option<Observation>, ObserveError> {
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firefox() -> Observation {
        Observation::new(
            WindowHandle::new(1),
            "Firefox",
            "firefox",
            "Docs",
            Duration::ZERO,
        )
    }

    #[test]
    fn scripted_observer_replays_in_order() {
        let mut observer = ScriptedObserver::new()
            .then(firefox())
            .then_nothing()
            .then_error(ObserveError::Parse {
                program: "xdotool",
                output: "garbage".to_string(),
            });

        assert_eq!(observer.remaining(), 3);
        assert_eq!(observer.poll().unwrap(), Some(firefox()));
        assert_eq!(observer.poll().unwrap(), None);
        assert!(observer.poll().is_err());
        assert_eq!(observer.remaining(), 0);
    }

    #[test]
    fn exhausted_script_reports_no_window() {
        let mut observer = ScriptedObserver::new();
        assert_eq!(observer.poll().unwrap(), None);
        assert_eq!(observer.poll().unwrap(), None);
    }

    #[test]
    fn boxed_observer_delegates() {
        let mut observer: Box<dyn Observer> = Box::new(ScriptedObserver::new().then(firefox()));
        assert_eq!(observer.poll().unwrap(), Some(firefox()));
    }

    #[test]
    fn observe_error_messages() {
        let err = ObserveError::Timeout {
            program: "xprintidle",
            timeout: Duration::from_millis(500),
        };
        assert_eq!(err.to_string(), "xprintidle timed out after 500ms");
    }
}
