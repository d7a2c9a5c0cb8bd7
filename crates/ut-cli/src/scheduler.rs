//! Cancellable periodic tasks.
//!
//! Both tracker drivers (the fast poll loop and the slower flush loop) run as
//! a [`PeriodicTask`]. A firing runs to completion; once cancelled the loop
//! never starts another one, even if cancellation arrived mid-firing.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, warn};

/// Upper bound on waiting for a cancelled task to finish its current firing.
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(2);

/// A tokio task that runs an action every `period` until cancelled.
///
/// The first firing happens one period after spawning. Missed firings are
/// delayed rather than bunched up.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawns the task on the current tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        action().await;
                    }
                }
            }
            debug!(task = name, "periodic task stopped");
        });
        debug!(task = name, period_ms = period.as_millis(), "periodic task started");
        Self {
            name,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stops the task and waits for it, at most [`CANCEL_TIMEOUT`].
    ///
    /// Safe to call any number of times. Returns `true` when the task is known
    /// to have finished.
    pub async fn cancel(&self) -> bool {
        self.shutdown.send_replace(true);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return true;
        };
        match timeout(CANCEL_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(task = self.name, error = %err, "periodic task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    task = self.name,
                    timeout_ms = CANCEL_TIMEOUT.as_millis(),
                    "periodic task did not stop in time, aborting"
                );
                handle.abort();
                false
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
