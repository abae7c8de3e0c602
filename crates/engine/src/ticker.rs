//! Simulated enhancement progress.
//!
//! The remote provider reports nothing between the upload acknowledgement
//! and the completion event, so a [`Ticker`] advances the enhancement
//! percentage by one every `duration / 100` until it reaches the cap.
//! Only the completion event takes the value to 100.

use std::time::Duration;

use enhance_core::estimator::{next_simulated_percent, tick_interval};
use enhance_core::types::{JobId, Percent};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Smallest interval the ticker will schedule.
const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Background task driving simulated progress for one job.
///
/// Stopping is idempotent, and dropping the ticker stops it.
pub struct Ticker {
    job_id: JobId,
    period: Duration,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Start ticking from `from` towards the cap, calling `on_tick` with
    /// each new value. The first tick fires one period after the start.
    pub fn start<F>(job_id: JobId, duration: Duration, from: Percent, on_tick: F) -> Self
    where
        F: Fn(Percent) + Send + 'static,
    {
        let period = tick_interval(duration).max(MIN_TICK_PERIOD);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tracing::debug!(
            %job_id,
            period_ms = period.as_millis() as u64,
            from,
            "Simulated progress started",
        );

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut current = from;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(next) = next_simulated_percent(current) else {
                            break;
                        };
                        current = next;
                        on_tick(current);
                    }
                }
            }
            tracing::debug!(%job_id, last = current, "Simulated progress stopped");
        });

        Self {
            job_id,
            period,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Time between two ticks.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the task has ended (stopped or capped).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop ticking. Safe to call more than once.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.handle.take();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
