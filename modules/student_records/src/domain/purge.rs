//! Background task that hard-deletes soft-deleted records past retention.
//!
//! The scheduler owns one tokio task. It runs a purge cycle right after
//! `start()` and then once per `interval` until `stop()` cancels it.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::contract::model::PurgeReport;
use crate::domain::error::DomainError;
use crate::domain::service::LifecycleEngine;

/// Scheduler states. There is no paused state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerStatus {
    Stopped,
    Running,
    Stopping,
}

impl SchedulerStatus {
    #[inline]
    const fn as_u8(self) -> u8 {
        match self {
            SchedulerStatus::Stopped => 0,
            SchedulerStatus::Running => 1,
            SchedulerStatus::Stopping => 2,
        }
    }

    #[inline]
    const fn from_u8(x: u8) -> Self {
        match x {
            1 => SchedulerStatus::Running,
            2 => SchedulerStatus::Stopping,
            _ => SchedulerStatus::Stopped,
        }
    }
}

/// How a `stop()` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The scheduler was not running.
    NotRunning,
    Cancelled,
    /// The task did not finish in time and was aborted.
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("purge scheduler already started")]
    AlreadyStarted,
}

pub struct RetentionPurgeScheduler {
    engine: LifecycleEngine,
    interval: Duration,
    status: Arc<AtomicU8>,
    cycles: Arc<AtomicU64>,
    last_report: Arc<Mutex<Option<PurgeReport>>>,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionPurgeScheduler {
    pub fn new(engine: LifecycleEngine, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            status: Arc::new(AtomicU8::new(SchedulerStatus::Stopped.as_u8())),
            cycles: Arc::new(AtomicU64::new(0)),
            last_report: Arc::new(Mutex::new(None)),
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    #[inline]
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status() == SchedulerStatus::Running
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of cycles the background task has completed since construction.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Report of the most recent successful background cycle.
    pub fn last_report(&self) -> Option<PurgeReport> {
        self.last_report.lock().clone()
    }

    /// Spawn the background task. The first cycle runs immediately.
    #[instrument(name = "student_records.purge.start", skip(self), fields(interval = ?self.interval))]
    pub fn start(&self) -> Result<(), SchedulerError> {
        self.status
            .compare_exchange(
                SchedulerStatus::Stopped.as_u8(),
                SchedulerStatus::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| SchedulerError::AlreadyStarted)?;

        let token = CancellationToken::new();
        {
            *self.cancel.lock() = Some(token.clone());
        }

        let engine = self.engine.clone();
        let period = self.interval;
        let status = self.status.clone();
        let cycles = self.cycles.clone();
        let last_report = self.last_report.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match run_cycle(&engine).await {
                            Ok(report) => {
                                *last_report.lock() = Some(report);
                            }
                            Err(e) => error!(error = %e, "purge cycle failed"),
                        }
                        cycles.fetch_add(1, Ordering::AcqRel);
                    }
                }
            }
            status.store(SchedulerStatus::Stopped.as_u8(), Ordering::Release);
            debug!("purge scheduler task exited");
        });

        {
            *self.handle.lock() = Some(handle);
        }
        info!("purge scheduler started");
        Ok(())
    }

    /// Cancel the task and wait up to `timeout` for it to exit; abort on timeout.
    #[instrument(name = "student_records.purge.stop", skip(self))]
    pub async fn stop(&self, timeout: Duration) -> StopReason {
        let Some(token) = ({ self.cancel.lock().take() }) else {
            return StopReason::NotRunning;
        };
        self.status
            .store(SchedulerStatus::Stopping.as_u8(), Ordering::Release);
        token.cancel();

        let handle_opt = { self.handle.lock().take() };
        let reason = match handle_opt {
            None => StopReason::Cancelled,
            Some(mut handle) => {
                tokio::select! {
                    res = &mut handle => {
                        if let Err(e) = res {
                            warn!(error = %e, "purge task join error");
                        }
                        StopReason::Cancelled
                    }
                    _ = tokio::time::sleep(timeout) => {
                        warn!("purge scheduler stop timed out; aborting task");
                        handle.abort();
                        StopReason::Timeout
                    }
                }
            }
        };

        self.status
            .store(SchedulerStatus::Stopped.as_u8(), Ordering::Release);
        info!(?reason, "purge scheduler stopped");
        reason
    }

    /// Run one purge cycle on the caller's task.
    pub async fn run_cycle(&self) -> Result<PurgeReport, DomainError> {
        run_cycle(&self.engine).await
    }
}

impl Drop for RetentionPurgeScheduler {
    fn drop(&mut self) {
        if let Some(tok) = self.cancel.get_mut().take() {
            tok.cancel();
        }
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

/// One pass over the records past retention.
///
/// Failing to list candidates fails the cycle. Failures on individual
/// records are counted and logged; the remaining records are still processed.
#[instrument(name = "student_records.purge.cycle", skip(engine))]
pub async fn run_cycle(engine: &LifecycleEngine) -> Result<PurgeReport, DomainError> {
    let cutoff = engine.retention_cutoff(engine.now());
    let candidates = engine.expired_candidates(cutoff).await?;

    let mut report = PurgeReport {
        cutoff,
        candidates: candidates.len(),
        purged: 0,
        protected: 0,
        failed: 0,
    };

    for student in candidates {
        match engine.purge_if_expired(student.id, cutoff).await {
            Ok(true) => report.purged += 1,
            Ok(false) => {}
            Err(DomainError::Protected { .. }) => report.protected += 1,
            // Removed by someone else between listing and purging.
            Err(DomainError::StudentNotFound { .. }) => {}
            Err(e) => {
                warn!(student_id = %student.id, error = %e, "failed to purge student");
                report.failed += 1;
            }
        }
    }

    info!(
        %cutoff,
        candidates = report.candidates,
        purged = report.purged,
        protected = report.protected,
        failed = report.failed,
        "purge cycle finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_u8() {
        for s in [
            SchedulerStatus::Stopped,
            SchedulerStatus::Running,
            SchedulerStatus::Stopping,
        ] {
            assert_eq!(SchedulerStatus::from_u8(s.as_u8()), s);
        }
        assert_eq!(SchedulerStatus::from_u8(42), SchedulerStatus::Stopped);
    }
}
