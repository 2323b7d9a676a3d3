//! Background credential renewal
//!
//! The worker cycles through four states:
//!
//! 1. **Starting**: opens the access gate.
//! 2. **Idle**: sleeps for the sleep interval; shutdown interrupts the sleep.
//! 3. **Sweeping**: closes the gate, waits out the renewal buffer, then renews
//!    every snapshotted entry that has entered its renewal window. The gate
//!    reopens when the sweep completes.
//! 4. **Stopped**: shutdown was requested. A sweep that already started
//!    always finishes first.
//!
//! A sweep that panics kills the worker. The gate stays closed and the error
//! is kept so blocked `get` calls can report a dead worker instead of a busy one.

use crate::credentials::manager::Shared;
use crate::credentials::types::WorkerError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// Lifecycle status of the renewal worker
#[derive(Debug, Clone)]
pub enum WorkerStatus {
    /// `start` has not been called
    NotStarted,
    /// The worker task is alive
    Running,
    /// The worker exited after a shutdown request
    Stopped,
    /// A sweep failed fatally; the access gate was left closed
    Failed(Arc<WorkerError>),
}

impl WorkerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, WorkerStatus::Running)
    }

    pub fn error(&self) -> Option<&Arc<WorkerError>> {
        match self {
            WorkerStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Outcome of a single sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries replaced with a renewed credential
    pub renewed: usize,
    /// Entries dropped after a failed renewal
    pub evicted: usize,
    /// Entries not yet inside their renewal window
    pub skipped: usize,
    /// Entries changed by a caller while their renewal was in flight
    pub superseded: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.renewed + self.evicted + self.skipped + self.superseded
    }
}

/// The background worker task
pub(crate) struct RenewalLoop {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl RenewalLoop {
    pub(crate) fn new(shared: Arc<Shared>, shutdown: CancellationToken) -> Self {
        Self { shared, shutdown }
    }

    pub(crate) async fn run(self) {
        let RenewalLoop { shared, shutdown } = self;

        shared.gate.open();
        tracing::info!(
            sleep_interval_secs = shared.config.sleep_interval_secs,
            renewal_buffer_secs = shared.config.renewal_buffer_secs,
            renewal_window_secs = shared.config.renewal_window_secs,
            "Credential renewal worker started"
        );

        loop {
            if !sleep_unless_cancelled(&shutdown, shared.config.sleep_interval()).await {
                break;
            }

            // A sweep requested through the manager may have killed the worker
            if shared.status.lock().error().is_some() {
                tracing::error!("Credential renewal worker exiting after fatal sweep failure");
                return;
            }

            match run_sweep(&shared).await {
                Ok(report) => tracing::info!(
                    renewed = report.renewed,
                    evicted = report.evicted,
                    skipped = report.skipped,
                    superseded = report.superseded,
                    "Credential sweep completed"
                ),
                Err(_) => return,
            }

            if shutdown.is_cancelled() {
                break;
            }
        }

        *shared.status.lock() = WorkerStatus::Stopped;
        tracing::info!("Credential renewal worker stopped");
    }
}

/// Sleep for `duration`; `false` if shutdown was requested first
async fn sleep_unless_cancelled(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// One full sweep: close the gate, wait the buffer, renew, reopen
///
/// The cycle runs in its own task, so dropping the returned future never
/// strands the gate closed: the sweep still finishes and reopens it. Sweeps
/// are serialized so a manual sweep can never reopen the gate under a
/// scheduled one. On a fatal failure the worker is marked failed and the gate
/// is left closed.
pub(crate) async fn run_sweep(shared: &Arc<Shared>) -> Result<SweepReport, Arc<WorkerError>> {
    match tokio::spawn(sweep_cycle(shared.clone())).await {
        Ok(result) => result,
        Err(join_err) => Err(record_failure(shared, join_err)),
    }
}

async fn sweep_cycle(shared: Arc<Shared>) -> Result<SweepReport, Arc<WorkerError>> {
    let _sweeping = shared.sweep_lock.lock().await;

    let failed = shared.status.lock().error().cloned();
    if let Some(err) = failed {
        return Err(err);
    }

    shared.gate.close();
    tokio::time::sleep(shared.config.renewal_buffer()).await;

    match tokio::spawn(sweep_entries(shared.clone())).await {
        Ok(report) => {
            shared.gate.open();
            Ok(report)
        }
        Err(join_err) => Err(record_failure(&shared, join_err)),
    }
}

/// Mark the worker failed after a sweep task died
fn record_failure(shared: &Shared, join_err: JoinError) -> Arc<WorkerError> {
    let err = Arc::new(if join_err.is_panic() {
        WorkerError::Panicked(panic_message(join_err.into_panic()))
    } else {
        WorkerError::Aborted
    });
    tracing::error!(
        error = %err,
        "Credential renewal worker died; access gate left closed"
    );
    *shared.status.lock() = WorkerStatus::Failed(err.clone());
    err
}

/// Renew every snapshotted entry that is inside its renewal window
async fn sweep_entries(shared: Arc<Shared>) -> SweepReport {
    let window = shared.config.renewal_window();
    let mut report = SweepReport::default();
    let snapshot = shared.map.snapshot();

    tracing::debug!(entries = snapshot.len(), "Starting credential sweep");

    for (owner, entry) in snapshot {
        let seconds_remaining = entry.seconds_remaining(shared.clock.now(), window);
        if seconds_remaining > 0 {
            tracing::debug!(
                owner = %owner,
                seconds_remaining,
                "Credential not due for renewal"
            );
            report.skipped += 1;
            continue;
        }

        match shared.client.renew(entry.token()).await {
            Ok(renewed) => {
                let masked = renewed.masked_token();
                let expires_at = renewed.expires_at();
                if shared.map.replace_if_current(&owner, entry.token(), renewed) {
                    tracing::info!(
                        owner = %owner,
                        token = %masked,
                        expires_at,
                        "Credential renewed"
                    );
                    report.renewed += 1;
                } else {
                    tracing::debug!(
                        owner = %owner,
                        "Credential changed during renewal; keeping the newer value"
                    );
                    report.superseded += 1;
                }
            }
            Err(err) => {
                if shared.map.remove_if_current(&owner, entry.token()) {
                    tracing::warn!(
                        owner = %owner,
                        token = %entry.masked_token(),
                        error = %err,
                        "Credential renewal failed; entry evicted"
                    );
                    report.evicted += 1;
                } else {
                    tracing::debug!(
                        owner = %owner,
                        error = %err,
                        "Credential renewal failed but the entry was already replaced"
                    );
                    report.superseded += 1;
                }
            }
        }
    }

    report
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
