//! Background retention sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use smsfeed_store::{MessageStore, StoreError};

/// Lifecycle of the sweeper task. `Cancelled` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweeperState {
    Idle,
    Sweeping,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("retention sweep failed: {0}")]
    Store(#[from] StoreError),

    #[error("sweeper task failed: {0}")]
    Task(String),
}

/// Deletes messages older than `ttl` every `interval`.
pub struct RetentionSweeper {
    store: Arc<dyn MessageStore>,
    ttl: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn MessageStore>, ttl: Duration, interval: Duration) -> Self {
        Self {
            store,
            ttl,
            interval,
        }
    }

    /// Oldest `received_at` that survives a sweep at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// One sweep. Returns the number of messages deleted.
    pub async fn run_once(&self) -> Result<usize, SweepError> {
        let cutoff = self.cutoff(Utc::now());
        let deleted = self.store.delete_older_than(cutoff).await?;
        Ok(deleted)
    }

    /// Start the sweep loop on the runtime. Cancelling `cancel` (or calling
    /// [`SweeperHandle::shutdown`]) stops it after any in-flight sweep.
    pub fn spawn(self, cancel: CancellationToken) -> SweeperHandle {
        let (state_tx, state_rx) = watch::channel(SweeperState::Idle);
        let task_cancel = cancel.clone();
        let join = tokio::spawn(self.run(task_cancel, state_tx));
        SweeperHandle {
            cancel,
            state: state_rx,
            join,
        }
    }

    async fn run(self, cancel: CancellationToken, state: watch::Sender<SweeperState>) {
        info!(
            ttl_secs = self.ttl.as_secs(),
            interval_secs = self.interval.as_secs_f64(),
            "retention sweeper started"
        );

        while !cancel.is_cancelled() {
            let _ = state.send_replace(SweeperState::Sweeping);
            match self.run_once().await {
                Ok(0) => debug!("retention sweep found nothing to delete"),
                Ok(deleted) => info!(deleted, "retention sweep removed expired messages"),
                Err(e) => warn!(error = %e, "retention sweep failed, retrying next cycle"),
            }
            let _ = state.send_replace(SweeperState::Idle);

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        let _ = state.send_replace(SweeperState::Cancelled);
        info!("retention sweeper stopped");
    }
}

/// Owner's side of a running sweeper: request stop, observe state, await exit.
pub struct SweeperHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SweeperState>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SweeperState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SweeperState> {
        self.state.clone()
    }

    /// Cancel and wait for the loop to exit.
    pub async fn shutdown(self) -> Result<(), SweepError> {
        self.cancel.cancel();
        self.join.await.map_err(|e| SweepError::Task(e.to_string()))
    }

    /// Hand the task to an external shutdown coordinator.
    pub fn into_join_handle(self) -> JoinHandle<()> {
        self.join
    }
}
