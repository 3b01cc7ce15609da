//! Process shutdown: one token fans the stop signal out to the listener,
//! every viewer session and the sweeper, then tracked tasks are drained.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How a drain finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    pub completed: usize,
    /// Tasks still running at the deadline. These were aborted.
    pub aborted: usize,
    /// Tracked sessions that had not finished by the deadline.
    pub sessions_left: usize,
}

#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for work spawned outside our control, such as upgraded
    /// WebSocket sessions. Drained by [`Self::graceful_shutdown`].
    pub fn sessions(&self) -> TaskTracker {
        self.sessions.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for `handles` and the
    /// tracked sessions. Handles still running afterwards are aborted.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> DrainOutcome {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = handles.len(), timeout_ms = timeout.as_millis() as u64, "draining tasks");

        let deadline = tokio::time::Instant::now() + timeout;
        let mut outcome = DrainOutcome {
            completed: 0,
            aborted: 0,
            sessions_left: 0,
        };
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => outcome.completed += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "task ended abnormally during shutdown");
                    outcome.completed += 1;
                }
                Err(_) => {
                    handle.abort();
                    outcome.aborted += 1;
                }
            }
        }

        self.sessions.close();
        if tokio::time::timeout_at(deadline, self.sessions.wait()).await.is_err() {
            outcome.sessions_left = self.sessions.len();
        }

        if outcome.aborted > 0 || outcome.sessions_left > 0 {
            warn!(
                aborted = outcome.aborted,
                sessions_left = outcome.sessions_left,
                "shutdown deadline passed with work still running"
            );
        }
        outcome
    }
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
