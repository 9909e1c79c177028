//! Timer-driven poll loop.
//!
//! The driver ticks a [`Session`] on a fixed interval until shut down.
//! Ticks that fall due while a round-trip is still running are skipped, and
//! shutdown only takes effect between ticks, so a round-trip is never
//! abandoned halfway.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::session::{Session, TickOutcome};

/// Sending half of a shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask every driver holding the paired [`Shutdown`] to stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half of a shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested or every handle is gone.
    async fn recv(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Create a connected shutdown pair.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx: Arc::new(tx) }, Shutdown { rx })
}

/// Counters for one driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub ticks: u64,
    /// Ticks that found nothing to do.
    pub skipped: u64,
    /// Ticks that failed recoverably.
    pub failures: u64,
}

/// Poll loop configuration and entry point.
#[derive(Debug, Clone)]
pub struct PollDriver {
    poll_interval: Duration,
}

impl PollDriver {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Tick `session` until `shutdown` fires.
    ///
    /// Recoverable errors are logged and the loop carries on; the session
    /// itself schedules whatever resend they require. A fatal error stops
    /// the loop and is returned.
    pub async fn run<S: Session>(&self, session: &mut S, mut shutdown: Shutdown) -> Result<DriverReport> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut report = DriverReport::default();

        info!(interval = ?self.poll_interval, "poll driver started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            report.ticks += 1;
            match session.tick().await {
                Ok(TickOutcome::Skipped) => report.skipped += 1,
                Ok(outcome) => debug!(?outcome, "tick done"),
                Err(err) if err.is_fatal() => {
                    warn!(error = %err, "session failed, stopping driver");
                    return Err(err);
                }
                Err(err) => {
                    warn!(error = %err, "tick failed");
                    report.failures += 1;
                }
            }
        }
        info!(ticks = report.ticks, failures = report.failures, "poll driver stopped");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use async_trait::async_trait;
    use mirrordom_sync::SyncError;

    struct Scripted {
        results: Vec<Result<TickOutcome>>,
        shutdown_after: usize,
        handle: ShutdownHandle,
        ticks: usize,
    }

    #[async_trait]
    impl Session for Scripted {
        async fn tick(&mut self) -> Result<TickOutcome> {
            self.ticks += 1;
            if self.ticks >= self.shutdown_after {
                self.handle.shutdown();
            }
            if self.results.is_empty() {
                Ok(TickOutcome::Skipped)
            } else {
                self.results.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn test_runs_until_shutdown() {
        let (handle, shutdown) = shutdown_channel();
        let mut session = Scripted {
            results: vec![Err(SyncError::Transport("down".into()).into())],
            shutdown_after: 3,
            handle,
            ticks: 0,
        };
        let report = PollDriver::new(Duration::from_millis(1))
            .run(&mut session, shutdown)
            .await
            .unwrap();
        assert_eq!(report.ticks, 3);
        assert_eq!(report.failures, 1);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn test_fatal_error_stops() {
        let (handle, shutdown) = shutdown_channel();
        let mut session = Scripted {
            results: vec![Err(SyncError::Invariant("broken".into()).into())],
            shutdown_after: 100,
            handle,
            ticks: 0,
        };
        let err = PollDriver::new(Duration::from_millis(1))
            .run(&mut session, shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Sync(SyncError::Invariant(_))));
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let (handle, shutdown) = shutdown_channel();
        handle.shutdown();
        assert!(shutdown.is_shutdown());
        let mut session = Scripted {
            results: vec![],
            shutdown_after: 1,
            handle,
            ticks: 0,
        };
        let report = PollDriver::new(Duration::from_millis(1))
            .run(&mut session, shutdown)
            .await
            .unwrap();
        assert_eq!(report.ticks, 0);
    }
}
