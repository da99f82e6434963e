//! Periodic month roll-over for weekly bookings.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, instrument};

use crate::DbPool;

use super::recurrence::{generate_due_months, GenerationReport};
use super::time::LocalClock;

pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// `tokio::time::interval` panics on a zero period.
pub fn tick_period(requested: Duration) -> Duration {
    requested.max(MIN_CHECK_INTERVAL)
}

pub struct RecurrenceWorker {
    db_pool: DbPool,
    clock: LocalClock,
    check_interval: Duration,
}

impl RecurrenceWorker {
    pub fn new(db_pool: DbPool, clock: LocalClock, check_interval: Duration) -> Self {
        Self {
            db_pool,
            clock,
            check_interval: tick_period(check_interval),
        }
    }

    pub fn spawn(self) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        shutdown_tx
    }

    #[instrument(skip(self, shutdown_rx), name = "recurrence_worker")]
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            "Recurrence worker started"
        );

        // The first tick fires immediately, which covers a restart on the 1st.
        let mut timer = interval(self.check_interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = run_once(self.db_pool.clone(), self.clock).await {
                        error!(error = %e, "Recurring booking generation failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Recurrence worker stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecurrenceError {
    #[error("Database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Runs one roll-over pass on the blocking pool.
pub async fn run_once(pool: DbPool, clock: LocalClock) -> Result<GenerationReport, RecurrenceError> {
    let today = clock.today();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        Ok(generate_due_months(&mut conn, today)?)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_is_raised() {
        assert_eq!(tick_period(Duration::ZERO), MIN_CHECK_INTERVAL);
        assert_eq!(tick_period(Duration::from_secs(3600)), Duration::from_secs(3600));
    }

    #[test]
    fn test_recurrence_error_display() {
        let err = RecurrenceError::from(diesel::result::Error::NotFound);
        assert!(err.to_string().starts_with("Database error"));
    }
}
