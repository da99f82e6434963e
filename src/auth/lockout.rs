//! Login lockout backed by Redis.
//!
//! Failed attempts are counted per login identifier (email, TOTVS number or
//! admin username). Without Redis the manager is a no-op.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{debug, warn};

const FAILED_ATTEMPTS_PREFIX: &str = "agendamento:lockout:attempts:";
const LOCKED_PREFIX: &str = "agendamento:lockout:locked:";

#[derive(Clone)]
pub struct LockoutManager {
    pool: Option<Pool>,
    max_attempts: u32,
    lockout_duration_secs: u64,
}

#[derive(Debug, Clone, Error)]
pub enum LockoutError {
    #[error("Redis not configured")]
    NoRedis,
    #[error("Redis connection failed")]
    ConnectionFailed,
    #[error("Redis operation failed")]
    OperationFailed,
}

impl LockoutManager {
    pub fn new(pool: Option<Pool>, max_attempts: u32, lockout_duration_mins: u32) -> Self {
        Self {
            pool,
            max_attempts,
            lockout_duration_secs: lockout_duration_mins as u64 * 60,
        }
    }

    fn attempts_key(identifier: &str) -> String {
        format!("{}{}", FAILED_ATTEMPTS_PREFIX, identifier.trim().to_lowercase())
    }

    fn locked_key(identifier: &str) -> String {
        format!("{}{}", LOCKED_PREFIX, identifier.trim().to_lowercase())
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, LockoutError> {
        let pool = self.pool.as_ref().ok_or(LockoutError::NoRedis)?;
        pool.get().await.map_err(|_| LockoutError::ConnectionFailed)
    }

    /// Seconds left on an active lock, if any.
    pub async fn lockout_remaining(&self, identifier: &str) -> Option<u64> {
        let mut conn = self.connection().await.ok()?;
        let ttl: i64 = conn.ttl(Self::locked_key(identifier)).await.ok()?;
        (ttl > 0).then_some(ttl as u64)
    }

    pub async fn is_locked(&self, identifier: &str) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };
        conn.exists::<_, bool>(Self::locked_key(identifier))
            .await
            .unwrap_or(false)
    }

    /// Returns `true` when this failure locked the identifier.
    pub async fn record_failed_attempt(&self, identifier: &str) -> Result<bool, LockoutError> {
        let mut conn = self.connection().await?;
        let attempts_key = Self::attempts_key(identifier);

        let attempts: u32 = conn
            .incr(&attempts_key, 1)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        if attempts == 1 {
            let _ = conn
                .expire::<_, ()>(&attempts_key, self.lockout_duration_secs as i64)
                .await;
        }

        debug!(identifier = %identifier, attempts, "Recorded failed login attempt");

        if attempts < self.max_attempts {
            return Ok(false);
        }

        let _: () = conn
            .set_ex(Self::locked_key(identifier), "1", self.lockout_duration_secs)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;
        let _: () = conn
            .del(&attempts_key)
            .await
            .map_err(|_| LockoutError::OperationFailed)?;

        warn!(
            identifier = %identifier,
            lockout_duration_secs = self.lockout_duration_secs,
            "Login locked after repeated failures"
        );
        Ok(true)
    }

    pub async fn clear_failed_attempts(&self, identifier: &str) -> Result<(), LockoutError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(Self::attempts_key(identifier))
            .await
            .map_err(|_| LockoutError::OperationFailed)?;
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }
}
