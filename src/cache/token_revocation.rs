//! Access token revocation list.
//!
//! Single tokens are revoked by their SHA-256 hash; "logout everywhere"
//! stores a per-principal cutoff and rejects tokens issued before it.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

const REVOKED_TOKEN_PREFIX: &str = "agendamento:revoked:token:";
const REVOKED_PRINCIPAL_PREFIX: &str = "agendamento:revoked:principal:";

#[derive(Debug, Clone, Error)]
pub enum RevocationError {
    #[error("Redis not configured")]
    NoRedis,
    #[error("Redis connection failed")]
    ConnectionFailed,
    #[error("Redis operation failed")]
    OperationFailed,
}

#[derive(Clone)]
pub struct TokenRevocationList {
    pool: Option<Pool>,
}

impl TokenRevocationList {
    pub fn new(pool: Option<Pool>) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, RevocationError> {
        let pool = self.pool.as_ref().ok_or(RevocationError::NoRedis)?;
        pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            RevocationError::ConnectionFailed
        })
    }

    pub async fn revoke_token(&self, token_hash: &str, ttl_secs: u64) -> Result<(), RevocationError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(format!("{REVOKED_TOKEN_PREFIX}{token_hash}"), "1", ttl_secs)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to revoke token");
                RevocationError::OperationFailed
            })?;

        debug!(ttl_secs, "Token revoked");
        Ok(())
    }

    pub async fn is_token_revoked(&self, token_hash: &str) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };
        conn.exists::<_, bool>(format!("{REVOKED_TOKEN_PREFIX}{token_hash}"))
            .await
            .unwrap_or(false)
    }

    pub async fn revoke_all_for_principal(
        &self,
        principal_id: Uuid,
        ttl_secs: u64,
    ) -> Result<(), RevocationError> {
        let mut conn = self.connection().await?;
        let revoked_at = chrono::Utc::now().timestamp();

        conn.set_ex::<_, _, ()>(
            format!("{REVOKED_PRINCIPAL_PREFIX}{principal_id}"),
            revoked_at,
            ttl_secs,
        )
        .await
        .map_err(|e| {
            error!(error = %e, principal_id = %principal_id, "Failed to revoke principal tokens");
            RevocationError::OperationFailed
        })?;

        debug!(principal_id = %principal_id, "All tokens revoked");
        Ok(())
    }

    pub async fn is_principal_token_revoked(&self, principal_id: Uuid, token_iat: i64) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };
        let revoked_at: Option<i64> = conn
            .get(format!("{REVOKED_PRINCIPAL_PREFIX}{principal_id}"))
            .await
            .ok()
            .flatten();

        revoked_at.is_some_and(|cutoff| token_iat < cutoff)
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }
}
