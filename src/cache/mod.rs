//! Redis-backed shared state: revoked tokens and the events stream.

pub mod token_revocation;

use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RedisConfig;

pub use token_revocation::TokenRevocationList;

pub fn create_redis_pool(config: &RedisConfig) -> Option<Pool> {
    let url = config.url.as_ref()?;
    let timeout = std::time::Duration::from_secs(config.connection_timeout_secs);

    let pool = RedisPoolConfig::from_url(url)
        .builder()
        .ok()
        .and_then(|b| {
            b.max_size(config.pool_size)
                .wait_timeout(Some(timeout))
                .create_timeout(Some(timeout))
                .runtime(Runtime::Tokio1)
                .build()
                .ok()
        });

    // Only the host part is logged; credentials precede the '@'.
    let host = url.split('@').next_back().unwrap_or("***");
    match &pool {
        Some(_) => info!(redis_host = %host, "Redis pool created"),
        None => warn!(redis_host = %host, "Redis pool could not be created"),
    }

    pool
}

#[derive(Clone)]
pub struct CacheServices {
    pub token_revocation: Arc<TokenRevocationList>,
    redis: Option<Pool>,
}

impl CacheServices {
    pub fn new(redis_pool: Option<Pool>) -> Self {
        Self {
            token_revocation: Arc::new(TokenRevocationList::new(redis_pool.clone())),
            redis: redis_pool,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn redis_pool(&self) -> Option<&Pool> {
        self.redis.as_ref()
    }
}
