//! Background worker that drains the outbox: in-app notifications for the
//! unit's admins, the optional notification email, and the Redis stream.

use deadpool_redis::Pool as RedisPool;
use diesel::prelude::*;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::models::{NewNotification, OutboxEvent, UnitSettings};
use crate::notify::{booking_email_html, BookingEmail, EmailClient};
use crate::scheduling::time::{format_br_date, format_hhmm};
use crate::scheduling::worker::tick_period;
use crate::schema::notifications;
use crate::telemetry::metrics::record_notification;
use crate::DbPool;

use super::outbox::OutboxService;
use super::types::{BookingNotice, EventType};

pub const ADMIN_BOOKINGS_LINK: &str = "/admin/bookings";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub stream_name: String,
    pub retention_days: i64,
    pub cleanup_interval_polls: u32,
    pub admin_panel_url: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            batch_size: 100,
            stream_name: "agendamento:events".to_string(),
            retention_days: 7,
            cleanup_interval_polls: 1800,
            admin_panel_url: "https://objetivoportal.com.br/admin".to_string(),
        }
    }
}

/// What to do about email for one new booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailPlan {
    Skip,
    /// Enabled for the unit but either the address or the API key is missing.
    ConfigMissing,
    Send(String),
}

pub fn email_plan(settings: &UnitSettings, api_key_present: bool) -> EmailPlan {
    if !settings.notification_email_enabled {
        return EmailPlan::Skip;
    }
    match settings
        .notification_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        Some(to) if api_key_present => EmailPlan::Send(to.to_string()),
        _ => EmailPlan::ConfigMissing,
    }
}

/// Reads the booking notice out of a stored outbox payload.
pub fn notice_from_event(event: &OutboxEvent) -> Option<BookingNotice> {
    if !EventType::notifies_admins(&event.event_type) {
        return None;
    }
    match serde_json::from_value(event.payload["data"].clone()) {
        Ok(notice) => Some(notice),
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "Malformed booking notice in outbox");
            None
        }
    }
}

pub struct NotificationDispatcher {
    db_pool: DbPool,
    redis_pool: Option<RedisPool>,
    email: EmailClient,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(
        db_pool: DbPool,
        redis_pool: Option<RedisPool>,
        email: EmailClient,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            db_pool,
            redis_pool,
            email,
            config,
        }
    }

    pub fn spawn(self) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        shutdown_tx
    }

    #[instrument(skip(self, shutdown_rx), name = "notification_dispatcher")]
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            batch_size = self.config.batch_size,
            stream = %self.config.stream_name,
            email_configured = self.email.is_configured(),
            "Notification dispatcher started"
        );

        let mut poll_timer = interval(tick_period(self.config.poll_interval));
        let mut poll_count: u32 = 0;

        loop {
            tokio::select! {
                _ = poll_timer.tick() => {
                    poll_count = poll_count.wrapping_add(1);

                    if let Err(e) = self.poll_and_dispatch().await {
                        error!(error = %e, "Error dispatching outbox events");
                    }

                    if poll_count.is_multiple_of(self.config.cleanup_interval_polls) {
                        if let Err(e) = self.cleanup().await {
                            warn!(error = %e, "Error during outbox cleanup");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Notification dispatcher received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("Draining remaining events before shutdown...");
        for _ in 0..3 {
            match self.poll_and_dispatch().await {
                Ok(0) => break,
                Ok(n) => debug!(count = n, "Drained events"),
                Err(e) => {
                    error!(error = %e, "Error during final drain");
                    break;
                }
            }
        }

        info!("Notification dispatcher stopped");
    }

    /// One pass over the outbox. Returns how many events were consumed.
    #[instrument(skip(self))]
    pub async fn poll_and_dispatch(&self) -> Result<usize, PublishError> {
        let events = {
            let pool = self.db_pool.clone();
            let batch_size = self.config.batch_size;

            tokio::task::spawn_blocking(move || {
                let mut conn = pool
                    .get()
                    .map_err(|e| PublishError::Database(e.to_string()))?;
                OutboxService::fetch_unpublished(&mut conn, batch_size)
                    .map_err(|e| PublishError::Database(e.to_string()))
            })
            .await
            .map_err(|e| PublishError::Task(e.to_string()))??
        };

        if events.is_empty() {
            return Ok(0);
        }

        debug!(count = events.len(), "Fetched unpublished events");

        let count = events.len();
        let pool = self.db_pool.clone();

        // In-app rows and the published flag commit together; email and the
        // Redis stream are best effort after the commit.
        let (pending_emails, events) = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| PublishError::Database(e.to_string()))?;
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                let mut pending = Vec::new();
                for event in &events {
                    let Some(notice) = notice_from_event(event) else {
                        continue;
                    };
                    diesel::insert_into(notifications::table)
                        .values(&NewNotification {
                            message: notice.message(),
                            link: Some(ADMIN_BOOKINGS_LINK.to_string()),
                            recipient_role: "admin".to_string(),
                            unit: Some(notice.unit.clone()),
                        })
                        .execute(conn)?;
                    record_notification("in_app", "delivered");

                    let settings = UnitSettings::load(conn, &notice.unit)?;
                    pending.push((notice, settings));
                }

                let ids: Vec<_> = events.iter().map(|e| e.id).collect();
                OutboxService::mark_published_batch(conn, &ids)?;
                Ok(pending)
            })
            .map(|pending| (pending, events))
            .map_err(|e| PublishError::Database(e.to_string()))
        })
        .await
        .map_err(|e| PublishError::Task(e.to_string()))??;

        if let Some(redis_pool) = &self.redis_pool {
            if let Err(e) = self.publish_to_redis(redis_pool, &events).await {
                warn!(error = %e, count, "Could not stream events to Redis");
                record_notification("redis_stream", "failed");
            }
        }

        for (notice, settings) in pending_emails {
            self.send_email(&notice, &settings).await;
        }

        Ok(count)
    }

    #[instrument(skip(self, notice, settings), fields(unit = %notice.unit))]
    async fn send_email(&self, notice: &BookingNotice, settings: &UnitSettings) {
        match email_plan(settings, self.email.is_configured()) {
            EmailPlan::Skip => debug!("Email notifications disabled for unit"),
            EmailPlan::ConfigMissing => {
                warn!(
                    has_address = settings.notification_email.is_some(),
                    has_api_key = self.email.is_configured(),
                    "Configuration Missing: email enabled but missing email or API key"
                );
                record_notification("email", "config_missing");
            }
            EmailPlan::Send(to) => {
                let date = format_br_date(notice.date);
                let start = format_hhmm(notice.start_time);
                let end = format_hhmm(notice.end_time);
                let email = BookingEmail {
                    unit: &notice.unit,
                    local: &notice.local,
                    date: &date,
                    start: &start,
                    end: &end,
                    observations: notice.observations.as_deref(),
                    admin_panel_url: &self.config.admin_panel_url,
                };

                match self
                    .email
                    .send(&to, &email.subject(), &booking_email_html(&email))
                    .await
                {
                    Ok(()) => record_notification("email", "sent"),
                    Err(e) => {
                        error!(error = %e, "Resend API error");
                        record_notification("email", "failed");
                    }
                }
            }
        }
    }

    #[instrument(skip(self, redis_pool, events), fields(count = events.len()))]
    async fn publish_to_redis(
        &self,
        redis_pool: &RedisPool,
        events: &[OutboxEvent],
    ) -> Result<(), PublishError> {
        use redis::AsyncCommands;

        let mut conn = redis_pool
            .get()
            .await
            .map_err(|e| PublishError::Redis(e.to_string()))?;

        for event in events {
            let event_data = serde_json::json!({
                "id": event.id.to_string(),
                "event_type": event.event_type,
                "aggregate_type": event.aggregate_type,
                "aggregate_id": event.aggregate_id.to_string(),
                "payload": event.payload,
                "created_at": event.created_at.to_string(),
            });

            let _: String = conn
                .xadd(
                    &self.config.stream_name,
                    "*",
                    &[
                        ("event_type", event.event_type.as_str()),
                        ("data", &event_data.to_string()),
                    ],
                )
                .await
                .map_err(|e| PublishError::Redis(e.to_string()))?;

            debug!(event_id = %event.id, event_type = %event.event_type, "Streamed event");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup(&self) -> Result<usize, PublishError> {
        let pool = self.db_pool.clone();
        let retention_days = self.config.retention_days;

        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| PublishError::Database(e.to_string()))?;
            OutboxService::cleanup_old_events(&mut conn, retention_days)
                .map_err(|e| PublishError::Database(e.to_string()))
        })
        .await
        .map_err(|e| PublishError::Task(e.to_string()))?
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Task error: {0}")]
    Task(String),
}

pub struct NotificationDispatcherBuilder {
    db_pool: DbPool,
    redis_pool: Option<RedisPool>,
    email: Option<EmailClient>,
    config: DispatcherConfig,
}

impl NotificationDispatcherBuilder {
    pub fn new(db_pool: DbPool) -> Self {
        Self {
            db_pool,
            redis_pool: None,
            email: None,
            config: DispatcherConfig::default(),
        }
    }

    pub fn maybe_redis_pool(mut self, pool: Option<RedisPool>) -> Self {
        self.redis_pool = pool;
        self
    }

    pub fn email_client(mut self, client: EmailClient) -> Self {
        self.email = Some(client);
        self
    }

    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.config.poll_interval = tick_period(duration);
        self
    }

    pub fn stream_name(mut self, name: impl Into<String>) -> Self {
        self.config.stream_name = name.into();
        self
    }

    pub fn retention_days(mut self, days: i64) -> Self {
        self.config.retention_days = days;
        self
    }

    pub fn admin_panel_url(mut self, url: impl Into<String>) -> Self {
        self.config.admin_panel_url = url.into();
        self
    }

    pub fn build(self) -> NotificationDispatcher {
        let email = self.email.unwrap_or_else(|| {
            EmailClient::new("https://api.resend.com/emails", None, "Agendamentos <onboarding@resend.dev>")
        });
        NotificationDispatcher::new(self.db_pool, self.redis_pool, email, self.config)
    }

    pub fn spawn(self) -> watch::Sender<bool> {
        self.build().spawn()
    }
}
