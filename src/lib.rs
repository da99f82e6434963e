//! Agendamento - equipment, room and loan booking for a network of schools.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod pagination;
pub mod scheduling;
pub mod schema;
pub mod telemetry;
pub mod term;

use axum::{
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::jwt::JwtConfig;
use auth::lockout::LockoutManager;
use auth::password::PasswordPolicy;
use cache::{create_redis_pool, CacheServices};
use config::BookingConfig;
use handlers::{
    admins, audit_logs, bookings, catalog, classrooms, dashboard, equipment, health, loans,
    notifications, recurring, rooms, settings, teachers, verification,
};
use middleware::{
    auth::{admin_auth_middleware, auth_middleware, super_admin_middleware, teacher_auth_middleware},
    metrics::metrics_middleware,
    rate_limit::{
        auth_rate_limit_middleware, rate_limit_middleware, RateLimitConfig, RateLimitState,
    },
    request_id::request_id_middleware,
};
use scheduling::time::LocalClock;
use telemetry::MetricsState;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub rate_limit: RateLimitState,
    pub jwt_config: Arc<JwtConfig>,
    pub cache: CacheServices,
    pub lockout: Arc<LockoutManager>,
    pub password_policy: PasswordPolicy,
    pub password_hash_cost: u32,
    pub rotate_refresh_tokens: bool,
    pub metrics: MetricsState,
    pub booking: Arc<BookingConfig>,
    pub clock: LocalClock,
}

impl AppState {
    pub fn new(db_pool: DbPool, redis_pool: Option<deadpool_redis::Pool>, config: &Config) -> Self {
        let rate_limit = if config.security.rate_limiting_enabled {
            RateLimitState::with_config(
                RateLimitConfig::new(config.security.rate_limit_requests_per_minute, 60),
                RateLimitConfig::strict(),
            )
        } else {
            RateLimitState::disabled()
        };

        let jwt_config = JwtConfig::from_env_with_expiry(
            config.jwt.access_token_expiry_secs,
            config.jwt.refresh_token_expiry_secs,
            config.jwt.issuer.clone(),
            config.jwt.audience.clone(),
        );

        let redis_pool = redis_pool.or_else(|| create_redis_pool(&config.redis));
        let cache = CacheServices::new(redis_pool.clone());
        let lockout = LockoutManager::new(
            redis_pool,
            config.security.max_failed_login_attempts,
            config.security.lockout_duration_mins,
        );

        let password_policy = if config.security.require_password_complexity {
            PasswordPolicy::strict(config.security.min_password_length)
        } else {
            PasswordPolicy {
                min_length: config.security.min_password_length,
                ..Default::default()
            }
        };

        let metrics = MetricsState::new(config.telemetry.metrics_enabled);

        Self {
            db_pool,
            rate_limit,
            jwt_config: Arc::new(jwt_config),
            cache,
            lockout: Arc::new(lockout),
            password_policy,
            password_hash_cost: config.security.password_hash_cost,
            rotate_refresh_tokens: config.security.rotate_refresh_tokens,
            metrics,
            booking: Arc::new(config.booking.clone()),
            clock: LocalClock::new(config.booking.utc_offset_minutes),
        }
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let rate_limit_state = state.rate_limit.clone();

    let metrics_state = state.metrics.clone();
    let public_routes = Router::new()
        .route("/health", get(health::health_check_simple))
        .route("/health/status", get(health::health_check))
        .route("/health/ready", get(health::ready_check))
        .route("/health/live", get(health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .route("/units", get(catalog::list_units))
        .route("/verify/{token}", get(verification::verify_booking))
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh_token))
        .route("/auth/logout", post(handlers::auth::logout))
        .route(
            "/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .layer(axum_middleware::from_fn(auth_rate_limit_middleware))
        .with_state(state.clone());

    // Any signed-in principal.
    let session_routes = Router::new()
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/auth/revoke", post(handlers::auth::revoke_token))
        .route("/auth/me", get(handlers::auth::get_current_user))
        .route(
            "/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route("/settings/{unit}", get(settings::get_booking_rules))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let teacher_routes = Router::new()
        .route("/equipment/availability", get(equipment::availability))
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/mine", get(bookings::my_bookings))
        .route("/bookings/{id}/cancel", post(bookings::cancel_booking))
        .route("/recurring/mine", get(recurring::my_recurring))
        .route("/rooms", get(rooms::list_rooms))
        .route("/rooms/{id}/occupancy", get(rooms::room_occupancy))
        .route("/room-bookings", post(rooms::create_room_booking))
        .route("/room-bookings/mine", get(rooms::my_room_bookings))
        .route(
            "/room-bookings/{id}/cancel",
            post(rooms::cancel_room_booking),
        )
        .layer(axum_middleware::from_fn(teacher_auth_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/dashboard", get(dashboard::dashboard))
        .route(
            "/admin/equipment",
            get(equipment::list_equipment).post(equipment::create_equipment),
        )
        .route(
            "/admin/equipment/{id}",
            put(equipment::update_equipment).delete(equipment::delete_equipment),
        )
        .route("/admin/bookings", get(bookings::list_admin_bookings))
        .route("/admin/bookings/delete", post(bookings::delete_bookings))
        .route("/admin/bookings/{id}/close", post(bookings::close_booking))
        .route("/admin/recurring", get(recurring::list_recurring))
        .route("/admin/recurring/generate", post(recurring::generate_now))
        .route(
            "/admin/recurring/{id}/deactivate",
            post(recurring::deactivate_recurring),
        )
        .route(
            "/admin/rooms",
            get(rooms::admin_list_rooms).post(rooms::create_room),
        )
        .route(
            "/admin/rooms/{id}",
            put(rooms::update_room).delete(rooms::delete_room),
        )
        .route(
            "/admin/rooms/{id}/toggle-availability",
            post(rooms::toggle_room_availability),
        )
        .route("/admin/room-bookings", get(rooms::admin_list_room_bookings))
        .route(
            "/admin/room-bookings/{id}",
            delete(rooms::admin_delete_room_booking),
        )
        .route(
            "/admin/classrooms",
            get(classrooms::list_classrooms).post(classrooms::create_classroom),
        )
        .route(
            "/admin/classrooms/reorder",
            put(classrooms::reorder_classrooms),
        )
        .route(
            "/admin/classrooms/{id}",
            put(classrooms::rename_classroom).delete(classrooms::delete_classroom),
        )
        .route(
            "/admin/loans",
            get(loans::list_loans).post(loans::create_loan),
        )
        .route("/admin/loans/{id}", delete(loans::delete_loan))
        .route("/admin/loans/{id}/return", post(loans::return_loan))
        .route(
            "/admin/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/admin/teachers", get(teachers::list_teachers))
        .route("/admin/teachers/{id}", put(teachers::update_teacher))
        .route(
            "/admin/teachers/{id}/toggle-active",
            post(teachers::toggle_teacher_active),
        )
        .route(
            "/admin/teachers/{id}/remove-unit",
            post(teachers::remove_teacher_unit),
        )
        .route(
            "/admin/notifications",
            get(notifications::list_notifications),
        )
        .route(
            "/admin/notifications/read-all",
            post(notifications::mark_all_read),
        )
        .route(
            "/admin/notifications/{id}",
            delete(notifications::delete_notification),
        )
        .route(
            "/admin/notifications/{id}/read",
            post(notifications::mark_read),
        )
        .layer(axum_middleware::from_fn(admin_auth_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let head_office_routes = Router::new()
        .route(
            "/admin/admins",
            get(admins::list_admins).post(admins::create_admin),
        )
        .route(
            "/admin/admins/{id}/reset-password",
            post(admins::reset_admin_password),
        )
        .route("/admin/audit-logs", get(audit_logs::list_audit_logs))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            super_admin_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let docs_routes = openapi::swagger_router();

    Router::new()
        .merge(docs_routes)
        .merge(public_routes)
        .merge(auth_routes)
        .merge(session_routes)
        .merge(teacher_routes)
        .merge(admin_routes)
        .merge(head_office_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(rate_limit_middleware))
        .layer(axum::Extension(rate_limit_state))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Recurso não encontrado.", "code": "NOT_FOUND"})),
    )
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::{header::HeaderName, HeaderValue, Method};
    use tower_http::cors::AllowOrigin;

    let cors = &config.cors;
    let wildcard = cors.allowed_origins.is_empty() || cors.allowed_origins.iter().any(|o| o == "*");

    // Credentials cannot be combined with `*`; mirror the caller instead.
    let origin = match (wildcard, cors.allow_credentials) {
        (true, true) => AllowOrigin::mirror_request(),
        (true, false) => AllowOrigin::from(Any),
        (false, _) => AllowOrigin::list(
            cors.allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        ),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(
            cors.allowed_methods
                .iter()
                .filter_map(|m| m.parse::<Method>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_headers(
            cors.allowed_headers
                .iter()
                .filter_map(|h| h.parse::<HeaderName>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_credentials(cors.allow_credentials)
        .max_age(Duration::from_secs(cors.max_age_secs))
}

fn build_pool(url: &str, max: u32, min_idle: u32, connect: Duration, idle: Duration) -> DbPool {
    r2d2::Pool::builder()
        .max_size(max)
        .min_idle(Some(min_idle))
        .connection_timeout(connect)
        .idle_timeout(Some(idle))
        .build(ConnectionManager::<PgConnection>::new(url))
        .expect("Failed to create database pool")
}

pub fn create_db_pool(config: &config::Config) -> DbPool {
    let db = &config.database;
    build_pool(
        &db.url,
        db.max_connections,
        db.min_connections,
        Duration::from_secs(db.connection_timeout_secs),
        Duration::from_secs(db.idle_timeout_secs),
    )
}

/// Small pool for integration tests and one-off tools.
pub fn create_db_pool_with_url(database_url: &str) -> DbPool {
    build_pool(
        database_url,
        10,
        2,
        Duration::from_secs(30),
        Duration::from_secs(600),
    )
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn cors_accepts_wildcard_with_credentials() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec!["*".to_string()];
        config.cors.allow_credentials = true;
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn cors_accepts_portal_origins() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec![
            "http://localhost:5173".to_string(),
            "https://agendamentos.objetivoportal.com.br".to_string(),
        ];
        let _ = build_cors_layer(&config);
    }
}
