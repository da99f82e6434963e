use std::time::Duration;

use agendamento::{
    cache::create_redis_pool,
    create_db_pool, create_router,
    events::NotificationDispatcherBuilder,
    handlers::admins::bootstrap_super_admin,
    init_tracing,
    notify::EmailClient,
    scheduling::worker::RecurrenceWorker,
    shutdown_telemetry, AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    init_tracing(&config);

    info!(
        service = "agendamento",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    let issues = config.validate_for_production();
    if !issues.is_empty() {
        for issue in &issues {
            warn!(issue = %issue, "Configuration warning");
        }
    }

    info!(
        database_url = %config.database.url.split('@').next_back().unwrap_or("***"),
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let db_pool = create_db_pool(&config);

    info!("Database connection pool created");

    {
        let pool = db_pool.clone();
        let config = config.clone();
        match tokio::task::spawn_blocking(move || bootstrap_super_admin(&pool, &config)).await {
            Ok(Ok(true)) => info!("Bootstrap admin created"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => error!(error = %e, "Failed to bootstrap head-office admin"),
            Err(e) => error!(error = %e, "Bootstrap task panicked"),
        }
    }

    let redis_pool = create_redis_pool(&config.redis);

    let notifications = &config.notifications;
    let email = EmailClient::new(
        notifications.resend_api_url.clone(),
        notifications.resend_api_key.clone(),
        notifications.from_address.clone(),
    );
    let dispatcher_shutdown = NotificationDispatcherBuilder::new(db_pool.clone())
        .maybe_redis_pool(redis_pool.clone())
        .email_client(email)
        .poll_interval(Duration::from_secs(notifications.poll_interval_secs))
        .stream_name(notifications.redis_stream.clone())
        .retention_days(config.booking.notification_retention_days)
        .admin_panel_url(notifications.admin_panel_url.clone())
        .spawn();

    let state = AppState::new(db_pool.clone(), redis_pool, &config);

    let recurrence_shutdown = RecurrenceWorker::new(
        db_pool,
        state.clock,
        Duration::from_secs(config.booking.recurrence_check_interval_secs),
    )
    .spawn();

    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        http_address = %http_addr,
        docs_url = %format!("http://{}/swagger-ui", http_addr),
        "HTTP server ready"
    );

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    let http_server = async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.recv().await;
        };
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
    };

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    tokio::select! {
        result = http_server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = ctrl_c => {}
    }

    info!("Stopping background workers...");
    let _ = dispatcher_shutdown.send(true);
    let _ = recurrence_shutdown.send(true);
    tokio::time::sleep(Duration::from_secs(2)).await;

    shutdown_telemetry();

    info!("Server shutdown complete");
}
