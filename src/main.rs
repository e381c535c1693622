use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use reserva_backend::clock::{SharedClock, SystemClock};
use reserva_backend::config::AppConfig;
use reserva_backend::database::init_pool_from_config;
use reserva_backend::database::no_show_queue_repository::NoShowQueueRepository;
use reserva_backend::database::payment_repository::PaymentRepository;
use reserva_backend::database::refund_audit_repository::RefundAuditRepository;
use reserva_backend::database::reservation_repository::ReservationRepository;
use reserva_backend::health::{HealthChecker, HealthStatus};
use reserva_backend::logging::init_tracing;
use reserva_backend::payments::gateway::PaymentGateway;
use reserva_backend::payments::providers::tosspay::{TossPayConfig, TossPayGateway};
use reserva_backend::services::notification::{spawn_dispatcher, LoggingNotificationService};
use reserva_backend::services::refund_processor::RefundProcessor;
use reserva_backend::workers::audit_retention::AuditRetentionWorker;
use reserva_backend::workers::no_show_processor::NoShowProcessorWorker;
use reserva_backend::workers::queue_maintenance::QueueMaintenanceWorker;
use reserva_backend::workers::JobStats;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn health_handler(
    State(checker): State<HealthChecker>,
) -> (StatusCode, Json<HealthStatus>) {
    let status = checker.check().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting reservation payment engine"
    );

    let pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!(error = %e, "database pool initialization failed");
        anyhow::anyhow!(e.to_string())
    })?;

    let reservations = Arc::new(ReservationRepository::new(pool.clone()));
    let payments = Arc::new(PaymentRepository::new(pool.clone()));
    let audit = Arc::new(RefundAuditRepository::new(pool.clone()));
    let queue = Arc::new(NoShowQueueRepository::new(pool.clone()));

    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        TossPayGateway::new(TossPayConfig::from_env()?)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );
    let clock: SharedClock = Arc::new(SystemClock);

    let (notifications, dispatcher_handle) =
        spawn_dispatcher(Arc::new(LoggingNotificationService));

    let refund_processor = Arc::new(RefundProcessor::new(
        reservations.clone(),
        payments.clone(),
        audit.clone(),
        gateway.clone(),
        clock.clone(),
        config.refund.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let no_show_stats = JobStats::new();
    let maintenance_stats = JobStats::new();
    let retention_stats = JobStats::new();

    let no_show_worker = NoShowProcessorWorker::new(
        reservations.clone(),
        queue.clone(),
        refund_processor.clone(),
        notifications.clone(),
        clock.clone(),
        config.worker.clone(),
        no_show_stats.clone(),
    );
    let maintenance_worker = QueueMaintenanceWorker::new(
        queue.clone(),
        clock.clone(),
        config.worker.clone(),
        maintenance_stats.clone(),
    );
    let retention_worker = AuditRetentionWorker::new(
        audit.clone(),
        clock.clone(),
        config.worker.clone(),
        retention_stats.clone(),
    );

    let no_show_handle = tokio::spawn(no_show_worker.run(shutdown_rx.clone()));
    let maintenance_handle = tokio::spawn(maintenance_worker.run(shutdown_rx.clone()));
    let retention_handle = tokio::spawn(retention_worker.run(shutdown_rx.clone()));

    let checker = HealthChecker::new(
        pool.clone(),
        vec![
            ("no_show_processor", no_show_stats),
            ("queue_maintenance", maintenance_stats),
            ("audit_retention", retention_stats),
        ],
    );
    let app = Router::new()
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(checker);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(addr = %addr, "health endpoint listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Server stopped; bring the workers down with it.
    let _ = shutdown_tx.send(true);
    let _ = no_show_handle.await;
    let _ = maintenance_handle.await;
    let _ = retention_handle.await;
    drop(notifications);
    let _ = dispatcher_handle.await;

    info!("shutdown complete");
    Ok(())
}
