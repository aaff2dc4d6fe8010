use crate::cli::ServeArgs;
use crate::infra::{build_service, ApiService, AppState};
use crate::routes::with_offer_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use offer_engine::config::AppConfig;
use offer_engine::error::AppError;
use offer_engine::telemetry;
use offer_engine::workflows::offers::{
    ContractGateway, OfferError, OfferId, OfferTransactionService, RecordStore, RequestContext,
    RetrySummary,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let service = build_service(&config.storage, &config.integration)?;
    spawn_maintenance(service.clone(), config.integration.retry_interval);

    let app = with_offer_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "offer transaction engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Outcome of one expiry sweep plus contract-push retry pass.
#[derive(Debug, Default)]
pub(crate) struct MaintenanceReport {
    pub(crate) expired: Vec<OfferId>,
    pub(crate) pushes: RetrySummary,
}

impl MaintenanceReport {
    fn is_idle(&self) -> bool {
        self.expired.is_empty() && self.pushes.attempted == 0
    }
}

pub(crate) async fn run_maintenance<S, G>(
    service: &OfferTransactionService<S, G>,
) -> Result<MaintenanceReport, OfferError>
where
    S: RecordStore + 'static,
    G: ContractGateway + 'static,
{
    let expired = service.expire_overdue(&RequestContext::system()).await?;
    let pushes = service.retry_pending_pushes().await?;
    Ok(MaintenanceReport { expired, pushes })
}

fn spawn_maintenance(service: Arc<ApiService>, every: Duration) {
    if every.is_zero() {
        warn!("CONTRACT_RETRY_INTERVAL_SECS is 0; background sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match run_maintenance(&service).await {
                Ok(report) if report.is_idle() => {}
                Ok(report) => info!(
                    expired = report.expired.len(),
                    attempted = report.pushes.attempted,
                    confirmed = report.pushes.confirmed,
                    failed = report.pushes.failed,
                    "maintenance sweep finished"
                ),
                Err(err) => error!(error = %err, kind = err.kind(), "maintenance sweep failed"),
            }
        }
    });
}
