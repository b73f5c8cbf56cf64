// src/main.rs
use std::sync::Arc;

use qrpay::api::{self, AppState};
use qrpay::clock::{Clock, SystemClock};
use qrpay::codec::PayloadCodec;
use qrpay::config::Config;
use qrpay::confirm::PendingPaymentLog;
use qrpay::controller::QrController;
use qrpay::signature::SignatureService;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env()?;
    let signatures = SignatureService::new(cfg.build_signer()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let payments = Arc::new(PendingPaymentLog::new(clock.clone()));

    let controller = QrController::new(
        PayloadCodec::new(cfg.scheme.clone(), cfg.default_currency.clone()),
        signatures,
        clock,
        payments.clone(),
    )
    .with_default_ttl(cfg.default_ttl_secs);

    let state = AppState {
        controller: Arc::new(controller),
        payments,
    };

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(cfg.request_timeout))
        .layer(TraceLayer::new_for_http());

    info!("qrpay listening on {}", cfg.bind);
    let listener = TcpListener::bind(cfg.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
