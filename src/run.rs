use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tower_http::cors;
use x402_charge_axum::X402Charge;

use crate::config::Config;
use crate::routes;
use crate::util::{SigDown, Telemetry};

/// Starts the demo server.
///
/// - Loads `.env` variables.
/// - Initializes tracing, with OTLP export when configured.
/// - Builds one charge layer per configured route.
/// - Serves until SIGTERM or SIGINT, then drains in-flight requests.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;
    let payment_service = config.payment_service();
    if payment_service.api_key().is_empty() {
        tracing::warn!("PAYMENT_SERVICE_API_KEY is empty, verify calls will likely be refused");
    }

    let x402 = X402Charge::try_new(payment_service.url(), payment_service.api_key())?
        .with_timeout(payment_service.timeout())
        .with_network(config.network())
        .with_rate_limit(config.verifications_per_minute())
        .with_replay_capacity(config.replay_capacity());
    tracing::info!(
        payment_service = %x402.payment_service_url(),
        routes = config.routes().len(),
        "Payment gate configured"
    );

    let http_endpoints = routes::router(&x402, config.routes())
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;
    sig_down.recv().await;

    Ok(())
}
