//! HTTP routes of the demo server.
//!
//! - `GET /` lists every protected route with its price.
//! - `GET /health` answers `{"status":"ok"}`.
//! - Every configured route is wrapped in its own [`ChargeLayer`](x402_charge_axum::ChargeLayer)
//!   and echoes the [`PaymentRecord`] it was admitted with.

use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{Value, json};
use x402_charge_axum::X402Charge;
use x402_charge_types::proto::{CURRENCY, PROTOCOL, PaymentRecord};
use x402_charge_types::verifier::PaymentVerifier;

use crate::config::RouteConfig;

/// Builds the router: the free catalog and health routes plus one gated route per entry.
pub fn router<V>(x402: &X402Charge<V>, routes: &[RouteConfig]) -> Router
where
    V: PaymentVerifier + Clone + Send + Sync + 'static,
{
    let catalog = catalog(x402, routes);
    let mut router = Router::new()
        .route("/", get(move || async move { Json(catalog) }))
        .route("/health", get(health));

    for route in routes {
        let layer = x402.charge(route.amount, route.recipient.clone());
        let resource = route.path.clone();
        let description = route.description.clone();
        let handler = move |Extension(payment): Extension<PaymentRecord>| {
            let resource = resource.clone();
            let description = description.clone();
            async move {
                Json(json!({
                    "message": "Payment accepted",
                    "resource": resource,
                    "description": description,
                    "payment": payment,
                }))
            }
        };
        router = router.route(&route.path, get(handler).layer(layer));
    }
    router
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn catalog<V>(x402: &X402Charge<V>, routes: &[RouteConfig]) -> Value {
    let endpoints = x402.endpoints();
    let routes: Vec<Value> = routes
        .iter()
        .map(|route| {
            json!({
                "path": route.path,
                "amount": route.amount,
                "currency": CURRENCY,
                "recipient": route.recipient,
                "description": route.description,
            })
        })
        .collect();
    json!({
        "protocol": PROTOCOL,
        "payment_endpoints": {
            "transfer": endpoints.transfer,
            "verify": endpoints.verify,
        },
        "routes": routes,
    })
}
