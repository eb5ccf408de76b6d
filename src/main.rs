//! x402-charge demo server.
//!
//! Serves a few routes priced in joules. Unpaid requests get a `402 Payment Required`
//! body explaining whom to pay, and requests carrying `X-Payment-Proof` are verified
//! against the payment service before the handler runs.
//!
//! Endpoints:
//! - `GET /` – Free catalog of protected routes and their prices
//! - `GET /health` – Liveness check
//! - `GET <route>` – One per configured route, gated by payment
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` points at the JSON config file (default `./config.json`)
//! - `HOST`, `PORT` control binding address
//! - `PAYMENT_SERVICE_URL`, `PAYMENT_SERVICE_API_KEY` locate and authenticate the payment service
//! - `OTEL_*` variables enable span export

mod config;
mod routes;
mod run;
mod util;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
