//! Axum middleware charging joules per request through the [x402](https://www.x402.org)
//! `402 Payment Required` flow.
//!
//! A caller without proof of payment receives a JSON body saying whom to pay, how much and
//! where. A caller presenting a transaction id in `X-Payment-Proof` is checked against a
//! remote payment service before the request reaches the handler, which then finds a
//! [`PaymentRecord`](x402_charge_types::proto::PaymentRecord) in the request extensions.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use x402_charge_axum::X402Charge;
//!
//! let x402 = X402Charge::try_new("https://pay.example.com/api", "server-side-key").unwrap();
//! let app: Router = Router::new().route(
//!     "/paywall",
//!     get(|| async { "paid" }).layer(x402.charge(100, "@shop")),
//! );
//! ```
//!
//! See [`X402Charge`] for configuration, [`payment_client`] for the HTTP client and
//! [`gate`] for the decision steps.
//!
//! ## Local safety net
//!
//! Besides protocol framing, each protected route keeps a bounded [`replay_cache`] of
//! accepted ids and a sliding [`rate_limit`] window on calls to the payment service. Both
//! live in memory and reset on restart.

pub mod clock;
pub mod gate;
pub mod layer;
pub mod payment_client;
pub mod rate_limit;
pub mod replay_cache;

pub use gate::ChargeError;
pub use layer::{ChargeLayer, X402Charge};
pub use payment_client::PaymentServiceClient;
