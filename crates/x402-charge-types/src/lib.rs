//! Core structures for the x402-charge pay-per-request protocol.
//!
//! This crate holds everything that crosses a process boundary: the payment requirement
//! returned with `402 Payment Required`, the request and response exchanged with the
//! remote payment service, and the record attached to admitted requests.
//!
//! # Modules
//!
//! - [`proto`] - Wire types for rejection bodies, verification and the payment record.
//! - [`transaction_id`] - The canonical transaction identifier carried in `X-Payment-Proof`.
//! - [`recipient`] - Recipient handle normalization.
//! - [`verifier`] - The [`PaymentVerifier`](verifier::PaymentVerifier) trait implemented by payment service clients.

pub mod proto;
pub mod recipient;
pub mod transaction_id;
pub mod verifier;
