//! Charge gate: the per-request decision logic.
//!
//! A [`ChargeGate`] is built for every request from the route's [`ChargeLayer`](crate::layer::ChargeLayer)
//! and decides, in this order, short-circuiting at the first failure:
//!
//! 1. no `X-Payment-Proof` header: `402` with instructions;
//! 2. malformed transaction id: `402`, nothing else is touched;
//! 3. id already in the replay cache: `402`, no remote call;
//! 4. verification window full: `429`, the attempt is not recorded;
//!    with duplicate serialization on, the per-id lock is taken and step 3 repeated first;
//! 5. ask the payment service;
//! 6. negative verdict: `402` with the service's reason;
//! 7. no verdict (transport failure, timeout, bad status or body): `402`, logged;
//! 8. positive verdict: cache the id, attach a [`PaymentRecord`], run the inner service.
//!
//! ## Concurrency
//!
//! Steps 3 and 8 sit on either side of the remote call, so two requests carrying the same
//! id may both pass step 3. With duplicate serialization on (the default), the second one
//! waits on a per-id lock and re-checks the cache before it touches the verification
//! window, so a duplicate turned away there costs no slot. With it off, both may
//! be admitted unless the payment service enforces a single claim, which it must anyway.

use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use dashmap::DashMap;
use http::{HeaderValue, StatusCode, header};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower::{Service, ServiceExt};
use tracing::{Instrument, instrument};
use x402_charge_types::proto::{
    PAYMENT_PROOF_HEADER, PaymentRecord, PaymentRequired, PriceTag, RateLimited,
};
use x402_charge_types::transaction_id::{TransactionId, TransactionIdError};
use x402_charge_types::verifier::PaymentVerifier;

use crate::clock::Clock;
use crate::rate_limit::RateWindow;
use crate::replay_cache::ReplayCache;

/// Why a request was not admitted.
#[derive(Debug, thiserror::Error)]
pub enum ChargeError {
    #[error("Payment required")]
    ProofRequired,
    #[error(transparent)]
    InvalidProof(#[from] TransactionIdError),
    #[error("Transaction ID already used")]
    AlreadyUsed,
    #[error("Too many payment verification attempts, try again later")]
    RateLimited,
    #[error("{}", .reason.as_deref().unwrap_or("Payment verification failed"))]
    Rejected {
        reason: Option<String>,
        already_claimed: Option<bool>,
    },
    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),
}

impl ChargeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChargeError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::PAYMENT_REQUIRED,
        }
    }

    /// Renders the rejection, restating `price` for `402`s.
    ///
    /// `memo` identifies the request, e.g. `GET /premium`.
    pub fn into_rejection(self, price: &PriceTag, memo: String) -> Response {
        match self {
            ChargeError::RateLimited => json_response(
                StatusCode::TOO_MANY_REQUESTS,
                &RateLimited::new(self.to_string()),
            ),
            ChargeError::ProofRequired => json_response(
                StatusCode::PAYMENT_REQUIRED,
                &PaymentRequired::missing_proof(
                    price.requirement_with_instructions(Some(memo)),
                    self.to_string(),
                ),
            ),
            ChargeError::Rejected {
                already_claimed, ..
            } => json_response(
                StatusCode::PAYMENT_REQUIRED,
                &PaymentRequired::rejected(
                    price.requirement(Some(memo)),
                    self.to_string(),
                    already_claimed,
                ),
            ),
            _ => json_response(
                StatusCode::PAYMENT_REQUIRED,
                &PaymentRequired::rejected(price.requirement(Some(memo)), self.to_string(), None),
            ),
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Mutable state owned by one protected route.
pub(crate) struct GateState {
    pub(crate) replay: Mutex<ReplayCache>,
    pub(crate) window: Mutex<RateWindow>,
    pub(crate) in_flight: InFlight,
    pub(crate) clock: Arc<dyn Clock>,
}

impl GateState {
    pub(crate) fn new(replay_capacity: usize, rate_limit: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            replay: Mutex::new(ReplayCache::new(replay_capacity)),
            window: Mutex::new(RateWindow::new(rate_limit)),
            in_flight: InFlight::default(),
            clock,
        }
    }
}

/// Per-transaction-id locks held while a verification is outstanding.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    locks: DashMap<TransactionId, Arc<Mutex<()>>>,
}

impl InFlight {
    /// Waits until no other request is verifying `id`, then claims it.
    async fn acquire(&self, id: &TransactionId) -> InFlightClaim<'_> {
        let lock = self.locks.entry(id.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        InFlightClaim {
            locks: &self.locks,
            id: id.clone(),
            _guard: guard,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

struct InFlightClaim<'a> {
    locks: &'a DashMap<TransactionId, Arc<Mutex<()>>>,
    id: TransactionId,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        // The map and our guard hold one reference each; anything more is a waiter.
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

/// Payment gate for a single request.
pub struct ChargeGate<V> {
    pub(crate) verifier: V,
    pub(crate) price: Arc<PriceTag>,
    pub(crate) state: Arc<GateState>,
    pub(crate) serialize_duplicates: bool,
}

impl<V> ChargeGate<V>
where
    V: PaymentVerifier,
{
    /// Admits the request into `inner` or answers it with a rejection.
    #[instrument(
        name = "x402_charge.handle_request",
        skip_all,
        fields(amount = self.price.amount, recipient = %self.price.recipient)
    )]
    pub async fn handle_request<S>(self, inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        let proof = req.headers().get(PAYMENT_PROOF_HEADER).cloned();
        match self.admit(proof.as_ref()).await {
            Ok(record) => {
                let mut req = req;
                req.extensions_mut().insert(record);
                inner
                    .oneshot(req)
                    .instrument(tracing::info_span!("inner"))
                    .await
            }
            Err(err) => {
                let memo = format!("{} {}", req.method(), req.uri().path());
                Ok(err.into_rejection(&self.price, memo))
            }
        }
    }

    /// Runs the decision steps for a proof header value.
    ///
    /// Returns the record to attach on success. Never admits without a positive verdict.
    pub async fn admit(&self, proof: Option<&HeaderValue>) -> Result<PaymentRecord, ChargeError> {
        let proof = proof.ok_or(ChargeError::ProofRequired)?;
        let transaction_id = TransactionId::from_header_bytes(proof.as_bytes())?;

        if self.state.replay.lock().await.contains(&transaction_id) {
            return Err(ChargeError::AlreadyUsed);
        }

        // Claim before the window so a duplicate answered from the cache records no attempt.
        let _claim = if self.serialize_duplicates {
            let claim = self.state.in_flight.acquire(&transaction_id).await;
            if self.state.replay.lock().await.contains(&transaction_id) {
                return Err(ChargeError::AlreadyUsed);
            }
            Some(claim)
        } else {
            None
        };

        let now = self.state.clock.now();
        if !self.state.window.lock().await.record_attempt(now) {
            return Err(ChargeError::RateLimited);
        }

        let request = self.price.verify_request(transaction_id);
        let response = match self.verifier.verify(&request).await {
            Ok(response) => response,
            Err(err) => {
                let detail = err.to_string();
                tracing::warn!(
                    transaction_id = %request.transaction_id,
                    status = V::error_status(&err),
                    error = %detail,
                    "Payment service verification failed"
                );
                return Err(ChargeError::VerificationFailed(detail));
            }
        };

        if !response.verified {
            return Err(ChargeError::Rejected {
                reason: response.reason,
                already_claimed: response.already_claimed,
            });
        }

        let record = PaymentRecord::from_verified(&request, &response);
        self.state
            .replay
            .lock()
            .await
            .insert(request.transaction_id);
        Ok(record)
    }
}
