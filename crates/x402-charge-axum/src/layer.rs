//! Axum middleware charging joules for access to protected routes.
//!
//! [`X402Charge`] holds what all routes share, the payment service client and the gate
//! settings. [`X402Charge::charge`] turns it into a [`ChargeLayer`] for one route, with
//! its own price, replay cache and verification window.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use axum::{Extension, Json, Router, routing::get};
//! use x402_charge_axum::X402Charge;
//! use x402_charge_types::proto::PaymentRecord;
//!
//! let x402 = X402Charge::try_new("https://pay.example.com/api", "server-side-key").unwrap();
//!
//! let app: Router = Router::new().route(
//!     "/premium",
//!     get(premium).layer(x402.charge(500, "@acct")),
//! );
//!
//! async fn premium(Extension(payment): Extension<PaymentRecord>) -> Json<PaymentRecord> {
//!     Json(payment)
//! }
//! ```
//!
//! ## Configuration Notes
//!
//! - **[`X402Charge::with_network`]** sets the network tag advertised in `402` bodies.
//! - **[`X402Charge::with_replay_capacity`]** bounds the per-route replay cache.
//! - **[`X402Charge::with_rate_limit`]** caps verification calls per route per minute.
//! - **[`X402Charge::allow_concurrent_duplicates`]** drops the per-id verification lock.
//! - **[`X402Charge::with_clock`]** replaces the wall clock, mostly for tests.
//!
//! Each call to [`X402Charge::charge`] creates fresh state. Clones of one [`ChargeLayer`]
//! share it, so apply a layer to a single route.

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;
use x402_charge_types::proto::{DEFAULT_NETWORK, Endpoints, PriceTag};
use x402_charge_types::transaction_id::TransactionId;
use x402_charge_types::verifier::PaymentVerifier;

use crate::clock::{Clock, SystemClock};
use crate::gate::{ChargeGate, GateState};
use crate::payment_client::{PaymentServiceClient, PaymentServiceError};
use crate::rate_limit::RateWindow;
use crate::replay_cache::ReplayCache;

/// Factory for per-route charge layers.
#[derive(Clone)]
pub struct X402Charge<V> {
    verifier: V,
    endpoints: Endpoints,
    network: String,
    replay_capacity: usize,
    rate_limit: usize,
    serialize_duplicates: bool,
    clock: Arc<dyn Clock>,
}

impl<V> X402Charge<V> {
    /// Uses any [`PaymentVerifier`], advertising `endpoints` to callers.
    pub fn with_verifier(verifier: V, endpoints: Endpoints) -> Self {
        Self {
            verifier,
            endpoints,
            network: DEFAULT_NETWORK.to_string(),
            replay_capacity: ReplayCache::DEFAULT_CAPACITY,
            rate_limit: RateWindow::DEFAULT_LIMIT,
            serialize_duplicates: true,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

impl X402Charge<Arc<PaymentServiceClient>> {
    /// Creates a factory talking to the payment service at `base_url`.
    pub fn try_new(base_url: &str, api_key: impl Into<String>) -> Result<Self, PaymentServiceError> {
        let client = PaymentServiceClient::try_new(base_url, api_key)?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: PaymentServiceClient) -> Self {
        let endpoints = client.endpoints();
        Self::with_verifier(Arc::new(client), endpoints)
    }

    pub fn payment_service_url(&self) -> &Url {
        self.verifier.base_url()
    }

    /// Sets the timeout of the verify call. Default is 10 seconds.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.verifier = Arc::new(self.verifier.with_timeout(timeout));
        this
    }
}

impl<V> X402Charge<V>
where
    V: Clone,
{
    pub fn with_network(&self, network: impl Into<String>) -> Self {
        let mut this = self.clone();
        this.network = network.into();
        this
    }

    pub fn with_replay_capacity(&self, capacity: usize) -> Self {
        let mut this = self.clone();
        this.replay_capacity = capacity;
        this
    }

    /// Sets how many verification calls one route may issue per 60 seconds.
    pub fn with_rate_limit(&self, per_minute: usize) -> Self {
        let mut this = self.clone();
        this.rate_limit = per_minute;
        this
    }

    pub fn with_clock(&self, clock: Arc<dyn Clock>) -> Self {
        let mut this = self.clone();
        this.clock = clock;
        this
    }

    /// Lets concurrent requests with the same id verify in parallel.
    ///
    /// Both may then be admitted unless the payment service refuses the second claim.
    pub fn allow_concurrent_duplicates(&self) -> Self {
        let mut this = self.clone();
        this.serialize_duplicates = false;
        this
    }

    /// Makes concurrent requests with the same id verify one after another (default).
    pub fn serialize_concurrent_duplicates(&self) -> Self {
        let mut this = self.clone();
        this.serialize_duplicates = true;
        this
    }

    /// Builds the layer for one route charging `amount` joules to `recipient`.
    ///
    /// `amount` must be positive.
    pub fn charge(&self, amount: u64, recipient: impl Into<String>) -> ChargeLayer<V> {
        let price = PriceTag::new(amount, recipient, self.endpoints.clone())
            .with_network(self.network.clone());
        ChargeLayer {
            verifier: self.verifier.clone(),
            price: Arc::new(price),
            state: Arc::new(GateState::new(
                self.replay_capacity,
                self.rate_limit,
                self.clock.clone(),
            )),
            serialize_duplicates: self.serialize_duplicates,
        }
    }
}

/// Layer enforcing one route's price.
#[derive(Clone)]
pub struct ChargeLayer<V> {
    verifier: V,
    price: Arc<PriceTag>,
    state: Arc<GateState>,
    serialize_duplicates: bool,
}

impl<V> ChargeLayer<V> {
    pub fn price(&self) -> &PriceTag {
        &self.price
    }

    /// Whether `id` already admitted a request on this route.
    pub async fn is_replayed(&self, id: &TransactionId) -> bool {
        self.state.replay.lock().await.contains(id)
    }

    pub async fn replay_cache_len(&self) -> usize {
        self.state.replay.lock().await.len()
    }
}

impl<S, V> Layer<S> for ChargeLayer<V>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    V: Clone,
{
    type Service = ChargeService<V>;

    fn layer(&self, inner: S) -> Self::Service {
        ChargeService {
            verifier: self.verifier.clone(),
            price: self.price.clone(),
            state: self.state.clone(),
            serialize_duplicates: self.serialize_duplicates,
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that charges for every request before forwarding it.
#[derive(Clone)]
pub struct ChargeService<V> {
    /// Payment service client
    verifier: V,
    /// Price of the route
    price: Arc<PriceTag>,
    /// Replay cache, verification window and in-flight locks of the route
    state: Arc<GateState>,
    serialize_duplicates: bool,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<V> Service<Request> for ChargeService<V>
where
    V: PaymentVerifier + Clone + Send + Sync + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = ChargeGate {
            verifier: self.verifier.clone(),
            price: self.price.clone(),
            state: self.state.clone(),
            serialize_duplicates: self.serialize_duplicates,
        };
        Box::pin(gate.handle_request(self.inner.clone(), req))
    }
}
