//! A [`PaymentVerifier`] that queries a _remote_ joule payment service over HTTP.
//!
//! [`PaymentServiceClient`] knows two endpoints relative to the service base URL:
//! `./verify`, which it calls, and `./transfer`, which it only advertises to callers in
//! `402` bodies. Every call carries the server-side API key as a bearer token and is
//! bounded by a timeout.
//!
//! ## Example
//!
//! ```rust
//! use x402_charge_axum::payment_client::PaymentServiceClient;
//!
//! let client = PaymentServiceClient::try_new("https://pay.example.com/api", "secret").unwrap();
//! assert_eq!(client.verify_url().as_str(), "https://pay.example.com/api/verify");
//! ```
//!
//! ## Error Handling
//!
//! [`PaymentServiceError`] separates URL construction, transport failures, timeouts,
//! unexpected HTTP statuses and malformed bodies. The gate refuses the request on any of them.

use http::StatusCode;
use reqwest::Client;
use std::time::Duration;
use tracing::instrument;
use url::Url;
use x402_charge_types::proto::{Endpoints, VerifyRequest, VerifyResponse};
use x402_charge_types::verifier::PaymentVerifier;

/// Errors that can occur while talking to the payment service.
#[derive(Debug, thiserror::Error)]
pub enum PaymentServiceError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Timed out after {timeout:?}: {context}")]
    Timeout {
        context: &'static str,
        timeout: Duration,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
}

impl PaymentServiceError {
    /// HTTP status returned by the service, when it answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            PaymentServiceError::HttpStatus { status, .. } => Some(*status),
            PaymentServiceError::Http { source, .. }
            | PaymentServiceError::JsonDeserialization { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Client for the payment service verify endpoint.
#[derive(Clone)]
pub struct PaymentServiceClient {
    /// Base URL of the service, always ending with `/`
    base_url: Url,
    /// Full URL to `POST /verify`
    verify_url: Url,
    /// Full URL to `POST /transfer`, advertised only
    transfer_url: Url,
    /// Bearer credential, never sent to callers
    api_key: String,
    /// Shared Reqwest HTTP client
    client: Client,
    timeout: Duration,
}

impl std::fmt::Debug for PaymentServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentServiceClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PaymentVerifier for PaymentServiceClient {
    type Error = PaymentServiceError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, PaymentServiceError> {
        PaymentServiceClient::verify(self, request).await
    }

    fn error_status(error: &PaymentServiceError) -> Option<u16> {
        error.status().map(|status| status.as_u16())
    }
}

impl PaymentServiceClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Builds a client from a base URL. Trailing slashes are normalized to exactly one.
    pub fn try_new(base_url: &str, api_key: impl Into<String>) -> Result<Self, PaymentServiceError> {
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized).map_err(|e| PaymentServiceError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::from_url(base_url, api_key)
    }

    /// Builds a client from an already parsed base URL.
    ///
    /// Endpoints are joined relative to it, so it should end with `/`.
    pub fn from_url(base_url: Url, api_key: impl Into<String>) -> Result<Self, PaymentServiceError> {
        let verify_url =
            base_url
                .join("./verify")
                .map_err(|e| PaymentServiceError::UrlParse {
                    context: "Failed to construct ./verify URL",
                    source: e,
                })?;
        let transfer_url =
            base_url
                .join("./transfer")
                .map_err(|e| PaymentServiceError::UrlParse {
                    context: "Failed to construct ./transfer URL",
                    source: e,
                })?;
        Ok(Self {
            base_url,
            verify_url,
            transfer_url,
            api_key: api_key.into(),
            client: Client::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    pub fn transfer_url(&self) -> &Url {
        &self.transfer_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Endpoints to advertise in `402` bodies.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            transfer: self.transfer_url.clone(),
            verify: self.verify_url.clone(),
        }
    }

    /// Sets the timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = timeout;
        this
    }

    /// Sends `POST /verify`.
    #[instrument(
        name = "x402_charge.payment_client.verify",
        skip_all,
        fields(transaction_id = %request.transaction_id, timeout = ?self.timeout)
    )]
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, PaymentServiceError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// POSTs `payload` as JSON with the bearer credential and maps every failure mode.
    ///
    /// `context` names the call in error messages, e.g. `"POST /verify"`.
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, PaymentServiceError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let http_response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(context, e))?;

        let status = http_response.status();
        if status.is_success() {
            http_response.json::<R>().await.map_err(|e| {
                if e.is_timeout() {
                    self.transport_error(context, e)
                } else {
                    PaymentServiceError::JsonDeserialization { context, source: e }
                }
            })
        } else {
            let body = http_response
                .text()
                .await
                .map_err(|e| self.transport_error(context, e))?;
            Err(PaymentServiceError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }

    fn transport_error(&self, context: &'static str, source: reqwest::Error) -> PaymentServiceError {
        if source.is_timeout() {
            PaymentServiceError::Timeout {
                context,
                timeout: self.timeout,
            }
        } else {
            PaymentServiceError::Http { context, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> VerifyRequest {
        VerifyRequest {
            transaction_id: "11111111-1111-1111-1111-111111111111".parse().unwrap(),
            expected_amount: 500,
            recipient: "acct".to_string(),
        }
    }

    #[test]
    fn derives_endpoints_from_base_url() {
        let client = PaymentServiceClient::try_new("https://pay.example/api///", "k").unwrap();
        assert_eq!(client.base_url().as_str(), "https://pay.example/api/");
        assert_eq!(client.verify_url().as_str(), "https://pay.example/api/verify");
        assert_eq!(client.transfer_url().as_str(), "https://pay.example/api/transfer");
        assert_eq!(client.timeout(), PaymentServiceClient::DEFAULT_TIMEOUT);
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let err = PaymentServiceClient::try_new("not a url", "k").unwrap_err();
        assert!(matches!(err, PaymentServiceError::UrlParse { .. }));
    }

    #[tokio::test]
    async fn sends_bearer_authenticated_verify_query() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "transaction_id": "11111111-1111-1111-1111-111111111111",
                "expected_amount": 500,
                "recipient": "acct",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "verified": true,
                "actual_amount": 500,
                "actual_recipient": "acct",
                "expected_amount": 500,
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = PaymentServiceClient::try_new(&mock_server.uri(), "secret").unwrap();
        let response = client.verify(&request()).await.unwrap();
        assert!(response.verified);
        assert_eq!(response.actual_amount, Some(500));
        assert_eq!(response.actual_recipient.as_deref(), Some("acct"));
    }

    #[tokio::test]
    async fn negative_verdict_is_ok() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "verified": false,
                "reason": "already claimed",
                "already_claimed": true,
            })))
            .mount(&mock_server)
            .await;

        let client = PaymentServiceClient::try_new(&mock_server.uri(), "secret").unwrap();
        let response = client.verify(&request()).await.unwrap();
        assert!(!response.verified);
        assert_eq!(response.already_claimed, Some(true));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&mock_server)
            .await;

        let client = PaymentServiceClient::try_new(&mock_server.uri(), "secret").unwrap();
        let err = client.verify(&request()).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(
            <PaymentServiceClient as PaymentVerifier>::error_status(&err),
            Some(503)
        );
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = PaymentServiceClient::try_new(&mock_server.uri(), "secret").unwrap();
        let err = client.verify(&request()).await.unwrap_err();
        assert!(matches!(err, PaymentServiceError::JsonDeserialization { .. }));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "verified": true }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = PaymentServiceClient::try_new(&mock_server.uri(), "secret")
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let err = client.verify(&request()).await.unwrap_err();
        assert!(matches!(err, PaymentServiceError::Timeout { .. }), "{err:?}");
    }
}
