//! Wire format of the x402-charge protocol.
//!
//! Three parties exchange these types:
//!
//! - the **gate** answers unpaid or rejected requests with [`PaymentRequired`] (`402`) or
//!   [`RateLimited`] (`429`), and attaches a [`PaymentRecord`] to admitted requests;
//! - the **payment service** receives a [`VerifyRequest`] and answers with a [`VerifyResponse`];
//! - the **caller** reads the [`PaymentRequirement`] to learn whom to pay, how much, and where.
//!
//! Payment service fields are `snake_case`; the payment record is `camelCase`.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::recipient::normalize_handle;
use crate::transaction_id::TransactionId;

/// Protocol tag carried in every `402` body.
pub const PROTOCOL: &str = "x402";

/// Unit every amount is denominated in.
pub const CURRENCY: &str = "joules";

/// Request header carrying the caller's transaction identifier.
pub const PAYMENT_PROOF_HEADER: &str = "X-Payment-Proof";

/// Network tag advertised when none is configured.
pub const DEFAULT_NETWORK: &str = "joule-ledger";

/// Payment service endpoints advertised to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Where the caller sends the transfer. The gate never calls it.
    pub transfer: Url,
    /// Where the gate verifies transaction ids.
    pub verify: Url,
}

/// Human-readable steps included when a request arrives without any proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructions {
    pub step1: String,
    pub step2: String,
    pub step3: String,
}

impl Instructions {
    pub fn new(amount: u64, recipient: &str, endpoints: &Endpoints) -> Self {
        Self {
            step1: format!(
                "Transfer {amount} {CURRENCY} to {recipient} with POST {}",
                endpoints.transfer
            ),
            step2: "Copy the transaction_id returned by the transfer".to_string(),
            step3: format!("Retry this request with the header {PAYMENT_PROOF_HEADER}: <transaction_id>"),
        }
    }
}

/// What a caller must pay to reach a protected route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequirement {
    pub recipient: String,
    pub amount: u64,
    pub currency: String,
    pub rate: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub endpoints: Endpoints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Instructions>,
}

/// Price configured for one protected route.
///
/// A fresh [`PaymentRequirement`] is derived from it for every rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTag {
    /// Amount in joules. Must be positive.
    pub amount: u64,
    /// Recipient handle as configured, e.g. `@acct`.
    pub recipient: String,
    pub network: String,
    pub endpoints: Endpoints,
}

impl PriceTag {
    pub fn new(amount: u64, recipient: impl Into<String>, endpoints: Endpoints) -> Self {
        Self {
            amount,
            recipient: recipient.into(),
            network: DEFAULT_NETWORK.to_string(),
            endpoints,
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Recipient handle in the form the payment service stores.
    pub fn normalized_recipient(&self) -> &str {
        normalize_handle(&self.recipient)
    }

    pub fn rate(&self) -> String {
        format!("{} {CURRENCY} per request", self.amount)
    }

    /// Builds the requirement restated in a rejection body.
    pub fn requirement(&self, memo: Option<String>) -> PaymentRequirement {
        PaymentRequirement {
            recipient: self.recipient.clone(),
            amount: self.amount,
            currency: CURRENCY.to_string(),
            rate: self.rate(),
            network: self.network.clone(),
            memo,
            endpoints: self.endpoints.clone(),
            instructions: None,
        }
    }

    /// Same as [`PriceTag::requirement`], with step-by-step instructions.
    pub fn requirement_with_instructions(&self, memo: Option<String>) -> PaymentRequirement {
        PaymentRequirement {
            instructions: Some(Instructions::new(
                self.amount,
                &self.recipient,
                &self.endpoints,
            )),
            ..self.requirement(memo)
        }
    }

    pub fn verify_request(&self, transaction_id: TransactionId) -> VerifyRequest {
        VerifyRequest {
            transaction_id,
            expected_amount: self.amount,
            recipient: self.normalized_recipient().to_string(),
        }
    }
}

/// `402 Payment Required` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequired {
    pub status: u16,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub payment: PaymentRequirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub already_claimed: Option<bool>,
}

impl PaymentRequired {
    pub const STATUS: u16 = 402;

    /// Body for a request that carried no proof at all.
    pub fn missing_proof(payment: PaymentRequirement, message: impl Into<String>) -> Self {
        Self {
            status: Self::STATUS,
            protocol: PROTOCOL.to_string(),
            message: Some(message.into()),
            error: None,
            payment,
            already_claimed: None,
        }
    }

    /// Body for a request whose proof was refused.
    pub fn rejected(
        payment: PaymentRequirement,
        error: impl Into<String>,
        already_claimed: Option<bool>,
    ) -> Self {
        Self {
            status: Self::STATUS,
            protocol: PROTOCOL.to_string(),
            message: None,
            error: Some(error.into()),
            payment,
            already_claimed,
        }
    }
}

/// `429 Too Many Requests` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimited {
    pub status: u16,
    pub error: String,
}

impl RateLimited {
    pub const STATUS: u16 = 429;

    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: Self::STATUS,
            error: error.into(),
        }
    }
}

/// Query sent to the payment service verify endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub transaction_id: TransactionId,
    pub expected_amount: u64,
    /// Bare recipient handle, see [`normalize_handle`].
    pub recipient: String,
}

/// Verdict returned by the payment service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub already_claimed: Option<bool>,
}

/// Verified payment attached to an admitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub verified: bool,
    pub transaction_id: TransactionId,
    pub amount: u64,
    pub recipient: String,
    pub expected_amount: u64,
}

impl PaymentRecord {
    /// Builds the record for a positive verdict. Missing fields fall back to what was asked for.
    pub fn from_verified(request: &VerifyRequest, response: &VerifyResponse) -> Self {
        Self {
            verified: true,
            transaction_id: request.transaction_id.clone(),
            amount: response.actual_amount.unwrap_or(request.expected_amount),
            recipient: response
                .actual_recipient
                .clone()
                .unwrap_or_else(|| request.recipient.clone()),
            expected_amount: response.expected_amount.unwrap_or(request.expected_amount),
        }
    }
}
