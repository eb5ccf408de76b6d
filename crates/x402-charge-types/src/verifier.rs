//! Trait defining the verification interface of a remote payment service.
//!
//! The gate never decides on its own that a payment happened. It asks a
//! [`PaymentVerifier`], and only a `verified: true` answer from it admits a request.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::proto;

/// Asynchronous interface to the payment service's read-only verify query.
pub trait PaymentVerifier {
    /// Transport or protocol failure. The gate treats it as a refusal.
    type Error: Debug + Display + Send;

    /// Asks whether `request.transaction_id` paid `expected_amount` to `recipient`.
    ///
    /// A negative verdict is `Ok` with `verified: false`; `Err` means no verdict was obtained.
    fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> impl Future<Output = Result<proto::VerifyResponse, Self::Error>> + Send;

    /// HTTP status the payment service answered with, when `error` carries one.
    fn error_status(error: &Self::Error) -> Option<u16> {
        let _ = error;
        None
    }
}

impl<T: PaymentVerifier> PaymentVerifier for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &proto::VerifyRequest,
    ) -> impl Future<Output = Result<proto::VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn error_status(error: &Self::Error) -> Option<u16> {
        T::error_status(error)
    }
}
