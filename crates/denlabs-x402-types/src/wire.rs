//! Wire format types for protocol messages.
//!
//! This module defines the messages exchanged with the facilitator and the
//! JSON bodies of 402/503 gate responses, along with the canonical header
//! names shared by both halves of the protocol.
//!
//! # Key Types
//!
//! - [`VerifyRequest`] / [`VerifyOutcome`] - server → facilitator verification
//! - [`CreatePaymentRequest`] / [`CreatePaymentResponse`] - client → facilitator
//! - [`PaymentRequiredBody`] - 402 response body
//! - [`ServiceUnavailableBody`] - 503 response body
//! - [`PaymentVerificationResult`] - server-internal verification verdict
//!
//! All wire types serialize to JSON using camelCase field names.

use serde::{Deserialize, Serialize};

use crate::instructions::PaymentInstructions;
use crate::price::Price;

/// Response header carrying JSON-serialized [`PaymentInstructions`].
pub const PAYMENT_REQUIRED_HEADER: &str = "Payment-Required";

/// Request header carrying the opaque payment-proof signature.
///
/// This is the single canonical proof header for both halves of the
/// protocol.
pub const PAYMENT_SIGNATURE_HEADER: &str = "Payment-Signature";

/// `Retry-After` seconds advertised when the facilitator is unreachable.
pub const FACILITATOR_RETRY_AFTER_SECS: u64 = 30;

/// Request to the facilitator's `POST ./verify` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// The payment-proof signature extracted from the request header.
    pub signature: String,
    /// The payee address payment must have gone to.
    pub recipient: String,
    /// The price of the gated resource at verification time.
    pub expected_amount: Price,
    /// Payment token symbol.
    pub token: String,
    /// The gated resource identity.
    pub endpoint: String,
    /// HTTP method of the gated request.
    pub method: String,
}

/// Response from the facilitator's `POST ./verify` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    /// Whether the signature proves a matching payment.
    pub verified: bool,
    /// Amount actually paid, when verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Price>,
    /// The facilitator's stated reason when not verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request to the facilitator's `POST ./create` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Amount to pay, taken from the instructions.
    pub amount: Price,
    /// Payment token symbol.
    pub token: String,
    /// Payee wallet address.
    pub recipient: String,
    /// The gated resource identity.
    pub endpoint: String,
    /// HTTP method of the gated request.
    pub method: String,
    /// Human-readable reason for the charge.
    pub description: String,
}

/// Response from the facilitator's `POST ./create` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    /// The opaque payment-proof signature to attach on retry.
    pub signature: String,
    /// Amount the payment was created for.
    pub amount: Price,
    /// Payment token symbol.
    pub token: String,
    /// Facilitator timestamp of payment creation, unix seconds.
    pub timestamp: u64,
}

/// JSON body of a `402 Payment Required` gate response.
///
/// The `payment` field mirrors the [`PAYMENT_REQUIRED_HEADER`] header so the
/// instructions are also human/debug-readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    /// Short reason the request was denied.
    pub error: String,
    /// Human-readable explanation.
    pub message: String,
    /// Description of the gated resource.
    pub description: String,
    /// The same instructions carried in the response header.
    pub payment: PaymentInstructions,
}

/// JSON body of a `503 Service Unavailable` gate response.
///
/// Returned instead of 402 whenever the facilitator is unreachable: a 402
/// implies the client can pay to proceed, which is false while the payment
/// backend is down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUnavailableBody {
    /// Short reason the request was denied.
    pub error: String,
    /// Human-readable explanation.
    pub message: String,
    /// Seconds after which the client may retry.
    pub retry_after: u64,
    /// Base URL of the unreachable facilitator.
    pub facilitator: String,
}

/// Server-internal verdict of a payment verification, computed per request.
#[derive(Debug, Clone)]
pub struct PaymentVerificationResult {
    /// Whether the request carried a valid payment proof.
    pub valid: bool,
    /// Why verification failed, when it did.
    pub error: Option<String>,
    /// Amount the facilitator reports as paid, when verified.
    pub paid_amount: Option<Price>,
}

impl PaymentVerificationResult {
    /// A successful verification.
    pub fn valid(paid_amount: Option<Price>) -> Self {
        Self {
            valid: true,
            error: None,
            paid_amount,
        }
    }

    /// A failed verification with an explanatory reason.
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            paid_amount: None,
        }
    }
}
