//! Middleware for handling HTTP 402 Payment Required responses.
//!
//! This module provides the [`X402Payments`] struct which implements
//! `reqwest_middleware::Middleware`, allowing automatic retries of requests
//! with a `Payment-Signature` header obtained from the facilitator named in
//! the server's payment instructions.
//!
//! It includes:
//! - Parsing and validation of `Payment-Required` instructions
//! - Max price enforcement
//! - Pluggable payment confirmation, bounded by a timeout
//! - Payment creation against the facilitator and a single retry

use http::{Extensions, HeaderValue, StatusCode};
use reqwest::{Client, Request, Response};
use reqwest_middleware as rqm;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use denlabs_x402_types::instructions::{InstructionsError, PaymentInstructions};
use denlabs_x402_types::price::Price;
use denlabs_x402_types::wire::{
    CreatePaymentRequest, PAYMENT_REQUIRED_HEADER, PAYMENT_SIGNATURE_HEADER,
};

use crate::confirm::{ConfirmDecision, PaymentConfirmer};
use crate::facilitator::{CreateClient, CreateError};

/// Errors that can occur while paying for a 402 response.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The 402 response carried no `Payment-Required` header, so there is
    /// nothing actionable to pay.
    #[error("402 response carries no payment instructions")]
    MissingInstructions,
    /// The `Payment-Required` header was present but not parseable as
    /// payment instructions.
    #[error("Failed to parse payment instructions: {0}")]
    MalformedInstructions(String),
    /// The instructions parsed but are unusable, e.g. no recipient.
    #[error("Unusable payment instructions: {0}")]
    InvalidInstructions(#[from] InstructionsError),
    /// The server asks for more than the client is willing to spend.
    /// Prevents accidental or malicious overspending.
    #[error("Payment amount {requested} exceeds maximum allowed {allowed}")]
    PriceTooLarge { requested: Price, allowed: Price },
    /// The confirmer declined the payment.
    #[error("Payment was declined")]
    UserCancelled,
    /// No confirmation verdict arrived within the confirmation timeout.
    #[error("Payment confirmation timed out")]
    ConfirmationTimeout,
    /// Creating the payment with the facilitator failed.
    #[error("Failed to create payment with facilitator")]
    Create(#[from] CreateError),
    /// Indicates that the original request could not be cloned for retrying
    /// with a payment header. This typically happens when the request body
    /// is a stream or otherwise non-reusable.
    #[error("Request object is not cloneable. Are you passing a streaming body?")]
    RequestNotCloneable,
    /// The initial response was neither success nor 402.
    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),
    /// The server did not honor a freshly created payment on retry.
    #[error("Server did not honor the payment, retry answered {0}")]
    PaymentNotHonored(StatusCode),
    /// Raised when the payment signature cannot be inserted into a
    /// [`HeaderValue`].
    #[error("Failed to encode payment signature to HTTP header")]
    HeaderValueEncode(#[source] http::header::InvalidHeaderValue),
}

impl From<PaymentError> for rqm::Error {
    fn from(error: PaymentError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

/// Middleware that handles automatic retries for HTTP 402 responses
/// by paying through the facilitator and attaching the resulting
/// `Payment-Signature` header.
#[derive(Clone)]
pub struct X402Payments {
    confirmer: Arc<dyn PaymentConfirmer>,
    confirm_timeout: Duration,
    max_price: Option<Price>,
    http: Client,
}

impl X402Payments {
    /// Default bound on waiting for a payment confirmation verdict.
    pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

    /// Create a new middleware instance with the given confirmation
    /// strategy. No max price is set by default.
    pub fn with_confirmer<C: PaymentConfirmer + 'static>(confirmer: C) -> Self {
        Self {
            confirmer: Arc::new(confirmer),
            confirm_timeout: Self::DEFAULT_CONFIRM_TIMEOUT,
            max_price: None,
            http: Client::new(),
        }
    }

    /// Set the maximum price the middleware will ever pay.
    pub fn max_price(&self, max: Price) -> Self {
        let mut this = self.clone();
        this.max_price = Some(max);
        this
    }

    /// Set the bound on waiting for a confirmation verdict.
    pub fn with_confirm_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.confirm_timeout = timeout;
        this
    }

    /// Use a specific HTTP client for facilitator calls.
    pub fn with_http_client(&self, http: Client) -> Self {
        let mut this = self.clone();
        this.http = http;
        this
    }

    /// Extracts and validates payment instructions from a 402 response.
    pub fn parse_instructions(response: &Response) -> Result<PaymentInstructions, PaymentError> {
        let header = response
            .headers()
            .get(PAYMENT_REQUIRED_HEADER)
            .ok_or(PaymentError::MissingInstructions)?;
        let text = header
            .to_str()
            .map_err(|e| PaymentError::MalformedInstructions(e.to_string()))?;
        let instructions: PaymentInstructions = serde_json::from_str(text)
            .map_err(|e| PaymentError::MalformedInstructions(e.to_string()))?;
        instructions.validate()?;
        Ok(instructions)
    }

    /// Ensures that the requested price does not exceed the configured max.
    pub fn assert_max_price(
        &self,
        instructions: &PaymentInstructions,
    ) -> Result<(), PaymentError> {
        if let Some(max) = self.max_price {
            if instructions.price > max {
                return Err(PaymentError::PriceTooLarge {
                    requested: instructions.price,
                    allowed: max,
                });
            }
        }
        Ok(())
    }

    /// Asks the confirmer for a verdict, bounded by the confirmation
    /// timeout.
    async fn confirm(&self, instructions: &PaymentInstructions) -> Result<(), PaymentError> {
        let verdict = tokio::time::timeout(
            self.confirm_timeout,
            self.confirmer.confirm(instructions),
        )
        .await
        .map_err(|_| PaymentError::ConfirmationTimeout)?;
        match verdict {
            ConfirmDecision::Approved => Ok(()),
            ConfirmDecision::Declined => Err(PaymentError::UserCancelled),
        }
    }

    /// Creates a payment matching the instructions and returns the proof
    /// header to retry with.
    #[instrument(name = "x402.pay", skip_all, fields(
        price = %instructions.price,
        facilitator = %instructions.facilitator,
    ))]
    pub async fn pay(
        &self,
        instructions: &PaymentInstructions,
    ) -> Result<HeaderValue, PaymentError> {
        let facilitator = CreateClient::for_instructions(self.http.clone(), instructions)?;
        let request = CreatePaymentRequest {
            amount: instructions.price,
            token: instructions.token.clone(),
            recipient: instructions.recipient.clone(),
            endpoint: instructions.endpoint.clone(),
            method: instructions.method.clone(),
            description: instructions.description.clone(),
        };
        let payment = facilitator.create(&request).await?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(timestamp = payment.timestamp, "Payment created");
        // The signature retries verbatim; any reformatting would break
        // facilitator-side verification.
        HeaderValue::from_str(&payment.signature).map_err(PaymentError::HeaderValueEncode)
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for X402Payments {
    /// Intercepts the response. If it's a 402, it pays and retries the
    /// request once with the proof attached.
    #[instrument(name = "x402.handle", skip(self, req, extensions, next), fields(method = %req.method(), url = %req.url()))]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let retry_req = req.try_clone(); // For retrying with payment later

        let res = next.clone().run(req, extensions).await?;

        #[cfg(feature = "telemetry")]
        tracing::debug!("Received response: {}", res.status());

        if res.status().is_success() {
            return Ok(res); // No payment needed: passthrough
        }
        if res.status() != StatusCode::PAYMENT_REQUIRED {
            return Err(PaymentError::UnexpectedStatus(res.status()).into());
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!("Received 402 Payment Required");

        let instructions = Self::parse_instructions(&res)?;
        self.assert_max_price(&instructions)?;
        self.confirm(&instructions).await?;
        let payment_header = self.pay(&instructions).await?;

        let mut retry_req = retry_req.ok_or(PaymentError::RequestNotCloneable)?;
        retry_req
            .headers_mut()
            .insert(PAYMENT_SIGNATURE_HEADER, payment_header);
        let retry_res = next.run(retry_req, extensions).await?;
        if retry_res.status().is_success() {
            Ok(retry_res)
        } else {
            Err(PaymentError::PaymentNotHonored(retry_res.status()).into())
        }
    }
}
