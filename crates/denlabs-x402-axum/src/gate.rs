//! Core payment gate decisions.
//!
//! The [`PaymentGate`] decides, per request to a priced endpoint, whether to
//! serve the resource or demand payment. It never blocks on an unreachable
//! facilitator without surfacing that distinctly from "payment needed": a
//! 402 implies the client can pay to proceed, which is false while the
//! payment backend is down, so an unhealthy facilitator turns every would-be
//! 402 into a 503 with a retry hint.
//!
//! The gate holds no application storage at all; its only shared state is
//! the in-memory [`HealthCache`].

use axum_core::body::Body;
use axum_core::response::Response;
use http::{HeaderMap, HeaderValue, StatusCode};

use denlabs_x402_types::config::{GateConfig, GateMode};
use denlabs_x402_types::instructions::{PaymentInstructions, PaymentRequirement};
use denlabs_x402_types::wire::{
    FACILITATOR_RETRY_AFTER_SECS, PAYMENT_REQUIRED_HEADER, PAYMENT_SIGNATURE_HEADER,
    PaymentRequiredBody, PaymentVerificationResult, ServiceUnavailableBody, VerifyRequest,
};

use crate::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use crate::health::HealthCache;

/// Ways a gated request can be denied.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No payment proof header on a gated request. Recoverable via the
    /// payment flow.
    #[error("Payment-Signature header is required")]
    PaymentMissing,
    /// The facilitator rejected the proof. The client must re-pay.
    #[error("Payment verification failed: {0}")]
    PaymentInvalid(String),
    /// The facilitator cannot be reached at all.
    #[error("Payment facilitator is unavailable")]
    FacilitatorUnavailable,
}

/// Server-side payment gate for one facilitator and payee.
///
/// Cheap to share behind an `Arc`; one instance serves any number of priced
/// routes.
#[derive(Debug)]
pub struct PaymentGate {
    facilitator: FacilitatorClient,
    health: HealthCache,
    mode: GateMode,
    recipient: String,
    token: String,
    instructions_text: String,
}

impl PaymentGate {
    const DEFAULT_INSTRUCTIONS_TEXT: &'static str =
        "Create a payment with the facilitator and retry with the Payment-Signature header";

    /// Builds a gate from configuration.
    pub fn from_config(config: &GateConfig) -> Result<Self, FacilitatorClientError> {
        let facilitator = FacilitatorClient::try_new(config.facilitator_url.clone())?
            .with_health_timeout(config.health_check.timeout);
        Ok(Self {
            facilitator,
            health: HealthCache::new(&config.health_check),
            mode: config.mode,
            recipient: config.recipient.clone(),
            token: config.token.clone(),
            instructions_text: Self::DEFAULT_INSTRUCTIONS_TEXT.to_string(),
        })
    }

    /// Returns the configured facilitator client.
    pub fn facilitator(&self) -> &FacilitatorClient {
        &self.facilitator
    }

    /// Returns the enforcement mode.
    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Overrides the free-text hint included in payment instructions.
    pub fn with_instructions_text(mut self, text: impl Into<String>) -> Self {
        self.instructions_text = text.into();
        self
    }

    /// Pure gating predicate.
    ///
    /// In bypass mode nothing is ever gated; otherwise the caller-supplied
    /// condition is returned verbatim. Call sites compute their own premium
    /// condition (say, a time-window threshold) independently of
    /// enforcement policy.
    pub fn should_gate(&self, condition: bool) -> bool {
        match self.mode {
            GateMode::Bypass => false,
            GateMode::Enforce => condition,
        }
    }

    /// Verifies the payment proof carried by a request, if any.
    ///
    /// A missing proof header is rejected without any network call. With a
    /// proof present, one facilitator verify call decides; any transport
    /// failure is a verification failure (deny), never a crashed request.
    pub async fn verify_payment(
        &self,
        headers: &HeaderMap,
        requirement: &PaymentRequirement,
    ) -> PaymentVerificationResult {
        if self.mode.is_bypass() {
            return PaymentVerificationResult::valid(None);
        }
        let signature = headers
            .get(PAYMENT_SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let Some(signature) = signature else {
            return PaymentVerificationResult::invalid(GateError::PaymentMissing.to_string());
        };
        let verify_request = VerifyRequest {
            signature,
            recipient: self.recipient.clone(),
            expected_amount: requirement.price,
            token: self.token.clone(),
            endpoint: requirement.endpoint.clone(),
            method: requirement.method.clone(),
        };
        match self.facilitator.verify(&verify_request).await {
            Ok(outcome) if outcome.verified => PaymentVerificationResult::valid(outcome.amount),
            Ok(outcome) => {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| "payment was not verified".to_string());
                #[cfg(feature = "telemetry")]
                tracing::debug!(%reason, "Facilitator rejected payment proof");
                PaymentVerificationResult::invalid(GateError::PaymentInvalid(reason).to_string())
            }
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %err, "Facilitator verify call failed");
                PaymentVerificationResult::invalid(format!(
                    "Payment verification failed: facilitator request failed: {err}"
                ))
            }
        }
    }

    /// Assembles payment instructions for a requirement.
    pub fn instructions_for(&self, requirement: &PaymentRequirement) -> PaymentInstructions {
        PaymentInstructions::for_requirement(
            requirement,
            &self.token,
            &self.recipient,
            self.facilitator.base_url().as_str(),
            &self.instructions_text,
        )
    }

    /// Builds the denial response for a gated request.
    ///
    /// Facilitator health is consulted first: while unhealthy this returns
    /// `503` with a `Retry-After` hint, never a 402 the client could not
    /// act on. While healthy it returns `402` with instructions in the
    /// `Payment-Required` header and mirrored in the JSON body.
    pub async fn payment_required_response(
        &self,
        requirement: &PaymentRequirement,
        reason: &str,
    ) -> Response {
        if !self.health.check(&self.facilitator).await {
            #[cfg(feature = "telemetry")]
            tracing::warn!("Facilitator unhealthy, answering 503 instead of 402");
            return self.service_unavailable_response();
        }
        let instructions = self.instructions_for(requirement);
        let body = PaymentRequiredBody {
            error: reason.to_string(),
            message: format!(
                "Payment of ${} {} is required for {} {}",
                requirement.price,
                PaymentInstructions::CURRENCY,
                requirement.method,
                requirement.endpoint
            ),
            description: requirement.description.clone(),
            payment: instructions.clone(),
        };
        let instructions_json =
            serde_json::to_string(&instructions).expect("instructions serialization failed");
        let header_value = HeaderValue::from_str(&instructions_json)
            .expect("instructions do not fit in a header value");
        let body_bytes = serde_json::to_vec(&body).expect("body serialization failed");
        Response::builder()
            .status(StatusCode::PAYMENT_REQUIRED)
            .header("Content-Type", "application/json")
            .header(PAYMENT_REQUIRED_HEADER, header_value)
            .body(Body::from(body_bytes))
            .expect("Fail to construct response")
    }

    fn service_unavailable_response(&self) -> Response {
        let body = ServiceUnavailableBody {
            error: GateError::FacilitatorUnavailable.to_string(),
            message: "The payment facilitator is unreachable. Try again later.".to_string(),
            retry_after: FACILITATOR_RETRY_AFTER_SECS,
            facilitator: self.facilitator.base_url().to_string(),
        };
        let body_bytes = serde_json::to_vec(&body).expect("body serialization failed");
        Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header("Content-Type", "application/json")
            .header("Retry-After", FACILITATOR_RETRY_AFTER_SECS)
            .body(Body::from(body_bytes))
            .expect("Fail to construct response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denlabs_x402_types::Price;
    use denlabs_x402_types::config::HealthCheckConfig;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(facilitator: &str, mode: GateMode) -> GateConfig {
        GateConfig::new(Url::parse(facilitator).unwrap(), "0xabc")
            .with_mode(mode)
            .with_health_check(HealthCheckConfig::default())
    }

    fn requirement() -> PaymentRequirement {
        PaymentRequirement {
            price: Price::parse("2").unwrap(),
            endpoint: "/premium".to_string(),
            method: "GET".to_string(),
            description: "Premium data".to_string(),
        }
    }

    #[test]
    fn should_gate_respects_mode_and_condition() {
        let enforce =
            PaymentGate::from_config(&config("https://facilitator.example", GateMode::Enforce))
                .unwrap();
        assert!(enforce.should_gate(true));
        assert!(!enforce.should_gate(false));

        let bypass =
            PaymentGate::from_config(&config("https://facilitator.example", GateMode::Bypass))
                .unwrap();
        assert!(!bypass.should_gate(true));
    }

    #[tokio::test]
    async fn missing_header_is_denied_without_network_call() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let gate =
            PaymentGate::from_config(&config(&mock_server.uri(), GateMode::Enforce)).unwrap();
        let result = gate
            .verify_payment(&HeaderMap::new(), &requirement())
            .await;
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("Payment-Signature"));
    }

    #[tokio::test]
    async fn bypass_mode_is_always_valid() {
        let gate =
            PaymentGate::from_config(&config("https://facilitator.example", GateMode::Bypass))
                .unwrap();
        let result = gate
            .verify_payment(&HeaderMap::new(), &requirement())
            .await;
        assert!(result.valid);
    }

    #[tokio::test]
    async fn facilitator_rejection_reason_is_surfaced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verified": false,
                "error": "signature expired",
            })))
            .mount(&mock_server)
            .await;

        let gate =
            PaymentGate::from_config(&config(&mock_server.uri(), GateMode::Enforce)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_SIGNATURE_HEADER, "sig-123".parse().unwrap());
        let result = gate.verify_payment(&headers, &requirement()).await;
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("signature expired"));
    }

    #[tokio::test]
    async fn unreachable_facilitator_is_denied_not_crashed() {
        let gate = PaymentGate::from_config(&config("http://127.0.0.1:1", GateMode::Enforce))
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(PAYMENT_SIGNATURE_HEADER, "sig-123".parse().unwrap());
        let result = gate.verify_payment(&headers, &requirement()).await;
        assert!(!result.valid);
        assert!(result.error.is_some());
    }
}
