//! Tower layer wiring the payment gate into Axum routes.
//!
//! An [`X402Gate`] is created once per application from a [`GateConfig`] and
//! handed out per route via [`X402Gate::with_price`], which yields a
//! [`X402GateLayer`] that can be further configured with a description and a
//! per-request gating predicate.
//!
//! Per request the resulting service builds a [`PaymentRequirement`] from
//! the configured price plus the request's path, query, and method, then
//! either forwards to the wrapped handler (valid proof, bypass mode, or
//! predicate says free tier) or answers with the gate's 402/503 denial.

use axum_core::extract::Request;
use axum_core::response::Response;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use denlabs_x402_types::config::GateConfig;
use denlabs_x402_types::instructions::PaymentRequirement;
use denlabs_x402_types::price::Price;

use crate::facilitator_client::FacilitatorClientError;
use crate::gate::PaymentGate;

/// Per-request premium condition, evaluated before any payment enforcement.
type GatePredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// The main gate handle for enforcing x402 payments on routes.
///
/// Create a single instance per application and use it to build payment
/// layers for priced routes.
#[derive(Clone)]
pub struct X402Gate {
    gate: Arc<PaymentGate>,
}

impl X402Gate {
    /// Builds a gate handle from configuration.
    pub fn from_config(config: &GateConfig) -> Result<Self, FacilitatorClientError> {
        Ok(Self::new(PaymentGate::from_config(config)?))
    }

    /// Wraps an already-built [`PaymentGate`].
    pub fn new(gate: PaymentGate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }

    /// Returns the underlying gate.
    pub fn gate(&self) -> &Arc<PaymentGate> {
        &self.gate
    }

    /// Sets the price for a protected route, yielding a layer builder.
    pub fn with_price(&self, price: Price) -> X402GateLayer {
        X402GateLayer {
            gate: self.gate.clone(),
            price,
            description: String::new(),
            gate_when: None,
        }
    }
}

/// Builder for configuring the gate layer of one route.
#[derive(Clone)]
pub struct X402GateLayer {
    gate: Arc<PaymentGate>,
    price: Price,
    description: String,
    gate_when: Option<GatePredicate>,
}

impl X402GateLayer {
    /// Sets a description of what the payment grants access to.
    ///
    /// This is included in 402 responses to inform clients what they're
    /// paying for.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets a per-request premium condition.
    ///
    /// When the predicate returns false the request is served without any
    /// payment enforcement. Lets a route gate only its premium tier, e.g.
    /// activity queries above a time-window threshold.
    pub fn with_gate_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.gate_when = Some(Arc::new(predicate));
        self
    }
}

impl<S> Layer<S> for X402GateLayer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = X402GateService;

    fn layer(&self, inner: S) -> Self::Service {
        X402GateService {
            gate: self.gate.clone(),
            price: self.price,
            description: self.description.clone(),
            gate_when: self.gate_when.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces x402 payments on incoming requests.
#[derive(Clone)]
pub struct X402GateService {
    gate: Arc<PaymentGate>,
    price: Price,
    description: String,
    gate_when: Option<GatePredicate>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl Service<Request> for X402GateService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Intercepts the request and enforces payment before forwarding.
    fn call(&mut self, req: Request) -> Self::Future {
        let gate = self.gate.clone();
        let mut inner = self.inner.clone();
        let price = self.price;
        let description = self.description.clone();
        let gate_when = self.gate_when.clone();
        Box::pin(async move {
            let condition = gate_when.as_ref().is_none_or(|predicate| predicate(&req));
            if !gate.should_gate(condition) {
                return inner.call(req).await;
            }
            let endpoint = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.uri().path().to_string());
            let requirement = PaymentRequirement {
                price,
                endpoint,
                method: req.method().to_string(),
                description,
            };
            let result = gate.verify_payment(req.headers(), &requirement).await;
            if result.valid {
                inner.call(req).await
            } else {
                let reason = result.error.as_deref().unwrap_or("Payment required");
                Ok(gate.payment_required_response(&requirement, reason).await)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use http::StatusCode;
    use tower::ServiceExt;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use denlabs_x402_types::config::GateMode;
    use denlabs_x402_types::instructions::{PaymentInstructions, PaymentRequirement};
    use denlabs_x402_types::wire::{
        PAYMENT_REQUIRED_HEADER, PAYMENT_SIGNATURE_HEADER, PaymentRequiredBody,
        ServiceUnavailableBody,
    };

    const ACTIVITY_URI: &str = "/api/labs/demo/activity?window=168h";

    fn gate_config(facilitator: &str, mode: GateMode) -> GateConfig {
        GateConfig::new(Url::parse(facilitator).unwrap(), "0xabc").with_mode(mode)
    }

    fn app(gate: &X402Gate) -> Router {
        Router::new().route(
            "/api/labs/demo/activity",
            get(|| async { "activity data" }).layer(
                gate.with_price(Price::parse("2").unwrap())
                    .with_description("7-day activity window"),
            ),
        )
    }

    async fn send(app: &Router, uri: &str, signature: Option<&str>) -> http::Response<Body> {
        let mut request = http::Request::builder().uri(uri).method("GET");
        if let Some(signature) = signature {
            request = request.header(PAYMENT_SIGNATURE_HEADER, signature);
        }
        app.clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: http::Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn missing_proof_yields_402_with_instructions() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let gate =
            X402Gate::from_config(&gate_config(&mock_server.uri(), GateMode::Enforce)).unwrap();
        let app = app(&gate);

        let response = send(&app, ACTIVITY_URI, None).await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let header_value = response
            .headers()
            .get(PAYMENT_REQUIRED_HEADER)
            .expect("instructions header present")
            .to_str()
            .unwrap()
            .to_string();
        let instructions: PaymentInstructions = serde_json::from_str(&header_value).unwrap();
        assert_eq!(instructions.price, Price::parse("2").unwrap());
        assert_eq!(instructions.endpoint, ACTIVITY_URI);
        assert_eq!(instructions.method, "GET");
        assert_eq!(instructions.recipient, "0xabc");

        let body: PaymentRequiredBody =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body.payment.price, Price::parse("2").unwrap());
        assert_eq!(body.description, "7-day activity window");
    }

    #[tokio::test]
    async fn unhealthy_facilitator_yields_503_never_402() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verified": false,
                "error": "bad signature",
            })))
            .mount(&mock_server)
            .await;

        let gate =
            X402Gate::from_config(&gate_config(&mock_server.uri(), GateMode::Enforce)).unwrap();
        let app = app(&gate);

        // Without a proof header
        let response = send(&app, ACTIVITY_URI, None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "30");
        let body: ServiceUnavailableBody =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body.retry_after, 30);

        // With a proof header the facilitator rejects
        let response = send(&app, ACTIVITY_URI, Some("sig-123")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn forged_proof_is_denied_idempotently() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verified": false,
                "error": "unknown signature",
            })))
            .expect(2)
            .mount(&mock_server)
            .await;

        let gate =
            X402Gate::from_config(&gate_config(&mock_server.uri(), GateMode::Enforce)).unwrap();
        let app = app(&gate);

        for _ in 0..2 {
            let response = send(&app, ACTIVITY_URI, Some("forged")).await;
            assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        }
    }

    #[tokio::test]
    async fn valid_proof_serves_the_resource() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(serde_json::json!({
                "signature": "sig-123",
                "endpoint": ACTIVITY_URI,
                "method": "GET",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "verified": true,
                "amount": 2,
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gate =
            X402Gate::from_config(&gate_config(&mock_server.uri(), GateMode::Enforce)).unwrap();
        let app = app(&gate);

        let response = send(&app, ACTIVITY_URI, Some("sig-123")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"activity data");
    }

    #[tokio::test]
    async fn bypass_mode_serves_everything_without_facilitator() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let gate =
            X402Gate::from_config(&gate_config(&mock_server.uri(), GateMode::Bypass)).unwrap();
        let app = app(&gate);

        let response = send(&app, ACTIVITY_URI, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, ACTIVITY_URI, Some("whatever")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn gate_when_predicate_exempts_free_tier() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let gate =
            X402Gate::from_config(&gate_config(&mock_server.uri(), GateMode::Enforce)).unwrap();
        let app = Router::new().route(
            "/api/labs/demo/activity",
            get(|| async { "activity data" }).layer(
                gate.with_price(Price::parse("2").unwrap())
                    .with_gate_when(|req: &Request| {
                        req.uri().query().is_some_and(|q| q.contains("window=168h"))
                    }),
            ),
        );

        // Free tier: short window, no payment enforcement
        let response = send(&app, "/api/labs/demo/activity?window=24h", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Premium tier: gated
        let response = send(&app, ACTIVITY_URI, None).await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn requirement_types_are_shared_with_the_client() {
        // The layer and the client crate agree on the wire shape.
        let requirement = PaymentRequirement {
            price: Price::parse("2").unwrap(),
            endpoint: ACTIVITY_URI.to_string(),
            method: "GET".to_string(),
            description: String::new(),
        };
        let json = serde_json::to_value(&requirement).unwrap();
        assert_eq!(json["endpoint"], ACTIVITY_URI);
    }
}
