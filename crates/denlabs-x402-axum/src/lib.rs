//! Axum middleware enforcing DenLabs x402 payments on premium routes.
//!
//! This crate provides an [`X402Gate`] layer for protecting routes with
//! payment enforcement, a [`FacilitatorClient`] for talking to the remote
//! facilitator, and a TTL [`HealthCache`] so the gate can answer `503` when
//! the payment backend is down instead of demanding a payment the client
//! cannot complete.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, Json};
//! use axum::response::IntoResponse;
//! use http::StatusCode;
//! use serde_json::json;
//! use denlabs_x402_axum::X402Gate;
//! use denlabs_x402_types::{GateConfig, Price};
//!
//! let config = GateConfig::from_env().unwrap();
//! let gate = X402Gate::from_config(&config).unwrap();
//!
//! let app: Router = Router::new().route(
//!     "/api/labs/demo/activity",
//!     get(activity).layer(
//!         gate.with_price(Price::parse("2").unwrap())
//!             .with_description("7-day activity window"),
//!     ),
//! );
//!
//! async fn activity() -> impl IntoResponse {
//!     (StatusCode::OK, Json(json!({ "events": [] })))
//! }
//! ```
//!
//! ## Responses
//!
//! - Missing or invalid payment proof: `402` with machine-readable
//!   instructions in the `Payment-Required` header and a JSON body.
//! - Facilitator unreachable: `503` with a `Retry-After` hint - never a 402
//!   the client could not act on.
//! - Valid proof: the wrapped handler's response, unchanged.
//!
//! Routes whose premium condition is dynamic (say, a time-window threshold)
//! can pass a predicate via [`X402GateLayer::with_gate_when`].

pub mod facilitator_client;
pub mod gate;
pub mod health;
pub mod layer;

pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
pub use gate::{GateError, PaymentGate};
pub use health::HealthCache;
pub use layer::{X402Gate, X402GateLayer};
