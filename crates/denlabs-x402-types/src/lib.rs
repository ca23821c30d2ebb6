//! Core types for the DenLabs x402 payment gating protocol.
//!
//! This crate provides the shared vocabulary for the two halves of the
//! protocol: the server-side payment gate (`denlabs-x402-axum`) and the
//! client-side retry wrapper (`denlabs-x402-reqwest`).
//!
//! # Overview
//!
//! A gated endpoint responds `402 Payment Required` with machine-readable
//! [`PaymentInstructions`] in the [`wire::PAYMENT_REQUIRED_HEADER`] response
//! header. The client obtains a payment signature from the facilitator and
//! retries the request with that signature in the
//! [`wire::PAYMENT_SIGNATURE_HEADER`] header, which the server verifies
//! against the facilitator before serving the resource.
//!
//! All of these types are transient: they live in HTTP headers and request
//! scope, never in application-owned storage.
//!
//! # Modules
//!
//! - [`config`] - Gate configuration and environment variable resolution
//! - [`instructions`] - Payment requirements and wire instructions
//! - [`price`] - Positive USD decimal amounts
//! - [`wire`] - Facilitator messages, response bodies, and header names

pub mod config;
pub mod instructions;
pub mod price;
pub mod wire;

pub use config::{GateConfig, GateMode, HealthCheckConfig};
pub use instructions::{InstructionsError, PaymentInstructions, PaymentRequirement};
pub use price::Price;
