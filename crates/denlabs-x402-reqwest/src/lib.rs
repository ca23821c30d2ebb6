#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Reqwest middleware for automatic DenLabs x402 payment handling.
//!
//! This crate provides an [`X402Payments`] middleware for
//! `reqwest_middleware`. When a request receives a `402 Payment Required`
//! response, the middleware parses the payment instructions from the
//! `Payment-Required` header, asks a [`PaymentConfirmer`] whether the charge
//! is acceptable, creates the payment with the facilitator named in the
//! instructions, and retries the request once with the resulting
//! `Payment-Signature` header.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use denlabs_x402_reqwest::{AutoApprove, ReqwestWithPayments, ReqwestWithPaymentsBuild, X402Payments};
//! use denlabs_x402_types::Price;
//! use reqwest::Client;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new()
//!     .with_payments(
//!         X402Payments::with_confirmer(AutoApprove)
//!             .max_price(Price::parse("5")?),
//!     )
//!     .build();
//!
//! // Payments are handled automatically
//! let response = client
//!     .get("https://api.example.com/premium")
//!     .send()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Confirmation
//!
//! [`AutoApprove`] pays without asking; interactive clients use
//! [`DeferredConfirmer`] and resolve each [`PendingConfirmation`] from their
//! own UI loop. Either way the middleware waits at most
//! [`X402Payments::DEFAULT_CONFIRM_TIMEOUT`] for a verdict.
//!
//! ## Spending bounds
//!
//! [`X402Payments::max_price`] caps what the middleware will ever pay;
//! instructions above the cap fail the request with
//! [`PaymentError::PriceTooLarge`] before any money moves.

pub mod builder;
pub mod confirm;
pub mod facilitator;
pub mod middleware;

pub use builder::{ReqwestWithPayments, ReqwestWithPaymentsBuild, ReqwestWithPaymentsBuilder};
pub use confirm::{
    AutoApprove, ConfirmDecision, DeferredConfirmer, PaymentConfirmer, PendingConfirmation,
};
pub use facilitator::{CreateClient, CreateError};
pub use middleware::{PaymentError, X402Payments};
