//! Payment requirements and wire instructions.
//!
//! A [`PaymentRequirement`] is the server's request-scoped description of
//! what a gated endpoint costs. A [`PaymentInstructions`] is the payload the
//! server sends back with a 402 response: the requirement plus everything
//! the client needs to actually pay (token, recipient, facilitator).

use serde::{Deserialize, Serialize};

use crate::price::Price;

/// The price attached to a gated resource, constructed per request.
///
/// Never persisted: the requirement is built by the route's gate from its
/// configured price plus the incoming request's path, query, and method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Price in USD. Strictly positive by construction of [`Price`].
    pub price: Price,
    /// The gated resource identity: request path plus query string.
    pub endpoint: String,
    /// HTTP method of the gated request.
    pub method: String,
    /// Human-readable reason for the charge.
    pub description: String,
}

/// Machine-readable payment instructions, sent with every 402 response.
///
/// Serialized as a plain JSON string into the `Payment-Required` response
/// header and mirrored in the 402 JSON body. Created fresh per response;
/// never cached by either side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    /// Price in USD.
    pub price: Price,
    /// Settlement currency. Always [`PaymentInstructions::CURRENCY`].
    pub currency: String,
    /// Payment token symbol (e.g. "USDC").
    pub token: String,
    /// Payee wallet address.
    pub recipient: String,
    /// The gated resource identity: request path plus query string.
    pub endpoint: String,
    /// HTTP method of the gated request.
    pub method: String,
    /// Human-readable reason for the charge.
    pub description: String,
    /// Base URL of the facilitator that creates and verifies payments.
    pub facilitator: String,
    /// Free-text hint for the payer.
    pub instructions: String,
}

/// Errors reported by [`PaymentInstructions::validate`].
#[derive(Debug, thiserror::Error)]
pub enum InstructionsError {
    /// The recipient address is empty, so the client has nobody to pay.
    #[error("Payment instructions carry no recipient address")]
    MissingRecipient,
    /// The facilitator URL is empty, so the client cannot create a payment.
    #[error("Payment instructions carry no facilitator URL")]
    MissingFacilitator,
}

impl PaymentInstructions {
    /// The fixed settlement currency of the protocol.
    pub const CURRENCY: &'static str = "USD";

    /// Assembles instructions for a requirement.
    pub fn for_requirement(
        requirement: &PaymentRequirement,
        token: impl Into<String>,
        recipient: impl Into<String>,
        facilitator: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            price: requirement.price,
            currency: Self::CURRENCY.to_string(),
            token: token.into(),
            recipient: recipient.into(),
            endpoint: requirement.endpoint.clone(),
            method: requirement.method.clone(),
            description: requirement.description.clone(),
            facilitator: facilitator.into(),
            instructions: instructions.into(),
        }
    }

    /// Checks the invariants a client relies on before attempting payment.
    ///
    /// The price is already guaranteed positive by [`Price`]; this checks
    /// that the recipient and facilitator are non-empty.
    pub fn validate(&self) -> Result<(), InstructionsError> {
        if self.recipient.trim().is_empty() {
            return Err(InstructionsError::MissingRecipient);
        }
        if self.facilitator.trim().is_empty() {
            return Err(InstructionsError::MissingFacilitator);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement() -> PaymentRequirement {
        PaymentRequirement {
            price: Price::parse("2").unwrap(),
            endpoint: "/api/labs/demo/activity?window=168h".to_string(),
            method: "GET".to_string(),
            description: "7-day activity window".to_string(),
        }
    }

    #[test]
    fn instructions_echo_the_requirement() {
        let instructions = PaymentInstructions::for_requirement(
            &requirement(),
            "USDC",
            "0xabc",
            "https://facilitator.example",
            "Pay and retry",
        );
        assert_eq!(instructions.currency, "USD");
        assert_eq!(instructions.endpoint, "/api/labs/demo/activity?window=168h");
        assert_eq!(instructions.method, "GET");
        assert!(instructions.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_recipient_and_facilitator() {
        let mut instructions = PaymentInstructions::for_requirement(
            &requirement(),
            "USDC",
            "",
            "https://facilitator.example",
            "",
        );
        assert!(matches!(
            instructions.validate(),
            Err(InstructionsError::MissingRecipient)
        ));
        instructions.recipient = "0xabc".to_string();
        instructions.facilitator = "".to_string();
        assert!(matches!(
            instructions.validate(),
            Err(InstructionsError::MissingFacilitator)
        ));
    }

    #[test]
    fn wire_form_is_camel_case_with_numeric_price() {
        let instructions = PaymentInstructions::for_requirement(
            &requirement(),
            "USDC",
            "0xabc",
            "https://facilitator.example",
            "Pay and retry",
        );
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&instructions).unwrap()).unwrap();
        assert_eq!(json["price"], serde_json::json!(2.0));
        assert_eq!(json["currency"], "USD");
        assert_eq!(json["recipient"], "0xabc");
        assert_eq!(json["facilitator"], "https://facilitator.example");
    }
}
