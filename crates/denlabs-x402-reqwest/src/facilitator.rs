//! Client for the facilitator's `POST ./create` endpoint.
//!
//! The client side of the protocol only ever creates payments; verification
//! is the server's business. The facilitator URL is taken from the payment
//! instructions of each 402 response, so a [`CreateClient`] is constructed
//! per payment rather than held long-term.

use http::StatusCode;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use denlabs_x402_types::instructions::PaymentInstructions;
use denlabs_x402_types::wire::{CreatePaymentRequest, CreatePaymentResponse};

/// Errors that can occur while creating a payment with the facilitator.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// A client for one facilitator's `./create` endpoint.
#[derive(Clone, Debug)]
pub struct CreateClient {
    create_url: Url,
    client: Client,
    timeout: Duration,
}

impl CreateClient {
    /// Default bound on the create call.
    pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Builds a client for the facilitator named in payment instructions.
    ///
    /// The instructions' facilitator URL is normalized to a single trailing
    /// slash before `./create` is joined onto it.
    pub fn for_instructions(
        client: Client,
        instructions: &PaymentInstructions,
    ) -> Result<Self, CreateError> {
        let mut normalized = instructions.facilitator.trim_end_matches('/').to_string();
        normalized.push('/');
        let base_url = Url::parse(&normalized).map_err(|e| CreateError::UrlParse {
            context: "Failed to parse facilitator url",
            source: e,
        })?;
        let create_url = base_url
            .join("./create")
            .map_err(|e| CreateError::UrlParse {
                context: "Failed to construct ./create URL",
                source: e,
            })?;
        Ok(Self {
            create_url,
            client,
            timeout: Self::DEFAULT_CREATE_TIMEOUT,
        })
    }

    /// Returns the computed `./create` URL.
    pub fn create_url(&self) -> &Url {
        &self.create_url
    }

    /// Sets the bound on the create call.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = timeout;
        this
    }

    /// Sends a `POST /create` request to the facilitator.
    pub async fn create(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, CreateError> {
        let context = "POST /create";
        let http_response = self
            .client
            .post(self.create_url.clone())
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CreateError::Http { context, source: e })?;

        if http_response.status() == StatusCode::OK {
            http_response
                .json::<CreatePaymentResponse>()
                .await
                .map_err(|e| CreateError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| CreateError::ResponseBodyRead { context, source: e })?;
            Err(CreateError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denlabs_x402_types::instructions::PaymentRequirement;
    use denlabs_x402_types::price::Price;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn instructions(facilitator: &str) -> PaymentInstructions {
        let requirement = PaymentRequirement {
            price: Price::parse("2").unwrap(),
            endpoint: "/premium".to_string(),
            method: "GET".to_string(),
            description: "Premium data".to_string(),
        };
        PaymentInstructions::for_requirement(&requirement, "USDC", "0xabc", facilitator, "")
    }

    fn create_request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: Price::parse("2").unwrap(),
            token: "USDC".to_string(),
            recipient: "0xabc".to_string(),
            endpoint: "/premium".to_string(),
            method: "GET".to_string(),
            description: "Premium data".to_string(),
        }
    }

    #[test]
    fn normalizes_the_facilitator_url() {
        let client =
            CreateClient::for_instructions(Client::new(), &instructions("https://f.example//"))
                .unwrap();
        assert_eq!(client.create_url().as_str(), "https://f.example/create");
    }

    #[tokio::test]
    async fn create_posts_and_parses_the_payment() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .and(body_partial_json(serde_json::json!({
                "amount": 2.0,
                "recipient": "0xabc",
                "endpoint": "/premium",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signature": "sig-123",
                "amount": 2,
                "token": "USDC",
                "timestamp": 1700000000,
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client =
            CreateClient::for_instructions(Client::new(), &instructions(&mock_server.uri()))
                .unwrap();
        let payment = client.create(&create_request()).await.unwrap();
        assert_eq!(payment.signature, "sig-123");
        assert_eq!(payment.amount, Price::parse("2").unwrap());
    }

    #[tokio::test]
    async fn non_200_is_an_http_status_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create"))
            .respond_with(ResponseTemplate::new(402).set_body_string("insufficient funds"))
            .mount(&mock_server)
            .await;

        let client =
            CreateClient::for_instructions(Client::new(), &instructions(&mock_server.uri()))
                .unwrap();
        let err = client.create(&create_request()).await.unwrap_err();
        assert!(matches!(
            err,
            CreateError::HttpStatus {
                status: StatusCode::PAYMENT_REQUIRED,
                ..
            }
        ));
    }
}
