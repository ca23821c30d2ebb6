//! Extension traits for attaching [`X402Payments`] to a reqwest client.

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

use crate::middleware::X402Payments;

/// Attaches payment handling to a [`Client`] or [`ClientBuilder`].
pub trait ReqwestWithPayments<A> {
    fn with_payments(self, payments: X402Payments) -> ReqwestWithPaymentsBuilder<A>;
}

impl ReqwestWithPayments<Client> for Client {
    fn with_payments(self, payments: X402Payments) -> ReqwestWithPaymentsBuilder<Client> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            payments,
        }
    }
}

impl ReqwestWithPayments<ClientBuilder> for ClientBuilder {
    fn with_payments(self, payments: X402Payments) -> ReqwestWithPaymentsBuilder<ClientBuilder> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            payments,
        }
    }
}

/// Intermediate holder pairing a reqwest client with the payments
/// middleware.
pub struct ReqwestWithPaymentsBuilder<A> {
    inner: A,
    payments: X402Payments,
}

/// Finalizes a [`ReqwestWithPaymentsBuilder`] into a middleware-enabled
/// client.
pub trait ReqwestWithPaymentsBuild {
    type BuildResult;
    type BuilderResult;

    fn build(self) -> Self::BuildResult;
    fn builder(self) -> Self::BuilderResult;
}

impl ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<Client> {
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(self.payments)
    }
}

impl ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<ClientBuilder> {
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        let builder = self.builder()?;
        Ok(builder.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.payments))
    }
}
