//! Payment confirmation strategies.
//!
//! Before the middleware spends money it asks a [`PaymentConfirmer`] whether
//! the charge described by the server's instructions is acceptable.
//! [`AutoApprove`] is the strategy for unattended clients; interactive
//! clients use [`DeferredConfirmer`] and resolve each
//! [`PendingConfirmation`] from their own UI loop.

use tokio::sync::{mpsc, oneshot};

use denlabs_x402_types::instructions::PaymentInstructions;

/// Verdict on a proposed payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    /// Pay and retry the request.
    Approved,
    /// Do not pay; the request fails with a cancellation error.
    Declined,
}

/// Decides whether a proposed payment should go ahead.
///
/// Implementations must not assume they are consulted at most once per
/// request: every distinct 402 consults the confirmer again, even for an
/// endpoint that was approved before.
#[async_trait::async_trait]
pub trait PaymentConfirmer: Send + Sync {
    async fn confirm(&self, instructions: &PaymentInstructions) -> ConfirmDecision;
}

/// Approves every payment without interaction.
///
/// Price safety comes from the middleware's max-price bound, which is
/// enforced before the confirmer is consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait::async_trait]
impl PaymentConfirmer for AutoApprove {
    async fn confirm(&self, _instructions: &PaymentInstructions) -> ConfirmDecision {
        ConfirmDecision::Approved
    }
}

/// A payment awaiting an interactive verdict.
///
/// Dropping the confirmation without answering declines it; a pending
/// request must never hang on a dialog the user dismissed.
#[derive(Debug)]
pub struct PendingConfirmation {
    instructions: PaymentInstructions,
    respond: oneshot::Sender<ConfirmDecision>,
}

impl PendingConfirmation {
    /// The charge awaiting a verdict.
    pub fn instructions(&self) -> &PaymentInstructions {
        &self.instructions
    }

    /// Approves the payment.
    pub fn approve(self) {
        let _ = self.respond.send(ConfirmDecision::Approved);
    }

    /// Declines the payment.
    pub fn decline(self) {
        let _ = self.respond.send(ConfirmDecision::Declined);
    }
}

/// Routes each proposed payment to an external resolver.
///
/// The middleware side blocks (bounded by the confirmation timeout) until
/// the paired [`PendingConfirmation`] is resolved or dropped.
#[derive(Debug, Clone)]
pub struct DeferredConfirmer {
    tx: mpsc::UnboundedSender<PendingConfirmation>,
}

impl DeferredConfirmer {
    /// Creates a confirmer and the receiving end its verdicts come from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PendingConfirmation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl PaymentConfirmer for DeferredConfirmer {
    async fn confirm(&self, instructions: &PaymentInstructions) -> ConfirmDecision {
        let (respond, verdict) = oneshot::channel();
        let pending = PendingConfirmation {
            instructions: instructions.clone(),
            respond,
        };
        if self.tx.send(pending).is_err() {
            // Resolver has gone away
            return ConfirmDecision::Declined;
        }
        verdict.await.unwrap_or(ConfirmDecision::Declined)
    }
}
