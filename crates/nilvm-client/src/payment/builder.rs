//! Payment client construction from a signer

use super::chain::SignerChain;
use super::client::{PaymentClient, PaymentClientConfig};
use ed25519_dalek::VerifyingKey;
use nilvm_core::effects::{Broadcaster, NodeTransport, Signer};
use nilvm_core::{NilError, PaymentMode, Result, UserId};
use std::sync::Arc;

/// Builds a [`PaymentClient`] paying from the signer's first account
pub struct PaymentClientBuilder {
    signer: Arc<dyn Signer>,
    broadcaster: Arc<dyn Broadcaster>,
    leader: Arc<dyn NodeTransport>,
    user_id: UserId,
    payment_mode: PaymentMode,
    leader_public_key: Option<VerifyingKey>,
}

impl PaymentClientBuilder {
    /// Start a builder for `user_id`, settling through `leader`
    pub fn new(
        signer: Arc<dyn Signer>,
        broadcaster: Arc<dyn Broadcaster>,
        leader: Arc<dyn NodeTransport>,
        user_id: UserId,
    ) -> Self {
        Self {
            signer,
            broadcaster,
            leader,
            user_id,
            payment_mode: PaymentMode::default(),
            leader_public_key: None,
        }
    }

    /// Settle operations with `mode`
    pub fn payment_mode(mut self, mode: PaymentMode) -> Self {
        self.payment_mode = mode;
        self
    }

    /// Verify quotes against the leader's key
    pub fn leader_public_key(mut self, key: Option<VerifyingKey>) -> Self {
        self.leader_public_key = key;
        self
    }

    /// Resolve the paying account and build the client
    pub async fn build(self) -> Result<PaymentClient> {
        let account = self
            .signer
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NilError::chain("No accounts on the signer"))?;

        tracing::debug!(address = %account.address, mode = ?self.payment_mode, "Payment account resolved");
        let chain = SignerChain::new(self.signer, self.broadcaster, account.address.clone());
        Ok(PaymentClient::new(PaymentClientConfig {
            user_id: self.user_id,
            address: account.address,
            chain: Arc::new(chain),
            leader: self.leader,
            payment_mode: self.payment_mode,
            leader_public_key: self.leader_public_key,
        }))
    }
}
