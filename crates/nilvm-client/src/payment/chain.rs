//! Payment chain adapter over an explicit signer

use async_trait::async_trait;
use nilvm_core::effects::{Broadcaster, ChainMessage, PaymentChain, SignDoc, Signer};
use nilvm_core::{ChainAddress, MsgPayFor, NilError, Result, TxHash, MSG_PAY_FOR_TYPE_URL};
use std::sync::Arc;

/// Pays for resources by signing a `MsgPayFor` transaction and broadcasting it
pub struct SignerChain {
    signer: Arc<dyn Signer>,
    broadcaster: Arc<dyn Broadcaster>,
    address: ChainAddress,
}

impl SignerChain {
    /// Pay from `address`, which must be one of the signer's accounts
    pub fn new(
        signer: Arc<dyn Signer>,
        broadcaster: Arc<dyn Broadcaster>,
        address: ChainAddress,
    ) -> Self {
        Self {
            signer,
            broadcaster,
            address,
        }
    }

    /// Paying account
    pub fn address(&self) -> &ChainAddress {
        &self.address
    }
}

#[async_trait]
impl PaymentChain for SignerChain {
    async fn pay_for(&self, message: MsgPayFor) -> Result<TxHash> {
        if message.from_address != self.address {
            return Err(NilError::chain(format!(
                "payment from {} cannot be signed by {}",
                message.from_address, self.address
            )));
        }

        let doc = SignDoc {
            signer: self.address.clone(),
            messages: vec![ChainMessage {
                type_url: MSG_PAY_FOR_TYPE_URL.to_string(),
                value: bincode::serialize(&message)?,
            }],
            memo: String::new(),
        };
        let tx = self.signer.sign_direct(&doc).await?;
        let hash = self.broadcaster.broadcast(&tx).await?;
        tracing::debug!(address = %self.address, tx_hash = %hash, "Broadcast payment");
        Ok(hash)
    }
}
