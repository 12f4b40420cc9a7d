//! Payment gate for priced operations
//!
//! Every priced operation is preceded by a quote from the leader, an optional
//! on-chain payment and a validation step that yields the signed receipt sent
//! to the nodes.

use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use nilvm_core::effects::{NodeTransport, PaymentChain, PaymentsRpc};
use nilvm_core::messages::{AddFundsRequest, PaymentReceiptRequest};
use nilvm_core::{
    AccountBalance, AddFundsPayload, ChainAddress, Coin, MsgPayFor, NilError, PaymentMode,
    PaymentsConfig, PriceQuote, PriceQuoteRequest, Result, RpcCode, SignedQuote, SignedReceipt,
    TxHash, UserId,
};
use rand::RngCore;
use std::sync::Arc;

const INSUFFICIENT_BALANCE: &str = "insufficient balance";

/// A decoded quote together with the signed form sent back to the leader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Decoded quote
    pub quote: PriceQuote,
    /// Signed quote as returned by the leader
    pub signed: SignedQuote,
}

/// Everything a [`PaymentClient`] needs
#[derive(Clone)]
pub struct PaymentClientConfig {
    /// User paying for operations
    pub user_id: UserId,
    /// Chain account paying for operations
    pub address: ChainAddress,
    /// Payment chain access
    pub chain: Arc<dyn PaymentChain>,
    /// Transport to the cluster leader
    pub leader: Arc<dyn NodeTransport>,
    /// How operations are settled
    pub payment_mode: PaymentMode,
    /// Key the leader signs quotes with, when known
    pub leader_public_key: Option<VerifyingKey>,
}

/// Obtains payment receipts from the cluster leader
pub struct PaymentClient {
    config: PaymentClientConfig,
}

impl PaymentClient {
    /// Create a payment client
    pub fn new(config: PaymentClientConfig) -> Self {
        Self { config }
    }

    /// Payment mode in effect
    pub fn payment_mode(&self) -> PaymentMode {
        self.config.payment_mode
    }

    /// Chain account paying for operations
    pub fn address(&self) -> &ChainAddress {
        &self.config.address
    }

    /// Quote, pay and validate one operation
    ///
    /// When drawing from the balance and the leader reports an insufficient
    /// balance, the quote is paid on chain once and validated again.
    pub async fn pay_for_operation(&self, request: PriceQuoteRequest) -> Result<SignedReceipt> {
        let quote = self.quote(&request).await?;

        let tx_hash = match self.config.payment_mode {
            PaymentMode::FromBalance => None,
            PaymentMode::PayPerOperation => Some(self.pay_on_chain(&quote).await?),
        };
        let paid_on_chain = tx_hash.is_some();

        match self.validate(&quote, tx_hash).await {
            Ok(receipt) => Ok(receipt),
            Err(err) if !paid_on_chain && is_insufficient_balance(&err) => {
                tracing::warn!(
                    operation = request.kind(),
                    error = %err,
                    "Balance too low, paying on chain"
                );
                let tx_hash = self.pay_on_chain(&quote).await?;
                self.validate(&quote, Some(tx_hash))
                    .await
                    .map_err(into_insufficient_balance)
            }
            Err(err) => Err(into_insufficient_balance(err)),
        }
    }

    /// Ask the leader to price `request` and check the answer
    pub async fn quote(&self, request: &PriceQuoteRequest) -> Result<Quote> {
        let signed = self.config.leader.price_quote(request).await?;

        if signed.signature.is_empty() {
            return Err(NilError::quote_mismatch("quote is not signed"));
        }
        if let Some(key) = &self.config.leader_public_key {
            let signature = Signature::from_slice(&signed.signature)
                .map_err(|e| NilError::quote_mismatch(format!("malformed quote signature: {e}")))?;
            key.verify(&signed.quote, &signature)
                .map_err(|_| NilError::quote_mismatch("quote signature does not verify"))?;
        }

        let quote = signed.decode()?;
        if quote.request != *request {
            return Err(NilError::quote_mismatch(format!(
                "leader quoted a {} request, asked for {}",
                quote.request.kind(),
                request.kind()
            )));
        }
        if quote.is_expired(Utc::now()) {
            return Err(NilError::quote_mismatch(format!(
                "quote expired at {}",
                quote.expires_at
            )));
        }

        tracing::info!(
            operation = request.kind(),
            total = quote.fees.total,
            "Quoted {} unil",
            quote.fees.total
        );
        Ok(Quote { quote, signed })
    }

    /// Pay the quoted amount on chain, using the quote nonce as resource
    pub async fn pay_on_chain(&self, quote: &Quote) -> Result<TxHash> {
        let amount = quote.quote.fees.total;
        let message = MsgPayFor {
            from_address: self.config.address.clone(),
            resource: quote.quote.nonce.clone(),
            amount: vec![Coin::unil(amount)],
        };

        let hash = self.config.chain.pay_for(message).await?;
        tracing::info!(amount, tx_hash = %hash, "Paid on chain");
        Ok(hash)
    }

    /// Exchange the quote (and payment, if any) for a signed receipt
    pub async fn validate(&self, quote: &Quote, tx_hash: Option<TxHash>) -> Result<SignedReceipt> {
        let request = PaymentReceiptRequest {
            signed_quote: quote.signed.clone(),
            tx_hash,
        };
        let receipt = self.config.leader.payment_receipt(&request).await?;
        tracing::info!(
            operation = quote.quote.request.kind(),
            "Validated payment with cluster"
        );
        Ok(receipt)
    }

    /// Prepaid balance held by the leader
    pub async fn account_balance(&self) -> Result<AccountBalance> {
        Ok(self.config.leader.account_balance().await?)
    }

    /// Payment parameters published by the leader
    pub async fn payments_config(&self) -> Result<PaymentsConfig> {
        Ok(self.config.leader.payments_config().await?)
    }

    /// Credit the user's balance with `amount` unil paid on chain
    pub async fn add_funds(&self, amount: u64) -> Result<()> {
        let minimum = self.payments_config().await?.minimum_add_funds_payment;
        if amount == 0 || amount < minimum {
            return Err(NilError::invalid(format!(
                "Not enough unil amount: {amount}, minimum is {minimum}"
            )));
        }

        let mut nonce = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        let payload = bincode::serialize(&AddFundsPayload {
            recipient: self.config.user_id,
            nonce,
        })?;

        let tx_hash = self
            .config
            .chain
            .pay_for(MsgPayFor {
                from_address: self.config.address.clone(),
                resource: payload.clone(),
                amount: vec![Coin::unil(amount)],
            })
            .await?;

        self.config
            .leader
            .add_funds(&AddFundsRequest { payload, tx_hash })
            .await?;
        tracing::info!(amount, user = %self.config.user_id, "Added funds to balance");
        Ok(())
    }
}

impl std::fmt::Debug for PaymentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentClient")
            .field("user_id", &self.config.user_id)
            .field("address", &self.config.address)
            .field("payment_mode", &self.config.payment_mode)
            .finish_non_exhaustive()
    }
}

fn is_insufficient_balance(err: &NilError) -> bool {
    match err.as_transport() {
        Some(transport) => {
            transport.code() == Some(RpcCode::FailedPrecondition)
                && transport
                    .message()
                    .to_lowercase()
                    .contains(INSUFFICIENT_BALANCE)
        }
        None => false,
    }
}

fn into_insufficient_balance(err: NilError) -> NilError {
    if is_insufficient_balance(&err) {
        let message = err
            .as_transport()
            .map(|t| t.message().to_string())
            .unwrap_or_default();
        NilError::insufficient_balance(message)
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nilvm_core::{NetworkFailure, TransportError};

    #[test]
    fn recognises_insufficient_balance_rejection() {
        let err: NilError =
            TransportError::status(RpcCode::FailedPrecondition, "Insufficient balance").into();
        assert!(is_insufficient_balance(&err));
        assert!(matches!(
            into_insufficient_balance(err),
            NilError::InsufficientBalance { .. }
        ));
    }

    #[test]
    fn other_failures_are_not_balance_rejections() {
        let wrong_code: NilError =
            TransportError::status(RpcCode::PermissionDenied, "insufficient balance").into();
        let wrong_message: NilError =
            TransportError::status(RpcCode::FailedPrecondition, "quote expired").into();
        let network: NilError =
            TransportError::network(NetworkFailure::Network, "insufficient balance").into();

        for err in [wrong_code, wrong_message, network] {
            assert!(!is_insufficient_balance(&err));
            assert!(matches!(
                into_insufficient_balance(err),
                NilError::Transport(_)
            ));
        }
    }
}
