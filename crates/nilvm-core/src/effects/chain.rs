//! Payment chain effects
//!
//! The client never holds chain keys itself: signing goes through an
//! explicit [`Signer`] capability and submission through a [`Broadcaster`].

use crate::types::{ChainAddress, MsgPayFor, TxHash};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Account exposed by a signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainAccount {
    /// Account address
    pub address: ChainAddress,
    /// Account public key
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
}

/// A protobuf-style message wrapped with its type URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMessage {
    /// Type URL of the message
    pub type_url: String,
    /// Encoded message
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

/// Transaction contents awaiting a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignDoc {
    /// Signing account
    pub signer: ChainAddress,
    /// Messages in the transaction
    pub messages: Vec<ChainMessage>,
    /// Free-form memo
    pub memo: String,
}

impl SignDoc {
    /// Canonical bytes the signer signs over
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

/// Signed transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    /// Signed body
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
    /// Signature over `body`
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

/// Holds the keys of one or more chain accounts
#[async_trait]
pub trait Signer: Send + Sync {
    /// Accounts the signer can sign for
    async fn accounts(&self) -> Result<Vec<ChainAccount>>;

    /// Sign a transaction body in direct mode
    async fn sign_direct(&self, doc: &SignDoc) -> Result<SignedTx>;
}

/// Submits signed transactions to the chain
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Broadcast and wait for inclusion, returning the transaction hash
    async fn broadcast(&self, tx: &SignedTx) -> Result<TxHash>;
}

/// Pays for resources on the payment chain
#[async_trait]
pub trait PaymentChain: Send + Sync {
    /// Pay for one resource and return the transaction hash
    async fn pay_for(&self, message: MsgPayFor) -> Result<TxHash>;
}

#[async_trait]
impl<T: Signer + ?Sized> Signer for Arc<T> {
    async fn accounts(&self) -> Result<Vec<ChainAccount>> {
        (**self).accounts().await
    }

    async fn sign_direct(&self, doc: &SignDoc) -> Result<SignedTx> {
        (**self).sign_direct(doc).await
    }
}

#[async_trait]
impl<T: Broadcaster + ?Sized> Broadcaster for Arc<T> {
    async fn broadcast(&self, tx: &SignedTx) -> Result<TxHash> {
        (**self).broadcast(tx).await
    }
}

#[async_trait]
impl<T: PaymentChain + ?Sized> PaymentChain for Arc<T> {
    async fn pay_for(&self, message: MsgPayFor) -> Result<TxHash> {
        (**self).pay_for(message).await
    }
}
