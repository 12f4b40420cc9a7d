//! In-memory payment chain, signer and broadcaster

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use nilvm_core::effects::{
    Broadcaster, ChainAccount, PaymentChain, SignDoc, SignedTx, Signer,
};
use nilvm_core::{ChainAddress, MsgPayFor, NilError, Result, TxHash, MSG_PAY_FOR_TYPE_URL};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Ledger of `MsgPayFor` payments
#[derive(Debug, Default)]
pub struct MockChain {
    payments: Mutex<Vec<MsgPayFor>>,
    failure: Mutex<Option<NilError>>,
}

impl MockChain {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every following payment with `error`
    pub fn fail_with(&self, error: NilError) {
        *self.failure.lock() = Some(error);
    }

    /// Every payment accepted so far
    pub fn payments(&self) -> Vec<MsgPayFor> {
        self.payments.lock().clone()
    }

    /// Total unil paid for `resource`
    pub fn paid_for(&self, resource: &[u8]) -> u64 {
        self.payments
            .lock()
            .iter()
            .filter(|payment| payment.resource == resource)
            .flat_map(|payment| payment.amount.iter())
            .map(|coin| coin.amount)
            .sum()
    }

    fn record(&self, message: MsgPayFor) -> Result<TxHash> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        let hash = TxHash::new(hex::encode(Sha256::digest(bincode::serialize(&message)?)))?;
        self.payments.lock().push(message);
        Ok(hash)
    }
}

#[async_trait]
impl PaymentChain for MockChain {
    async fn pay_for(&self, message: MsgPayFor) -> Result<TxHash> {
        self.record(message)
    }
}

/// Chain address used by test signers
pub fn test_address() -> ChainAddress {
    ChainAddress::new(format!("nillion{}", "1".repeat(39)))
        .expect("fixed address is well formed")
}

/// Signer holding one deterministic account
#[derive(Debug)]
pub struct MockSigner {
    key: SigningKey,
    accounts: Vec<ChainAccount>,
}

impl MockSigner {
    /// Signer with one account at [`test_address`]
    pub fn new() -> Self {
        let key = SigningKey::from_bytes(&[9; 32]);
        let accounts = vec![ChainAccount {
            address: test_address(),
            public_key: key.verifying_key().to_bytes().to_vec(),
        }];
        Self { key, accounts }
    }

    /// Signer without any account
    pub fn without_accounts() -> Self {
        Self {
            accounts: Vec::new(),
            ..Self::new()
        }
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn accounts(&self) -> Result<Vec<ChainAccount>> {
        Ok(self.accounts.clone())
    }

    async fn sign_direct(&self, doc: &SignDoc) -> Result<SignedTx> {
        let body = doc.to_bytes()?;
        let signature = self.key.sign(&body).to_bytes().to_vec();
        Ok(SignedTx { body, signature })
    }
}

/// Broadcaster settling `MsgPayFor` messages on a [`MockChain`]
#[derive(Debug, Clone)]
pub struct MockBroadcaster {
    chain: Arc<MockChain>,
}

impl MockBroadcaster {
    /// Settle on `chain`
    pub fn new(chain: Arc<MockChain>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn broadcast(&self, tx: &SignedTx) -> Result<TxHash> {
        let doc: SignDoc = bincode::deserialize(&tx.body)?;
        let mut hash = None;
        for message in doc.messages {
            if message.type_url != MSG_PAY_FOR_TYPE_URL {
                return Err(NilError::chain(format!(
                    "unsupported message {}",
                    message.type_url
                )));
            }
            let payment: MsgPayFor = bincode::deserialize(&message.value)?;
            hash = Some(self.chain.record(payment)?);
        }
        hash.ok_or_else(|| NilError::chain("empty transaction"))
    }
}
