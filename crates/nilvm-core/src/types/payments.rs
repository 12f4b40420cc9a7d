//! Price quotes, receipts and payment chain primitives

use crate::{NilError, ProgramId, ProgramMetadata, Result, UserId, ValuesId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Denomination of the payment chain's base unit
pub const UNIL_DENOM: &str = "unil";

/// Prefix of every payment chain address
pub const CHAIN_ADDRESS_PREFIX: &str = "nillion";

/// Length of a payment chain address
pub const CHAIN_ADDRESS_LEN: usize = 46;

/// Type URL of the pay-for message
pub const MSG_PAY_FOR_TYPE_URL: &str = "/nillion.meta.v1.MsgPayFor";

/// Length of a transaction hash in hex characters
pub const TX_HASH_LEN: usize = 64;

/// Describes the operation the client wants priced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceQuoteRequest {
    /// Query preprocessing pool status
    PoolStatus,
    /// Upload a compiled program
    StoreProgram {
        /// Program name
        name: String,
        /// SHA-256 digest of the program contents
        #[serde(with = "serde_bytes")]
        contents_sha256: Vec<u8>,
        /// Program metadata
        metadata: ProgramMetadata,
    },
    /// Retrieve stored values
    RetrieveValues {
        /// Values to retrieve
        values_id: ValuesId,
    },
    /// Retrieve the permissions of stored values
    RetrievePermissions {
        /// Values whose permissions are read
        values_id: ValuesId,
    },
    /// Store (or update) values
    StoreValues {
        /// Number of field elements produced by masking
        particles_count: u64,
        /// Number of secret shared values
        secret_shared_count: u64,
        /// Number of public values
        public_values_count: u64,
        /// Retention period in days
        ttl_days: u32,
        /// Encoded size of the values
        payload_size: u64,
    },
    /// Run a stored program
    InvokeCompute {
        /// Program to run
        program_id: ProgramId,
        /// Encoded size of the compute-time values
        values_payload_size: u64,
    },
    /// Replace the permissions of stored values
    OverwritePermissions {
        /// Values whose permissions are replaced
        values_id: ValuesId,
    },
    /// Amend the permissions of stored values
    UpdatePermissions {
        /// Values whose permissions are amended
        values_id: ValuesId,
    },
}

impl PriceQuoteRequest {
    /// Short operation name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            PriceQuoteRequest::PoolStatus => "pool_status",
            PriceQuoteRequest::StoreProgram { .. } => "store_program",
            PriceQuoteRequest::RetrieveValues { .. } => "retrieve_values",
            PriceQuoteRequest::RetrievePermissions { .. } => "retrieve_permissions",
            PriceQuoteRequest::StoreValues { .. } => "store_values",
            PriceQuoteRequest::InvokeCompute { .. } => "invoke_compute",
            PriceQuoteRequest::OverwritePermissions { .. } => "overwrite_permissions",
            PriceQuoteRequest::UpdatePermissions { .. } => "update_permissions",
        }
    }
}

/// Fee breakdown of a quote, in unil
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteFees {
    /// Flat per-operation fee
    pub base_fee: u64,
    /// Fee driven by cluster load
    pub congestion_fee: u64,
    /// Fee for storage
    pub storage_fee: u64,
    /// Fee for preprocessing material
    pub preprocessing_fee: u64,
    /// Fee for computation
    pub compute_fee: u64,
    /// Amount to pay
    pub total: u64,
}

/// Price the leader commits to for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Unique nonce identifying this quote on chain
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    /// Fees to pay
    pub fees: QuoteFees,
    /// The request being priced
    pub request: PriceQuoteRequest,
    /// When the quote stops being honoured
    pub expires_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Whether the quote is past its expiry at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A bincode-encoded [`PriceQuote`] signed by the leader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedQuote {
    /// Encoded quote
    #[serde(with = "serde_bytes")]
    pub quote: Vec<u8>,
    /// Leader signature over `quote`
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedQuote {
    /// Encode a quote together with its signature
    pub fn new(quote: &PriceQuote, signature: Vec<u8>) -> Result<Self> {
        Ok(Self {
            quote: bincode::serialize(quote)?,
            signature,
        })
    }

    /// Decode the inner quote
    pub fn decode(&self) -> Result<PriceQuote> {
        bincode::deserialize(&self.quote).map_err(NilError::from)
    }
}

/// Proof that an operation was paid for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Identifier of the paid operation (16 bytes)
    #[serde(with = "serde_bytes")]
    pub identifier: Vec<u8>,
    /// The request that was paid for
    pub metadata: PriceQuoteRequest,
    /// When the receipt stops being accepted
    pub expires_at: DateTime<Utc>,
}

/// A bincode-encoded [`Receipt`] signed by the leader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedReceipt {
    /// Encoded receipt
    #[serde(with = "serde_bytes")]
    pub receipt: Vec<u8>,
    /// Leader signature over `receipt`
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl SignedReceipt {
    /// Encode a receipt together with its signature
    pub fn new(receipt: &Receipt, signature: Vec<u8>) -> Result<Self> {
        Ok(Self {
            receipt: bincode::serialize(receipt)?,
            signature,
        })
    }

    /// Decode the inner receipt
    pub fn decode(&self) -> Result<Receipt> {
        bincode::deserialize(&self.receipt).map_err(NilError::from)
    }
}

/// Hash of a payment chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    /// Validate a transaction hash
    pub fn new(hash: impl Into<String>) -> Result<Self> {
        let hash = hash.into();
        if hash.len() != TX_HASH_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(NilError::chain(format!("malformed transaction hash: {hash}")));
        }
        Ok(Self(hash))
    }

    /// Get the hash as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TxHash {
    type Error = NilError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.0
    }
}

/// Bech32 address on the payment chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainAddress(String);

impl ChainAddress {
    /// Validate a chain address
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        if address.len() != CHAIN_ADDRESS_LEN || !address.starts_with(CHAIN_ADDRESS_PREFIX) {
            return Err(NilError::invalid(format!(
                "invalid chain address: {address}"
            )));
        }
        Ok(Self(address))
    }

    /// Get the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChainAddress {
    type Error = NilError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ChainAddress> for String {
    fn from(address: ChainAddress) -> Self {
        address.0
    }
}

/// Amount of a single denomination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination
    pub denom: String,
    /// Amount in that denomination
    pub amount: u64,
}

impl Coin {
    /// An amount in unil
    pub fn unil(amount: u64) -> Self {
        Self {
            denom: UNIL_DENOM.to_string(),
            amount,
        }
    }
}

/// On-chain message paying for a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgPayFor {
    /// Paying account
    pub from_address: ChainAddress,
    /// Resource being paid for: a quote nonce or an encoded add-funds payload
    #[serde(with = "serde_bytes")]
    pub resource: Vec<u8>,
    /// Amount paid
    pub amount: Vec<Coin>,
}

/// How priced operations are settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Draw from the prepaid account balance held by the leader
    #[default]
    FromBalance,
    /// Broadcast one on-chain payment per operation
    PayPerOperation,
}

/// Prepaid balance held by the leader for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Balance in unil
    pub balance: u64,
    /// Last time the balance changed
    pub last_updated: DateTime<Utc>,
    /// When the balance expires
    pub expires_at: DateTime<Utc>,
}

/// Payment parameters published by the leader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// Smallest accepted add-funds payment in unil
    pub minimum_add_funds_payment: u64,
}

/// Payload paid for on chain to credit a user's balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFundsPayload {
    /// User being credited
    pub recipient: UserId,
    /// Random nonce making the payment unique
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quote(expires_at: DateTime<Utc>) -> PriceQuote {
        PriceQuote {
            nonce: vec![1; 32],
            fees: QuoteFees {
                total: 10,
                ..QuoteFees::default()
            },
            request: PriceQuoteRequest::PoolStatus,
            expires_at,
        }
    }

    #[test]
    fn quote_kinds_are_distinct() {
        let values_id = ValuesId::from_uuid(uuid::Uuid::nil());
        let kinds = [
            PriceQuoteRequest::PoolStatus.kind(),
            PriceQuoteRequest::RetrieveValues { values_id }.kind(),
            PriceQuoteRequest::RetrievePermissions { values_id }.kind(),
            PriceQuoteRequest::OverwritePermissions { values_id }.kind(),
            PriceQuoteRequest::UpdatePermissions { values_id }.kind(),
        ];
        let unique: std::collections::BTreeSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn signed_quote_decodes_inner_quote() {
        let inner = quote(Utc::now() + Duration::minutes(5));
        let signed = SignedQuote::new(&inner, vec![9; 64]).unwrap();
        assert_eq!(signed.decode().unwrap(), inner);
    }

    #[test]
    fn garbage_quote_fails_to_decode() {
        let signed = SignedQuote {
            quote: vec![0xff; 3],
            signature: vec![],
        };
        assert!(matches!(
            signed.decode(),
            Err(NilError::Serialization { .. })
        ));
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        assert!(quote(now).is_expired(now));
        assert!(!quote(now + Duration::seconds(1)).is_expired(now));
    }

    #[test]
    fn tx_hash_validation() {
        assert!(TxHash::new("A".repeat(64)).is_ok());
        assert!(TxHash::new("a".repeat(63)).is_err());
        assert!(TxHash::new("z".repeat(64)).is_err());
    }

    #[test]
    fn chain_address_validation() {
        let valid = format!("nillion{}", "1".repeat(39));
        assert!(ChainAddress::new(valid).is_ok());
        assert!(ChainAddress::new(format!("cosmos1{}", "1".repeat(39))).is_err());
        assert!(ChainAddress::new("nillion1short").is_err());
    }

    #[test]
    fn default_payment_mode_draws_from_balance() {
        assert_eq!(PaymentMode::default(), PaymentMode::FromBalance);
    }
}
