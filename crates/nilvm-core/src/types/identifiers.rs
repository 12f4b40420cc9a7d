//! Identifier types used across the nilVM client
//!
//! Party identifiers key per-node lookups, so they are totally ordered and
//! hashable. Value and compute identifiers are UUIDs assigned by the nodes.

use crate::{NilError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Width in bytes of a [`PartyId`]
pub const PARTY_ID_LEN: usize = 32;

/// Width in bytes of a [`UserId`]
pub const USER_ID_LEN: usize = 20;

/// Minimum length of a program identifier
pub const MIN_PROGRAM_ID_LEN: usize = 90;

/// Identity of one node (party) in the cluster
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartyId([u8; PARTY_ID_LEN]);

impl PartyId {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; PARTY_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice, validating its length
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let inner: [u8; PARTY_ID_LEN] = bytes.try_into().map_err(|_| {
            NilError::invalid(format!(
                "party id must be {PARTY_ID_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(inner))
    }

    /// Get the inner bytes
    pub fn as_bytes(&self) -> &[u8; PARTY_ID_LEN] {
        &self.0
    }

    /// Standard base64 rendering, as used in logs and wire payloads
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyId({})", self.to_base64())
    }
}

impl FromStr for PartyId {
    type Err = NilError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| NilError::invalid(format!("party id is not base64: {e}")))?;
        Self::try_from_slice(&bytes)
    }
}

impl TryFrom<String> for PartyId {
    type Error = NilError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PartyId> for String {
    fn from(id: PartyId) -> Self {
        id.to_base64()
    }
}

/// Identity of a user, derived from their public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId([u8; USER_ID_LEN]);

impl UserId {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; USER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive from a public key: the trailing 20 bytes of its SHA-256 digest
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut inner = [0u8; USER_ID_LEN];
        inner.copy_from_slice(&digest[digest.len() - USER_ID_LEN..]);
        Self(inner)
    }

    /// Get the inner bytes
    pub fn as_bytes(&self) -> &[u8; USER_ID_LEN] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.to_hex())
    }
}

impl FromStr for UserId {
    type Err = NilError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes =
            hex::decode(s).map_err(|e| NilError::invalid(format!("user id is not hex: {e}")))?;
        let inner: [u8; USER_ID_LEN] = bytes.as_slice().try_into().map_err(|_| {
            NilError::invalid(format!(
                "user id must be {USER_ID_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(inner))
    }
}

impl TryFrom<String> for UserId {
    type Error = NilError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.to_hex()
    }
}

/// Identifier of a stored value set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValuesId(pub Uuid);

impl ValuesId {
    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse the 16 raw bytes returned by a node
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self(Uuid::from_slice(bytes)?))
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Raw bytes for wire payloads
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

impl fmt::Display for ValuesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ValuesId {
    type Err = NilError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for ValuesId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier of a running or finished computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComputeId(pub Uuid);

impl ComputeId {
    /// Parse the 16 raw bytes returned by a node
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self(Uuid::from_slice(bytes)?))
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Raw bytes for wire payloads
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

impl fmt::Display for ComputeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ComputeId {
    type Err = NilError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for ComputeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier of a stored program, of the form `<namespace>/<path>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProgramId(String);

impl ProgramId {
    /// Validate and wrap a program identifier
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.len() < MIN_PROGRAM_ID_LEN {
            return Err(NilError::invalid(format!(
                "program id must be at least {MIN_PROGRAM_ID_LEN} characters, got {}",
                id.len()
            )));
        }
        let valid = match id.split_once('/') {
            Some((namespace, path)) => {
                !namespace.is_empty()
                    && !path.is_empty()
                    && namespace
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            None => false,
        };
        if !valid {
            return Err(NilError::invalid(format!("malformed program id: {id}")));
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProgramId {
    type Err = NilError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProgramId {
    type Error = NilError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ProgramId> for String {
    fn from(id: ProgramId) -> Self {
        id.0
    }
}

/// Retention period for stored values, in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TtlDays(u32);

impl TtlDays {
    /// Create a positive retention period
    pub fn new(days: u32) -> Result<Self> {
        if days == 0 {
            return Err(NilError::invalid("ttl must be a positive number of days"));
        }
        Ok(Self(days))
    }

    /// Number of days
    pub fn days(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_program_id() -> String {
        format!("{}/my_program/sha256/{}", "ab".repeat(20), "cd".repeat(32))
    }

    #[test]
    fn party_id_requires_exact_width() {
        assert!(PartyId::try_from_slice(&[1u8; 32]).is_ok());
        assert!(PartyId::try_from_slice(&[1u8; 31]).is_err());
        assert!(PartyId::try_from_slice(&[]).is_err());
    }

    #[test]
    fn party_id_base64_round_trip() {
        let id = PartyId::from_bytes([3; 32]);
        let parsed: PartyId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn user_id_is_sha256_suffix() {
        let key = [9u8; 32];
        let digest = Sha256::digest(key);
        let id = UserId::from_public_key(&key);
        assert_eq!(&id.as_bytes()[..], &digest[12..]);
        assert_eq!(id.to_hex().len(), 40);
    }

    #[test]
    fn user_id_parses_hex() {
        let hex = "0123456789abcdef08090a0b0c0d0e0f10111213";
        let id: UserId = hex.parse().unwrap();
        assert_eq!(id.to_hex(), hex);
        assert!("0123".parse::<UserId>().is_err());
    }

    #[test]
    fn values_id_from_node_bytes() {
        let uuid = Uuid::new_v4();
        let id = ValuesId::from_slice(uuid.as_bytes()).unwrap();
        assert_eq!(id.uuid(), uuid);
        assert!(ValuesId::from_slice(&[1, 2, 3]).is_err());
    }

    #[test]
    fn program_id_validation() {
        assert!(ProgramId::new(long_program_id()).is_ok());
        assert!(ProgramId::new("short/id").is_err());
        assert!(ProgramId::new("x".repeat(100)).is_err());
        assert!(ProgramId::new(format!("bad-ns/{}", "p".repeat(100))).is_err());
        assert!(ProgramId::new(format!("{}/", "n".repeat(100))).is_err());
    }

    #[test]
    fn ttl_must_be_positive() {
        assert!(TtlDays::new(0).is_err());
        assert_eq!(TtlDays::new(30).map(|t| t.days()).ok(), Some(30));
    }
}
