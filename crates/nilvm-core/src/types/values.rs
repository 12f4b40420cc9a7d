//! Values handled by the client before masking and after unmasking

use crate::{NilError, PartyId, Result, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single named input or output of a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NadaValue {
    /// Public signed integer
    Integer(i64),
    /// Public unsigned integer
    UnsignedInteger(u64),
    /// Public boolean
    Boolean(bool),
    /// Secret signed integer
    SecretInteger(i64),
    /// Secret unsigned integer
    SecretUnsignedInteger(u64),
    /// Secret boolean
    SecretBoolean(bool),
    /// Secret opaque blob
    SecretBlob(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl NadaValue {
    /// Whether the value is secret shared rather than sent in the clear
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            NadaValue::SecretInteger(_)
                | NadaValue::SecretUnsignedInteger(_)
                | NadaValue::SecretBoolean(_)
                | NadaValue::SecretBlob(_)
        )
    }
}

/// Named collection of values, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NadaValues(BTreeMap<String, NadaValue>);

impl NadaValues {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: NadaValue) -> Option<NadaValue> {
        self.0.insert(name.into(), value)
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: NadaValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Look a value up by name
    pub fn get(&self, name: &str) -> Option<&NadaValue> {
        self.0.get(name)
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &NadaValue)> {
        self.0.iter()
    }

    /// Consume into the underlying map
    pub fn into_inner(self) -> BTreeMap<String, NadaValue> {
        self.0
    }
}

impl FromIterator<(String, NadaValue)> for NadaValues {
    fn from_iter<I: IntoIterator<Item = (String, NadaValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Bincode-encoded share payload addressed to one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedValues(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl EncodedValues {
    /// Encode any serializable share set
    pub fn encode<T: Serialize>(shares: &T) -> Result<Self> {
        Ok(Self(bincode::serialize(shares)?))
    }

    /// Decode into a concrete share set
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        bincode::deserialize(&self.0).map_err(NilError::from)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for EncodedValues {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// One node's fragment of a masked value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyShares {
    /// Node the fragment is addressed to
    pub party: PartyId,
    /// Encoded fragment
    pub shares: EncodedValues,
}

/// Counts used to price a store operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValuesClassification {
    /// Number of field elements produced by masking
    pub particles: u64,
    /// Number of secret shared values
    pub shares: u64,
    /// Number of public values
    pub public: u64,
}

/// Preprocessing material a program consumes per execution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreprocessingRequirement {
    /// Preprocessing element kind
    pub element: String,
    /// Elements consumed per execution
    pub count: u64,
}

/// Static description of a compiled program used for pricing
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramMetadata {
    /// Size of the program in bytes
    pub program_size: u64,
    /// Runtime memory size
    pub memory_size: u64,
    /// Total number of instructions
    pub instruction_count: u64,
    /// Instruction histogram
    pub instructions: BTreeMap<String, u64>,
    /// Preprocessing needed per execution
    pub preprocessing_requirements: Vec<PreprocessingRequirement>,
}

/// Binds a program input party to a user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputBinding {
    /// Party name as declared in the program
    pub party: String,
    /// User providing that party's inputs
    pub user: UserId,
}

/// Binds a program output party to the users allowed to read it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputBinding {
    /// Party name as declared in the program
    pub party: String,
    /// Users receiving that party's outputs
    pub users: Vec<UserId>,
}
