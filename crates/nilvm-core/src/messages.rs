//! Request and response payloads exchanged with cluster nodes
//!
//! Every priced request carries the signed receipt obtained from the leader.
//! The receipt is held behind an [`Arc`] so one payment can be shared by the
//! requests sent to every node without copying.

use crate::types::{
    ComputePermissionCommand, EncodedValues, InputBinding, OutputBinding, PermissionCommand,
    SignedQuote, SignedReceipt, TxHash, ValuesId, ValuesPermissions,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Store a node's share of a value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreValuesRequest {
    /// Proof of payment
    pub signed_receipt: Arc<SignedReceipt>,
    /// This node's encoded shares
    pub bincode_values: EncodedValues,
    /// Permissions to attach; `None` keeps existing ones on update
    pub permissions: Option<ValuesPermissions>,
    /// Existing values to overwrite, as raw UUID bytes
    #[serde(default, with = "serde_bytes")]
    pub update_identifier: Option<Vec<u8>>,
}

/// Reply to [`StoreValuesRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreValuesResponse {
    /// Identifier of the stored values, as raw UUID bytes
    #[serde(with = "serde_bytes")]
    pub values_id: Vec<u8>,
}

/// Retrieve a node's share of a value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveValuesRequest {
    /// Proof of payment, binding the values id
    pub signed_receipt: Arc<SignedReceipt>,
}

/// Reply to [`RetrieveValuesRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveValuesResponse {
    /// This node's encoded shares
    pub bincode_values: EncodedValues,
}

/// Delete a value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteValuesRequest {
    /// Values to delete, as raw UUID bytes
    #[serde(with = "serde_bytes")]
    pub values_id: Vec<u8>,
}

/// Start a computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeComputeRequest {
    /// Proof of payment, binding the program id
    pub signed_receipt: Arc<SignedReceipt>,
    /// Stored values used as inputs
    pub value_ids: Vec<ValuesId>,
    /// This node's shares of the compute-time values
    pub bincode_values: EncodedValues,
    /// Input party bindings
    pub input_bindings: Vec<InputBinding>,
    /// Output party bindings
    pub output_bindings: Vec<OutputBinding>,
}

/// Reply to [`InvokeComputeRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeComputeResponse {
    /// Identifier of the computation, as raw UUID bytes
    #[serde(with = "serde_bytes")]
    pub compute_id: Vec<u8>,
}

/// Subscribe to the outcome of a computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveResultsRequest {
    /// Computation to follow, as raw UUID bytes
    #[serde(with = "serde_bytes")]
    pub compute_id: Vec<u8>,
}

/// One message of the compute result stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeResultState {
    /// The computation has not finished yet
    WaitingComputation,
    /// The computation finished; carries this node's output shares
    Success {
        /// Encoded output shares
        bincode_values: EncodedValues,
    },
    /// The computation failed
    Error {
        /// Failure reported by the node
        message: String,
    },
}

/// Read the permissions of a value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievePermissionsRequest {
    /// Proof of payment, binding the values id
    pub signed_receipt: Arc<SignedReceipt>,
}

/// Amend the permissions of a value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePermissionsRequest {
    /// Proof of payment, binding the values id
    pub signed_receipt: Arc<SignedReceipt>,
    /// Retrieve permission changes
    pub retrieve: PermissionCommand,
    /// Update permission changes
    pub update: PermissionCommand,
    /// Delete permission changes
    pub delete: PermissionCommand,
    /// Compute permission changes
    pub compute: ComputePermissionCommand,
}

/// Replace the permissions of a value set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwritePermissionsRequest {
    /// Proof of payment, binding the values id
    pub signed_receipt: Arc<SignedReceipt>,
    /// New permissions
    pub permissions: ValuesPermissions,
}

/// Upload a compiled program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreProgramRequest {
    /// Proof of payment, binding the program name and digest
    pub signed_receipt: Arc<SignedReceipt>,
    /// Program bytes
    #[serde(with = "serde_bytes")]
    pub program: Vec<u8>,
}

/// Reply to [`StoreProgramRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreProgramResponse {
    /// Identifier assigned to the program
    pub program_id: String,
}

/// Query the leader's preprocessing pools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatusRequest {
    /// Proof of payment
    pub signed_receipt: Arc<SignedReceipt>,
}

/// Availability of one preprocessing element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessingOffsets {
    /// Element kind
    pub element: String,
    /// First available offset
    pub start: u64,
    /// One past the last available offset
    pub end: u64,
}

/// Reply to [`PoolStatusRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatusResponse {
    /// Available offsets per element
    pub offsets: Vec<PreprocessingOffsets>,
    /// Whether preprocessing is currently running
    pub preprocessing_active: bool,
}

/// Exchange a signed quote (and optional payment) for a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceiptRequest {
    /// Quote being settled
    pub signed_quote: SignedQuote,
    /// On-chain payment; `None` draws from the account balance
    pub tx_hash: Option<TxHash>,
}

/// Submit an on-chain add-funds payment to the leader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFundsRequest {
    /// Encoded [`crate::types::AddFundsPayload`]
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    /// Transaction that paid for the payload
    pub tx_hash: TxHash,
}
