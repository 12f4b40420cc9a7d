//! Domain types shared by the client and its transports

pub mod cluster;
pub mod identifiers;
pub mod payments;
pub mod permissions;
pub mod values;

pub use cluster::{Cluster, ClusterMember, Prime};
pub use identifiers::{
    ComputeId, PartyId, ProgramId, TtlDays, UserId, ValuesId, MIN_PROGRAM_ID_LEN, PARTY_ID_LEN,
    USER_ID_LEN,
};
pub use payments::{
    AccountBalance, AddFundsPayload, ChainAddress, Coin, MsgPayFor, PaymentMode, PaymentsConfig,
    PriceQuote, PriceQuoteRequest, QuoteFees, Receipt, SignedQuote, SignedReceipt, TxHash,
    CHAIN_ADDRESS_PREFIX, MSG_PAY_FOR_TYPE_URL, UNIL_DENOM,
};
pub use permissions::{ComputePermissionCommand, PermissionCommand, ValuesPermissions};
pub use values::{
    EncodedValues, InputBinding, NadaValue, NadaValues, OutputBinding, PartyShares, PreprocessingRequirement,
    ProgramMetadata, ValuesClassification,
};
