//! Secret masking effect
//!
//! Splitting values into per-party shares and recombining them is provided
//! by an external capability. The client only needs the operations below.

use crate::types::{
    NadaValues, PartyId, PartyShares, Prime, ProgramMetadata, ValuesClassification,
};
use crate::Result;
use std::sync::Arc;

/// Masks values into shares and recombines shares into values
pub trait SecretMasker: Send + Sync {
    /// Split `values` into one share set per party
    fn mask(&self, values: &NadaValues) -> Result<Vec<PartyShares>>;

    /// Recombine per-party shares into values
    fn unmask(&self, shares: Vec<PartyShares>) -> Result<NadaValues>;

    /// Count particles, secret shares and public values for pricing
    fn classify(&self, values: &NadaValues) -> Result<ValuesClassification>;

    /// Encoded size of `values` in bytes
    fn values_size(&self, values: &NadaValues) -> Result<u64>;

    /// Extract pricing metadata from compiled program bytes
    fn program_metadata(&self, program: &[u8]) -> Result<ProgramMetadata>;
}

/// Creates a masker for a cluster
pub trait MaskerFactory: Send + Sync {
    /// Build a masker for the given parties, prime and polynomial degree
    fn create(
        &self,
        parties: &[PartyId],
        prime: Prime,
        polynomial_degree: u32,
    ) -> Result<Arc<dyn SecretMasker>>;
}

impl<T: SecretMasker + ?Sized> SecretMasker for Arc<T> {
    fn mask(&self, values: &NadaValues) -> Result<Vec<PartyShares>> {
        (**self).mask(values)
    }

    fn unmask(&self, shares: Vec<PartyShares>) -> Result<NadaValues> {
        (**self).unmask(shares)
    }

    fn classify(&self, values: &NadaValues) -> Result<ValuesClassification> {
        (**self).classify(values)
    }

    fn values_size(&self, values: &NadaValues) -> Result<u64> {
        (**self).values_size(values)
    }

    fn program_metadata(&self, program: &[u8]) -> Result<ProgramMetadata> {
        (**self).program_metadata(program)
    }
}
