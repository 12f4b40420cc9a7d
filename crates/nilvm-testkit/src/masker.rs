//! Deterministic masker
//!
//! Every party receives the full value set tagged with its own party id, so
//! unmasking can check that exactly one share per party came back and that
//! all shares agree.

use nilvm_core::effects::{MaskerFactory, SecretMasker};
use nilvm_core::{
    EncodedValues, NadaValue, NadaValues, NilError, PartyId, PartyShares, Prime,
    PreprocessingRequirement, ProgramMetadata, Result, ValuesClassification,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MockShare {
    party: PartyId,
    values: NadaValues,
}

/// Masker splitting values into one tagged copy per party
#[derive(Debug, Clone)]
pub struct MockMasker {
    parties: Vec<PartyId>,
    foreign_party: Option<PartyId>,
}

impl MockMasker {
    /// Masker for `parties`
    pub fn new(parties: Vec<PartyId>) -> Self {
        Self {
            parties,
            foreign_party: None,
        }
    }

    /// Address the last share to `party` instead of the last cluster member
    pub fn with_foreign_party(mut self, party: PartyId) -> Self {
        self.foreign_party = Some(party);
        self
    }

    /// Parties the masker splits for
    pub fn parties(&self) -> &[PartyId] {
        &self.parties
    }

    /// Share set the masker produces for `party`
    pub fn share_for(&self, party: PartyId, values: &NadaValues) -> Result<EncodedValues> {
        EncodedValues::encode(&MockShare {
            party,
            values: values.clone(),
        })
    }
}

impl SecretMasker for MockMasker {
    fn mask(&self, values: &NadaValues) -> Result<Vec<PartyShares>> {
        let mut targets = self.parties.clone();
        if let (Some(foreign), Some(last)) = (self.foreign_party, targets.last_mut()) {
            *last = foreign;
        }
        targets
            .into_iter()
            .map(|party| {
                Ok(PartyShares {
                    party,
                    shares: self.share_for(party, values)?,
                })
            })
            .collect()
    }

    fn unmask(&self, shares: Vec<PartyShares>) -> Result<NadaValues> {
        let mut seen = BTreeSet::new();
        let mut result: Option<NadaValues> = None;
        for share in shares {
            let decoded: MockShare = share.shares.decode()?;
            if decoded.party != share.party {
                return Err(NilError::masking(format!(
                    "share for {} returned by {}",
                    decoded.party, share.party
                )));
            }
            if !seen.insert(share.party) {
                return Err(NilError::masking(format!("two shares from {}", share.party)));
            }
            match &result {
                Some(values) if *values != decoded.values => {
                    return Err(NilError::masking("shares do not recombine"));
                }
                Some(_) => {}
                None => result = Some(decoded.values),
            }
        }

        let expected: BTreeSet<PartyId> = self.parties.iter().copied().collect();
        if seen != expected {
            return Err(NilError::masking(format!(
                "expected {} shares, got {}",
                expected.len(),
                seen.len()
            )));
        }
        result.ok_or_else(|| NilError::masking("no shares"))
    }

    fn classify(&self, values: &NadaValues) -> Result<ValuesClassification> {
        let mut classification = ValuesClassification::default();
        for (_, value) in values.iter() {
            match value {
                NadaValue::SecretBlob(bytes) => {
                    classification.shares += 1;
                    classification.particles += (bytes.len() as u64).div_ceil(8).max(1);
                }
                value if value.is_secret() => {
                    classification.shares += 1;
                    classification.particles += 1;
                }
                _ => classification.public += 1,
            }
        }
        Ok(classification)
    }

    fn values_size(&self, values: &NadaValues) -> Result<u64> {
        Ok(EncodedValues::encode(values)?.len() as u64)
    }

    fn program_metadata(&self, program: &[u8]) -> Result<ProgramMetadata> {
        let size = program.len() as u64;
        let mut instructions = BTreeMap::new();
        instructions.insert("load".to_string(), size / 4);
        Ok(ProgramMetadata {
            program_size: size,
            memory_size: size,
            instruction_count: size / 4,
            instructions,
            preprocessing_requirements: vec![PreprocessingRequirement {
                element: "compare".to_string(),
                count: 1,
            }],
        })
    }
}

/// Factory recording the cluster parameters it was asked for
#[derive(Debug, Default)]
pub struct MockMaskerFactory {
    created: Mutex<Option<(Vec<PartyId>, Prime, u32)>>,
}

impl MockMaskerFactory {
    /// Parties, prime and degree of the last created masker
    pub fn created(&self) -> Option<(Vec<PartyId>, Prime, u32)> {
        self.created.lock().clone()
    }
}

impl MaskerFactory for MockMaskerFactory {
    fn create(
        &self,
        parties: &[PartyId],
        prime: Prime,
        polynomial_degree: u32,
    ) -> Result<Arc<dyn SecretMasker>> {
        *self.created.lock() = Some((parties.to_vec(), prime, polynomial_degree));
        Ok(Arc::new(MockMasker::new(parties.to_vec())))
    }
}
