//! Node authentication tokens
//!
//! Every call to a node carries a short-lived token addressed to that node,
//! signed with the user's identity key and sent base64-encoded in the
//! [`AUTH_HEADER`] header.

use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use nilvm_core::{NilError, PartyId, Result, UserId};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use zeroize::Zeroizing;

/// Header carrying the serialized signed token
pub const AUTH_HEADER: &str = "x-nillion-token";

/// Length of the random nonce in each token
pub const NONCE_LENGTH: usize = 32;

/// Default token lifetime
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Claims presented to one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Random nonce
    pub nonce: [u8; NONCE_LENGTH],
    /// Node the token is valid for
    pub target_identity: PartyId,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
}

/// A serialized [`Token`] with the signer's key and signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedToken {
    /// bincode-encoded token
    pub serialized_token: Vec<u8>,
    /// Signer's ed25519 public key
    pub public_key: [u8; 32],
    /// Signature over `serialized_token`
    pub signature: Vec<u8>,
}

/// Issues and checks node authentication tokens for one user identity
pub struct TokenAuthManager {
    signing_key: SigningKey,
    ttl: Duration,
}

impl TokenAuthManager {
    /// Create from an identity key
    pub fn new(signing_key: SigningKey) -> Self {
        Self {
            signing_key,
            ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Derive the identity key from a seed string (SHA-256 of the seed)
    pub fn from_seed(seed: &str) -> Self {
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&Sha256::digest(seed.as_bytes()));
        Self::new(SigningKey::from_bytes(&secret))
    }

    /// Override the token lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The identity's public key
    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The user id derived from the public key
    pub fn user_id(&self) -> UserId {
        UserId::from_public_key(self.public_key().as_bytes())
    }

    /// Create a fresh token for `target`
    pub fn generate_token(&self, target: PartyId) -> Result<Token> {
        let mut nonce = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| NilError::invalid(format!("token ttl out of range: {e}")))?;

        Ok(Token {
            nonce,
            target_identity: target,
            expires_at: Utc::now() + ttl,
        })
    }

    /// Serialize and sign a token
    pub fn sign_token(&self, token: &Token) -> Result<SignedToken> {
        let serialized_token = bincode::serialize(token)?;
        let signature = self.signing_key.sign(&serialized_token);

        Ok(SignedToken {
            serialized_token,
            public_key: self.public_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
        })
    }

    /// Check a signed token against this identity's key
    pub fn verify(&self, signed: &SignedToken) -> bool {
        let Ok(signature) = Signature::from_slice(&signed.signature) else {
            return false;
        };
        self.public_key()
            .verify(&signed.serialized_token, &signature)
            .is_ok()
    }

    /// Whether the token has expired
    pub fn is_token_expired(&self, token: &Token) -> bool {
        token.expires_at < Utc::now()
    }

    /// Base64 encoding of a signed token, as sent in [`AUTH_HEADER`]
    pub fn serialize(&self, signed: &SignedToken) -> Result<String> {
        let binary = bincode::serialize(signed)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(binary))
    }

    /// Inverse of [`TokenAuthManager::serialize`]
    pub fn deserialize(&self, data: &str) -> Result<SignedToken> {
        let binary = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| NilError::serialization(format!("token is not base64: {e}")))?;
        Ok(bincode::deserialize(&binary)?)
    }

    /// Generate, sign and serialize a token for `target` in one step
    pub fn header_value(&self, target: PartyId) -> Result<String> {
        let token = self.generate_token(target)?;
        let signed = self.sign_token(&token)?;
        self.serialize(&signed)
    }
}

impl std::fmt::Debug for TokenAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthManager")
            .field("user_id", &self.user_id())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party() -> PartyId {
        PartyId::from_bytes([4; 32])
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let a = TokenAuthManager::from_seed("test");
        let b = TokenAuthManager::from_seed("test");
        let c = TokenAuthManager::from_seed("other");
        assert_eq!(a.user_id(), b.user_id());
        assert_ne!(a.user_id(), c.user_id());
    }

    #[test]
    fn generated_token_targets_node_and_expires_later() {
        let auth = TokenAuthManager::from_seed("test");
        let token = auth.generate_token(party()).unwrap();
        assert_eq!(token.target_identity, party());
        assert!(!auth.is_token_expired(&token));
        assert!(token.expires_at <= Utc::now() + chrono::Duration::seconds(60));
    }

    #[test]
    fn nonces_differ_between_tokens() {
        let auth = TokenAuthManager::from_seed("test");
        let a = auth.generate_token(party()).unwrap();
        let b = auth.generate_token(party()).unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn signed_token_verifies_and_survives_header_encoding() {
        let auth = TokenAuthManager::from_seed("test");
        let token = auth.generate_token(party()).unwrap();
        let signed = auth.sign_token(&token).unwrap();
        assert!(auth.verify(&signed));

        let header = auth.serialize(&signed).unwrap();
        let decoded = auth.deserialize(&header).unwrap();
        assert_eq!(decoded, signed);
    }

    #[test]
    fn tampered_or_foreign_tokens_fail_verification() {
        let auth = TokenAuthManager::from_seed("test");
        let mut signed = auth
            .sign_token(&auth.generate_token(party()).unwrap())
            .unwrap();
        let other = TokenAuthManager::from_seed("other");
        assert!(!other.verify(&signed));

        signed.serialized_token[0] ^= 0xff;
        assert!(!auth.verify(&signed));
    }

    #[test]
    fn expired_token_is_detected() {
        let auth = TokenAuthManager::from_seed("test");
        let mut token = auth.generate_token(party()).unwrap();
        token.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(auth.is_token_expired(&token));
    }
}
