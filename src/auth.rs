//! Shared-secret check for trusted callers (scheduler, admin, billing).
//!
//! Only the SHA-256 hex digest of the secret is configured; presented tokens
//! are hashed and compared without early exit.

use sha2::{Digest, Sha256};

use crate::error::{LeadflowError, Result};

/// Hex SHA-256 digest of `token`
pub fn digest_hex(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Verifier for a bearer token
#[derive(Debug, Clone)]
pub struct SharedSecret {
    digest: Option<[u8; 32]>,
}

impl SharedSecret {
    /// Build from a configured hex digest. An empty digest means no secret is
    /// configured, and every privileged call is refused.
    pub fn from_sha256_hex(digest: &str) -> Result<Self> {
        let digest = digest.trim();
        if digest.is_empty() {
            return Ok(Self { digest: None });
        }

        let bytes = hex::decode(digest)
            .map_err(|e| LeadflowError::InvalidInput(format!("auth.token_sha256 is not hex: {}", e)))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LeadflowError::InvalidInput("auth.token_sha256 must be 32 bytes".to_string()))?;
        Ok(Self { digest: Some(digest) })
    }

    pub fn is_configured(&self) -> bool {
        self.digest.is_some()
    }

    /// Check a presented credential; a leading `Bearer ` is accepted
    pub fn verify(&self, presented: Option<&str>) -> Result<()> {
        let expected = self
            .digest
            .as_ref()
            .ok_or_else(|| LeadflowError::Unauthorized("no shared secret configured".to_string()))?;
        let presented = presented.ok_or_else(|| LeadflowError::Unauthorized("missing token".to_string()))?;
        let token = presented.strip_prefix("Bearer ").unwrap_or(presented).trim();

        let actual: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        let diff = expected.iter().zip(actual.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(LeadflowError::Unauthorized("invalid token".to_string()))
        }
    }
}
