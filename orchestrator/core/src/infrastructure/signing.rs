// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Message Signing
//
// HMAC-SHA256 over the canonical JSON of a record with its `signature` field
// unset, hex encoded. serde_json writes struct fields in declaration order and
// object keys sorted, so a record that survives a wire round trip signs to the
// same bytes on both ends.
//
// Signed records:
//   - MessageEnvelope (sender -> mesh, mesh -> agent)
//   - AgentRegistration (agent -> mesh)

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::domain::agent::AgentRegistration;
use crate::domain::envelope::MessageEnvelope;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signing key must not be empty")]
    EmptyKey,

    #[error("Message is not signed")]
    Missing,

    #[error("Signature does not match the message")]
    Mismatch,

    #[error("Message could not be encoded for signing: {0}")]
    Encoding(String),
}

impl SignatureError {
    pub fn code(&self) -> &'static str {
        match self {
            SignatureError::Missing => "missing_signature",
            _ => "invalid_signature",
        }
    }
}

/// A record that carries its own signature.
pub trait Signable: Serialize + Clone {
    fn signature(&self) -> Option<&str>;
    fn set_signature(&mut self, signature: Option<String>);
}

impl Signable for MessageEnvelope {
    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    fn set_signature(&mut self, signature: Option<String>) {
        self.signature = signature;
    }
}

impl Signable for AgentRegistration {
    fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    fn set_signature(&mut self, signature: Option<String>) {
        self.signature = signature;
    }
}

/// Shared-secret signer used by the mesh, its agents and its clients.
#[derive(Clone)]
pub struct MessageSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSigner").finish_non_exhaustive()
    }
}

impl MessageSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(SignatureError::EmptyKey);
        }
        Ok(Self { key: key.to_vec() })
    }

    fn mac_of<T: Signable>(&self, record: &T) -> Result<HmacSha256, SignatureError> {
        let mut unsigned = record.clone();
        unsigned.set_signature(None);
        let bytes =
            serde_json::to_vec(&unsigned).map_err(|e| SignatureError::Encoding(e.to_string()))?;

        // HMAC takes keys of any length; `new` already refused an empty one.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .map_err(|e| SignatureError::Encoding(e.to_string()))?;
        mac.update(&bytes);
        Ok(mac)
    }

    /// Hex signature of `record`, ignoring any signature it already has.
    pub fn sign<T: Signable>(&self, record: &T) -> Result<String, SignatureError> {
        Ok(hex::encode(self.mac_of(record)?.finalize().into_bytes()))
    }

    /// Stores a fresh signature in `record`.
    pub fn seal<T: Signable>(&self, record: &mut T) -> Result<(), SignatureError> {
        let signature = self.sign(record)?;
        record.set_signature(Some(signature));
        Ok(())
    }

    /// Checks the signature carried by `record` in constant time.
    pub fn verify<T: Signable>(&self, record: &T) -> Result<(), SignatureError> {
        let provided = record.signature().ok_or(SignatureError::Missing)?;
        let provided = hex::decode(provided).map_err(|_| SignatureError::Mismatch)?;
        self.mac_of(record)?
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }
}
