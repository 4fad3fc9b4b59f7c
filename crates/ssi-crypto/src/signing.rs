//! Detached Ed25519 signatures over domain-separated canonical JSON.
//!
//! Signed bytes: `domain || 0x00 || serde_json::to_vec(fields)`. Field order
//! is fixed by the Rust struct declaration, so every signer and verifier
//! produces the same bytes for the same values.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, Verifier};
use serde::{Deserialize, Serialize};
use ssi_core::{SsiError, SsiResult};

use crate::keys::{DidKeypair, Verkey};

pub const SIG_ALG: &str = "ed25519";

/// A detached signature as it appears in package and header JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSig {
    pub alg: String,
    /// base64 signature bytes
    pub value: String,
}

/// Canonical bytes of `fields` under `domain`.
pub fn signing_input<T: Serialize>(domain: &str, fields: &T) -> SsiResult<Vec<u8>> {
    let body = serde_json::to_vec(fields)
        .map_err(|e| anyhow::anyhow!("canonical serialization failed: {e}"))?;
    let mut input = Vec::with_capacity(domain.len() + 1 + body.len());
    input.extend_from_slice(domain.as_bytes());
    input.push(0);
    input.extend_from_slice(&body);
    Ok(input)
}

pub fn sign_detached(signer: &DidKeypair, input: &[u8]) -> DetachedSig {
    let signature = signer.signing_key().sign(input);
    DetachedSig {
        alg: SIG_ALG.to_string(),
        value: STANDARD.encode(signature.to_bytes()),
    }
}

/// Verify `sig` over `input` under `signer`. Every failure, including a
/// malformed signature encoding or unknown algorithm, is reported as
/// `SignatureVerificationFailed`.
pub fn verify_detached(signer: &Verkey, input: &[u8], sig: &DetachedSig) -> SsiResult<()> {
    if sig.alg != SIG_ALG {
        return Err(SsiError::SignatureVerificationFailed);
    }
    let bytes = STANDARD
        .decode(&sig.value)
        .map_err(|_| SsiError::SignatureVerificationFailed)?;
    let signature =
        Signature::from_slice(&bytes).map_err(|_| SsiError::SignatureVerificationFailed)?;
    signer
        .verifying_key()
        .verify_strict(input, &signature)
        .map_err(|_| SsiError::SignatureVerificationFailed)
}
