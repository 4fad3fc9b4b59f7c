//! DID key material: verkeys, signing keypairs, content keys, and key wrapping

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use ssi_core::{SsiError, SsiResult};
use zeroize::Zeroize;

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// A base58-encoded Ed25519 public key, validated on construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Verkey {
    encoded: String,
    key: VerifyingKey,
}

impl Verkey {
    /// Parse a base58 verkey. Fails with `InvalidVerkey` on bad alphabet,
    /// wrong length, or bytes that are not a valid curve point.
    pub fn parse(encoded: &str) -> SsiResult<Self> {
        let trimmed = encoded.trim();
        if trimmed.is_empty() {
            return Err(SsiError::InvalidVerkey("empty verkey".into()));
        }
        let bytes = bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| SsiError::InvalidVerkey(format!("base58: {e}")))?;
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            SsiError::InvalidVerkey(format!("expected {KEY_SIZE} bytes, got {}", v.len()))
        })?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SsiError::InvalidVerkey("not an Ed25519 point".into()))?;
        Ok(Self {
            encoded: trimmed.to_string(),
            key,
        })
    }

    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self {
            encoded: bs58::encode(key.as_bytes()).into_string(),
            key,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        self.key.as_bytes()
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }
}

impl std::fmt::Display for Verkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl std::fmt::Debug for Verkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Verkey").field(&self.encoded).finish()
    }
}

/// An Ed25519 keypair bound to a DID. The signing half never leaves this type.
#[derive(Clone)]
pub struct DidKeypair {
    did: String,
    signing: SigningKey,
    verkey: Verkey,
}

impl DidKeypair {
    pub fn from_seed(did: impl Into<String>, seed: [u8; KEY_SIZE]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let verkey = Verkey::from_verifying_key(signing.verifying_key());
        Self {
            did: did.into(),
            signing,
            verkey,
        }
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn verkey(&self) -> &Verkey {
        &self.verkey
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// The 32-byte seed, for persisting into a wallet file.
    pub fn seed(&self) -> [u8; KEY_SIZE] {
        self.signing.to_bytes()
    }
}

impl std::fmt::Debug for DidKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DidKeypair")
            .field("did", &self.did)
            .field("verkey", &self.verkey)
            .field("signing", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh DID keypair. The DID is the base58 of the first 16
/// bytes of the verkey, the usual Indy-style unqualified DID.
pub fn generate_did() -> DidKeypair {
    let signing = SigningKey::generate(&mut OsRng);
    let verkey = Verkey::from_verifying_key(signing.verifying_key());
    let did = bs58::encode(&verkey.as_bytes()[..16]).into_string();
    DidKeypair {
        did,
        signing,
        verkey,
    }
}

/// A 256-bit symmetric key (KEK or per-file content key). Zeroized on drop.
#[derive(Clone)]
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit content key.
pub fn generate_content_key() -> ContentKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    ContentKey::from_bytes(bytes)
}

/// HKDF-SHA256 key derivation with a salt and a domain-specific info string.
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8]) -> SsiResult<ContentKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(ContentKey::from_bytes(okm))
}

/// Wrap (encrypt) a content key under a KEK.
///
/// Uses XChaCha20-Poly1305 with a random nonce; `aad` binds the wrapped key
/// to its container.
/// Output: `[24-byte nonce][ciphertext + 16-byte tag]`
pub fn wrap_key(kek: &ContentKey, key: &ContentKey, aad: &[u8]) -> SsiResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(kek.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: key.as_bytes(),
                aad,
            },
        )
        .map_err(|e| anyhow::anyhow!("key wrapping failed: {e}"))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Unwrap (decrypt) a content key. Any failure is reported as `DecryptFailed`.
///
/// Input: `[24-byte nonce][ciphertext + 16-byte tag]` (output of `wrap_key`)
pub fn unwrap_key(kek: &ContentKey, wrapped: &[u8], aad: &[u8]) -> SsiResult<ContentKey> {
    if wrapped.len() != NONCE_SIZE + KEY_SIZE + TAG_SIZE {
        return Err(SsiError::DecryptFailed);
    }

    let (nonce_bytes, ciphertext) = wrapped.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(kek.as_bytes().into());

    let mut plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| SsiError::DecryptFailed)?;

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(ContentKey::from_bytes(key_bytes))
}
