//! Small-message codec: one plaintext, one AEAD operation, one flat JSON package.
//!
//! ```json
//! {"ciphertext": "<b64>", "nonce": "<b64>", "sender_verkey": "<b58>", "target_verkey": "<b58>"}
//! {"ciphertext": "<b64>", "nonce": "<b64>", "epk": "<b64>",          "target_verkey": "<b58>"}
//! ```
//!
//! The first form is authcrypt (key derived from both parties' keys), the
//! second anoncrypt (key derived from a one-time ephemeral key). A package
//! must carry exactly one of `sender_verkey` / `epk`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use ssi_core::{SsiError, SsiResult};

use crate::agreement::{anoncrypt_open_kek, anoncrypt_seal_kek, authcrypt_kek, Role};
use crate::keys::{ContentKey, DidKeypair, Verkey};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

pub const AUTHCRYPT_INFO: &[u8] = b"ssi:authcrypt:v1";
pub const ANONCRYPT_INFO: &[u8] = b"ssi:anoncrypt:v1";

/// Wire form of an encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePackage {
    pub ciphertext: String,
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_verkey: Option<String>,
    pub target_verkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epk: Option<String>,
}

impl MessagePackage {
    pub fn to_json(&self) -> SsiResult<String> {
        serde_json::to_string(self)
            .map_err(|e| anyhow::anyhow!("serializing message package: {e}").into())
    }

    pub fn from_json(json: &str) -> SsiResult<Self> {
        serde_json::from_str(json).map_err(|e| SsiError::MalformedPackage(e.to_string()))
    }
}

/// How the content key of a sealed payload was agreed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sealing {
    Authcrypt { sender: Verkey },
    Anoncrypt { epk: [u8; KEY_SIZE] },
}

/// A sealed payload with its key-agreement parameters, decoded from the wire.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub sealing: Sealing,
    pub target: Verkey,
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// Decode the wire fields strictly. Nonce and tag lengths are checked here
    /// but reported as `DecryptFailed`, the same outcome as a bad tag.
    pub fn decode(
        ciphertext: &str,
        nonce: &str,
        sender_verkey: Option<&str>,
        target_verkey: &str,
        epk: Option<&str>,
    ) -> SsiResult<Self> {
        let sealing = match (sender_verkey, epk) {
            (Some(sender), None) => Sealing::Authcrypt {
                sender: Verkey::parse(sender)?,
            },
            (None, Some(epk)) => {
                let bytes = STANDARD
                    .decode(epk)
                    .map_err(|e| SsiError::MalformedPackage(format!("epk: {e}")))?;
                let epk: [u8; KEY_SIZE] = bytes
                    .try_into()
                    .map_err(|_| SsiError::MalformedPackage("epk must be 32 bytes".into()))?;
                Sealing::Anoncrypt { epk }
            }
            (Some(_), Some(_)) => {
                return Err(SsiError::MalformedPackage(
                    "package carries both sender_verkey and epk".into(),
                ))
            }
            (None, None) => {
                return Err(SsiError::MalformedPackage(
                    "package carries neither sender_verkey nor epk".into(),
                ))
            }
        };

        let target = Verkey::parse(target_verkey)?;
        let nonce = STANDARD
            .decode(nonce)
            .map_err(|e| SsiError::MalformedPackage(format!("nonce: {e}")))?;
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| SsiError::DecryptFailed)?;
        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|e| SsiError::MalformedPackage(format!("ciphertext: {e}")))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(SsiError::DecryptFailed);
        }

        Ok(Self {
            sealing,
            target,
            nonce,
            ciphertext,
        })
    }

    pub fn sender_verkey(&self) -> Option<&Verkey> {
        match &self.sealing {
            Sealing::Authcrypt { sender } => Some(sender),
            Sealing::Anoncrypt { .. } => None,
        }
    }

    pub fn epk_b64(&self) -> Option<String> {
        match &self.sealing {
            Sealing::Authcrypt { .. } => None,
            Sealing::Anoncrypt { epk } => Some(STANDARD.encode(epk)),
        }
    }

    pub fn nonce_b64(&self) -> String {
        STANDARD.encode(self.nonce)
    }

    pub fn ciphertext_b64(&self) -> String {
        STANDARD.encode(&self.ciphertext)
    }
}

/// Seal `plaintext` for `target`. With a sender this is authcrypt, without
/// one anoncrypt. `aad` is authenticated but not encrypted.
pub fn seal(
    sender: Option<&DidKeypair>,
    target: &Verkey,
    plaintext: &[u8],
    aad: &[u8],
) -> SsiResult<Sealed> {
    let (sealing, key) = match sender {
        Some(sender) => {
            let key = authcrypt_kek(sender, target, Role::Sender, b"", AUTHCRYPT_INFO)?;
            (
                Sealing::Authcrypt {
                    sender: sender.verkey().clone(),
                },
                key,
            )
        }
        None => {
            let (epk, key) = anoncrypt_seal_kek(target, b"", ANONCRYPT_INFO)?;
            (Sealing::Anoncrypt { epk }, key)
        }
    };

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = XChaCha20Poly1305::new(key.as_bytes().into())
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| anyhow::anyhow!("message encryption failed: {e}"))?;

    Ok(Sealed {
        sealing,
        target: target.clone(),
        nonce,
        ciphertext,
    })
}

/// Open a sealed payload as `receiver`.
///
/// `expected_sender` is the sender the caller trusts. For authcrypt the key is
/// derived from it rather than from the verkey recorded in the package, so a
/// wrong sender fails authentication. Anoncrypt payloads have no sender and
/// reject an expected one.
pub fn open(
    receiver: &DidKeypair,
    expected_sender: Option<&Verkey>,
    sealed: &Sealed,
    aad: &[u8],
) -> SsiResult<Vec<u8>> {
    if &sealed.target != receiver.verkey() {
        return Err(SsiError::RecipientMismatch);
    }

    let key: ContentKey = match (&sealed.sealing, expected_sender) {
        (Sealing::Authcrypt { .. }, Some(sender)) => {
            authcrypt_kek(receiver, sender, Role::Recipient, b"", AUTHCRYPT_INFO)?
        }
        (Sealing::Authcrypt { .. }, None) => return Err(SsiError::MissingSenderVerkey),
        (Sealing::Anoncrypt { epk }, None) => {
            anoncrypt_open_kek(receiver, epk, b"", ANONCRYPT_INFO)?
        }
        (Sealing::Anoncrypt { .. }, Some(_)) => return Err(SsiError::SenderMismatch),
    };

    XChaCha20Poly1305::new(key.as_bytes().into())
        .decrypt(
            XNonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map_err(|_| SsiError::DecryptFailed)
}

/// Encrypt a short plaintext into a [`MessagePackage`].
pub fn encrypt_message(
    sender: Option<&DidKeypair>,
    target: &Verkey,
    plaintext: &[u8],
) -> SsiResult<MessagePackage> {
    let sealed = seal(sender, target, plaintext, b"")?;
    Ok(MessagePackage {
        ciphertext: sealed.ciphertext_b64(),
        nonce: sealed.nonce_b64(),
        sender_verkey: sealed.sender_verkey().map(|v| v.to_string()),
        target_verkey: target.to_string(),
        epk: sealed.epk_b64(),
    })
}

/// Decrypt a [`MessagePackage`] addressed to `receiver`.
pub fn decrypt_message(
    receiver: &DidKeypair,
    expected_sender: Option<&Verkey>,
    package: &MessagePackage,
) -> SsiResult<Vec<u8>> {
    let sealed = Sealed::decode(
        &package.ciphertext,
        &package.nonce,
        package.sender_verkey.as_deref(),
        &package.target_verkey,
        package.epk.as_deref(),
    )?;
    open(receiver, expected_sender, &sealed, b"")
}
