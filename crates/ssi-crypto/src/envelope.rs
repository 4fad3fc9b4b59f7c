//! Generic envelope v1: a versioned, mode-tagged wrapper around a message package.
//!
//! ```json
//! {"v": 1, "id": "..", "kind": "offer", "thread_id": "..", "created_at_ms": 0,
//!  "expires_at_ms": 0, "from": {"did": "..", "verkey": ".."}, "to": {"verkey": ".."},
//!  "crypto": {"mode": "authcrypt", "alg": "..", "sender_verkey": "..", "recipient_verkey": ".."},
//!  "payload": {"content_type": "application/json", "encoding": "utf8", "ciphertext": "<package JSON>"},
//!  "meta": {}}
//! ```
//!
//! Unpacking validates structure strictly before any cryptography, then
//! decodes into a [`DecodedEnvelope`] variant and hands the payload to the
//! message codec.

use serde::{Deserialize, Serialize};
use ssi_core::config::EnvelopeConfig;
use ssi_core::{SsiError, SsiResult};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::keys::{DidKeypair, Verkey};
use crate::message::{self, MessagePackage};

pub const ENVELOPE_VERSION: u32 = 1;
pub const ENVELOPE_ALG: &str = "x25519-hkdf-sha256+xchacha20poly1305";
pub const PAYLOAD_ENCODING: &str = "utf8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMode {
    Anoncrypt,
    Authcrypt,
}

impl CryptoMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CryptoMode::Anoncrypt => "anoncrypt",
            CryptoMode::Authcrypt => "authcrypt",
        }
    }

    /// Exact match only: no trimming, no case folding.
    pub fn parse(mode: &str) -> SsiResult<Self> {
        match mode {
            "anoncrypt" => Ok(CryptoMode::Anoncrypt),
            "authcrypt" => Ok(CryptoMode::Authcrypt),
            other => Err(SsiError::InvalidCryptoMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    pub verkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoHeader {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_verkey: Option<String>,
    #[serde(default)]
    pub recipient_verkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub content_type: String,
    pub encoding: String,
    /// JSON-serialized [`MessagePackage`]
    pub ciphertext: String,
}

/// Envelope as it appears on the wire. Most fields default when absent, so a
/// broken envelope still parses and then fails validation with a specific error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u32,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Party>,
    pub to: Party,
    pub crypto: CryptoHeader,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// A validated envelope, one variant per supported (version, mode).
#[derive(Debug, Clone)]
pub enum DecodedEnvelope {
    AnoncryptV1 {
        envelope: Envelope,
        package: MessagePackage,
    },
    AuthcryptV1 {
        envelope: Envelope,
        sender: Verkey,
        package: MessagePackage,
    },
}

/// Optional inputs to [`pack`].
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Generated when absent.
    pub thread_id: Option<String>,
    /// Milliseconds since the epoch; must be positive.
    pub expires_at_ms: Option<i64>,
    /// Free-form JSON stored as `meta`.
    pub meta_json: Option<String>,
    /// Overrides the configured `payload.content_type`.
    pub content_type: Option<String>,
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl Envelope {
    pub fn to_json(&self) -> SsiResult<String> {
        serde_json::to_string(self)
            .map_err(|e| anyhow::anyhow!("serializing envelope: {e}").into())
    }

    pub fn from_json(json: &str) -> SsiResult<Self> {
        serde_json::from_str(json).map_err(|e| SsiError::MalformedPackage(e.to_string()))
    }

    /// Structural validation, in a fixed order, before any cryptography:
    /// version, mode, kind, thread, `to.verkey`, sender presence, recipient,
    /// sender consistency, expiry, payload decoding.
    pub fn validate(
        self,
        receiver: &Verkey,
        now_ms: u64,
        enforce_expiry: bool,
    ) -> SsiResult<DecodedEnvelope> {
        if self.v != ENVELOPE_VERSION {
            return Err(SsiError::UnsupportedVersion(self.v));
        }
        let mode = CryptoMode::parse(&self.crypto.mode)?;
        if self.kind.trim().is_empty() {
            return Err(SsiError::EmptyKind);
        }
        if self.thread_id.trim().is_empty() {
            return Err(SsiError::EmptyThreadId);
        }
        if self.to.verkey.trim().is_empty() {
            return Err(SsiError::InvalidInput("to.verkey is empty".into()));
        }
        let sender_verkey = match mode {
            CryptoMode::Authcrypt => Some(
                self.crypto
                    .sender_verkey
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(SsiError::MissingSenderVerkey)?,
            ),
            CryptoMode::Anoncrypt => None,
        };
        if self.crypto.recipient_verkey.trim() != receiver.as_str() {
            return Err(SsiError::RecipientMismatch);
        }
        if let (Some(sender), Some(from)) = (sender_verkey, &self.from) {
            if from.verkey.trim() != sender {
                return Err(SsiError::SenderMismatch);
            }
        }
        let sender = sender_verkey.map(Verkey::parse).transpose()?;
        if let Some(expires_at_ms) = self.expires_at_ms {
            if expires_at_ms <= self.created_at_ms {
                return Err(SsiError::InvalidInput(
                    "expires_at_ms must be after created_at_ms".into(),
                ));
            }
            if enforce_expiry && now_ms > expires_at_ms {
                return Err(SsiError::Expired { expires_at_ms });
            }
        }

        if self.payload.encoding != PAYLOAD_ENCODING {
            return Err(SsiError::MalformedPackage(format!(
                "unsupported payload encoding {:?}",
                self.payload.encoding
            )));
        }
        let package = MessagePackage::from_json(&self.payload.ciphertext)?;

        Ok(match sender {
            Some(sender) => DecodedEnvelope::AuthcryptV1 {
                envelope: self,
                sender,
                package,
            },
            None => DecodedEnvelope::AnoncryptV1 {
                envelope: self,
                package,
            },
        })
    }
}

/// Build an envelope around `plaintext`. Authcrypt requires `sender`;
/// anoncrypt refuses one.
pub fn pack(
    mode: CryptoMode,
    sender: Option<&DidKeypair>,
    recipient: &Verkey,
    kind: &str,
    plaintext: &[u8],
    options: PackOptions,
    config: &EnvelopeConfig,
) -> SsiResult<Envelope> {
    let sender = match (mode, sender) {
        (CryptoMode::Authcrypt, Some(sender)) => Some(sender),
        (CryptoMode::Authcrypt, None) => return Err(SsiError::MissingSenderVerkey),
        (CryptoMode::Anoncrypt, None) => None,
        (CryptoMode::Anoncrypt, Some(_)) => {
            return Err(SsiError::InvalidInput(
                "anoncrypt envelopes carry no sender".into(),
            ))
        }
    };
    if kind.trim().is_empty() {
        return Err(SsiError::EmptyKind);
    }
    let thread_id = match options.thread_id {
        Some(t) if t.trim().is_empty() => return Err(SsiError::EmptyThreadId),
        Some(t) => t,
        None => uuid::Uuid::new_v4().to_string(),
    };
    let expires_at_ms = match options.expires_at_ms {
        Some(ms) if ms <= 0 => {
            return Err(SsiError::InvalidInput(format!(
                "expires_at_ms must be positive, got {ms}"
            )))
        }
        Some(ms) => Some(ms as u64),
        None => None,
    };
    let meta = options
        .meta_json
        .map(|json| {
            serde_json::from_str::<serde_json::Value>(&json)
                .map_err(|e| SsiError::InvalidInput(format!("meta_json: {e}")))
        })
        .transpose()?;

    let created_at_ms = now_ms();
    if let Some(expires) = expires_at_ms {
        if expires <= created_at_ms {
            return Err(SsiError::InvalidInput(
                "expires_at_ms must be in the future".into(),
            ));
        }
    }

    let package = message::encrypt_message(sender, recipient, plaintext)?;

    Ok(Envelope {
        v: ENVELOPE_VERSION,
        id: uuid::Uuid::new_v4().to_string(),
        kind: kind.to_string(),
        thread_id,
        created_at_ms,
        expires_at_ms,
        from: sender.map(|s| Party {
            did: Some(s.did().to_string()),
            verkey: s.verkey().to_string(),
        }),
        to: Party {
            did: None,
            verkey: recipient.to_string(),
        },
        crypto: CryptoHeader {
            mode: mode.as_str().to_string(),
            alg: ENVELOPE_ALG.to_string(),
            sender_verkey: sender.map(|s| s.verkey().to_string()),
            recipient_verkey: recipient.to_string(),
        },
        payload: Payload {
            content_type: options
                .content_type
                .unwrap_or_else(|| config.default_content_type.clone()),
            encoding: PAYLOAD_ENCODING.to_string(),
            ciphertext: package.to_json()?,
        },
        meta,
    })
}

/// Validate and decrypt an envelope addressed to `receiver`, detecting the mode
/// from `crypto.mode`.
pub fn unpack(receiver: &DidKeypair, json: &str, config: &EnvelopeConfig) -> SsiResult<Vec<u8>> {
    unpack_at(receiver, json, now_ms(), config.enforce_expiry)
}

pub fn unpack_at(
    receiver: &DidKeypair,
    json: &str,
    now_ms: u64,
    enforce_expiry: bool,
) -> SsiResult<Vec<u8>> {
    let decoded = Envelope::from_json(json)?.validate(receiver.verkey(), now_ms, enforce_expiry)?;
    match decoded {
        DecodedEnvelope::AnoncryptV1 { package, .. } => {
            message::decrypt_message(receiver, None, &package)
        }
        DecodedEnvelope::AuthcryptV1 {
            sender, package, ..
        } => message::decrypt_message(receiver, Some(&sender), &package),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CryptoSummary {
    pub mode: String,
    pub alg: String,
    pub sender_verkey: Option<String>,
    pub recipient_verkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadSummary {
    pub content_type: String,
    pub encoding: String,
    pub ciphertext_len: usize,
}

/// Metadata view of an envelope. Produced without validation or decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvelopeSummary {
    pub v: u32,
    pub id: String,
    pub kind: String,
    pub thread_id: String,
    pub created_at_ms: u64,
    pub expires_at_ms: Option<u64>,
    pub from: Option<Party>,
    pub to: Party,
    pub crypto: CryptoSummary,
    pub payload: PayloadSummary,
    pub meta_present: bool,
}

pub fn parse(json: &str) -> SsiResult<EnvelopeSummary> {
    let env = Envelope::from_json(json)?;
    Ok(EnvelopeSummary {
        v: env.v,
        id: env.id,
        kind: env.kind,
        thread_id: env.thread_id,
        created_at_ms: env.created_at_ms,
        expires_at_ms: env.expires_at_ms,
        from: env.from,
        to: env.to,
        crypto: CryptoSummary {
            mode: env.crypto.mode,
            alg: env.crypto.alg,
            sender_verkey: env.crypto.sender_verkey,
            recipient_verkey: env.crypto.recipient_verkey,
        },
        payload: PayloadSummary {
            content_type: env.payload.content_type,
            encoding: env.payload.encoding,
            ciphertext_len: env.payload.ciphertext.len(),
        },
        meta_present: env.meta.is_some(),
    })
}
