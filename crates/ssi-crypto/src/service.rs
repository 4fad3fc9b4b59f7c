//! `SecureTransport`: the public API over every codec.
//!
//! The service holds only an injected key store and configuration. Each call
//! resolves its own keys, opens its own files, and shares nothing with
//! concurrent calls.

use anyhow::Context;
use ssi_core::config::SsiConfig;
use ssi_core::{SsiError, SsiResult};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::envelope::{self, CryptoMode, EnvelopeSummary, PackOptions};
use crate::file::{self, FileAck};
use crate::keys::Verkey;
use crate::keystore::{KeyStore, MemoryKeyStore, WalletFile};
use crate::message::{self, MessagePackage};
use crate::stream;

pub struct SecureTransport<K: KeyStore> {
    keys: K,
    config: SsiConfig,
}

/// Log a failed operation by error kind, passing the result through.
fn observe<T>(op: &'static str, result: SsiResult<T>) -> SsiResult<T> {
    if let Err(e) = &result {
        warn!(op, kind = e.kind(), class = ?e.class(), "operation failed: {e}");
    }
    result
}

fn parse_optional(verkey: Option<&str>) -> SsiResult<Option<Verkey>> {
    verkey.map(Verkey::parse).transpose()
}

impl SecureTransport<MemoryKeyStore> {
    /// Build a service over the JSON wallet named in `config.wallet.path`.
    /// Without a path the key store starts empty.
    pub fn from_wallet_config(config: SsiConfig) -> anyhow::Result<Self> {
        let wallet = match &config.wallet.path {
            Some(path) => WalletFile::load(path)
                .with_context(|| format!("opening wallet {}", path.display()))?,
            None => WalletFile::default(),
        };
        Ok(Self::new(wallet.into_key_store()?, config))
    }
}

impl<K: KeyStore> SecureTransport<K> {
    pub fn new(keys: K, config: SsiConfig) -> Self {
        Self { keys, config }
    }

    pub fn config(&self) -> &SsiConfig {
        &self.config
    }

    pub fn key_store(&self) -> &K {
        &self.keys
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    /// Encrypt a short message. With `sender_did` the package is authcrypt,
    /// without it anoncrypt. Returns the package JSON.
    pub async fn encrypt_message(
        &self,
        sender_did: Option<&str>,
        target_verkey: &str,
        plaintext: &[u8],
    ) -> SsiResult<String> {
        observe("encrypt_message", async {
            let sender = sender_did
                .map(|did| self.keys.resolve_keypair(did))
                .transpose()?;
            let target = Verkey::parse(target_verkey)?;
            let package = message::encrypt_message(sender.as_ref(), &target, plaintext)?;
            debug!(
                authcrypt = sender.is_some(),
                bytes = plaintext.len(),
                "message encrypted"
            );
            package.to_json()
        }
        .await)
    }

    pub async fn decrypt_message(
        &self,
        receiver_did: &str,
        sender_verkey: Option<&str>,
        package_json: &str,
    ) -> SsiResult<Vec<u8>> {
        observe("decrypt_message", async {
            let receiver = self.keys.resolve_keypair(receiver_did)?;
            let sender = parse_optional(sender_verkey)?;
            let package = MessagePackage::from_json(package_json)?;
            message::decrypt_message(&receiver, sender.as_ref(), &package)
        }
        .await)
    }

    // ── Single-shot files ────────────────────────────────────────────────────

    /// Encrypt a whole file into a signed v2 package.
    pub async fn encrypt_file(
        &self,
        sender_did: &str,
        target_verkey: &str,
        in_path: &Path,
        out_path: &Path,
    ) -> SsiResult<FileAck> {
        observe("encrypt_file", async {
            let sender = self.keys.resolve_keypair(sender_did)?;
            let target = Verkey::parse(target_verkey)?;
            let ack = file::encrypt_file(
                &sender,
                &target,
                in_path,
                out_path,
                None,
                &self.config.transfer,
            )
            .await?;
            info!(
                input = %in_path.display(),
                output = %out_path.display(),
                bytes = ack.bytes,
                "file encrypted"
            );
            Ok::<_, SsiError>(ack)
        }
        .await)
    }

    /// Encrypt a whole file into a legacy v1 package (anoncrypt without a sender).
    pub async fn encrypt_file_v1(
        &self,
        sender_did: Option<&str>,
        target_verkey: &str,
        in_path: &Path,
        out_path: &Path,
    ) -> SsiResult<FileAck> {
        observe("encrypt_file_v1", async {
            let sender = sender_did
                .map(|did| self.keys.resolve_keypair(did))
                .transpose()?;
            let target = Verkey::parse(target_verkey)?;
            let ack = file::encrypt_file_v1(
                sender.as_ref(),
                &target,
                in_path,
                out_path,
                &self.config.transfer,
            )
            .await?;
            info!(
                input = %in_path.display(),
                output = %out_path.display(),
                bytes = ack.bytes,
                "file encrypted (v1)"
            );
            Ok::<_, SsiError>(ack)
        }
        .await)
    }

    pub async fn decrypt_file(
        &self,
        receiver_did: &str,
        sender_verkey: Option<&str>,
        in_path: &Path,
        out_path: &Path,
    ) -> SsiResult<FileAck> {
        observe("decrypt_file", async {
            let receiver = self.keys.resolve_keypair(receiver_did)?;
            let sender = parse_optional(sender_verkey)?;
            let ack = file::decrypt_file(
                &receiver,
                sender.as_ref(),
                in_path,
                out_path,
                &self.config.transfer,
            )
            .await?;
            info!(
                input = %in_path.display(),
                output = %out_path.display(),
                format = ?ack.format,
                bytes = ack.bytes,
                "file decrypted"
            );
            Ok::<_, SsiError>(ack)
        }
        .await)
    }

    // ── SSIFILE2 streaming ───────────────────────────────────────────────────

    /// Stream-encrypt a file of any size. `chunk_size` of `None` or `0`
    /// selects the configured default.
    pub async fn encrypt_file_large(
        &self,
        sender_did: &str,
        target_verkey: &str,
        in_path: &Path,
        out_path: &Path,
        chunk_size: Option<usize>,
    ) -> SsiResult<FileAck> {
        observe("encrypt_file_large", async {
            let sender = self.keys.resolve_keypair(sender_did)?;
            let target = Verkey::parse(target_verkey)?;
            let ack = stream::encrypt_file_large(
                &sender,
                &target,
                in_path,
                out_path,
                chunk_size,
                &self.config.transfer,
            )
            .await?;
            info!(
                input = %in_path.display(),
                output = %out_path.display(),
                bytes = ack.bytes,
                chunks = ack.chunks,
                chunk_size = ack.chunk_size,
                "container written"
            );
            Ok::<_, SsiError>(ack)
        }
        .await)
    }

    /// Stream-decrypt an SSIFILE2 container. `chunk_size_hint` is accepted for
    /// call-site symmetry and ignored: the signed header decides.
    pub async fn decrypt_file_large(
        &self,
        receiver_did: &str,
        sender_verkey: Option<&str>,
        in_path: &Path,
        out_path: &Path,
        chunk_size_hint: Option<usize>,
    ) -> SsiResult<FileAck> {
        observe("decrypt_file_large", async {
            let receiver = self.keys.resolve_keypair(receiver_did)?;
            let sender = parse_optional(sender_verkey)?;
            let ack = stream::decrypt_file_large(
                &receiver,
                sender.as_ref(),
                in_path,
                out_path,
                &self.config.transfer,
            )
            .await?;
            if let Some(hint) = chunk_size_hint.filter(|h| Some(*h) != ack.chunk_size) {
                debug!(hint, header = ack.chunk_size, "ignored chunk size hint");
            }
            info!(
                input = %in_path.display(),
                output = %out_path.display(),
                bytes = ack.bytes,
                chunks = ack.chunks,
                "container decrypted"
            );
            Ok::<_, SsiError>(ack)
        }
        .await)
    }

    // ── Envelopes ────────────────────────────────────────────────────────────

    pub async fn envelope_pack_anoncrypt(
        &self,
        recipient_verkey: &str,
        kind: &str,
        plaintext: &[u8],
        options: PackOptions,
    ) -> SsiResult<String> {
        observe("envelope_pack_anoncrypt", async {
            let recipient = Verkey::parse(recipient_verkey)?;
            let env = envelope::pack(
                CryptoMode::Anoncrypt,
                None,
                &recipient,
                kind,
                plaintext,
                options,
                &self.config.envelope,
            )?;
            debug!(id = %env.id, kind = %env.kind, thread = %env.thread_id, "envelope packed");
            env.to_json()
        }
        .await)
    }

    pub async fn envelope_pack_authcrypt(
        &self,
        sender_did: &str,
        recipient_verkey: &str,
        kind: &str,
        plaintext: &[u8],
        options: PackOptions,
    ) -> SsiResult<String> {
        observe("envelope_pack_authcrypt", async {
            let sender = self.keys.resolve_keypair(sender_did)?;
            let recipient = Verkey::parse(recipient_verkey)?;
            let env = envelope::pack(
                CryptoMode::Authcrypt,
                Some(&sender),
                &recipient,
                kind,
                plaintext,
                options,
                &self.config.envelope,
            )?;
            debug!(id = %env.id, kind = %env.kind, thread = %env.thread_id, "envelope packed");
            env.to_json()
        }
        .await)
    }

    /// Validate and decrypt an envelope, choosing the mode from `crypto.mode`.
    pub async fn envelope_unpack_auto(
        &self,
        receiver_did: &str,
        envelope_json: &str,
    ) -> SsiResult<Vec<u8>> {
        observe("envelope_unpack_auto", async {
            let receiver = self.keys.resolve_keypair(receiver_did)?;
            envelope::unpack(&receiver, envelope_json, &self.config.envelope)
        }
        .await)
    }

    /// Metadata view of an envelope without validating or decrypting it.
    pub async fn envelope_parse(&self, envelope_json: &str) -> SsiResult<EnvelopeSummary> {
        observe("envelope_parse", envelope::parse(envelope_json))
    }
}
