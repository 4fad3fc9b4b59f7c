//! Single-shot file codec: the whole file sealed in one AEAD operation.
//!
//! v1 (legacy) is a message package over the file bytes:
//! ```json
//! {"ciphertext": "..", "nonce": "..", "sender_verkey": "..", "target_verkey": ".."}
//! ```
//!
//! v2 is always authcrypt and adds signed metadata:
//! ```json
//! {"v": 2, "alg": "..", "sender_verkey": "..", "target_verkey": "..",
//!  "meta": {"filename": "..", "bytes": 123, "note": ".."},
//!  "nonce": "..", "ciphertext": "..", "sig": {"alg": "ed25519", "value": ".."}}
//! ```
//!
//! The v2 signature covers `v`, `alg`, both verkeys and `meta`. It is checked
//! before any decryption, and its SHA-256 is also the AEAD associated data, so
//! the ciphertext cannot be moved under different metadata.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ssi_core::config::TransferConfig;
use ssi_core::{SsiError, SsiResult};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::keys::{DidKeypair, Verkey};
use crate::message::{self, Sealed};
use crate::output::{clear_target_on_error, PendingOutput};
use crate::signing::{sign_detached, signing_input, verify_detached, DetachedSig};

pub const FILE_V2_DOMAIN: &str = "ssi-file-v2";
pub const FILE_ALG: &str = "x25519-hkdf-sha256+xchacha20poly1305";

/// Which container format a file operation produced or consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    #[serde(rename = "ssi-file-v1")]
    SingleShotV1,
    #[serde(rename = "ssi-file-v2")]
    SingleShotV2,
    #[serde(rename = "SSIFILE2")]
    Streaming,
}

/// Result of a file operation, returned to callers as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAck {
    pub format: FileFormat,
    pub filename: String,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<u64>,
    pub output: PathBuf,
}

impl FileAck {
    pub fn to_json(&self) -> SsiResult<String> {
        serde_json::to_string(self).map_err(|e| anyhow::anyhow!("serializing ack: {e}").into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub filename: String,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePackageV2 {
    pub v: u32,
    pub alg: String,
    pub sender_verkey: String,
    pub target_verkey: String,
    pub meta: FileMeta,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: DetachedSig,
}

#[derive(Serialize)]
struct SignedFieldsV2<'a> {
    v: u32,
    alg: &'a str,
    sender_verkey: &'a str,
    target_verkey: &'a str,
    meta: &'a FileMeta,
}

impl FilePackageV2 {
    fn signed_input(
        alg: &str,
        sender_verkey: &str,
        target_verkey: &str,
        meta: &FileMeta,
    ) -> SsiResult<Vec<u8>> {
        signing_input(
            FILE_V2_DOMAIN,
            &SignedFieldsV2 {
                v: 2,
                alg,
                sender_verkey,
                target_verkey,
                meta,
            },
        )
    }
}

/// Every field any version may carry. Only used to pick a strict variant.
#[derive(Deserialize)]
struct RawFilePackage {
    #[serde(default)]
    v: Option<u32>,
    ciphertext: String,
    nonce: String,
    #[serde(default)]
    sender_verkey: Option<String>,
    target_verkey: String,
    #[serde(default)]
    epk: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    meta: Option<FileMeta>,
    #[serde(default)]
    sig: Option<DetachedSig>,
}

/// A decoded single-shot package.
#[derive(Debug, Clone)]
pub enum FilePackage {
    V1(message::MessagePackage),
    V2(FilePackageV2),
}

impl FilePackage {
    pub fn from_json(json: &[u8]) -> SsiResult<Self> {
        let raw: RawFilePackage = serde_json::from_slice(json)
            .map_err(|e| SsiError::MalformedPackage(e.to_string()))?;
        match raw.v {
            None | Some(1) => {
                if raw.meta.is_some() || raw.sig.is_some() {
                    return Err(SsiError::MalformedPackage(
                        "v1 package must not carry meta or sig".into(),
                    ));
                }
                Ok(Self::V1(message::MessagePackage {
                    ciphertext: raw.ciphertext,
                    nonce: raw.nonce,
                    sender_verkey: raw.sender_verkey,
                    target_verkey: raw.target_verkey,
                    epk: raw.epk,
                }))
            }
            Some(2) => {
                if raw.epk.is_some() {
                    return Err(SsiError::MalformedPackage(
                        "v2 packages are authcrypt only".into(),
                    ));
                }
                let missing =
                    |field: &str| SsiError::MalformedPackage(format!("v2 missing {field}"));
                Ok(Self::V2(FilePackageV2 {
                    v: 2,
                    alg: raw.alg.ok_or_else(|| missing("alg"))?,
                    sender_verkey: raw.sender_verkey.ok_or_else(|| missing("sender_verkey"))?,
                    target_verkey: raw.target_verkey,
                    meta: raw.meta.ok_or_else(|| missing("meta"))?,
                    nonce: raw.nonce,
                    ciphertext: raw.ciphertext,
                    sig: raw.sig.ok_or_else(|| missing("sig"))?,
                }))
            }
            Some(other) => Err(SsiError::UnsupportedVersion(other)),
        }
    }
}

fn file_name_of(path: &Path) -> SsiResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SsiError::InvalidInput(format!("{} has no file name", path.display())))
}

async fn read_bounded(path: &Path, limit: u64) -> SsiResult<Vec<u8>> {
    let len = tokio::fs::metadata(path).await?.len();
    if len > limit {
        return Err(SsiError::InvalidInput(format!(
            "{} is {len} bytes, above the single-shot limit of {limit}; use the streaming codec",
            path.display()
        )));
    }
    Ok(tokio::fs::read(path).await?)
}

async fn write_output(out_path: &Path, bytes: &[u8]) -> SsiResult<()> {
    let mut out = PendingOutput::create(out_path).await?;
    out.writer().write_all(bytes).await?;
    out.commit().await
}

/// Encrypt `in_path` into a signed v2 package at `out_path`.
pub async fn encrypt_file(
    sender: &DidKeypair,
    target: &Verkey,
    in_path: &Path,
    out_path: &Path,
    note: Option<String>,
    limits: &TransferConfig,
) -> SsiResult<FileAck> {
    let filename = file_name_of(in_path)?;
    let plaintext = read_bounded(in_path, limits.max_single_shot_bytes).await?;
    let meta = FileMeta {
        filename: filename.clone(),
        bytes: plaintext.len() as u64,
        note,
    };

    let signed = FilePackageV2::signed_input(
        FILE_ALG,
        sender.verkey().as_str(),
        target.as_str(),
        &meta,
    )?;
    let sig = sign_detached(sender, &signed);
    let aad = Sha256::digest(&signed);
    let sealed = message::seal(Some(sender), target, &plaintext, &aad)?;

    let package = FilePackageV2 {
        v: 2,
        alg: FILE_ALG.to_string(),
        sender_verkey: sender.verkey().to_string(),
        target_verkey: target.to_string(),
        meta,
        nonce: sealed.nonce_b64(),
        ciphertext: sealed.ciphertext_b64(),
        sig,
    };
    let json = serde_json::to_vec(&package)
        .map_err(|e| anyhow::anyhow!("serializing file package: {e}"))?;
    write_output(out_path, &json).await?;

    Ok(FileAck {
        format: FileFormat::SingleShotV2,
        filename,
        bytes: package.meta.bytes,
        chunk_size: None,
        chunks: None,
        output: out_path.to_path_buf(),
    })
}

/// Encrypt `in_path` into a legacy v1 package. Without a sender this is anoncrypt.
pub async fn encrypt_file_v1(
    sender: Option<&DidKeypair>,
    target: &Verkey,
    in_path: &Path,
    out_path: &Path,
    limits: &TransferConfig,
) -> SsiResult<FileAck> {
    let filename = file_name_of(in_path)?;
    let plaintext = read_bounded(in_path, limits.max_single_shot_bytes).await?;
    let package = message::encrypt_message(sender, target, &plaintext)?;
    let json = serde_json::to_vec(&package)
        .map_err(|e| anyhow::anyhow!("serializing file package: {e}"))?;
    write_output(out_path, &json).await?;

    Ok(FileAck {
        format: FileFormat::SingleShotV1,
        filename,
        bytes: plaintext.len() as u64,
        chunk_size: None,
        chunks: None,
        output: out_path.to_path_buf(),
    })
}

/// Decrypt a v1 or v2 package at `in_path` into `out_path`. On failure
/// nothing is left at `out_path`.
pub async fn decrypt_file(
    receiver: &DidKeypair,
    expected_sender: Option<&Verkey>,
    in_path: &Path,
    out_path: &Path,
    limits: &TransferConfig,
) -> SsiResult<FileAck> {
    let result = open_package_file(receiver, expected_sender, in_path, out_path, limits).await;
    clear_target_on_error(out_path, result).await
}

async fn open_package_file(
    receiver: &DidKeypair,
    expected_sender: Option<&Verkey>,
    in_path: &Path,
    out_path: &Path,
    limits: &TransferConfig,
) -> SsiResult<FileAck> {
    // base64 inflates by 4/3; allow headroom for the JSON fields around it
    let package_limit = limits
        .max_single_shot_bytes
        .saturating_mul(4)
        / 3
        + limits.max_header_len as u64;
    let json = read_bounded(in_path, package_limit).await?;

    let (format, filename, plaintext) = match FilePackage::from_json(&json)? {
        FilePackage::V1(package) => {
            let plaintext = message::decrypt_message(receiver, expected_sender, &package)?;
            (FileFormat::SingleShotV1, file_name_of(out_path)?, plaintext)
        }
        FilePackage::V2(package) => {
            let plaintext = open_v2(receiver, expected_sender, &package)?;
            (FileFormat::SingleShotV2, package.meta.filename, plaintext)
        }
    };

    write_output(out_path, &plaintext).await?;
    Ok(FileAck {
        format,
        filename,
        bytes: plaintext.len() as u64,
        chunk_size: None,
        chunks: None,
        output: out_path.to_path_buf(),
    })
}

fn open_v2(
    receiver: &DidKeypair,
    expected_sender: Option<&Verkey>,
    package: &FilePackageV2,
) -> SsiResult<Vec<u8>> {
    if package.alg != FILE_ALG {
        return Err(SsiError::MalformedPackage(format!(
            "unknown alg {:?}",
            package.alg
        )));
    }
    let sender = Verkey::parse(&package.sender_verkey)?;
    let signed = FilePackageV2::signed_input(
        &package.alg,
        &package.sender_verkey,
        &package.target_verkey,
        &package.meta,
    )?;
    verify_detached(&sender, &signed, &package.sig)?;

    match expected_sender {
        None => return Err(SsiError::MissingSenderVerkey),
        Some(expected) if *expected != sender => return Err(SsiError::SenderMismatch),
        Some(_) => {}
    }

    let sealed = Sealed::decode(
        &package.ciphertext,
        &package.nonce,
        Some(&package.sender_verkey),
        &package.target_verkey,
        None,
    )?;
    let aad = Sha256::digest(&signed);
    let plaintext = message::open(receiver, Some(&sender), &sealed, &aad)?;

    if plaintext.len() as u64 != package.meta.bytes {
        return Err(SsiError::MalformedPackage(format!(
            "meta.bytes is {} but payload is {} bytes",
            package.meta.bytes,
            plaintext.len()
        )));
    }
    Ok(plaintext)
}
