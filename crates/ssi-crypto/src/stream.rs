//! SSIFILE2: streaming large-file codec with constant memory.
//!
//! Container layout:
//! ```text
//! [8 bytes: "SSIFILE2"][4 bytes: header_len u32 LE][header_len bytes: header JSON]
//! [chunk 0][chunk 1]...[chunk n-1]
//! ```
//!
//! Each chunk is `ciphertext || tag` sealed by [`ChunkCipher`]. Chunks carry no
//! length prefix: every chunk but the last holds exactly `chunk_size` plaintext
//! bytes and the last holds the remainder, so the signed `meta.bytes` and
//! `chunk_size` fix every boundary. An empty file is a single empty final chunk.
//!
//! The header is written twice. A placeholder with the widest possible
//! `meta.bytes` reserves the region before streaming; once the length is known
//! the signed header is written over it, padded with trailing spaces to the
//! same length.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use ssi_core::config::TransferConfig;
use ssi_core::{SsiError, SsiResult};
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader,
};
use tracing::debug;

use crate::agreement::{authcrypt_kek, Role};
use crate::chunk::{ChunkCipher, FILE_ID_SIZE};
use crate::file::{FileAck, FileFormat};
use crate::keys::{generate_content_key, unwrap_key, wrap_key, DidKeypair, Verkey};
use crate::output::{clear_target_on_error, PendingOutput};
use crate::signing::{sign_detached, signing_input, verify_detached, DetachedSig, SIG_ALG};
use crate::{NONCE_SIZE, TAG_SIZE};

pub const MAGIC: &[u8; 8] = b"SSIFILE2";
pub const HEADER_VERSION: u32 = 2;
pub const HEADER_DOMAIN: &str = "SSIFILE2-header";
pub const STREAM_ALG: &str = "xchacha20poly1305-chunked";
/// HKDF info for the KEK that wraps each file's content key.
pub const STREAM_KEK_INFO: &[u8] = b"ssi:ssifile2:kek:v1";

const PREFIX_LEN: u64 = (MAGIC.len() + 4) as u64;
const ED25519_SIG_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMeta {
    pub filename: String,
    pub bytes: u64,
}

/// The signed JSON header of an SSIFILE2 container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub v: u32,
    pub alg: String,
    pub sender_verkey: String,
    pub recipient_verkey: String,
    /// base64, 32 bytes
    pub file_id: String,
    /// base64 `[nonce][wrapped content key + tag]`
    pub wrapped_key: String,
    /// base64, 24 bytes
    pub base_nonce: String,
    pub chunk_size: u64,
    pub meta: StreamMeta,
    pub sig: DetachedSig,
}

#[derive(Serialize)]
struct SignedHeaderFields<'a> {
    v: u32,
    alg: &'a str,
    sender_verkey: &'a str,
    recipient_verkey: &'a str,
    file_id: &'a str,
    wrapped_key: &'a str,
    base_nonce: &'a str,
    chunk_size: u64,
    meta: &'a StreamMeta,
}

impl StreamHeader {
    fn signed_input(&self) -> SsiResult<Vec<u8>> {
        signing_input(
            HEADER_DOMAIN,
            &SignedHeaderFields {
                v: self.v,
                alg: &self.alg,
                sender_verkey: &self.sender_verkey,
                recipient_verkey: &self.recipient_verkey,
                file_id: &self.file_id,
                wrapped_key: &self.wrapped_key,
                base_nonce: &self.base_nonce,
                chunk_size: self.chunk_size,
                meta: &self.meta,
            },
        )
    }

    /// Number of chunks the container holds.
    pub fn chunk_count(&self) -> u64 {
        self.meta.bytes.div_ceil(self.chunk_size).max(1)
    }

    /// Plaintext length of chunk `index`.
    fn plaintext_len(&self, index: u64) -> u64 {
        let count = self.chunk_count();
        if index + 1 < count {
            self.chunk_size
        } else {
            self.meta.bytes - (count - 1) * self.chunk_size
        }
    }

    fn decode_fixed<const N: usize>(field: &str, value: &str) -> SsiResult<[u8; N]> {
        let bytes = STANDARD
            .decode(value)
            .map_err(|e| SsiError::MalformedHeader(format!("{field}: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| SsiError::MalformedHeader(format!("{field} must be {N} bytes")))
    }
}

/// Serialize `header` padded with trailing spaces to exactly `len` bytes.
fn encode_header_padded(header: &StreamHeader, len: usize) -> SsiResult<Vec<u8>> {
    let mut json = serde_json::to_vec(header)
        .map_err(|e| anyhow::anyhow!("serializing SSIFILE2 header: {e}"))?;
    if json.len() > len {
        return Err(anyhow::anyhow!(
            "final header ({} bytes) outgrew its reserved region ({len} bytes)",
            json.len()
        )
        .into());
    }
    json.resize(len, b' ');
    Ok(json)
}

/// Resolve the chunk size to encrypt with: `None`/`0` means the configured default.
pub fn effective_chunk_size(
    requested: Option<usize>,
    limits: &TransferConfig,
) -> SsiResult<usize> {
    let chunk_size = match requested {
        None | Some(0) => limits.default_chunk_size,
        Some(n) => n,
    };
    if limits.chunk_size_in_bounds(chunk_size) {
        Ok(chunk_size)
    } else {
        Err(SsiError::InvalidChunkSize(chunk_size))
    }
}

/// Stream-encrypt `in_path` into an SSIFILE2 container at `out_path`.
pub async fn encrypt_file_large(
    sender: &DidKeypair,
    target: &Verkey,
    in_path: &Path,
    out_path: &Path,
    chunk_size: Option<usize>,
    limits: &TransferConfig,
) -> SsiResult<FileAck> {
    let chunk_size = effective_chunk_size(chunk_size, limits)?;
    let filename = in_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SsiError::InvalidInput(format!("{} has no file name", in_path.display())))?;
    let input = File::open(in_path).await?;
    let mut reader = BufReader::with_capacity(chunk_size, input);

    let mut file_id = [0u8; FILE_ID_SIZE];
    let mut base_nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut file_id);
    rand::thread_rng().fill_bytes(&mut base_nonce);

    let content_key = generate_content_key();
    let kek = authcrypt_kek(sender, target, Role::Sender, &file_id, STREAM_KEK_INFO)?;
    let wrapped = wrap_key(&kek, &content_key, &file_id)?;
    let cipher = ChunkCipher::new(&content_key, base_nonce, file_id);

    let mut header = StreamHeader {
        v: HEADER_VERSION,
        alg: STREAM_ALG.to_string(),
        sender_verkey: sender.verkey().to_string(),
        recipient_verkey: target.to_string(),
        file_id: STANDARD.encode(file_id),
        wrapped_key: STANDARD.encode(&wrapped),
        base_nonce: STANDARD.encode(base_nonce),
        chunk_size: chunk_size as u64,
        meta: StreamMeta {
            filename: filename.clone(),
            bytes: u64::MAX,
        },
        sig: DetachedSig {
            alg: SIG_ALG.to_string(),
            value: STANDARD.encode([0u8; ED25519_SIG_LEN]),
        },
    };
    let placeholder = serde_json::to_vec(&header)
        .map_err(|e| anyhow::anyhow!("serializing SSIFILE2 header: {e}"))?;
    let header_len = placeholder.len();
    if header_len > limits.max_header_len {
        return Err(SsiError::InvalidInput(format!(
            "SSIFILE2 header would be {header_len} bytes, above the limit of {}",
            limits.max_header_len
        )));
    }

    let mut out = PendingOutput::create(out_path).await?;
    let writer = out.writer();
    writer.write_all(MAGIC).await?;
    writer.write_all(&(header_len as u32).to_le_bytes()).await?;
    writer.write_all(&placeholder).await?;

    let mut buf = Vec::with_capacity(chunk_size);
    let mut index: u64 = 0;
    let mut total: u64 = 0;
    loop {
        buf.clear();
        (&mut reader)
            .take(chunk_size as u64)
            .read_to_end(&mut buf)
            .await?;
        let is_final = buf.len() < chunk_size || reader.fill_buf().await?.is_empty();

        let sealed = cipher.seal(index, is_final, &buf)?;
        out.writer().write_all(&sealed).await?;
        total += buf.len() as u64;

        if is_final {
            break;
        }
        index += 1;
    }
    let chunks = index + 1;

    header.meta.bytes = total;
    header.sig = sign_detached(sender, &header.signed_input()?);
    let final_header = encode_header_padded(&header, header_len)?;

    let writer = out.writer();
    writer.seek(SeekFrom::Start(PREFIX_LEN)).await?;
    writer.write_all(&final_header).await?;
    out.commit().await?;

    debug!(
        file = %in_path.display(),
        bytes = total,
        chunks,
        chunk_size,
        "SSIFILE2 container written"
    );

    Ok(FileAck {
        format: FileFormat::Streaming,
        filename,
        bytes: total,
        chunk_size: Some(chunk_size),
        chunks: Some(chunks),
        output: out_path.to_path_buf(),
    })
}

/// Read MAGIC, header length, and header JSON. Nothing is verified here
/// beyond framing and the size limit.
async fn read_framed_header<R>(reader: &mut R, limits: &TransferConfig) -> SsiResult<StreamHeader>
where
    R: AsyncRead + Unpin,
{
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .await
        .map_err(SsiError::from_read)?;
    if &magic != MAGIC {
        return Err(SsiError::BadMagic);
    }

    let mut len = [0u8; 4];
    reader
        .read_exact(&mut len)
        .await
        .map_err(SsiError::from_read)?;
    let header_len = u32::from_le_bytes(len) as usize;
    if header_len == 0 || header_len > limits.max_header_len {
        return Err(SsiError::MalformedHeader(format!(
            "header length {header_len} outside 1..={}",
            limits.max_header_len
        )));
    }

    let mut json = vec![0u8; header_len];
    reader
        .read_exact(&mut json)
        .await
        .map_err(SsiError::from_read)?;
    let header: StreamHeader =
        serde_json::from_slice(&json).map_err(|e| SsiError::MalformedHeader(e.to_string()))?;

    if header.v != HEADER_VERSION {
        return Err(SsiError::UnsupportedVersion(header.v));
    }
    if header.alg != STREAM_ALG {
        return Err(SsiError::MalformedHeader(format!(
            "unknown alg {:?}",
            header.alg
        )));
    }
    Ok(header)
}

/// Read an SSIFILE2 header without verifying its signature. For inspection only.
pub async fn read_header(path: &Path, limits: &TransferConfig) -> SsiResult<StreamHeader> {
    let mut reader = BufReader::new(File::open(path).await?);
    read_framed_header(&mut reader, limits).await
}

/// Stream-decrypt an SSIFILE2 container into `out_path`.
///
/// Order of checks: framing, header signature, caller's expected sender,
/// recipient, header limits, content-key unwrap. Only then is an output
/// opened and chunks read; the output is committed after the last chunk
/// authenticates and no trailing bytes remain. On failure nothing is left
/// at `out_path`.
pub async fn decrypt_file_large(
    receiver: &DidKeypair,
    expected_sender: Option<&Verkey>,
    in_path: &Path,
    out_path: &Path,
    limits: &TransferConfig,
) -> SsiResult<FileAck> {
    let result = open_container(receiver, expected_sender, in_path, out_path, limits).await;
    clear_target_on_error(out_path, result).await
}

async fn open_container(
    receiver: &DidKeypair,
    expected_sender: Option<&Verkey>,
    in_path: &Path,
    out_path: &Path,
    limits: &TransferConfig,
) -> SsiResult<FileAck> {
    let mut reader = BufReader::new(File::open(in_path).await?);
    let header = read_framed_header(&mut reader, limits).await?;

    let sender = Verkey::parse(&header.sender_verkey)?;
    verify_detached(&sender, &header.signed_input()?, &header.sig)?;

    match expected_sender {
        None => return Err(SsiError::MissingSenderVerkey),
        Some(expected) if *expected != sender => return Err(SsiError::SenderMismatch),
        Some(_) => {}
    }
    if Verkey::parse(&header.recipient_verkey)? != *receiver.verkey() {
        return Err(SsiError::RecipientMismatch);
    }

    let chunk_size = usize::try_from(header.chunk_size)
        .ok()
        .filter(|cs| limits.chunk_size_in_bounds(*cs))
        .ok_or_else(|| {
            SsiError::MalformedHeader(format!("chunk_size {} out of bounds", header.chunk_size))
        })?;
    let file_id: [u8; FILE_ID_SIZE] = StreamHeader::decode_fixed("file_id", &header.file_id)?;
    let base_nonce: [u8; NONCE_SIZE] =
        StreamHeader::decode_fixed("base_nonce", &header.base_nonce)?;
    let wrapped = STANDARD
        .decode(&header.wrapped_key)
        .map_err(|e| SsiError::MalformedHeader(format!("wrapped_key: {e}")))?;

    let kek = authcrypt_kek(receiver, &sender, Role::Recipient, &file_id, STREAM_KEK_INFO)?;
    let content_key = unwrap_key(&kek, &wrapped, &file_id)?;
    let cipher = ChunkCipher::new(&content_key, base_nonce, file_id);

    let chunks = header.chunk_count();
    debug!(
        file = %in_path.display(),
        bytes = header.meta.bytes,
        chunks,
        chunk_size,
        "SSIFILE2 header verified"
    );

    let mut out = PendingOutput::create(out_path).await?;
    let mut buf = Vec::with_capacity(chunk_size + TAG_SIZE);
    for index in 0..chunks {
        let sealed_len = header.plaintext_len(index) as usize + TAG_SIZE;
        buf.resize(sealed_len, 0);
        reader
            .read_exact(&mut buf)
            .await
            .map_err(SsiError::from_read)?;
        let plaintext = cipher.open(index, index + 1 == chunks, &buf)?;
        out.writer().write_all(&plaintext).await?;
    }

    if !reader.fill_buf().await?.is_empty() {
        return Err(SsiError::MalformedHeader(
            "trailing data after final chunk".into(),
        ));
    }
    out.commit().await?;

    Ok(FileAck {
        format: FileFormat::Streaming,
        filename: header.meta.filename,
        bytes: header.meta.bytes,
        chunk_size: Some(chunk_size),
        chunks: Some(chunks),
        output: out_path.to_path_buf(),
    })
}
