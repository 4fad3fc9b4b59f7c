//! Per-chunk XChaCha20-Poly1305 sealing for SSIFILE2 containers
//!
//! Encrypted chunk format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: Poly1305 tag]
//! nonce = base_nonce with bytes 16..24 XORed by chunk_index (8 bytes, big-endian)
//! AAD   = chunk_index (8 bytes, big-endian) || final flag (1 byte) || file_id (32 bytes)
//! ```
//!
//! Nonces are never stored per chunk: both sides derive them from the header's
//! base nonce, so a chunk index is never reused under one content key. The AAD
//! binds each chunk to its position, to whether it ends the file, and to the
//! file, preventing reordering, truncation at a chunk boundary, and splicing
//! chunks across files.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use ssi_core::{SsiError, SsiResult};

use crate::keys::ContentKey;
use crate::{NONCE_SIZE, TAG_SIZE};

pub const FILE_ID_SIZE: usize = 32;

/// Seals and opens the chunks of one file under one content key.
pub struct ChunkCipher {
    cipher: XChaCha20Poly1305,
    base_nonce: [u8; NONCE_SIZE],
    file_id: [u8; FILE_ID_SIZE],
}

impl ChunkCipher {
    pub fn new(
        content_key: &ContentKey,
        base_nonce: [u8; NONCE_SIZE],
        file_id: [u8; FILE_ID_SIZE],
    ) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(content_key.as_bytes().into()),
            base_nonce,
            file_id,
        }
    }

    /// Seal one chunk. Returns `[ciphertext][16-byte tag]`.
    pub fn seal(&self, chunk_index: u64, is_final: bool, plaintext: &[u8]) -> SsiResult<Vec<u8>> {
        let nonce = derive_chunk_nonce(&self.base_nonce, chunk_index);
        let aad = build_aad(chunk_index, is_final, &self.file_id);
        self.cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| anyhow::anyhow!("chunk {chunk_index} encryption failed: {e}").into())
    }

    /// Open one chunk. Any authentication failure is `ChunkDecryptFailed { index }`.
    pub fn open(&self, chunk_index: u64, is_final: bool, sealed: &[u8]) -> SsiResult<Vec<u8>> {
        if sealed.len() < TAG_SIZE {
            return Err(SsiError::ChunkDecryptFailed { index: chunk_index });
        }
        let nonce = derive_chunk_nonce(&self.base_nonce, chunk_index);
        let aad = build_aad(chunk_index, is_final, &self.file_id);
        self.cipher
            .decrypt(
                &nonce,
                Payload {
                    msg: sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| SsiError::ChunkDecryptFailed { index: chunk_index })
    }
}

/// base_nonce with its last 8 bytes XORed by the big-endian chunk index.
pub fn derive_chunk_nonce(base: &[u8; NONCE_SIZE], chunk_index: u64) -> XNonce {
    let mut nonce = *base;
    for (slot, idx) in nonce[NONCE_SIZE - 8..]
        .iter_mut()
        .zip(chunk_index.to_be_bytes())
    {
        *slot ^= idx;
    }
    *XNonce::from_slice(&nonce)
}

/// Build AAD: chunk_index (8 bytes BE) || final flag (1 byte) || file_id (32 bytes)
fn build_aad(chunk_index: u64, is_final: bool, file_id: &[u8; FILE_ID_SIZE]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(8 + 1 + FILE_ID_SIZE);
    aad.extend_from_slice(&chunk_index.to_be_bytes());
    aad.push(u8::from(is_final));
    aad.extend_from_slice(file_id);
    aad
}
