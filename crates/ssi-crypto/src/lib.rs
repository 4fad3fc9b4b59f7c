//! ssi-crypto: secure envelopes and file transport between DID keypairs
//!
//! Architecture: X25519 key agreement over Ed25519 identity keys, XChaCha20-Poly1305 everywhere
//!
//! Codecs, smallest to largest:
//! ```text
//! message   one AEAD op, flat JSON package          (authcrypt | anoncrypt)
//! file      whole file, one AEAD op, signed meta    (v1 legacy, v2 signed)
//! stream    SSIFILE2 container, signed header + independently sealed chunks
//! envelope  versioned, mode-tagged wrapper around a message package
//! ```
//!
//! Key hierarchy:
//! ```text
//! DID keypair (Ed25519, held by the wallet)
//!   ├── X25519 secret (birational map of the Ed25519 seed)
//!   │   ├── authcrypt KEK = HKDF-SHA256(DH(sender, recipient), salt=sender_vk||recipient_vk||ctx)
//!   │   └── anoncrypt KEK = HKDF-SHA256(DH(ephemeral, recipient), salt=epk||recipient_vk||ctx)
//!   ├── Content Key (per SSIFILE2 file, 256-bit random, wrapped by authcrypt KEK, ctx=file_id)
//!   │   └── Chunk AEAD: XChaCha20-Poly1305 (nonce=base_nonce^index, AAD=index||final||file_id)
//!   └── Ed25519 signatures over file metadata and SSIFILE2 headers
//! ```

pub mod agreement;
pub mod chunk;
pub mod envelope;
pub mod file;
pub mod keys;
pub mod keystore;
pub mod message;
pub mod output;
pub mod service;
pub mod signing;
pub mod stream;

pub use envelope::{CryptoMode, DecodedEnvelope, Envelope, EnvelopeSummary, PackOptions};
pub use file::{FileAck, FileFormat};
pub use keys::{generate_did, ContentKey, DidKeypair, Verkey};
pub use keystore::{KeyStore, MemoryKeyStore, WalletFile};
pub use message::{decrypt_message, encrypt_message, MessagePackage};
pub use service::SecureTransport;

/// Size of a symmetric key or X25519/Ed25519 public key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
