//! Wallet boundary: resolving a DID to its keypair or verkey.
//!
//! The real wallet lives outside this crate. Everything here only reads from
//! it, one lookup per operation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use ssi_core::{SsiError, SsiResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::keys::{DidKeypair, Verkey};
use crate::KEY_SIZE;

/// Read-only access to DID key material.
pub trait KeyStore: Send + Sync {
    /// Resolve the full keypair (including the signing half) for a local DID.
    fn resolve_keypair(&self, did: &str) -> SsiResult<DidKeypair>;

    /// Resolve only the public verkey for a DID.
    fn resolve_verkey(&self, did: &str) -> SsiResult<Verkey> {
        self.resolve_keypair(did).map(|kp| kp.verkey().clone())
    }
}

impl<K: KeyStore + ?Sized> KeyStore for Arc<K> {
    fn resolve_keypair(&self, did: &str) -> SsiResult<DidKeypair> {
        (**self).resolve_keypair(did)
    }

    fn resolve_verkey(&self, did: &str) -> SsiResult<Verkey> {
        (**self).resolve_verkey(did)
    }
}

/// In-memory key store keyed by DID.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    keys: HashMap<String, DidKeypair>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keypair: DidKeypair) {
        self.keys.insert(keypair.did().to_string(), keypair);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyStore for MemoryKeyStore {
    fn resolve_keypair(&self, did: &str) -> SsiResult<DidKeypair> {
        self.keys
            .get(did)
            .cloned()
            .ok_or_else(|| SsiError::KeyNotFound(did.to_string()))
    }
}

/// One DID entry in a wallet file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEntry {
    pub did: String,
    /// base58 Ed25519 public key
    pub verkey: String,
    /// base58 32-byte Ed25519 seed
    pub seed: String,
}

/// JSON wallet file: a flat list of DID entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletFile {
    pub entries: Vec<WalletEntry>,
}

impl WalletFile {
    /// Load a wallet from a JSON file. A missing file is an empty wallet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading wallet: {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing wallet: {}", path.display()))
    }

    /// Save the wallet as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing wallet")?;
        std::fs::write(path, json).with_context(|| format!("writing wallet: {}", path.display()))
    }

    pub fn add(&mut self, keypair: &DidKeypair) {
        self.entries.retain(|e| e.did != keypair.did());
        self.entries.push(WalletEntry {
            did: keypair.did().to_string(),
            verkey: keypair.verkey().to_string(),
            seed: bs58::encode(keypair.seed()).into_string(),
        });
    }

    /// Decode every entry into a [`MemoryKeyStore`], checking that each
    /// stored verkey matches the key derived from its seed.
    pub fn into_key_store(self) -> Result<MemoryKeyStore> {
        let mut store = MemoryKeyStore::new();
        for entry in self.entries {
            let seed = bs58::decode(&entry.seed)
                .into_vec()
                .with_context(|| format!("wallet entry {}: seed is not base58", entry.did))?;
            let seed: [u8; KEY_SIZE] = seed
                .try_into()
                .map_err(|_| anyhow::anyhow!("wallet entry {}: seed must be 32 bytes", entry.did))?;
            let keypair = DidKeypair::from_seed(entry.did.clone(), seed);
            if keypair.verkey().as_str() != entry.verkey {
                anyhow::bail!(
                    "wallet entry {}: stored verkey does not match its seed",
                    entry.did
                );
            }
            store.insert(keypair);
        }
        tracing::debug!(dids = store.len(), "wallet loaded");
        Ok(store)
    }
}
