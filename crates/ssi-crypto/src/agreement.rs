//! Key agreement between DID keypairs.
//!
//! Ed25519 identity keys are mapped onto Curve25519's Montgomery form
//! (RFC 8032 §5.1.5 / RFC 7748 §4.1) and combined with X25519:
//!
//! ```text
//! x25519_secret = clamp(SHA-512(ed25519_seed)[0..32])
//! x25519_public = ed25519_point.to_montgomery()
//!
//! authcrypt KEK = HKDF-SHA256(DH(sender, recipient), salt = sender_vk || recipient_vk || ctx, info)
//! anoncrypt KEK = HKDF-SHA256(DH(ephemeral, recipient), salt = epk || recipient_vk || ctx, info)
//! ```

use rand::rngs::OsRng;
use ssi_core::{SsiError, SsiResult};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, SharedSecret, StaticSecret};
use zeroize::Zeroize;

use crate::keys::{hkdf_derive, ContentKey, DidKeypair, Verkey};
use crate::KEY_SIZE;

/// Which end of an authcrypt exchange the local keypair plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Recipient,
}

fn x25519_secret(local: &DidKeypair) -> StaticSecret {
    let mut scalar = local.signing_key().to_scalar_bytes();
    let secret = StaticSecret::from(scalar);
    scalar.zeroize();
    secret
}

fn x25519_public(remote: &Verkey) -> X25519Public {
    X25519Public::from(remote.verifying_key().to_montgomery().to_bytes())
}

fn check_contributory(shared: &SharedSecret) -> SsiResult<()> {
    if shared.was_contributory() {
        Ok(())
    } else {
        Err(SsiError::InvalidVerkey("low-order public key".into()))
    }
}

fn salt(first: &[u8], second: &[u8], context: &[u8]) -> Vec<u8> {
    let mut salt = Vec::with_capacity(first.len() + second.len() + context.len());
    salt.extend_from_slice(first);
    salt.extend_from_slice(second);
    salt.extend_from_slice(context);
    salt
}

/// Derive the authcrypt KEK shared by a sender and a recipient.
///
/// Both sides derive the same key: the salt is always ordered
/// sender-then-recipient, whichever side `local` is.
pub fn authcrypt_kek(
    local: &DidKeypair,
    remote: &Verkey,
    role: Role,
    context: &[u8],
    info: &[u8],
) -> SsiResult<ContentKey> {
    let shared = x25519_secret(local).diffie_hellman(&x25519_public(remote));
    check_contributory(&shared)?;

    let (sender, recipient) = match role {
        Role::Sender => (local.verkey(), remote),
        Role::Recipient => (remote, local.verkey()),
    };
    hkdf_derive(
        shared.as_bytes(),
        &salt(sender.as_bytes(), recipient.as_bytes(), context),
        info,
    )
}

/// Derive a one-time anoncrypt KEK for `recipient`.
///
/// Returns the ephemeral X25519 public key, which travels with the
/// ciphertext, and the derived key.
pub fn anoncrypt_seal_kek(
    recipient: &Verkey,
    context: &[u8],
    info: &[u8],
) -> SsiResult<([u8; KEY_SIZE], ContentKey)> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let epk = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&x25519_public(recipient));
    check_contributory(&shared)?;

    let key = hkdf_derive(
        shared.as_bytes(),
        &salt(epk.as_bytes(), recipient.as_bytes(), context),
        info,
    )?;
    Ok((epk.to_bytes(), key))
}

/// Re-derive an anoncrypt KEK on the recipient side from the sender's `epk`.
pub fn anoncrypt_open_kek(
    local: &DidKeypair,
    epk: &[u8; KEY_SIZE],
    context: &[u8],
    info: &[u8],
) -> SsiResult<ContentKey> {
    let shared = x25519_secret(local).diffie_hellman(&X25519Public::from(*epk));
    check_contributory(&shared)?;
    hkdf_derive(
        shared.as_bytes(),
        &salt(epk, local.verkey().as_bytes(), context),
        info,
    )
}
