//! Key-binding and tamper-evidence across every codec.
//!
//! Each codec must refuse a wrong receiver, a wrong expected sender, and any
//! edit to its authenticated fields, and must never leave an output file.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ssi_core::config::SsiConfig;
use ssi_core::{ErrorClass, SsiError};
use ssi_crypto::{generate_did, MemoryKeyStore, SecureTransport};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct World {
    svc: SecureTransport<MemoryKeyStore>,
    tmp: TempDir,
    alice: (String, String),
    bob: (String, String),
    carol: (String, String),
}

impl World {
    fn new() -> Self {
        let mut store = MemoryKeyStore::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let kp = generate_did();
            ids.push((kp.did().to_string(), kp.verkey().to_string()));
            store.insert(kp);
        }
        let carol = ids.pop().unwrap();
        let bob = ids.pop().unwrap();
        let alice = ids.pop().unwrap();
        Self {
            svc: SecureTransport::new(store, SsiConfig::default()),
            tmp: TempDir::new().unwrap(),
            alice,
            bob,
            carol,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    fn input(&self, content: &[u8]) -> PathBuf {
        let path = self.path("input.txt");
        std::fs::write(&path, content).unwrap();
        path
    }
}

fn edit_json(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let mut value: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    edit(&mut value);
    std::fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
}

fn flip_b64(value: &mut serde_json::Value) {
    let mut raw = STANDARD.decode(value.as_str().unwrap()).unwrap();
    raw[0] ^= 0x01;
    *value = STANDARD.encode(raw).into();
}

#[tokio::test]
async fn message_key_binding() {
    let w = World::new();
    let pkg = w
        .svc
        .encrypt_message(Some(&w.alice.0), &w.bob.1, b"for bob only")
        .await
        .unwrap();

    let ok = w.svc.decrypt_message(&w.bob.0, Some(&w.alice.1), &pkg).await;
    assert_eq!(ok.unwrap(), b"for bob only");

    let wrong_sender = w.svc.decrypt_message(&w.bob.0, Some(&w.carol.1), &pkg).await;
    assert!(matches!(wrong_sender, Err(SsiError::DecryptFailed)));

    let wrong_receiver = w.svc.decrypt_message(&w.carol.0, Some(&w.alice.1), &pkg).await;
    assert!(matches!(wrong_receiver, Err(SsiError::RecipientMismatch)));
}

#[tokio::test]
async fn message_nonce_and_ciphertext_tamper() {
    let w = World::new();
    let pkg = w
        .svc
        .encrypt_message(Some(&w.alice.0), &w.bob.1, b"payload")
        .await
        .unwrap();

    for field in ["nonce", "ciphertext"] {
        let mut value: serde_json::Value = serde_json::from_str(&pkg).unwrap();
        flip_b64(&mut value[field]);
        let err = w
            .svc
            .decrypt_message(&w.bob.0, Some(&w.alice.1), &value.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SsiError::DecryptFailed), "{field}: {err:?}");
        assert_eq!(err.class(), ErrorClass::Integrity);
    }
}

#[tokio::test]
async fn file_v2_tamper_matrix() {
    let w = World::new();
    let input = w.input(b"signed single-shot file");
    let pkg = w.path("file.pkg");
    let out = w.path("file.out");

    w.svc
        .encrypt_file(&w.alice.0, &w.bob.1, &input, &pkg)
        .await
        .unwrap();
    let pristine = std::fs::read(&pkg).unwrap();

    type Edit = Box<dyn Fn(&mut serde_json::Value)>;
    let cases: Vec<(&str, Edit, fn(&SsiError) -> bool)> = vec![
        (
            "meta.filename",
            Box::new(|v| v["meta"]["filename"] = "other.txt".into()),
            |e| matches!(e, SsiError::SignatureVerificationFailed),
        ),
        (
            "meta.bytes",
            Box::new(|v| v["meta"]["bytes"] = 1.into()),
            |e| matches!(e, SsiError::SignatureVerificationFailed),
        ),
        (
            "sig.value",
            Box::new(|v| flip_b64(&mut v["sig"]["value"])),
            |e| matches!(e, SsiError::SignatureVerificationFailed),
        ),
        (
            "nonce",
            Box::new(|v| flip_b64(&mut v["nonce"])),
            |e| matches!(e, SsiError::DecryptFailed),
        ),
        (
            "ciphertext",
            Box::new(|v| flip_b64(&mut v["ciphertext"])),
            |e| matches!(e, SsiError::DecryptFailed),
        ),
    ];

    for (name, edit, expected) in cases {
        std::fs::write(&pkg, &pristine).unwrap();
        edit_json(&pkg, edit);
        let err = w
            .svc
            .decrypt_file(&w.bob.0, Some(&w.alice.1), &pkg, &out)
            .await
            .unwrap_err();
        assert!(expected(&err), "{name}: unexpected {err:?}");
        assert!(!out.exists(), "{name}: output must not exist");
    }
}

#[tokio::test]
async fn file_codecs_key_binding() {
    let w = World::new();
    let input = w.input(b"bound to alice and bob");
    let out = w.path("bound.out");

    let v2 = w.path("bound.v2");
    w.svc
        .encrypt_file(&w.alice.0, &w.bob.1, &input, &v2)
        .await
        .unwrap();
    let v1 = w.path("bound.v1");
    w.svc
        .encrypt_file_v1(Some(&w.alice.0), &w.bob.1, &input, &v1)
        .await
        .unwrap();

    for pkg in [&v2, &v1] {
        let wrong_receiver = w
            .svc
            .decrypt_file(&w.carol.0, Some(&w.alice.1), pkg, &out)
            .await
            .unwrap_err();
        assert!(matches!(wrong_receiver, SsiError::RecipientMismatch));

        let wrong_sender = w
            .svc
            .decrypt_file(&w.bob.0, Some(&w.carol.1), pkg, &out)
            .await
            .unwrap_err();
        assert!(matches!(
            wrong_sender,
            SsiError::SenderMismatch | SsiError::DecryptFailed
        ));
        assert!(!out.exists());

        let ack = w
            .svc
            .decrypt_file(&w.bob.0, Some(&w.alice.1), pkg, &out)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"bound to alice and bob");
        assert_eq!(ack.bytes, 22);
        // The next iteration's failures must clear this output again.
    }
}

#[tokio::test]
async fn file_v1_anoncrypt_has_no_sender() {
    let w = World::new();
    let input = w.input(b"anonymous");
    let pkg = w.path("anon.v1");
    let out = w.path("anon.out");

    w.svc
        .encrypt_file_v1(None, &w.bob.1, &input, &pkg)
        .await
        .unwrap();

    let err = w
        .svc
        .decrypt_file(&w.bob.0, Some(&w.alice.1), &pkg, &out)
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::SenderMismatch));

    w.svc.decrypt_file(&w.bob.0, None, &pkg, &out).await.unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), b"anonymous");
}

#[tokio::test]
async fn streaming_key_binding() {
    let w = World::new();
    let input = w.input(&vec![0x5Au8; 10_000]);
    let container = w.path("stream.ssi");
    let out = w.path("stream.out");

    w.svc
        .encrypt_file_large(&w.alice.0, &w.bob.1, &input, &container, Some(4096))
        .await
        .unwrap();

    let err = w
        .svc
        .decrypt_file_large(&w.carol.0, Some(&w.alice.1), &container, &out, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::RecipientMismatch));

    let err = w
        .svc
        .decrypt_file_large(&w.bob.0, Some(&w.carol.1), &container, &out, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::SenderMismatch));

    let err = w
        .svc
        .decrypt_file_large(&w.bob.0, None, &container, &out, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::MissingSenderVerkey));
    assert!(!out.exists());
}

#[tokio::test]
async fn streaming_base_nonce_edit_fails_before_any_chunk() {
    let w = World::new();
    let input = w.input(&vec![0x33u8; 9000]);
    let container = w.path("nonce.ssi");
    let out = w.path("nonce.out");

    w.svc
        .encrypt_file_large(&w.alice.0, &w.bob.1, &input, &container, Some(4096))
        .await
        .unwrap();

    // Flip one base64 character of base_nonce in place; the header length is unchanged.
    let mut bytes = std::fs::read(&container).unwrap();
    let header_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let header = std::str::from_utf8(&bytes[12..12 + header_len]).unwrap();
    let key_at = header.find("\"base_nonce\":\"").unwrap() + "\"base_nonce\":\"".len();
    let pos = 12 + key_at;
    bytes[pos] = if bytes[pos] == b'A' { b'B' } else { b'A' };
    std::fs::write(&container, &bytes).unwrap();

    let err = w
        .svc
        .decrypt_file_large(&w.bob.0, Some(&w.alice.1), &container, &out, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::SignatureVerificationFailed));
    assert!(!out.exists());
}

#[tokio::test]
async fn errors_serialize_as_reports() {
    let w = World::new();
    let err = w
        .svc
        .decrypt_message(&w.bob.0, None, "{not json")
        .await
        .unwrap_err();

    let report = serde_json::to_value(err.report()).unwrap();
    assert_eq!(report["kind"], "MalformedPackage");
    assert_eq!(report["class"], "Format");
    assert!(report["message"].as_str().unwrap().contains("malformed package"));
}
