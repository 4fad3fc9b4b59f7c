//! Envelope pack / unpack / parse through `SecureTransport`.

use ssi_core::config::SsiConfig;
use ssi_core::{ErrorClass, SsiError};
use ssi_crypto::{generate_did, MemoryKeyStore, PackOptions, SecureTransport};

struct Parties {
    svc: SecureTransport<MemoryKeyStore>,
    alice: String,
    alice_vk: String,
    bob: String,
    bob_vk: String,
    carol: String,
}

fn parties() -> Parties {
    let alice = generate_did();
    let bob = generate_did();
    let carol = generate_did();
    let p = (
        alice.did().to_string(),
        alice.verkey().to_string(),
        bob.did().to_string(),
        bob.verkey().to_string(),
        carol.did().to_string(),
    );

    let mut store = MemoryKeyStore::new();
    store.insert(alice);
    store.insert(bob);
    store.insert(carol);
    Parties {
        svc: SecureTransport::new(store, SsiConfig::default()),
        alice: p.0,
        alice_vk: p.1,
        bob: p.2,
        bob_vk: p.3,
        carol: p.4,
    }
}

fn edit(json: &str, f: impl FnOnce(&mut serde_json::Value)) -> String {
    let mut value: serde_json::Value = serde_json::from_str(json).unwrap();
    f(&mut value);
    value.to_string()
}

#[tokio::test]
async fn authcrypt_envelope_roundtrip() {
    let p = parties();
    let json = p
        .svc
        .envelope_pack_authcrypt(
            &p.alice,
            &p.bob_vk,
            "chat.message",
            b"{\"text\":\"hi bob\"}",
            PackOptions {
                thread_id: Some("thread-42".into()),
                meta_json: Some(r#"{"priority":1}"#.into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let summary = p.svc.envelope_parse(&json).await.unwrap();
    assert_eq!(summary.v, 1);
    assert_eq!(summary.kind, "chat.message");
    assert_eq!(summary.thread_id, "thread-42");
    assert_eq!(summary.crypto.mode, "authcrypt");
    assert_eq!(summary.crypto.sender_verkey.as_deref(), Some(p.alice_vk.as_str()));
    assert_eq!(summary.crypto.recipient_verkey, p.bob_vk);
    assert_eq!(summary.from.unwrap().did.as_deref(), Some(p.alice.as_str()));
    assert_eq!(summary.payload.encoding, "utf8");
    assert_eq!(summary.payload.content_type, "application/json");
    assert!(summary.meta_present);

    let plaintext = p.svc.envelope_unpack_auto(&p.bob, &json).await.unwrap();
    assert_eq!(plaintext, b"{\"text\":\"hi bob\"}");
}

#[tokio::test]
async fn anoncrypt_envelope_roundtrip() {
    let p = parties();
    let json = p
        .svc
        .envelope_pack_anoncrypt(&p.bob_vk, "notify", b"ping", PackOptions::default())
        .await
        .unwrap();

    let summary = p.svc.envelope_parse(&json).await.unwrap();
    assert_eq!(summary.crypto.mode, "anoncrypt");
    assert!(summary.crypto.sender_verkey.is_none());
    assert!(summary.from.is_none());
    assert!(uuid::Uuid::parse_str(&summary.thread_id).is_ok());
    assert!(uuid::Uuid::parse_str(&summary.id).is_ok());
    assert!(!summary.meta_present);

    let plaintext = p.svc.envelope_unpack_auto(&p.bob, &json).await.unwrap();
    assert_eq!(plaintext, b"ping");
}

#[tokio::test]
async fn envelopes_are_bound_to_the_recipient() {
    let p = parties();
    let json = p
        .svc
        .envelope_pack_authcrypt(&p.alice, &p.bob_vk, "k", b"x", PackOptions::default())
        .await
        .unwrap();

    let err = p.svc.envelope_unpack_auto(&p.carol, &json).await.unwrap_err();
    assert!(matches!(err, SsiError::RecipientMismatch));
}

#[tokio::test]
async fn structural_checks_run_in_order() {
    let p = parties();
    let json = p
        .svc
        .envelope_pack_authcrypt(&p.alice, &p.bob_vk, "k", b"x", PackOptions::default())
        .await
        .unwrap();

    // Bad mode wins over an empty kind and thread.
    let bad = edit(&json, |v| {
        v["crypto"]["mode"] = "badmode".into();
        v["kind"] = "".into();
        v["thread_id"] = "".into();
    });
    let err = p.svc.envelope_unpack_auto(&p.bob, &bad).await.unwrap_err();
    assert!(matches!(err, SsiError::InvalidCryptoMode(ref m) if m == "badmode"));
    assert_eq!(err.class(), ErrorClass::Validation);

    // Whitespace-only kind wins over an empty thread.
    let bad = edit(&json, |v| {
        v["kind"] = "   ".into();
        v["thread_id"] = "".into();
    });
    let err = p.svc.envelope_unpack_auto(&p.bob, &bad).await.unwrap_err();
    assert!(matches!(err, SsiError::EmptyKind));

    let bad = edit(&json, |v| v["thread_id"] = " \t".into());
    let err = p.svc.envelope_unpack_auto(&p.bob, &bad).await.unwrap_err();
    assert!(matches!(err, SsiError::EmptyThreadId));

    // A missing sender is reported before the recipient is compared.
    let bad = edit(&json, |v| {
        v["crypto"].as_object_mut().unwrap().remove("sender_verkey");
        v["crypto"]["recipient_verkey"] = "someone-else".into();
    });
    let err = p.svc.envelope_unpack_auto(&p.bob, &bad).await.unwrap_err();
    assert!(matches!(err, SsiError::MissingSenderVerkey));

    let bad = edit(&json, |v| v["v"] = 2.into());
    let err = p.svc.envelope_unpack_auto(&p.bob, &bad).await.unwrap_err();
    assert!(matches!(err, SsiError::UnsupportedVersion(2)));
}

#[tokio::test]
async fn from_must_agree_with_crypto_sender() {
    let p = parties();
    let json = p
        .svc
        .envelope_pack_authcrypt(&p.alice, &p.bob_vk, "k", b"x", PackOptions::default())
        .await
        .unwrap();

    let bad = edit(&json, |v| v["from"]["verkey"] = p.bob_vk.clone().into());
    let err = p.svc.envelope_unpack_auto(&p.bob, &bad).await.unwrap_err();
    assert!(matches!(err, SsiError::SenderMismatch));
}

#[tokio::test]
async fn expiry_is_enforced_unless_disabled() {
    let p = parties();
    let json = p
        .svc
        .envelope_pack_anoncrypt(&p.bob_vk, "k", b"late", PackOptions::default())
        .await
        .unwrap();
    let stale = edit(&json, |v| {
        v["created_at_ms"] = 1_000.into();
        v["expires_at_ms"] = 2_000.into();
    });

    let err = p.svc.envelope_unpack_auto(&p.bob, &stale).await.unwrap_err();
    assert!(matches!(err, SsiError::Expired { expires_at_ms: 2_000 }));

    let mut config = SsiConfig::default();
    config.envelope.enforce_expiry = false;
    let lenient = SecureTransport::new(p.svc.key_store().clone(), config);
    let plaintext = lenient.envelope_unpack_auto(&p.bob, &stale).await.unwrap();
    assert_eq!(plaintext, b"late");

    let inverted = edit(&json, |v| {
        v["created_at_ms"] = 5_000.into();
        v["expires_at_ms"] = 5_000.into();
    });
    let err = lenient
        .envelope_unpack_auto(&p.bob, &inverted)
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::InvalidInput(_)));
}

#[tokio::test]
async fn pack_rejects_bad_options() {
    let p = parties();

    let err = p
        .svc
        .envelope_pack_anoncrypt(&p.bob_vk, " ", b"x", PackOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::EmptyKind));

    let err = p
        .svc
        .envelope_pack_anoncrypt(
            &p.bob_vk,
            "k",
            b"x",
            PackOptions {
                thread_id: Some("".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::EmptyThreadId));

    let err = p
        .svc
        .envelope_pack_authcrypt(
            &p.alice,
            &p.bob_vk,
            "k",
            b"x",
            PackOptions {
                expires_at_ms: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::InvalidInput(_)));

    let err = p
        .svc
        .envelope_pack_authcrypt(
            &p.alice,
            &p.bob_vk,
            "k",
            b"x",
            PackOptions {
                meta_json: Some("{broken".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::InvalidInput(_)));

    let err = p
        .svc
        .envelope_pack_authcrypt("did:unknown", &p.bob_vk, "k", b"x", PackOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SsiError::KeyNotFound(_)));
}

#[tokio::test]
async fn parse_does_not_validate() {
    let p = parties();
    let json = p
        .svc
        .envelope_pack_anoncrypt(&p.bob_vk, "k", b"x", PackOptions::default())
        .await
        .unwrap();
    let odd = edit(&json, |v| {
        v["crypto"]["mode"] = "badmode".into();
        v["kind"] = "".into();
    });

    let summary = p.svc.envelope_parse(&odd).await.unwrap();
    assert_eq!(summary.crypto.mode, "badmode");
    assert_eq!(summary.kind, "");

    let err = p.svc.envelope_parse("[]").await.unwrap_err();
    assert!(matches!(err, SsiError::MalformedPackage(_)));
}
