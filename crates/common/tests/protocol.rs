//! Integration tests for signing, sealing and verifying nodes across parties

mod common;

use ::common::crypto::{Crypto, Key, KeyRole, PrivateEncryptionKey, SignKey};
use ::common::key_store::KeyPolicy;
use ::common::object::{
    DocumentSignature, Node, ObjectError, ReadMode, SignMode, VersionTransition,
};
use ::common::store::{DocumentStore, GatewayError, WriteGateway};
use serde_json::json;

use self::common::{APP, CITY, JOB};

#[tokio::test]
async fn test_round_trip_through_store() {
    let env = common::setup_test_env().await;
    let app = env.app("acme").await;
    let city = env.city(&app, "Berlin").await;
    let mut job = env.job(&city, "baker", 42_000, "night shifts");
    env.root
        .upload(std::slice::from_mut(&mut job), None)
        .await
        .unwrap();
    assert_eq!(job.version(), 1);

    let loaded = city
        .load_child(&JOB, job.id(), ReadMode::Default, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.version(), 1);
    assert_eq!(loaded.fields(), job.fields());
    assert_eq!(loaded.hash(), job.hash());

    let doc = env.store.get(&job.path()).await.unwrap().unwrap();
    assert!(!doc.fields.contains_key("notes"));
    let wrapped = &doc.confidential.unwrap().recipient_wrapped_keys;
    let recipients: Vec<&str> = wrapped.keys().map(String::as_str).collect();
    assert_eq!(recipients, vec!["", app.path().as_str(), city.path().as_str()]);
}

#[tokio::test]
async fn test_dates_survive_the_wire() {
    let env = common::setup_test_env().await;
    let app = env.app("acme").await;
    let city = env.city(&app, "Berlin").await;

    let loaded = app
        .load_child(&CITY, city.id(), ReadMode::Opaque, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.get("founded"), city.get("founded"));
    assert_eq!(
        loaded.get("founded").unwrap().to_value(),
        json!("1237-01-01T00:00:00.000Z")
    );
}

#[tokio::test]
async fn test_tampered_document_is_rejected() {
    let env = common::setup_test_env().await;
    let app = env.app("acme").await;
    let city = env.city(&app, "Berlin").await;
    let job = env.job(&city, "baker", 42_000, "night shifts");
    let doc = job
        .to_wire_document(VersionTransition::Increment, SignMode::Owner, None)
        .await
        .unwrap();

    let mut title = doc.clone();
    title.fields.insert("title".into(), json!("butcher"));
    let mut version = doc.clone();
    version.version = 7;
    let mut ciphertext = doc.clone();
    let envelope = ciphertext.confidential.as_mut().unwrap();
    let mut bytes = std::mem::take(&mut envelope.ciphertext).into_bytes();
    bytes[20] = if bytes[20] == b'A' { b'B' } else { b'A' };
    envelope.ciphertext = String::from_utf8(bytes).unwrap();

    for tampered in [title, version, ciphertext] {
        let result =
            Node::from_wire_document(&city, &JOB, &tampered, ReadMode::Default, None).await;
        assert!(matches!(result, Err(ObjectError::InvalidSignature(_))));
    }
}

#[tokio::test]
async fn test_multi_recipient_decryption() {
    let env = common::setup_test_env().await;
    let app = env.app("acme").await;
    let city = env.city(&app, "Berlin").await;

    let alice = PrivateEncryptionKey::generate().unwrap();
    let bob = PrivateEncryptionKey::generate().unwrap();
    let carol = PrivateEncryptionKey::generate().unwrap();

    let mut job = env.job(&city, "baker", 42_000, "night shifts");
    job.add_recipient("/users/alice", alice.public_key());
    job.add_recipient("/users/bob", bob.public_key());
    env.root
        .upload(std::slice::from_mut(&mut job), None)
        .await
        .unwrap();

    for (path, key) in [("/users/alice", &alice), ("/users/bob", &bob)] {
        let (root, keys) = env.client().await;
        keys.set_key(path, Key::Decrypt(key.clone()), KeyPolicy::SESSION, None)
            .await
            .unwrap();

        let app = root
            .load_child(&APP, app.id(), ReadMode::Opaque, None)
            .await
            .unwrap()
            .unwrap();
        let city = app
            .load_child(&CITY, city.id(), ReadMode::Opaque, None)
            .await
            .unwrap()
            .unwrap();
        let loaded = city
            .load_child(&JOB, job.id(), ReadMode::Default, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.get("notes"), job.get("notes"));
        assert_eq!(loaded.recipient_keys(), job.recipient_keys());
    }

    let (root, keys) = env.client().await;
    keys.set_key(
        "/users/carol",
        Key::Decrypt(carol.clone()),
        KeyPolicy::SESSION,
        None,
    )
    .await
    .unwrap();
    let app = root
        .load_child(&APP, app.id(), ReadMode::Opaque, None)
        .await
        .unwrap()
        .unwrap();
    let city = app
        .load_child(&CITY, city.id(), ReadMode::Opaque, None)
        .await
        .unwrap()
        .unwrap();
    let result = city
        .load_child(&JOB, job.id(), ReadMode::Default, None)
        .await;
    assert!(matches!(result, Err(ObjectError::NoDecryptionKey(_))));

    // opaque reads still verify, and leave confidential fields unset
    let opaque = city
        .load_child(&JOB, job.id(), ReadMode::Opaque, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opaque.get("title"), job.get("title"));
    assert!(opaque.get("notes").is_none());
}

#[tokio::test]
async fn test_owner_chain_stops_at_city() {
    let env = common::setup_test_env().await;
    let app = env.app("acme").await;
    let city = env.city(&app, "Berlin").await;
    let job = env.job(&city, "baker", 42_000, "night shifts");

    // a document signed by the app for a job is never accepted
    let mut doc = job
        .to_wire_document(VersionTransition::Increment, SignMode::Owner, None)
        .await
        .unwrap();
    let app_key = env
        .keys
        .get_key(&app.path(), KeyRole::Sign, None)
        .await
        .unwrap();
    let app_key = app_key.as_sign().unwrap();
    doc.signature = Some(DocumentSignature {
        signature: Crypto::default().sign(&doc.signing_bytes(), app_key),
        owner_path: app.path(),
        owner_verify_key: app_key.verify_key(),
    });
    let result = Node::from_wire_document(&city, &JOB, &doc, ReadMode::Default, None).await;
    assert!(matches!(result, Err(ObjectError::WrongOwner { .. })));

    // without the city keys the app cannot write jobs either
    env.keys.delete_path(&city.path());
    let result = job
        .to_wire_document(VersionTransition::Increment, SignMode::Owner, None)
        .await;
    assert!(matches!(result, Err(ObjectError::NoSigningKey(_))));

    // while the app may still write the city itself
    let mut city = city.clone();
    city.set("name", "Berlin-Mitte").unwrap();
    env.root
        .upload(std::slice::from_mut(&mut city), None)
        .await
        .unwrap();
    let doc = env.store.get(&city.path()).await.unwrap().unwrap();
    assert_eq!(doc.signature.unwrap().owner_path, app.path());
}

#[tokio::test]
async fn test_claimed_owner_with_wrong_key() {
    let env = common::setup_test_env().await;
    let app = env.app("acme").await;
    let city = env.city(&app, "Berlin").await;
    let job = env.job(&city, "baker", 42_000, "night shifts");

    let mut doc = job
        .to_wire_document(VersionTransition::Increment, SignMode::Owner, None)
        .await
        .unwrap();
    let imposter = SignKey::generate().unwrap();
    doc.signature = Some(DocumentSignature {
        signature: Crypto::default().sign(&doc.signing_bytes(), &imposter),
        owner_path: city.path(),
        owner_verify_key: imposter.verify_key(),
    });
    let result = Node::from_wire_document(&city, &JOB, &doc, ReadMode::Default, None).await;
    assert!(matches!(result, Err(ObjectError::WrongVerifyKey { .. })));

    let result = env.store.submit(vec![doc]).await;
    assert!(matches!(result, Err(GatewayError::InvalidSignature(_))));
}

#[tokio::test]
async fn test_device_documents_stay_local() {
    let env = common::setup_test_env().await;
    let app = env.app("acme").await;
    let city = env.city(&app, "Berlin").await;
    let job = env.job(&city, "baker", 42_000, "night shifts");

    let doc = job
        .to_wire_document(VersionTransition::Increment, SignMode::Device, None)
        .await
        .unwrap();
    let wrapped = &doc.confidential.as_ref().unwrap().recipient_wrapped_keys;
    assert_eq!(wrapped.keys().collect::<Vec<_>>(), vec!["device"]);

    let read = Node::from_wire_document(&city, &JOB, &doc, ReadMode::Device, None)
        .await
        .unwrap();
    assert_eq!(read.get("notes"), job.get("notes"));

    // another device does not recognise the signature
    let (root, _) = env.client().await;
    let other_city = Node::with_id(&root, &APP, app.id()).child_with_id(&CITY, city.id());
    let result = Node::from_wire_document(&other_city, &JOB, &doc, ReadMode::Device, None).await;
    assert!(matches!(result, Err(ObjectError::WrongVerifyKey { .. })));

    // an owner-signed document is not a device document
    let owned = job
        .to_wire_document(VersionTransition::Increment, SignMode::Owner, None)
        .await
        .unwrap();
    let result = Node::from_wire_document(&city, &JOB, &owned, ReadMode::Device, None).await;
    assert!(matches!(result, Err(ObjectError::WrongOwner { .. })));

    // and the gateway does not know the device as an owner
    let result = env.store.submit(vec![doc]).await;
    assert!(matches!(result, Err(GatewayError::UnknownOwner { .. })));
}

#[tokio::test]
async fn test_plaintext_confidential_field_is_rejected() {
    let env = common::setup_test_env().await;
    let app = env.app("acme").await;
    let city = env.city(&app, "Berlin").await;
    let job = env.job(&city, "baker", 42_000, "night shifts");

    // correctly signed by the city, but leaking notes next to the envelope
    let mut doc = job
        .to_wire_document(VersionTransition::Increment, SignMode::Owner, None)
        .await
        .unwrap();
    doc.fields.insert("notes".into(), json!("night shifts"));
    let key = env
        .keys
        .get_key(&city.path(), KeyRole::Sign, None)
        .await
        .unwrap();
    let key = key.as_sign().unwrap();
    doc.signature = Some(DocumentSignature {
        signature: Crypto::default().sign(&doc.signing_bytes(), key),
        owner_path: city.path(),
        owner_verify_key: key.verify_key(),
    });

    let result = Node::from_wire_document(&city, &JOB, &doc, ReadMode::Default, None).await;
    assert!(matches!(
        result,
        Err(ObjectError::PlaintextConfidential { field: "notes", .. })
    ));
    let result = Node::from_wire_document(&city, &JOB, &doc, ReadMode::Opaque, None).await;
    assert!(matches!(result, Err(ObjectError::PlaintextConfidential { .. })));
}
