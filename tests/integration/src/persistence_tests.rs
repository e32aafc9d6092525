//! Durable state across client restarts

use crate::test_utils::*;
use portcullis_client::{DeviceOperation, DoorClient};
use portcullis_core::{Config, KeyStore, SqliteKeyStore};
use portcullis_crypto::SignedOperation;
use portcullis_identity::InitOutcome;
use std::sync::Arc;

#[tokio::test]
async fn test_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("portcullis.db");
    let token = jwt_for("alice@example.com");

    let first_key = {
        let store: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::open(&db_path).unwrap());
        let h = Harness::with_store(Config::default_config(), store);
        h.client.init_identity(&token).await.unwrap();
        let first_key = h.issuer.ephemeral_keys.lock().unwrap()[0].clone();
        first_key
    };

    let store: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::open(&db_path).unwrap());
    let h = Harness::with_store(Config::default_config(), store);

    assert!(h.client.is_session_usable(&token).await);
    assert_eq!(
        h.client.init_identity(&token).await.unwrap(),
        InitOutcome::AlreadyInitialised
    );
    assert_eq!(h.issuer.issue_count(), 0);

    let keys = h
        .client
        .bootstrap()
        .identity()
        .current_keys()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(keys.encoded_public_key(), first_key);

    let signed = h.client.sign("device-1", &DeviceOperation::lock()).await.unwrap();
    SignedOperation::verify(signed.compact(), &keys.verifying_key(), signed.claims().iat).unwrap();
}

#[tokio::test]
async fn test_reset_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("portcullis.db");
    let token = jwt_for("alice@example.com");

    {
        let store: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::open(&db_path).unwrap());
        let h = Harness::with_store(Config::default_config(), store);
        h.client.init_identity(&token).await.unwrap();
        h.client.reset().await.unwrap();
    }

    let store: Arc<dyn KeyStore> = Arc::new(SqliteKeyStore::open(&db_path).unwrap());
    let h = Harness::with_store(Config::default_config(), store);
    assert!(!h.client.is_session_usable(&token).await);

    // The credential was kept, so issuance runs without re-initialising.
    assert!(h.client.ensure_certificate().await.unwrap().is_valid());
    assert_eq!(h.issuer.issue_count(), 1);
}

#[test]
fn test_from_config_uses_storage_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default_config();
    config.storage.path = Some(dir.path().join("nested").join("state.db"));

    DoorClient::from_config(&config).unwrap();
    assert!(dir.path().join("nested").join("state.db").exists());
}

#[test]
fn test_from_config_rejects_invalid_config() {
    let mut config = Config::default_config();
    config.api.base_url = String::new();
    assert!(DoorClient::from_config(&config).is_err());
}
