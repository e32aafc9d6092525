//! HTTP collaborator tests against a mock API server

use crate::test_utils::*;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use portcullis_client::{ApiClient, DoorClient, JWT_CONTENT_TYPE};
use portcullis_core::{Config, KeyEncoding, ManualClock, MemoryKeyStore};
use portcullis_crypto::SignedOperation;
use portcullis_identity::{ErrorKind, IdentityError, InitOutcome, VerificationMethod};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn certificate_body(days: u64) -> serde_json::Value {
    let cert = certificate_valid_for(days);
    json!({
        "certificateChain": cert.certificate_chain,
        "userId": cert.user_id,
    })
}

fn client_for(server: &MockServer, config: Option<Config>) -> DoorClient {
    let _ = portcullis_core::logging::init();
    let mut config = config.unwrap_or_else(Config::default_config);
    config.api.base_url = server.uri();
    let api = Arc::new(ApiClient::new(&config.api).unwrap());
    DoorClient::with_components(
        &config,
        Arc::new(MemoryKeyStore::new()),
        api.clone(),
        api,
        Arc::new(ManualClock::new(now_unix())),
    )
}

async fn ephemeral_key_sent(server: &MockServer) -> String {
    let requests = server.received_requests().await.unwrap();
    let request = requests
        .iter()
        .find(|r| r.url.path() == "/auth/certificate")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    body["ephemeralKey"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_issue_and_execute_over_http() {
    let server = MockServer::start().await;
    let token = jwt_for("alice@example.com");

    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(certificate_body(30)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/device/device-1/execute"))
        .and(header("content-type", JWT_CONTENT_TYPE))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    assert!(matches!(
        client.init_identity(&token).await.unwrap(),
        InitOutcome::Ready(_)
    ));

    let receipt = client.unlock("device-1", Some(5)).await.unwrap();
    assert_eq!(receipt.status, 200);
    assert_eq!(receipt.body, Some(json!({"status": "ok"})));

    // The delivered body is the compact token, verifiable with our key.
    let requests = server.received_requests().await.unwrap();
    let delivered = requests
        .iter()
        .find(|r| r.url.path() == "/device/device-1/execute")
        .unwrap();
    let compact = String::from_utf8(delivered.body.clone()).unwrap();
    let keys = client
        .bootstrap()
        .identity()
        .current_keys()
        .await
        .unwrap()
        .unwrap();
    let parsed = SignedOperation::verify(&compact, &keys.verifying_key(), now_unix()).unwrap();
    assert_eq!(
        parsed.claims().operation,
        json!({"type": "MUTATE_LOCK", "locked": false, "duration": 5})
    );

    // Standard padded base64 by default.
    let sent = ephemeral_key_sent(&server).await;
    assert_eq!(STANDARD.decode(&sent).unwrap(), keys.public_key().to_vec());
}

#[tokio::test]
async fn test_url_safe_key_encoding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(certificate_body(30)))
        .mount(&server)
        .await;

    let mut config = Config::default_config();
    config.api.ephemeral_key_encoding = KeyEncoding::UrlSafeNoPad;
    let client = client_for(&server, Some(config));
    client
        .init_identity(&jwt_for("alice@example.com"))
        .await
        .unwrap();

    let sent = ephemeral_key_sent(&server).await;
    assert!(!sent.contains('='));
    assert_eq!(URL_SAFE_NO_PAD.decode(&sent).unwrap().len(), 32);
}

#[tokio::test]
async fn test_locked_triggers_step_up_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .respond_with(ResponseTemplate::new(423))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"method": "SMS"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate/check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(certificate_body(30)))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let token = jwt_for("alice@example.com");

    let outcome = client.init_identity(&token).await.unwrap();
    assert!(matches!(outcome, InitOutcome::VerificationRequired(ref c) if c.method == VerificationMethod::Sms));

    client.submit_verification_code("123456").await.unwrap();
    assert!(client.is_session_usable(&token).await);

    let requests = server.received_requests().await.unwrap();
    let check = requests
        .iter()
        .find(|r| r.url.path() == "/auth/certificate/check")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&check.body).unwrap();
    let signature = STANDARD
        .decode(body["verificationSignature"].as_str().unwrap())
        .unwrap();
    assert_eq!(signature.len(), 64);
}

#[tokio::test]
async fn test_too_many_pending_verifications() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .respond_with(ResponseTemplate::new(423))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate/verify"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client
        .init_identity(&jwt_for("alice@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err, IdentityError::RateLimited);
}

#[tokio::test]
async fn test_step_up_without_method_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .respond_with(ResponseTemplate::new(423))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client
        .init_identity(&jwt_for("alice@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CertificateIssuanceFailed);
}

#[tokio::test]
async fn test_server_error_is_issuance_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client
        .init_identity(&jwt_for("alice@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IdentityError::CertificateIssuanceFailed {
            status: Some(500),
            ..
        }
    ));
}

#[tokio::test]
async fn test_invalid_certificate_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"certificateChain": [], "userId": "u"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let err = client
        .init_identity(&jwt_for("alice@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CertificateIssuanceFailed);
}

#[tokio::test]
async fn test_device_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(certificate_body(30)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/device/device-1/execute"))
        .respond_with(ResponseTemplate::new(403).set_body_string("not allowed"))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    client
        .init_identity(&jwt_for("alice@example.com"))
        .await
        .unwrap();

    let err = client.lock("device-1").await.unwrap_err();
    assert_eq!(
        err,
        IdentityError::DeviceRejected {
            status: 403,
            reason: "not allowed".to_string()
        }
    );
}

#[tokio::test]
async fn test_slow_issuer_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/certificate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(certificate_body(30))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = Config::default_config();
    config.api.request_timeout_ms = 200;
    let client = client_for(&server, Some(config));

    let err = client
        .init_identity(&jwt_for("alice@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}
