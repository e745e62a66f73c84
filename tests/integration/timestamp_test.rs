//! Integration tests for the RFC 3161 time-stamp client

use std::sync::Arc;

use const_oid::ObjectIdentifier;
use der::asn1::BitString;
use der::Encode;
use pdf_trust::config::TimestampConfig;
use pdf_trust::timestamp::{TimestampClient, TOKEN_SIZE_MARGIN};
use pdf_trust::types::tsp::{PkiStatus, PkiStatusInfo, TimeStampResp};
use pdf_trust::validation::{ChainValidator, TrustStore};
use pdf_trust::{DigestAlgorithm, TrustError};
use rcgen::ExtendedKeyUsagePurpose;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{ca_params, leaf_params, TestCert, TsaBehavior, TsaResponder};

const DEFAULT_POLICY: &str = "1.3.6.1.4.1.99999.1";

fn tsa_cert() -> (TestCert, TestCert) {
    let root = TestCert::self_signed(ca_params("TSA Root"));
    let mut params = leaf_params("Test TSA");
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::TimeStamping];
    let tsa = root.issue(params);
    (root, tsa)
}

async fn mount_tsa(server: &MockServer, tsa: &TestCert, behavior: TsaBehavior) {
    Mock::given(method("POST"))
        .and(path("/tsr"))
        .and(header("Content-Type", "application/timestamp-query"))
        .respond_with(TsaResponder {
            signer: tsa.signer(),
            cert: tsa.cert.clone(),
            default_policy: ObjectIdentifier::new_unwrap(DEFAULT_POLICY),
            behavior,
        })
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_timestamp_data() {
    let server = MockServer::start().await;
    let (root, tsa) = tsa_cert();
    mount_tsa(&server, &tsa, TsaBehavior::Honest).await;

    let url = format!("{}/tsr", server.uri());
    let (token, estimate, observed) = tokio::task::spawn_blocking(move || {
        let config = TimestampConfig::builder(url).build().unwrap();
        let mut client = TimestampClient::new(config).unwrap();
        let token = client.timestamp_data(b"signature value").unwrap();
        (token, client.token_size_estimate(), client.observed_token_size())
    })
    .await
    .unwrap();

    assert_eq!(
        token.imprint,
        DigestAlgorithm::Sha256.digest(b"signature value")
    );
    assert_eq!(token.digest_algorithm, DigestAlgorithm::Sha256.oid());
    assert_eq!(token.policy, ObjectIdentifier::new_unwrap(DEFAULT_POLICY));
    assert_eq!(token.serial_number, vec![0x01, 0x23, 0x45]);
    assert_eq!(token.status, PkiStatus::Granted);
    assert!(token.nonce.is_some());
    assert!(token.verify_signature(&tsa.cert).is_ok());
    assert!(token.verify_signature(&root.cert).is_err());
    assert_eq!(token.certificates(), vec![tsa.cert.clone()]);

    assert_eq!(estimate, token.encoded.len() + TOKEN_SIZE_MARGIN);
    assert_eq!(observed, Some(estimate));

    let trusted = ChainValidator::new(Arc::new(
        TrustStore::new().with_anchor("tsa", tsa.cert.clone()),
    ));
    assert!(trusted.verify_timestamp_trust(&token));
    let untrusted = ChainValidator::new(Arc::new(
        TrustStore::new().with_anchor("root", root.cert.clone()),
    ));
    assert!(!untrusted.verify_timestamp_trust(&token));
}

#[tokio::test]
async fn test_requested_policy_and_basic_auth() {
    let server = MockServer::start().await;
    let (_, tsa) = tsa_cert();
    Mock::given(method("POST"))
        .and(path("/tsr"))
        .and(header("Authorization", "Basic dXNlcjpzZWNyZXQ="))
        .respond_with(TsaResponder {
            signer: tsa.signer(),
            cert: tsa.cert.clone(),
            default_policy: ObjectIdentifier::new_unwrap(DEFAULT_POLICY),
            behavior: TsaBehavior::Honest,
        })
        .mount(&server)
        .await;

    let url = format!("{}/tsr", server.uri());
    let token = tokio::task::spawn_blocking(move || {
        let config = TimestampConfig::builder(url)
            .http_auth("user", "secret")
            .policy_oid("1.2.3.4.1")
            .digest_algorithm(DigestAlgorithm::Sha512)
            .build()
            .unwrap();
        let mut client = TimestampClient::new(config).unwrap();
        client.timestamp_data(b"document")
    })
    .await
    .unwrap()
    .expect("authenticated request should succeed");

    assert_eq!(token.policy, ObjectIdentifier::new_unwrap("1.2.3.4.1"));
    assert_eq!(token.digest_algorithm, DigestAlgorithm::Sha512.oid());
    assert_eq!(token.imprint.len(), 64);
}

#[tokio::test]
async fn test_echo_mismatches_rejected() {
    let server = MockServer::start().await;
    let (_, tsa) = tsa_cert();
    Mock::given(method("POST"))
        .and(path("/nonce"))
        .respond_with(TsaResponder {
            signer: tsa.signer(),
            cert: tsa.cert.clone(),
            default_policy: ObjectIdentifier::new_unwrap(DEFAULT_POLICY),
            behavior: TsaBehavior::WrongNonce,
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/imprint"))
        .respond_with(TsaResponder {
            signer: tsa.signer(),
            cert: tsa.cert.clone(),
            default_policy: ObjectIdentifier::new_unwrap(DEFAULT_POLICY),
            behavior: TsaBehavior::WrongImprint,
        })
        .mount(&server)
        .await;

    let base = server.uri();
    let (nonce, imprint) = tokio::task::spawn_blocking(move || {
        let stamp = |endpoint: &str| {
            let config = TimestampConfig::builder(format!("{base}{endpoint}"))
                .build()
                .unwrap();
            let mut client = TimestampClient::new(config).unwrap();
            let result = client.timestamp_data(b"data");
            (result, client.observed_token_size())
        };
        (stamp("/nonce"), stamp("/imprint"))
    })
    .await
    .unwrap();

    assert!(matches!(nonce.0, Err(TrustError::TsaMismatch(_))));
    assert!(matches!(imprint.0, Err(TrustError::TsaMismatch(_))));
    // A rejected token does not update the size estimate
    assert!(nonce.1.is_none());
    assert!(imprint.1.is_none());
}

#[tokio::test]
async fn test_token_with_failed_status_rejected() {
    let server = MockServer::start().await;
    let (_, tsa) = tsa_cert();
    mount_tsa(&server, &tsa, TsaBehavior::RejectedWithToken).await;

    let url = format!("{}/tsr", server.uri());
    let (result, observed) = tokio::task::spawn_blocking(move || {
        let config = TimestampConfig::builder(url).build().unwrap();
        let mut client = TimestampClient::new(config).unwrap();
        let result = client.timestamp_data(b"data");
        (result, client.observed_token_size())
    })
    .await
    .unwrap();

    match result {
        Err(TrustError::TsaRejected { status, .. }) => assert_eq!(status, "rejection"),
        other => panic!("expected rejection, got {:?}", other.map(|t| t.serial_number)),
    }
    assert!(observed.is_none());
}

#[tokio::test]
async fn test_failure_info_reported_with_url() {
    let server = MockServer::start().await;
    let body = TimeStampResp {
        status: PkiStatusInfo {
            status: PkiStatus::Rejection,
            status_string: Some(vec!["bad request".to_string()]),
            fail_info: Some(BitString::new(0, vec![0x02]).unwrap()),
        },
        time_stamp_token: None,
    }
    .to_der()
    .unwrap();
    Mock::given(method("POST"))
        .and(path("/tsr"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let url = format!("{}/tsr", server.uri());
    let expected_url = url.clone();
    let err = tokio::task::spawn_blocking(move || {
        let config = TimestampConfig::builder(url).build().unwrap();
        TimestampClient::new(config)
            .unwrap()
            .timestamp_data(b"data")
    })
    .await
    .unwrap()
    .unwrap_err();

    let message = err.to_string();
    assert!(message.contains(&expected_url), "message: {message}");
    assert!(message.contains('2'), "message: {message}");
    assert!(matches!(err, TrustError::TsaFailure { code: 2, .. }));
}

#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tsr"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let url = format!("{}/tsr", server.uri());
    let result = tokio::task::spawn_blocking(move || {
        let config = TimestampConfig::builder(url).build().unwrap();
        TimestampClient::new(config)
            .unwrap()
            .timestamp_data(b"data")
    })
    .await
    .unwrap();

    assert!(matches!(
        result,
        Err(TrustError::HttpStatus { status: 401, .. })
    ));
}

#[test]
fn test_unreachable_tsa() {
    let config = TimestampConfig::builder("http://invalid.invalid/tsr")
        .build()
        .unwrap();
    let mut client = TimestampClient::new(config).unwrap();
    let err = client.timestamp_data(b"data").unwrap_err();
    assert!(
        matches!(err, TrustError::TsaUnreachable { ref url, .. } if url == "http://invalid.invalid/tsr")
    );
    assert!(err.is_transport());
}
