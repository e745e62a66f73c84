//! Integration tests for chain validation

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use der::asn1::Null;
use der::Decode;
use pdf_trust::config::ValidationConfig;
use pdf_trust::revocation::{build_ocsp_request, CrlRecord, OcspRecord, RevocationRecord};
use pdf_trust::types::ocsp::CertStatus;
use pdf_trust::validation::{ChainValidator, FailureKind, TrustStore};
use pdf_trust::DigestAlgorithm;
use rcgen::{
    CertificateRevocationListParams, KeyIdMethod, KeyPair, RevokedCertParams, SerialNumber,
};
use x509_cert::Certificate;

use super::{basic_response_der, ca_params, leaf_params, ocsp_response, TestCert};

struct Hierarchy {
    root: TestCert,
    intermediate: TestCert,
    leaf: TestCert,
}

fn hierarchy() -> Hierarchy {
    let root = TestCert::self_signed(ca_params("Validation Root"));
    let intermediate = root.issue(ca_params("Validation Intermediate"));
    let mut params = leaf_params("Validation Signer");
    params.serial_number = Some(SerialNumber::from(1001u64));
    let leaf = intermediate.issue(params);
    Hierarchy {
        root,
        intermediate,
        leaf,
    }
}

fn validator(anchors: &[&TestCert]) -> ChainValidator {
    let store: TrustStore = anchors
        .iter()
        .enumerate()
        .map(|(i, anchor)| (format!("anchor-{i}"), anchor.cert.clone()))
        .collect();
    ChainValidator::new(Arc::new(store))
}

fn crl_revoking(issuer: &TestCert, serial: u64) -> CrlRecord {
    let crl = CertificateRevocationListParams {
        this_update: rcgen::date_time_ymd(2024, 1, 1),
        next_update: rcgen::date_time_ymd(2024, 2, 1),
        crl_number: SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs: vec![RevokedCertParams {
            serial_number: SerialNumber::from(serial),
            revocation_time: rcgen::date_time_ymd(2024, 1, 2),
            reason_code: None,
            invalidity_date: None,
        }],
        key_identifier_method: KeyIdMethod::Sha256,
    }
    .signed_by(&issuer.issued, &issuer.key)
    .unwrap();
    CrlRecord::from_der(crl.der()).unwrap()
}

#[test]
fn test_leaf_anchored_by_intermediate() {
    let h = hierarchy();
    let validator = validator(&[&h.intermediate]);

    let chain = [h.leaf.cert.clone(), h.intermediate.cert.clone()];
    let outcome = validator.verify_chain(&chain, &[], Utc::now());
    assert!(outcome.is_valid(), "unexpected failures: {:?}", outcome);

    let leaf_only = validator.verify_chain(&chain[..1], &[], Utc::now());
    assert!(leaf_only.is_valid());
}

#[test]
fn test_full_chain_anchored_by_root() {
    let h = hierarchy();
    let validator = validator(&[&h.root]);

    let chain = [h.leaf.cert.clone(), h.intermediate.cert.clone()];
    let outcome = validator.verify_chain(&chain, &[], Utc::now());
    assert!(outcome.is_empty());
}

#[test]
fn test_store_loaded_from_pem() {
    let h = hierarchy();
    let pem = format!("{}\n{}", h.root.pem(), h.intermediate.pem());
    let store = TrustStore::from_pem(pem.as_bytes()).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.get("Validation Root").is_some());

    let validator = ChainValidator::new(Arc::new(store));
    let outcome = validator.verify_chain(&[h.leaf.cert.clone()], &[], Utc::now());
    assert!(outcome.is_valid());
}

#[test]
fn test_expired_leaf_reports_one_failure() {
    let root = TestCert::self_signed(ca_params("Long Lived Root"));
    let mut params = leaf_params("Expired Signer");
    params.not_before = rcgen::date_time_ymd(2019, 1, 1);
    params.not_after = rcgen::date_time_ymd(2020, 1, 1);
    let leaf = root.issue(params);

    let at = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
    let outcome = validator(&[&root]).verify_chain(&[leaf.cert.clone()], &[], at);

    assert_eq!(outcome.len(), 1);
    let failure = outcome.iter().next().unwrap();
    assert_eq!(failure.certificate.as_ref(), Some(&leaf.cert));
    match &failure.kind {
        FailureKind::ValidityPeriod(msg) => assert!(msg.contains("expired"), "{msg}"),
        other => panic!("expected validity failure, got {other}"),
    }
}

#[test]
fn test_crl_revoked_leaf() {
    let h = hierarchy();
    let records = vec![RevocationRecord::from(crl_revoking(&h.intermediate, 1001))];
    let chain = [h.leaf.cert.clone(), h.intermediate.cert.clone()];
    let at = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();

    let outcome = validator(&[&h.root]).verify_chain(&chain, &records, at);
    let kinds: Vec<_> = outcome.iter().map(|f| f.kind.clone()).collect();
    assert_eq!(kinds, vec![FailureKind::Revoked]);
}

#[test]
fn test_stale_crl_skipped_when_dates_checked() {
    let h = hierarchy();
    let records = vec![RevocationRecord::from(crl_revoking(&h.intermediate, 1001))];
    let chain = [h.leaf.cert.clone(), h.intermediate.cert.clone()];
    let store = Arc::new(TrustStore::new().with_anchor("root", h.root.cert.clone()));
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

    let lenient = ChainValidator::new(store.clone());
    assert!(!lenient.verify_chain(&chain, &records, at).is_valid());

    let strict = ChainValidator::with_config(
        store,
        ValidationConfig {
            check_revocation_dates: true,
        },
    );
    assert!(strict.verify_chain(&chain, &records, at).is_valid());
}

#[test]
fn test_ocsp_revoked_leaf() {
    let h = hierarchy();
    let cert_id = build_ocsp_request(
        &h.intermediate.cert,
        &h.leaf.cert.tbs_certificate.serial_number,
        DigestAlgorithm::Sha256,
    )
    .unwrap()
    .cert_id;
    let revoked = CertStatus::Revoked(pdf_trust::types::ocsp::RevokedInfo {
        revocation_time: der::asn1::GeneralizedTime::from_unix_duration(
            std::time::Duration::from_secs(1_700_000_000),
        )
        .unwrap(),
        revocation_reason: None,
    });
    let response = ocsp_response(
        &h.intermediate.signer(),
        h.intermediate.subject(),
        cert_id,
        revoked,
        None,
        None,
    );
    let record = OcspRecord::from_der(&basic_response_der(&response)).unwrap();

    let outcome = validator(&[&h.intermediate]).verify_certificate(
        &h.leaf.cert,
        &[RevocationRecord::from(record)],
        Utc::now(),
    );
    assert_eq!(outcome, Some(FailureKind::Revoked));
}

#[test]
fn test_ocsp_responder_trust() {
    let h = hierarchy();
    let cert_id = build_ocsp_request(
        &h.root.cert,
        &h.intermediate.cert.tbs_certificate.serial_number,
        DigestAlgorithm::Sha1,
    )
    .unwrap()
    .cert_id;
    let response = ocsp_response(
        &h.root.signer(),
        h.root.subject(),
        cert_id,
        CertStatus::Good(Null),
        None,
        None,
    );
    let record = OcspRecord::from_der(&basic_response_der(&response)).unwrap();

    assert!(validator(&[&h.root]).verify_ocsp_responder_trust(&record.basic));
    assert!(!validator(&[&h.intermediate]).verify_ocsp_responder_trust(&record.basic));
}

#[test]
fn test_unanchored_chain() {
    let h = hierarchy();
    let stranger = TestCert::self_signed(ca_params("Stranger"));
    let chain = [h.leaf.cert.clone(), h.intermediate.cert.clone()];

    let outcome = validator(&[&stranger]).verify_chain(&chain, &[], Utc::now());
    let failures = outcome.into_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::NotVerifiable);
    assert_eq!(failures[0].certificate.as_ref(), Some(&h.intermediate.cert));
}

#[test]
fn test_circular_chain() {
    // Two certificates under different names sharing one key sign each other
    let key = KeyPair::generate().unwrap();
    let first = ca_params("Loop A").self_signed(&key).unwrap();
    let second = ca_params("Loop B").self_signed(&key).unwrap();
    let chain = [
        Certificate::from_der(first.der()).unwrap(),
        Certificate::from_der(second.der()).unwrap(),
    ];
    let stranger = TestCert::self_signed(ca_params("Unrelated Anchor"));

    let outcome = validator(&[&stranger]).verify_chain(&chain, &[], Utc::now());
    let failures = outcome.into_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::CircularChain);
    assert!(failures[0].certificate.is_none());
}

#[test]
fn test_expired_anchor_is_not_used() {
    let mut params = ca_params("Expired Root");
    params.not_before = rcgen::date_time_ymd(2000, 1, 1);
    params.not_after = rcgen::date_time_ymd(2010, 1, 1);
    let root = TestCert::self_signed(params);
    let leaf = root.issue(leaf_params("Orphan"));

    let outcome = validator(&[&root]).verify_chain(&[leaf.cert.clone()], &[], Utc::now());
    let kinds: Vec<_> = outcome.iter().map(|f| f.kind.clone()).collect();
    assert_eq!(kinds, vec![FailureKind::NotVerifiable]);
}
