//! Integration test utilities and helpers
//!
//! This module provides the common infrastructure for the integration
//! tests: rcgen certificate hierarchies, a ring-backed signer, and wiremock
//! responders that answer OCSP and time-stamp requests the way real
//! services do.

use std::time::SystemTime;

use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use const_oid::db::rfc5912::ECDSA_WITH_SHA_256;
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, GeneralizedTime, OctetString, SetOfVec, Uint};
use der::{Any, Decode, Encode};
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DistinguishedName, DnType, IsCa,
    KeyPair, KeyUsagePurpose,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use spki::AlgorithmIdentifierOwned;
use wiremock::{Request, Respond, ResponseTemplate};
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AccessDescription, AuthorityInfoAccessSyntax};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use pdf_trust::types::content_types;
use pdf_trust::types::ocsp::{
    oid as ocsp_oid, BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse,
    OcspResponseStatus, OcspVersion, ResponderId, ResponseBytes, ResponseData, SingleResponse,
};
use pdf_trust::types::tsp::{
    oid as tsp_oid, uint_to_u64, PkiStatus, PkiStatusInfo, TimeStampReq, TimeStampResp,
    TspVersion, TstInfo,
};
use pdf_trust::DigestAlgorithm;

mod security_test;
mod timestamp_test;
mod validation_test;

/// id-contentType: 1.2.840.113549.1.9.3
const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");

/// id-messageDigest: 1.2.840.113549.1.9.4
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// A certificate together with the key that can sign on its behalf.
pub struct TestCert {
    pub cert: Certificate,
    pub issued: rcgen::Certificate,
    pub key: KeyPair,
}

impl TestCert {
    /// Self-sign `params` with a fresh P-256 key.
    pub fn self_signed(params: CertificateParams) -> Self {
        let key = KeyPair::generate().unwrap();
        let issued = params.self_signed(&key).unwrap();
        Self::wrap(issued, key)
    }

    /// Issue `params` under this certificate with a fresh P-256 key.
    pub fn issue(&self, params: CertificateParams) -> Self {
        let key = KeyPair::generate().unwrap();
        let issued = params.signed_by(&key, &self.issued, &self.key).unwrap();
        Self::wrap(issued, key)
    }

    fn wrap(issued: rcgen::Certificate, key: KeyPair) -> Self {
        let cert = Certificate::from_der(issued.der()).unwrap();
        Self { cert, issued, key }
    }

    /// Signer holding a copy of this certificate's private key.
    pub fn signer(&self) -> Signer {
        Signer {
            pkcs8: self.key.serialize_der(),
        }
    }

    pub fn pem(&self) -> String {
        self.issued.pem()
    }

    pub fn subject(&self) -> Name {
        self.cert.tbs_certificate.subject.clone()
    }
}

/// ECDSA P-256 / SHA-256 signer usable from wiremock responders.
#[derive(Clone)]
pub struct Signer {
    pkcs8: Vec<u8>,
}

impl Signer {
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.pkcs8, &rng).unwrap();
        key_pair.sign(&rng, message).unwrap().as_ref().to_vec()
    }

    pub fn algorithm(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA_256,
            parameters: None,
        }
    }
}

/// Parameters for a leaf certificate with the given common name.
pub fn leaf_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec![]).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params
}

/// Parameters for a CA certificate with the given common name.
pub fn ca_params(cn: &str) -> CertificateParams {
    let mut params = leaf_params(cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

/// Authority Information Access extension naming an OCSP responder.
pub fn ocsp_aia(url: &str) -> CustomExtension {
    let aia = AuthorityInfoAccessSyntax(vec![AccessDescription {
        access_method: pdf_trust::extensions::ID_AD_OCSP,
        access_location: GeneralName::UniformResourceIdentifier(
            der::asn1::Ia5String::new(url).unwrap(),
        ),
    }]);
    CustomExtension::from_oid_content(&[1, 3, 6, 1, 5, 5, 7, 1, 1], aia.to_der().unwrap())
}

/// Encode an `OCSPResponse` holding one signed single response.
pub fn ocsp_response(
    signer: &Signer,
    responder: Name,
    cert_id: CertId,
    status: CertStatus,
    nonce: Option<Extension>,
    certs: Option<Vec<Certificate>>,
) -> Vec<u8> {
    let now = GeneralizedTime::from_system_time(SystemTime::now()).unwrap();
    let tbs_response_data = ResponseData {
        version: OcspVersion::V1,
        responder_id: ResponderId::ByName(responder),
        produced_at: now,
        responses: vec![SingleResponse {
            cert_id,
            cert_status: status,
            this_update: now,
            next_update: None,
            single_extensions: None,
        }],
        response_extensions: nonce.map(|ext| vec![ext]),
    };
    let signature = signer.sign(&tbs_response_data.to_der().unwrap());
    let basic = BasicOcspResponse {
        tbs_response_data,
        signature_algorithm: signer.algorithm(),
        signature: BitString::from_bytes(&signature).unwrap(),
        certs,
    };

    OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: ocsp_oid::BASIC_RESPONSE,
            response: OctetString::new(basic.to_der().unwrap()).unwrap(),
        }),
    }
    .to_der()
    .unwrap()
}

/// DER `BasicOCSPResponse` carried by an encoded `OCSPResponse`.
pub fn basic_response_der(response: &[u8]) -> Vec<u8> {
    OcspResponse::from_der(response)
        .unwrap()
        .response_bytes
        .unwrap()
        .response
        .as_bytes()
        .to_vec()
}

/// Wiremock responder answering OCSP requests with a fixed status.
///
/// The response echoes the request's CertID and, when `echo_nonce` is set,
/// its nonce extension.
pub struct OcspResponder {
    pub signer: Signer,
    pub responder: Name,
    pub status: CertStatus,
    pub echo_nonce: bool,
    pub certs: Option<Vec<Certificate>>,
    /// Answer about this serial instead of the one asked for.
    pub answer_serial: Option<SerialNumber>,
}

impl OcspResponder {
    /// Responder signing with `cert`'s own key and echoing nonces.
    pub fn new(cert: &TestCert, status: CertStatus) -> Self {
        Self {
            signer: cert.signer(),
            responder: cert.subject(),
            status,
            echo_nonce: true,
            certs: None,
            answer_serial: None,
        }
    }
}

impl Respond for OcspResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let ocsp_request = OcspRequest::from_der(&request.body).unwrap();
        let tbs = ocsp_request.tbs_request;
        let mut cert_id = tbs.request_list[0].req_cert.clone();
        if let Some(serial) = &self.answer_serial {
            cert_id.serial_number = serial.clone();
        }
        let nonce = if self.echo_nonce {
            tbs.request_extensions
                .into_iter()
                .flatten()
                .find(|ext| ext.extn_id == ocsp_oid::NONCE)
        } else {
            None
        };

        let body = ocsp_response(
            &self.signer,
            self.responder.clone(),
            cert_id,
            self.status.clone(),
            nonce,
            self.certs.clone(),
        );
        ResponseTemplate::new(200)
            .set_body_bytes(body)
            .insert_header("Content-Type", content_types::OCSP_RESPONSE)
    }
}

/// Wrap a DER `TSTInfo` into a signed time-stamp token.
///
/// The signature covers signed attributes carrying the content type and
/// the SHA-256 digest of the TSTInfo.
pub fn signed_token(signer: &Signer, cert: &Certificate, tst_info: &[u8]) -> ContentInfo {
    let digest = DigestAlgorithm::Sha256.digest(tst_info);
    let content_type = Attribute {
        oid: ID_CONTENT_TYPE,
        values: SetOfVec::try_from(vec![
            Any::from_der(&tsp_oid::TST_INFO.to_der().unwrap()).unwrap()
        ])
        .unwrap(),
    };
    let message_digest = Attribute {
        oid: ID_MESSAGE_DIGEST,
        values: SetOfVec::try_from(vec![Any::from_der(
            &OctetString::new(digest).unwrap().to_der().unwrap(),
        )
        .unwrap()])
        .unwrap(),
    };
    let signed_attrs = SetOfVec::try_from(vec![content_type, message_digest]).unwrap();
    let signature = signer.sign(&signed_attrs.to_der().unwrap());

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: DigestAlgorithm::Sha256.algorithm_identifier(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: signer.algorithm(),
        signature: OctetString::new(signature).unwrap(),
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::V3,
        digest_algorithms: SetOfVec::try_from(vec![DigestAlgorithm::Sha256.algorithm_identifier()])
            .unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: tsp_oid::TST_INFO,
            econtent: Some(
                Any::from_der(&OctetString::new(tst_info).unwrap().to_der().unwrap()).unwrap(),
            ),
        },
        certificates: Some(CertificateSet(
            SetOfVec::try_from(vec![CertificateChoices::Certificate(cert.clone())]).unwrap(),
        )),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).unwrap()),
    };

    ContentInfo {
        content_type: tsp_oid::SIGNED_DATA,
        content: Any::from_der(&signed_data.to_der().unwrap()).unwrap(),
    }
}

/// How a [`TsaResponder`] misbehaves, if at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TsaBehavior {
    Honest,
    WrongNonce,
    WrongImprint,
    /// Attach a valid token to a `rejection` status.
    RejectedWithToken,
}

/// Wiremock responder issuing time-stamp tokens for incoming requests.
pub struct TsaResponder {
    pub signer: Signer,
    pub cert: Certificate,
    pub default_policy: ObjectIdentifier,
    pub behavior: TsaBehavior,
}

impl Respond for TsaResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let req = TimeStampReq::from_der(&request.body).unwrap();

        let mut message_imprint = req.message_imprint;
        if self.behavior == TsaBehavior::WrongImprint {
            let mut flipped = message_imprint.hashed_message.as_bytes().to_vec();
            flipped[0] ^= 0xff;
            message_imprint.hashed_message = OctetString::new(flipped).unwrap();
        }
        let nonce = req.nonce.map(|nonce| {
            let mut value = uint_to_u64(&nonce).unwrap();
            if self.behavior == TsaBehavior::WrongNonce {
                value += 1;
            }
            Uint::new(&value.to_be_bytes()).unwrap()
        });

        let gen_time = GeneralizedTime::from_system_time(SystemTime::now()).unwrap();
        let tst_info = TstInfo {
            version: TspVersion::V1,
            policy: req.req_policy.unwrap_or(self.default_policy),
            message_imprint,
            serial_number: Uint::new(&[0x01, 0x23, 0x45]).unwrap(),
            gen_time: Any::from_der(&gen_time.to_der().unwrap()).unwrap(),
            accuracy: None,
            ordering: false,
            nonce,
            tsa: None,
            extensions: None,
        };
        let token = signed_token(&self.signer, &self.cert, &tst_info.to_der().unwrap());

        let body = TimeStampResp {
            status: PkiStatusInfo {
                status: if self.behavior == TsaBehavior::RejectedWithToken {
                    PkiStatus::Rejection
                } else {
                    PkiStatus::Granted
                },
                status_string: None,
                fail_info: None,
            },
            time_stamp_token: Some(token),
        }
        .to_der()
        .unwrap();
        ResponseTemplate::new(200)
            .set_body_bytes(body)
            .insert_header("Content-Type", content_types::TIMESTAMP_REPLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_certificate_chains_to_issuer() {
        let root = TestCert::self_signed(ca_params("Test Root"));
        let leaf = root.issue(leaf_params("Test Leaf"));
        assert_eq!(leaf.cert.tbs_certificate.issuer, root.subject());
        assert!(pdf_trust::validation::verify_signed_by(&leaf.cert, &root.cert).is_ok());
    }

    #[test]
    fn test_signer_matches_certificate_key() {
        let ca = TestCert::self_signed(ca_params("Signer"));
        let signature = ca.signer().sign(b"message");
        assert!(pdf_trust::signature::verify(
            &ca.cert.tbs_certificate.subject_public_key_info,
            &ca.signer().algorithm(),
            None,
            b"message",
            &signature,
        )
        .is_ok());
    }
}
