//! OCSP request construction, transport and response decoding.

use chrono::{DateTime, SecondsFormat, Utc};
use const_oid::db::rfc5280::{ID_CE_EXT_KEY_USAGE, ID_KP_OCSP_SIGNING};
use der::asn1::OctetString;
use der::{Decode, Encode};
use rand::RngCore;
use spki::SubjectPublicKeyInfoOwned;
use tracing::{debug, info, warn};
use x509_cert::ext::pkix::crl::CrlReason;
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::ext::Extension;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use super::{apply_policy, RevocationFetcher};
use crate::asn1::datetime_from_unix;
use crate::error::{Result, TrustError};
use crate::extensions::{find_extension, find_ocsp_uri};
use crate::http::{parse_endpoint, read_body};
use crate::signature;
use crate::types::content_types;
use crate::types::ocsp::{
    oid, BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
    OcspVersion, Request, ResponderId, SingleResponse, TbsRequest,
};
use crate::types::DigestAlgorithm;

/// Size of the random request nonce.
pub const NONCE_LEN: usize = 16;

/// An encoded OCSP request and the nonce it carries.
#[derive(Debug, Clone)]
pub struct OcspRequestBytes {
    /// DER encoding of the `OCSPRequest`.
    pub der: Vec<u8>,
    /// Nonce sent in the `id-pkix-ocsp-nonce` extension.
    pub nonce: Vec<u8>,
    /// The certificate identifier that was asked about.
    pub cert_id: CertId,
}

/// Status of the certificate named in an OCSP single response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcspCertStatus {
    /// Not revoked.
    Good,
    /// Revoked at the given time.
    Revoked {
        /// Revocation time.
        revoked_at: DateTime<Utc>,
        /// Revocation reason, if given.
        reason: Option<CrlReason>,
    },
    /// The responder does not know the certificate.
    Unknown,
}

/// The first single response of a decoded `BasicOCSPResponse`.
#[derive(Debug, Clone)]
pub struct OcspRecord {
    /// Certificate the response is about.
    pub cert_id: CertId,
    /// Reported status.
    pub status: OcspCertStatus,
    /// `thisUpdate`.
    pub this_update: DateTime<Utc>,
    /// `nextUpdate`, if present.
    pub next_update: Option<DateTime<Utc>>,
    /// `producedAt`.
    pub produced_at: DateTime<Utc>,
    /// Responder identity.
    pub responder_id: ResponderId,
    /// The full basic response.
    pub basic: BasicOcspResponse,
    /// DER encoding of the `BasicOCSPResponse`.
    pub encoded: Vec<u8>,
}

impl OcspRecord {
    /// Build a record from a basic response without judging its status.
    ///
    /// Only `responses[0]` is read; further single responses are ignored.
    pub fn from_basic(basic: BasicOcspResponse, encoded: Vec<u8>) -> Result<Self> {
        let single: &SingleResponse = basic
            .tbs_response_data
            .responses
            .first()
            .ok_or_else(|| TrustError::UnknownStatus("response carries no status".into()))?;

        let status = match &single.cert_status {
            CertStatus::Good(_) => OcspCertStatus::Good,
            CertStatus::Revoked(info) => OcspCertStatus::Revoked {
                revoked_at: datetime_from_unix(info.revocation_time.to_unix_duration())?,
                reason: info.revocation_reason,
            },
            CertStatus::Unknown(_) => OcspCertStatus::Unknown,
        };
        let next_update = match &single.next_update {
            Some(t) => Some(datetime_from_unix(t.to_unix_duration())?),
            None => None,
        };

        Ok(Self {
            cert_id: single.cert_id.clone(),
            status,
            this_update: datetime_from_unix(single.this_update.to_unix_duration())?,
            next_update,
            produced_at: datetime_from_unix(
                basic.tbs_response_data.produced_at.to_unix_duration(),
            )?,
            responder_id: basic.tbs_response_data.responder_id.clone(),
            basic,
            encoded,
        })
    }

    /// Decode a DER `BasicOCSPResponse`.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let basic = BasicOcspResponse::from_der(der)?;
        Self::from_basic(basic, der.to_vec())
    }

    /// Check whether this response reports `serial` as revoked.
    pub fn is_revoked(&self, serial: &SerialNumber) -> bool {
        matches!(self.status, OcspCertStatus::Revoked { .. })
            && self.cert_id.serial_number == *serial
    }

    /// Check the response signature against `cert`.
    ///
    /// The response may be signed by `cert` itself, or by a delegated
    /// responder certificate embedded in the response that `cert` issued
    /// and that carries the `id-kp-OCSPSigning` extended key usage.
    pub fn verify_signature(&self, cert: &Certificate) -> Result<()> {
        verify_basic_response(&self.basic, cert)
    }
}

/// Build a DER `OCSPRequest` for one certificate.
///
/// The `CertID` hashes the issuer's DER-encoded subject name and the bits
/// of its public key with `hash`. A fresh random nonce is attached as a
/// request extension.
pub fn build_ocsp_request(
    issuer: &Certificate,
    serial: &SerialNumber,
    hash: DigestAlgorithm,
) -> Result<OcspRequestBytes> {
    let name_der = issuer.tbs_certificate.subject.to_der()?;
    let key_bits = issuer
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();

    let cert_id = CertId {
        hash_algorithm: hash.algorithm_identifier(),
        issuer_name_hash: OctetString::new(hash.digest(&name_der))?,
        issuer_key_hash: OctetString::new(hash.digest(key_bits))?,
        serial_number: serial.clone(),
    };

    let mut nonce = vec![0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce_ext = Extension {
        extn_id: oid::NONCE,
        critical: false,
        extn_value: OctetString::new(OctetString::new(nonce.clone())?.to_der()?)?,
    };

    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: OcspVersion::V1,
            requestor_name: None,
            request_list: vec![Request {
                req_cert: cert_id.clone(),
                single_request_extensions: None,
            }],
            request_extensions: Some(vec![nonce_ext]),
        },
    };

    Ok(OcspRequestBytes {
        der: request.to_der()?,
        nonce,
        cert_id,
    })
}

impl RevocationFetcher {
    /// POST an encoded OCSP request and return the raw response body.
    ///
    /// Any non-2xx answer is an error.
    pub fn send_ocsp_request(&self, url: &str, request: &[u8]) -> Result<Vec<u8>> {
        let endpoint = parse_endpoint(url)?;
        debug!("Sending OCSP request ({} bytes) to {}", request.len(), endpoint);

        let response = self
            .client()
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, content_types::OCSP_REQUEST)
            .header(reqwest::header::ACCEPT, content_types::OCSP_RESPONSE)
            .body(request.to_vec())
            .send()?;
        read_body(url, response)
    }

    /// Decode an `OCSPResponse` and judge the first single response.
    ///
    /// A non-successful response status, a revoked certificate or an
    /// unknown certificate are all errors. When
    /// `verify_responder_signature` is enabled and `responder` is given,
    /// the response signature must verify against it.
    pub fn decode_ocsp_response(
        &self,
        bytes: &[u8],
        responder: Option<&Certificate>,
    ) -> Result<OcspRecord> {
        judge(self.decode_record(bytes, responder)?)
    }

    /// Decode and authenticate a response without judging the reported status.
    fn decode_record(&self, bytes: &[u8], responder: Option<&Certificate>) -> Result<OcspRecord> {
        let response = OcspResponse::from_der(bytes)?;
        if response.response_status != OcspResponseStatus::Successful {
            return Err(TrustError::OcspStatus(response.response_status.to_string()));
        }

        let response_bytes = response
            .response_bytes
            .ok_or_else(|| TrustError::decode("successful OCSP response without responseBytes"))?;
        if response_bytes.response_type != oid::BASIC_RESPONSE {
            return Err(TrustError::decode(format!(
                "unsupported OCSP response type {}",
                response_bytes.response_type
            )));
        }

        let record = OcspRecord::from_der(response_bytes.response.as_bytes())?;

        if self.config().verify_responder_signature {
            if let Some(cert) = responder {
                record.verify_signature(cert)?;
            }
        }
        Ok(record)
    }

    /// Fetch a good OCSP response for `cert` issued by `issuer`.
    ///
    /// The responder URL is taken from the certificate when `url` is not
    /// given; `Ok(None)` means the certificate names no responder.
    /// Transport and decoding failures follow the configured OCSP
    /// [`FetchPolicy`](crate::config::FetchPolicy). Non-successful,
    /// revoked and unknown statuses are always returned as errors.
    pub fn fetch_ocsp(
        &self,
        cert: &Certificate,
        issuer: &Certificate,
        url: Option<&str>,
    ) -> Result<Option<OcspRecord>> {
        let url = match url {
            Some(url) => url.to_string(),
            None => match find_ocsp_uri(cert) {
                Some(url) if !url.is_empty() => url,
                _ => {
                    debug!("No OCSP responder URL found in certificate");
                    return Ok(None);
                }
            },
        };

        let request = build_ocsp_request(
            issuer,
            &cert.tbs_certificate.serial_number,
            self.config().ocsp_hash_algorithm,
        )?;

        let body = match self.send_ocsp_request(&url, &request.der) {
            Ok(body) => body,
            Err(e) => return apply_policy(self.config().ocsp_policy, "OCSP response", &url, e),
        };

        let record = match self.decode_record(&body, Some(issuer)) {
            Ok(record) => record,
            Err(e) if e.is_protocol_status() => return Err(e),
            Err(e) => return apply_policy(self.config().ocsp_policy, "OCSP response", &url, e),
        };

        if !same_certificate(&record.cert_id, &request.cert_id) {
            let err = TrustError::decode(format!(
                "OCSP response is about serial {}, requested {}",
                record.cert_id.serial_number, request.cert_id.serial_number
            ));
            return apply_policy(self.config().ocsp_policy, "OCSP response", &url, err);
        }

        if self.config().check_nonce {
            if let Some(echoed) = record.basic.nonce() {
                if echoed != request.nonce {
                    let err = TrustError::decode("OCSP response nonce does not match request");
                    return apply_policy(self.config().ocsp_policy, "OCSP response", &url, err);
                }
            }
        }

        let record = judge(record)?;
        info!("OCSP responder {} reports certificate good", url);
        Ok(Some(record))
    }

    /// DER encoding of a good `BasicOCSPResponse` for `cert`, for embedding
    /// as revocation evidence. See [`RevocationFetcher::fetch_ocsp`].
    pub fn encoded_ocsp_response(
        &self,
        cert: &Certificate,
        issuer: &Certificate,
        url: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.fetch_ocsp(cert, issuer, url)?.map(|record| record.encoded))
    }
}

fn judge(record: OcspRecord) -> Result<OcspRecord> {
    match &record.status {
        OcspCertStatus::Good => Ok(record),
        OcspCertStatus::Revoked { revoked_at, reason } => Err(TrustError::Revoked {
            revoked_at: revoked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            reason: reason.as_ref().map(|r| format!("{r:?}")),
        }),
        OcspCertStatus::Unknown => Err(TrustError::UnknownStatus(format!(
            "responder does not know serial {}",
            record.cert_id.serial_number
        ))),
    }
}

/// CertIDs match on hash algorithm, both issuer hashes and serial.
/// Algorithm parameters are not compared since responders differ on
/// encoding an absent or NULL parameter.
fn same_certificate(answered: &CertId, requested: &CertId) -> bool {
    answered.hash_algorithm.oid == requested.hash_algorithm.oid
        && answered.issuer_name_hash == requested.issuer_name_hash
        && answered.issuer_key_hash == requested.issuer_key_hash
        && answered.serial_number == requested.serial_number
}

/// Verify `basic` was signed by `cert` or by a responder `cert` delegated.
pub(crate) fn verify_basic_response(basic: &BasicOcspResponse, cert: &Certificate) -> Result<()> {
    let issuer_key = &cert.tbs_certificate.subject_public_key_info;
    if verify_response_signature(basic, issuer_key).is_ok() {
        return Ok(());
    }

    for delegate in basic.certs.iter().flatten() {
        if !has_ocsp_signing(delegate) {
            continue;
        }
        if let Err(e) = signature::verify_certificate(delegate, issuer_key) {
            debug!("Embedded responder certificate not issued by expected CA: {}", e);
            continue;
        }
        let delegate_key = &delegate.tbs_certificate.subject_public_key_info;
        if verify_response_signature(basic, delegate_key).is_ok() {
            debug!("OCSP response signed by delegated responder");
            return Ok(());
        }
    }

    warn!("OCSP response signature does not verify");
    Err(TrustError::signature(
        "OCSP response not signed by the expected responder",
    ))
}

/// Verify the signature of `basic` directly with `key`.
pub(crate) fn verify_response_signature(
    basic: &BasicOcspResponse,
    key: &SubjectPublicKeyInfoOwned,
) -> Result<()> {
    let tbs = basic.tbs_response_data.to_der()?;
    let sig = basic
        .signature
        .as_bytes()
        .ok_or_else(|| TrustError::signature("OCSP signature has unused bits"))?;
    signature::verify(key, &basic.signature_algorithm, None, &tbs, sig)
}

fn has_ocsp_signing(cert: &Certificate) -> bool {
    find_extension(cert, &ID_CE_EXT_KEY_USAGE)
        .and_then(|ext| ExtendedKeyUsage::from_der(ext.extn_value.as_bytes()).ok())
        .map_or(false, |eku| eku.0.contains(&ID_KP_OCSP_SIGNING))
}
