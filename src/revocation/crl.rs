//! CRL retrieval and decoding.

use chrono::{DateTime, Utc};
use const_oid::db::rfc5280::ID_CE_CRL_REASONS;
use der::{Decode, Encode};
use tracing::{debug, info};
use x509_cert::crl::CertificateList;
use x509_cert::ext::pkix::crl::CrlReason;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use super::{apply_policy, RevocationFetcher};
use crate::asn1::datetime_from_unix;
use crate::error::{Result, TrustError};
use crate::extensions::find_crl_uris;
use crate::http::{parse_endpoint, read_body};
use crate::signature;
use crate::types::content_types;

const PEM_PREFIX: &[u8] = b"-----BEGIN";

/// One revoked certificate listed in a CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlEntry {
    /// Serial number of the revoked certificate.
    pub serial: SerialNumber,
    /// Revocation date.
    pub revoked_at: DateTime<Utc>,
    /// `reasonCode` entry extension, if present.
    pub reason: Option<CrlReason>,
}

/// A decoded certificate revocation list.
#[derive(Debug, Clone)]
pub struct CrlRecord {
    /// CRL issuer.
    pub issuer: Name,
    /// `thisUpdate`.
    pub this_update: DateTime<Utc>,
    /// `nextUpdate`, if present.
    pub next_update: Option<DateTime<Utc>>,
    /// Revoked certificates.
    pub entries: Vec<CrlEntry>,
    /// DER encoding of the whole `CertificateList`.
    pub encoded: Vec<u8>,
    list: CertificateList,
}

impl CrlRecord {
    /// Decode a DER `CertificateList`.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let list = CertificateList::from_der(der)?;
        let tbs = &list.tbs_cert_list;

        let mut entries = Vec::new();
        for revoked in tbs.revoked_certificates.iter().flatten() {
            let reason = revoked
                .crl_entry_extensions
                .iter()
                .flatten()
                .find(|ext| ext.extn_id == ID_CE_CRL_REASONS)
                .and_then(|ext| CrlReason::from_der(ext.extn_value.as_bytes()).ok());
            entries.push(CrlEntry {
                serial: revoked.serial_number.clone(),
                revoked_at: datetime_from_unix(revoked.revocation_date.to_unix_duration())?,
                reason,
            });
        }

        let next_update = match &tbs.next_update {
            Some(t) => Some(datetime_from_unix(t.to_unix_duration())?),
            None => None,
        };

        Ok(Self {
            issuer: tbs.issuer.clone(),
            this_update: datetime_from_unix(tbs.this_update.to_unix_duration())?,
            next_update,
            entries,
            encoded: der.to_vec(),
            list,
        })
    }

    /// Decode a CRL delivered either as DER or as PEM (`X509 CRL` block).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let trimmed = &bytes[start..];
        if !trimmed.starts_with(PEM_PREFIX) {
            return Self::from_der(bytes);
        }

        let mut reader = std::io::BufReader::new(trimmed);
        let der = rustls_pemfile::crls(&mut reader)
            .next()
            .ok_or_else(|| TrustError::decode("PEM data contains no X509 CRL block"))??;
        Self::from_der(der.as_ref())
    }

    /// Check whether `serial` is listed.
    pub fn is_revoked(&self, serial: &SerialNumber) -> bool {
        self.entry(serial).is_some()
    }

    /// Get the entry for `serial`, if listed.
    pub fn entry(&self, serial: &SerialNumber) -> Option<&CrlEntry> {
        self.entries.iter().find(|entry| entry.serial == *serial)
    }

    /// Verify the CRL signature with the issuer's public key.
    pub fn verify_signature(&self, issuer: &Certificate) -> Result<()> {
        let tbs = self.list.tbs_cert_list.to_der()?;
        let sig = self
            .list
            .signature
            .as_bytes()
            .ok_or_else(|| TrustError::signature("CRL signature has unused bits"))?;
        signature::verify(
            &issuer.tbs_certificate.subject_public_key_info,
            &self.list.signature_algorithm,
            None,
            &tbs,
            sig,
        )
    }
}

impl RevocationFetcher {
    /// Download and decode the CRL at `url`.
    ///
    /// Under [`FetchPolicy::Ignore`](crate::config::FetchPolicy::Ignore) (the
    /// default for CRLs) transport and decoding failures are logged and
    /// reported as `Ok(None)`.
    pub fn fetch_crl(&self, url: &str) -> Result<Option<CrlRecord>> {
        match self.download_crl(url) {
            Ok(record) => {
                info!(
                    "Fetched CRL from {} ({} entries, {} bytes)",
                    url,
                    record.entries.len(),
                    record.encoded.len()
                );
                Ok(Some(record))
            }
            Err(e) => apply_policy(self.config().crl_policy, "CRL", url, e),
        }
    }

    /// Fetch the first obtainable CRL among the distribution points of `cert`.
    pub fn fetch_crl_for(&self, cert: &Certificate) -> Result<Option<CrlRecord>> {
        let urls = find_crl_uris(cert);
        if urls.is_empty() {
            debug!("No CRL distribution points found in certificate");
            return Ok(None);
        }
        for url in &urls {
            if let Some(record) = self.fetch_crl(url)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// DER encodings of every CRL obtainable from the distribution points of
    /// `cert`, for embedding as revocation evidence.
    pub fn fetch_encoded_crls(&self, cert: &Certificate) -> Result<Vec<Vec<u8>>> {
        let mut encoded = Vec::new();
        for url in find_crl_uris(cert) {
            if let Some(record) = self.fetch_crl(&url)? {
                encoded.push(record.encoded);
            }
        }
        Ok(encoded)
    }

    fn download_crl(&self, url: &str) -> Result<CrlRecord> {
        let endpoint = parse_endpoint(url)?;
        debug!("Downloading CRL from {}", endpoint);

        let response = self
            .client()
            .get(endpoint)
            .header(reqwest::header::ACCEPT, content_types::PKIX_CRL)
            .send()?;
        let body = read_body(url, response)?;
        CrlRecord::from_bytes(&body)
    }
}
