// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Certificate chain validation against a trust store.
//!
//! Problems found while walking a chain are not returned as errors. They
//! are collected into a [`VerificationOutcome`] so a caller sees every
//! problem at once; an empty outcome means the chain is accepted.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pdf_trust::validation::{ChainValidator, TrustStore};
//!
//! # fn example(chain: &[x509_cert::Certificate]) -> pdf_trust::Result<()> {
//! let store = TrustStore::from_pem_file("/etc/pdf-trust/anchors.pem")?;
//! let validator = ChainValidator::new(Arc::new(store));
//!
//! let outcome = validator.verify_chain(chain, &[], chrono::Utc::now());
//! if outcome.is_valid() {
//!     println!("Certificate chain is valid!");
//! }
//! for failure in outcome.iter() {
//!     println!("{}", failure);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use const_oid::db::rfc5280::{
    ID_CE_BASIC_CONSTRAINTS, ID_CE_CERTIFICATE_POLICIES, ID_CE_EXT_KEY_USAGE,
    ID_CE_INHIBIT_ANY_POLICY, ID_CE_ISSUER_ALT_NAME, ID_CE_KEY_USAGE, ID_CE_NAME_CONSTRAINTS,
    ID_CE_POLICY_CONSTRAINTS, ID_CE_POLICY_MAPPINGS, ID_CE_SUBJECT_ALT_NAME, ID_KP_TIME_STAMPING,
};
use const_oid::ObjectIdentifier;
use der::Decode;
use tracing::{debug, info, warn};
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage, KeyUsages};
use x509_cert::ext::Extension;
use x509_cert::Certificate;

use crate::asn1::datetime_from_unix;
use crate::config::ValidationConfig;
use crate::error::{Result, TrustError};
use crate::revocation::ocsp::verify_response_signature;
use crate::revocation::RevocationRecord;
use crate::signature;
#[cfg(feature = "timestamp")]
use crate::timestamp::TimestampToken;
use crate::types::ocsp::BasicOcspResponse;

/// Critical extensions whose semantics are understood.
const RECOGNIZED_CRITICAL_EXTENSIONS: [ObjectIdentifier; 10] = [
    ID_CE_BASIC_CONSTRAINTS,
    ID_CE_KEY_USAGE,
    ID_CE_EXT_KEY_USAGE,
    ID_CE_SUBJECT_ALT_NAME,
    ID_CE_ISSUER_ALT_NAME,
    ID_CE_CERTIFICATE_POLICIES,
    ID_CE_POLICY_MAPPINGS,
    ID_CE_NAME_CONSTRAINTS,
    ID_CE_POLICY_CONSTRAINTS,
    ID_CE_INHIBIT_ANY_POLICY,
];

/// Immutable set of trust anchors keyed by alias.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    anchors: Vec<(String, Certificate)>,
}

impl TrustStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every certificate in a PEM bundle.
    ///
    /// Each anchor is aliased by its subject common name, falling back to
    /// its position in the bundle.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let mut reader = std::io::BufReader::new(pem);
        let mut store = Self::new();
        for (index, der) in rustls_pemfile::certs(&mut reader).enumerate() {
            let cert = Certificate::from_der(der?.as_ref())?;
            let alias = get_subject_cn(&cert).unwrap_or_else(|| format!("anchor-{index}"));
            store = store.with_anchor(alias, cert);
        }
        if store.is_empty() {
            return Err(TrustError::config("No certificates found in trust store PEM"));
        }
        Ok(store)
    }

    /// Load a PEM bundle from disk.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        let pem = std::fs::read(path)?;
        Self::from_pem(&pem)
    }

    /// Add an anchor. An alias already in use gets a numeric suffix.
    pub fn with_anchor(mut self, alias: impl Into<String>, cert: Certificate) -> Self {
        let mut alias = alias.into();
        if self.get(&alias).is_some() {
            alias = format!("{}-{}", alias, self.anchors.len());
        }
        self.anchors.push((alias, cert));
        self
    }

    /// Look up an anchor by alias.
    pub fn get(&self, alias: &str) -> Option<&Certificate> {
        self.anchors
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, cert)| cert)
    }

    /// Iterate over `(alias, certificate)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Certificate)> {
        self.anchors.iter().map(|(alias, cert)| (alias.as_str(), cert))
    }

    /// Number of anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Check if the store has no anchors.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl FromIterator<(String, Certificate)> for TrustStore {
    fn from_iter<I: IntoIterator<Item = (String, Certificate)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |store, (alias, cert)| store.with_anchor(alias, cert))
    }
}

/// Why a certificate was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// A critical extension this validator does not understand.
    UnsupportedCriticalExtension(ObjectIdentifier),
    /// The reference time is outside the validity period.
    ValidityPeriod(String),
    /// A revocation record lists the certificate.
    Revoked,
    /// No trust anchor or chain member verifies the signature.
    NotVerifiable,
    /// Nothing in the chain could be anchored.
    CircularChain,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedCriticalExtension(oid) => {
                write!(f, "Has unsupported critical extension {oid}")
            }
            Self::ValidityPeriod(msg) => f.write_str(msg),
            Self::Revoked => f.write_str("Certificate revoked"),
            Self::NotVerifiable => {
                f.write_str("Cannot be verified against the trust store or the certificate chain")
            }
            Self::CircularChain => {
                f.write_str("Invalid state. Possible circular certificate chain")
            }
        }
    }
}

/// One rejected certificate, or a chain-level problem.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    /// Offending certificate; `None` for chain-level failures.
    pub certificate: Option<Certificate>,
    /// What went wrong.
    pub kind: FailureKind,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.certificate.as_ref().and_then(get_subject_cn) {
            Some(cn) => write!(f, "{}: {}", cn, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Result of a chain validation. Empty means accepted.
#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    failures: Vec<ValidationFailure>,
}

impl VerificationOutcome {
    /// Whether the chain was accepted.
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Check if no failures were recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterate over the failures in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationFailure> {
        self.failures.iter()
    }

    /// Consume the outcome into its failures.
    pub fn into_failures(self) -> Vec<ValidationFailure> {
        self.failures
    }

    fn push(&mut self, certificate: Option<&Certificate>, kind: FailureKind) {
        self.failures.push(ValidationFailure {
            certificate: certificate.cloned(),
            kind,
        });
    }
}

impl<'a> IntoIterator for &'a VerificationOutcome {
    type Item = &'a ValidationFailure;
    type IntoIter = std::slice::Iter<'a, ValidationFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.iter()
    }
}

/// Check a single certificate, independently of its issuer.
///
/// Checks, in order: critical extensions, the validity period at
/// `reference_time`, and whether any of `revocations` lists its serial.
pub fn verify_certificate(
    cert: &Certificate,
    revocations: &[RevocationRecord],
    reference_time: DateTime<Utc>,
) -> Option<FailureKind> {
    let records: Vec<&RevocationRecord> = revocations.iter().collect();
    check_certificate(cert, &records, reference_time)
}

/// Validate a chain (leaf first) against `trust_store`.
pub fn verify_chain(
    certs: &[Certificate],
    trust_store: &TrustStore,
    revocations: &[RevocationRecord],
    reference_time: DateTime<Utc>,
) -> VerificationOutcome {
    let records: Vec<&RevocationRecord> = revocations.iter().collect();
    check_chain(certs, trust_store, &records, reference_time)
}

/// Check whether any anchor in `trust_store` directly signed `basic`.
pub fn verify_ocsp_responder_trust(basic: &BasicOcspResponse, trust_store: &TrustStore) -> bool {
    for (alias, anchor) in trust_store.iter() {
        match verify_response_signature(basic, &anchor.tbs_certificate.subject_public_key_info) {
            Ok(()) => {
                debug!("OCSP response signed by trust anchor '{}'", alias);
                return true;
            }
            Err(e) => debug!("Trust anchor '{}' did not sign OCSP response: {}", alias, e),
        }
    }
    false
}

/// Check whether any anchor in `trust_store` directly signed `token`.
#[cfg(feature = "timestamp")]
pub fn verify_timestamp_trust(token: &TimestampToken, trust_store: &TrustStore) -> bool {
    for (alias, anchor) in trust_store.iter() {
        match token.verify_signature(anchor) {
            Ok(()) => {
                debug!("Time-stamp token signed by trust anchor '{}'", alias);
                return true;
            }
            Err(e) => debug!("Trust anchor '{}' did not sign time-stamp token: {}", alias, e),
        }
    }
    false
}

/// Verify that `issuer`'s key signed `cert`.
pub fn verify_signed_by(cert: &Certificate, issuer: &Certificate) -> Result<()> {
    signature::verify_certificate(cert, &issuer.tbs_certificate.subject_public_key_info)
}

/// Chain validator bound to a shared trust store.
#[derive(Debug, Clone)]
pub struct ChainValidator {
    trust_store: Arc<TrustStore>,
    config: ValidationConfig,
}

impl ChainValidator {
    /// Create a validator with default settings.
    pub fn new(trust_store: Arc<TrustStore>) -> Self {
        Self::with_config(trust_store, ValidationConfig::default())
    }

    /// Create a validator with custom configuration.
    pub fn with_config(trust_store: Arc<TrustStore>, config: ValidationConfig) -> Self {
        Self {
            trust_store,
            config,
        }
    }

    /// Get the trust store.
    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }

    /// Get the configuration.
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// See [`verify_certificate`].
    pub fn verify_certificate(
        &self,
        cert: &Certificate,
        revocations: &[RevocationRecord],
        reference_time: DateTime<Utc>,
    ) -> Option<FailureKind> {
        let records = self.applicable(revocations, reference_time);
        check_certificate(cert, &records, reference_time)
    }

    /// See [`verify_chain`].
    pub fn verify_chain(
        &self,
        certs: &[Certificate],
        revocations: &[RevocationRecord],
        reference_time: DateTime<Utc>,
    ) -> VerificationOutcome {
        let records = self.applicable(revocations, reference_time);
        check_chain(certs, &self.trust_store, &records, reference_time)
    }

    /// See [`verify_ocsp_responder_trust`].
    pub fn verify_ocsp_responder_trust(&self, basic: &BasicOcspResponse) -> bool {
        verify_ocsp_responder_trust(basic, &self.trust_store)
    }

    /// See [`verify_timestamp_trust`].
    #[cfg(feature = "timestamp")]
    pub fn verify_timestamp_trust(&self, token: &TimestampToken) -> bool {
        verify_timestamp_trust(token, &self.trust_store)
    }

    fn applicable<'a>(
        &self,
        revocations: &'a [RevocationRecord],
        reference_time: DateTime<Utc>,
    ) -> Vec<&'a RevocationRecord> {
        revocations
            .iter()
            .filter(|record| {
                let current = !self.config.check_revocation_dates || record.covers(reference_time);
                if !current {
                    debug!("Skipping revocation record outside its update window");
                }
                current
            })
            .collect()
    }
}

fn check_certificate(
    cert: &Certificate,
    revocations: &[&RevocationRecord],
    reference_time: DateTime<Utc>,
) -> Option<FailureKind> {
    if let Some(oid) = unsupported_critical_extension(cert) {
        return Some(FailureKind::UnsupportedCriticalExtension(oid));
    }

    if let Err(msg) = check_validity_period(cert, reference_time) {
        return Some(FailureKind::ValidityPeriod(msg));
    }

    let serial = &cert.tbs_certificate.serial_number;
    if revocations.iter().any(|record| record.is_revoked(serial)) {
        return Some(FailureKind::Revoked);
    }

    None
}

fn check_chain(
    certs: &[Certificate],
    trust_store: &TrustStore,
    revocations: &[&RevocationRecord],
    reference_time: DateTime<Utc>,
) -> VerificationOutcome {
    let mut outcome = VerificationOutcome::default();

    for (k, cert) in certs.iter().enumerate() {
        if let Some(kind) = check_certificate(cert, revocations, reference_time) {
            debug!("Certificate {} rejected: {}", k, kind);
            outcome.push(Some(cert), kind);
        }

        for (alias, anchor) in trust_store.iter() {
            if let Some(kind) = check_certificate(anchor, revocations, reference_time) {
                debug!("Skipping trust anchor '{}': {}", alias, kind);
                continue;
            }
            if verify_signed_by(cert, anchor).is_ok() {
                info!("Certificate {} anchored by '{}'", k, alias);
                return outcome;
            }
        }

        let issued_in_chain = certs
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != k)
            .any(|(_, candidate)| verify_signed_by(cert, candidate).is_ok());
        if !issued_in_chain {
            debug!("Certificate {} has no verifying issuer", k);
            outcome.push(Some(cert), FailureKind::NotVerifiable);
        }
    }

    if outcome.is_empty() {
        warn!("No certificate in the chain could be anchored");
        outcome.push(None, FailureKind::CircularChain);
    }
    outcome
}

/// First critical extension that makes `cert` unacceptable.
///
/// Nothing is flagged while every critical extension is a recognized one.
/// Otherwise each critical extension must be a key usage allowing digital
/// signatures or an extended key usage allowing time-stamping, and the
/// first unrecognized one is reported.
fn unsupported_critical_extension(cert: &Certificate) -> Option<ObjectIdentifier> {
    let critical: Vec<&Extension> = cert
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .filter(|ext| ext.critical)
        .collect();

    if critical
        .iter()
        .all(|ext| RECOGNIZED_CRITICAL_EXTENSIONS.contains(&ext.extn_id))
    {
        return None;
    }

    critical
        .iter()
        .find(|ext| {
            !RECOGNIZED_CRITICAL_EXTENSIONS.contains(&ext.extn_id) && !is_benign_critical(ext)
        })
        .map(|ext| ext.extn_id)
}

fn is_benign_critical(ext: &Extension) -> bool {
    let value = ext.extn_value.as_bytes();
    if ext.extn_id == ID_CE_KEY_USAGE {
        KeyUsage::from_der(value).map_or(false, |ku| ku.0.contains(KeyUsages::DigitalSignature))
    } else if ext.extn_id == ID_CE_EXT_KEY_USAGE {
        ExtendedKeyUsage::from_der(value).map_or(false, |eku| eku.0.contains(&ID_KP_TIME_STAMPING))
    } else {
        false
    }
}

fn check_validity_period(
    cert: &Certificate,
    reference_time: DateTime<Utc>,
) -> std::result::Result<(), String> {
    let validity = &cert.tbs_certificate.validity;
    let not_before = datetime_from_unix(validity.not_before.to_unix_duration())
        .map_err(|e| format!("certificate notBefore unreadable: {e}"))?;
    let not_after = datetime_from_unix(validity.not_after.to_unix_duration())
        .map_err(|e| format!("certificate notAfter unreadable: {e}"))?;

    if reference_time < not_before {
        return Err(format!(
            "certificate not valid till {} (checked at {})",
            not_before.to_rfc3339(),
            reference_time.to_rfc3339()
        ));
    }
    if reference_time > not_after {
        return Err(format!(
            "certificate expired on {} (checked at {})",
            not_after.to_rfc3339(),
            reference_time.to_rfc3339()
        ));
    }
    Ok(())
}

/// Extract the common name from a certificate subject.
pub fn get_subject_cn(cert: &Certificate) -> Option<String> {
    use const_oid::db::rfc4519::CN;

    for rdn in cert.tbs_certificate.subject.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid == CN {
                if let Ok(s) = std::str::from_utf8(atv.value.value()) {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}
