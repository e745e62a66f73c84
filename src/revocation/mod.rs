//! Certificate revocation checking (CRL and OCSP).
//!
//! [`RevocationFetcher`] retrieves revocation evidence over HTTP: CRLs from
//! the distribution points a certificate advertises, and OCSP responses
//! from its Authority Information Access responder. Nothing is cached;
//! each call performs a fresh round trip.
//!
//! # Example
//!
//! ```no_run
//! use pdf_trust::revocation::RevocationFetcher;
//! use pdf_trust::config::{FetchPolicy, RevocationConfig};
//!
//! # fn example(cert: &x509_cert::Certificate, issuer: &x509_cert::Certificate)
//! #     -> pdf_trust::Result<()> {
//! let config = RevocationConfig::builder()
//!     .crl_policy(FetchPolicy::Ignore)
//!     .timeout(std::time::Duration::from_secs(10))
//!     .build();
//! let fetcher = RevocationFetcher::new(config)?;
//!
//! if let Some(crl) = fetcher.fetch_crl_for(cert)? {
//!     println!("revoked: {}", crl.is_revoked(&cert.tbs_certificate.serial_number));
//! }
//! let evidence = fetcher.encoded_ocsp_response(cert, issuer, None)?;
//! # Ok(())
//! # }
//! ```

pub mod crl;
pub mod ocsp;

pub use crl::{CrlEntry, CrlRecord};
pub use ocsp::{build_ocsp_request, OcspCertStatus, OcspRecord, OcspRequestBytes};

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use x509_cert::serial_number::SerialNumber;

use crate::config::{FetchPolicy, RevocationConfig};
use crate::error::Result;
use crate::http::build_http_client;

/// Revocation evidence for one or more certificates.
#[derive(Debug, Clone)]
pub enum RevocationRecord {
    /// A certificate revocation list.
    Crl(CrlRecord),
    /// An OCSP single response.
    Ocsp(OcspRecord),
}

impl RevocationRecord {
    /// Check whether this record marks `serial` as revoked.
    pub fn is_revoked(&self, serial: &SerialNumber) -> bool {
        match self {
            Self::Crl(crl) => crl.is_revoked(serial),
            Self::Ocsp(ocsp) => ocsp.is_revoked(serial),
        }
    }

    /// Check whether `at` falls inside the record's validity window.
    ///
    /// Records without a `nextUpdate` are considered open-ended.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        let (this_update, next_update) = match self {
            Self::Crl(crl) => (crl.this_update, crl.next_update),
            Self::Ocsp(ocsp) => (ocsp.this_update, ocsp.next_update),
        };
        this_update <= at && next_update.map_or(true, |next| at <= next)
    }

    /// DER encoding suitable for embedding as revocation evidence.
    pub fn encoded(&self) -> &[u8] {
        match self {
            Self::Crl(crl) => &crl.encoded,
            Self::Ocsp(ocsp) => &ocsp.encoded,
        }
    }
}

impl From<CrlRecord> for RevocationRecord {
    fn from(record: CrlRecord) -> Self {
        Self::Crl(record)
    }
}

impl From<OcspRecord> for RevocationRecord {
    fn from(record: OcspRecord) -> Self {
        Self::Ocsp(record)
    }
}

/// Blocking CRL and OCSP client.
///
/// The fetcher holds an HTTP client and only needs `&self`, so one instance
/// can serve many threads. It must not be created or dropped on an async
/// runtime thread.
#[derive(Debug, Clone)]
pub struct RevocationFetcher {
    config: RevocationConfig,
    client: Client,
}

impl RevocationFetcher {
    /// Create a fetcher with the given configuration.
    pub fn new(config: RevocationConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        Ok(Self { config, client })
    }

    /// Create a fetcher with default settings.
    pub fn with_defaults() -> Result<Self> {
        Self::new(RevocationConfig::default())
    }

    /// Get the configuration.
    pub fn config(&self) -> &RevocationConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }
}

/// Apply `policy` to a failed fetch: swallow it into `None` or return it.
pub(crate) fn apply_policy<T>(
    policy: FetchPolicy,
    what: &str,
    url: &str,
    err: crate::error::TrustError,
) -> Result<Option<T>> {
    match policy {
        FetchPolicy::Ignore => {
            tracing::warn!("{} from {} unavailable: {}", what, url, err);
            Ok(None)
        }
        FetchPolicy::Propagate => Err(err),
    }
}
