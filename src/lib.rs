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

//! # pdf-trust
//!
//! Trust validation and key derivation for PDF signing and encryption.
//!
//! This library decides whether a signer's certificate chain is valid,
//! unexpired and unrevoked, and derives the file key of the AES-256
//! standard security handler.
//!
//! ## Features
//!
//! - **Endpoint discovery**: CRL distribution points, OCSP responders and
//!   Adobe time-stamp authority URIs from certificate extensions
//! - **CRL and OCSP clients** with per-source failure policies
//! - **RFC 3161 time-stamp client** with nonce and imprint checks
//! - **Chain validation** that reports every problem at once
//! - **AES-256 key derivation** for security handler revisions 5 and 6
//!
//! All network calls are blocking. Async callers should run them through
//! `tokio::task::spawn_blocking`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use pdf_trust::revocation::{RevocationFetcher, RevocationRecord};
//! use pdf_trust::validation::{ChainValidator, TrustStore};
//! use pdf_trust::config::RevocationConfig;
//!
//! # fn example(chain: &[pdf_trust::Certificate]) -> pdf_trust::Result<()> {
//! let fetcher = RevocationFetcher::new(RevocationConfig::default())?;
//! let mut records = Vec::new();
//! for cert in chain {
//!     if let Some(crl) = fetcher.fetch_crl_for(cert)? {
//!         records.push(RevocationRecord::from(crl));
//!     }
//! }
//!
//! let store = TrustStore::from_pem_file("anchors.pem")?;
//! let validator = ChainValidator::new(Arc::new(store));
//! let outcome = validator.verify_chain(chain, &records, chrono::Utc::now());
//! for failure in &outcome {
//!     eprintln!("{}", failure);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Cargo Features
//!
//! - `timestamp` (default): RFC 3161 client, using `cms`
//! - `standard-security` (default): AES-256 key derivation
//! - `network-tests`: integration tests against public endpoints

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod asn1;
pub mod config;
pub mod error;
pub mod extensions;
pub mod http;
pub mod logging;
pub mod revocation;
pub mod signature;
pub mod types;
pub mod validation;

#[cfg(feature = "timestamp")]
pub mod timestamp;

#[cfg(feature = "standard-security")]
pub mod security;

// Re-export main types at crate root for convenience
pub use config::{
    FetchPolicy, HttpAuth, HttpConfig, RevocationConfig, TimestampConfig, TrustConfig,
    ValidationConfig,
};
pub use error::{Result, TrustError};
pub use revocation::{CrlRecord, OcspRecord, RevocationFetcher, RevocationRecord};
#[cfg(feature = "timestamp")]
pub use timestamp::{TimestampClient, TimestampToken};
pub use types::DigestAlgorithm;
pub use validation::{
    ChainValidator, FailureKind, TrustStore, ValidationFailure, VerificationOutcome,
};

// Re-export x509_cert::Certificate for convenience
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("pdf-trust/", env!("CARGO_PKG_VERSION"));
