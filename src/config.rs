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

//! Configuration types for the revocation, time-stamp and validation
//! components.
//!
//! Every structure can be built in code through its builder, or loaded
//! from TOML as part of a [`TrustConfig`]:
//!
//! ```toml
//! [revocation]
//! crl_policy = "ignore"
//! ocsp_hash_algorithm = "sha1"
//!
//! [revocation.http]
//! timeout_secs = 15
//!
//! [timestamp]
//! url = "http://tsa.example.com/tsr"
//! digest_algorithm = "sha256"
//!
//! [validation]
//! check_revocation_dates = true
//! ```

use std::path::Path;
use std::time::Duration;

use const_oid::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TrustError};
use crate::logging::LogConfig;
use crate::types::DigestAlgorithm;

/// What a fetcher does when a remote source fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// Log the failure and report "nothing available".
    Ignore,
    /// Return the failure to the caller.
    Propagate,
}

/// HTTP Basic authentication credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct HttpAuth {
    /// Username.
    pub username: String,

    /// Password.
    pub password: String,
}

impl HttpAuth {
    /// Create new HTTP auth credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transport settings shared by the network components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Request timeout in seconds. `None` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Additional HTTP headers to include in requests.
    #[serde(default)]
    pub additional_headers: Vec<(String, String)>,
}

fn default_user_agent() -> String {
    crate::USER_AGENT.to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: default_user_agent(),
            additional_headers: Vec::new(),
        }
    }
}

impl HttpConfig {
    /// Request timeout, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Add an additional HTTP header to all requests.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.push((name.into(), value.into()));
        self
    }
}

/// Configuration for CRL and OCSP retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevocationConfig {
    /// Transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Failure handling for CRL downloads.
    #[serde(default = "default_crl_policy")]
    pub crl_policy: FetchPolicy,

    /// Failure handling for OCSP transport and decoding errors. Revoked and
    /// unknown statuses are always returned as errors.
    #[serde(default = "default_ocsp_policy")]
    pub ocsp_policy: FetchPolicy,

    /// Digest used to build OCSP `CertID`s.
    #[serde(default = "default_ocsp_hash")]
    pub ocsp_hash_algorithm: DigestAlgorithm,

    /// Check the responder signature when a responder or root certificate
    /// is supplied.
    #[serde(default = "default_true")]
    pub verify_responder_signature: bool,

    /// Reject responses whose nonce differs from the request nonce.
    #[serde(default = "default_true")]
    pub check_nonce: bool,
}

fn default_crl_policy() -> FetchPolicy {
    FetchPolicy::Ignore
}

fn default_ocsp_policy() -> FetchPolicy {
    FetchPolicy::Propagate
}

fn default_ocsp_hash() -> DigestAlgorithm {
    DigestAlgorithm::Sha1
}

fn default_true() -> bool {
    true
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            crl_policy: default_crl_policy(),
            ocsp_policy: default_ocsp_policy(),
            ocsp_hash_algorithm: default_ocsp_hash(),
            verify_responder_signature: true,
            check_nonce: true,
        }
    }
}

impl RevocationConfig {
    /// Create a new configuration builder.
    pub fn builder() -> RevocationConfigBuilder {
        RevocationConfigBuilder::default()
    }
}

/// Builder for `RevocationConfig`.
#[derive(Default)]
pub struct RevocationConfigBuilder {
    http: Option<HttpConfig>,
    crl_policy: Option<FetchPolicy>,
    ocsp_policy: Option<FetchPolicy>,
    ocsp_hash_algorithm: Option<DigestAlgorithm>,
    verify_responder_signature: Option<bool>,
    check_nonce: Option<bool>,
}

impl RevocationConfigBuilder {
    /// Set transport settings.
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = Some(http);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.http = Some(self.http.unwrap_or_default().with_timeout(timeout));
        self
    }

    /// Set CRL failure handling.
    pub fn crl_policy(mut self, policy: FetchPolicy) -> Self {
        self.crl_policy = Some(policy);
        self
    }

    /// Set OCSP failure handling.
    pub fn ocsp_policy(mut self, policy: FetchPolicy) -> Self {
        self.ocsp_policy = Some(policy);
        self
    }

    /// Set the `CertID` digest.
    pub fn ocsp_hash_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.ocsp_hash_algorithm = Some(algorithm);
        self
    }

    /// Enable or disable responder signature checks.
    pub fn verify_responder_signature(mut self, verify: bool) -> Self {
        self.verify_responder_signature = Some(verify);
        self
    }

    /// Enable or disable the nonce echo check.
    pub fn check_nonce(mut self, check: bool) -> Self {
        self.check_nonce = Some(check);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RevocationConfig {
        let default = RevocationConfig::default();
        RevocationConfig {
            http: self.http.unwrap_or(default.http),
            crl_policy: self.crl_policy.unwrap_or(default.crl_policy),
            ocsp_policy: self.ocsp_policy.unwrap_or(default.ocsp_policy),
            ocsp_hash_algorithm: self
                .ocsp_hash_algorithm
                .unwrap_or(default.ocsp_hash_algorithm),
            verify_responder_signature: self
                .verify_responder_signature
                .unwrap_or(default.verify_responder_signature),
            check_nonce: self.check_nonce.unwrap_or(default.check_nonce),
        }
    }
}

/// Default running estimate of an encoded time-stamp token, in bytes.
pub const DEFAULT_TOKEN_SIZE_ESTIMATE: usize = 4096;

/// Configuration for an RFC 3161 time-stamp client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimestampConfig {
    /// Time-stamp authority URL.
    pub url: String,

    /// HTTP Basic credentials for the authority.
    #[serde(default)]
    pub auth: Option<HttpAuth>,

    /// Digest used for message imprints.
    #[serde(default)]
    pub digest_algorithm: DigestAlgorithm,

    /// Requested TSA policy, as a dotted OID.
    #[serde(default)]
    pub policy_oid: Option<String>,

    /// Initial token size estimate.
    #[serde(default = "default_token_size")]
    pub token_size_estimate: usize,

    /// Transport settings.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_token_size() -> usize {
    DEFAULT_TOKEN_SIZE_ESTIMATE
}

impl TimestampConfig {
    /// Create a new configuration builder.
    pub fn builder(url: impl Into<String>) -> TimestampConfigBuilder {
        TimestampConfigBuilder::new(url)
    }

    /// Check the URL and policy OID.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url)?;
        self.policy()?;
        Ok(())
    }

    /// Parsed policy OID.
    pub fn policy(&self) -> Result<Option<ObjectIdentifier>> {
        self.policy_oid
            .as_deref()
            .map(|oid| {
                ObjectIdentifier::new(oid)
                    .map_err(|e| TrustError::config(format!("Invalid TSA policy OID '{oid}': {e}")))
            })
            .transpose()
    }
}

/// Builder for [`TimestampConfig`].
pub struct TimestampConfigBuilder {
    url: String,
    auth: Option<HttpAuth>,
    digest_algorithm: DigestAlgorithm,
    policy_oid: Option<String>,
    token_size_estimate: usize,
    http: HttpConfig,
}

impl TimestampConfigBuilder {
    /// Create a new configuration builder for the given authority.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: None,
            digest_algorithm: DigestAlgorithm::default(),
            policy_oid: None,
            token_size_estimate: DEFAULT_TOKEN_SIZE_ESTIMATE,
            http: HttpConfig::default(),
        }
    }

    /// Set HTTP Basic authentication credentials.
    pub fn http_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(HttpAuth::new(username, password));
        self
    }

    /// Set the imprint digest.
    pub fn digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Request a specific TSA policy.
    pub fn policy_oid(mut self, oid: impl Into<String>) -> Self {
        self.policy_oid = Some(oid.into());
        self
    }

    /// Set the initial token size estimate.
    pub fn token_size_estimate(mut self, size: usize) -> Self {
        self.token_size_estimate = size;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    /// Set transport settings.
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or the policy OID does not parse.
    pub fn build(self) -> Result<TimestampConfig> {
        let config = TimestampConfig {
            url: self.url,
            auth: self.auth,
            digest_algorithm: self.digest_algorithm,
            policy_oid: self.policy_oid,
            token_size_estimate: self.token_size_estimate,
            http: self.http,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for chain validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Ignore CRL and OCSP records whose update window does not contain
    /// the reference time.
    #[serde(default)]
    pub check_revocation_dates: bool,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// CRL and OCSP settings.
    #[serde(default)]
    pub revocation: RevocationConfig,

    /// Time-stamp authority, if any.
    #[serde(default)]
    pub timestamp: Option<TimestampConfig>,

    /// Chain validation settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LogConfig,
}

impl TrustConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| TrustError::config(format!("Invalid TOML: {e}")))?;
        if let Some(ts) = &config.timestamp {
            ts.validate()?;
        }
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize configuration to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TrustError::config(format!("TOML serialize: {e}")))
    }
}
