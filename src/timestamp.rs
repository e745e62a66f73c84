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

//! RFC 3161 time-stamp client.
//!
//! # Example
//!
//! ```no_run
//! use pdf_trust::config::TimestampConfig;
//! use pdf_trust::timestamp::TimestampClient;
//!
//! # fn example() -> pdf_trust::Result<()> {
//! let config = TimestampConfig::builder("http://tsa.example.com/tsr")
//!     .http_auth("user", "secret")
//!     .build()?;
//! let mut client = TimestampClient::new(config)?;
//!
//! let token = client.timestamp_data(b"signature value")?;
//! println!("stamped at {}", token.gen_time);
//! println!("reserve {} bytes for the next token", client.token_size_estimate());
//! # Ok(())
//! # }
//! ```

use base64::prelude::*;
use chrono::{DateTime, Utc};
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerInfo};
use const_oid::ObjectIdentifier;
use der::asn1::{OctetString, Uint};
use der::{Decode, Encode};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, warn};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::Certificate;

use crate::asn1::Node;
use crate::config::TimestampConfig;
use crate::error::{Result, TrustError};
use crate::http::{build_http_client, parse_endpoint, read_body};
use crate::signature;
use crate::types::content_types;
use crate::types::tsp::{
    oid, uint_to_u64, MessageImprint, PkiStatus, TimeStampReq, TimeStampResp, TspVersion,
    TstInfo,
};
use crate::types::DigestAlgorithm;

/// Bytes added to the observed token size when updating the estimate.
pub const TOKEN_SIZE_MARGIN: usize = 32;

/// id-messageDigest: 1.2.840.113549.1.9.4
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// An encoded time-stamp request and the values it committed to.
#[derive(Debug, Clone)]
pub struct TimestampRequest {
    /// DER encoding of the `TimeStampReq`.
    pub der: Vec<u8>,
    /// Nonce sent with the request.
    pub nonce: u64,
    /// Digest that was asked to be stamped.
    pub imprint: Vec<u8>,
    /// Digest algorithm of the imprint.
    pub digest_algorithm: DigestAlgorithm,
    /// Requested policy, if any.
    pub policy: Option<ObjectIdentifier>,
}

/// A decoded time-stamp token.
#[derive(Debug, Clone)]
pub struct TimestampToken {
    /// Time the authority asserts the imprint existed.
    pub gen_time: DateTime<Utc>,
    /// Stamped digest.
    pub imprint: Vec<u8>,
    /// Digest algorithm of the imprint.
    pub digest_algorithm: ObjectIdentifier,
    /// Policy under which the token was issued.
    pub policy: ObjectIdentifier,
    /// Token serial number, big-endian.
    pub serial_number: Vec<u8>,
    /// Echoed nonce.
    pub nonce: Option<u64>,
    /// Authority name, if the token carries one.
    pub tsa: Option<GeneralName>,
    /// Status the authority answered with.
    pub status: PkiStatus,
    /// DER encoding of the token `ContentInfo`.
    pub encoded: Vec<u8>,
    signed_data: SignedData,
    tst_info_der: Vec<u8>,
}

impl TimestampToken {
    /// Decode a DER time-stamp token (`ContentInfo` wrapping `SignedData`).
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let content_info = ContentInfo::from_der(der)?;
        Self::from_content_info(&content_info, PkiStatus::Granted)
    }

    fn from_content_info(content_info: &ContentInfo, status: PkiStatus) -> Result<Self> {
        if content_info.content_type != oid::SIGNED_DATA {
            return Err(TrustError::decode(format!(
                "Expected SignedData token, got {}",
                content_info.content_type
            )));
        }
        let signed_data = SignedData::from_der(&content_info.content.to_der()?)?;

        let encap = &signed_data.encap_content_info;
        if encap.econtent_type != oid::TST_INFO {
            return Err(TrustError::decode(format!(
                "Expected TSTInfo content, got {}",
                encap.econtent_type
            )));
        }
        let econtent = encap
            .econtent
            .as_ref()
            .ok_or_else(|| TrustError::decode("time-stamp token has no content"))?;
        let tst_info_der = OctetString::from_der(&econtent.to_der()?)?.into_bytes();
        let tst_info = TstInfo::from_der(&tst_info_der)?;

        let gen_time = Node::from_any(&tst_info.gen_time)?
            .as_time()
            .ok_or_else(|| TrustError::decode("TSTInfo genTime is not a time"))?;
        let nonce = match &tst_info.nonce {
            Some(n) => Some(
                uint_to_u64(n).ok_or_else(|| TrustError::decode("TSTInfo nonce too large"))?,
            ),
            None => None,
        };

        Ok(Self {
            gen_time,
            imprint: tst_info.message_imprint.hashed_message.as_bytes().to_vec(),
            digest_algorithm: tst_info.message_imprint.hash_algorithm.oid,
            policy: tst_info.policy,
            serial_number: tst_info.serial_number.as_bytes().to_vec(),
            nonce,
            tsa: tst_info.tsa,
            status,
            encoded: content_info.to_der()?,
            signed_data,
            tst_info_der,
        })
    }

    /// Certificates embedded in the token.
    pub fn certificates(&self) -> Vec<Certificate> {
        let Some(set) = &self.signed_data.certificates else {
            return Vec::new();
        };

        let mut certificates = Vec::new();
        for choice in set.0.iter() {
            match choice.to_der().map(|der| Certificate::from_der(&der)) {
                Ok(Ok(cert)) => certificates.push(cert),
                _ => debug!("Skipping non-X.509 certificate in time-stamp token"),
            }
        }
        certificates
    }

    /// Verify the token signature with `cert`'s public key.
    ///
    /// With signed attributes present the signature covers their DER
    /// encoding and the `messageDigest` attribute must match the TSTInfo.
    pub fn verify_signature(&self, cert: &Certificate) -> Result<()> {
        let signer = self
            .signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| TrustError::signature("time-stamp token has no signer"))?;
        let digest = DigestAlgorithm::from_oid(&signer.digest_alg.oid);
        let message = self.signed_content(signer, digest)?;

        signature::verify(
            &cert.tbs_certificate.subject_public_key_info,
            &signer.signature_algorithm,
            digest,
            &message,
            signer.signature.as_bytes(),
        )
    }

    fn signed_content(
        &self,
        signer: &SignerInfo,
        digest: Option<DigestAlgorithm>,
    ) -> Result<Vec<u8>> {
        let Some(attrs) = &signer.signed_attrs else {
            return Ok(self.tst_info_der.clone());
        };

        let digest = digest.ok_or_else(|| {
            TrustError::unsupported_algorithm(format!("signer digest {}", signer.digest_alg.oid))
        })?;
        let expected = digest.digest(&self.tst_info_der);
        let attr = attrs
            .iter()
            .find(|attr| attr.oid == ID_MESSAGE_DIGEST)
            .ok_or_else(|| TrustError::signature("signed attributes lack messageDigest"))?;
        let value = attr
            .values
            .iter()
            .next()
            .ok_or_else(|| TrustError::signature("empty messageDigest attribute"))?;
        let actual = OctetString::from_der(&value.to_der()?)?;
        if actual.as_bytes() != expected.as_slice() {
            return Err(TrustError::signature("messageDigest does not match TSTInfo"));
        }

        Ok(attrs.to_der()?)
    }
}

/// Blocking RFC 3161 client bound to one authority.
///
/// Every request carries a nonce taken from the wall clock in milliseconds,
/// bumped when needed so nonces strictly increase for this instance. The
/// client also tracks how large issued tokens are, so signers can reserve
/// space for the next one.
#[derive(Debug)]
pub struct TimestampClient {
    config: TimestampConfig,
    client: Client,
    policy: Option<ObjectIdentifier>,
    last_nonce: u64,
    token_size_estimate: usize,
    observed_token_size: Option<usize>,
}

impl TimestampClient {
    /// Create a client for the configured authority.
    pub fn new(config: TimestampConfig) -> Result<Self> {
        config.validate()?;
        let policy = config.policy()?;
        let client = build_http_client(&config.http)?;
        Ok(Self {
            token_size_estimate: config.token_size_estimate,
            config,
            client,
            policy,
            last_nonce: 0,
            observed_token_size: None,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &TimestampConfig {
        &self.config
    }

    /// Authority URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Digest algorithm used for imprints.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.config.digest_algorithm
    }

    /// Bytes to reserve for the next token.
    pub fn token_size_estimate(&self) -> usize {
        self.token_size_estimate
    }

    /// Size of the last token received plus a margin, `None` until the
    /// first successful request.
    pub fn observed_token_size(&self) -> Option<usize> {
        self.observed_token_size
    }

    /// Digest `data` with the configured algorithm.
    pub fn message_digest(&self, data: &[u8]) -> Vec<u8> {
        self.config.digest_algorithm.digest(data)
    }

    /// Digest `data` and obtain a token for it.
    pub fn timestamp_data(&mut self, data: &[u8]) -> Result<TimestampToken> {
        let imprint = self.message_digest(data);
        self.get_timestamp_token(&imprint)
    }

    /// Obtain a token for a precomputed digest.
    pub fn get_timestamp_token(&mut self, imprint: &[u8]) -> Result<TimestampToken> {
        let request = self.build_request(imprint)?;
        let body = self.send_request(&request.der)?;
        let token = self.decode_response(&request, &body)?;

        let size = token.encoded.len() + TOKEN_SIZE_MARGIN;
        self.token_size_estimate = size;
        self.observed_token_size = Some(size);
        info!(
            "Received time-stamp token from {} ({} bytes, genTime {})",
            self.config.url,
            token.encoded.len(),
            token.gen_time
        );
        Ok(token)
    }

    /// Encode a `TimeStampReq` for `imprint` with a fresh nonce.
    pub fn build_request(&mut self, imprint: &[u8]) -> Result<TimestampRequest> {
        let digest_algorithm = self.config.digest_algorithm;
        if imprint.len() != digest_algorithm.output_len() {
            return Err(TrustError::config(format!(
                "{} imprint must be {} bytes, got {}",
                digest_algorithm,
                digest_algorithm.output_len(),
                imprint.len()
            )));
        }

        let nonce = self.next_nonce();
        let request = TimeStampReq {
            version: TspVersion::V1,
            message_imprint: MessageImprint {
                hash_algorithm: digest_algorithm.algorithm_identifier(),
                hashed_message: OctetString::new(imprint)?,
            },
            req_policy: self.policy,
            nonce: Some(Uint::new(&nonce.to_be_bytes())?),
            cert_req: true,
            extensions: None,
        };

        Ok(TimestampRequest {
            der: request.to_der()?,
            nonce,
            imprint: imprint.to_vec(),
            digest_algorithm,
            policy: self.policy,
        })
    }

    /// POST an encoded request to the authority and return the raw reply.
    pub fn send_request(&self, request: &[u8]) -> Result<Vec<u8>> {
        let url = &self.config.url;
        let endpoint = parse_endpoint(url)?;
        debug!("POST {} ({} bytes)", endpoint, request.len());

        let mut builder = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, content_types::TIMESTAMP_QUERY)
            .header("Content-Transfer-Encoding", "binary")
            .body(request.to_vec());
        if let Some(auth) = &self.config.auth {
            let credentials = BASE64_STANDARD.encode(format!("{}:{}", auth.username, auth.password));
            builder = builder.header(AUTHORIZATION, format!("Basic {}", credentials));
        }

        let response = builder.send().map_err(|source| TrustError::TsaUnreachable {
            url: url.clone(),
            source,
        })?;
        read_body(url, response)
    }

    /// Decode a `TimeStampResp` and check it answers `request`.
    pub fn decode_response(
        &self,
        request: &TimestampRequest,
        bytes: &[u8],
    ) -> Result<TimestampToken> {
        let url = &self.config.url;
        let response = TimeStampResp::from_der(bytes)?;

        let code = response.status.failure_code();
        if code != 0 {
            warn!("TSA {} reported failure code {}", url, code);
            return Err(TrustError::TsaFailure {
                url: url.clone(),
                code,
            });
        }

        if !response.status.status.is_granted() {
            if response.time_stamp_token.is_some() {
                warn!(
                    "TSA {} returned a token with status {}",
                    url,
                    response.status.status.as_str()
                );
            }
            return Err(TrustError::TsaRejected {
                url: url.clone(),
                status: response.status.status_text(),
            });
        }
        let Some(content_info) = &response.time_stamp_token else {
            return Err(TrustError::TsaRejected {
                url: url.clone(),
                status: response.status.status_text(),
            });
        };

        let token = TimestampToken::from_content_info(content_info, response.status.status)?;
        check_token(request, &token)?;
        Ok(token)
    }

    fn next_nonce(&mut self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let nonce = now.max(self.last_nonce + 1);
        self.last_nonce = nonce;
        nonce
    }
}

fn check_token(request: &TimestampRequest, token: &TimestampToken) -> Result<()> {
    if token.nonce != Some(request.nonce) {
        return Err(TrustError::TsaMismatch(format!(
            "nonce {:?} does not echo {}",
            token.nonce, request.nonce
        )));
    }
    if token.digest_algorithm != request.digest_algorithm.oid() {
        return Err(TrustError::TsaMismatch(format!(
            "imprint algorithm {} differs from {}",
            token.digest_algorithm,
            request.digest_algorithm.oid()
        )));
    }
    if token.imprint != request.imprint {
        return Err(TrustError::TsaMismatch("message imprint differs".into()));
    }
    if let Some(policy) = request.policy {
        if token.policy != policy {
            return Err(TrustError::TsaMismatch(format!(
                "policy {} differs from requested {}",
                token.policy, policy
            )));
        }
    }
    Ok(())
}
