//! Signature verification with certificate public keys.
//!
//! Certificates, OCSP responses and time-stamp tokens are all signed with
//! an X.509 `AlgorithmIdentifier` naming the scheme. This module maps those
//! identifiers onto `ring` verification algorithms.

use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1,
    SECP_384_R_1, SHA_1_WITH_RSA_ENCRYPTION, SHA_256_WITH_RSA_ENCRYPTION,
    SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use tracing::debug;
use x509_cert::Certificate;

use crate::error::{Result, TrustError};
use crate::types::DigestAlgorithm;

/// Ed25519: 1.3.101.112
const ID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// Verify `sig` over `message` with the given public key.
///
/// `digest` is consulted when `algorithm` names only the key type
/// (`rsaEncryption`, `id-ecPublicKey`), as CMS signer infos commonly do.
pub fn verify(
    public_key: &SubjectPublicKeyInfoOwned,
    algorithm: &AlgorithmIdentifierOwned,
    digest: Option<DigestAlgorithm>,
    message: &[u8],
    sig: &[u8],
) -> Result<()> {
    let scheme = select_algorithm(public_key, &algorithm.oid, digest)?;
    let key_bytes = public_key.subject_public_key.raw_bytes();
    UnparsedPublicKey::new(scheme, key_bytes)
        .verify(message, sig)
        .map_err(|_| TrustError::signature(format!("{} signature mismatch", algorithm.oid)))
}

/// Verify that `cert` was signed by the holder of `issuer_key`.
pub fn verify_certificate(cert: &Certificate, issuer_key: &SubjectPublicKeyInfoOwned) -> Result<()> {
    let tbs = cert.tbs_certificate.to_der()?;
    let sig = cert
        .signature
        .as_bytes()
        .ok_or_else(|| TrustError::signature("signature has unused bits"))?;
    verify(issuer_key, &cert.signature_algorithm, None, &tbs, sig)
}

fn select_algorithm(
    public_key: &SubjectPublicKeyInfoOwned,
    oid: &ObjectIdentifier,
    digest: Option<DigestAlgorithm>,
) -> Result<&'static dyn VerificationAlgorithm> {
    let rsa_digest = if *oid == SHA_1_WITH_RSA_ENCRYPTION {
        Some(DigestAlgorithm::Sha1)
    } else if *oid == SHA_256_WITH_RSA_ENCRYPTION {
        Some(DigestAlgorithm::Sha256)
    } else if *oid == SHA_384_WITH_RSA_ENCRYPTION {
        Some(DigestAlgorithm::Sha384)
    } else if *oid == SHA_512_WITH_RSA_ENCRYPTION {
        Some(DigestAlgorithm::Sha512)
    } else if *oid == RSA_ENCRYPTION {
        Some(digest.unwrap_or(DigestAlgorithm::Sha256))
    } else {
        None
    };
    if let Some(digest) = rsa_digest {
        return Ok(rsa(digest));
    }

    if *oid == ECDSA_WITH_SHA_256 {
        ecdsa(public_key, DigestAlgorithm::Sha256)
    } else if *oid == ECDSA_WITH_SHA_384 {
        ecdsa(public_key, DigestAlgorithm::Sha384)
    } else if *oid == ID_EC_PUBLIC_KEY {
        ecdsa(public_key, digest.unwrap_or(DigestAlgorithm::Sha256))
    } else if *oid == ID_ED25519 {
        Ok(&signature::ED25519)
    } else {
        debug!(
            "No verifier for signature algorithm {} (key {})",
            oid, public_key.algorithm.oid
        );
        Err(TrustError::unsupported_algorithm(format!(
            "signature algorithm {oid}"
        )))
    }
}

fn rsa(digest: DigestAlgorithm) -> &'static dyn VerificationAlgorithm {
    match digest {
        DigestAlgorithm::Sha1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
        DigestAlgorithm::Sha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        DigestAlgorithm::Sha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
        DigestAlgorithm::Sha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
    }
}

fn ecdsa(
    public_key: &SubjectPublicKeyInfoOwned,
    digest: DigestAlgorithm,
) -> Result<&'static dyn VerificationAlgorithm> {
    if public_key.algorithm.oid != ID_EC_PUBLIC_KEY {
        return Err(TrustError::signature(format!(
            "ECDSA signature with {} key",
            public_key.algorithm.oid
        )));
    }
    let curve = public_key
        .algorithm
        .parameters
        .as_ref()
        .and_then(|p| p.to_der().ok())
        .and_then(|der| ObjectIdentifier::from_der(&der).ok())
        .ok_or_else(|| TrustError::signature("EC key without named curve"))?;

    let p256 = curve == SECP_256_R_1;
    let p384 = curve == SECP_384_R_1;
    match digest {
        DigestAlgorithm::Sha256 if p256 => Ok(&signature::ECDSA_P256_SHA256_ASN1),
        DigestAlgorithm::Sha384 if p256 => Ok(&signature::ECDSA_P256_SHA384_ASN1),
        DigestAlgorithm::Sha256 if p384 => Ok(&signature::ECDSA_P384_SHA256_ASN1),
        DigestAlgorithm::Sha384 if p384 => Ok(&signature::ECDSA_P384_SHA384_ASN1),
        _ => Err(TrustError::unsupported_algorithm(format!(
            "ECDSA on {curve} with {digest}"
        ))),
    }
}
