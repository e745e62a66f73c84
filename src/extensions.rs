//! Service endpoint discovery from certificate extensions.
//!
//! Locates the CRL distribution points, OCSP responder and time-stamp
//! authority a certificate advertises. Lookups never fail: an absent or
//! undecodable extension simply yields no URI.

use const_oid::db::rfc5280::{ID_CE_CRL_DISTRIBUTION_POINTS, ID_PE_AUTHORITY_INFO_ACCESS};
use const_oid::ObjectIdentifier;
use der::Decode;
use tracing::debug;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::crl::CrlDistributionPoints;
use x509_cert::ext::pkix::AuthorityInfoAccessSyntax;
use x509_cert::ext::Extension;
use x509_cert::Certificate;

use crate::asn1::Node;

/// id-ad-ocsp: 1.3.6.1.5.5.7.48.1
pub const ID_AD_OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");

/// Adobe time-stamp authority extension: 1.2.840.113583.1.1.9.1
pub const ID_ADOBE_TIMESTAMP: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113583.1.1.9.1");

/// GeneralName tag of `uniformResourceIdentifier`.
const URI_TAG: u8 = 6;

/// Find the extension with the given OID.
pub fn find_extension<'a>(cert: &'a Certificate, oid: &ObjectIdentifier) -> Option<&'a Extension> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == *oid)
}

/// First CRL distribution point URI of `cert`.
pub fn find_crl_uri(cert: &Certificate) -> Option<String> {
    find_crl_uris(cert).into_iter().next()
}

/// Every full-name URI across all CRL distribution points of `cert`,
/// in certificate order.
pub fn find_crl_uris(cert: &Certificate) -> Vec<String> {
    let Some(ext) = find_extension(cert, &ID_CE_CRL_DISTRIBUTION_POINTS) else {
        return Vec::new();
    };

    let points = match CrlDistributionPoints::from_der(ext.extn_value.as_bytes()) {
        Ok(points) => points,
        Err(e) => {
            debug!("Ignoring undecodable CRL distribution points: {}", e);
            return Vec::new();
        }
    };

    points
        .0
        .iter()
        .filter_map(|dp| match &dp.distribution_point {
            Some(DistributionPointName::FullName(names)) => Some(names),
            _ => None,
        })
        .flatten()
        .filter_map(|name| match name {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.as_str().to_string()),
            _ => None,
        })
        .collect()
}

/// OCSP responder URI from Authority Information Access.
///
/// Returns `None` when the certificate has no AIA extension (or it cannot
/// be decoded) and `Some("")` when AIA is present without an OCSP entry.
pub fn find_ocsp_uri(cert: &Certificate) -> Option<String> {
    let ext = find_extension(cert, &ID_PE_AUTHORITY_INFO_ACCESS)?;

    let aia = match AuthorityInfoAccessSyntax::from_der(ext.extn_value.as_bytes()) {
        Ok(aia) => aia,
        Err(e) => {
            debug!("Ignoring undecodable authority information access: {}", e);
            return None;
        }
    };

    let uri = aia
        .0
        .iter()
        .filter(|ad| ad.access_method == ID_AD_OCSP)
        .find_map(|ad| match &ad.access_location {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.as_str().to_string()),
            _ => None,
        });
    Some(uri.unwrap_or_default())
}

/// Time-stamp authority URI from the Adobe TSA extension.
///
/// The value is `SEQUENCE { version INTEGER, location GeneralName, ... }`,
/// optionally wrapped in one more OCTET STRING.
pub fn find_tsa_uri(cert: &Certificate) -> Option<String> {
    let ext = find_extension(cert, &ID_ADOBE_TIMESTAMP)?;

    let node = match Node::parse(ext.extn_value.as_bytes()).and_then(Node::unwrap_octets) {
        Ok(node) => node,
        Err(e) => {
            debug!("Ignoring undecodable TSA extension: {}", e);
            return None;
        }
    };

    match node.as_sequence()?.get(1)? {
        Node::Tagged {
            number: URI_TAG,
            constructed: false,
            value,
        } => Some(value.iter().map(|&b| char::from(b)).collect()),
        other => {
            debug!("TSA extension location is not a URI: {:?}", other);
            None
        }
    }
}
