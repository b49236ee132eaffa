pub mod extensions;
pub mod params;

use der::{Decode, Encode};
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::error::{IssueError, Result};
use crate::pem_utils;
use extensions::ToAndFromX509Extension;

/// PEM label of a standard X.509 certificate.
pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
/// PEM label of a PKCS#10 request, also used by older consumers for every block.
pub const CERTIFICATE_REQUEST_LABEL: &str = "CERTIFICATE REQUEST";

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
}

impl SignatureAlgorithm {
    /// Looks up the algorithm for a signature OID.
    pub fn from_oid(oid: &const_oid::ObjectIdentifier) -> Result<Self> {
        match *oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Ok(Self::Sha256WithRSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(Self::Sha256WithECDSA),
            _ => Err(IssueError::Decoding(format!(
                "Unsupported signature algorithm {oid}"
            ))),
        }
    }
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA identifiers carry an explicit NULL parameter (RFC 4055), ECDSA ones
    /// carry none (RFC 5758).
    fn from(value: SignatureAlgorithm) -> Self {
        match value {
            SignatureAlgorithm::Sha256WithRSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(der::Any::from(der::asn1::AnyRef::NULL)),
            },
            SignatureAlgorithm::Sha256WithECDSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
        }
    }
}

/// Represents an X.509 certificate.
///
/// This struct provides methods to encode the certificate into DER or PEM
/// formats and read back the fields the issuance pipeline cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Decodes a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)?;
        Ok(Self { inner })
    }

    /// Decodes a PEM certificate.
    ///
    /// Blocks labelled `CERTIFICATE REQUEST` are accepted as well, since older
    /// deployments wrote signed certificates under that label.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (label, der) = pem_utils::pem_to_der(pem)?;
        if label != CERTIFICATE_LABEL && label != CERTIFICATE_REQUEST_LABEL {
            return Err(IssueError::Decoding(format!(
                "Unexpected PEM label {label:?} for a certificate"
            )));
        }
        Self::from_der(&der)
    }

    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| IssueError::Encoding(e.to_string()))
    }

    /// Encodes the certificate into PEM format under `label`.
    pub fn to_pem(&self, label: &str) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, label))
    }

    pub fn subject(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    /// Raw serial number octets as encoded (may carry a leading zero).
    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    pub fn not_before(&self) -> OffsetDateTime {
        to_offset_date_time(self.inner.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> OffsetDateTime {
        to_offset_date_time(self.inner.tbs_certificate.validity.not_after)
    }

    /// Returns the first extension with `E`'s OID, decoded, with its criticality.
    pub fn find_extension<E: ToAndFromX509Extension>(&self) -> Result<Option<(bool, E)>> {
        let Some(extensions) = self.inner.tbs_certificate.extensions.as_ref() else {
            return Ok(None);
        };
        extensions
            .iter()
            .find(|ext| ext.extn_id == E::OID)
            .map(|ext| Ok((ext.critical, E::from_x509_extension_value(ext.extn_value.as_bytes())?)))
            .transpose()
    }
}

fn to_offset_date_time(time: x509_cert::time::Time) -> OffsetDateTime {
    let secs = time.to_unix_duration().as_secs();
    // DER times are bounded to year 9999, far inside i64 seconds.
    OffsetDateTime::from_unix_timestamp(secs as i64).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
