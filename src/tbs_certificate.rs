use std::time::Duration;

use der::Encode;
use der::asn1::{BitString, GeneralizedTime, OctetString, UtcTime};
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::certificate::{CertificateInner, TbsCertificateInner};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Time;

use crate::cert::params::{ExtensionParam, Validity};
use crate::cert::{Certificate, SignatureAlgorithm};
use crate::error::{IssueError, Result};
use crate::key::KeyPair;

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
/// This struct contains all the fields required to generate a valid X.509 certificate.
///
/// # Fields
/// * `serial_number` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The name of the certificate issuer.
/// * `validity` - The `notBefore`/`notAfter` window.
/// * `subject` - The name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - Additional X.509 extensions for the certificate.
#[derive(Clone, Debug)]
pub struct TbsCertificate {
    pub serial_number: SerialNumber,
    pub signature_algorithm: SignatureAlgorithm,
    pub issuer: Name,
    pub validity: Validity,
    pub subject: Name,
    pub subject_public_key: SubjectPublicKeyInfoOwned,
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Creates a new `TbsCertificate` with serial number 1, valid for a year
    /// from now.
    pub fn new(
        issuer: Name,
        subject: Name,
        subject_public_key: SubjectPublicKeyInfoOwned,
        signature_algorithm: SignatureAlgorithm,
        extensions: Vec<ExtensionParam>,
    ) -> Result<Self> {
        Ok(Self {
            serial_number: SerialNumber::new(&[1])?,
            signature_algorithm,
            issuer,
            validity: Validity::for_days(365),
            subject,
            subject_public_key,
            extensions,
        })
    }

    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let validity = x509_cert::time::Validity {
            not_before: to_x509_time(self.validity.not_before)?,
            not_after: to_x509_time(self.validity.not_after)?,
        };

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: self.serial_number.clone(),
            signature: self.signature_algorithm.into(),
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.clone(),
            subject_public_key_info: self.subject_public_key.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: (!extensions.is_empty()).then_some(extensions),
        })
    }

    /// Encodes the `TbsCertificate` into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.to_tbs_certificate_inner()?
            .to_der()
            .map_err(|e| IssueError::Encoding(e.to_string()))
    }

    /// Signs the TBS structure with `key` and assembles the certificate.
    ///
    /// `key` must produce `signature_algorithm` signatures.
    pub fn sign(&self, key: &KeyPair) -> Result<Certificate> {
        if key.signature_algorithm() != self.signature_algorithm {
            return Err(IssueError::Encoding(format!(
                "{:?} key cannot produce {:?} signatures",
                key.signature_algorithm(),
                self.signature_algorithm
            )));
        }

        let tbs_certificate = self.to_tbs_certificate_inner()?;
        let tbs_der = tbs_certificate
            .to_der()
            .map_err(|e| IssueError::Encoding(e.to_string()))?;
        let signature = key.sign_data(&tbs_der)?;

        Ok(Certificate {
            inner: CertificateInner {
                signature_algorithm: tbs_certificate.signature.clone(),
                tbs_certificate,
                signature: BitString::from_bytes(&signature)?,
            },
        })
    }
}

/// UTCTime through 2049, GeneralizedTime from 2050 (RFC 5280 section 4.1.2.5).
fn to_x509_time(instant: OffsetDateTime) -> Result<Time> {
    let secs = u64::try_from(instant.unix_timestamp()).map_err(|_| {
        IssueError::Encoding(format!("{instant} precedes the Unix epoch"))
    })?;
    let date_time = der::DateTime::from_unix_duration(Duration::from_secs(secs))?;
    if date_time.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_date_time(date_time)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    }
}
