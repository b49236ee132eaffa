use bon::Builder;
use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use der::asn1::{Ia5StringRef, PrintableStringRef, SetOfVec, Utf8StringRef};
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;

use super::extensions::{ExtendedKeyUsageOption, FlagSet, KeyUsages, ToAndFromX509Extension};
use crate::error::{IssueError, Result};
use crate::key::PublicKey;

const COUNTRY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const STATE_OR_PROVINCE_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const LOCALITY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const ORGANIZATION_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATIONAL_UNIT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// Parameters of the certificate to be issued, as taken from a verified CSR.
///
/// # Fields
/// * `subject` - The subject name placed in the certificate.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `serial_number` - The CA-assigned serial number.
/// * `key_usage` - Key usage bits; derived from `usages` when empty.
/// * `usages` - A list of extended key usage options.
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: Name,
    pub subject_public_key: PublicKey,
    pub serial_number: SerialNumber,
    #[builder(default)]
    pub key_usage: FlagSet<KeyUsages>,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Distinguished name parameters for building an X.509 name.
///
/// Empty or absent components are left out of the encoded name. The country is
/// encoded as a PrintableString, every other component as a UTF8String.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The country (C).
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    /// Converts the distinguished name to an X.509 name, ordered C, ST, L, O, OU, CN.
    pub fn as_x509_name(&self) -> Result<Name> {
        let components = [
            (COUNTRY_NAME, &self.country),
            (STATE_OR_PROVINCE_NAME, &self.state),
            (LOCALITY_NAME, &self.locality),
            (ORGANIZATION_NAME, &self.organization),
            (ORGANIZATIONAL_UNIT_NAME, &self.organization_unit),
            (COMMON_NAME, &self.common_name),
        ];

        let mut rdns = Vec::new();
        for (oid, value) in components {
            let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
                continue;
            };
            let value = if oid == COUNTRY_NAME {
                der::Any::encode_from(&PrintableStringRef::new(value).map_err(|e| {
                    IssueError::Encoding(format!("country {value:?} is not printable: {e}"))
                })?)?
            } else {
                der::Any::encode_from(&Utf8StringRef::new(value)?)?
            };
            let atv = AttributeTypeAndValue { oid, value };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 name.
    ///
    /// Attributes other than the six supported ones are ignored.
    pub fn from_x509_name(x509dn: &Name) -> Self {
        let mut dn = DistinguishedName::default();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let slot = match attr.oid {
                    COMMON_NAME => &mut dn.common_name,
                    COUNTRY_NAME => &mut dn.country,
                    STATE_OR_PROVINCE_NAME => &mut dn.state,
                    LOCALITY_NAME => &mut dn.locality,
                    ORGANIZATION_NAME => &mut dn.organization,
                    ORGANIZATIONAL_UNIT_NAME => &mut dn.organization_unit,
                    _ => continue,
                };
                *slot = attribute_string(attr);
            }
        }
        dn
    }
}

fn attribute_string(attr: &AttributeTypeAndValue) -> Option<String> {
    let value = attr.value.to_der().ok()?;
    if let Ok(s) = Utf8StringRef::from_der(&value) {
        return Some(s.as_str().to_string());
    }
    if let Ok(s) = PrintableStringRef::from_der(&value) {
        return Some(s.as_str().to_string());
    }
    Ia5StringRef::from_der(&value)
        .ok()
        .map(|s| s.as_str().to_string())
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Validity from `not_before` to `not_after`, both truncated to whole
    /// seconds as X.509 times carry no fractional part.
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        Self {
            not_before: truncate_to_seconds(not_before),
            not_after: truncate_to_seconds(not_after),
        }
    }

    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self::new(now, now + time::Duration::days(days))
    }

    /// Whether the window ends before it starts.
    pub fn is_inverted(&self) -> bool {
        self.not_after < self.not_before
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

pub(crate) fn truncate_to_seconds(instant: OffsetDateTime) -> OffsetDateTime {
    instant.replace_nanosecond(0).unwrap_or(instant)
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The extension value placed in the OCTET STRING.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value, or opaque bytes for private extensions
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        let value = extension.to_x509_extension_value()?;
        Ok(Self {
            oid: E::OID,
            critical,
            value,
        })
    }
}
