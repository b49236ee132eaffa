//! Per-item input and output records and the parsing of their string fields.

use bon::Builder;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use x509_cert::serial_number::SerialNumber;

use crate::cert::params::truncate_to_seconds;
use crate::error::{IssueError, Result};

/// One subject-identity request. Field names follow the wire format of the
/// batch descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
pub struct SubjectRequest {
    #[serde(rename = "SerialNumber", default)]
    pub serial_number: String,
    #[serde(rename = "CountryName", default)]
    #[builder(default)]
    pub country_name: String,
    #[serde(rename = "StateOrProvinceName", default)]
    #[builder(default)]
    pub state_or_province_name: String,
    #[serde(rename = "LocalityName", default)]
    #[builder(default)]
    pub locality_name: String,
    #[serde(rename = "organizationName", default)]
    #[builder(default)]
    pub organization_name: String,
    #[serde(rename = "organizationalUnitName", default)]
    #[builder(default)]
    pub organizational_unit_name: String,
    #[serde(rename = "EmailAddress", default)]
    #[builder(default)]
    pub email_address: String,
    #[serde(rename = "SubjectAltName", default)]
    #[builder(default)]
    pub subject_alt_name: String,
    #[serde(rename = "ExpiredDate", default)]
    pub expired_date: String,
}

impl SubjectRequest {
    /// DNS names listed in `SubjectAltName`, comma separated.
    pub fn dns_names(&self) -> Vec<String> {
        self.subject_alt_name
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Key material produced for one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCertificateBundle {
    #[serde(rename = "CSR")]
    pub csr_pem: String,
    #[serde(rename = "CRT")]
    pub certificate_pem: String,
    #[serde(rename = "Key")]
    pub private_key_pem: String,
    /// `notAfter` was already in the past when the certificate was signed.
    #[serde(skip)]
    pub expired_at_issuance: bool,
}

/// RFC 5280 section 4.1.2.2.
const MAX_SERIAL_OCTETS: usize = 20;

/// Parses a decimal serial number into a positive DER INTEGER of at most 20 octets.
pub fn parse_serial_number(serial: &str) -> Result<SerialNumber> {
    let digits = serial.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IssueError::SerialNumberFormat(format!(
            "{serial:?} is not a base-10 integer"
        )));
    }
    let value = rsa::BigUint::parse_bytes(digits.as_bytes(), 10).ok_or_else(|| {
        IssueError::SerialNumberFormat(format!("{serial:?} is not a base-10 integer"))
    })?;
    if value == rsa::BigUint::from(0u8) {
        return Err(IssueError::SerialNumberFormat(
            "serial number must be positive".to_string(),
        ));
    }

    let mut octets = value.to_bytes_be();
    if octets[0] & 0x80 != 0 {
        octets.insert(0, 0);
    }
    if octets.len() > MAX_SERIAL_OCTETS {
        return Err(IssueError::SerialNumberFormat(format!(
            "{serial:?} needs {} octets, more than the {MAX_SERIAL_OCTETS} allowed",
            octets.len()
        )));
    }
    SerialNumber::new(&octets).map_err(|e| {
        IssueError::SerialNumberFormat(format!("{serial:?} does not fit a certificate serial: {e}"))
    })
}

/// Parses an expiration given as decimal Unix seconds or as RFC 3339,
/// truncated to whole seconds. Dates before 1970 are rejected.
pub fn parse_expiration(expired_date: &str) -> Result<OffsetDateTime> {
    let value = expired_date.trim();
    let parsed = if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = value.parse().map_err(|e| {
            IssueError::ExpirationFormat(format!("{expired_date:?} is out of range: {e}"))
        })?;
        OffsetDateTime::from_unix_timestamp(secs).map_err(|e| {
            IssueError::ExpirationFormat(format!("{expired_date:?} is out of range: {e}"))
        })?
    } else {
        OffsetDateTime::parse(value, &Rfc3339).map_err(|e| {
            IssueError::ExpirationFormat(format!(
                "{expired_date:?} is neither Unix seconds nor RFC 3339: {e}"
            ))
        })?
    };
    if parsed.unix_timestamp() < 0 {
        return Err(IssueError::ExpirationFormat(format!(
            "{expired_date:?} precedes the Unix epoch"
        )));
    }
    Ok(truncate_to_seconds(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_number_parsing() {
        assert_eq!(parse_serial_number("1").unwrap().as_bytes(), &[1]);
        assert_eq!(parse_serial_number(" 256 ").unwrap().as_bytes(), &[1, 0]);

        // high bit set: a sign octet keeps the INTEGER positive
        let serial = parse_serial_number("255").unwrap();
        assert_eq!(serial.as_bytes()[0] & 0x80, 0);
        assert_eq!(rsa::BigUint::from_bytes_be(serial.as_bytes()), rsa::BigUint::from(255u8));
    }

    #[test]
    fn test_large_serial_number() {
        // 2^152 encodes in exactly 20 octets
        let serial = "5708990770823839524233143877797980545530986496";
        let parsed = parse_serial_number(serial).unwrap();
        assert_eq!(parsed.as_bytes().len(), 20);
        assert_eq!(rsa::BigUint::from_bytes_be(parsed.as_bytes()).to_string(), serial);
    }

    #[test]
    fn test_invalid_serial_numbers() {
        for serial in ["abc", "", "-1", "0", "12a", "1.5", "0x10"] {
            assert!(
                matches!(
                    parse_serial_number(serial),
                    Err(IssueError::SerialNumberFormat(_))
                ),
                "{serial:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_overlong_serial_number() {
        let serial = "9".repeat(60);
        assert!(matches!(
            parse_serial_number(&serial),
            Err(IssueError::SerialNumberFormat(_))
        ));
    }

    #[test]
    fn test_expiration_from_unix_seconds() {
        let parsed = parse_expiration("1735052400").unwrap();
        assert_eq!(parsed.unix_timestamp(), 1_735_052_400);
    }

    #[test]
    fn test_expiration_from_rfc3339() {
        let parsed = parse_expiration("2030-01-02T03:04:05.678Z").unwrap();
        assert_eq!(parsed.unix_timestamp(), 1_893_553_445);
        assert_eq!(parsed.nanosecond(), 0);
    }

    #[test]
    fn test_invalid_expiration() {
        for value in [
            "",
            "tomorrow",
            "2030-13-01T00:00:00Z",
            "99999999999999999999",
            "1969-12-31T00:00:00Z",
        ] {
            assert!(
                matches!(parse_expiration(value), Err(IssueError::ExpirationFormat(_))),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_dns_names_split_on_commas() {
        let request = SubjectRequest::builder()
            .serial_number("1")
            .expired_date("1")
            .subject_alt_name("a.example.com, b.example.com,,")
            .build();
        assert_eq!(request.dns_names(), vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_wire_field_names() {
        let json = r#"{"SerialNumber":"7","CountryName":"JP","organizationName":"Latona Inc","ExpiredDate":"1735052400"}"#;
        let request: SubjectRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.serial_number, "7");
        assert_eq!(request.organization_name, "Latona Inc");
        assert_eq!(request.locality_name, "");
    }
}
