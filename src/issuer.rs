use std::str::FromStr;

use const_oid::ObjectIdentifier;
use time::OffsetDateTime;
use tracing::{debug, warn};
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, FlagSet,
    KeyUsage, KeyUsages, SubjectAltName, SubjectKeyIdentifier, key_identifier,
};
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, ExtensionParam, Validity};
use crate::config::{IssuerConfig, IssuerNameSource, LeafSubject, PemLabels, PolicyExtension, RootIdentity};
use crate::csr;
use crate::error::{IssueError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::request::{SubjectRequest, parse_expiration, parse_serial_number};
use crate::store::RootCredential;
use crate::tbs_certificate::TbsCertificate;

/// The root identity as a name template: C, ST, L, O, OU from `identity`
/// and CN `"{issuer_name} Root CA"`.
pub fn root_signing_template(identity: &RootIdentity) -> DistinguishedName {
    DistinguishedName::builder()
        .common_name(format!("{} Root CA", identity.issuer_name))
        .country(identity.country.clone())
        .state(identity.province.clone())
        .locality(identity.locality.clone())
        .organization(identity.organization.clone())
        .organization_unit(identity.organizational_unit.clone())
        .build()
}

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// Returns the name written into the issuer field.
    fn issuer_name(&self) -> Name;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Key identifier placed in the authority key identifier extension.
    fn authority_key_identifier(&self) -> Result<Vec<u8>> {
        Ok(key_identifier(&self.signing_key().as_spki()?))
    }

    /// Issues a certificate based on the provided certification request information.
    ///
    /// Basic constraints, key identifiers, key usage and extended key usage
    /// are derived from `cert_request`; its own extensions are appended as is.
    fn issue(&self, cert_request: &CertificationRequestInfo, validity: Validity) -> Result<Certificate> {
        let subject_public_key = cert_request.subject_public_key.to_spki()?;

        let basic_constraints = BasicConstraints {
            is_ca: cert_request.is_ca,
            max_path_length: None,
        };

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(
                SubjectKeyIdentifier(key_identifier(&subject_public_key)),
                false,
            )?,
            ExtensionParam::from_extension(
                AuthorityKeyIdentifier {
                    key_identifier: self.authority_key_identifier()?,
                },
                false,
            )?,
        ];

        let mut key_usage_flags: FlagSet<KeyUsages> = cert_request.key_usage;

        if key_usage_flags.is_empty() {
            if cert_request.is_ca {
                key_usage_flags |= KeyUsages::KeyCertSign;
                key_usage_flags |= KeyUsages::CRLSign;
            }

            for usage in &cert_request.usages {
                match usage {
                    ExtendedKeyUsageOption::ClientAuth
                    | ExtendedKeyUsageOption::ServerAuth
                    | ExtendedKeyUsageOption::EmailProtection => {
                        key_usage_flags |= KeyUsages::KeyEncipherment;
                    }
                    ExtendedKeyUsageOption::CodeSigning
                    | ExtendedKeyUsageOption::TimeStamping
                    | ExtendedKeyUsageOption::OcspSigning => {
                        key_usage_flags |= KeyUsages::DigitalSignature;
                    }
                    ExtendedKeyUsageOption::Any => {}
                }
            }
        }

        if !key_usage_flags.is_empty() {
            extensions.push(ExtensionParam::from_extension(KeyUsage(key_usage_flags), true)?);
        }

        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            // anyExtendedKeyUsage must not be marked critical (RFC 5280 4.2.1.12)
            let critical = !cert_request.usages.contains(&ExtendedKeyUsageOption::Any);
            extensions.push(ExtensionParam::from_extension(extended_key_usage, critical)?);
        }

        extensions.extend(cert_request.extensions.iter().cloned());

        let signing_key = self.signing_key();
        let tbs_cert = TbsCertificate {
            serial_number: cert_request.serial_number.clone(),
            signature_algorithm: signing_key.signature_algorithm(),
            issuer: self.issuer_name(),
            validity,
            subject: cert_request.subject.clone(),
            subject_public_key,
            extensions,
        };

        tbs_cert.sign(signing_key)
    }
}

impl Issuer for RootCredential {
    fn issuer_name(&self) -> Name {
        self.certificate().subject().clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key()
    }

    /// Reuses the root's own subject key identifier when it has one, so the
    /// two always match.
    fn authority_key_identifier(&self) -> Result<Vec<u8>> {
        match self.certificate().find_extension::<SubjectKeyIdentifier>()? {
            Some((_, ski)) => Ok(ski.0),
            None => Ok(key_identifier(&self.signing_key().as_spki()?)),
        }
    }
}

// Issues under a configured name with the root's key.
struct TemplateIssuer<'a> {
    name: Name,
    root: &'a RootCredential,
}

impl Issuer for TemplateIssuer<'_> {
    fn issuer_name(&self) -> Name {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.root.key()
    }

    fn authority_key_identifier(&self) -> Result<Vec<u8>> {
        self.root.authority_key_identifier()
    }
}

/// A signed leaf certificate.
#[derive(Clone, Debug)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub der: Vec<u8>,
    pub pem: String,
    pub not_after: OffsetDateTime,
    /// `notAfter` lies before the issuance instant.
    pub expired_at_issuance: bool,
}

/// Turns verified CSRs into client certificates signed by the root.
#[derive(Clone, Debug)]
pub struct CertificateIssuer {
    leaf_subject: LeafSubject,
    issuer_name: IssuerNameSource,
    template_name: Name,
    policy_extension: Option<ExtensionParam>,
    pem_labels: PemLabels,
}

impl CertificateIssuer {
    pub fn new(config: &IssuerConfig) -> Result<Self> {
        let template_name = root_signing_template(&config.root_identity)
            .as_x509_name()
            .map_err(|e| IssueError::Config(format!("root identity: {e}")))?;

        Ok(Self {
            leaf_subject: config.leaf_subject,
            issuer_name: config.issuer_name,
            template_name,
            policy_extension: policy_extension(&config.policy_extension)?,
            pem_labels: config.pem_labels,
        })
    }

    /// Issues a certificate for `csr_der` at the current instant.
    pub fn issue(
        &self,
        csr_der: &[u8],
        request: &SubjectRequest,
        root: &RootCredential,
    ) -> Result<IssuedCertificate> {
        self.issue_at(csr_der, request, root, OffsetDateTime::now_utc())
    }

    /// Issues a certificate for `csr_der` with `notBefore` set to `now`.
    pub fn issue_at(
        &self,
        csr_der: &[u8],
        request: &SubjectRequest,
        root: &RootCredential,
        now: OffsetDateTime,
    ) -> Result<IssuedCertificate> {
        let csr = csr::parse_and_verify(csr_der)?;
        let serial_number = parse_serial_number(&request.serial_number)?;
        let not_after = parse_expiration(&request.expired_date)?;

        let validity = Validity::new(now, not_after);
        let expired_at_issuance = validity.is_inverted();
        if expired_at_issuance {
            warn!(
                serial = %request.serial_number,
                not_after = %validity.not_after,
                "certificate is already expired at issuance"
            );
        }

        let subject = match self.leaf_subject {
            LeafSubject::FromRequest => csr.info.subject.clone(),
            LeafSubject::Empty => Name::default(),
        };
        let subject_is_empty = subject.0.is_empty();

        let mut extensions = Vec::new();
        let subject_alt_name = SubjectAltName {
            dns_names: request.dns_names(),
            emails: Some(request.email_address.trim())
                .filter(|email| !email.is_empty())
                .map(str::to_string)
                .into_iter()
                .collect(),
        };
        if !subject_alt_name.is_empty() {
            // must be critical when the subject is empty (RFC 5280 4.2.1.6)
            extensions.push(
                ExtensionParam::from_extension(subject_alt_name, subject_is_empty)
                    .map_err(signing_error)?,
            );
        }
        extensions.extend(self.policy_extension.iter().cloned());

        let subject_public_key =
            PublicKey::from_x509spki(&csr.info.public_key).map_err(signing_error)?;
        let cert_request = CertificationRequestInfo::builder()
            .subject(subject)
            .subject_public_key(subject_public_key)
            .serial_number(serial_number)
            .key_usage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment)
            .usages(vec![
                ExtendedKeyUsageOption::ClientAuth,
                ExtendedKeyUsageOption::Any,
            ])
            .extensions(extensions)
            .build();

        let certificate = match self.issuer_name {
            IssuerNameSource::RootCertificate => root.issue(&cert_request, validity),
            IssuerNameSource::Template => TemplateIssuer {
                name: self.template_name.clone(),
                root,
            }
            .issue(&cert_request, validity),
        }
        .map_err(signing_error)?;

        let der = certificate.to_der().map_err(signing_error)?;
        let pem = certificate
            .to_pem(self.pem_labels.certificate())
            .map_err(signing_error)?;

        debug!(serial = %request.serial_number, issuer = %certificate.issuer(), "signed client certificate");
        Ok(IssuedCertificate {
            not_after: certificate.not_after(),
            certificate,
            der,
            pem,
            expired_at_issuance,
        })
    }
}

fn signing_error(err: IssueError) -> IssueError {
    match err {
        IssueError::CertificateSigning(_) => err,
        other => IssueError::CertificateSigning(other.to_string()),
    }
}

fn policy_extension(config: &PolicyExtension) -> Result<Option<ExtensionParam>> {
    if !config.enabled {
        return Ok(None);
    }
    let oid = ObjectIdentifier::from_str(&config.oid)
        .map_err(|e| IssueError::Config(format!("policy extension OID {:?}: {e}", config.oid)))?;
    Ok(Some(ExtensionParam {
        oid,
        critical: config.critical,
        value: config.value.as_bytes().to_vec(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_signing_template_defaults() {
        let template = root_signing_template(&RootIdentity::default());
        assert_eq!(template.common_name.as_deref(), Some("localhost Root CA"));
        assert_eq!(template.country.as_deref(), Some("JP"));
        assert_eq!(template.organization.as_deref(), Some("Latona Inc"));
        assert_eq!(template.organization_unit.as_deref(), Some("IT Department"));
        assert_eq!(template.locality.as_deref(), Some("Minato-ku"));
        assert_eq!(template.state.as_deref(), Some("Tokyo"));
    }

    #[test]
    fn test_root_signing_template_is_configurable() {
        let identity = RootIdentity::builder()
            .country("US")
            .organization("Example Corp")
            .organizational_unit("PKI")
            .locality("Springfield")
            .province("Oregon")
            .issuer_name("example.com")
            .build();
        let name = root_signing_template(&identity).as_x509_name().unwrap();
        assert_eq!(
            name.to_string(),
            "CN=example.com Root CA,OU=PKI,O=Example Corp,L=Springfield,ST=Oregon,C=US"
        );
    }

    #[test]
    fn test_default_policy_extension() {
        let ext = policy_extension(&PolicyExtension::default()).unwrap().unwrap();
        assert_eq!(ext.oid.to_string(), "1.3.6.1.4.1.55555.1");
        assert_eq!(ext.value, b"{}");
        assert!(!ext.critical);
    }

    #[test]
    fn test_bad_policy_oid_is_a_config_error() {
        let config = PolicyExtension {
            oid: "not-an-oid".to_string(),
            ..PolicyExtension::default()
        };
        assert!(matches!(policy_extension(&config), Err(IssueError::Config(_))));
    }
}
