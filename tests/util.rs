#![allow(dead_code)]

use std::sync::OnceLock;

use time::{Duration, OffsetDateTime};

use certissue::cert::extensions::{
    BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier, key_identifier,
};
use certissue::cert::params::{ExtensionParam, Validity};
use certissue::cert::{CERTIFICATE_LABEL, Certificate};
use certissue::config::{IssuerConfig, RootIdentity};
use certissue::issuer::root_signing_template;
use certissue::key::{EcdsaP256KeyGenerator, KeyPair};
use certissue::orchestrator::IssuanceOrchestrator;
use certissue::pem_utils::der_to_pem;
use certissue::request::SubjectRequest;
use certissue::store::{CA_CERTIFICATE_FILE, CA_KEY_FILE, RootCredential};
use certissue::tbs_certificate::TbsCertificate;
use certissue::verify::{ChainVerifier, VerifyOptions};

static ROOT: OnceLock<RootCredential> = OnceLock::new();

/// Self-signed RSA root with the default identity, shared by the tests of one binary.
pub fn root_credential() -> RootCredential {
    ROOT.get_or_init(|| build_root(KeyPair::generate_rsa(2048).unwrap()))
        .clone()
}

pub fn build_root(key: KeyPair) -> RootCredential {
    let name = root_signing_template(&RootIdentity::default())
        .as_x509_name()
        .unwrap();
    let spki = key.as_spki().unwrap();

    let extensions = vec![
        ExtensionParam::from_extension(
            BasicConstraints {
                is_ca: true,
                max_path_length: None,
            },
            true,
        )
        .unwrap(),
        ExtensionParam::from_extension(
            KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign | KeyUsages::DigitalSignature),
            true,
        )
        .unwrap(),
        ExtensionParam::from_extension(SubjectKeyIdentifier(key_identifier(&spki)), false).unwrap(),
    ];

    let mut tbs = TbsCertificate::new(name.clone(), name, spki, key.signature_algorithm(), extensions)
        .unwrap();
    let now = OffsetDateTime::now_utc();
    tbs.validity = Validity::new(now - Duration::hours(1), now + Duration::days(3650));

    let certificate = tbs.sign(&key).unwrap();
    RootCredential::new(key, certificate)
}

/// Writes `ca.key` (PKCS#1) and `ca.crt` into a fresh directory.
pub fn write_mount(root: &RootCredential) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let (der, label) = root.key().private_key_der().unwrap();
    std::fs::write(dir.path().join(CA_KEY_FILE), der_to_pem(&der, label)).unwrap();
    std::fs::write(
        dir.path().join(CA_CERTIFICATE_FILE),
        root.certificate().to_pem(CERTIFICATE_LABEL).unwrap(),
    )
    .unwrap();
    dir
}

/// Orchestrator over the shared root with P-256 leaf keys.
pub fn orchestrator(config: &IssuerConfig) -> IssuanceOrchestrator {
    IssuanceOrchestrator::new(root_credential(), config)
        .unwrap()
        .with_key_generator(Box::new(EcdsaP256KeyGenerator))
}

/// Unix seconds thirty days from now.
pub fn future_expiry() -> String {
    (OffsetDateTime::now_utc() + Duration::days(30))
        .unix_timestamp()
        .to_string()
}

pub fn request(serial_number: &str, expired_date: &str) -> SubjectRequest {
    SubjectRequest::builder()
        .serial_number(serial_number)
        .country_name("JP")
        .state_or_province_name("Tokyo")
        .locality_name("Minato-ku")
        .organization_name("Latona Inc")
        .organizational_unit_name("IT Department")
        .expired_date(expired_date)
        .build()
}

/// Verifier accepting the default policy extension.
pub fn verifier() -> ChainVerifier {
    ChainVerifier::new()
        .with_known_extension(const_oid::ObjectIdentifier::new_unwrap("1.3.6.1.4.1.55555.1"))
}

pub fn verify_leaf(certificate_pem: &str, root: &RootCredential, check_leaf_time: bool) {
    let leaf = Certificate::from_pem(certificate_pem).unwrap();
    let options = VerifyOptions {
        at_time: None,
        check_leaf_time,
    };
    verifier()
        .verify(&leaf, root.certificate(), options)
        .unwrap();
}
