//! Checks that an issued certificate chains to the root it was signed under.

use const_oid::ObjectIdentifier;
use der::Encode;
use time::OffsetDateTime;
use tracing::debug;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages,
    SubjectAltName, SubjectKeyIdentifier, ToAndFromX509Extension,
};
use crate::error::{IssueError, Result};
use crate::key::PublicKey;

/// Options for a single verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Instant the validity windows are checked against; now when `None`.
    pub at_time: Option<OffsetDateTime>,
    /// Check the leaf's own validity window. The root's window is always checked.
    pub check_leaf_time: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            at_time: None,
            check_leaf_time: true,
        }
    }
}

/// Verifies leaf certificates against a single trusted root.
#[derive(Clone, Debug)]
pub struct ChainVerifier {
    known_extensions: Vec<ObjectIdentifier>,
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self {
            known_extensions: vec![
                BasicConstraints::OID,
                KeyUsage::OID,
                ExtendedKeyUsage::OID,
                SubjectAltName::OID,
                AuthorityKeyIdentifier::OID,
                SubjectKeyIdentifier::OID,
            ],
        }
    }
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `oid` when it appears as a critical extension on the leaf.
    pub fn with_known_extension(mut self, oid: ObjectIdentifier) -> Self {
        if !self.known_extensions.contains(&oid) {
            self.known_extensions.push(oid);
        }
        self
    }

    /// Verifies that `leaf` was issued by `root`.
    ///
    /// Any failure is reported as [`IssueError::ChainVerification`].
    pub fn verify(&self, leaf: &Certificate, root: &Certificate, options: VerifyOptions) -> Result<()> {
        self.check(leaf, root, options)
            .map_err(|e| match e {
                IssueError::ChainVerification(_) => e,
                other => IssueError::ChainVerification(other.to_string()),
            })
    }

    fn check(&self, leaf: &Certificate, root: &Certificate, options: VerifyOptions) -> Result<()> {
        let at_time = options.at_time.unwrap_or_else(OffsetDateTime::now_utc);

        if leaf.issuer() != root.subject() {
            return Err(failure(format!(
                "issuer {} does not match root subject {}",
                leaf.issuer(),
                root.subject()
            )));
        }

        self.check_root(root, at_time)?;
        self.check_signature(leaf, root)?;
        self.check_leaf(leaf, root)?;

        if options.check_leaf_time && !within(leaf, at_time) {
            return Err(failure(format!(
                "leaf is valid from {} to {}, not at {at_time}",
                leaf.not_before(),
                leaf.not_after()
            )));
        }

        debug!(subject = %leaf.subject(), issuer = %leaf.issuer(), "leaf chains to root");
        Ok(())
    }

    fn check_root(&self, root: &Certificate, at_time: OffsetDateTime) -> Result<()> {
        if let Some((_, constraints)) = root.find_extension::<BasicConstraints>()? {
            if !constraints.is_ca {
                return Err(failure("root is not a CA certificate"));
            }
        }
        if let Some((_, KeyUsage(flags))) = root.find_extension::<KeyUsage>()? {
            if !flags.contains(KeyUsages::KeyCertSign) {
                return Err(failure("root key usage does not permit certificate signing"));
            }
        }
        if !within(root, at_time) {
            return Err(failure(format!(
                "root is valid from {} to {}, not at {at_time}",
                root.not_before(),
                root.not_after()
            )));
        }
        Ok(())
    }

    fn check_signature(&self, leaf: &Certificate, root: &Certificate) -> Result<()> {
        let inner = &leaf.inner;
        if inner.signature_algorithm != inner.tbs_certificate.signature {
            return Err(failure("outer and inner signature algorithms differ"));
        }

        let root_key = PublicKey::from_x509spki(&root.inner.tbs_certificate.subject_public_key_info)?;
        let tbs_der = inner.tbs_certificate.to_der()?;
        let signature = inner
            .signature
            .as_bytes()
            .ok_or_else(|| failure("signature has unused bits"))?;

        root_key
            .verify(&inner.signature_algorithm, &tbs_der, signature)
            .map_err(|e| failure(format!("signature does not verify under the root key: {e}")))
    }

    fn check_leaf(&self, leaf: &Certificate, root: &Certificate) -> Result<()> {
        if let Some((_, constraints)) = leaf.find_extension::<BasicConstraints>()? {
            if constraints.is_ca {
                return Err(failure("leaf is marked as a CA"));
            }
        }

        if let (Some((_, aki)), Some((_, ski))) = (
            leaf.find_extension::<AuthorityKeyIdentifier>()?,
            root.find_extension::<SubjectKeyIdentifier>()?,
        ) {
            if aki.key_identifier != ski.0 {
                return Err(failure("authority key identifier does not match the root"));
            }
        }

        let extensions = leaf.inner.tbs_certificate.extensions.iter().flatten();
        for extension in extensions.filter(|ext| ext.critical) {
            if !self.known_extensions.contains(&extension.extn_id) {
                return Err(failure(format!(
                    "unhandled critical extension {}",
                    extension.extn_id
                )));
            }
        }
        Ok(())
    }
}

fn within(certificate: &Certificate, at_time: OffsetDateTime) -> bool {
    certificate.not_before() <= at_time && at_time <= certificate.not_after()
}

fn failure(message: impl Into<String>) -> IssueError {
    IssueError::ChainVerification(message.into())
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::cert::params::{DistinguishedName, ExtensionParam, Validity};
    use crate::key::KeyPair;
    use crate::tbs_certificate::TbsCertificate;

    fn name(common_name: &str) -> x509_cert::name::Name {
        DistinguishedName::builder()
            .common_name(common_name.to_string())
            .build()
            .as_x509_name()
            .unwrap()
    }

    fn root(key: &KeyPair, is_ca: bool) -> Certificate {
        let extensions = vec![
            ExtensionParam::from_extension(
                BasicConstraints {
                    is_ca,
                    max_path_length: None,
                },
                true,
            )
            .unwrap(),
        ];
        TbsCertificate::new(
            name("Test Root CA"),
            name("Test Root CA"),
            key.as_spki().unwrap(),
            key.signature_algorithm(),
            extensions,
        )
        .unwrap()
        .sign(key)
        .unwrap()
    }

    fn leaf(root_key: &KeyPair, validity: Validity, extensions: Vec<ExtensionParam>) -> Certificate {
        let leaf_key = KeyPair::generate_ecdsa_p256();
        let mut tbs = TbsCertificate::new(
            name("Test Root CA"),
            name("client"),
            leaf_key.as_spki().unwrap(),
            root_key.signature_algorithm(),
            extensions,
        )
        .unwrap();
        tbs.validity = validity;
        tbs.sign(root_key).unwrap()
    }

    #[test]
    fn test_leaf_verifies_against_its_root() {
        let root_key = KeyPair::generate_ecdsa_p256();
        let root = root(&root_key, true);
        let leaf = leaf(&root_key, Validity::for_days(1), vec![]);
        ChainVerifier::new()
            .verify(&leaf, &root, VerifyOptions::default())
            .unwrap();
    }

    #[test]
    fn test_foreign_root_is_rejected() {
        let root_key = KeyPair::generate_ecdsa_p256();
        let other_key = KeyPair::generate_ecdsa_p256();
        let leaf = leaf(&root_key, Validity::for_days(1), vec![]);
        let err = ChainVerifier::new()
            .verify(&leaf, &root(&other_key, true), VerifyOptions::default())
            .unwrap_err();
        assert!(matches!(err, IssueError::ChainVerification(_)));
    }

    #[test]
    fn test_non_ca_root_is_rejected() {
        let root_key = KeyPair::generate_ecdsa_p256();
        let leaf = leaf(&root_key, Validity::for_days(1), vec![]);
        let err = ChainVerifier::new()
            .verify(&leaf, &root(&root_key, false), VerifyOptions::default())
            .unwrap_err();
        assert!(matches!(err, IssueError::ChainVerification(ref msg) if msg.contains("not a CA")));
    }

    #[test]
    fn test_expired_leaf_needs_time_check_disabled() {
        let root_key = KeyPair::generate_ecdsa_p256();
        let root = root(&root_key, true);
        let now = OffsetDateTime::now_utc();
        let leaf = leaf(&root_key, Validity::new(now, now - Duration::days(1)), vec![]);

        assert!(ChainVerifier::new()
            .verify(&leaf, &root, VerifyOptions::default())
            .is_err());

        let options = VerifyOptions {
            check_leaf_time: false,
            ..VerifyOptions::default()
        };
        ChainVerifier::new().verify(&leaf, &root, options).unwrap();
    }

    #[test]
    fn test_root_outside_its_window_is_rejected() {
        let root_key = KeyPair::generate_ecdsa_p256();
        let root = root(&root_key, true);
        let leaf = leaf(&root_key, Validity::for_days(1), vec![]);
        let options = VerifyOptions {
            at_time: Some(OffsetDateTime::now_utc() + Duration::days(400)),
            check_leaf_time: false,
        };
        assert!(ChainVerifier::new().verify(&leaf, &root, options).is_err());
    }

    #[test]
    fn test_unknown_critical_extension() {
        let root_key = KeyPair::generate_ecdsa_p256();
        let root = root(&root_key, true);
        let private = ExtensionParam {
            oid: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.55555.1"),
            critical: true,
            value: b"{}".to_vec(),
        };
        let leaf = leaf(&root_key, Validity::for_days(1), vec![private]);

        assert!(ChainVerifier::new()
            .verify(&leaf, &root, VerifyOptions::default())
            .is_err());
        ChainVerifier::new()
            .with_known_extension(ObjectIdentifier::new_unwrap("1.3.6.1.4.1.55555.1"))
            .verify(&leaf, &root, VerifyOptions::default())
            .unwrap();
    }
}
