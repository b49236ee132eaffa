//! Issuer configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) reproduces
//! the behaviour of the existing deployment apart from the PEM labels.
//!
//! ```toml
//! mount_path = "/var/lib/certissue"
//! leaf_common_name = "localhost"
//! key_algorithm = "rsa2048"
//! pem_labels = "standard"
//! batch_policy = "fail-fast"
//!
//! [root_identity]
//! country = "JP"
//! organization = "Latona Inc"
//! issuer_name = "localhost"
//! ```

use std::path::{Path, PathBuf};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::cert::CERTIFICATE_LABEL;
use crate::cert::CERTIFICATE_REQUEST_LABEL;
use crate::error::{IssueError, Result};
use crate::key::KeyAlgorithm;

/// Root-identity fields of the issuing CA.
#[derive(Clone, Debug, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(on(String, into))]
#[serde(default)]
pub struct RootIdentity {
    pub country: String,
    pub organization: String,
    pub organizational_unit: String,
    pub locality: String,
    pub province: String,
    /// Common name is `"{issuer_name} Root CA"`.
    pub issuer_name: String,
}

impl Default for RootIdentity {
    fn default() -> Self {
        Self {
            country: "JP".to_string(),
            organization: "Latona Inc".to_string(),
            organizational_unit: "IT Department".to_string(),
            locality: "Minato-ku".to_string(),
            province: "Tokyo".to_string(),
            issuer_name: "localhost".to_string(),
        }
    }
}

/// Which name is written into the issuer field of leaf certificates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssuerNameSource {
    /// The subject of the loaded root certificate, byte for byte.
    #[default]
    RootCertificate,
    /// The name built from [`RootIdentity`].
    Template,
}

/// Subject written into leaf certificates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeafSubject {
    /// The subject of the verified CSR.
    #[default]
    FromRequest,
    /// An empty subject, as older consumers received.
    Empty,
}

/// PEM labels used on output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PemLabels {
    /// `CERTIFICATE REQUEST`, `CERTIFICATE`, and the key's own label.
    #[default]
    Standard,
    /// `CERTIFICATE REQUEST` on every block, for consumers that expect it.
    Legacy,
}

impl PemLabels {
    pub fn csr(&self) -> &'static str {
        CERTIFICATE_REQUEST_LABEL
    }

    pub fn certificate(&self) -> &'static str {
        match self {
            PemLabels::Standard => CERTIFICATE_LABEL,
            PemLabels::Legacy => CERTIFICATE_REQUEST_LABEL,
        }
    }

    /// Label for a private key whose conventional label is `key_label`.
    pub fn private_key<'a>(&self, key_label: &'a str) -> &'a str {
        match self {
            PemLabels::Standard => key_label,
            PemLabels::Legacy => CERTIFICATE_REQUEST_LABEL,
        }
    }
}

/// What a batch returns when one of its items fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchPolicy {
    /// Abort the batch and return nothing.
    #[default]
    FailFast,
    /// Return every success alongside the per-item errors.
    PartialSuccess,
}

/// Private extension reserved for policy data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyExtension {
    pub enabled: bool,
    /// Dotted OID.
    pub oid: String,
    /// Raw extension value.
    pub value: String,
    pub critical: bool,
}

impl Default for PolicyExtension {
    fn default() -> Self {
        Self {
            enabled: true,
            oid: "1.3.6.1.4.1.55555.1".to_string(),
            value: "{}".to_string(),
            critical: false,
        }
    }
}

/// Issuer configuration.
#[derive(Clone, Debug, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Directory holding `ca.key` and `ca.crt`.
    #[builder(default = PathBuf::from("."), into)]
    pub mount_path: PathBuf,
    #[builder(default)]
    pub root_identity: RootIdentity,
    #[builder(default)]
    pub issuer_name: IssuerNameSource,
    /// Common name placed in every CSR.
    #[builder(default = "localhost".to_string(), into)]
    pub leaf_common_name: String,
    #[builder(default)]
    pub leaf_subject: LeafSubject,
    #[builder(default)]
    pub key_algorithm: KeyAlgorithm,
    #[builder(default)]
    pub pem_labels: PemLabels,
    #[builder(default)]
    pub batch_policy: BatchPolicy,
    /// Issue certificates whose requested expiry has already passed.
    #[builder(default = true)]
    pub allow_expired: bool,
    #[builder(default)]
    pub policy_extension: PolicyExtension,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl IssuerConfig {
    /// Parses a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| IssueError::Config(e.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| IssueError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
            .map_err(|e| IssueError::Config(format!("{}: {e}", path.display())))
    }

    pub fn ca_key_path(&self) -> PathBuf {
        self.mount_path.join(crate::store::CA_KEY_FILE)
    }

    pub fn ca_certificate_path(&self) -> PathBuf {
        self.mount_path.join(crate::store::CA_CERTIFICATE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = IssuerConfig::from_toml("").unwrap();
        assert_eq!(config, IssuerConfig::default());
        assert_eq!(config.leaf_common_name, "localhost");
        assert!(config.allow_expired);
        assert_eq!(config.root_identity.organization, "Latona Inc");
        assert_eq!(config.ca_key_path(), PathBuf::from("./ca.key"));
    }

    #[test]
    fn test_partial_document() {
        let config = IssuerConfig::from_toml(
            r#"
            mount_path = "/srv/ca"
            key_algorithm = "ecdsa-p256"
            pem_labels = "legacy"
            batch_policy = "partial-success"
            issuer_name = "template"

            [root_identity]
            organization = "Example Corp"

            [policy_extension]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.ca_certificate_path(), PathBuf::from("/srv/ca/ca.crt"));
        assert_eq!(config.key_algorithm, KeyAlgorithm::EcdsaP256);
        assert_eq!(config.pem_labels, PemLabels::Legacy);
        assert_eq!(config.batch_policy, BatchPolicy::PartialSuccess);
        assert_eq!(config.issuer_name, IssuerNameSource::Template);
        assert_eq!(config.root_identity.organization, "Example Corp");
        assert_eq!(config.root_identity.country, "JP");
        assert!(!config.policy_extension.enabled);
        assert_eq!(config.policy_extension.oid, "1.3.6.1.4.1.55555.1");
    }

    #[test]
    fn test_unknown_variant_is_a_config_error() {
        let err = IssuerConfig::from_toml("pem_labels = \"fancy\"").unwrap_err();
        assert!(matches!(err, IssueError::Config(_)));
    }

    #[test]
    fn test_legacy_labels() {
        let labels = PemLabels::Legacy;
        assert_eq!(labels.certificate(), "CERTIFICATE REQUEST");
        assert_eq!(labels.private_key("RSA PRIVATE KEY"), "CERTIFICATE REQUEST");
        assert_eq!(PemLabels::Standard.private_key("RSA PRIVATE KEY"), "RSA PRIVATE KEY");
    }
}
