//! Loading of the root CA credential from disk.

use std::path::Path;

use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use tracing::{debug, error};

use crate::cert::Certificate;
use crate::error::{IssueError, Result};
use crate::key::{KeyPair, MIN_RSA_BITS};
use crate::pem_utils;

/// File name of the CA private key under the mount directory.
pub const CA_KEY_FILE: &str = "ca.key";
/// File name of the CA certificate under the mount directory.
pub const CA_CERTIFICATE_FILE: &str = "ca.crt";

/// The root CA private key and self-signed certificate.
///
/// Loaded once per batch and only read afterwards.
#[derive(Clone, Debug)]
pub struct RootCredential {
    key: KeyPair,
    certificate: Certificate,
}

impl RootCredential {
    /// Pairs a key with a certificate without checking that they belong together.
    pub fn new(key: KeyPair, certificate: Certificate) -> Self {
        Self { key, certificate }
    }

    /// Loads `<mount>/ca.key` and `<mount>/ca.crt`.
    pub fn load(mount: impl AsRef<Path>) -> Result<Self> {
        let mount = mount.as_ref();
        Self::load_from(mount.join(CA_KEY_FILE), mount.join(CA_CERTIFICATE_FILE))
    }

    /// Loads the PEM key and certificate from explicit paths.
    pub fn load_from(key_path: impl AsRef<Path>, certificate_path: impl AsRef<Path>) -> Result<Self> {
        let key_path = key_path.as_ref();
        let certificate_path = certificate_path.as_ref();

        let key = load_private_key(key_path).inspect_err(|e| error!(path = %key_path.display(), "{e}"))?;
        let certificate = load_certificate(certificate_path)
            .inspect_err(|e| error!(path = %certificate_path.display(), "{e}"))?;

        debug!(
            key = %key_path.display(),
            certificate = %certificate_path.display(),
            subject = %certificate.subject(),
            "loaded root credential"
        );
        Ok(Self { key, certificate })
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }
}

fn read_pem(path: &Path) -> Result<(String, Vec<u8>)> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| IssueError::KeyLoad(format!("{}: {e}", path.display())))?;
    pem_utils::pem_to_der(&contents)
        .map_err(|e| IssueError::KeyLoad(format!("{}: malformed PEM: {e}", path.display())))
}

/// Reads an RSA private key in PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8
/// (`PRIVATE KEY`) form.
pub fn load_private_key(path: &Path) -> Result<KeyPair> {
    let (label, der) = read_pem(path)?;
    let private = match label.as_str() {
        "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(&der)
            .map_err(|e| IssueError::KeyLoad(format!("{}: {e}", path.display())))?,
        "PRIVATE KEY" => RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| IssueError::KeyLoad(format!("{}: {e}", path.display())))?,
        other => {
            return Err(IssueError::KeyLoad(format!(
                "{}: unexpected PEM label {other:?}",
                path.display()
            )));
        }
    };

    let bits = private.size() * 8;
    if bits < MIN_RSA_BITS {
        return Err(IssueError::KeyLoad(format!(
            "{}: {bits}-bit RSA key is below the {MIN_RSA_BITS}-bit minimum",
            path.display()
        )));
    }
    Ok(KeyPair::from_rsa_private_key(private))
}

/// Reads a PEM certificate.
pub fn load_certificate(path: &Path) -> Result<Certificate> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| IssueError::KeyLoad(format!("{}: {e}", path.display())))?;
    Certificate::from_pem(&contents)
        .map_err(|e| IssueError::KeyLoad(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = RootCredential::load(dir.path()).unwrap_err();
        assert!(matches!(err, IssueError::KeyLoad(ref msg) if msg.contains("ca.key")));
    }

    #[test]
    fn test_garbage_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CA_KEY_FILE), "not a pem file").unwrap();
        assert!(matches!(
            load_private_key(&dir.path().join(CA_KEY_FILE)),
            Err(IssueError::KeyLoad(_))
        ));
    }

    #[test]
    fn test_wrong_key_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CA_KEY_FILE);
        std::fs::write(&path, pem_utils::der_to_pem(&[1, 2, 3], "EC PRIVATE KEY")).unwrap();
        let err = load_private_key(&path).unwrap_err();
        assert!(matches!(err, IssueError::KeyLoad(ref msg) if msg.contains("EC PRIVATE KEY")));
    }

    #[test]
    fn test_truncated_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CA_CERTIFICATE_FILE);
        std::fs::write(&path, pem_utils::der_to_pem(&[0x30, 0x03, 0x02], "CERTIFICATE")).unwrap();
        assert!(matches!(load_certificate(&path), Err(IssueError::KeyLoad(_))));
    }
}
