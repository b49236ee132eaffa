use der::Encode;
use p256::ecdsa::{
    DerSignature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
};
use pkcs8::DecodePublicKey;
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::EncodeRsaPrivateKey,
    pkcs1v15::{
        Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey,
    },
    signature::{SignatureEncoding, Signer, Verifier},
    traits::PublicKeyParts,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::cert::SignatureAlgorithm;
use crate::error::{IssueError, Result};

/// Smallest RSA modulus accepted for generated and loaded keys.
pub const MIN_RSA_BITS: usize = 2048;

/// Supported key types for certificate operations.
#[derive(Clone)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPair::Rsa { public, .. } => f
                .debug_struct("KeyPair::Rsa")
                .field("bits", &(public.size() * 8))
                .finish_non_exhaustive(),
            KeyPair::EcdsaP256 { .. } => f.debug_struct("KeyPair::EcdsaP256").finish_non_exhaustive(),
        }
    }
}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        if bits < MIN_RSA_BITS {
            return Err(IssueError::CsrGeneration(format!(
                "RSA modulus of {bits} bits is below the {MIN_RSA_BITS}-bit minimum"
            )));
        }
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| IssueError::CsrGeneration(format!("RSA key generation: {e}")))?;
        Ok(Self::from_rsa_private_key(private))
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let mut rng = rand_core::OsRng;
        let signing_key = P256SigningKey::random(&mut rng);
        let verifying_key = signing_key.verifying_key().to_owned();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    pub fn from_rsa_private_key(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        KeyPair::Rsa {
            private: Box::new(private),
            public,
        }
    }

    /// The algorithm this key produces signatures with.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256 { .. } => SignatureAlgorithm::Sha256WithECDSA,
        }
    }

    /// Signs `data` with SHA-256 (RSA PKCS#1 v1.5 or DER-encoded ECDSA).
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Rsa { private, .. } => {
                let signing_key: RsaSigningKey<Sha256> = RsaSigningKey::new(*(private.clone()));
                let signature = signing_key
                    .try_sign(data)
                    .map_err(|e| IssueError::Encoding(format!("RSA signature: {e}")))?;
                Ok(signature.to_vec())
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: P256Signature = signing_key
                    .try_sign(data)
                    .map_err(|e| IssueError::Encoding(format!("ECDSA signature: {e}")))?;
                Ok(signature.as_bytes().to_vec())
            }
        }
    }

    /// The public half as a SubjectPublicKeyInfo.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        PublicKey::from_key_pair(self).to_spki()
    }

    /// DER encoding of the private key and its conventional PEM label.
    ///
    /// RSA keys are written as PKCS#1 (`RSA PRIVATE KEY`), P-256 keys as
    /// PKCS#8 (`PRIVATE KEY`).
    pub fn private_key_der(&self) -> Result<(Vec<u8>, &'static str)> {
        match self {
            KeyPair::Rsa { private, .. } => {
                let doc = private.to_pkcs1_der()?;
                Ok((doc.as_bytes().to_vec(), "RSA PRIVATE KEY"))
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                use pkcs8::EncodePrivateKey;
                let doc = signing_key.to_pkcs8_der()?;
                Ok((doc.as_bytes().to_vec(), "PRIVATE KEY"))
            }
        }
    }
}

/// Public key of a subject or issuer, used for SPKI encoding and signature checks.
#[derive(Clone, Debug, PartialEq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        match key_pair {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
        }
    }

    /// Decodes an RSA or P-256 public key from a SubjectPublicKeyInfo.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        match spki.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => {
                Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(&der)?))
            }
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => Ok(PublicKey::EcdsaP256(
                P256VerifyingKey::from_public_key_der(&der)?,
            )),
            other => Err(IssueError::Decoding(format!(
                "Unsupported public key algorithm {other}"
            ))),
        }
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let spki = match self {
            PublicKey::Rsa(public) => SubjectPublicKeyInfoOwned::from_key(public.clone())?,
            PublicKey::EcdsaP256(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)?
            }
        };
        Ok(spki)
    }

    /// Verifies `signature` over `data` under the algorithm named by `algorithm`.
    pub fn verify(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let expected = SignatureAlgorithm::from_oid(&algorithm.oid)?;
        match (self, expected) {
            (PublicKey::Rsa(public), SignatureAlgorithm::Sha256WithRSA) => {
                let verifying_key: RsaVerifyingKey<Sha256> = RsaVerifyingKey::new(public.clone());
                let signature = RsaSignature::try_from(signature)
                    .map_err(|e| IssueError::Decoding(format!("RSA signature: {e}")))?;
                verifying_key
                    .verify(data, &signature)
                    .map_err(|_| IssueError::Decoding("RSA signature mismatch".to_string()))
            }
            (PublicKey::EcdsaP256(verifying_key), SignatureAlgorithm::Sha256WithECDSA) => {
                let signature = P256Signature::try_from(signature)
                    .map_err(|e| IssueError::Decoding(format!("ECDSA signature: {e}")))?;
                verifying_key
                    .verify(data, &signature)
                    .map_err(|_| IssueError::Decoding("ECDSA signature mismatch".to_string()))
            }
            (_, algorithm) => Err(IssueError::Decoding(format!(
                "Signature algorithm {algorithm:?} does not match the public key type"
            ))),
        }
    }
}

/// Key algorithm selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    #[default]
    Rsa2048,
    Rsa3072,
    Rsa4096,
    EcdsaP256,
}

/// Strategy producing the fresh key pair behind each CSR.
pub trait KeyGenerator {
    fn generate(&self) -> Result<KeyPair>;
}

/// Generates RSA key pairs of a fixed modulus size.
#[derive(Clone, Copy, Debug)]
pub struct RsaKeyGenerator {
    pub bits: usize,
}

impl Default for RsaKeyGenerator {
    fn default() -> Self {
        Self { bits: MIN_RSA_BITS }
    }
}

impl KeyGenerator for RsaKeyGenerator {
    fn generate(&self) -> Result<KeyPair> {
        KeyPair::generate_rsa(self.bits)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EcdsaP256KeyGenerator;

impl KeyGenerator for EcdsaP256KeyGenerator {
    fn generate(&self) -> Result<KeyPair> {
        Ok(KeyPair::generate_ecdsa_p256())
    }
}

impl KeyGenerator for KeyAlgorithm {
    fn generate(&self) -> Result<KeyPair> {
        match self {
            KeyAlgorithm::Rsa2048 => RsaKeyGenerator { bits: 2048 }.generate(),
            KeyAlgorithm::Rsa3072 => RsaKeyGenerator { bits: 3072 }.generate(),
            KeyAlgorithm::Rsa4096 => RsaKeyGenerator { bits: 4096 }.generate(),
            KeyAlgorithm::EcdsaP256 => EcdsaP256KeyGenerator.generate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsa_below_minimum_is_rejected() {
        let err = KeyPair::generate_rsa(1024).unwrap_err();
        assert!(matches!(err, IssueError::CsrGeneration(_)));
    }

    #[test]
    fn test_ecdsa_sign_and_verify() {
        let key = KeyPair::generate_ecdsa_p256();
        let public = PublicKey::from_key_pair(&key);
        let algorithm: AlgorithmIdentifierOwned = key.signature_algorithm().into();

        let signature = key.sign_data(b"hello").unwrap();
        public.verify(&algorithm, b"hello", &signature).unwrap();
        assert!(public.verify(&algorithm, b"goodbye", &signature).is_err());
    }

    #[test]
    fn test_spki_round_trip() {
        let key = KeyPair::generate_ecdsa_p256();
        let spki = key.as_spki().unwrap();
        let decoded = PublicKey::from_x509spki(&spki).unwrap();
        assert_eq!(decoded, PublicKey::from_key_pair(&key));
    }

    #[test]
    fn test_key_algorithm_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            algorithm: KeyAlgorithm,
        }
        let parsed: Wrapper = toml::from_str("algorithm = \"ecdsa-p256\"").unwrap();
        assert_eq!(parsed.algorithm, KeyAlgorithm::EcdsaP256);
    }

    #[test]
    fn test_ecdsa_private_key_label() {
        let (der, label) = KeyPair::generate_ecdsa_p256().private_key_der().unwrap();
        assert_eq!(label, "PRIVATE KEY");
        assert!(!der.is_empty());
    }
}
