//! PKCS#10 certificate signing requests.

use der::{Decode, Encode};
use der::asn1::BitString;
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::cert::params::DistinguishedName;
use crate::error::{IssueError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::pem_utils;
use crate::request::SubjectRequest;

/// A signed CSR in both encodings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltCsr {
    pub der: Vec<u8>,
    pub pem: String,
}

/// Builds the CSR for one request with the subject's own key.
///
/// Only ever sees the freshly generated subject key, never the CA key.
#[derive(Clone, Debug)]
pub struct CsrBuilder {
    common_name: String,
    pem_label: &'static str,
}

impl CsrBuilder {
    pub fn new(common_name: impl Into<String>, pem_label: &'static str) -> Self {
        Self {
            common_name: common_name.into(),
            pem_label,
        }
    }

    /// Subject of the request: C, ST, L, O, OU from `request`, CN from configuration.
    pub fn subject(&self, request: &SubjectRequest) -> DistinguishedName {
        let field = |value: &str| Some(value.to_string()).filter(|v| !v.is_empty());
        DistinguishedName {
            common_name: field(&self.common_name),
            country: field(&request.country_name),
            state: field(&request.state_or_province_name),
            locality: field(&request.locality_name),
            organization: field(&request.organization_name),
            organization_unit: field(&request.organizational_unit_name),
        }
    }

    pub fn build(&self, request: &SubjectRequest, key_pair: &KeyPair) -> Result<BuiltCsr> {
        self.try_build(request, key_pair)
            .map_err(|e| match e {
                IssueError::CsrGeneration(_) => e,
                other => IssueError::CsrGeneration(other.to_string()),
            })
    }

    fn try_build(&self, request: &SubjectRequest, key_pair: &KeyPair) -> Result<BuiltCsr> {
        let info = CertReqInfo {
            version: Version::V1,
            subject: self.subject(request).as_x509_name()?,
            public_key: key_pair.as_spki()?,
            attributes: Default::default(),
        };

        let info_der = info.to_der()?;
        let signature = key_pair.sign_data(&info_der)?;

        let csr = CertReq {
            info,
            algorithm: key_pair.signature_algorithm().into(),
            signature: BitString::from_bytes(&signature)?,
        };

        let der = csr.to_der()?;
        let pem = pem_utils::der_to_pem(&der, self.pem_label);
        Ok(BuiltCsr { der, pem })
    }
}

/// Parses a DER CSR and checks its self-signature.
pub fn parse_and_verify(der: &[u8]) -> Result<CertReq> {
    let csr = CertReq::from_der(der)
        .map_err(|e| IssueError::CsrInvalid(format!("failed to parse CSR: {e}")))?;

    let public_key = PublicKey::from_x509spki(&csr.info.public_key)
        .map_err(|e| IssueError::CsrInvalid(e.to_string()))?;
    let info_der = csr
        .info
        .to_der()
        .map_err(|e| IssueError::CsrInvalid(e.to_string()))?;
    let signature = csr
        .signature
        .as_bytes()
        .ok_or_else(|| IssueError::CsrInvalid("signature has unused bits".to_string()))?;

    public_key
        .verify(&csr.algorithm, &info_der, signature)
        .map_err(|e| IssueError::CsrInvalid(format!("CSR signature check failed: {e}")))?;
    Ok(csr)
}
