//! Drives a batch of requests through key generation, CSR building, signing
//! and chain verification.

use std::str::FromStr;

use const_oid::ObjectIdentifier;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::config::{BatchPolicy, IssuerConfig, PemLabels};
use crate::csr::CsrBuilder;
use crate::error::{IssueError, Result};
use crate::issuer::CertificateIssuer;
use crate::key::KeyGenerator;
use crate::pem_utils;
use crate::request::{IssuedCertificateBundle, SubjectRequest};
use crate::store::RootCredential;
use crate::verify::{ChainVerifier, VerifyOptions};

/// The item at `index` failed and the batch was aborted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("request {index} failed: {source}")]
pub struct BatchError {
    /// Zero-based position of the failing request.
    pub index: usize,
    pub source: IssueError,
}

/// Outcome of every request of a batch, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub items: Vec<std::result::Result<IssuedCertificateBundle, IssueError>>,
}

impl BatchReport {
    pub fn bundles(&self) -> impl Iterator<Item = &IssuedCertificateBundle> {
        self.items.iter().filter_map(|item| item.as_ref().ok())
    }

    /// Failures with their zero-based positions.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &IssueError)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| item.as_ref().err().map(|e| (index, e)))
    }

    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|item| item.is_ok())
    }
}

/// Result of [`IssuanceOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Fail-fast batch in which every request succeeded.
    Complete(Vec<IssuedCertificateBundle>),
    /// Fail-fast batch stopped at a failing request.
    Aborted(BatchError),
    /// Every request attempted.
    Partial(BatchReport),
}

/// Issues client certificates for whole batches under one root credential.
pub struct IssuanceOrchestrator {
    root: RootCredential,
    key_generator: Box<dyn KeyGenerator>,
    csr_builder: CsrBuilder,
    issuer: CertificateIssuer,
    verifier: ChainVerifier,
    pem_labels: PemLabels,
    batch_policy: BatchPolicy,
    allow_expired: bool,
}

impl IssuanceOrchestrator {
    pub fn new(root: RootCredential, config: &IssuerConfig) -> Result<Self> {
        let mut verifier = ChainVerifier::new();
        if config.policy_extension.enabled {
            let oid = ObjectIdentifier::from_str(&config.policy_extension.oid).map_err(|e| {
                IssueError::Config(format!(
                    "policy extension OID {:?}: {e}",
                    config.policy_extension.oid
                ))
            })?;
            verifier = verifier.with_known_extension(oid);
        }

        Ok(Self {
            root,
            key_generator: Box::new(config.key_algorithm),
            csr_builder: CsrBuilder::new(config.leaf_common_name.clone(), config.pem_labels.csr()),
            issuer: CertificateIssuer::new(config)?,
            verifier,
            pem_labels: config.pem_labels,
            batch_policy: config.batch_policy,
            allow_expired: config.allow_expired,
        })
    }

    /// Loads the root credential from `config.mount_path` and builds the orchestrator.
    pub fn from_config(config: &IssuerConfig) -> Result<Self> {
        let root = RootCredential::load_from(config.ca_key_path(), config.ca_certificate_path())?;
        Self::new(root, config)
    }

    /// Replaces the generator used for the per-request key pairs.
    pub fn with_key_generator(mut self, key_generator: Box<dyn KeyGenerator>) -> Self {
        self.key_generator = key_generator;
        self
    }

    pub fn root(&self) -> &RootCredential {
        &self.root
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        self.batch_policy
    }

    /// Runs one request through the full pipeline.
    pub fn issue_one(&self, request: &SubjectRequest) -> Result<IssuedCertificateBundle> {
        self.issue_one_at(request, OffsetDateTime::now_utc())
    }

    fn issue_one_at(&self, request: &SubjectRequest, now: OffsetDateTime) -> Result<IssuedCertificateBundle> {
        let key_pair = self
            .key_generator
            .generate()
            .map_err(|e| IssueError::CsrGeneration(format!("key generation failed: {e}")))?;
        let csr = self.csr_builder.build(request, &key_pair)?;

        let issued = self.issuer.issue_at(&csr.der, request, &self.root, now)?;
        if issued.expired_at_issuance && !self.allow_expired {
            return Err(IssueError::ExpirationFormat(format!(
                "{:?} lies before the issuance time",
                request.expired_date
            )));
        }

        let options = VerifyOptions {
            at_time: Some(now),
            check_leaf_time: !issued.expired_at_issuance,
        };
        self.verifier
            .verify(&issued.certificate, self.root.certificate(), options)?;

        let (key_der, key_label) = key_pair
            .private_key_der()
            .map_err(|e| IssueError::CsrGeneration(format!("private key encoding failed: {e}")))?;

        info!(
            serial = %request.serial_number,
            subject = %issued.certificate.subject(),
            not_after = %issued.certificate.not_after(),
            "issued client certificate"
        );
        Ok(IssuedCertificateBundle {
            csr_pem: csr.pem,
            certificate_pem: issued.pem,
            private_key_pem: pem_utils::der_to_pem(&key_der, self.pem_labels.private_key(key_label)),
            expired_at_issuance: issued.expired_at_issuance,
        })
    }

    /// Issues every request in order, stopping at the first failure.
    ///
    /// On failure nothing is returned, not even the bundles already issued.
    pub fn issue_batch(
        &self,
        requests: &[SubjectRequest],
    ) -> std::result::Result<Vec<IssuedCertificateBundle>, BatchError> {
        info!(count = requests.len(), "issuing batch");
        let now = OffsetDateTime::now_utc();
        let mut bundles = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            match self.issue_one_at(request, now) {
                Ok(bundle) => bundles.push(bundle),
                Err(source) => {
                    error!(index, serial = %request.serial_number, "{source}");
                    return Err(BatchError { index, source });
                }
            }
        }
        info!(count = bundles.len(), "batch issued");
        Ok(bundles)
    }

    /// Issues every request in order, keeping going past failures.
    pub fn issue_report(&self, requests: &[SubjectRequest]) -> BatchReport {
        info!(count = requests.len(), "issuing batch");
        let now = OffsetDateTime::now_utc();
        let items: Vec<_> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                self.issue_one_at(request, now).inspect_err(|e| {
                    warn!(index, serial = %request.serial_number, "{e}");
                })
            })
            .collect();

        let report = BatchReport { items };
        info!(
            issued = report.bundles().count(),
            failed = report.failures().count(),
            "batch finished"
        );
        report
    }

    /// Issues a batch under the configured [`BatchPolicy`].
    pub fn run(&self, requests: &[SubjectRequest]) -> BatchOutcome {
        match self.batch_policy {
            BatchPolicy::FailFast => match self.issue_batch(requests) {
                Ok(bundles) => BatchOutcome::Complete(bundles),
                Err(err) => BatchOutcome::Aborted(err),
            },
            BatchPolicy::PartialSuccess => BatchOutcome::Partial(self.issue_report(requests)),
        }
    }
}

impl std::fmt::Debug for IssuanceOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuanceOrchestrator")
            .field("root", &self.root.certificate().subject().to_string())
            .field("pem_labels", &self.pem_labels)
            .field("batch_policy", &self.batch_policy)
            .field("allow_expired", &self.allow_expired)
            .finish_non_exhaustive()
    }
}
