//! # certissue - Client Certificate Issuance in Pure Rust
//!
//! certissue issues X.509 client certificates under a single root CA. It is built
//! entirely with rustcrypto libraries. Each request of a batch gets a fresh key
//! pair and a PKCS#10 request. The request is signed by the root and the result
//! is checked against the root before it is returned.
//!
//! ## Supported Key Types
//!
//! - **Root CA**: RSA (2048 bits or more), PKCS#1 or PKCS#8 PEM
//! - **Leaf keys**: RSA 2048, 3072 or 4096 bits, or ECDSA P-256
//!
//! ## Pipeline
//!
//! 1. [`store::RootCredential`] loads `ca.key` and `ca.crt` from the mount directory.
//! 2. [`csr::CsrBuilder`] builds and self-signs a request with the fresh leaf key.
//! 3. [`issuer::CertificateIssuer`] verifies the request and signs the leaf.
//! 4. [`verify::ChainVerifier`] checks the leaf against the root.
//! 5. [`orchestrator::IssuanceOrchestrator`] runs a batch in input order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use certissue::{
//!     config::IssuerConfig,
//!     orchestrator::IssuanceOrchestrator,
//!     request::SubjectRequest,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IssuerConfig::builder().mount_path("/var/lib/certissue").build();
//! let orchestrator = IssuanceOrchestrator::from_config(&config)?;
//!
//! let request = SubjectRequest::builder()
//!     .serial_number("1001")
//!     .country_name("JP")
//!     .organization_name("Latona Inc")
//!     .expired_date("1893456000")
//!     .build();
//!
//! let bundles = orchestrator.issue_batch(&[request])?;
//! println!("{}", bundles[0].certificate_pem);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every stage reports through [`error::IssueError`]; a fail-fast batch wraps the
//! first failure in [`orchestrator::BatchError`] with the item's position.
//!
//! ```rust
//! use certissue::{error::IssueError, request::parse_serial_number};
//!
//! match parse_serial_number("abc") {
//!     Err(IssueError::SerialNumberFormat(msg)) => println!("bad serial: {msg}"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: Key generation and signing
//! - [`cert`]: Certificate decoding, names and extensions
//! - [`store`]: Root CA credential loading
//! - [`csr`]: PKCS#10 request building and verification
//! - [`issuer`]: Leaf certificate signing
//! - [`verify`]: Chain verification against the root
//! - [`orchestrator`]: Batch issuance
//! - [`envelope`]: JSON batch descriptor and result envelope
//! - [`config`]: TOML issuer configuration
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure

pub mod cert;
pub mod config;
pub mod csr;
pub mod envelope;
pub mod error;
pub mod issuer;
pub mod key;
pub mod orchestrator;
pub mod pem_utils;
pub mod request;
pub mod store;
pub mod tbs_certificate;
pub mod verify;
