mod util;

use std::process::Command;

use certissue::cert::CERTIFICATE_LABEL;
use certissue::config::IssuerConfig;
use certissue::orchestrator::IssuanceOrchestrator;
use certissue::request::IssuedCertificateBundle;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509, X509Req, X509StoreContext};
use regex::Regex;

fn issue(serial: &str) -> IssuedCertificateBundle {
    let orchestrator = IssuanceOrchestrator::new(util::root_credential(), &IssuerConfig::default())
        .unwrap();
    let mut request = util::request(serial, &util::future_expiry());
    request.subject_alt_name = "client.example.com".to_string();
    orchestrator.issue_one(&request).unwrap()
}

fn root_x509() -> X509 {
    let pem = util::root_credential()
        .certificate()
        .to_pem(CERTIFICATE_LABEL)
        .unwrap();
    X509::from_pem(pem.as_bytes()).expect("Failed to parse root PEM")
}

#[test]
fn test_openssl_cli_prints_client_certificate() {
    let bundle = issue("4096");
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("client.pem");
    std::fs::write(&cert_path, &bundle.certificate_pem).unwrap();

    let output = Command::new("openssl")
        .arg("x509")
        .arg("-in")
        .arg(&cert_path)
        .arg("-noout")
        .arg("-text")
        .output()
        .expect("Failed to execute OpenSSL command");

    assert!(
        output.status.success(),
        "OpenSSL command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let output_text = String::from_utf8_lossy(&output.stdout);

    assert!(output_text.contains("Version: 3 (0x2)"), "Version field is incorrect");
    assert!(
        output_text.contains("Serial Number: 4096 (0x1000)"),
        "Serial Number field is incorrect"
    );
    assert!(
        output_text.contains("Signature Algorithm: sha256WithRSAEncryption"),
        "Signature Algorithm field is incorrect"
    );

    let issuer_regex = Regex::new(r"Issuer: C ?= ?JP, .*CN ?= ?localhost Root CA").unwrap();
    let subject_regex = Regex::new(r"Subject: C ?= ?JP, .*O ?= ?Latona Inc, .*CN ?= ?localhost").unwrap();
    assert!(issuer_regex.is_match(&output_text), "Issuer field is incorrect");
    assert!(subject_regex.is_match(&output_text), "Subject field is incorrect");

    assert!(output_text.contains("TLS Web Client Authentication"));
    assert!(output_text.contains("Any Extended Key Usage"));
    assert!(output_text.contains("DNS:client.example.com"));
    assert!(
        Regex::new(r"X509v3 Basic Constraints: critical\s+CA:FALSE")
            .unwrap()
            .is_match(&output_text),
        "Basic Constraints field is incorrect"
    );
}

#[test]
fn test_openssl_crate_verifies_chain() {
    let bundle = issue("7");
    let root = root_x509();
    let leaf = X509::from_pem(bundle.certificate_pem.as_bytes()).expect("Failed to parse PEM");

    assert!(leaf.verify(&root.public_key().unwrap()).unwrap());

    let mut builder = X509StoreBuilder::new().unwrap();
    builder.add_cert(root).unwrap();
    let store = builder.build();

    let chain = Stack::new().unwrap();
    let mut context = X509StoreContext::new().unwrap();
    let verified = context
        .init(&store, &leaf, &chain, |c| {
            let ok = c.verify_cert()?;
            if !ok {
                eprintln!("verification error: {}", c.error());
            }
            Ok(ok)
        })
        .unwrap();
    assert!(verified, "leaf does not chain to the root");

    let issuer = leaf
        .issuer_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .unwrap()
        .data()
        .as_utf8()
        .unwrap();
    assert_eq!(issuer.to_string(), "localhost Root CA", "Issuer CN mismatch");

    let serial = leaf.serial_number().to_bn().unwrap().to_dec_str().unwrap();
    assert_eq!(serial.to_string(), "7");
    assert_eq!(leaf.version(), 2, "X509 version should be 3 (0-based index)");
}

#[test]
fn test_openssl_crate_reads_csr_and_key() {
    let bundle = issue("8");

    let csr = X509Req::from_pem(bundle.csr_pem.as_bytes()).expect("Failed to parse CSR");
    assert!(csr.verify(&csr.public_key().unwrap()).unwrap());

    let key = PKey::private_key_from_pem(bundle.private_key_pem.as_bytes())
        .expect("Failed to parse private key");
    let leaf = X509::from_pem(bundle.certificate_pem.as_bytes()).unwrap();
    assert!(leaf.public_key().unwrap().public_eq(&key));
    assert!(csr.public_key().unwrap().public_eq(&key));
    assert_eq!(key.bits(), 2048);
}
