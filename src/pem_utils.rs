use pem::{EncodeConfig, LineEnding};

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
///
/// Lines end in `\n`, so `pem_to_der` followed by `der_to_pem` with the same
/// label reproduces the input byte for byte.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

/// Convert a PEM‑encoded string to its label and DER‑encoded bytes.
pub fn pem_to_der(pem_str: &str) -> Result<(String, Vec<u8>), pem::PemError> {
    let pem = pem::parse(pem_str)?;
    Ok((pem.tag().to_string(), pem.contents().to_vec()))
}
