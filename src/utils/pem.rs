use crate::utils::errors::{Result, ZcertError};
use pem::{EncodeConfig, LineEnding, Pem};

pub const CERTIFICATE_TAG: &str = "CERTIFICATE";
pub const CSR_TAG: &str = "CERTIFICATE REQUEST";

/// Encode DER bytes as a PEM block with `\n` line endings
pub fn encode_pem(tag: &str, der: &[u8]) -> String {
    let block = Pem::new(tag, der.to_vec());
    pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

/// Decode the first PEM block in `data`, which must carry `tag`
pub fn decode_pem(data: &str, tag: &str) -> Result<Vec<u8>> {
    let block = pem::parse(data.as_bytes())
        .map_err(|e| ZcertError::CertParsing(format!("PEM decode error: {e}")))?;

    if block.tag() != tag {
        return Err(ZcertError::CertParsing(format!(
            "expected a {tag} PEM block, found {}",
            block.tag()
        )));
    }

    Ok(block.into_contents())
}
