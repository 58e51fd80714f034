use crate::utils::errors::CsrFailure;
use crate::utils::pem::{encode_pem, CSR_TAG};
use base64::{engine::general_purpose, Engine as _};
use x509_parser::prelude::*;

/// A structurally valid certificate request whose signature has not yet been checked.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    der: Vec<u8>,
    subject: String,
}

impl CertificateRequest {
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject distinguished name, RFC 4514 style
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// PEM encoding of the request
    pub fn to_pem(&self) -> String {
        encode_pem(CSR_TAG, &self.der)
    }
}

/// Decodes certificate requests and checks proof of key possession.
pub struct CsrValidator;

impl CsrValidator {
    /// Decode base64 DER and parse it as a PKCS#10 certification request
    pub fn parse(encoded: &str) -> Result<CertificateRequest, CsrFailure> {
        let der = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CsrFailure::Malformed(format!("base64 decode error: {e}")))?;

        Self::parse_der(der)
    }

    pub fn parse_der(der: Vec<u8>) -> Result<CertificateRequest, CsrFailure> {
        let subject = {
            let (rest, csr) = X509CertificationRequest::from_der(&der)
                .map_err(|e| CsrFailure::Malformed(format!("DER parsing error: {e}")))?;
            if !rest.is_empty() {
                return Err(CsrFailure::Malformed(format!(
                    "{} trailing bytes after request",
                    rest.len()
                )));
            }
            csr.certification_request_info.subject.to_string()
        };

        Ok(CertificateRequest { der, subject })
    }

    /// Verify the request's self-signature against its own public key
    pub fn validate_signature(request: &CertificateRequest) -> Result<(), CsrFailure> {
        let (_, csr) = X509CertificationRequest::from_der(&request.der)
            .map_err(|e| CsrFailure::Malformed(format!("DER parsing error: {e}")))?;

        csr.verify_signature().map_err(|e| {
            tracing::debug!("csr signature check failed for {}: {e}", request.subject);
            CsrFailure::InvalidSignature
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};

    /// DER of a freshly generated CSR for `common_name`
    pub(crate) fn generate_csr_der(common_name: &str) -> Vec<u8> {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![format!("{common_name}.example")]).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;
        params.serialize_request(&key_pair).unwrap().der().to_vec()
    }

    /// Same CSR with the last signature byte flipped
    pub(crate) fn tamper_signature(mut der: Vec<u8>) -> Vec<u8> {
        if let Some(last) = der.last_mut() {
            *last ^= 0x01;
        }
        der
    }

    #[test]
    fn test_parse_valid_csr() {
        let encoded = general_purpose::STANDARD.encode(generate_csr_der("client-1"));
        let request = CsrValidator::parse(&encoded).unwrap();
        assert_eq!(request.subject(), "CN=client-1");
        assert!(CsrValidator::validate_signature(&request).is_ok());
        assert!(request.to_pem().starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            CsrValidator::parse("!!not base64!!"),
            Err(CsrFailure::Malformed(_))
        ));

        let encoded = general_purpose::STANDARD.encode(b"definitely not DER");
        assert!(matches!(
            CsrValidator::parse(&encoded),
            Err(CsrFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let der = tamper_signature(generate_csr_der("client-2"));
        let request = CsrValidator::parse_der(der).unwrap();
        assert_eq!(
            CsrValidator::validate_signature(&request),
            Err(CsrFailure::InvalidSignature)
        );
    }
}
