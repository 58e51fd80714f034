use crate::cert::SerialNumber;
use crate::utils::errors::{Result, ZcertError};
use crate::utils::pem::{decode_pem, CERTIFICATE_TAG};
use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

/// What the CLI and tests need to know about an issued certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub serial: SerialNumber,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub sans: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub is_ca: bool,
}

pub struct CertificateParser;

impl CertificateParser {
    /// Parse a PEM certificate
    pub fn parse_pem(pem_data: &str) -> Result<CertificateSummary> {
        let der = decode_pem(pem_data, CERTIFICATE_TAG)?;
        Self::parse_der(&der)
    }

    pub fn parse_der(der: &[u8]) -> Result<CertificateSummary> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ZcertError::CertParsing(format!("DER parsing error: {e}")))?;

        Self::extract_summary(&cert)
    }

    /// Subject of a DER certificate, RFC 4514 style
    pub fn subject_of(der: &[u8]) -> Result<String> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ZcertError::CertParsing(format!("DER parsing error: {e}")))?;
        Ok(cert.subject().to_string())
    }

    /// Raw subject public key bytes of a DER certificate
    pub fn public_key_of(der: &[u8]) -> Result<Vec<u8>> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ZcertError::CertParsing(format!("DER parsing error: {e}")))?;
        Ok(cert.public_key().subject_public_key.data.to_vec())
    }

    fn extract_summary(cert: &X509Certificate) -> Result<CertificateSummary> {
        let serial = SerialNumber::from_be_bytes(&cert.serial.to_bytes_be());

        let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| ZcertError::CertParsing("notBefore out of range".to_string()))?;
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| ZcertError::CertParsing("notAfter out of range".to_string()))?;

        let mut sans = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => sans.push(dns.to_string()),
                    GeneralName::IPAddress(ip) => sans.push(format_ip(ip)),
                    GeneralName::URI(uri) => sans.push(uri.to_string()),
                    _ => {}
                }
            }
        }

        let mut extended_key_usage = Vec::new();
        if let Ok(Some(eku)) = cert.extended_key_usage() {
            if eku.value.client_auth {
                extended_key_usage.push("ClientAuth".to_string());
            }
            if eku.value.server_auth {
                extended_key_usage.push("ServerAuth".to_string());
            }
            extended_key_usage.extend(eku.value.other.iter().map(|oid| oid.to_id_string()));
        }

        let is_ca = matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca);

        Ok(CertificateSummary {
            serial,
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before,
            not_after,
            sans,
            extended_key_usage,
            is_ca,
        })
    }
}

fn format_ip(ip: &[u8]) -> String {
    match ip.len() {
        4 => format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(ip);
            std::net::Ipv6Addr::from(octets).to_string()
        }
        _ => hex::encode(ip),
    }
}
