use crate::cert::csr::CertificateRequest;
use crate::cert::metadata::SignedCertificateRecord;
use crate::cert::params::IssuanceParams;
use crate::cert::parser::CertificateParser;
use crate::cert::serial::SerialAllocator;
use crate::storage::RecordStore;
use crate::utils::errors::{CsrFailure, IssuanceError, Result, ValidationFailure, ZcertError};
use crate::utils::paths::ZcertPaths;
use crate::utils::pem::{decode_pem, encode_pem, CERTIFICATE_TAG};
use chrono::{DateTime, Datelike, SubsecRound, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, DnValue, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

pub const CA_CERT_FILE: &str = "ca.crt";
pub const CA_KEY_FILE: &str = "ca.key";

/// Default validity of a freshly initialised authority
pub const DEFAULT_CA_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Serial number of the authority's own certificate
pub const CA_SERIAL: i64 = 1;

/// Last year a GeneralizedTime validity bound can express
const MAX_CERTIFICATE_YEAR: i32 = 9999;

/// The authority's signing credential. Loaded once, never mutated.
pub struct AuthorityIdentity {
    cert_pem: String,
    cert_der: Vec<u8>,
    subject: String,
    key_pair: KeyPair,
}

impl AuthorityIdentity {
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let cert_der = decode_pem(cert_pem, CERTIFICATE_TAG)?;
        let subject = CertificateParser::subject_of(&cert_der)?;
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| ZcertError::CertParsing(format!("Failed to parse CA key: {e}")))?;

        if CertificateParser::public_key_of(&cert_der)? != key_pair.public_key_raw() {
            return Err(ZcertError::Config(format!(
                "CA key does not match the public key of {subject}"
            )));
        }

        Ok(Self {
            cert_pem: encode_pem(CERTIFICATE_TAG, &cert_der),
            cert_der,
            subject,
            key_pair,
        })
    }

    /// Load `ca.crt` and `ca.key` from the authority directory
    pub fn load(dir: &Path) -> Result<Self> {
        let (cert_path, key_path) = authority_files(dir);
        let cert_pem = fs::read_to_string(&cert_path).map_err(|e| {
            ZcertError::Config(format!(
                "cannot read CA certificate {}: {e} (did you run `zcert init`?)",
                cert_path.display()
            ))
        })?;
        let key_pem = fs::read_to_string(&key_path).map_err(|e| {
            ZcertError::Config(format!("cannot read CA key {}: {e}", key_path.display()))
        })?;

        let identity = Self::from_pem(&cert_pem, &key_pem)?;
        tracing::info!("loaded certificate authority {}", identity.subject);
        Ok(identity)
    }

    pub fn certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.cert_der
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }
}

/// Paths of the certificate and key inside an authority directory
pub fn authority_files(dir: &Path) -> (PathBuf, PathBuf) {
    (dir.join(CA_CERT_FILE), dir.join(CA_KEY_FILE))
}

pub struct AuthorityOptions<'a> {
    pub dir: &'a Path,
    pub common_name: &'a str,
    pub lifetime: Duration,
    pub force: bool,
}

/// Create a new self-signed Ed25519 authority in `options.dir`.
///
/// The authority certificate is recorded in `records` so leaf serials never
/// collide with it. The first authority takes serial 1; a forced replacement
/// takes the next free serial.
pub fn initialize_authority(
    options: &AuthorityOptions<'_>,
    records: &dyn RecordStore,
) -> Result<AuthorityIdentity> {
    if options.common_name.trim().is_empty() {
        return Err(ZcertError::Config(
            "ca.name is empty! make sure you configure that".to_string(),
        ));
    }

    ZcertPaths::ensure_dir_exists(options.dir)?;
    let (cert_path, key_path) = authority_files(options.dir);
    tracing::debug!(
        "creating a certificate authority in {} (force: {})",
        options.dir.display(),
        options.force
    );
    for path in [&key_path, &cert_path] {
        ZcertPaths::clear_existing(path, options.force)?;
    }

    // a replacement authority gets a fresh serial so the audit trail keeps both
    let serial = match records.highest_serial()? {
        Some(highest) => highest + 1,
        None => CA_SERIAL,
    };

    let not_before = Utc::now().trunc_subsecs(0);
    let not_after = add_lifetime(not_before, options.lifetime).ok_or_else(|| {
        ZcertError::InvalidInput(format!(
            "CA lifetime {} is out of range",
            humantime::format_duration(options.lifetime)
        ))
    })?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| ZcertError::CertGeneration(format!("Failed to create CA params: {e}")))?;
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(options.common_name.to_string()),
    );
    params.distinguished_name = dn;
    params.serial_number = Some(rcgen::SerialNumber::from(serial as u64));
    params.not_before = to_offset(not_before)?;
    params.not_after = to_offset(not_after)?;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];

    let key_pair = KeyPair::generate_for(&rcgen::PKCS_ED25519)
        .map_err(|e| ZcertError::CertGeneration(format!("Failed to generate CA key: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| ZcertError::CertGeneration(format!("Failed to create CA cert: {e}")))?;

    let cert_pem = encode_pem(CERTIFICATE_TAG, cert.der());
    ZcertPaths::write_new_file(&key_path, key_pair.serialize_pem().as_bytes(), 0o600)?;
    ZcertPaths::write_new_file(&cert_path, cert_pem.as_bytes(), 0o644)?;

    let identity = AuthorityIdentity {
        cert_der: cert.der().to_vec(),
        subject: CertificateParser::subject_of(cert.der())?,
        cert_pem,
        key_pair,
    };

    records.append(&SignedCertificateRecord {
        serial,
        not_before,
        not_after,
        issuer: identity.subject.clone(),
        subject: identity.subject.clone(),
    })?;

    tracing::info!(
        "created certificate authority {} (serial {serial}) valid until {}",
        identity.subject,
        not_after
    );
    Ok(identity)
}

/// A signed certificate together with the record that commits it
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub pem: String,
    pub record: SignedCertificateRecord,
}

/// Signs verified requests and records every issuance.
pub struct CertificateAuthority {
    identity: AuthorityIdentity,
    serials: SerialAllocator,
    records: Arc<dyn RecordStore>,
}

impl CertificateAuthority {
    /// Derive the serial counter from what `records` already holds
    pub fn new(identity: AuthorityIdentity, records: Arc<dyn RecordStore>) -> Result<Self> {
        let highest = records.highest_serial()?;
        Ok(Self {
            identity,
            serials: SerialAllocator::starting_after(highest),
            records,
        })
    }

    pub fn identity(&self) -> &AuthorityIdentity {
        &self.identity
    }

    pub fn serials(&self) -> &SerialAllocator {
        &self.serials
    }

    /// Sign `csr` and persist its record. The certificate is only returned once
    /// the record is durable; a serial whose record fails to persist is burned.
    pub async fn sign(
        &self,
        csr: &CertificateRequest,
        params: &IssuanceParams,
    ) -> std::result::Result<IssuedCertificate, IssuanceError> {
        let not_before = Utc::now().trunc_subsecs(0);
        let not_after =
            add_lifetime(not_before, params.lifetime).ok_or(ValidationFailure::InvalidLifetime)?;

        let serial = self.serials.next();
        let pem = self.build_certificate(csr, params, serial, not_before, not_after)?;

        let record = SignedCertificateRecord {
            serial,
            not_before,
            not_after,
            issuer: self.identity.subject.clone(),
            subject: csr.subject().to_string(),
        };

        let records = Arc::clone(&self.records);
        let pending = record.clone();
        let persisted = tokio::task::spawn_blocking(move || records.append(&pending))
            .await
            .map_err(|e| IssuanceError::Internal(format!("record writer panicked: {e}")))?;

        if let Err(e) = persisted {
            tracing::error!("failed to persist record for serial {serial}: {e}");
            return Err(IssuanceError::Persistence {
                serial,
                reason: e.to_string(),
            });
        }

        tracing::info!(
            "issued certificate serial {} for {} (expires {})",
            serial,
            record.subject,
            not_after
        );
        Ok(IssuedCertificate { pem, record })
    }

    fn build_certificate(
        &self,
        csr: &CertificateRequest,
        params: &IssuanceParams,
        serial: i64,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> std::result::Result<String, IssuanceError> {
        let mut extended_key_usages = Vec::new();
        if params.client_auth {
            extended_key_usages.push(ExtendedKeyUsagePurpose::ClientAuth);
        }
        if params.server_auth {
            extended_key_usages.push(ExtendedKeyUsagePurpose::ServerAuth);
        }

        let mut csr_params = CertificateSigningRequestParams::from_pem(&csr.to_pem())
            .map_err(|e| CsrFailure::Malformed(format!("unsupported request: {e}")))?;

        csr_params.params.serial_number = Some(rcgen::SerialNumber::from(serial as u64));
        csr_params.params.not_before = to_offset(not_before).map_err(internal)?;
        csr_params.params.not_after = to_offset(not_after).map_err(internal)?;
        csr_params.params.is_ca = IsCa::NoCa;
        csr_params.params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        csr_params.params.extended_key_usages = extended_key_usages;
        csr_params.params.use_authority_key_identifier_extension = true;

        let issuer = Issuer::from_ca_cert_pem(&self.identity.cert_pem, &self.identity.key_pair)
            .map_err(|e| IssuanceError::Internal(format!("failed to load issuer: {e}")))?;
        let cert = csr_params
            .signed_by(&issuer)
            .map_err(|e| IssuanceError::Internal(format!("failed to sign certificate: {e}")))?;

        Ok(encode_pem(CERTIFICATE_TAG, cert.der()))
    }
}

/// `start + lifetime`, or `None` when the result cannot be encoded in a certificate
fn add_lifetime(start: DateTime<Utc>, lifetime: Duration) -> Option<DateTime<Utc>> {
    let span = chrono::Duration::from_std(lifetime).ok()?;
    start
        .checked_add_signed(span)
        .filter(|end| end.year() <= MAX_CERTIFICATE_YEAR)
}

fn to_offset(when: DateTime<Utc>) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(when.timestamp())
        .map_err(|e| ZcertError::CertGeneration(format!("timestamp out of range: {e}")))
}

fn internal(e: ZcertError) -> IssuanceError {
    IssuanceError::Internal(e.to_string())
}
