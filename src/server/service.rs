use crate::auth::{RequestValidator, SecurityBlock, NONCE_LENGTH};
use crate::cert::{CertificateAuthority, CsrValidator, IssuanceParams};
use crate::crypto::keys::random_alphanumeric;
use crate::crypto::{AuthKey, IntegrityGuard};
use crate::utils::errors::{IssuanceError, ValidationFailure};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default deadline for a single `/sign` request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of `POST /sign`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningRequest {
    /// Base64 DER certificate request
    pub csr: String,
    pub params: IssuanceParams,
    #[serde(flatten)]
    pub security: SecurityBlock,
}

impl SigningRequest {
    /// Build a request for `csr_der` carrying a fresh nonce and the current time
    pub fn new(csr_der: &[u8], params: IssuanceParams) -> Self {
        Self {
            csr: general_purpose::STANDARD.encode(csr_der),
            params,
            security: SecurityBlock::new(random_alphanumeric(NONCE_LENGTH), Utc::now()),
        }
    }
}

/// Response body and the `Content-HMAC` value that covers it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacedResponse {
    pub body: String,
    pub mac: String,
}

/// End-to-end issuance: MAC check, replay defense, CSR verification, signing,
/// and persistence, under one deadline.
pub struct SigningService {
    secret: AuthKey,
    validator: RequestValidator,
    authority: CertificateAuthority,
    request_timeout: Duration,
}

impl SigningService {
    pub fn new(secret: AuthKey, authority: CertificateAuthority, request_timeout: Duration) -> Self {
        Self {
            secret,
            validator: RequestValidator::default(),
            authority,
            request_timeout,
        }
    }

    pub fn authority(&self) -> &CertificateAuthority {
        &self.authority
    }

    pub fn validator(&self) -> &RequestValidator {
        &self.validator
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// The authority certificate, MACed like every other response
    pub fn ca_certificate(&self) -> MacedResponse {
        self.respond(self.authority.identity().certificate_pem().to_string())
    }

    /// Handle one `/sign` request body and its `Content-HMAC` header value.
    ///
    /// A request that exceeds the deadline fails with [`IssuanceError::Timeout`];
    /// its nonce stays consumed.
    pub async fn sign(
        &self,
        body: &[u8],
        mac_header: Option<&str>,
    ) -> Result<MacedResponse, IssuanceError> {
        match tokio::time::timeout(self.request_timeout, self.issue(body, mac_header)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "sign request did not finish within {}",
                    humantime::format_duration(self.request_timeout)
                );
                Err(IssuanceError::Timeout(self.request_timeout))
            }
        }
    }

    async fn issue(
        &self,
        body: &[u8],
        mac_header: Option<&str>,
    ) -> Result<MacedResponse, IssuanceError> {
        if let Err(e) = IntegrityGuard::verify_header(&self.secret, body, mac_header) {
            tracing::debug!("rejected request: {e}");
            return Err(e.into());
        }

        let request: SigningRequest = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!("invalid sign-csr json: {e}");
            ValidationFailure::MalformedBody
        })?;

        self.validator.validate(&request.security)?;
        request.params.validate()?;

        let csr = CsrValidator::parse(&request.csr)?;
        CsrValidator::validate_signature(&csr)?;
        tracing::debug!(
            "verified csr for {} (nonce {})",
            csr.subject(),
            request.security.nonce
        );

        let issued = self.authority.sign(&csr, &request.params).await?;
        Ok(self.respond(issued.pem))
    }

    fn respond(&self, body: String) -> MacedResponse {
        let mac = IntegrityGuard::encode_header(&self.secret, body.as_bytes());
        MacedResponse { body, mac }
    }
}
