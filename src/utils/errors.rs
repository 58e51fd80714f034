use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZcertError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Certificate parsing error: {0}")]
    CertParsing(String),

    #[error("Certificate generation error: {0}")]
    CertGeneration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Server responded with {status}: {body}")]
    ServerResponse { status: u16, body: String },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, ZcertError>;

/// Why a request's Content-HMAC was not accepted.
///
/// All variants produce the same external response; the distinction only
/// exists for logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFailure {
    #[error("no MAC provided in Content-HMAC header")]
    Missing,

    #[error("Content-HMAC header is not valid base64")]
    Undecodable,

    #[error("invalid MAC length {actual}, MAC must be {expected} bytes long")]
    WrongLength { expected: usize, actual: usize },

    #[error("presented MAC does not match computed MAC")]
    Mismatch,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("invalid sign-csr json")]
    MalformedBody,

    #[error("no nonce in json")]
    MissingNonce,

    #[error("nonce must be exactly {expected} characters, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("bad request_time in json")]
    MissingTimestamp,

    #[error("request too old ({age} ago)")]
    StaleRequest { age: String },

    #[error("request_time is {ahead} in the future")]
    FutureRequest { ahead: String },

    #[error("lifetime must be greater than zero")]
    InvalidLifetime,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsrFailure {
    #[error("invalid csr: {0}")]
    Malformed(String),

    #[error("csr signature invalid")]
    InvalidSignature,
}

/// Coarse classification of an [`IssuanceError`], used by the transport to
/// pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Integrity,
    Validation,
    Replay,
    Csr,
    Persistence,
    Internal,
}

/// Terminal failure of a single issuance request.
#[derive(Error, Debug)]
pub enum IssuanceError {
    #[error("integrity check failed: {0}")]
    Integrity(#[from] IntegrityFailure),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("nonce reused")]
    Replay,

    #[error("{0}")]
    Csr(#[from] CsrFailure),

    #[error("failed to persist issuance record for serial {serial}: {reason}")]
    Persistence { serial: i64, reason: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("request did not complete within {0:?}")]
    Timeout(Duration),
}

pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";
pub const UNAUTHORIZED_MESSAGE: &str = "invalid Content-HMAC";

impl IssuanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Replay => ErrorKind::Replay,
            Self::Csr(_) => ErrorKind::Csr,
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::Internal(_) | Self::Timeout(_) => ErrorKind::Internal,
        }
    }

    /// Text that is safe to send back to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Integrity(_) => UNAUTHORIZED_MESSAGE.to_string(),
            Self::Validation(reason) => reason.to_string(),
            Self::Replay => "nonce reused".to_string(),
            Self::Csr(reason) => reason.to_string(),
            Self::Persistence { .. } | Self::Internal(_) | Self::Timeout(_) => {
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        }
    }
}
