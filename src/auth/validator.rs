use crate::auth::nonce::{span, NonceStore};
use crate::utils::errors::{IssuanceError, ValidationFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Required nonce length, in characters
pub const NONCE_LENGTH: usize = 32;

/// Maximum age of a request's declared `request_time`
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// How far ahead of the authority's clock a `request_time` may be
pub const FUTURE_TOLERANCE: Duration = Duration::from_secs(60);

/// Go's zero `time.Time`, which older clients send for an unset timestamp
const ZERO_INSTANT_UNIX: i64 = -62_135_596_800;

/// Replay-defense fields carried by every authenticated request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityBlock {
    #[serde(default)]
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_time: Option<DateTime<Utc>>,
}

impl SecurityBlock {
    pub fn new(nonce: impl Into<String>, request_time: DateTime<Utc>) -> Self {
        Self {
            nonce: nonce.into(),
            request_time: Some(request_time),
        }
    }

    /// The declared request time, or `None` if unset or the zero instant
    pub fn declared_time(&self) -> Option<DateTime<Utc>> {
        self.request_time
            .filter(|t| t.timestamp() != ZERO_INSTANT_UNIX)
    }
}

/// Enforces freshness and single use of request nonces before any expensive work.
#[derive(Default)]
pub struct RequestValidator {
    nonces: NonceStore,
}

impl RequestValidator {
    pub fn new(nonces: NonceStore) -> Self {
        Self { nonces }
    }

    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    pub fn validate(&self, block: &SecurityBlock) -> Result<(), IssuanceError> {
        self.validate_at(block, Utc::now())
    }

    pub(crate) fn validate_at(
        &self,
        block: &SecurityBlock,
        now: DateTime<Utc>,
    ) -> Result<(), IssuanceError> {
        Self::check_fields(block, now)?;

        if self.nonces.cullable_at(now) {
            let culled = self.nonces.cull_at(now);
            tracing::debug!(culled, remaining = self.nonces.len(), "culled nonce cache");
        }

        if !self.nonces.check_and_record_at(&block.nonce, now) {
            tracing::info!(nonce = %block.nonce, "rejected reused nonce");
            return Err(IssuanceError::Replay);
        }

        Ok(())
    }

    /// Stateless checks, in the order the failures are reported
    fn check_fields(block: &SecurityBlock, now: DateTime<Utc>) -> Result<(), ValidationFailure> {
        if block.nonce.is_empty() {
            return Err(ValidationFailure::MissingNonce);
        }

        let length = block.nonce.chars().count();
        if length != NONCE_LENGTH {
            return Err(ValidationFailure::InvalidNonceLength {
                expected: NONCE_LENGTH,
                actual: length,
            });
        }

        let request_time = block
            .declared_time()
            .ok_or(ValidationFailure::MissingTimestamp)?;

        let age = now - request_time;
        if age > span(FRESHNESS_WINDOW) {
            return Err(ValidationFailure::StaleRequest {
                age: format_span(age),
            });
        }
        if -age > span(FUTURE_TOLERANCE) {
            return Err(ValidationFailure::FutureRequest {
                ahead: format_span(-age),
            });
        }

        Ok(())
    }
}

fn format_span(span: chrono::Duration) -> String {
    let secs = span.num_seconds().max(0) as u64;
    humantime::format_duration(Duration::from_secs(secs)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as Span;

    const NONCE: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn test_valid_block_is_accepted_and_recorded() {
        let validator = RequestValidator::default();
        let block = SecurityBlock::new(NONCE, Utc::now());

        assert!(validator.validate(&block).is_ok());
        assert!(validator.nonces().seen(NONCE));
    }

    #[test]
    fn test_missing_nonce() {
        let validator = RequestValidator::default();
        let block = SecurityBlock::new("", Utc::now());
        assert!(matches!(
            validator.validate(&block),
            Err(IssuanceError::Validation(ValidationFailure::MissingNonce))
        ));
    }

    #[test]
    fn test_nonce_length_must_be_exact() {
        let validator = RequestValidator::default();
        for nonce in ["short".to_string(), "b".repeat(31), "c".repeat(33)] {
            let block = SecurityBlock::new(nonce, Utc::now());
            assert!(matches!(
                validator.validate(&block),
                Err(IssuanceError::Validation(
                    ValidationFailure::InvalidNonceLength { expected: 32, .. }
                ))
            ));
        }
        assert!(validator.nonces().is_empty());
    }

    #[test]
    fn test_missing_or_zero_timestamp() {
        let validator = RequestValidator::default();
        let unset = SecurityBlock {
            nonce: NONCE.to_string(),
            request_time: None,
        };
        assert!(matches!(
            validator.validate(&unset),
            Err(IssuanceError::Validation(ValidationFailure::MissingTimestamp))
        ));

        let zero: SecurityBlock = serde_json::from_str(&format!(
            r#"{{"nonce":"{NONCE}","request_time":"0001-01-01T00:00:00Z"}}"#
        ))
        .unwrap();
        assert!(matches!(
            validator.validate(&zero),
            Err(IssuanceError::Validation(ValidationFailure::MissingTimestamp))
        ));
    }

    #[test]
    fn test_stale_request_rejected_and_not_recorded() {
        let validator = RequestValidator::default();
        let now = Utc::now();
        let block = SecurityBlock::new(NONCE, now - Span::minutes(10));

        let err = validator.validate_at(&block, now).unwrap_err();
        assert!(matches!(
            err,
            IssuanceError::Validation(ValidationFailure::StaleRequest { .. })
        ));
        assert_eq!(err.public_message(), "request too old (10m ago)");
        assert!(!validator.nonces().seen(NONCE));
    }

    #[test]
    fn test_freshness_boundary() {
        let validator = RequestValidator::default();
        let now = Utc::now();

        let at_limit = SecurityBlock::new(NONCE, now - Span::minutes(5));
        assert!(validator.validate_at(&at_limit, now).is_ok());

        let past_limit = SecurityBlock::new("d".repeat(32), now - Span::minutes(5) - Span::seconds(1));
        assert!(validator.validate_at(&past_limit, now).is_err());
    }

    #[test]
    fn test_future_dated_request() {
        let validator = RequestValidator::default();
        let now = Utc::now();

        let slight_skew = SecurityBlock::new(NONCE, now + Span::seconds(30));
        assert!(validator.validate_at(&slight_skew, now).is_ok());

        let far_future = SecurityBlock::new("e".repeat(32), now + Span::hours(2));
        assert!(matches!(
            validator.validate_at(&far_future, now),
            Err(IssuanceError::Validation(ValidationFailure::FutureRequest { .. }))
        ));
    }

    #[test]
    fn test_reused_nonce_is_replay() {
        let validator = RequestValidator::default();
        let block = SecurityBlock::new(NONCE, Utc::now());

        assert!(validator.validate(&block).is_ok());
        assert!(matches!(
            validator.validate(&block),
            Err(IssuanceError::Replay)
        ));
    }

    #[test]
    fn test_validation_culls_expired_nonces() {
        let validator = RequestValidator::default();
        let now = Utc::now();
        validator
            .nonces()
            .record_at("f".repeat(32).as_str(), now - Span::hours(2));

        let block = SecurityBlock::new(NONCE, now);
        assert!(validator.validate_at(&block, now).is_ok());
        assert!(!validator.nonces().seen(&"f".repeat(32)));
        assert_eq!(validator.nonces().len(), 1);
    }
}
