use crate::crypto::keys::AuthKey;
use crate::utils::errors::IntegrityFailure;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// HTTP header carrying the base64 MAC of the message body
pub const MAC_HEADER: &str = "Content-HMAC";

/// Length in bytes of every MAC produced or accepted
pub const MAC_LENGTH: usize = 32;

pub type Tag = [u8; MAC_LENGTH];

type HmacSha256 = Hmac<Sha256>;

/// Computes and checks keyed MACs over raw message bodies.
pub struct IntegrityGuard;

impl IntegrityGuard {
    /// HMAC-SHA256 of `body` under `secret`
    pub fn compute_mac(secret: &AuthKey, body: &[u8]) -> Tag {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(body);
        mac.finalize().into_bytes().into()
    }

    /// Recompute the MAC of `body` and compare it to `presented` in constant time.
    pub fn verify_mac(
        secret: &AuthKey,
        body: &[u8],
        presented: &[u8],
    ) -> std::result::Result<(), IntegrityFailure> {
        if presented.len() != MAC_LENGTH {
            return Err(IntegrityFailure::WrongLength {
                expected: MAC_LENGTH,
                actual: presented.len(),
            });
        }

        let computed = Self::compute_mac(secret, body);
        if computed[..].ct_eq(presented).unwrap_u8() != 1 {
            tracing::debug!(
                computed = %hex::encode(computed),
                presented = %hex::encode(presented),
                "mac mismatch"
            );
            return Err(IntegrityFailure::Mismatch);
        }

        Ok(())
    }

    /// Decode the value of a `Content-HMAC` header into raw tag bytes.
    pub fn decode_header(value: Option<&str>) -> std::result::Result<Vec<u8>, IntegrityFailure> {
        let encoded = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => return Err(IntegrityFailure::Missing),
        };

        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| IntegrityFailure::Undecodable)?;

        if decoded.len() != MAC_LENGTH {
            tracing::trace!(
                expected = MAC_LENGTH,
                actual = decoded.len(),
                "Content-HMAC has invalid length"
            );
            return Err(IntegrityFailure::WrongLength {
                expected: MAC_LENGTH,
                actual: decoded.len(),
            });
        }

        Ok(decoded)
    }

    /// Header value for a body: base64 of its MAC
    pub fn encode_header(secret: &AuthKey, body: &[u8]) -> String {
        general_purpose::STANDARD.encode(Self::compute_mac(secret, body))
    }

    /// Check a `Content-HMAC` header value against `body`.
    pub fn verify_header(
        secret: &AuthKey,
        body: &[u8],
        header: Option<&str>,
    ) -> std::result::Result<(), IntegrityFailure> {
        let presented = Self::decode_header(header)?;
        Self::verify_mac(secret, body, &presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AuthKey {
        AuthKey::new("0123456789abcdefghijABCDEFGHIJkl").unwrap()
    }

    #[test]
    fn test_mac_is_deterministic() {
        let body = br#"{"csr":"AAAA"}"#;
        assert_eq!(
            IntegrityGuard::compute_mac(&key(), body),
            IntegrityGuard::compute_mac(&key(), body)
        );
    }

    #[test]
    fn test_mac_depends_on_secret() {
        let other = AuthKey::new("a-different-secret").unwrap();
        assert_ne!(
            IntegrityGuard::compute_mac(&key(), b"body"),
            IntegrityGuard::compute_mac(&other, b"body")
        );
    }

    #[test]
    fn test_verify_accepts_own_mac() {
        let bodies: [&[u8]; 3] = [b"", b"x", br#"{"nonce":"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"}"#];
        for body in bodies {
            let tag = IntegrityGuard::compute_mac(&key(), body);
            assert!(IntegrityGuard::verify_mac(&key(), body, &tag).is_ok());
        }
    }

    #[test]
    fn test_verify_rejects_any_flipped_byte() {
        let body = b"certificate request body".to_vec();
        let tag = IntegrityGuard::compute_mac(&key(), &body);

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                IntegrityGuard::verify_mac(&key(), &tampered, &tag),
                Err(IntegrityFailure::Mismatch)
            );
        }
    }

    #[test]
    fn test_wrong_length_is_distinct_from_mismatch() {
        let result = IntegrityGuard::verify_mac(&key(), b"body", &[0u8; 16]);
        assert_eq!(
            result,
            Err(IntegrityFailure::WrongLength {
                expected: 32,
                actual: 16
            })
        );
    }

    #[test]
    fn test_decode_header() {
        assert_eq!(
            IntegrityGuard::decode_header(None),
            Err(IntegrityFailure::Missing)
        );
        assert_eq!(
            IntegrityGuard::decode_header(Some("  ")),
            Err(IntegrityFailure::Missing)
        );
        assert_eq!(
            IntegrityGuard::decode_header(Some("not base64!!")),
            Err(IntegrityFailure::Undecodable)
        );
        assert!(matches!(
            IntegrityGuard::decode_header(Some("AAAA")),
            Err(IntegrityFailure::WrongLength { actual: 3, .. })
        ));

        let header = IntegrityGuard::encode_header(&key(), b"body");
        assert_eq!(
            IntegrityGuard::decode_header(Some(&header)).unwrap(),
            IntegrityGuard::compute_mac(&key(), b"body").to_vec()
        );
    }

    #[test]
    fn test_verify_header_round_trip() {
        let header = IntegrityGuard::encode_header(&key(), b"payload");
        assert!(IntegrityGuard::verify_header(&key(), b"payload", Some(&header)).is_ok());
        assert_eq!(
            IntegrityGuard::verify_header(&key(), b"payloaD", Some(&header)),
            Err(IntegrityFailure::Mismatch)
        );
    }
}
