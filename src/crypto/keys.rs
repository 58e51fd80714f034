use crate::utils::errors::{Result, ZcertError};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::fmt;

/// Length of keys produced by `zcert authkey generate`
pub const GENERATED_KEY_LENGTH: usize = 32;

/// Shared secret used by both client and server to MAC request and response bodies.
///
/// The key is never logged; `Debug` prints a redacted placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey {
    bytes: Vec<u8>,
}

impl AuthKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ZcertError::Config(
                "authkey is empty! generate one with `zcert authkey generate --save`".to_string(),
            ));
        }
        Ok(Self { bytes })
    }

    /// Generate a random mixed-case alphanumeric key
    pub fn generate() -> String {
        random_alphanumeric(GENERATED_KEY_LENGTH)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKey(<{} bytes redacted>)", self.bytes.len())
    }
}

/// Random string drawn from `[A-Za-z0-9]` using the thread-local CSPRNG
pub fn random_alphanumeric(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_shape() {
        let key = AuthKey::generate();
        assert_eq!(key.len(), GENERATED_KEY_LENGTH);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, AuthKey::generate());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(AuthKey::new(""), Err(ZcertError::Config(_))));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = AuthKey::new("supersecretvalue").unwrap();
        let printed = format!("{key:?}");
        assert!(!printed.contains("supersecret"));
        assert!(printed.contains("16 bytes"));
    }
}
