use crate::utils::errors::ValidationFailure;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lifetime of a client-requested certificate (one year)
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(8760 * 60 * 60);

/// Caller-supplied bounds on an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceParams {
    #[serde(alias = "Lifetime", with = "lifetime_format")]
    pub lifetime: Duration,
    #[serde(default, alias = "ClientAuth")]
    pub client_auth: bool,
    #[serde(default, alias = "ServerAuth")]
    pub server_auth: bool,
}

impl Default for IssuanceParams {
    fn default() -> Self {
        Self {
            lifetime: DEFAULT_LIFETIME,
            client_auth: true,
            server_auth: false,
        }
    }
}

impl IssuanceParams {
    pub fn validate(&self) -> Result<(), ValidationFailure> {
        if self.lifetime.is_zero() {
            return Err(ValidationFailure::InvalidLifetime);
        }
        Ok(())
    }
}

/// Lifetimes travel as humantime strings ("8760h", "1h30m"); bare integers are
/// read as nanoseconds.
mod lifetime_format {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S>(lifetime: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*lifetime))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(LifetimeVisitor)
    }

    struct LifetimeVisitor;

    impl Visitor<'_> for LifetimeVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration string like \"8760h\" or an integer number of nanoseconds")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            humantime::parse_duration(value.trim())
                .map_err(|e| E::custom(format!("invalid lifetime {value:?}: {e}")))
        }

        fn visit_u64<E: de::Error>(self, nanos: u64) -> Result<Duration, E> {
            Ok(Duration::from_nanos(nanos))
        }

        fn visit_i64<E: de::Error>(self, nanos: i64) -> Result<Duration, E> {
            u64::try_from(nanos)
                .map(Duration::from_nanos)
                .map_err(|_| E::custom("lifetime must not be negative"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_from_humantime_string() {
        let params: IssuanceParams =
            serde_json::from_str(r#"{"lifetime":"1h30m","client_auth":true}"#).unwrap();
        assert_eq!(params.lifetime, Duration::from_secs(5400));
        assert!(params.client_auth);
        assert!(!params.server_auth);
    }

    #[test]
    fn test_lifetime_from_nanoseconds_with_aliases() {
        let params: IssuanceParams = serde_json::from_str(
            r#"{"Lifetime":3600000000000,"ClientAuth":false,"ServerAuth":true}"#,
        )
        .unwrap();
        assert_eq!(params.lifetime, Duration::from_secs(3600));
        assert!(!params.client_auth);
        assert!(params.server_auth);
    }

    #[test]
    fn test_invalid_lifetimes() {
        assert!(serde_json::from_str::<IssuanceParams>(r#"{"lifetime":"forever"}"#).is_err());
        assert!(serde_json::from_str::<IssuanceParams>(r#"{"lifetime":-5}"#).is_err());
        assert!(serde_json::from_str::<IssuanceParams>(r#"{"client_auth":true}"#).is_err());
    }

    #[test]
    fn test_serializes_lifetime_as_string() {
        let params = IssuanceParams {
            lifetime: Duration::from_secs(5400),
            client_auth: true,
            server_auth: false,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["lifetime"], "1h 30m");
        assert_eq!(
            serde_json::from_value::<IssuanceParams>(value).unwrap(),
            params
        );
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        let params = IssuanceParams {
            lifetime: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ValidationFailure::InvalidLifetime));
        assert!(IssuanceParams::default().validate().is_ok());
    }
}
