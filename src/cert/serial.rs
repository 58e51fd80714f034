use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

/// Hands out certificate serial numbers.
///
/// The counter is derived from the highest persisted serial at startup and only
/// ever moves forward. A serial whose record fails to persist is skipped, never
/// handed out again.
#[derive(Debug)]
pub struct SerialAllocator {
    counter: AtomicI64,
}

impl SerialAllocator {
    /// Start counting after `highest`, or from zero when nothing has been persisted
    pub fn starting_after(highest: Option<i64>) -> Self {
        let start = highest.unwrap_or(0);
        tracing::debug!("serial allocator starting after {start}");
        Self {
            counter: AtomicI64::new(start),
        }
    }

    /// Allocate the next serial
    pub fn next(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently allocated serial (or the starting point)
    pub fn current(&self) -> i64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Certificate serial number rendered as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerialNumber {
    hex: String,
}

#[derive(Error, Debug)]
pub enum SerialNumberParseError {
    #[error("Invalid hex character: {0}")]
    InvalidHexCharacter(char),

    #[error("Empty string provided")]
    EmptyString,

    #[error("Invalid length: expected even number of hex characters")]
    InvalidLength,
}

impl SerialNumber {
    /// Create a SerialNumber from big-endian bytes as found in a certificate
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let trimmed = match bytes.iter().position(|b| *b != 0) {
            Some(first) => &bytes[first..],
            None => &[0u8][..],
        };
        Self {
            hex: hex::encode(trimmed),
        }
    }

    /// Parse a hex string, with or without colons
    pub fn parse(identifier: &str) -> Result<Self, SerialNumberParseError> {
        if identifier.is_empty() {
            return Err(SerialNumberParseError::EmptyString);
        }

        let cleaned = identifier.replace(':', "").to_lowercase();

        if let Some(ch) = cleaned.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(SerialNumberParseError::InvalidHexCharacter(ch));
        }
        if cleaned.len() % 2 != 0 {
            return Err(SerialNumberParseError::InvalidLength);
        }

        Ok(Self { hex: cleaned })
    }

    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// Colon-separated hex (e.g. "01:0f")
    pub fn as_colon_hex(&self) -> String {
        self.hex
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Numeric value, if it fits in an i64
    pub fn to_i64(&self) -> Option<i64> {
        i64::from_str_radix(&self.hex, 16).ok()
    }
}

impl From<i64> for SerialNumber {
    fn from(serial: i64) -> Self {
        Self::from_be_bytes(&serial.to_be_bytes())
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

impl FromStr for SerialNumber {
    type Err = SerialNumberParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SerialNumber {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_colon_hex())
    }
}

impl<'de> Deserialize<'de> for SerialNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SerialNumber::parse(&s).map_err(serde::de::Error::custom)
    }
}
