use crate::cert::SerialNumber;
use crate::utils::output::GetColumnValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Audit record written for every issued certificate. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCertificateRecord {
    pub serial: i64,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer: String,
    pub subject: String,
}

impl SignedCertificateRecord {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.not_after
    }
}

impl fmt::Display for SignedCertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Serial: {}, Subject: {}, Expires: {}",
            self.serial,
            self.subject,
            self.not_after.format("%Y-%m-%d %H:%M")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordColumn {
    Serial,
    SerialHex,
    Subject,
    Issuer,
    NotBefore,
    NotAfter,
    Expired,
}

impl RecordColumn {
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::Serial,
            Self::Subject,
            Self::Issuer,
            Self::NotBefore,
            Self::NotAfter,
            Self::Expired,
        ]
    }

    /// Parse a comma-separated column list such as "serial,subject,e"
    pub fn parse_list(columns: &str) -> Result<Vec<Self>, String> {
        columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(Self::from_str)
            .collect()
    }

    pub fn all() -> &'static [Self] {
        &[
            Self::Serial,
            Self::SerialHex,
            Self::Subject,
            Self::Issuer,
            Self::NotBefore,
            Self::NotAfter,
            Self::Expired,
        ]
    }

    /// Name accepted by `--columns`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::SerialHex => "serial_hex",
            Self::Subject => "subject",
            Self::Issuer => "issuer",
            Self::NotBefore => "not_before",
            Self::NotAfter => "not_after",
            Self::Expired => "expired",
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            Self::Serial => "Serial",
            Self::SerialHex => "Serial (hex)",
            Self::Subject => "Subject",
            Self::Issuer => "Issuer",
            Self::NotBefore => "Not Before",
            Self::NotAfter => "Not After",
            Self::Expired => "E",
        }
    }
}

impl FromStr for RecordColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "serial" | "id" => Ok(Self::Serial),
            "serial_hex" | "hex" => Ok(Self::SerialHex),
            "subject" | "cn" => Ok(Self::Subject),
            "issuer" => Ok(Self::Issuer),
            "not_before" => Ok(Self::NotBefore),
            "not_after" => Ok(Self::NotAfter),
            "expired" | "e" => Ok(Self::Expired),
            _ => Err(format!("Invalid column: {s}")),
        }
    }
}

impl GetColumnValue for SignedCertificateRecord {
    type Column = RecordColumn;

    fn get_column_value(&self, column: &RecordColumn) -> String {
        match column {
            RecordColumn::Serial => self.serial.to_string(),
            RecordColumn::SerialHex => SerialNumber::from(self.serial).as_colon_hex(),
            RecordColumn::Subject => self.subject.clone(),
            RecordColumn::Issuer => self.issuer.clone(),
            RecordColumn::NotBefore => self.not_before.format("%Y-%m-%d %H:%M").to_string(),
            RecordColumn::NotAfter => self.not_after.format("%Y-%m-%d %H:%M").to_string(),
            RecordColumn::Expired => {
                if self.is_expired() {
                    "✗".to_string()
                } else {
                    " ".to_string()
                }
            }
        }
    }
}
