//! Data sensitivity tiers

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sensitivity tier recorded on every encrypted envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataClassification {
    /// Safe to display or share
    Public,
    /// App-internal, not user-identifying
    Internal,
    /// User data (meals, receipts, health readings)
    Confidential,
    /// Credentials and session material
    Restricted,
}

impl DataClassification {
    /// All tiers, least to most sensitive
    pub const ALL: [DataClassification; 4] = [
        DataClassification::Public,
        DataClassification::Internal,
        DataClassification::Confidential,
        DataClassification::Restricted,
    ];

    /// Wire label
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataClassification::Public => "public",
            DataClassification::Internal => "internal",
            DataClassification::Confidential => "confidential",
            DataClassification::Restricted => "restricted",
        }
    }
}

impl fmt::Display for DataClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataClassification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(DataClassification::Public),
            "internal" => Ok(DataClassification::Internal),
            "confidential" => Ok(DataClassification::Confidential),
            "restricted" => Ok(DataClassification::Restricted),
            other => Err(Error::InvalidClassification(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        for classification in DataClassification::ALL {
            let parsed: DataClassification = classification.as_str().parse().unwrap();
            assert_eq!(parsed, classification);
        }
        assert_eq!(
            "RESTRICTED".parse::<DataClassification>().unwrap(),
            DataClassification::Restricted
        );
        assert!("secret".parse::<DataClassification>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&DataClassification::Confidential).unwrap();
        assert_eq!(json, "\"confidential\"");
    }
}
