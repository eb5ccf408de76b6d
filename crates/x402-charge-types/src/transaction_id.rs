//! Transaction identifiers presented as proof of payment.
//!
//! The payment service hands out identifiers shaped like a UUID: five groups of
//! hexadecimal digits (`8-4-4-4-12`) separated by hyphens. A [`TransactionId`] can only be
//! obtained by parsing, so holding one means the format check already happened.
//!
//! ```
//! use x402_charge_types::transaction_id::TransactionId;
//!
//! let id: TransactionId = "11111111-1111-1111-1111-111111111111".parse().unwrap();
//! assert_eq!(id.as_str(), "11111111-1111-1111-1111-111111111111");
//! assert!("not-a-transaction".parse::<TransactionId>().is_err());
//! ```

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

static TRANSACTION_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("valid transaction id pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transaction ID format")]
pub struct TransactionIdError;

/// A transaction identifier in canonical (lowercase) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(String);

impl TransactionId {
    /// Parses raw header bytes. Non-UTF-8 input is a format error.
    pub fn from_header_bytes(bytes: &[u8]) -> Result<Self, TransactionIdError> {
        std::str::from_utf8(bytes)
            .map_err(|_| TransactionIdError)?
            .parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl FromStr for TransactionId {
    type Err = TransactionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if TRANSACTION_ID_PATTERN.is_match(s) {
            Ok(TransactionId(s.to_ascii_lowercase()))
        } else {
            Err(TransactionIdError)
        }
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_ids() {
        let id: TransactionId = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
        assert_eq!(id.as_str(), "0f8fad5b-d9cb-469f-a165-70867728950e");
    }

    #[test]
    fn canonicalizes_to_lowercase() {
        let id: TransactionId = "0F8FAD5B-D9CB-469F-A165-70867728950E".parse().unwrap();
        assert_eq!(id.as_str(), "0f8fad5b-d9cb-469f-a165-70867728950e");
        assert_eq!(id.into_inner(), "0f8fad5b-d9cb-469f-a165-70867728950e");
    }

    #[test]
    fn rejects_malformed_ids() {
        for raw in [
            "",
            "abc",
            "11111111-1111-1111-1111-11111111111",
            "11111111-1111-1111-1111-1111111111111",
            "11111111111111111111111111111111",
            "g1111111-1111-1111-1111-111111111111",
            " 11111111-1111-1111-1111-111111111111",
            "11111111-1111-1111-1111-111111111111\n",
            "{11111111-1111-1111-1111-111111111111}",
        ] {
            assert_eq!(raw.parse::<TransactionId>(), Err(TransactionIdError), "{raw:?}");
        }
    }

    #[test]
    fn rejects_non_utf8_header_bytes() {
        assert!(TransactionId::from_header_bytes(&[0xff, 0xfe, 0x2d]).is_err());
        assert!(
            TransactionId::from_header_bytes(b"11111111-1111-1111-1111-111111111111").is_ok()
        );
    }

    #[test]
    fn deserialization_validates_format() {
        let ok: Result<TransactionId, _> =
            serde_json::from_str("\"11111111-1111-1111-1111-111111111111\"");
        assert!(ok.is_ok());
        let bad: Result<TransactionId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
