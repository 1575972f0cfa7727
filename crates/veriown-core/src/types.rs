//! Strong type definitions for VeriOwn.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create from a raw row id.
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the raw row id.
            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

row_id!(
    /// Identifier of a physical product, assigned by the store.
    ProductId,
    "ProductId"
);

row_id!(
    /// Identifier of a user account, assigned by the store.
    UserId,
    "UserId"
);

row_id!(
    /// Identifier of an owner contract record, assigned by the store.
    ContractId,
    "ContractId"
);

/// A 32-byte chain digest binding an event to its predecessor.
///
/// Computed as Blake3 over the canonical encoding of the event fields and
/// the previous event's digest. See [`crate::chain`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventHash(pub [u8; 32]);

impl EventHash {
    /// The fixed predecessor of the first event of every product.
    pub const GENESIS: Self = Self([0u8; 32]);

    /// Create a new EventHash from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Whether this is the genesis sentinel.
    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }
}

impl fmt::Debug for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for EventHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for EventHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for EventHash {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_hash_hex_roundtrip() {
        let hash = EventHash::from_bytes([0x42; 32]);
        let hex = hash.to_hex();
        let recovered = EventHash::from_hex(&hex).unwrap();
        assert_eq!(hash, recovered);
    }

    #[test]
    fn test_event_hash_display() {
        let hash = EventHash::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", hash), "abababababababab");
        assert!(format!("{:?}", hash).starts_with("EventHash("));
    }

    #[test]
    fn test_event_hash_rejects_short_hex() {
        assert!(EventHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_genesis_is_zero() {
        assert!(EventHash::GENESIS.is_genesis());
        assert!(!EventHash::from_bytes([1; 32]).is_genesis());
    }

    #[test]
    fn test_row_ids_display_and_serde() {
        let id = ProductId::new(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(format!("{:?}", UserId(3)), "UserId(3)");
        assert_eq!(serde_json::to_string(&ContractId(9)).unwrap(), "9");
    }
}
