use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Stable 128-bit identifier shared by devices, registers, settings and the
/// channel properties they are announced as. Rendered as 32 hex digits.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Id(u128);

impl Id {
    /// Generates a fresh random identifier.
    #[inline]
    pub fn generate() -> Id {
        Id(rand::random::<u128>())
    }

    #[inline]
    pub fn from_raw(raw: u128) -> Id {
        Id(raw)
    }

    #[inline]
    pub fn raw(self) -> u128 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a 32 digit hex identifier")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Id, E> {
        u128::from_str_radix(value, 16)
            .map(Id)
            .map_err(|_| E::custom(format!("invalid identifier: {}", value)))
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Id, D::Error> {
        deserializer.deserialize_str(IdVisitor)
    }
}

/// Generates a short random entity key, used where a compact non-numeric
/// handle is exposed alongside the full identifier.
#[inline]
pub fn short_key() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let id = Id::from_raw(0xdead_beef);

        assert_eq!(id.to_string(), "000000000000000000000000deadbeef");
        assert_eq!(id.to_string().len(), 32);
    }

    #[test]
    fn test_generate_unique() {
        assert_ne!(Id::generate(), Id::generate());
    }

    #[test]
    fn test_short_key_length() {
        assert_eq!(short_key().len(), 16);
    }
}
