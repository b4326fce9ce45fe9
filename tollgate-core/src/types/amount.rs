//! [`AmountValue`] represents the size of a balance top-up.
//!
//! This module holds its type definition and implementations.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// Amount of funding asset converted into metering tokens by one top-up, in smallest units.
///
/// Uses a `u128` internally to support large values. Serialized as a decimal string so
/// payment services written in languages without 128-bit integers round-trip it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct AmountValue(pub u128);

impl From<u32> for AmountValue {
    fn from(value: u32) -> Self {
        AmountValue(value as u128)
    }
}

impl From<u64> for AmountValue {
    fn from(value: u64) -> Self {
        AmountValue(value as u128)
    }
}

impl From<u128> for AmountValue {
    fn from(value: u128) -> Self {
        AmountValue(value)
    }
}

impl FromStr for AmountValue {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(AmountValue)
    }
}

impl Display for AmountValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AmountValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AmountValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::AmountValue;

    #[test]
    fn test_amount_serializes_as_decimal_string() {
        let amount = AmountValue(340_282_366_920_938_463_463_374_607_431_768_211_455);
        let value = serde_json::to_value(amount).unwrap();
        assert_eq!(
            value,
            json!("340282366920938463463374607431768211455"),
            "u128::MAX must survive as a string"
        );

        let back: AmountValue = serde_json::from_value(value).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_amount_rejects_non_numeric() {
        assert!(serde_json::from_value::<AmountValue>(json!("ten")).is_err());
        assert!(serde_json::from_value::<AmountValue>(json!(10)).is_err());
    }
}
