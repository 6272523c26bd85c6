//! Fixed-point transfer amounts.
//!
//! Amounts are stored as integer minor units so that the same logical value
//! always encodes to the same bytes. One whole unit is [`Amount::UNIT`] minor
//! units (eight decimal places).
//!
//! Human-readable formats such as JSON carry the decimal string (`"12.5"`);
//! binary formats carry the raw `u64`, which is what block digests hash.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when building an [`Amount`] from external input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount must not be negative")]
    Negative,

    #[error("amount has more than {max} decimal places")]
    TooPrecise { max: u32 },

    #[error("amount exceeds the representable range")]
    Overflow,

    #[error("malformed amount: {0:?}")]
    Malformed(String),
}

/// A non-negative amount in minor units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    /// Number of decimal places carried by an amount.
    pub const DECIMALS: u32 = 8;
    /// Minor units per whole unit.
    pub const UNIT: u64 = 100_000_000;
    pub const ZERO: Self = Self(0);

    /// Create an amount from raw minor units.
    pub fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Create an amount from whole units.
    pub fn from_units(units: u64) -> Result<Self, AmountError> {
        units
            .checked_mul(Self::UNIT)
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Raw minor units.
    pub fn minor(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parse a plain decimal such as `"50"`, `"0.25"` or `"12.00000001"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(AmountError::Negative);
        }
        let s = s.strip_prefix('+').unwrap_or(s);
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Malformed(s.to_string()));
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Malformed(s.to_string()));
        }
        if frac.len() > Self::DECIMALS as usize {
            return Err(AmountError::TooPrecise { max: Self::DECIMALS });
        }

        let units: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::Overflow)?
        };
        let mut minor_frac: u64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| AmountError::Malformed(s.to_string()))?
        };
        for _ in frac.len()..Self::DECIMALS as usize {
            minor_frac *= 10;
        }

        units
            .checked_mul(Self::UNIT)
            .and_then(|m| m.checked_add(minor_frac))
            .map(Self)
            .ok_or(AmountError::Overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.0 / Self::UNIT;
        let frac = self.0 % Self::UNIT;
        if frac == 0 {
            return write!(f, "{}", units);
        }
        let frac = format!("{:08}", frac);
        write!(f, "{}.{}", units, frac.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_u64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            Ok(Self(u64::deserialize(deserializer)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fraction() {
        assert_eq!("50".parse::<Amount>().unwrap(), Amount::from_units(50).unwrap());
        assert_eq!("0.25".parse::<Amount>().unwrap().minor(), 25_000_000);
        assert_eq!(".5".parse::<Amount>().unwrap().minor(), 50_000_000);
        assert_eq!("12.00000001".parse::<Amount>().unwrap().minor(), 1_200_000_001);
    }

    #[test]
    fn test_parse_rejects_negative() {
        assert_eq!("-1".parse::<Amount>(), Err(AmountError::Negative));
        assert_eq!("-0.5".parse::<Amount>(), Err(AmountError::Negative));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("1.2.3".parse::<Amount>(), Err(AmountError::Malformed(_))));
        assert!(matches!("abc".parse::<Amount>(), Err(AmountError::Malformed(_))));
        assert!(matches!(".".parse::<Amount>(), Err(AmountError::Malformed(_))));
        assert_eq!(
            "0.000000001".parse::<Amount>(),
            Err(AmountError::TooPrecise { max: 8 })
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::from_units(50).unwrap().to_string(), "50");
        assert_eq!(Amount::from_minor(150_000_000).to_string(), "1.5");
        assert_eq!(Amount::from_minor(1).to_string(), "0.00000001");
    }

    #[test]
    fn test_overflow() {
        assert_eq!(Amount::from_units(u64::MAX), Err(AmountError::Overflow));
        assert_eq!(
            "184467440737.09551616".parse::<Amount>(),
            Err(AmountError::Overflow)
        );
        assert_eq!(
            "184467440737.09551615".parse::<Amount>().unwrap().minor(),
            u64::MAX
        );
    }

    #[test]
    fn test_json_uses_decimal_string() {
        let amount: Amount = "12.5".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), r#""12.5""#);
        assert_eq!(serde_json::from_str::<Amount>(r#""12.5""#).unwrap(), amount);
        assert_eq!(serde_json::from_str::<Amount>(r#""100""#).unwrap().minor(), 100 * Amount::UNIT);

        assert!(serde_json::from_str::<Amount>("100").is_err());
        assert!(serde_json::from_str::<Amount>(r#""-1""#).is_err());
    }

    #[test]
    fn test_binary_uses_minor_units() {
        let amount = Amount::from_minor(1_250_000_000);
        let bytes = bincode::serialize(&amount).unwrap();
        assert_eq!(bytes, 1_250_000_000u64.to_le_bytes());
        assert_eq!(bincode::deserialize::<Amount>(&bytes).unwrap(), amount);
    }
}
