//! Monetary amounts in the ledger's base unit.
//!
//! All on-chain prices and payments are carried as wei (u128, the smallest
//! on-chain unit). Users type and read amounts in ether; conversion happens
//! exactly once at the command boundary. A value of exactly zero is the
//! ledger's "unset" sentinel: it means "not offered", never "free".

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MarketError;

const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
const ETH_DECIMALS: usize = 18;

/// An amount in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Wei(pub u128);

/// On the wire, wei travels as a decimal string: JSON numbers cannot carry
/// a full u128 and ledger tooling expects string amounts anyway.
impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WeiVisitor;

        impl Visitor<'_> for WeiVisitor {
            type Value = Wei;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a wei amount as a decimal string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Wei, E> {
                v.parse::<u128>()
                    .map(Wei)
                    .map_err(|_| E::custom(format!("invalid wei amount {v:?}")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Wei, E> {
                Ok(Wei(v as u128))
            }
        }

        deserializer.deserialize_any(WeiVisitor)
    }
}

impl Wei {
    pub const ZERO: Wei = Wei(0);

    /// Whether this amount is the "not offered" sentinel.
    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }

    /// Parse a user-facing decimal ether string ("1.5", "0.1") into wei.
    ///
    /// Rejects empty input, non-decimal characters, more than 18 fractional
    /// digits, and values that overflow u128.
    pub fn from_eth_str(s: &str) -> Result<Wei, MarketError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MarketError::validation("amount must not be empty"));
        }
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(MarketError::validation(format!("invalid amount {s:?}")));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(MarketError::validation(format!(
                "amount {s:?} is not a decimal number"
            )));
        }
        if frac_part.len() > ETH_DECIMALS {
            return Err(MarketError::validation(format!(
                "amount {s:?} has more than 18 fractional digits"
            )));
        }

        let int_wei = if int_part.is_empty() {
            0u128
        } else {
            int_part
                .parse::<u128>()
                .ok()
                .and_then(|v| v.checked_mul(WEI_PER_ETH))
                .ok_or_else(|| MarketError::validation(format!("amount {s:?} is out of range")))?
        };
        let frac_wei = if frac_part.is_empty() {
            0u128
        } else {
            // pad to 18 digits: "1" -> 100000000000000000
            let padded = format!("{:0<18}", frac_part);
            padded
                .parse::<u128>()
                .map_err(|_| MarketError::validation(format!("amount {s:?} is out of range")))?
        };
        int_wei
            .checked_add(frac_wei)
            .map(Wei)
            .ok_or_else(|| MarketError::validation(format!("amount {s:?} is out of range")))
    }

    /// Render as a decimal ether string with trailing zeros trimmed.
    pub fn to_eth_string(&self) -> String {
        let int = self.0 / WEI_PER_ETH;
        let frac = self.0 % WEI_PER_ETH;
        if frac == 0 {
            return int.to_string();
        }
        let frac = format!("{frac:018}");
        format!("{}.{}", int, frac.trim_end_matches('0'))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_eth_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_ether() {
        assert_eq!(Wei::from_eth_str("1").unwrap(), Wei(WEI_PER_ETH));
        assert_eq!(
            Wei::from_eth_str("1.5").unwrap(),
            Wei(1_500_000_000_000_000_000)
        );
        assert_eq!(
            Wei::from_eth_str("0.1").unwrap(),
            Wei(100_000_000_000_000_000)
        );
        assert_eq!(Wei::from_eth_str(".5").unwrap(), Wei(500_000_000_000_000_000));
        assert_eq!(Wei::from_eth_str("0").unwrap(), Wei::ZERO);
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!(Wei::from_eth_str("").is_err());
        assert!(Wei::from_eth_str(".").is_err());
        assert!(Wei::from_eth_str("1.2.3").is_err());
        assert!(Wei::from_eth_str("-1").is_err());
        assert!(Wei::from_eth_str("1,5").is_err());
        // 19 fractional digits
        assert!(Wei::from_eth_str("0.1234567890123456789").is_err());
    }

    #[test]
    fn renders_without_trailing_zeros() {
        assert_eq!(Wei(1_500_000_000_000_000_000).to_eth_string(), "1.5");
        assert_eq!(Wei(WEI_PER_ETH).to_eth_string(), "1");
        assert_eq!(Wei(1).to_eth_string(), "0.000000000000000001");
        assert_eq!(Wei::ZERO.to_eth_string(), "0");
    }

    #[test]
    fn zero_is_the_unset_sentinel() {
        assert!(Wei::ZERO.is_unset());
        assert!(!Wei(1).is_unset());
    }

    #[test]
    fn wire_format_is_a_decimal_string() {
        let big = Wei(20 * WEI_PER_ETH); // does not fit in a u64
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(json, "\"20000000000000000000\"");
        assert_eq!(serde_json::from_str::<Wei>(&json).unwrap(), big);
        // small amounts may also arrive as bare numbers
        assert_eq!(serde_json::from_str::<Wei>("42").unwrap(), Wei(42));
    }
}
