//! 18-decimal fixed-point amounts
//!
//! Every price, reserve value and trade amount the keeper handles is a
//! `Wad`: an unsigned 256-bit integer scaled by 1e18. Products and
//! quotients are computed on the raw integers so repeated passes over the
//! same inputs produce bit-identical results.

use primitive_types::U256;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of fractional decimal digits
pub const WAD_DECIMALS: usize = 18;

/// 1e18 as a raw integer
pub const WAD_SCALE: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

/// Fixed-point decimal with 18 fractional digits
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wad(U256);

impl Wad {
    pub const ZERO: Wad = Wad(U256([0, 0, 0, 0]));
    pub const ONE: Wad = Wad(WAD_SCALE);

    /// Smallest representable positive amount (1e-18)
    pub const UNIT: Wad = Wad(U256([1, 0, 0, 0]));

    /// Wrap an already-scaled integer
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    /// Wrap an already-scaled u128
    pub fn from_raw_u128(raw: u128) -> Self {
        Self(U256::from(raw))
    }

    /// Whole units, e.g. `from_units(5)` is 5.0
    pub fn from_units(units: u128) -> Self {
        // u128::MAX * 1e18 < 2^256, cannot overflow
        Self(U256::from(units) * WAD_SCALE)
    }

    /// The scaled integer
    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Wad) -> Option<Wad> {
        self.0.checked_add(rhs.0).map(Wad)
    }

    pub fn checked_sub(self, rhs: Wad) -> Option<Wad> {
        self.0.checked_sub(rhs.0).map(Wad)
    }

    /// `self * rhs`, truncated to 18 decimals
    pub fn checked_mul(self, rhs: Wad) -> Option<Wad> {
        self.0
            .checked_mul(rhs.0)
            .and_then(|p| p.checked_div(WAD_SCALE))
            .map(Wad)
    }

    /// `self / rhs`, truncated to 18 decimals. `None` on zero divisor.
    pub fn checked_div(self, rhs: Wad) -> Option<Wad> {
        if rhs.is_zero() {
            return None;
        }
        self.0
            .checked_mul(WAD_SCALE)
            .and_then(|n| n.checked_div(rhs.0))
            .map(Wad)
    }

    /// `self * bps / scale`, e.g. `mul_bps(15_000, 10_000)` is 1.5x
    pub fn mul_bps(self, bps: u32, scale: u32) -> Option<Wad> {
        if scale == 0 {
            return None;
        }
        self.0
            .checked_mul(U256::from(bps))
            .and_then(|n| n.checked_div(U256::from(scale)))
            .map(Wad)
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / WAD_SCALE;
        let frac = (self.0 % WAD_SCALE).low_u64();
        if frac == 0 {
            return write!(f, "{}", int);
        }
        let digits = format!("{:018}", frac);
        write!(f, "{}.{}", int, digits.trim_end_matches('0'))
    }
}

impl fmt::Debug for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wad({})", self)
    }
}

impl FromStr for Wad {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidAmount(s.to_string());

        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac_part.len() > WAD_DECIMALS {
            return Err(Error::InvalidAmount(format!(
                "{} has more than {} fractional digits",
                s, WAD_DECIMALS
            )));
        }

        let int = if int_part.is_empty() {
            U256::zero()
        } else {
            U256::from_dec_str(int_part).map_err(|_| invalid())?
        };
        let frac = if frac_part.is_empty() {
            U256::zero()
        } else {
            let padded = format!("{:0<width$}", frac_part, width = WAD_DECIMALS);
            U256::from_dec_str(&padded).map_err(|_| invalid())?
        };

        int.checked_mul(WAD_SCALE)
            .and_then(|n| n.checked_add(frac))
            .map(Wad)
            .ok_or(Error::ArithmeticOverflow("amount parse"))
    }
}

impl Serialize for Wad {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Wad {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WadVisitor;

        impl<'de> Visitor<'de> for WadVisitor {
            type Value = Wad;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative decimal string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Wad, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Wad, E> {
                Ok(Wad::from_units(v as u128))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Wad, E> {
                u64::try_from(v)
                    .map(|u| Wad::from_units(u as u128))
                    .map_err(|_| E::custom(format!("negative amount: {}", v)))
            }

            // Env and unquoted TOML values like 0.01 arrive as floats
            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Wad, E> {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom(format!("invalid amount: {}", v)));
                }
                v.to_string().parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(WadVisitor)
    }
}
