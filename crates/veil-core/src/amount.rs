//! Payment amounts.
//!
//! All arithmetic happens on integer zatoshis. Decimal ZEC strings are parsed
//! exactly so that a tier priced at `0.1` compares equal to a payment of
//! `0.1`, with no float rounding in between.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Zatoshis per ZEC.
pub const ZATOSHIS_PER_ZEC: u64 = 100_000_000;

const DECIMALS: usize = 8;

/// An amount in zatoshis (1 ZEC = 10^8 zat).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Zatoshis(u64);

impl Zatoshis {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create from a raw zatoshi count.
    pub const fn new(zat: u64) -> Self {
        Self(zat)
    }

    /// The raw zatoshi count.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Sum, or `None` on overflow.
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(zat) => Some(Self(zat)),
            None => None,
        }
    }

    /// Parse a decimal ZEC amount such as `"0.1"` or `"12.5"`.
    ///
    /// At most eight fractional digits are accepted.
    pub fn from_zec_str(s: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidAmount(s.to_string());

        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > DECIMALS
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut frac_zat: u64 = 0;
        for (i, digit) in frac.bytes().enumerate() {
            frac_zat += u64::from(digit - b'0') * 10u64.pow((DECIMALS - 1 - i) as u32);
        }

        whole
            .checked_mul(ZATOSHIS_PER_ZEC)
            .and_then(|z| z.checked_add(frac_zat))
            .map(Self)
            .ok_or_else(invalid)
    }

    /// Convert a float ZEC amount, rounding to the nearest zatoshi.
    ///
    /// Only for chain responses that carry nothing better. Negative and
    /// non-finite inputs are rejected.
    pub fn from_zec_f64(zec: f64) -> Result<Self, CoreError> {
        if !zec.is_finite() || zec < 0.0 {
            return Err(CoreError::InvalidAmount(zec.to_string()));
        }
        let zat = (zec * ZATOSHIS_PER_ZEC as f64).round();
        if zat > u64::MAX as f64 {
            return Err(CoreError::InvalidAmount(zec.to_string()));
        }
        Ok(Self(zat as u64))
    }
}

impl fmt::Display for Zatoshis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / ZATOSHIS_PER_ZEC;
        let frac = self.0 % ZATOSHIS_PER_ZEC;
        if frac == 0 {
            return write!(f, "{} ZEC", whole);
        }
        let frac = format!("{:08}", frac);
        write!(f, "{}.{} ZEC", whole, frac.trim_end_matches('0'))
    }
}

impl fmt::Debug for Zatoshis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zatoshis({})", self.0)
    }
}

impl FromStr for Zatoshis {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_zec_str(s)
    }
}

impl From<u64> for Zatoshis {
    fn from(zat: u64) -> Self {
        Self(zat)
    }
}
