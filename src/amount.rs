use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// number of decimal places in the smallest unit (wei-style fixed point)
pub const DECIMALS: u32 = 18;

/// smallest units per whole unit
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// basis points in 100%
pub const BPS_DENOMINATOR: u32 = 10_000;

/// integer amount in smallest units with 18 decimal places
///
/// Arithmetic operators saturate; callers guard subtraction against the
/// balance they are drawing from before applying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(u128::MAX);

    /// create from smallest units
    pub const fn from_raw(raw: u128) -> Self {
        Amount(raw)
    }

    /// create from whole units (e.g. 100 tokens = 100 * 10^18)
    pub fn from_units(units: u64) -> Self {
        Amount(units as u128 * UNIT)
    }

    /// raw smallest-unit value
    pub fn as_raw(&self) -> u128 {
        self.0
    }

    /// value in whole units as a decimal, if it fits decimal precision
    pub fn to_units(&self) -> Option<Decimal> {
        let raw = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(raw, DECIMALS).ok()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn min(self, other: Self) -> Self {
        Amount(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Amount(self.0.max(other.0))
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Amount(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Amount)
    }
}

impl From<u128> for Amount {
    fn from(raw: u128) -> Self {
        Amount(raw)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, other: Amount) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, other: Amount) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

// u128 does not survive every json consumer, so amounts travel as strings
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// annual interest rate in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Rate(u32);

impl Rate {
    pub const ZERO: Rate = Rate(0);

    /// create from basis points (e.g., 1000 for 10%)
    pub fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// create from whole percentage (e.g., 10 for 10%)
    pub fn from_percentage(p: u32) -> Self {
        Rate(p * 100)
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    /// get as decimal fraction (0.10 for 10%)
    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(BPS_DENOMINATOR)
    }

    /// get as percentage
    pub fn as_percentage(&self) -> Decimal {
        self.as_decimal() * dec!(100)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().normalize())
    }
}
