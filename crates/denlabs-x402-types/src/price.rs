//! Human-readable USD amount parsing.
//!
//! This module provides [`Price`], a strictly positive decimal value parsed
//! from a human-readable string and serialized as a JSON number on the wire.
//!
//! # Supported Formats
//!
//! - Plain numbers: `"2"`, `"0.01"`
//! - With currency symbols: `"$10.50"`
//! - With thousand separators: `"1,000"`, `"1,000,000.50"`
//!
//! # Example
//!
//! ```rust
//! use denlabs_x402_types::price::Price;
//!
//! let price = Price::parse("$2").unwrap();
//! assert_eq!(price.to_string(), "2");
//! ```

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// A strictly positive USD amount.
///
/// Every constructor enforces the range bounds, so a `Price` held by a
/// payment requirement is guaranteed to be greater than zero. On the wire
/// it serializes as a JSON number (`"price": 2`), matching the protocol's
/// 402 payload shape.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Price(Decimal);

/// Errors that can occur when parsing a price.
#[derive(Debug, thiserror::Error)]
pub enum PriceParseError {
    /// The input string could not be parsed as a number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// The value is outside the allowed range.
    #[error(
        "Price must be between {} and {}",
        constants::MIN_STR,
        constants::MAX_STR
    )]
    OutOfRange,
    /// Zero and negative values are not allowed.
    #[error("Price must be positive")]
    NotPositive,
}

mod constants {
    use super::*;
    use std::sync::LazyLock;

    pub const MIN_STR: &str = "0.000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

impl Price {
    /// Parses a human-readable currency string into a [`Price`].
    ///
    /// Currency symbols, thousand separators, and whitespace are stripped
    /// before parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The string cannot be parsed as a number
    /// - The value is zero or negative
    /// - The value is outside the allowed range
    pub fn parse(input: &str) -> Result<Self, PriceParseError> {
        // Remove anything that isn't digit, dot, minus
        let cleaned = Regex::new(r"[^\d\.\-]+")
            .unwrap()
            .replace_all(input, "")
            .to_string();

        let parsed = Decimal::from_str(&cleaned).map_err(|_| PriceParseError::InvalidFormat)?;
        Self::try_from_decimal(parsed)
    }

    fn try_from_decimal(decimal: Decimal) -> Result<Self, PriceParseError> {
        if decimal.is_sign_negative() || decimal.is_zero() {
            return Err(PriceParseError::NotPositive);
        }
        if decimal < *constants::MIN || decimal > *constants::MAX {
            return Err(PriceParseError::OutOfRange);
        }
        Ok(Price(decimal))
    }

    /// Returns the underlying decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Price {
    type Err = PriceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Price::parse(s)
    }
}

impl TryFrom<&str> for Price {
    type Error = PriceParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Price::from_str(value)
    }
}

impl TryFrom<f64> for Price {
    type Error = PriceParseError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(PriceParseError::OutOfRange)?;
        Self::try_from_decimal(decimal)
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let decimal = rust_decimal::serde::float::deserialize(deserializer)?;
        Self::try_from_decimal(decimal).map_err(serde::de::Error::custom)
    }
}
