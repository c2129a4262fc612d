//! Amount type for handling monetary values as they appear in spreadsheet cells.
//!
//! Cells may carry a currency marker (`$`, `Kč`, ...), thousands separators, stray whitespace
//! (including the non-breaking spaces that some locales use for grouping) or accounting-style
//! parentheses for negatives. `Amount` strips all of that and keeps an exact `Decimal`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Currency markers that are stripped when no list is configured.
pub const DEFAULT_CURRENCY_SYMBOLS: &[&str] = &["$", "Kč", "€", "£"];

/// The largest magnitude a cell may hold. Sums of any realistic number of such amounts stay well
/// inside `Decimal`'s range.
const MAX_ABS_AMOUNT: i64 = 1_000_000_000_000_000;

/// Represents a monetary amount.
///
/// # Examples
///
/// ```
/// # use finsheet::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-$1,250.50").unwrap();
/// assert_eq!(amount.to_string(), "-1250.50");
///
/// let czk = Amount::from_str("1 299 Kč").unwrap();
/// assert_eq!(czk.to_string(), "1299.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Parses `s`, removing any of `currency_symbols` wherever they appear.
    pub fn parse<S>(s: &str, currency_symbols: &[S]) -> Result<Self, AmountError>
    where
        S: AsRef<str>,
    {
        let mut cleaned = s.to_string();
        for symbol in currency_symbols {
            let symbol = symbol.as_ref();
            if !symbol.is_empty() {
                cleaned = cleaned.replace(symbol, "");
            }
        }

        // Grouping characters: commas and any whitespace, non-breaking spaces included.
        let cleaned: String = cleaned
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .map(|c| if c == '\u{2212}' { '-' } else { c })
            .collect();

        if cleaned.is_empty() {
            return Err(AmountError::Empty);
        }

        let (negate, digits) = match cleaned.strip_prefix('(').and_then(|x| x.strip_suffix(')')) {
            Some(inner) => (true, inner),
            None => (false, cleaned.as_str()),
        };

        let value = Decimal::from_str(digits)
            .map_err(|e| AmountError::Invalid(s.trim().to_string(), e))?;
        if value.abs() > Decimal::from(MAX_ABS_AMOUNT) {
            return Err(AmountError::TooLarge(s.trim().to_string()));
        }
        Ok(Amount(if negate { -value } else { value }))
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Human-readable rendering with thousands separators, e.g. `-1,250.50`. Only for display;
    /// the conversion goes through `f64`.
    pub fn pretty(&self) -> String {
        let (sign, num) = if self.is_negative() {
            ("-", self.0.abs())
        } else {
            ("", self.0)
        };
        format!(
            "{sign}{}",
            format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
        )
    }
}

/// An error that can occur when parsing cell text into an `Amount`.
pub enum AmountError {
    /// Nothing was left after removing currency markers and whitespace.
    Empty,
    /// The remaining text is not a decimal number.
    Invalid(String, rust_decimal::Error),
    /// The number is larger in magnitude than `MAX_ABS_AMOUNT`.
    TooLarge(String),
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty => f.write_str("the amount is blank"),
            AmountError::Invalid(s, e) => write!(f, "'{s}' is not a valid amount: {e}"),
            AmountError::TooLarge(s) => write!(f, "'{s}' is too large to be an amount"),
        }
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AmountError::Empty | AmountError::TooLarge(_) => None,
            AmountError::Invalid(_, e) => Some(e),
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s, DEFAULT_CURRENCY_SYMBOLS)
    }
}

impl Display for Amount {
    /// Always two decimal places, no grouping, so the sheet reads it back as a number.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_plain() {
        let amount = Amount::from_str("-42.50").unwrap();
        assert_eq!(amount.value(), dec!(-42.50));
    }

    #[test]
    fn test_parse_with_dollar_sign() {
        assert_eq!(Amount::from_str("$50.00").unwrap().value(), dec!(50));
        assert_eq!(Amount::from_str("-$50.00").unwrap().value(), dec!(-50));
    }

    #[test]
    fn test_parse_koruna_suffix_and_spaces() {
        assert_eq!(Amount::from_str("-1 299 Kč").unwrap().value(), dec!(-1299));
        assert_eq!(
            Amount::from_str("12\u{a0}500,00 Kč").unwrap().value(),
            dec!(1250000)
        );
    }

    #[test]
    fn test_parse_multiple_commas() {
        let amount = Amount::from_str("$1,234,567.89").unwrap();
        assert_eq!(amount.value(), dec!(1234567.89));
    }

    #[test]
    fn test_parse_parentheses_negative() {
        let amount = Amount::from_str("(42.50)").unwrap();
        assert_eq!(amount.value(), dec!(-42.50));
    }

    #[test]
    fn test_parse_unicode_minus() {
        let amount = Amount::from_str("\u{2212}7.25").unwrap();
        assert_eq!(amount.value(), dec!(-7.25));
    }

    #[test]
    fn test_parse_custom_symbols() {
        let amount = Amount::parse("CHF 10.00", &["CHF"]).unwrap();
        assert_eq!(amount.value(), dec!(10));
        // "$" is not in the configured list this time
        assert!(Amount::parse("$10.00", &["CHF"]).is_err());
    }

    #[test]
    fn test_parse_empty_string() {
        assert!(matches!(Amount::from_str(""), Err(AmountError::Empty)));
        assert!(matches!(Amount::from_str("  Kč "), Err(AmountError::Empty)));
    }

    #[test]
    fn test_parse_garbage() {
        let err = Amount::from_str("bad").unwrap_err();
        assert!(err.to_string().contains("'bad' is not a valid amount"));
    }

    #[test]
    fn test_parse_too_large() {
        let err = Amount::from_str("79228162514264337593543950335").unwrap_err();
        assert!(matches!(err, AmountError::TooLarge(_)));
        assert_eq!(
            err.to_string(),
            "'79228162514264337593543950335' is too large to be an amount"
        );
        assert!(Amount::from_str("-1,000,000,000,000,000.01").is_err());
        assert_eq!(
            Amount::from_str("(1,000,000,000,000,000)").unwrap().value(),
            dec!(-1000000000000000)
        );
    }

    #[test]
    fn test_display_two_places() {
        assert_eq!(Amount::new(dec!(-42.5)).to_string(), "-42.50");
        assert_eq!(Amount::new(dec!(3)).to_string(), "3.00");
    }

    #[test]
    fn test_pretty() {
        assert_eq!(Amount::new(dec!(-60000)).pretty(), "-60,000.00");
        assert_eq!(Amount::new(dec!(1234.5)).pretty(), "1,234.50");
    }

    #[test]
    fn test_zero_is_not_negative() {
        let zero = Amount::from_str("0.00").unwrap();
        assert!(zero.is_zero());
        assert!(!zero.is_negative());
    }

    #[test]
    fn test_serde() {
        let amount = Amount::new(dec!(50));
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"50.00\"");
        let back: Amount = serde_json::from_str("\"$50.00\"").unwrap();
        assert_eq!(back.value(), dec!(50));
    }
}
