//! Money Module
//!
//! Parsing, validation and formatting of monetary amounts. All amounts are
//! `rust_decimal::Decimal` with at most [`MONEY_SCALE`] fractional digits
//! and are stored as `NUMERIC(20, 2)`.
//!
//! Never `f64`: balances must always equal the sum of their entries.
//!
//! ## Usage
//! ```rust
//! use simple_bank::money::{format_amount, parse_amount};
//!
//! let amount = parse_amount("10.5").unwrap();
//! assert_eq!(format_amount(amount), "10.50");
//! ```

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

/// Fractional digits of every supported currency (minor units)
pub const MONEY_SCALE: u32 = 2;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

// ============================================================================
// Currency
// ============================================================================

/// Currencies accounts may be opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Usd,
    Eur,
    Cad,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Cad];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Cad => "CAD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "CAD" => Ok(Currency::Cad),
            other => Err(MoneyError::UnsupportedCurrency(other.to_string())),
        }
    }
}

pub fn is_supported_currency(code: &str) -> bool {
    code.parse::<Currency>().is_ok()
}

// ============================================================================
// Parse / Validate
// ============================================================================

/// Parse a client-supplied positive amount such as `"10"` or `"10.25"`.
///
/// Strict: no sign, no `.5` / `5.`, at most [`MONEY_SCALE`] fractional
/// digits (rejected, never truncated), non-zero.
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }
    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let mut parts = amount_str.split('.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    if parts.next().is_some() {
        return Err(MoneyError::InvalidFormat("multiple decimal points".into()));
    }
    if whole.is_empty() {
        return Err(MoneyError::InvalidFormat(
            "missing leading zero (e.g., use 0.5 instead of .5)".into(),
        ));
    }
    if frac == Some("") {
        return Err(MoneyError::InvalidFormat(
            "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
        ));
    }
    let all_digits = whole
        .chars()
        .chain(frac.unwrap_or_default().chars())
        .all(|c| c.is_ascii_digit());
    if !all_digits {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in amount: {}",
            amount_str
        )));
    }
    if let Some(frac) = frac {
        if frac.len() > MONEY_SCALE as usize {
            return Err(MoneyError::PrecisionOverflow {
                provided: frac.len() as u32,
                max: MONEY_SCALE,
            });
        }
    }

    let amount = Decimal::from_str(amount_str).map_err(|_| MoneyError::Overflow)?;
    validate_amount(amount)
}

/// Check that `amount` is a positive value representable at [`MONEY_SCALE`]
pub fn validate_amount(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }
    check_scale(amount)
}

/// Check that `amount` (any sign) fits [`MONEY_SCALE`] without rounding.
///
/// Trailing zeros do not count: `1.500` is accepted.
pub fn check_scale(amount: Decimal) -> Result<Decimal, MoneyError> {
    let scale = amount.normalize().scale();
    if scale > MONEY_SCALE {
        return Err(MoneyError::PrecisionOverflow {
            provided: scale,
            max: MONEY_SCALE,
        });
    }
    Ok(amount)
}

// ============================================================================
// Format
// ============================================================================

/// Render with exactly [`MONEY_SCALE`] decimals, e.g. `-10.00`
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.prec$}", amount, prec = MONEY_SCALE as usize)
}
