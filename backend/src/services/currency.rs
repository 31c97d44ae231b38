//! # Currency Formatting
//!
//! Renders ledger amounts the way the vendor dashboard shows them:
//! symbol prefix, thousands separators and exactly two fraction digits.
//!
//! ```text
//! 1234.5     -> £1,234.50
//! 0.125      -> £0.12      (half-even)
//! 0.135      -> £0.14      (half-even)
//! -85        -> -£85.00
//! ```
//!
//! Amounts are `Decimal` end to end. Parsing a formatted string back gives
//! the original amount rounded to two places.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// Currencies the dashboard can be configured for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyCode {
    Gbp,
    Usd,
    Eur,
    /// Any other ISO 4217 code; rendered as `CODE 1,234.00`.
    Other(String),
}

impl CurrencyCode {
    /// Parse an ISO 4217 code (case-insensitive).
    pub fn parse(code: &str) -> Result<Self, String> {
        let upper = code.trim().to_ascii_uppercase();
        match upper.as_str() {
            "GBP" => Ok(Self::Gbp),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            other if other.len() == 3 && other.chars().all(|c| c.is_ascii_alphabetic()) => {
                Ok(Self::Other(other.to_string()))
            }
            _ => Err(format!("not an ISO 4217 currency code: {:?}", code)),
        }
    }

    /// Prefix placed in front of the digits.
    pub fn prefix(&self) -> String {
        match self {
            Self::Gbp => "£".to_string(),
            Self::Usd => "$".to_string(),
            Self::Eur => "€".to_string(),
            Self::Other(code) => format!("{} ", code),
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gbp => write!(f, "GBP"),
            Self::Usd => write!(f, "USD"),
            Self::Eur => write!(f, "EUR"),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Round to the currency's minor unit using banker's rounding.
pub fn round_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Format an amount for display.
///
/// ## Examples
///
/// ```rust,ignore
/// assert_eq!(format_currency(dec!(1234.5), &CurrencyCode::Gbp), "£1,234.50");
/// ```
pub fn format_currency(amount: Decimal, currency: &CurrencyCode) -> String {
    let mut rounded = round_minor(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    rounded = rounded.abs();
    rounded.rescale(2);

    let text = rounded.to_string();
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    // Add commas
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let whole: String = grouped.chars().rev().collect();

    format!(
        "{}{}{}.{}",
        if negative { "-" } else { "" },
        currency.prefix(),
        whole,
        frac
    )
}

/// Parse the numeric portion of a formatted amount.
///
/// Accepts the output of [`format_currency`] as well as bare numbers
/// (`"1234.50"`, `"1,234.5"`). Only one leading `-` and one currency prefix
/// are stripped; thousands separators must group by three.
pub fn parse_currency_amount(text: &str) -> Result<Decimal, String> {
    let invalid = || format!("Invalid amount: {}", text);

    let trimmed = text.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let number = strip_currency_prefix(rest);

    let (whole, frac) = match number.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (number, None),
    };
    if !is_grouped_integer(whole) {
        return Err(invalid());
    }
    if let Some(frac) = frac {
        if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
    }

    let digits = match frac {
        Some(frac) => format!("{}.{}", whole.replace(',', ""), frac),
        None => whole.replace(',', ""),
    };
    let value = Decimal::from_str(&digits).map_err(|_| invalid())?;

    Ok(if negative { -value } else { value })
}

/// Drop a `£`/`$`/`€` symbol or a `CODE ` prefix.
fn strip_currency_prefix(text: &str) -> &str {
    for symbol in ['£', '$', '€'] {
        if let Some(rest) = text.strip_prefix(symbol) {
            return rest;
        }
    }
    match text.split_once(' ') {
        Some((code, rest)) if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) => {
            rest
        }
        _ => text,
    }
}

/// `1234`, `1,234` and `12,345,678` pass; `1,2,3` and `,123` do not.
fn is_grouped_integer(text: &str) -> bool {
    let all_digits = |group: &str| !group.is_empty() && group.chars().all(|c| c.is_ascii_digit());

    if !text.contains(',') {
        return all_digits(text);
    }

    let mut groups = text.split(',');
    let first_ok = groups
        .next()
        .is_some_and(|first| all_digits(first) && first.len() <= 3);
    first_ok && groups.all(|group| all_digits(group) && group.len() == 3)
}
