//! Fixed-point decoding and canonical encoding of resource quantities.
//!
//! Quantities arrive as [`Quantity`] strings such as `500m`, `1.5Gi` or
//! `2e3`. The cache never works with the textual form: every quantity is
//! decoded once into an exact rational and then rounded up to either whole
//! units ([`ParsedQuantity::value`]) or thousandths
//! ([`ParsedQuantity::milli_value`]).
//!
//! Encoding goes the other way and keeps the two scaling conventions apart:
//! [`Format::BinarySI`] prefers `Ki`/`Mi`/`Gi` suffixes, [`Format::DecimalSI`]
//! prefers `k`/`M`/`G`.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

use crate::error::QuantityError;

/// Scaling convention used when rendering a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// Powers of 1024 (`Ki`, `Mi`, `Gi`, ...).
    BinarySI,
    /// Powers of 1000 (`k`, `M`, `G`, ...) and `m` for thousandths.
    DecimalSI,
}

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 1),
    ("Mi", 2),
    ("Gi", 3),
    ("Ti", 4),
    ("Pi", 5),
    ("Ei", 6),
];

const DECIMAL_SUFFIXES: [(&str, i32); 10] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Largest power of ten applied before the value is considered out of range.
const MAX_POW10: i32 = 36;

/// An exactly decoded quantity: `numerator / denominator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    numerator: i128,
    denominator: i128,
}

impl ParsedQuantity {
    /// Whole units, rounded up.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::Overflow`] when the value does not fit in `i64`.
    pub fn value(&self) -> Result<i64, QuantityError> {
        scaled(self.numerator, self.denominator, 1)
    }

    /// Thousandths of a unit, rounded up.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::Overflow`] when the value does not fit in `i64`.
    pub fn milli_value(&self) -> Result<i64, QuantityError> {
        scaled(self.numerator, self.denominator, 1000)
    }
}

fn scaled(numerator: i128, denominator: i128, factor: i128) -> Result<i64, QuantityError> {
    let overflow = || QuantityError::Overflow(format!("{numerator}/{denominator}"));
    let numerator = numerator.checked_mul(factor).ok_or_else(overflow)?;
    let mut quotient = numerator / denominator;
    if numerator % denominator != 0 && numerator > 0 {
        quotient += 1;
    }
    i64::try_from(quotient).map_err(|_| overflow())
}

/// Decode a quantity string.
///
/// # Errors
///
/// Returns an error when the string is empty, malformed, carries an unknown
/// suffix, or is too large to represent.
pub fn parse(quantity: &Quantity) -> Result<ParsedQuantity, QuantityError> {
    parse_str(&quantity.0)
}

/// Decode a quantity from a plain string.
///
/// # Errors
///
/// See [`parse`].
pub fn parse_str(input: &str) -> Result<ParsedQuantity, QuantityError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (negative, rest) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let number_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_len);

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(QuantityError::InvalidNumber(input.to_string()));
    }

    let mut mantissa: i128 = 0;
    for digit in whole.bytes().chain(fraction.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(i128::from(digit - b'0')))
            .ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
    }
    if negative {
        mantissa = -mantissa;
    }
    let fraction_digits = i32::try_from(fraction.len())
        .map_err(|_| QuantityError::InvalidNumber(input.to_string()))?;

    if let Some(&(_, power)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        let multiplier = 1024_i128.pow(power);
        let numerator = mantissa
            .checked_mul(multiplier)
            .ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
        return from_pow10(numerator, -fraction_digits, input);
    }

    let exponent = decimal_exponent(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
        quantity: input.to_string(),
        suffix: suffix.to_string(),
    })?;
    from_pow10(mantissa, exponent - fraction_digits, input)
}

fn decimal_exponent(suffix: &str) -> Option<i32> {
    if let Some(&(_, exponent)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(exponent);
    }
    let digits = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))?;
    let unsigned = digits.strip_prefix(['+', '-']).unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Builds `mantissa * 10^exponent` as an exact rational.
fn from_pow10(mantissa: i128, exponent: i32, input: &str) -> Result<ParsedQuantity, QuantityError> {
    if exponent >= 0 {
        if exponent > MAX_POW10 {
            if mantissa == 0 {
                return Ok(ParsedQuantity { numerator: 0, denominator: 1 });
            }
            return Err(QuantityError::Overflow(input.to_string()));
        }
        let numerator = mantissa
            .checked_mul(10_i128.pow(exponent.unsigned_abs()))
            .ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
        return Ok(ParsedQuantity { numerator, denominator: 1 });
    }

    if -exponent > MAX_POW10 {
        // Below any representable resolution: keep only the sign, so rounding
        // up still yields one unit for a positive amount.
        return Ok(ParsedQuantity {
            numerator: mantissa.signum(),
            denominator: 10_i128.pow(MAX_POW10.unsigned_abs()),
        });
    }
    Ok(ParsedQuantity {
        numerator: mantissa,
        denominator: 10_i128.pow(exponent.unsigned_abs()),
    })
}

/// Render whole units in canonical form.
#[must_use]
pub fn format_quantity(value: i64, format: Format) -> Quantity {
    Quantity(canonical(value, format))
}

/// Render thousandths of a unit in canonical form.
///
/// Whole amounts drop the `m` suffix, so `2000` renders as `2`.
#[must_use]
pub fn format_milli_quantity(milli: i64, format: Format) -> Quantity {
    if milli % 1000 == 0 {
        return format_quantity(milli / 1000, format);
    }
    Quantity(format!("{milli}m"))
}

fn canonical(value: i64, format: Format) -> String {
    if value == 0 {
        return "0".to_string();
    }
    match format {
        Format::BinarySI if value.unsigned_abs() >= 1024 => {
            for &(suffix, power) in BINARY_SUFFIXES.iter().rev() {
                let unit = 1_i64 << (10 * power);
                if value % unit == 0 {
                    return format!("{}{suffix}", value / unit);
                }
            }
            value.to_string()
        }
        _ => {
            for &(suffix, exponent) in DECIMAL_SUFFIXES.iter().rev() {
                if exponent <= 0 {
                    break;
                }
                let unit = 10_i64.pow(exponent.unsigned_abs());
                if value % unit == 0 {
                    return format!("{}{suffix}", value / unit);
                }
            }
            value.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> i64 {
        parse_str(s).unwrap().value().unwrap()
    }

    fn milli(s: &str) -> i64 {
        parse_str(s).unwrap().milli_value().unwrap()
    }

    #[test]
    fn parse_cpu_forms() {
        assert_eq!(milli("1"), 1000);
        assert_eq!(milli("500m"), 500);
        assert_eq!(milli("1.5"), 1500);
        assert_eq!(milli("0.1"), 100);
        assert_eq!(milli("2e3"), 2_000_000);
        assert_eq!(milli(".5"), 500);
    }

    #[test]
    fn parse_memory_forms() {
        assert_eq!(value("1Gi"), 1 << 30);
        assert_eq!(value("512Mi"), 512 << 20);
        assert_eq!(value("1.5Ki"), 1536);
        assert_eq!(value("1k"), 1000);
        assert_eq!(value("128974848"), 128_974_848);
        assert_eq!(value("129e6"), 129_000_000);
        assert_eq!(value("1E"), 1_000_000_000_000_000_000);
    }

    #[test]
    fn values_round_up() {
        assert_eq!(value("100m"), 1);
        assert_eq!(value("1.1"), 2);
        assert_eq!(milli("1n"), 1);
        assert_eq!(value("-100m"), 0);
        assert_eq!(value("0.0"), 0);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse_str(""), Err(QuantityError::Empty));
        assert!(matches!(
            parse_str("abc"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse_str("1.2.3"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            parse_str("10Qi"),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(matches!(
            parse_str("1e"),
            Err(QuantityError::UnknownSuffix { .. })
        ));
        assert!(parse_str("100Ei").unwrap().value().is_err());
    }

    #[test]
    fn format_decimal() {
        assert_eq!(format_quantity(0, Format::DecimalSI).0, "0");
        assert_eq!(format_quantity(2000, Format::DecimalSI).0, "2k");
        assert_eq!(format_quantity(1500, Format::DecimalSI).0, "1500");
        assert_eq!(format_quantity(3, Format::DecimalSI).0, "3");
    }

    #[test]
    fn format_binary() {
        assert_eq!(format_quantity(2 << 30, Format::BinarySI).0, "2Gi");
        assert_eq!(format_quantity(4 << 20, Format::BinarySI).0, "4Mi");
        assert_eq!(format_quantity(3000, Format::BinarySI).0, "3000");
        // Below 1024 the decimal form is used.
        assert_eq!(format_quantity(1000, Format::BinarySI).0, "1k");
        assert_eq!(format_quantity(110, Format::BinarySI).0, "110");
    }

    #[test]
    fn format_milli() {
        assert_eq!(format_milli_quantity(1500, Format::DecimalSI).0, "1500m");
        assert_eq!(format_milli_quantity(2000, Format::DecimalSI).0, "2");
        assert_eq!(format_milli_quantity(0, Format::DecimalSI).0, "0");
    }

    #[test]
    fn format_then_parse_keeps_value() {
        for milli_cpu in [1, 250, 1000, 3500, 64_000] {
            let q = format_milli_quantity(milli_cpu, Format::DecimalSI);
            assert_eq!(parse(&q).unwrap().milli_value().unwrap(), milli_cpu);
        }
    }
}
