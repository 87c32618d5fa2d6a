//! Numeric literals.
//!
//! Two dialects share one mantissa grammar,
//! `[-+]?[0-9]*\.?[0-9]+([eE][-+]?[0-9]+)?`:
//!
//! - Model-description text accepts an SI scale suffix
//!   (`T G M k m u n p f`, case-sensitive) followed by any unit letters,
//!   which are ignored: `3.3V` is 3.3, `10pF` is 1e-11, `1.2mA` is 1.2e-3.
//! - Parameter text accepts the bare mantissa only.
//!
//! Values are scaled to base units as they are parsed.

use nom::{
    branch::alt,
    character::complete::{alpha0, char, digit0, digit1, one_of, satisfy},
    combinator::{opt, recognize},
    error::{Error, ErrorKind},
    IResult, Parser,
};

/// Scale factor for an SI suffix character.
pub fn si_multiplier(c: char) -> Option<f64> {
    match c {
        'T' => Some(1e12),
        'G' => Some(1e9),
        'M' => Some(1e6),
        'k' => Some(1e3),
        'm' => Some(1e-3),
        'u' => Some(1e-6),
        'n' => Some(1e-9),
        'p' => Some(1e-12),
        'f' => Some(1e-15),
        _ => None,
    }
}

/// Recognize a decimal mantissa with optional exponent.
pub fn mantissa(input: &str) -> IResult<&str, &str> {
    recognize((
        opt(one_of("+-")),
        alt((recognize((digit0, char('.'), digit1)), digit1)),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)
}

/// A mantissa with optional SI suffix and ignored unit letters.
pub fn eng_number(input: &str) -> IResult<&str, f64> {
    let (rest, text) = mantissa(input)?;
    let value: f64 = text
        .parse()
        .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Float)))?;
    let (rest, suffix) = opt(satisfy(|c: char| si_multiplier(c).is_some())).parse(rest)?;
    let (rest, _units) = alpha0(rest)?;
    let scale = suffix.and_then(si_multiplier).unwrap_or(1.0);
    Ok((rest, value * scale))
}

/// Parse a whole token as an engineering number.
pub fn parse_eng(token: &str) -> Option<f64> {
    match eng_number(token) {
        Ok(("", v)) => Some(v),
        _ => None,
    }
}

/// Parse a whole token of the form `a/b` (as in `dV/dt` rows), where both
/// sides are engineering numbers.
pub fn parse_ratio(token: &str) -> Option<f64> {
    let (num, den) = token.split_once('/')?;
    let num = parse_eng(num)?;
    let den = parse_eng(den)?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Parse a whole token as a bare mantissa (no suffix, no units).
pub fn parse_plain(token: &str) -> Option<f64> {
    match mantissa(token) {
        Ok(("", text)) => text.parse().ok(),
        _ => None,
    }
}

/// Parse a whole token as an integer. Integral decimals such as `3.0` or
/// `1e2` are accepted; `3.5` is not.
pub fn parse_integer(token: &str) -> Option<i64> {
    if let Ok(v) = token.parse::<i64>() {
        return Some(v);
    }
    let v = parse_plain(token)?;
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// True if the token is written as an integer (optional sign, digits only).
pub fn is_integer_literal(token: &str) -> bool {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * b.abs().max(1e-30)
    }

    #[test]
    fn test_si_suffixes() {
        assert!(close(parse_eng("1.5m").unwrap(), 1.5e-3));
        assert!(close(parse_eng("100n").unwrap(), 100e-9));
        assert!(close(parse_eng("10k").unwrap(), 10e3));
        assert!(close(parse_eng("2M").unwrap(), 2e6));
        assert!(close(parse_eng("4p").unwrap(), 4e-12));
    }

    #[test]
    fn test_units_ignored() {
        assert!(close(parse_eng("3.3V").unwrap(), 3.3));
        assert!(close(parse_eng("10pF").unwrap(), 10e-12));
        assert!(close(parse_eng("-1.2mA").unwrap(), -1.2e-3));
    }

    #[test]
    fn test_exponent_and_leading_dot() {
        assert!(close(parse_eng("1e-3").unwrap(), 1e-3));
        assert!(close(parse_eng(".5").unwrap(), 0.5));
        assert!(close(parse_eng("+2.5E2").unwrap(), 250.0));
    }

    #[test]
    fn test_rejects_partial_tokens() {
        assert_eq!(parse_eng("3."), None);
        assert_eq!(parse_eng("1.2.3"), None);
        assert_eq!(parse_eng("NA"), None);
        assert_eq!(parse_eng("1N4148"), None);
        assert_eq!(parse_eng(""), None);
    }

    #[test]
    fn test_ratio() {
        assert!(close(parse_ratio("1.2/0.5n").unwrap(), 2.4e9));
        assert_eq!(parse_ratio("dV/dt_r"), None);
        assert_eq!(parse_ratio("1/0"), None);
    }

    #[test]
    fn test_plain_and_integer() {
        assert_eq!(parse_plain("1e-5"), Some(1e-5));
        assert_eq!(parse_plain("3p"), None);
        assert_eq!(parse_integer("-42"), Some(-42));
        assert_eq!(parse_integer("3.0"), Some(3));
        assert_eq!(parse_integer("3.5"), None);
        assert!(is_integer_literal("+7"));
        assert!(!is_integer_literal("7.0"));
        assert!(!is_integer_literal("-"));
    }
}
