//! Kubernetes quantity parsing
//!
//! CPU resolves to millicores, memory to bytes. Decimal suffixes are scaled by
//! dividing or multiplying powers of ten so common values (`150m`, `2500000n`)
//! come out exact.

use crate::error::MalformedDataError;

/// Largest decimal exponent accepted; anything beyond leaves the f64 range
const MAX_EXPONENT: i32 = 308;

/// Scale carried by a quantity suffix
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scale {
    /// 10^n
    Decimal(i32),
    /// 1024^n
    Binary(i32),
}

/// Split `raw` into its numeric mantissa and scale
fn parse_quantity(raw: &str) -> Option<(f64, Scale)> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('+').unwrap_or(raw);

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);

    if number.is_empty() || number == "." || number.matches('.').count() > 1 {
        return None;
    }
    let mantissa: f64 = number.parse().ok()?;

    let scale = match suffix {
        "" => Scale::Decimal(0),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        "Ki" => Scale::Binary(1),
        "Mi" => Scale::Binary(2),
        "Gi" => Scale::Binary(3),
        "Ti" => Scale::Binary(4),
        "Pi" => Scale::Binary(5),
        "Ei" => Scale::Binary(6),
        s if s.starts_with(|c: char| c == 'e' || c == 'E') => {
            let exp: i32 = s[1..].parse().ok()?;
            if !(-MAX_EXPONENT..=MAX_EXPONENT).contains(&exp) {
                return None;
            }
            Scale::Decimal(exp)
        }
        _ => return None,
    };

    Some((mantissa, scale))
}

/// Express a parsed quantity in units of 10^`unit_exp`
fn to_unit(mantissa: f64, scale: Scale, unit_exp: i32) -> f64 {
    match scale {
        Scale::Decimal(exp) => {
            let shift = exp - unit_exp;
            if shift >= 0 {
                mantissa * 10f64.powi(shift)
            } else {
                mantissa / 10f64.powi(-shift)
            }
        }
        Scale::Binary(exp) => {
            let binary = mantissa * 1024f64.powi(exp);
            if unit_exp >= 0 {
                binary / 10f64.powi(unit_exp)
            } else {
                binary * 10f64.powi(-unit_exp)
            }
        }
    }
}

/// Parse a CPU quantity into millicores
pub fn parse_cpu_millicores(raw: &str) -> Result<f64, MalformedDataError> {
    let invalid = || MalformedDataError::InvalidQuantity {
        metric: "cpu",
        raw: raw.to_string(),
    };

    let (mantissa, scale) = parse_quantity(raw).ok_or_else(invalid)?;
    let millicores = to_unit(mantissa, scale, -3);

    if millicores.is_finite() {
        Ok(millicores)
    } else {
        Err(invalid())
    }
}

/// Parse a memory quantity into bytes
pub fn parse_memory_bytes(raw: &str) -> Result<u64, MalformedDataError> {
    let invalid = || MalformedDataError::InvalidQuantity {
        metric: "memory",
        raw: raw.to_string(),
    };

    let (mantissa, scale) = parse_quantity(raw).ok_or_else(invalid)?;
    let bytes = to_unit(mantissa, scale, 0).round();

    if bytes.is_finite() && bytes <= u64::MAX as f64 {
        Ok(bytes as u64)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_suffixes() {
        assert_eq!(parse_cpu_millicores("150m").unwrap(), 150.0);
        assert_eq!(parse_cpu_millicores("2").unwrap(), 2000.0);
        assert_eq!(parse_cpu_millicores("0.5").unwrap(), 500.0);
        assert_eq!(parse_cpu_millicores("2500000n").unwrap(), 2.5);
        assert_eq!(parse_cpu_millicores("1500u").unwrap(), 1.5);
        assert_eq!(parse_cpu_millicores("0").unwrap(), 0.0);
    }

    #[test]
    fn test_memory_suffixes() {
        assert_eq!(parse_memory_bytes("256Mi").unwrap(), 268_435_456);
        assert_eq!(parse_memory_bytes("1024Ki").unwrap(), 1_048_576);
        assert_eq!(parse_memory_bytes("1.5Gi").unwrap(), 1_610_612_736);
        assert_eq!(parse_memory_bytes("128974848").unwrap(), 128_974_848);
        assert_eq!(parse_memory_bytes("129M").unwrap(), 129_000_000);
        assert_eq!(parse_memory_bytes("12e6").unwrap(), 12_000_000);
        assert_eq!(parse_memory_bytes("1E").unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_rejects_garbage() {
        for raw in ["", "m", "abc", "-5m", "1.2.3", "10Xi", "12e"] {
            assert!(parse_cpu_millicores(raw).is_err(), "accepted cpu {raw:?}");
            assert!(parse_memory_bytes(raw).is_err(), "accepted memory {raw:?}");
        }
    }

    #[test]
    fn test_out_of_range_exponents_are_rejected() {
        for raw in ["1e2147483647", "1e-2147483648", "1e309", "1E-400"] {
            assert!(parse_cpu_millicores(raw).is_err(), "accepted cpu {raw:?}");
            assert!(parse_memory_bytes(raw).is_err(), "accepted memory {raw:?}");
        }
        // In range but past f64 once scaled to millicores
        assert!(parse_cpu_millicores("1e308").is_err());
        assert_eq!(parse_memory_bytes("2e3").unwrap(), 2000);
    }

    #[test]
    fn test_error_carries_raw_value() {
        let err = parse_memory_bytes("lots").unwrap_err();
        assert_eq!(
            err,
            MalformedDataError::InvalidQuantity {
                metric: "memory",
                raw: "lots".to_string()
            }
        );
    }
}
