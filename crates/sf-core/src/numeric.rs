use crate::CoreError;

/// Floating point type used throughout system
pub type Real = f64;

/// Pass `v` through when it is finite.
pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Parse a state string as a number, never failing.
///
/// Leading/trailing whitespace is ignored. Anything that does not parse to a
/// finite number yields `default`.
pub fn parse_or(text: &str, default: Real) -> Real {
    parse_finite(text).unwrap_or(default)
}

/// Parse a state string as a finite number.
pub fn parse_finite(text: &str) -> Option<Real> {
    text.trim().parse::<Real>().ok().filter(|v| v.is_finite())
}

/// Fall back to `default` when a configured value is absent or non-finite.
pub fn coerce_or(value: Option<Real>, default: Real) -> Real {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn parse_or_falls_back() {
        assert_eq!(parse_or("12.5", 0.0), 12.5);
        assert_eq!(parse_or(" 7 ", 0.0), 7.0);
        assert_eq!(parse_or("unavailable", 3.0), 3.0);
        assert_eq!(parse_or("", 3.0), 3.0);
        assert_eq!(parse_or("NaN", 1.0), 1.0);
        assert_eq!(parse_or("inf", 1.0), 1.0);
    }

    #[test]
    fn coerce_or_rejects_non_finite() {
        assert_eq!(coerce_or(Some(2.0), 9.0), 2.0);
        assert_eq!(coerce_or(None, 9.0), 9.0);
        assert_eq!(coerce_or(Some(Real::INFINITY), 9.0), 9.0);
    }
}
