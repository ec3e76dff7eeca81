//! Parsing of judge responses into confidence values.
//!
//! A judge is asked to reply with a bare number. Replies that cannot be read
//! as one are a parse failure; the caller treats those as confidence 0
//! ("could not confirm correctness"), never as a hard error.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// A lone number, optionally labelled `Score:` and optionally ending in a period.
    static ref CONFIDENCE_PATTERN: Regex = Regex::new(
        r"(?i)^\s*(?:score\s*[:=]\s*)?([+-]?(?:\d+(?:\.\d*)?|\.\d+))\s*\.?\s*$"
    ).unwrap();
}

/// Extract a confidence in [0, 1] from a judge reply.
///
/// Returns `None` when the reply is not a number. Out-of-range numbers are
/// clamped.
pub fn parse_confidence(reply: &str) -> Option<f64> {
    let captures = CONFIDENCE_PATTERN.captures(reply)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 1.0))
}

/// Like [`parse_confidence`], mapping parse failures to 0.
pub fn confidence_or_zero(reply: &str) -> f64 {
    parse_confidence(reply).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_numbers() {
        assert_eq!(parse_confidence("0.85"), Some(0.85));
        assert_eq!(parse_confidence("  1 \n"), Some(1.0));
        assert_eq!(parse_confidence(".5"), Some(0.5));
        assert_eq!(parse_confidence("0."), Some(0.0));
    }

    #[test]
    fn test_labelled_and_trailing_period() {
        assert_eq!(parse_confidence("Score: 0.7"), Some(0.7));
        assert_eq!(parse_confidence("score=0.2."), Some(0.2));
    }

    #[test]
    fn test_clamped() {
        assert_eq!(parse_confidence("1.4"), Some(1.0));
        assert_eq!(parse_confidence("-0.3"), Some(0.0));
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_confidence(""), None);
        assert_eq!(parse_confidence("very confident"), None);
        assert_eq!(parse_confidence("0.8 because the answer is right"), None);
        assert_eq!(parse_confidence("8/10"), None);
        assert_eq!(confidence_or_zero("n/a"), 0.0);
    }
}
