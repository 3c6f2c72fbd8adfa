// Numeric extraction utilities for values reported by the extraction adapters
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Leading decimal number, optionally after a comparison sign or qualifier;
    /// accepts a comma as decimal separator
    static ref NUMBER_PATTERN: Regex = Regex::new(
        r"(?i)^\s*(?:[<>=~≤≥]+|approx\.?|about|max\.?|min\.?|maximum|minimum)?\s*(-?\d+(?:[.,]\d+)?)"
    )
    .unwrap();
}

/// Extracts the leading number from text such as "20 mm", "0,45",
/// "≤ 0.50" or "approx. 2400 kg/m3". Text that does not start with a number
/// ("see note 4") yields `None`.
pub fn extract_number(text: &str) -> Option<f64> {
    let m = NUMBER_PATTERN.captures(text)?.get(1)?;
    let value = m.as_str().replace(',', ".").parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Reads a JSON number, or a number embedded in a JSON string
pub fn number_from_json(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => extract_number(s),
        _ => None,
    }
}

/// Canonical form of a grade label for lookups: upper-case, no whitespace
///
/// "c 30/37" and "C30/37" both become "C30/37".
pub fn normalize_grade_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Renders a JSON scalar for annotations
pub fn describe_raw(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_number() {
        assert_eq!(extract_number("20 mm"), Some(20.0));
        assert_eq!(extract_number("0,45"), Some(0.45));
        assert_eq!(extract_number("approx. 2400 kg/m3"), Some(2400.0));
        assert_eq!(extract_number("≤ 0.50"), Some(0.5));
        assert_eq!(extract_number("max. 32 mm"), Some(32.0));
        assert_eq!(extract_number("not stated"), None);
        assert_eq!(extract_number("see note 4"), None);
    }

    #[test]
    fn test_number_from_json() {
        assert_eq!(number_from_json(&json!(0.5)), Some(0.5));
        assert_eq!(number_from_json(&json!("300 kg/m3")), Some(300.0));
        assert_eq!(number_from_json(&json!(null)), None);
        assert_eq!(number_from_json(&json!(true)), None);
    }

    #[test]
    fn test_normalize_grade_label() {
        assert_eq!(normalize_grade_label("c 30/37"), "C30/37");
        assert_eq!(normalize_grade_label(" n32 "), "N32");
    }
}
