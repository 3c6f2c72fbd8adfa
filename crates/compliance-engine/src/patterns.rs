//! Text normalisation and phrase matching for condition descriptors

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Anything that is not a letter, digit or slash separates words
    static ref SEPARATOR_PATTERN: Regex = Regex::new(r"[^a-z0-9/]+").unwrap();
}

/// Lower-case and collapse punctuation/whitespace into single spaces
///
/// "Salt-water  SPRAY!" becomes "salt water spray".
pub fn normalize_phrase(text: &str) -> String {
    let lower = text.to_lowercase();
    SEPARATOR_PATTERN
        .replace_all(&lower, " ")
        .trim()
        .to_string()
}

/// Split a normalised phrase into words
pub fn tokens(text: &str) -> Vec<String> {
    normalize_phrase(text)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when `needle` occurs in `haystack` as a contiguous run of whole words
pub fn contains_phrase(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phrase() {
        assert_eq!(normalize_phrase("Salt-water  SPRAY!"), "salt water spray");
        assert_eq!(normalize_phrase("  De-icing salts "), "de icing salts");
        assert_eq!(normalize_phrase("C30/37"), "c30/37");
    }

    #[test]
    fn test_contains_phrase_matches_whole_words() {
        let haystack = tokens("Concrete wall in the splash zone of a pier");
        assert!(contains_phrase(&haystack, &tokens("splash zone")));
        assert!(!contains_phrase(&haystack, &tokens("spray zone")));
        // "coast" must not match inside "coastal"
        let coastal = tokens("coastal promenade");
        assert!(!contains_phrase(&coastal, &tokens("coast")));
    }

    #[test]
    fn test_contains_phrase_empty_needle() {
        assert!(!contains_phrase(&tokens("anything"), &[]));
    }
}
