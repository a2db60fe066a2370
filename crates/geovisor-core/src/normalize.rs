//! Category text normalisation for free-text crop types.
//!
//! Crop types are typed by field staff, so the same crop shows up as
//! "Café", "CAFE ", "café orgánico" and so on. Matching is done on a
//! normalised form with a substring test.
//!
//! # Normal form
//!
//! 1. Unicode NFD decomposition
//! 2. Combining marks dropped ("é" → "e", "ñ" → "n")
//! 3. Lowercase
//! 4. Surrounding whitespace trimmed

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Normalise a category value or search term.
pub fn normalize_category(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Substring classifier over a fixed list of category terms.
///
/// A text can match several terms; the classification is a set of tags,
/// not a partition.
#[derive(Debug, Clone)]
pub struct CategoryMatcher {
    terms: Vec<String>,
    normalized: Vec<String>,
}

impl CategoryMatcher {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        let terms: Vec<String> = terms.iter().map(|t| t.as_ref().to_string()).collect();
        let normalized = terms.iter().map(|t| normalize_category(t)).collect();
        Self { terms, normalized }
    }

    /// The terms as supplied by the caller.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Indices of every term contained in `text`.
    ///
    /// Terms that normalise to the empty string never match.
    pub fn matches(&self, text: &str) -> Vec<usize> {
        let text = normalize_category(text);
        self.normalized
            .iter()
            .enumerate()
            .filter(|(_, term)| !term.is_empty() && text.contains(term.as_str()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of the term, looked up by normalised form.
    pub fn position(&self, term: &str) -> Option<usize> {
        let term = normalize_category(term);
        self.normalized.iter().position(|t| *t == term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents() {
        assert_eq!(normalize_category("Café"), "cafe");
        assert_eq!(normalize_category("Piñón"), "pinon");
        assert_eq!(normalize_category("ÁRBOLES FRUTALES"), "arboles frutales");
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize_category("  Cacao \t"), "cacao");
    }

    #[test]
    fn empty_string() {
        assert_eq!(normalize_category(""), "");
        assert_eq!(normalize_category("   "), "");
    }

    #[test]
    fn precomposed_and_decomposed_agree() {
        // "é" as U+00E9 vs "e" + U+0301
        assert_eq!(normalize_category("caf\u{e9}"), normalize_category("cafe\u{301}"));
    }

    #[test]
    fn matcher_substring() {
        let m = CategoryMatcher::new(&["café", "cacao"]);
        assert_eq!(m.matches("CAFE ORGANICO"), vec![0]);
        assert_eq!(m.matches("Cacao fino de aroma"), vec![1]);
        assert!(m.matches("plátano").is_empty());
    }

    #[test]
    fn matcher_multi_tag() {
        let m = CategoryMatcher::new(&["cafe", "cacao"]);
        assert_eq!(m.matches("Asociado café - cacao"), vec![0, 1]);
    }

    #[test]
    fn empty_term_never_matches() {
        let m = CategoryMatcher::new(&["", "cacao"]);
        assert_eq!(m.matches("cacao"), vec![1]);
    }

    #[test]
    fn position_by_normal_form() {
        let m = CategoryMatcher::new(&["Café", "Cacao"]);
        assert_eq!(m.position("cafe"), Some(0));
        assert_eq!(m.position(" CACAO "), Some(1));
        assert_eq!(m.position("maiz"), None);
        assert_eq!(m.terms()[0], "Café");
    }
}
