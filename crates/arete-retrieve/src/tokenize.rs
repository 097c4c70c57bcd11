//! Tokenization contract shared by the inverted index (C1), the
//! sparse-with-expansion scorer (C3), and dense query preprocessing (C5).
//!
//! Grounded on §4.1's tokenization contract and
//! `sparse_retrieval_service.py::_tokenize_text` (lowercase, `\b\w+\b`,
//! length-3 floor, ~30-word English stop list). Greek and Devanagari
//! technical terms (`eudaimonia`, `arete`, `phronesis`, …) must survive
//! unchanged — `\w` under Unicode mode already covers those ranges, so no
//! special-casing is needed beyond not stripping them.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

const MIN_TOKEN_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "shall", "can", "this", "that",
    "these", "those",
];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w]+").expect("static tokenizer regex is valid"))
}

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Lowercase, NFKC-normalize, split on word boundaries, drop tokens shorter
/// than 3 characters and common English stop words.
///
/// Returns an empty `Vec` for empty or entirely-stop-word text — this is a
/// valid (non-error) outcome; callers decide whether an empty term list is
/// itself an error (queries) or simply contributes nothing (indexed text).
pub fn tokenize(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();
    word_re()
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .filter(|tok| tok.chars().count() >= MIN_TOKEN_LEN && !stop_words().contains(tok.as_str()))
        .collect()
}

/// Greek code ranges used by the philosophical-glossary score booster (C5):
/// the main Greek/Coptic block and the Greek Extended block (polytonic
/// diacritics used in classical texts).
pub fn contains_greek(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c as u32, 0x0370..=0x03FF | 0x1F00..=0x1FFF))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_short_tokens_and_stop_words() {
        let toks = tokenize("The virtue of a good life");
        assert_eq!(toks, vec!["virtue", "good", "life"]);
    }

    #[test]
    fn lowercases_and_normalizes() {
        let toks = tokenize("VIRTUE Ethics");
        assert_eq!(toks, vec!["virtue", "ethics"]);
    }

    #[test]
    fn preserves_greek_terms() {
        let toks = tokenize("eudaimonia and \u{03b5}\u{03c5}\u{03b4}\u{03b1}\u{03b9}\u{03bc}\u{03bf}\u{03bd}\u{03af}\u{03b1}");
        assert!(toks.contains(&"eudaimonia".to_string()));
        assert!(toks.iter().any(|t| contains_greek(t)));
    }

    #[test]
    fn empty_text_yields_no_tokens() {
        assert!(tokenize("").is_empty());
    }
}
