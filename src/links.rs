//! URL scanning over normalized message text.
//!
//! This is a permissive heuristic, not a URL parser: anything that starts
//! with a known scheme and runs over URL-ish characters counts. Word
//! boundaries are ASCII only, so a scheme right after a non-ASCII letter
//! still starts a link.

use std::sync::LazyLock;

use regex::Regex;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?-u:\b)(?:https?|ftp|file)://[-A-Z0-9+&@#/%?=~_|!:,.;]*[-A-Z0-9+&@#/%=~_|]")
        .expect("URL pattern is valid")
});

/// Extract every URL-like substring, in order of first occurrence.
///
/// Trailing sentence punctuation (`!:,.;?`) is never part of a match.
/// Duplicates are kept.
pub fn extract_links(text: &str) -> Vec<String> {
    URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_comma_excluded() {
        assert_eq!(
            extract_links("Visit https://example.com/path?x=1, now!"),
            vec!["https://example.com/path?x=1"]
        );
    }

    #[test]
    fn no_links_is_empty_vec() {
        assert!(extract_links("nothing to see here").is_empty());
        assert!(extract_links("").is_empty());
    }

    #[test]
    fn all_schemes_case_insensitive() {
        let text = "a HTTP://Example.com b ftp://files.example.org/pub c file:///etc/hosts d https://x.io";
        assert_eq!(
            extract_links(text),
            vec![
                "HTTP://Example.com",
                "ftp://files.example.org/pub",
                "file:///etc/hosts",
                "https://x.io",
            ]
        );
    }

    #[test]
    fn trailing_punctuation_stripped() {
        assert_eq!(extract_links("see http://a.com/x."), vec!["http://a.com/x"]);
        assert_eq!(extract_links("see http://a.com/x;"), vec!["http://a.com/x"]);
        assert_eq!(extract_links("(http://a.com/x)"), vec!["http://a.com/x"]);
        assert_eq!(extract_links("ask http://a.com/x?"), vec!["http://a.com/x"]);
    }

    #[test]
    fn scheme_must_start_a_word() {
        assert!(extract_links("xhttp://a.com").is_empty());
        assert!(extract_links("mailto:a@b.com").is_empty());
        assert!(extract_links("https://").is_empty());
    }

    #[test]
    fn scheme_after_non_ascii_letter() {
        assert_eq!(extract_links("éhttp://a.com"), vec!["http://a.com"]);
        assert_eq!(extract_links("Läs mer:https://a.com/ö"), vec!["https://a.com/"]);
        assert!(extract_links("_http://a.com").is_empty());
    }

    #[test]
    fn duplicates_kept_in_order() {
        assert_eq!(
            extract_links("https://b.com https://a.com https://b.com"),
            vec!["https://b.com", "https://a.com", "https://b.com"]
        );
    }
}
