//! Whitespace-insensitive text comparison.
//!
//! Used as the cheap first gate of a cycle: when the new report only differs
//! from the snapshot by spacing or line breaks, nothing else runs.

/// Collapse every run of whitespace (newlines included) into a single space
/// and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether two texts are equal once whitespace is collapsed.
pub fn normalize_equal(a: &str, b: &str) -> bool {
    // Compare word by word so neither side is allocated
    a.split_whitespace().eq(b.split_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\n b\t c  "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
        assert_eq!(collapse_whitespace(" \n\t "), "");
    }

    #[test]
    fn test_reflexive_and_symmetric() {
        let a = "1) Alpha\nFoo (Source: X)";
        let b = "1) Alpha  Foo\n(Source: X)";
        assert!(normalize_equal(a, a));
        assert!(normalize_equal(a, b));
        assert!(normalize_equal(b, a));
    }

    #[test]
    fn test_invariant_under_extra_whitespace() {
        let base = "1) Alpha\nFoo bar baz\n\n2) Beta\nQux";
        let padded = "\n\n  1)   Alpha \r\n Foo  bar\tbaz \n\n\n\n 2) Beta\n   Qux \n";
        assert!(normalize_equal(base, padded));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(normalize_equal("", ""));
        assert!(normalize_equal("", "  \n "));
        assert!(!normalize_equal("", "x"));
    }

    #[test]
    fn test_detects_word_changes() {
        assert!(!normalize_equal("Bar (Source: Y)", "Baz (Source: Y)"));
        // Whitespace inside a word is not collapsible
        assert!(!normalize_equal("foobar", "foo bar"));
    }
}
