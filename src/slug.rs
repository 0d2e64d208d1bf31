//! Slug generation and the title patterns used to find stories by a
//! loosely typed identifier.
//!
//! Patterns are POSIX-flavoured regular expressions that both PostgreSQL
//! (`~*`) and the `regex` crate accept, so the same string can be sent to
//! the database or evaluated in-process.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Matches a single hyphen or whitespace character.
const HYPHEN_OR_SPACE: &str = "[-[:space:]]";

/// Matches a single whitespace character.
const SPACE: &str = "[[:space:]]";

/// Build a URL slug from a title or category name.
///
/// The text is lowercased, diacritics are folded away (`đ` becomes `d`),
/// whitespace runs become a single `-`, and punctuation is dropped.
/// Letters outside the Latin range are kept as-is.
///
/// ```
/// use novelread_backend::slug::slugify;
/// assert_eq!(slugify("Tiên Hiệp Ký"), "tien-hiep-ky");
/// ```
pub fn slugify(input: &str) -> String {
    let folded: String = input
        .to_lowercase()
        .replace('đ', "d")
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut slug = String::with_capacity(folded.len());
    for c in folded.chars() {
        if c.is_alphanumeric() || c == '_' {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-') && !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Pattern matching a title where every `-` of `input` may be a hyphen or
/// a whitespace character. Everything else is matched literally.
pub fn title_pattern(input: &str) -> String {
    join_escaped(input, HYPHEN_OR_SPACE)
}

/// Pattern matching a title whose words are the hyphen-separated parts of
/// `slug`, separated by whitespace.
pub fn spaced_slug_pattern(slug: &str) -> String {
    join_escaped(slug, SPACE)
}

/// Pattern matching any title that contains `input` literally.
pub fn contains_pattern(input: &str) -> String {
    regex::escape(input)
}

/// Pattern matching any title that contains one of the significant words
/// (three characters or more) of `input`. `None` when there are none.
pub fn any_word_pattern(input: &str) -> Option<String> {
    let mut words: Vec<String> = Vec::new();
    for word in input.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() >= 3 && !words.contains(&word) {
            words.push(word);
        }
    }
    if words.is_empty() {
        return None;
    }
    Some(
        words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

fn join_escaped(input: &str, separator: &str) -> String {
    input
        .split('-')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    fn matches(pattern: &str, text: &str) -> bool {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .unwrap()
            .is_match(text)
    }

    #[test]
    fn test_slugify_folds_vietnamese_diacritics() {
        assert_eq!(slugify("Tiên Hiệp Ký"), "tien-hiep-ky");
        assert_eq!(slugify("Đấu Phá Thương Khung"), "dau-pha-thuong-khung");
        assert_eq!(slugify("Ngự Thú Sư"), "ngu-thu-su");
    }

    #[test]
    fn test_slugify_collapses_separators_and_drops_punctuation() {
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_slugify_keeps_non_latin_letters() {
        assert_eq!(slugify("斗破 苍穹"), "斗破-苍穹");
    }

    #[test]
    fn test_slugify_is_idempotent() {
        let once = slugify("Tiên Hiệp Ký");
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn test_title_pattern_treats_hyphen_as_hyphen_or_space() {
        let pattern = title_pattern("the-long-road");
        assert!(matches(&pattern, "The Long Road"));
        assert!(matches(&pattern, "the-long road"));
        assert!(!matches(&pattern, "the_long_road"));
    }

    #[test]
    fn test_title_pattern_escapes_regex_metacharacters() {
        let pattern = title_pattern("c++ (remastered)");
        assert!(matches(&pattern, "C++ (Remastered)"));
        assert!(!matches(&pattern, "ccc remastered"));
    }

    #[test]
    fn test_spaced_slug_pattern_requires_whitespace() {
        let pattern = spaced_slug_pattern("tien-hiep");
        assert!(matches(&pattern, "Tien Hiep Ky"));
        assert!(!matches(&pattern, "tien-hiep"));
    }

    #[test]
    fn test_any_word_pattern_matches_any_significant_word() {
        let pattern = any_word_pattern("moon-of the Lost").unwrap();
        assert_eq!(pattern, "moon|the|lost");
        assert!(matches(&pattern, "Lost Kingdom"));
        assert!(!matches(&pattern, "Sun"));
        assert_eq!(any_word_pattern("a b -- ?"), None);
    }

    #[test]
    fn test_contains_pattern_is_literal() {
        let pattern = contains_pattern("a.b");
        assert!(matches(&pattern, "xxA.Byy"));
        assert!(!matches(&pattern, "aXb"));
    }
}
