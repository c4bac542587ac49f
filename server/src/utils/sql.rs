//! SQL utility functions

/// Escape SQL LIKE metacharacters (%, _, \) in user input
///
/// Patterns built from this must be compared with `LIKE ? ESCAPE '\'`.
///
/// # Example
///
/// ```
/// use mediashelf_server::utils::sql::escape_like_pattern;
///
/// let pattern = format!("%{}%", escape_like_pattern("100% match_test"));
/// assert_eq!(pattern, "%100\\% match\\_test%");
/// ```
pub fn escape_like_pattern(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Comma-separated `?` placeholders for an `IN (...)` list of `n` values
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Split free text into search words.
///
/// Whitespace separates words; a double-quoted run is kept as one phrase
/// with the quotes removed. Empty phrases are dropped.
pub fn search_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in s.chars() {
        match c {
            '"' => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .into_iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_pattern() {
        assert_eq!(escape_like_pattern("hello"), "hello");
        assert_eq!(escape_like_pattern("100%"), "100\\%");
        assert_eq!(escape_like_pattern("foo_bar"), "foo\\_bar");
        assert_eq!(escape_like_pattern("100%_\\test"), "100\\%\\_\\\\test");
        assert_eq!(escape_like_pattern(""), "");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }

    #[test]
    fn test_search_words_plain() {
        assert_eq!(search_words("red  car"), vec!["red", "car"]);
    }

    #[test]
    fn test_search_words_quoted_phrase() {
        assert_eq!(
            search_words(r#"beach "red car" sunset"#),
            vec!["beach", "red car", "sunset"]
        );
    }

    #[test]
    fn test_search_words_unterminated_quote() {
        assert_eq!(search_words(r#""open phrase"#), vec!["open phrase"]);
        assert!(search_words(r#""""#).is_empty());
    }
}
