// jsonagg-core/src/bracket.rs
//! Balanced-bracket scanning
//!
//! Finds the full extent of a call or literal such as `Date(...)` by counting
//! depth over a single bracket pair. Other bracket kinds and quoted text are
//! not treated specially.

use crate::error::{JsonAggError, Result};
use std::ops::Range;

fn closing_bracket(opening: char) -> Option<char> {
    match opening {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        _ => None,
    }
}

/// Byte index of the bracket closing the one at `open_at`, or `None` if unbalanced
fn find_matching_bracket(input: &str, open_at: usize, opening: u8, closing: u8) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, byte) in input.as_bytes()[open_at + 1..].iter().enumerate() {
        if *byte == opening {
            depth += 1;
        } else if *byte == closing {
            depth -= 1;
            if depth == 0 {
                return Some(open_at + 1 + offset);
            }
        }
    }
    None
}

/// Locate the first `keyword` in `input` and return the byte span from the
/// keyword's start through its matching closing bracket (inclusive).
///
/// The keyword's last character selects the bracket pair and must be one of
/// `(`, `[` or `{`.
///
/// ```
/// use jsonagg_core::bracket::find_bracket_span;
///
/// let text = "x = Date(f(1), 2) + 1";
/// let span = find_bracket_span(text, "Date(").unwrap().unwrap();
/// assert_eq!(&text[span], "Date(f(1), 2)");
/// ```
pub fn find_bracket_span(input: &str, keyword: &str) -> Result<Option<Range<usize>>> {
    let opening = keyword
        .chars()
        .last()
        .ok_or_else(|| JsonAggError::InvalidKeyword("keyword is empty".to_string()))?;
    let closing = closing_bracket(opening).ok_or_else(|| {
        JsonAggError::InvalidKeyword(format!(
            "'{}' must end with '(', '[', or '{{'",
            keyword
        ))
    })?;

    let Some(start) = input.find(keyword) else {
        return Ok(None);
    };

    let open_at = start + keyword.len() - 1;
    Ok(
        find_matching_bracket(input, open_at, opening as u8, closing as u8)
            .map(|end| start..end + 1),
    )
}

/// Return the bracketed content following `keyword`.
///
/// With `include_keyword` the result spans the keyword through the closing
/// bracket; otherwise only the text between the brackets is returned.
pub fn find_bracket_content<'a>(
    input: &'a str,
    keyword: &str,
    include_keyword: bool,
) -> Result<Option<&'a str>> {
    let Some(span) = find_bracket_span(input, keyword)? else {
        return Ok(None);
    };

    if include_keyword {
        Ok(Some(&input[span]))
    } else {
        let inner_start = span.start + keyword.len();
        let inner_end = span.end - 1;
        Ok(Some(&input[inner_start..inner_end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_with_keyword() {
        let input = "{ $gte: new Date(Date.now() - 7 * (24 * 60) * 60 * 1000) }";
        let found = find_bracket_content(input, "new Date(", true).unwrap();
        assert_eq!(found, Some("new Date(Date.now() - 7 * (24 * 60) * 60 * 1000)"));
    }

    #[test]
    fn test_find_without_keyword() {
        let input = "call(a(b), c)";
        let found = find_bracket_content(input, "call(", false).unwrap();
        assert_eq!(found, Some("a(b), c"));
    }

    #[test]
    fn test_square_and_curly_keywords() {
        let input = r#"{"items": [[1, 2], [3]], "x": 1}"#;
        assert_eq!(
            find_bracket_content(input, "\"items\": [", false).unwrap(),
            Some("[1, 2], [3]")
        );
        assert_eq!(find_bracket_content(input, "{", true).unwrap(), Some(input));
    }

    #[test]
    fn test_other_bracket_kinds_are_ignored() {
        // Only parentheses are counted for a '(' keyword
        let input = "f([)], 1)";
        assert_eq!(find_bracket_content(input, "f(", true).unwrap(), Some("f([)"));
    }

    #[test]
    fn test_missing_keyword() {
        assert_eq!(find_bracket_content("no call here", "Date(", true).unwrap(), None);
    }

    #[test]
    fn test_unbalanced_brackets() {
        assert_eq!(find_bracket_content("Date(1, (2)", "Date(", true).unwrap(), None);
    }

    #[test]
    fn test_empty_brackets() {
        assert_eq!(find_bracket_content("new Date()", "Date(", false).unwrap(), Some(""));
    }

    #[test]
    fn test_unicode_around_brackets() {
        let input = "{ 생성일: Date(\"2024-01-01\") }";
        assert_eq!(
            find_bracket_content(input, "Date(", false).unwrap(),
            Some("\"2024-01-01\"")
        );
    }

    #[test]
    fn test_invalid_keyword() {
        let err = find_bracket_span("abc", "Date").unwrap_err();
        assert!(matches!(err, JsonAggError::InvalidKeyword(_)));
        assert!(find_bracket_span("abc", "").is_err());
    }
}
