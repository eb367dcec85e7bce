// jsonagg-core/src/normalize.rs
//! Pipeline text normalization
//!
//! Pipeline specs are written the way they would be typed into a Mongo shell:
//!
//! ```text
//! { $match: { CreatedAt: { $gte: new Date(Date.now() - 7 * 24 * 60 * 60 * 1000) } } }
//! ```
//!
//! Two rewrites turn that into strict JSON for `serde_json`:
//!
//! 1. every `new Date(...)` call becomes a quoted ISO-8601 UTC string, and
//! 2. every bare object key is wrapped in double quotes.
//!
//! Neither rewrite touches text inside double-quoted string literals.

use crate::bracket::find_bracket_span;
use crate::date_literal::DateLiteralParser;
use crate::error::Result;
use crate::log_trace;
use chrono::SecondsFormat;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::ops::Range;

const DATE_CALL: &str = "Date(";

lazy_static! {
    /// A key after `{`, `,` or `[`, not quoted, followed by `:`
    static ref BARE_KEY: Regex =
        Regex::new(r#"([\{,\[]\s*)([^\[\]\{\}:,"'\s]+)(\s*:)"#).expect("bare key pattern");
}

/// Rewrite permissive pipeline text into strict JSON text
///
/// ```
/// use jsonagg_core::date_literal::ScriptDateParser;
/// use jsonagg_core::normalize::normalize;
///
/// let json = normalize("{ $match: { age: { $eq: 30 } } }", &ScriptDateParser::new()).unwrap();
/// assert_eq!(json, r#"{ "$match": { "age": { "$eq": 30 } } }"#);
/// ```
pub fn normalize(spec: &str, dates: &dyn DateLiteralParser) -> Result<String> {
    let replaced = replace_date_literals(spec, dates)?;
    Ok(quote_bare_keys(&replaced))
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Byte ranges of double-quoted string literals, quotes included. An
/// unterminated literal runs to the end of the text.
fn quoted_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open: Option<usize> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        match open {
            Some(start) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    ranges.push(start..i + 1);
                    open = None;
                }
            }
            None if c == '"' => open = Some(i),
            None => {}
        }
    }
    if let Some(start) = open {
        ranges.push(start..text.len());
    }
    ranges
}

fn is_quoted(ranges: &[Range<usize>], at: usize) -> bool {
    let after = ranges.partition_point(|range| range.start <= at);
    after > 0 && ranges[after - 1].contains(&at)
}

/// Offsets of `Date(` that start a call: outside string literals and not
/// the tail of a longer identifier such as `UpdateDate(`.
fn date_call_sites(text: &str) -> Vec<usize> {
    let quoted = quoted_ranges(text);
    text.match_indices(DATE_CALL)
        .map(|(at, _)| at)
        .filter(|&at| !is_quoted(&quoted, at))
        .filter(|&at| {
            !text[..at]
                .chars()
                .next_back()
                .is_some_and(|c| is_identifier_char(c) || c == '.')
        })
        .collect()
}

/// Replace each `new Date(...)` (or bare `Date(...)`) call with a quoted timestamp.
///
/// Calls are rewritten right to left so earlier offsets stay valid. A call
/// whose parentheses do not balance is left as is; the JSON parse that
/// follows reports it.
pub fn replace_date_literals(spec: &str, dates: &dyn DateLiteralParser) -> Result<String> {
    let mut text = spec.to_string();

    for at in date_call_sites(spec).into_iter().rev() {
        let Some(span) = find_bracket_span(&text[at..], DATE_CALL)? else {
            continue;
        };
        let end = at + span.end;
        let script = &text[at + DATE_CALL.len()..end - 1];
        let instant = dates.parse_date_literal(script)?;
        let literal = format!("\"{}\"", instant.to_rfc3339_opts(SecondsFormat::Millis, true));

        let start = call_start(&text, at);
        log_trace!("Date literal '{}' -> {}", &text[start..end], literal);
        text.replace_range(start..end, &literal);
    }

    Ok(text)
}

/// Start of the call expression: include a preceding `new` keyword
fn call_start(text: &str, date_at: usize) -> usize {
    let before = &text[..date_at];
    let trimmed = before.trim_end();
    if trimmed.len() == before.len() {
        return date_at;
    }
    match trimmed.strip_suffix("new") {
        Some(rest) if !rest.chars().last().is_some_and(is_identifier_char) => rest.len(),
        _ => date_at,
    }
}

/// Wrap unquoted object keys in double quotes. Keys may be any Unicode text
/// without whitespace or JSON structural characters; look-alikes inside string
/// values (`"a, b: c"`) are left alone.
pub fn quote_bare_keys(text: &str) -> String {
    let quoted = quoted_ranges(text);
    BARE_KEY
        .replace_all(text, |caps: &Captures| {
            let whole = &caps[0];
            if caps.get(0).is_some_and(|m| is_quoted(&quoted, m.start())) {
                whole.to_string()
            } else {
                format!("{}\"{}\"{}", &caps[1], &caps[2], &caps[3])
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_literal::ScriptDateParser;
    use crate::error::JsonAggError;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn dates() -> ScriptDateParser {
        ScriptDateParser::with_now(Utc.with_ymd_and_hms(2024, 4, 25, 12, 0, 0).unwrap())
    }

    fn normalize_to_value(spec: &str) -> Value {
        serde_json::from_str(&normalize(spec, &dates()).unwrap()).unwrap()
    }

    #[test]
    fn test_quote_bare_keys() {
        assert_eq!(
            normalize_to_value("{ $match: { age: { $gt: 30 } } }"),
            json!({"$match": {"age": {"$gt": 30}}})
        );
    }

    #[test]
    fn test_already_quoted_keys_untouched() {
        let spec = r#"{ "$match": { "contacts.email": { "$eq": "alice@example.com" } } }"#;
        assert_eq!(quote_bare_keys(spec), spec);
    }

    #[test]
    fn test_mixed_quoting_and_dotted_keys() {
        assert_eq!(
            normalize_to_value(r#"{ $match: { contacts.email: { "$eq": "a@b.c" } }, "$limit": 1 }"#),
            json!({"$match": {"contacts.email": {"$eq": "a@b.c"}}, "$limit": 1})
        );
    }

    #[test]
    fn test_single_character_and_unicode_keys() {
        assert_eq!(normalize_to_value("{a:1,b:{c:2}}"), json!({"a": 1, "b": {"c": 2}}));
        assert_eq!(
            normalize_to_value("{ $match: { 이름: { $eq: \"앨리스\" } } }"),
            json!({"$match": {"이름": {"$eq": "앨리스"}}})
        );
    }

    #[test]
    fn test_keys_inside_arrays() {
        assert_eq!(
            normalize_to_value("[ { $match: { age: { $gt: 1 } } }, { $limit: 2 } ]"),
            json!([{"$match": {"age": {"$gt": 1}}}, {"$limit": 2}])
        );
    }

    #[test]
    fn test_string_values_with_colons_untouched() {
        assert_eq!(
            normalize_to_value(r#"{ $match: { at: { $gte: "2024-04-16T00:00:00Z" } } }"#),
            json!({"$match": {"at": {"$gte": "2024-04-16T00:00:00Z"}}})
        );
    }

    #[test]
    fn test_relative_date_call() {
        let value = normalize_to_value(
            "{ $match: { CreatedAt: { $gte: new Date(Date.now() - 7 * 24 * 60 * 60 * 1000) } } }",
        );
        assert_eq!(
            value,
            json!({"$match": {"CreatedAt": {"$gte": "2024-04-18T12:00:00.000Z"}}})
        );
    }

    #[test]
    fn test_multiple_date_calls() {
        let value = normalize_to_value(
            r#"{ $match: { CreatedAt: { $gte: new Date("2023-01-01T00:00:00Z"), $lt: new Date("2024-01-01T00:00:00Z") } } }"#,
        );
        assert_eq!(
            value,
            json!({"$match": {"CreatedAt": {
                "$gte": "2023-01-01T00:00:00.000Z",
                "$lt": "2024-01-01T00:00:00.000Z"
            }}})
        );
    }

    #[test]
    fn test_date_call_without_new() {
        assert_eq!(
            normalize_to_value("{ at: Date(\"2024-02-03\") }"),
            json!({"at": "2024-02-03T00:00:00.000Z"})
        );
    }

    #[test]
    fn test_call_start_keeps_identifiers() {
        assert_eq!(call_start("{ x: new Date(", 9), 5);
        assert_eq!(call_start("{ x: renew Date(", 11), 11);
        assert_eq!(call_start("{ x: newDate(", 8), 8);
    }

    #[test]
    fn test_date_parser_error_propagates() {
        let err = normalize("{ at: new Date(\"yesterday-ish\") }", &dates()).unwrap_err();
        assert!(matches!(err, JsonAggError::DateLiteral(_)));
    }

    #[test]
    fn test_quoted_ranges() {
        let text = r#"{ "a": "x \" y", b: "open"#;
        assert_eq!(quoted_ranges(text), vec![2..5, 7..15, 20..text.len()]);
        assert!(is_quoted(&quoted_ranges(text), 9));
        assert!(!is_quoted(&quoted_ranges(text), 17));
    }

    #[test]
    fn test_date_text_inside_strings_untouched() {
        assert_eq!(
            normalize_to_value(r#"{ $match: { f: { $eq: "UpdateDate(x)" } } }"#),
            json!({"$match": {"f": {"$eq": "UpdateDate(x)"}}})
        );
        assert_eq!(
            normalize_to_value(r#"{ $match: { f: { $eq: "see new Date(soon" } } }"#),
            json!({"$match": {"f": {"$eq": "see new Date(soon"}}})
        );
    }

    #[test]
    fn test_date_call_after_string_mentioning_date() {
        assert_eq!(
            normalize_to_value(r#"{ note: "Date(", at: new Date("2024-02-03"), by: Date(0) }"#),
            json!({"note": "Date(", "at": "2024-02-03T00:00:00.000Z", "by": "1970-01-01T00:00:00.000Z"})
        );
    }

    #[test]
    fn test_identifier_suffix_is_not_a_date_call() {
        let spec = "{ f: UpdateDate(1), g: x.Date(2) }";
        assert_eq!(replace_date_literals(spec, &dates()).unwrap(), spec);
    }

    #[test]
    fn test_key_lookalikes_inside_strings_untouched() {
        assert_eq!(
            normalize_to_value(r#"{ $match: { f: { $eq: "a, bb: c" }, g: "{x: 1}" } }"#),
            json!({"$match": {"f": {"$eq": "a, bb: c"}, "g": "{x: 1}"}})
        );
        assert_eq!(
            normalize_to_value(r#"{ f: "say \"hi\", k: v", n: 1 }"#),
            json!({"f": "say \"hi\", k: v", "n": 1})
        );
    }

    #[test]
    fn test_unbalanced_date_call_left_alone() {
        let text = normalize("{ at: new Date(1 }", &dates()).unwrap();
        assert!(text.contains("new Date(1"));
        assert!(serde_json::from_str::<Value>(&text).is_err());
    }
}
