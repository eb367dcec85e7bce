// jsonagg-core/src/date_literal.rs
//! Date literals
//!
//! Two pieces live here:
//!
//! - [`DateLiteralParser`], the seam the literal normalizer calls with the text
//!   found between `Date(` and its closing parenthesis, and
//!   [`ScriptDateParser`], the default implementation that understands the
//!   JavaScript forms people actually write in pipeline specs:
//!
//!   ```text
//!   new Date()                                  // now
//!   new Date("2024-01-01T00:00:00Z")            // date text
//!   new Date(Date.now() - 7 * 24 * 60 * 60 * 1000)
//!   new Date(1704067200000)                     // epoch millis
//!   new Date(2024, 0, 15, 9, 30)                // components, month is 0-based
//!   ```
//!
//! - [`parse_datetime`], the lenient date/time text parser also used by
//!   `$match` to decide whether a string field holds a date.

use crate::error::{JsonAggError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Maximum nesting of parentheses and unary signs in a date script
const MAX_NESTING: usize = 64;

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse date/time text leniently. Values without an offset are taken as UTC.
///
/// ```
/// use jsonagg_core::date_literal::parse_datetime;
///
/// assert!(parse_datetime("2024-04-18T12:34:56Z").is_some());
/// assert!(parse_datetime("2024-04-18").is_some());
/// assert!(parse_datetime("Alice").is_none());
/// assert!(parse_datetime("30").is_none());
/// ```
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    // Shorter text cannot hold year, month and day
    if text.len() < 6 {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

/// Turns the inside of a `Date(...)` call into an instant
pub trait DateLiteralParser: Send + Sync {
    fn parse_date_literal(&self, script: &str) -> Result<DateTime<Utc>>;
}

/// Default [`DateLiteralParser`] for JavaScript `Date` constructor arguments
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptDateParser {
    now: Option<DateTime<Utc>>,
}

impl ScriptDateParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the instant returned by `Date.now()` and `new Date()`
    pub fn with_now(now: DateTime<Utc>) -> Self {
        ScriptDateParser { now: Some(now) }
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

impl DateLiteralParser for ScriptDateParser {
    fn parse_date_literal(&self, script: &str) -> Result<DateTime<Utc>> {
        let tokens = tokenize(script)?;
        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
            now_millis: self.now().timestamp_millis() as f64,
            script,
        };
        let args = parser.arguments()?;
        parser.expect_end()?;

        match args.as_slice() {
            [] => Ok(self.now()),
            [Arg::Text(text)] => parse_datetime(text).ok_or_else(|| {
                JsonAggError::DateLiteral(format!("unrecognized date text \"{}\"", text))
            }),
            [Arg::Number(millis)] => millis_to_datetime(*millis, script),
            args if args.len() <= 7 => {
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        Arg::Number(n) => parts.push(*n),
                        Arg::Text(_) => {
                            return Err(JsonAggError::DateLiteral(format!(
                                "date components must be numbers in '{}'",
                                script
                            )))
                        }
                    }
                }
                millis_to_datetime(components_to_millis(&parts, script)?, script)
            }
            _ => Err(JsonAggError::DateLiteral(format!(
                "too many arguments in '{}'",
                script
            ))),
        }
    }
}

fn millis_to_datetime(millis: f64, script: &str) -> Result<DateTime<Utc>> {
    if !millis.is_finite() {
        return Err(JsonAggError::DateLiteral(format!(
            "'{}' does not evaluate to a finite time",
            script
        )));
    }
    DateTime::from_timestamp_millis(millis.trunc() as i64).ok_or_else(|| {
        JsonAggError::DateLiteral(format!("'{}' is outside the supported date range", script))
    })
}

/// `(year, monthIndex, day, hours, minutes, seconds, millis)` → epoch millis, UTC.
/// Out-of-range parts roll over the way JavaScript's `Date.UTC` does.
fn components_to_millis(parts: &[f64], script: &str) -> Result<f64> {
    let out_of_range =
        || JsonAggError::DateLiteral(format!("date components out of range in '{}'", script));

    if parts.iter().any(|p| !p.is_finite()) {
        return Err(out_of_range());
    }
    let part = |index: usize, default: f64| parts.get(index).copied().unwrap_or(default).trunc();

    let mut year = part(0, 1970.0);
    if (0.0..=99.0).contains(&year) {
        year += 1900.0;
    }
    let total_months = year * 12.0 + part(1, 0.0);
    if total_months.abs() > (i32::MAX as f64) {
        return Err(out_of_range());
    }
    let total_months = total_months as i64;
    let month_start = NaiveDate::from_ymd_opt(
        total_months.div_euclid(12) as i32,
        total_months.rem_euclid(12) as u32 + 1,
        1,
    )
    .and_then(|date| date.and_hms_opt(0, 0, 0))
    .ok_or_else(out_of_range)?;

    let offset = (part(2, 1.0) - 1.0) * MILLIS_PER_DAY
        + part(3, 0.0) * 3_600_000.0
        + part(4, 0.0) * 60_000.0
        + part(5, 0.0) * 1_000.0
        + part(6, 0.0);

    Ok(month_start.and_utc().timestamp_millis() as f64 + offset)
}

// ============================================================================
// SCRIPT TOKENIZER / EVALUATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Number(f64),
    Text(String),
}

fn tokenize(script: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = script.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = script[start..end].replace('_', "");
                let number = literal.parse::<f64>().map_err(|_| {
                    JsonAggError::DateLiteral(format!("invalid number '{}' in '{}'", literal, script))
                })?;
                tokens.push(Token::Number(number));
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => text.push(ch),
                    }
                }
                if !closed {
                    return Err(JsonAggError::DateLiteral(format!(
                        "unterminated string in '{}'",
                        script
                    )));
                }
                tokens.push(Token::Text(text));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '$' || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(script[start..end].to_string()));
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    other => {
                        return Err(JsonAggError::DateLiteral(format!(
                            "unexpected character '{}' in '{}'",
                            other, script
                        )))
                    }
                };
                chars.next();
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    now_millis: f64,
    script: &'a str,
}

impl<'a> ExprParser<'a> {
    fn error(&self, message: &str) -> JsonAggError {
        JsonAggError::DateLiteral(format!("{} in '{}'", message, self.script))
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(token) if *token == expected => Ok(()),
            _ => Err(self.error(&format!("expected {:?}", expected))),
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(&format!("unexpected {:?}", token))),
        }
    }

    /// Comma separated argument list, possibly empty, up to `)` or end of input
    fn arguments(&mut self) -> Result<Vec<Arg>> {
        let mut args = Vec::new();
        if matches!(self.peek(), None | Some(Token::RParen)) {
            return Ok(args);
        }
        loop {
            match (self.peek(), self.tokens.get(self.pos + 1)) {
                (Some(Token::Text(text)), None | Some(Token::Comma) | Some(Token::RParen)) => {
                    self.pos += 1;
                    args.push(Arg::Text(text.clone()));
                }
                _ => args.push(Arg::Number(self.expression()?)),
            }
            if matches!(self.peek(), Some(Token::Comma)) {
                self.pos += 1;
            } else {
                return Ok(args);
            }
        }
    }

    fn numeric_arguments(&mut self) -> Result<Vec<f64>> {
        self.arguments()?
            .into_iter()
            .map(|arg| match arg {
                Arg::Number(n) => Ok(n),
                Arg::Text(_) => Err(self.error("expected a number")),
            })
            .collect()
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    value /= self.unary()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                self.expect(Token::LParen)?;
                let args = self.numeric_arguments()?;
                self.expect(Token::RParen)?;
                match name.as_str() {
                    "Date.now" if args.is_empty() => Ok(self.now_millis),
                    "Date.UTC" if !args.is_empty() && args.len() <= 7 => {
                        components_to_millis(&args, self.script)
                    }
                    other => Err(self.error(&format!("unsupported call '{}'", other))),
                }
            }
            Some(Token::Text(_)) => Err(self.error("string in arithmetic")),
            Some(token) => Err(self.error(&format!("unexpected {:?}", token))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}
