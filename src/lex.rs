use std::str::FromStr;
use std::sync::LazyLock;

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::value::PrimitiveValue;

/// Word operators. OData spells these in lowercase only; `Eq` and `EQ` are
///  identifiers.
#[derive(strum_macros::Display, strum_macros::EnumString, Debug, Copy, Clone, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    DivBy,
    Mod,
    In,
}

/// The literal category a token was lexed as. A 40 digit integer is still an
///  [LiteralKind::Integer] even though its value is held as a decimal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LiteralKind {
    Integer,
    Decimal,
    String,
    Boolean,
    Null,
    Date,
    TimeOfDay,
    DateTimeOffset,
    Duration,
    Guid,
    Binary,
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    ParenLeft,
    ParenRight,
    Comma,
    Slash,
    Colon,
    /// Prefix negation. A `-` directly followed by a digit is lexed as part
    ///  of the number instead.
    Minus,
    Identifier,
    Operator(Keyword),
    Literal(LiteralKind, PrimitiveValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'input> {
    pub kind: TokenKind,
    pub lexeme: &'input str,
    /// Byte offset of the lexeme in the source
    pub position: usize,
}

impl Token<'_> {
    #[inline]
    pub fn is(&self, kind: &TokenKind) -> bool {
        &self.kind == kind
    }

    pub fn end(&self) -> usize {
        self.position + self.lexeme.len()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid symbol at {position} near '{context}'")]
    InvalidSymbol { position: usize, context: String },
    #[error("unterminated string literal starting at {position}")]
    UnterminatedString { position: usize, partial: String },
    #[error("invalid {kind:?} literal '{lexeme}' at {position}")]
    InvalidLiteral {
        position: usize,
        kind: LiteralKind,
        lexeme: String,
    },
}

impl Error {
    pub fn position(&self) -> usize {
        match self {
            Self::InvalidSymbol { position, .. }
            | Self::UnterminatedString { position, .. }
            | Self::InvalidLiteral { position, .. } => *position,
        }
    }
}

/// `$filter` and `$search` share the tokenizer but not the vocabulary.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Expression,
    /// Bare words, double-quoted phrases, parentheses and the uppercase
    ///  operators `AND`, `OR` and `NOT`.
    Search,
}

// The date and time shapes are matched against the remaining input, so every
//  pattern is anchored at the start.
static GUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}")
        .expect("static pattern")
});
static DATE_TIME_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2})(:\d{2}(?:\.\d{1,12})?)?(Z|z|[+-]\d{2}:\d{2})",
    )
    .expect("static pattern")
});
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("static pattern"));
static TIME_OF_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}:\d{2}(?::\d{2}(?:\.\d{1,12})?)?").expect("static pattern")
});
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d+(\.\d+)?([eE][+-]?\d+)?").expect("static pattern")
});
static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-)?P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$")
        .expect("static pattern")
});

/// Reads an ISO 8601 duration (`P1DT2H`, `-PT0.5S`) into signed seconds.
pub fn parse_duration(text: &str) -> Option<f64> {
    let caps = DURATION.captures(text)?;
    // `P` and `PT` alone match the pattern but name no component
    if caps.iter().skip(2).all(|c| c.is_none()) || text.ends_with('T') {
        return None;
    }
    let component = |i: usize| -> f64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let secs = component(2) * 86_400.0 + component(3) * 3_600.0 + component(4) * 60.0 + component(5);
    Some(if caps.get(1).is_some() { -secs } else { secs })
}

#[inline]
fn is_identifier_byte(b: u8) -> bool {
    // Bytes past ASCII are parts of UTF-8 letters; treating every one of them
    //  as an identifier byte keeps slices on char boundaries.
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b >= 0x80
}

#[inline]
fn is_search_word_byte(b: u8) -> bool {
    !(b.is_ascii_whitespace() || b == b'(' || b == b')' || b == b'"')
}

/// This type simply holds a reference to the source and an index, so it's
///  cheap to copy, making lookahead in the parser very easy.
#[derive(Debug, Clone)]
pub struct Lexer<'input> {
    source: &'input str,
    current: usize,
    mode: Mode,
    failed: bool,
}

impl<'input> Lexer<'input> {
    pub fn new(source: &'input str) -> Self {
        Self::with_mode(source, Mode::Expression)
    }

    pub fn with_mode(source: &'input str, mode: Mode) -> Self {
        Self {
            source,
            current: 0,
            mode,
            failed: false,
        }
    }

    #[inline]
    pub fn source(&self) -> &'input str {
        self.source
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    #[inline]
    fn peek_at(&self, at: usize) -> Option<u8> {
        self.source.as_bytes().get(self.current + at).copied()
    }

    #[inline]
    fn remaining(&self) -> &'input str {
        &self.source[self.current..]
    }

    #[inline]
    fn consume_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while let Some(c) = self.peek()
            && predicate(c)
        {
            self.current += 1;
        }
    }

    #[inline]
    fn consume_whitespace(&mut self) {
        self.consume_while(|b| b.is_ascii_whitespace());
    }

    /// Up to twenty characters of source starting at [position], for error
    ///  messages.
    fn context(&self, position: usize) -> String {
        self.source[position..].chars().take(20).collect()
    }

    fn invalid_symbol(&self, position: usize) -> Error {
        Error::InvalidSymbol {
            position,
            context: self.context(position),
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek_token(&self) -> Result<Option<Token<'input>>, Error> {
        self.clone().next_token()
    }

    /// Consumes the next token if it has the given kind.
    pub fn consume(&mut self, kind: &TokenKind) -> Result<bool, Error> {
        let mut ahead = self.clone();
        match ahead.next_token()? {
            Some(tok) if tok.is(kind) => {
                *self = ahead;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Byte offset just past the last consumed token. Used to report errors
    ///  at the end of input.
    pub fn offset(&self) -> usize {
        self.current
    }

    pub fn next_token(&mut self) -> Result<Option<Token<'input>>, Error> {
        self.consume_whitespace();

        if self.is_empty() {
            return Ok(None);
        }
        let start = self.current;

        // Convenience macro for returning a token from `start` to `self.current`
        macro_rules! tok {
            ($kind:expr) => {{
                let token = Token {
                    kind: $kind,
                    lexeme: &self.source[start..self.current],
                    position: start,
                };
                tracing::trace!(position = start, lexeme = token.lexeme, "token");
                token
            }};
        }

        let punctuation = match self.peek() {
            Some(b'(') => Some(TokenKind::ParenLeft),
            Some(b')') => Some(TokenKind::ParenRight),
            Some(b',') if self.mode == Mode::Expression => Some(TokenKind::Comma),
            Some(b'/') if self.mode == Mode::Expression => Some(TokenKind::Slash),
            Some(b':') if self.mode == Mode::Expression => Some(TokenKind::Colon),
            _ => None,
        };
        if let Some(kind) = punctuation {
            self.current += 1;
            return Ok(Some(tok!(kind)));
        }

        if self.mode == Mode::Search {
            let kind = self.search_token(start)?;
            return Ok(Some(tok!(kind)));
        }

        let kind = match self.peek() {
            Some(b'\'') => {
                let value = self.consume_string(start)?;
                TokenKind::Literal(LiteralKind::String, PrimitiveValue::String(value))
            }
            Some(b'-') => {
                if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
                    self.consume_numeric(start)?
                } else if self.remaining().starts_with("-INF")
                    && !self.peek_at(4).is_some_and(is_identifier_byte)
                {
                    self.current += 4;
                    TokenKind::Literal(LiteralKind::Decimal, PrimitiveValue::Double(f64::NEG_INFINITY))
                } else if self.peek_at(1) == Some(b'P') {
                    self.current += 1;
                    self.consume_while(is_identifier_byte);
                    let word = &self.source[start..self.current];
                    let secs = parse_duration(word).ok_or_else(|| self.invalid_symbol(start))?;
                    TokenKind::Literal(LiteralKind::Duration, PrimitiveValue::Duration(secs))
                } else {
                    self.current += 1;
                    TokenKind::Minus
                }
            }
            Some(b'0'..=b'9') => self.consume_numeric(start)?,
            Some(b) if is_identifier_byte(b) && b != b'.' => {
                // A GUID may well start with a hex letter
                if let Some(guid) = self.try_guid(start)? {
                    guid
                } else {
                    self.consume_word(start)?
                }
            }
            _ => return Err(self.invalid_symbol(start)),
        };

        Ok(Some(tok!(kind)))
    }

    /// Single quoted string with `''` standing for an embedded quote. Leaves
    ///  [current] past the closing quote and returns the unescaped contents.
    fn consume_string(&mut self, start: usize) -> Result<String, Error> {
        // skip the opening quote
        self.current += 1;
        let mut value = String::new();
        loop {
            let rest = self.remaining();
            let Some(end) = rest.find('\'') else {
                value.push_str(rest);
                self.current = self.source.len();
                return Err(Error::UnterminatedString {
                    position: start,
                    partial: value,
                });
            };
            value.push_str(&rest[..end]);
            self.current += end + 1;
            if self.peek() == Some(b'\'') {
                value.push('\'');
                self.current += 1;
            } else {
                return Ok(value);
            }
        }
    }

    fn try_guid(&mut self, start: usize) -> Result<Option<TokenKind>, Error> {
        let Some(m) = GUID.find(self.remaining()) else {
            return Ok(None);
        };
        let end = self.current + m.end();
        if self.source.as_bytes().get(end).is_some_and(|&b| is_identifier_byte(b)) {
            return Ok(None);
        }
        let text = m.as_str();
        let guid = Uuid::parse_str(text).map_err(|_| Error::InvalidLiteral {
            position: start,
            kind: LiteralKind::Guid,
            lexeme: text.to_string(),
        })?;
        self.current = end;
        Ok(Some(TokenKind::Literal(LiteralKind::Guid, PrimitiveValue::Guid(guid))))
    }

    /// Everything that starts with a digit (or `-` and a digit): GUIDs, then
    ///  the temporal literals, then plain numbers.
    fn consume_numeric(&mut self, start: usize) -> Result<TokenKind, Error> {
        if self.peek() != Some(b'-')
            && let Some(guid) = self.try_guid(start)?
        {
            return Ok(guid);
        }

        let rest = self.remaining();
        let invalid = |kind: LiteralKind, lexeme: &str| Error::InvalidLiteral {
            position: start,
            kind,
            lexeme: lexeme.to_string(),
        };

        let (kind, len) = if let Some(caps) = DATE_TIME_OFFSET.captures(rest) {
            let text = &caps[0];
            // RFC 3339 requires seconds, OData does not
            let normalized = match caps.get(2) {
                Some(_) => text.to_string(),
                None => format!("{}:00{}", &caps[1], &caps[3]),
            };
            let dt = DateTime::parse_from_rfc3339(&normalized)
                .map_err(|_| invalid(LiteralKind::DateTimeOffset, text))?;
            (
                TokenKind::Literal(LiteralKind::DateTimeOffset, PrimitiveValue::DateTimeOffset(dt)),
                text.len(),
            )
        } else if let Some(m) = DATE.find(rest) {
            let text = m.as_str();
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map_err(|_| invalid(LiteralKind::Date, text))?;
            (TokenKind::Literal(LiteralKind::Date, PrimitiveValue::Date(date)), text.len())
        } else if let Some(m) = TIME_OF_DAY.find(rest) {
            let text = m.as_str();
            let time = NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
                .map_err(|_| invalid(LiteralKind::TimeOfDay, text))?;
            (
                TokenKind::Literal(LiteralKind::TimeOfDay, PrimitiveValue::TimeOfDay(time)),
                text.len(),
            )
        } else if let Some(caps) = NUMBER.captures(rest) {
            let text = &caps[0];
            if caps.get(1).is_some() || caps.get(2).is_some() {
                let n = f64::from_str(text).map_err(|_| invalid(LiteralKind::Decimal, text))?;
                (TokenKind::Literal(LiteralKind::Decimal, PrimitiveValue::Double(n)), text.len())
            } else {
                (TokenKind::Literal(LiteralKind::Integer, integer_value(text).ok_or_else(|| invalid(LiteralKind::Integer, text))?), text.len())
            }
        } else {
            return Err(self.invalid_symbol(start));
        };

        self.current += len;
        // `12abc` is neither a number nor an identifier
        if self.peek().is_some_and(is_identifier_byte) {
            return Err(self.invalid_symbol(start));
        }
        Ok(kind)
    }

    /// Identifiers, keywords, the named literals and the prefixed literals
    ///  (`duration'..'`, `binary'..'`, `Namespace.Type'Member'`).
    fn consume_word(&mut self, start: usize) -> Result<TokenKind, Error> {
        self.consume_while(is_identifier_byte);
        let word = &self.source[start..self.current];

        if self.peek() == Some(b'\'') {
            return self.consume_prefixed(start, word);
        }

        if let Ok(keyword) = Keyword::from_str(word) {
            return Ok(TokenKind::Operator(keyword));
        }

        let literal = if word.eq_ignore_ascii_case("true") {
            Some((LiteralKind::Boolean, PrimitiveValue::Boolean(true)))
        } else if word.eq_ignore_ascii_case("false") {
            Some((LiteralKind::Boolean, PrimitiveValue::Boolean(false)))
        } else if word.eq_ignore_ascii_case("null") {
            Some((LiteralKind::Null, PrimitiveValue::Null))
        } else if word == "NaN" {
            Some((LiteralKind::Decimal, PrimitiveValue::Double(f64::NAN)))
        } else if word == "INF" {
            Some((LiteralKind::Decimal, PrimitiveValue::Double(f64::INFINITY)))
        } else if word.starts_with('P')
            && let Some(secs) = parse_duration(word)
        {
            Some((LiteralKind::Duration, PrimitiveValue::Duration(secs)))
        } else {
            None
        };

        Ok(match literal {
            Some((kind, value)) => TokenKind::Literal(kind, value),
            None => TokenKind::Identifier,
        })
    }

    fn consume_prefixed(&mut self, start: usize, prefix: &'input str) -> Result<TokenKind, Error> {
        let contents = self.consume_string(start)?;
        let lexeme = &self.source[start..self.current];
        let invalid = |kind| Error::InvalidLiteral {
            position: start,
            kind,
            lexeme: lexeme.to_string(),
        };

        let kind = if prefix == "duration" {
            let secs = parse_duration(&contents).ok_or_else(|| invalid(LiteralKind::Duration))?;
            TokenKind::Literal(LiteralKind::Duration, PrimitiveValue::Duration(secs))
        } else if prefix == "binary" {
            let bytes = decode_binary(&contents).ok_or_else(|| invalid(LiteralKind::Binary))?;
            TokenKind::Literal(LiteralKind::Binary, PrimitiveValue::Binary(bytes))
        } else if prefix.contains('.') && !prefix.ends_with('.') && !prefix.starts_with('.') {
            TokenKind::Literal(
                LiteralKind::Enum,
                PrimitiveValue::Enum {
                    type_name: prefix.to_string(),
                    member: contents,
                },
            )
        } else {
            return Err(self.invalid_symbol(start));
        };
        Ok(kind)
    }

    fn search_token(&mut self, start: usize) -> Result<TokenKind, Error> {
        if self.peek() == Some(b'"') {
            self.current += 1;
            return self.search_phrase(start);
        }

        self.consume_while(is_search_word_byte);
        let word = &self.source[start..self.current];
        Ok(match word {
            "AND" => TokenKind::Operator(Keyword::And),
            "OR" => TokenKind::Operator(Keyword::Or),
            "NOT" => TokenKind::Operator(Keyword::Not),
            _ => TokenKind::Literal(LiteralKind::String, PrimitiveValue::String(word.to_string())),
        })
    }
}

impl Lexer<'_> {
    /// The rest of a double-quoted phrase. `\"` and `\\` stand for a quote
    ///  and a backslash.
    fn search_phrase(&mut self, start: usize) -> Result<TokenKind, Error> {
        let bytes = self.source.as_bytes();
        let mut phrase = Vec::new();
        while let Some(&b) = bytes.get(self.current) {
            match b {
                b'"' => {
                    self.current += 1;
                    let phrase = String::from_utf8_lossy(&phrase).into_owned();
                    return Ok(TokenKind::Literal(LiteralKind::String, PrimitiveValue::String(phrase)));
                }
                b'\\' if matches!(bytes.get(self.current + 1), Some(b'"' | b'\\')) => {
                    phrase.push(bytes[self.current + 1]);
                    self.current += 2;
                }
                _ => {
                    phrase.push(b);
                    self.current += 1;
                }
            }
        }
        Err(Error::UnterminatedString {
            position: start,
            partial: String::from_utf8_lossy(&phrase).into_owned(),
        })
    }
}

/// Int32 when it fits, then Int64, then Decimal.
fn integer_value(text: &str) -> Option<PrimitiveValue> {
    if let Ok(n) = text.parse::<i32>() {
        Some(PrimitiveValue::Int32(n))
    } else if let Ok(n) = text.parse::<i64>() {
        Some(PrimitiveValue::Int64(n))
    } else {
        Decimal::from_str(text).ok().map(PrimitiveValue::Decimal)
    }
}

/// Binary literals are base64url. Padding is optional and the standard
///  alphabet is tolerated.
fn decode_binary(text: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
    URL_SAFE
        .decode(text)
        .or_else(|_| URL_SAFE_NO_PAD.decode(text))
        .or_else(|_| STANDARD.decode(text))
        .ok()
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Token<'input>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let res = self.next_token().transpose();
        if matches!(res, Some(Err(_))) {
            self.failed = true;
        }
        res
    }
}

/// Lexes an entire `$filter` style input up front. [Lexer] is the lazy
///  entry point: it yields one token per `next`, and cloning it gives an
///  independent lookahead cursor.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, Error> {
    Lexer::new(source).collect()
}
