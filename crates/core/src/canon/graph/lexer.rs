//! Tokenizer shared by the N-Triples, N-Quads and Turtle parsers.

use crate::canon::{Location, ParseError};
use crate::model::Format;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    IriRef(String),
    PName { prefix: String, local: String },
    Blank(String),
    Str(String),
    LangTag(String),
    DatatypeMarker,
    Integer(String),
    Decimal(String),
    Double(String),
    Boolean(bool),
    /// The `a` keyword (shorthand for `rdf:type`).
    A,
    PrefixDecl { sparql: bool },
    BaseDecl { sparql: bool },
    Dot,
    Semicolon,
    Comma,
    LBracket,
    RBracket,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub tok: Tok,
    pub at: Location,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    format: Format,
}

impl Lexer {
    pub fn new(text: &str, format: Format) -> Self {
        Self { chars: text.chars().collect(), pos: 0, line: 1, column: 1, format }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.format, self.location(), message)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_trivia();
        let at = self.location();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let tok = match ch {
            '<' => self.iri_ref()?,
            '"' | '\'' => Tok::Str(self.string(ch)?),
            '_' if self.peek_at(1) == Some(':') => self.blank_label()?,
            '@' => self.at_word()?,
            '^' => {
                self.bump();
                if self.bump() != Some('^') {
                    return Err(ParseError::new(self.format, at, "expected '^^'"));
                }
                Tok::DatatypeMarker
            }
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
            '+' | '-' => self.number()?,
            c if c.is_ascii_digit() => self.number()?,
            '.' => self.single(Tok::Dot),
            ';' => self.single(Tok::Semicolon),
            ',' => self.single(Tok::Comma),
            '[' => self.single(Tok::LBracket),
            ']' => self.single(Tok::RBracket),
            '(' => self.single(Tok::LParen),
            ')' => self.single(Tok::RParen),
            c if is_name_start(c) || c == ':' => self.word()?,
            other => return Err(self.error(format!("unexpected character {other:?}"))),
        };
        Ok(Some(Token { tok, at }))
    }

    fn single(&mut self, tok: Tok) -> Tok {
        self.bump();
        tok
    }

    fn iri_ref(&mut self) -> Result<Tok, ParseError> {
        self.bump();
        let mut iri = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated IRI")),
                Some('>') => break,
                Some('\\') => match self.bump() {
                    Some('u') => iri.push(self.hex_escape(4)?),
                    Some('U') => iri.push(self.hex_escape(8)?),
                    _ => return Err(self.error("invalid escape in IRI")),
                },
                Some(c) if c.is_whitespace() || matches!(c, '<' | '"' | '{' | '}' | '|' | '`') => {
                    return Err(self.error(format!("invalid character {c:?} in IRI")));
                }
                Some(c) => iri.push(c),
            }
        }
        Ok(Tok::IriRef(iri))
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, ParseError> {
        let mut value = 0u32;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("invalid hex digit in escape"))?;
            value = value * 16 + digit;
        }
        char::from_u32(value).ok_or_else(|| self.error("escape is not a valid code point"))
    }

    fn string(&mut self, quote: char) -> Result<String, ParseError> {
        let long = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let open = if long { 3 } else { 1 };
        for _ in 0..open {
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string literal"));
            };
            if c == quote {
                if !long {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    // A long string may end with up to two extra quote characters.
                    while self.peek_at(2) == Some(quote) {
                        value.push(quote);
                        self.bump();
                    }
                    self.bump();
                    self.bump();
                    break;
                }
                value.push(c);
                continue;
            }
            match c {
                '\\' => value.push(self.string_escape()?),
                '\n' | '\r' if !long => return Err(self.error("line break in short string")),
                other => value.push(other),
            }
        }
        Ok(value)
    }

    fn string_escape(&mut self) -> Result<char, ParseError> {
        match self.bump() {
            Some('t') => Ok('\t'),
            Some('b') => Ok('\u{8}'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('f') => Ok('\u{c}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.hex_escape(4),
            Some('U') => self.hex_escape(8),
            _ => Err(self.error("invalid escape sequence")),
        }
    }

    fn blank_label(&mut self) -> Result<Tok, ParseError> {
        self.bump();
        self.bump();
        let len = self.name_len(self.pos);
        if len == 0 {
            return Err(self.error("empty blank node label"));
        }
        let label: String = self.chars[self.pos..self.pos + len].iter().collect();
        for _ in 0..len {
            self.bump();
        }
        Ok(Tok::Blank(label))
    }

    fn at_word(&mut self) -> Result<Tok, ParseError> {
        self.bump();
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || (c == '-' && !word.is_empty()) {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match word.as_str() {
            "" => Err(self.error("expected a directive or language tag after '@'")),
            "prefix" => Ok(Tok::PrefixDecl { sparql: false }),
            "base" => Ok(Tok::BaseDecl { sparql: false }),
            _ => Ok(Tok::LangTag(word)),
        }
    }

    fn number(&mut self) -> Result<Tok, ParseError> {
        let mut text = String::new();
        if let Some(sign @ ('+' | '-')) = self.peek() {
            text.push(sign);
            self.bump();
        }
        let mut decimal = false;
        let mut exponent = false;
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            text.push(c);
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            decimal = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            exponent = true;
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            let before = text.len();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.bump();
            }
            if text.len() == before {
                return Err(self.error("exponent without digits"));
            }
        }
        if !text.chars().any(|c| c.is_ascii_digit()) {
            return Err(self.error("malformed numeric literal"));
        }
        Ok(if exponent {
            Tok::Double(text)
        } else if decimal {
            Tok::Decimal(text)
        } else {
            Tok::Integer(text)
        })
    }

    fn word(&mut self) -> Result<Tok, ParseError> {
        let at = self.location();
        let len = self.name_len(self.pos);
        let raw: String = self.chars[self.pos..self.pos + len].iter().collect();
        for _ in 0..len {
            self.bump();
        }

        if let Some((prefix, local)) = raw.split_once(':') {
            return Ok(Tok::PName { prefix: prefix.to_string(), local: unescape_local(local) });
        }
        match raw.as_str() {
            "a" => Ok(Tok::A),
            "true" => Ok(Tok::Boolean(true)),
            "false" => Ok(Tok::Boolean(false)),
            w if w.eq_ignore_ascii_case("prefix") => Ok(Tok::PrefixDecl { sparql: true }),
            w if w.eq_ignore_ascii_case("base") => Ok(Tok::BaseDecl { sparql: true }),
            other => Err(ParseError::new(self.format, at, format!("unexpected word {other:?}"))),
        }
    }

    /// Length of a name starting at `start`; a trailing `.` belongs to the statement, not the name.
    fn name_len(&self, start: usize) -> usize {
        let mut end = start;
        while let Some(&c) = self.chars.get(end) {
            if c == '\\' {
                end += 2;
                continue;
            }
            if is_name_char(c) || c == ':' || c == '.' || c == '%' {
                end += 1;
            } else {
                break;
            }
        }
        end = end.min(self.chars.len());
        while end > start && self.chars[end - 1] == '.' {
            end -= 1;
        }
        end - start
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || (!c.is_ascii() && !c.is_whitespace())
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-'
}

fn unescape_local(local: &str) -> String {
    let mut out = String::with_capacity(local.len());
    let mut chars = local.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
