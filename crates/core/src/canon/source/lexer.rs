//! Tokenizer for brace-structured source text (TypeScript, Rust and friends).
//!
//! Whitespace and comments never become tokens. String literals are kept
//! verbatim, quotes and escapes included.

use crate::canon::{Location, ParseError};
use crate::model::Format;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub at: Location,
}

impl Token {
    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }
}

// `<` and `>` only combine into comparison and arrow operators so that
// nested generics such as `Vec<Vec<u8>>` lex the same with or without spaces.
const OPERATORS: &[&str] = &[
    "===", "!==", "...", "**=", "&&=", "||=", "??=", "..=", "<=", ">=", "=>", "->", "==", "!=",
    "&&", "||", "??", "?.", "::", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "++", "--",
    "**", "..",
];

pub struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0, line: 1, column: 1 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn error_at(at: Location, message: impl Into<String>) -> ParseError {
        ParseError::new(Format::SourceText, at, message)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let at = self.location();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            None => return Err(Self::error_at(at, "unterminated block comment")),
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_trivia()?;
        let at = self.location();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        let start = self.pos;

        let kind = if ch == '\'' && self.is_lifetime() {
            self.bump();
            self.eat_while(is_ident_char);
            TokenKind::Ident
        } else if matches!(ch, '"' | '\'' | '`') {
            self.string(ch, at)?;
            TokenKind::Str
        } else if ch.is_ascii_digit() {
            self.number();
            TokenKind::Number
        } else if is_ident_char(ch) {
            self.eat_while(is_ident_char);
            TokenKind::Ident
        } else {
            let op_len = OPERATORS
                .iter()
                .find(|op| self.rest().starts_with(**op))
                .map_or(ch.len_utf8(), |op| op.len());
            let end = self.pos + op_len;
            while self.pos < end {
                self.bump();
            }
            TokenKind::Punct
        };

        Ok(Some(Token { kind, text: self.text[start..self.pos].to_string(), at }))
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    /// A quote followed by a name is a Rust lifetime unless a closing quote
    /// later on the same line ends a plausible string.
    fn is_lifetime(&self) -> bool {
        let line = self.rest()[1..].split('\n').next().unwrap_or("");
        if !line.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            return false;
        }
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '\'' => return chars.next().is_some_and(is_ident_char),
                _ => {}
            }
        }
        true
    }

    fn string(&mut self, quote: char, at: Location) -> Result<(), ParseError> {
        self.bump();
        loop {
            match self.bump() {
                None => return Err(Self::error_at(at, "unterminated string literal")),
                Some('\\') => {
                    self.bump();
                }
                Some('\n') if quote != '`' => {
                    return Err(Self::error_at(at, "line break in string literal"));
                }
                Some(c) if c == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn number(&mut self) {
        while let Some(c) = self.peek() {
            let continues = c.is_ascii_alphanumeric()
                || c == '_'
                || (c == '.' && self.peek_second().is_some_and(|n| n.is_ascii_digit()));
            if !continues {
                break;
            }
            self.bump();
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
