//! Item parser for brace-structured source text.
//!
//! The grammar is deliberately shallow: an item is a header token run plus an
//! optional `{}` body of child items. Expressions, argument lists and inline
//! object types stay opaque inside the header.

use crate::budget::Deadline;
use crate::canon::source::lexer::{Token, TokenKind};
use crate::canon::{CanonError, Location, ParseError, MAX_NESTING};
use crate::model::Format;

const DEADLINE_STRIDE: usize = 512;

/// Keywords that keep an expression going; a `{` after them opens an object.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "yield", "await", "typeof", "in", "of", "case", "throw", "delete", "void",
    "instanceof",
];

/// A body followed by one of these is part of a larger statement.
const CONTINUATIONS: &[&str] = &["else", "catch", "finally", "while"];

/// Words that never end a declaration header.
pub const MODIFIERS: &[&str] = &[
    "export", "default", "pub", "public", "private", "protected", "static", "readonly", "abstract",
    "async", "declare", "unsafe", "extern", "override", "const", "let", "var", "function", "class",
    "interface", "type", "enum", "import", "from", "new", "extends", "implements", "as", "is",
    "keyof", "fn", "struct", "impl", "mod", "use", "trait", "where", "if", "else", "for", "while",
    "match", "return", "yield", "await", "typeof", "in", "of", "case", "throw", "delete",
    "instanceof",
];

/// Declaration keywords that start a new item after a complete header.
const DECLARATION_STARTS: &[&str] = &[
    "const", "let", "var", "function", "class", "interface", "type", "enum", "import", "export",
    "fn", "struct", "impl", "mod", "use", "pub", "trait", "declare",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub header: Vec<Token>,
    pub body: Option<Vec<Item>>,
}

impl Item {
    pub fn location(&self) -> Location {
        self.header.first().map_or_else(Location::start, |t| t.at)
    }

    pub fn header_text(&self) -> String {
        join_tokens(&self.header)
    }
}

pub fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&token.text);
    }
    out
}

pub struct Parser<'d> {
    tokens: Vec<Token>,
    pos: usize,
    deadline: &'d Deadline,
    ticks: usize,
    depth: usize,
}

impl<'d> Parser<'d> {
    pub fn new(tokens: Vec<Token>, deadline: &'d Deadline) -> Self {
        Self { tokens, pos: 0, deadline, ticks: 0, depth: 0 }
    }

    pub fn parse(mut self) -> Result<Vec<Item>, CanonError> {
        self.items(None)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    fn error(at: Location, message: impl Into<String>) -> CanonError {
        ParseError::new(Format::SourceText, at, message).into()
    }

    /// Items up to the closing brace (consumed) when `open` is set, else to the end.
    fn items(&mut self, open: Option<Location>) -> Result<Vec<Item>, CanonError> {
        let mut items = Vec::new();
        loop {
            self.deadline.check_every(&mut self.ticks, DEADLINE_STRIDE)?;
            match self.peek() {
                None => {
                    return match open {
                        Some(at) => Err(Self::error(at, "unclosed '{'")),
                        None => Ok(items),
                    };
                }
                Some(t) if t.is_punct("}") => {
                    let at = t.at;
                    if open.is_none() {
                        return Err(Self::error(at, "unmatched '}'"));
                    }
                    self.bump();
                    return Ok(items);
                }
                Some(_) => {
                    let item = self.item(open.is_some())?;
                    if !item.header.is_empty() || item.body.is_some() {
                        items.push(item);
                    }
                }
            }
        }
    }

    fn item(&mut self, nested: bool) -> Result<Item, CanonError> {
        let mut header: Vec<Token> = Vec::new();
        let mut angle = 0usize;

        loop {
            self.deadline.check_every(&mut self.ticks, DEADLINE_STRIDE)?;
            let Some(token) = self.peek() else {
                return Ok(Item { header, body: None });
            };

            if token.kind == TokenKind::Punct {
                match token.text.as_str() {
                    ";" => {
                        self.bump();
                        return Ok(Item { header, body: None });
                    }
                    "," if angle == 0 && nested && !header.iter().any(|t| t.is_ident("where")) => {
                        self.bump();
                        return Ok(Item { header, body: None });
                    }
                    "}" => return Ok(Item { header, body: None }),
                    "{" if opens_expression(&header) => {
                        self.group(&mut header)?;
                        continue;
                    }
                    "{" => {
                        let open = self.bump().map_or_else(Location::start, |t| t.at);
                        if self.depth >= MAX_NESTING {
                            return Err(Self::error(open, format!("blocks nested deeper than {MAX_NESTING}")));
                        }
                        self.depth += 1;
                        let children = self.items(Some(open));
                        self.depth -= 1;
                        let children = children?;
                        if self.continues_after_body() {
                            flatten_body(&mut header, &children, open);
                            continue;
                        }
                        return Ok(Item { header, body: Some(children) });
                    }
                    "(" | "[" => {
                        self.group(&mut header)?;
                        continue;
                    }
                    ")" | "]" => {
                        return Err(Self::error(token.at, format!("unmatched '{}'", token.text)));
                    }
                    "<" if header.last().is_some_and(|t| t.kind == TokenKind::Ident || t.is_punct("::")) => {
                        angle += 1;
                    }
                    ">" => angle = angle.saturating_sub(1),
                    _ => {}
                }
            } else if angle == 0 && self.starts_member(&header) {
                return Ok(Item { header, body: None });
            }

            if let Some(token) = self.bump() {
                header.push(token);
            }
        }
    }

    /// Consume a balanced `(...)`, `[...]` or `{...}` group into `header`.
    fn group(&mut self, header: &mut Vec<Token>) -> Result<(), CanonError> {
        let mut stack: Vec<(&'static str, Location)> = Vec::new();
        loop {
            self.deadline.check_every(&mut self.ticks, DEADLINE_STRIDE)?;
            let Some(token) = self.bump() else {
                let at = stack.last().map_or_else(Location::start, |(_, at)| *at);
                return Err(Self::error(at, "unclosed group"));
            };
            if token.kind == TokenKind::Punct {
                match token.text.as_str() {
                    "(" => stack.push((")", token.at)),
                    "[" => stack.push(("]", token.at)),
                    "{" => stack.push(("}", token.at)),
                    close @ (")" | "]" | "}") => match stack.pop() {
                        Some((expected, _)) if expected == close => {}
                        _ => {
                            return Err(Self::error(token.at, format!("mismatched '{close}'")));
                        }
                    },
                    _ => {}
                }
            }
            header.push(token);
            if stack.is_empty() {
                return Ok(());
            }
        }
    }

    fn continues_after_body(&self) -> bool {
        self.peek().is_some_and(|t| {
            (t.kind == TokenKind::Ident && CONTINUATIONS.contains(&t.text.as_str()))
                || t.is_punct(".")
                || t.is_punct("?.")
        })
    }

    /// A new member or statement begins at the next token.
    fn starts_member(&self, header: &[Token]) -> bool {
        let (Some(last), Some(next)) = (header.last(), self.peek()) else {
            return false;
        };
        if next.kind != TokenKind::Ident || !ends_type(last) || only_decorators(header) {
            return false;
        }
        if DECLARATION_STARTS.contains(&next.text.as_str()) {
            return true;
        }
        let member_follows = self
            .peek_at(1)
            .is_some_and(|t| t.is_punct(":") || t.is_punct("?") || t.is_punct("("));
        member_follows && header_complete(header)
    }
}

/// Whether `{` after `header` opens an object literal or inline type rather than a body.
fn opens_expression(header: &[Token]) -> bool {
    let Some(last) = header.last() else {
        return false;
    };
    // `import { a } from`, `export { a }`, `export type { A }`
    if let Some(first) = header.first() {
        if first.is_ident("import")
            || (first.is_ident("export") && header[1..].iter().all(|t| t.is_ident("type")))
        {
            return true;
        }
    }
    if last.is_punct("=") && is_type_alias(header) {
        return false;
    }
    match last.kind {
        TokenKind::Punct => !matches!(last.text.as_str(), ")" | "]" | ">" | "}" | "=>" | "->"),
        TokenKind::Ident => EXPRESSION_KEYWORDS.contains(&last.text.as_str()),
        _ => false,
    }
}

fn is_type_alias(header: &[Token]) -> bool {
    header
        .iter()
        .find(|t| !matches!(t.text.as_str(), "export" | "declare" | "pub"))
        .is_some_and(|t| t.is_ident("type"))
}

/// `@decorator(...)` and `#[attribute]` runs with nothing after them yet.
pub fn only_decorators(header: &[Token]) -> bool {
    decorator_len(header) == header.len() && !header.is_empty()
}

/// Number of leading tokens that form decorators or attributes.
pub fn decorator_len(header: &[Token]) -> usize {
    let mut i = 0;
    loop {
        let start = i;
        match header.get(i) {
            Some(t) if t.is_punct("@") => {
                i += 1;
                while header.get(i).is_some_and(|t| t.kind == TokenKind::Ident) {
                    i += 1;
                    if header.get(i).is_some_and(|t| t.is_punct(".")) {
                        i += 1;
                    } else {
                        break;
                    }
                }
                if header.get(i).is_some_and(|t| t.is_punct("(")) {
                    i = skip_group(header, i);
                }
            }
            Some(t) if t.is_punct("#") => {
                i += 1;
                if header.get(i).is_some_and(|t| t.is_punct("!")) {
                    i += 1;
                }
                if header.get(i).is_some_and(|t| t.is_punct("[")) {
                    i = skip_group(header, i);
                }
            }
            _ => return i,
        }
        if i == start {
            return i;
        }
    }
}

/// Index just past the balanced group opening at `open`.
fn skip_group(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

fn ends_type(token: &Token) -> bool {
    match token.kind {
        TokenKind::Ident => !MODIFIERS.contains(&token.text.as_str()),
        TokenKind::Number | TokenKind::Str => true,
        TokenKind::Punct => matches!(token.text.as_str(), ")" | "]" | ">" | "}"),
    }
}

/// The header has a top-level `:` annotation or a call/parameter group.
fn header_complete(header: &[Token]) -> bool {
    let mut depth = 0usize;
    for token in header {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return true;
                }
            }
            "]" | "}" => depth = depth.saturating_sub(1),
            ":" if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

fn flatten_body(header: &mut Vec<Token>, children: &[Item], at: Location) {
    header.push(synthetic("{", at));
    for child in children {
        header.extend(child.header.iter().cloned());
        match &child.body {
            Some(grandchildren) => flatten_body(header, grandchildren, at),
            None => header.push(synthetic(";", at)),
        }
    }
    header.push(synthetic("}", at));
}

fn synthetic(text: &str, at: Location) -> Token {
    Token { kind: TokenKind::Punct, text: text.to_string(), at }
}
