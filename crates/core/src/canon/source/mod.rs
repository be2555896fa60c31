//! Source-text canonicalization.

pub mod lexer;
pub mod parser;

use crate::budget::Deadline;
use crate::canon::CanonError;

pub use self::parser::Item;

const INDENT: &str = "  ";

/// Tokenize and parse `text` into top-level items.
pub fn parse(text: &str, deadline: &Deadline) -> Result<Vec<Item>, CanonError> {
    let tokens = lexer::Lexer::new(text).tokenize()?;
    deadline.check()?;
    parser::Parser::new(tokens, deadline).parse()
}

/// Canonical text: one item per line, bodies indented, comments and layout gone.
pub fn canonicalize(text: &str, deadline: &Deadline) -> Result<String, CanonError> {
    let items = parse(text, deadline)?;
    let mut out = String::with_capacity(text.len());
    render(&items, 0, &mut out);
    Ok(out)
}

fn render(items: &[Item], depth: usize, out: &mut String) {
    for item in items {
        push_indent(out, depth);
        out.push_str(&item.header_text());
        match &item.body {
            None => out.push_str(";\n"),
            Some(children) => {
                if !item.header.is_empty() {
                    out.push(' ');
                }
                out.push_str("{\n");
                render(children, depth + 1, out);
                push_indent(out, depth);
                out.push_str("}\n");
            }
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
