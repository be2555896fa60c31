use drift_core::canon::{canonicalize, CanonError};
use drift_core::model::Format;

fn canon(text: &str) -> String {
    canonicalize(text.as_bytes(), Format::SourceText).expect("canonicalize").as_str().to_string()
}

#[test]
fn layout_and_comments_do_not_change_the_canonical_form() {
    let tidy = r#"
export function getUserById(id: string): Promise<User> {
  return db.users.find(id);
}
"#;
    let messy = r#"
// Fetch a single user.
export   function getUserById(
    id: string, // primary key
): Promise<User>
{
    /* delegate to the repository */
    return db.users.find( id );
}
"#;
    // The trailing comma in the parameter list is part of the header, so
    // compare against a form that keeps it.
    let tidy_with_comma = tidy.replace("(id: string)", "(id: string,)");
    assert_eq!(canon(&tidy_with_comma), canon(messy));
    assert_ne!(canon(tidy), canon(&tidy.replace("string", "number")));
}

#[test]
fn canonical_form_is_one_item_per_line_with_indented_bodies() {
    let src = "export interface User { name: string; id: number }";
    assert_eq!(canon(src), "export interface User {\n  name : string;\n  id : number;\n}\n");
}

#[test]
fn members_without_separators_are_split() {
    let a = "interface User {\n  name: string\n  id: number\n}\n";
    let b = "interface User { name: string; id: number; }";
    assert_eq!(canon(a), canon(b));
}

#[test]
fn statement_order_is_preserved() {
    let a = "init();\nstart();\n";
    let b = "start();\ninit();\n";
    assert_ne!(canon(a), canon(b));
}

#[test]
fn object_literals_stay_inside_their_statement() {
    let src = "const config = { retries: 3, verbose: true };\nexport default config;\n";
    assert_eq!(
        canon(src),
        "const config = { retries : 3 , verbose : true };\nexport default config;\n"
    );
}

#[test]
fn else_branches_join_the_if_statement() {
    let src = "function f(x) {\n  if (x) { a(); } else { b(); }\n}\n";
    assert_eq!(
        canon(src),
        "function f ( x ) {\n  if ( x ) { a ( ) ; } else {\n    b ( );\n  }\n}\n"
    );
}

#[test]
fn rust_items_are_understood() {
    let src = r#"
use std::collections::HashMap;

#[derive(Debug)]
pub struct Config<'a> {
    pub name: &'a str,
    retries: u32,
}

impl<'a> Config<'a> {
    pub fn new(name: &'a str) -> Self { Self { name, retries: 3 } }
}
"#;
    let out = canon(src);
    assert!(out.contains("# [ derive ( Debug ) ] pub struct Config < 'a > {"), "got:\n{out}");
    assert!(out.contains("  pub name : & 'a str;"), "got:\n{out}");
    assert!(out.contains("  retries : u32;"), "got:\n{out}");
}

#[test]
fn string_contents_are_preserved_verbatim() {
    let src = "const greeting = \"hello   // not a comment\";\n";
    assert_eq!(canon(src), "const greeting = \"hello   // not a comment\";\n");
}

#[test]
fn unclosed_brace_is_a_parse_error() {
    let err = canonicalize(b"function broken() {\n  return 1;\n", Format::SourceText)
        .expect_err("should fail");
    match err {
        CanonError::Parse(parse) => {
            assert_eq!(parse.format, Format::SourceText);
            assert_eq!(parse.location.line, 1);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn unmatched_closing_brace_is_a_parse_error() {
    let err = canonicalize(b"let x = 1;\n}\n", Format::SourceText).expect_err("should fail");
    assert!(matches!(err, CanonError::Parse(p) if p.location.line == 2));
}

#[test]
fn unterminated_block_comment_is_a_parse_error() {
    let err = canonicalize(b"let x = 1; /* never closed", Format::SourceText).expect_err("should fail");
    assert!(matches!(err, CanonError::Parse(_)));
}

#[test]
fn runaway_block_nesting_is_a_parse_error() {
    let src = format!("function f() {}{}", "{ ".repeat(5_000), "} ".repeat(5_001));
    match canonicalize(src.as_bytes(), Format::SourceText) {
        Err(CanonError::Parse(parse)) => {
            // The 129th brace; braces start at column 14, two columns apart.
            assert_eq!((parse.location.line, parse.location.column), (1, 14 + 2 * 128));
            assert!(parse.message.contains("nested"), "message: {}", parse.message);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn nesting_below_the_cap_is_accepted() {
    let src = format!("function f() {}return 1;{}", "{ ".repeat(100), " }".repeat(100));
    let out = canon(&src);
    assert!(out.contains(&format!("\n{}return 1;\n", "  ".repeat(100))), "got:\n{out}");
    assert_eq!(out.lines().count(), 201);
}
