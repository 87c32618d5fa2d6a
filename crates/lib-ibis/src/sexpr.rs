//! S-expression reader for parameter (`.ami`) text.
//!
//! Lexing rules:
//!
//! - Whitespace separates tokens; `|` starts a comment running to end of
//!   line.
//! - `(` and `)` delimit lists.
//! - `"..."` is a quoted atom. There are no escapes, so a quoted atom
//!   cannot contain `"`.
//! - Anything else up to whitespace, a paren or a quote is a bare atom.
//!
//! Every list must start with a bare atom naming it. Positions are 1-based
//! line and character column. A syntax error inside a list carries the
//! dot-joined heads of the lists open at that point.

use crate::error::{ParseError, ParseResult};
use nom::{
    branch::alt,
    bytes::complete::{take_till1, take_until},
    character::complete::{char, multispace0, not_line_ending},
    combinator::{map, value},
    multi::many0_count,
    sequence::delimited,
    IResult, Parser,
};

/// A parsed expression with its source position.
#[derive(Clone, Debug, PartialEq)]
pub enum SExpr {
    Atom {
        text: String,
        quoted: bool,
        pos: Pos,
    },
    List {
        items: Vec<SExpr>,
        pos: Pos,
    },
}

/// Line and column of the first character of an expression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl SExpr {
    pub fn pos(&self) -> Pos {
        match self {
            Self::Atom { pos, .. } | Self::List { pos, .. } => *pos,
        }
    }

    /// Head name of a list.
    pub fn head(&self) -> Option<&str> {
        match self {
            Self::List { items, .. } => items.first().and_then(Self::atom),
            Self::Atom { .. } => None,
        }
    }

    /// All items of a list, head included.
    pub fn items(&self) -> &[SExpr] {
        match self {
            Self::List { items, .. } => items,
            Self::Atom { .. } => &[],
        }
    }

    /// Items after the head.
    pub fn tail(&self) -> &[SExpr] {
        match self {
            Self::List { items, .. } => items.get(1..).unwrap_or(&[]),
            Self::Atom { .. } => &[],
        }
    }

    /// Text of an atom.
    pub fn atom(&self) -> Option<&str> {
        match self {
            Self::Atom { text, .. } => Some(text),
            Self::List { .. } => None,
        }
    }

    pub fn is_quoted(&self) -> bool {
        matches!(self, Self::Atom { quoted: true, .. })
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Open,
    Close,
    Atom(String),
    Quoted(String),
    Eof,
}

#[derive(Clone, Debug)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

impl Token {
    fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Open => "(".to_string(),
            TokenKind::Close => ")".to_string(),
            TokenKind::Atom(s) => s.clone(),
            TokenKind::Quoted(s) => format!("\"{s}\""),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

/// Whitespace and `|` comments.
fn trivia(input: &str) -> IResult<&str, ()> {
    value(
        (),
        (
            multispace0,
            many0_count((char('|'), not_line_ending, multispace0)),
        ),
    )
    .parse(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_until("\""), char('"')).parse(input)
}

fn bare_atom(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '"' | '|')).parse(input)
}

fn token_kind(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Open, char('(')),
        value(TokenKind::Close, char(')')),
        map(quoted, |s: &str| TokenKind::Quoted(s.to_string())),
        map(bare_atom, |s: &str| TokenKind::Atom(s.to_string())),
    ))
    .parse(input)
}

struct Lexer<'a> {
    text: &'a str,
    rest: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, rest: text }
    }

    fn offset(&self) -> usize {
        self.text.len() - self.rest.len()
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        if let Ok((rest, ())) = trivia(self.rest) {
            self.rest = rest;
        }
        let offset = self.offset();
        if self.rest.is_empty() {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset,
            });
        }
        match token_kind(self.rest) {
            Ok((rest, kind)) => {
                self.rest = rest;
                Ok(Token { kind, offset })
            }
            // Only an opening quote with no partner gets here.
            Err(_) => {
                let (line, column) = position(self.text, self.text.len());
                Err(ParseError::syntax(line, column, ["\""], "end of input"))
            }
        }
    }
}

/// 1-based line and character column of a byte offset.
fn position(text: &str, offset: usize) -> (usize, usize) {
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line, before[line_start..].chars().count() + 1)
}

/// Recursive descent over the token stream with one token of lookahead.
struct Reader<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    /// Heads of the lists open at the current token, outermost first.
    heads: Vec<String>,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lexer: Lexer::new(text),
            peeked: None,
            heads: Vec::new(),
        }
    }

    fn context(&self) -> Option<String> {
        (!self.heads.is_empty()).then(|| self.heads.join("."))
    }

    fn bump(&mut self) -> ParseResult<Token> {
        match self.peeked.take() {
            Some(t) => Ok(t),
            None => self
                .lexer
                .next_token()
                .map_err(|e| e.in_parameter(self.context())),
        }
    }

    fn peek(&mut self) -> ParseResult<&Token> {
        let token = self.bump()?;
        Ok(self.peeked.insert(token))
    }

    fn pos(&self, offset: usize) -> Pos {
        let (line, column) = position(self.lexer.text, offset);
        Pos { line, column }
    }

    fn error(&self, token: &Token, expected: &[&str]) -> ParseError {
        let pos = self.pos(token.offset);
        ParseError::syntax(pos.line, pos.column, expected.iter().copied(), token.describe())
            .in_parameter(self.context())
    }

    /// `( name item* )`, with the `(` already consumed.
    fn list(&mut self, open_offset: usize) -> ParseResult<SExpr> {
        let pos = self.pos(open_offset);
        let head = self.bump()?;
        let TokenKind::Atom(name) = &head.kind else {
            return Err(self.error(&head, &["name"]));
        };
        let mut items = vec![SExpr::Atom {
            text: name.clone(),
            quoted: false,
            pos: self.pos(head.offset),
        }];
        self.heads.push(name.clone());
        loop {
            let token = self.bump()?;
            let item_pos = self.pos(token.offset);
            match token.kind {
                TokenKind::Close => {
                    self.heads.pop();
                    return Ok(SExpr::List { items, pos });
                }
                TokenKind::Open => items.push(self.list(token.offset)?),
                TokenKind::Atom(text) => items.push(SExpr::Atom {
                    text,
                    quoted: false,
                    pos: item_pos,
                }),
                TokenKind::Quoted(text) => items.push(SExpr::Atom {
                    text,
                    quoted: true,
                    pos: item_pos,
                }),
                TokenKind::Eof => return Err(self.error(&token, &["(", ")", "atom"])),
            }
        }
    }
}

/// Read exactly one top-level list. Anything after it other than
/// whitespace and comments is an error.
pub fn parse(text: &str) -> ParseResult<SExpr> {
    let mut reader = Reader::new(text);
    let open = reader.bump()?;
    if open.kind != TokenKind::Open {
        return Err(reader.error(&open, &["("]));
    }
    let expr = reader.list(open.offset)?;
    let trailing = reader.peek()?.clone();
    if trailing.kind != TokenKind::Eof {
        return Err(reader.error(&trailing, &["end of input"]));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_lists() {
        let e = parse("(root (a 1) (b \"two words\") (c (d x y)))").unwrap();
        assert_eq!(e.head(), Some("root"));
        let tail = e.tail();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[1].tail()[0].atom(), Some("two words"));
        assert!(tail[1].tail()[0].is_quoted());
        assert_eq!(tail[2].tail()[0].head(), Some("d"));
    }

    #[test]
    fn test_comments_and_positions() {
        let text = "| header\n(root\n  (a 1) | note\n  (b 2))\n";
        let e = parse(text).unwrap();
        assert_eq!(e.pos(), Pos { line: 2, column: 1 });
        assert_eq!(e.tail()[1].pos(), Pos { line: 4, column: 3 });
    }

    #[test]
    fn test_unclosed_list_reports_end_of_input() {
        let err = parse("(root (a 1)").unwrap_err();
        match err {
            ParseError::Syntax {
                line,
                column,
                expected,
                found,
                ..
            } => {
                assert_eq!((line, column), (1, 12));
                assert_eq!(expected, vec!["(", ")", "atom"]);
                assert_eq!(found, "end of input");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_errors_name_enclosing_lists() {
        let err = parse("(root (group (leaf (Usage In)\n").unwrap_err();
        assert_eq!(err.parameter_path(), Some("root.group.leaf"));

        let err = parse("(root (group (x \"open))").unwrap_err();
        assert_eq!(err.parameter_path(), Some("root.group.x"));

        let err = parse("(root (group ((a 1))))").unwrap_err();
        assert_eq!(err.parameter_path(), Some("root.group"));

        let err = parse("(root (a 1)) extra").unwrap_err();
        assert_eq!(err.parameter_path(), None);
    }

    #[test]
    fn test_comment_between_atoms_and_empty_quote() {
        let e = parse("(root (a x|c1\n|c2\n y) (b \"\"))").unwrap();
        let a = &e.tail()[0];
        assert_eq!(a.tail().len(), 2);
        assert_eq!(a.tail()[1].atom(), Some("y"));
        assert_eq!(e.tail()[1].tail()[0].atom(), Some(""));
        assert!(e.tail()[1].tail()[0].is_quoted());
    }

    #[test]
    fn test_list_needs_name() {
        let err = parse("(root ((a 1)))").unwrap_err();
        assert_eq!(err.position(), Some((1, 8)));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = parse("(root (a \"open))").unwrap_err();
        match err {
            ParseError::Syntax { expected, .. } => assert_eq!(expected, vec!["\""]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trailing_text_rejected() {
        let err = parse("(root) extra").unwrap_err();
        assert_eq!(err.position(), Some((1, 8)));
        assert!(parse("(root)\n| trailing comment\n").is_ok());
    }

    #[test]
    fn test_empty_input() {
        let err = parse("  \n").unwrap_err();
        match err {
            ParseError::Syntax { expected, found, .. } => {
                assert_eq!(expected, vec!["("]);
                assert_eq!(found, "end of input");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
