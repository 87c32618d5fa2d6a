//! Keyword grammar for model-description (`.ibs`) text.
//!
//! The grammar is line oriented. A line whose first non-blank character is
//! `[` opens a keyword section; every other non-blank line belongs to the
//! section opened most recently. Top-level keywords (`[Component]`,
//! `[Model]`, ...) start a new [`KeywordNode`] in the document; any other
//! keyword is nested under the current top-level node.
//!
//! Parsing is recursive descent with one line of lookahead and explicit
//! dispatch on the keyword token. It fails fast: the first structural
//! error aborts with its exact line, column, and the tokens that would have
//! been accepted there.
//!
//! Numbers are converted to base units while lines are tokenized, so
//! `[Voltage Range] 3.3V 3.0V 3.6V` carries `3.3`, `3.0` and `3.6`.

use crate::error::{ParseError, ParseResult};
use crate::numeric;
use lib_types::ami::Corner;
use serde::Serialize;

/// Comment character in effect until a `[Comment Char]` keyword changes it.
pub const DEFAULT_COMMENT_CHAR: char = '|';

/// Keywords that open a new top-level node.
const TOP_LEVEL_KEYWORDS: &[&str] = &[
    "ibis_ver",
    "comment_char",
    "file_name",
    "file_rev",
    "date",
    "source",
    "notes",
    "disclaimer",
    "copyright",
    "component",
    "model_selector",
    "model",
    "submodel",
    "external_circuit",
    "test_data",
    "test_load",
    "define_package_model",
    "interconnect_model_set",
    "end",
];

/// Keywords whose header must name the thing being defined.
const NAMED_KEYWORDS: &[&str] = &["component", "model", "model_selector", "submodel"];

/// Keywords whose header is a typ/min/max triple.
const TRIPLE_HEADER_KEYWORDS: &[&str] = &[
    "voltage_range",
    "temperature_range",
    "pullup_reference",
    "pulldown_reference",
    "power_clamp_reference",
    "gnd_clamp_reference",
];

/// Keywords whose rows are `x typ [min max]`.
const TABLE_KEYWORDS: &[&str] = &["pulldown", "pullup", "gnd_clamp", "power_clamp"];

/// Parameter lines whose value is a triple.
const TRIPLE_PARAMS: &[&str] = &["c_comp", "r_pkg", "l_pkg", "c_pkg"];

/// Canonical keyword name: lower case, words joined by `_`.
///
/// `[File Name]`, `[file_name]` and `[FILE  NAME]` all become `file_name`.
pub fn canonical_name(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_')
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Lookup key that also ignores separators, so `FileName` finds
/// `[File Name]`.
fn name_key(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Classification of a whitespace-delimited token.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TokenValue {
    /// A number, already scaled by its SI suffix.
    Number(f64),
    /// The `NA` sentinel.
    Na,
    /// Anything else.
    Word,
}

/// One token of a line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Token {
    pub text: String,
    /// 1-based column of the first character.
    pub column: usize,
    pub value: TokenValue,
}

impl Token {
    fn classify(text: &str, column: usize) -> Self {
        let value = if text.eq_ignore_ascii_case("na") {
            TokenValue::Na
        } else if let Some(v) = numeric::parse_eng(text).or_else(|| numeric::parse_ratio(text)) {
            TokenValue::Number(v)
        } else {
            TokenValue::Word
        };
        Self {
            text: text.to_string(),
            column,
            value,
        }
    }

    pub fn number(&self) -> Option<f64> {
        match self.value {
            TokenValue::Number(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_na(&self) -> bool {
        self.value == TokenValue::Na
    }
}

/// A typ/min/max triple. `None` marks an `NA` slot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TypMinMax {
    pub typ: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl TypMinMax {
    pub fn at(&self, corner: Corner) -> Option<f64> {
        match corner {
            Corner::Typ => Some(self.typ),
            Corner::Min => self.min,
            Corner::Max => self.max,
        }
    }

    /// Value at `corner`, falling back to typical for `NA` slots.
    pub fn at_or_typ(&self, corner: Corner) -> f64 {
        self.at(corner).unwrap_or(self.typ)
    }
}

/// One non-blank line, comment removed, already tokenized.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Line {
    /// 1-based line number.
    pub number: usize,
    /// Trimmed text.
    pub text: String,
    pub tokens: Vec<Token>,
    /// Column just past the last non-blank character.
    pub end_column: usize,
}

impl Line {
    fn tokenize(number: usize, text: &str, first_column: usize) -> Self {
        let mut tokens = Vec::new();
        let mut start: Option<(usize, usize)> = None;
        let mut column = first_column;
        for (i, c) in text.char_indices() {
            if c.is_whitespace() {
                if let Some((b, col)) = start.take() {
                    tokens.push(Token::classify(&text[b..i], col));
                }
            } else if start.is_none() {
                start = Some((i, column));
            }
            column += 1;
        }
        if let Some((b, col)) = start {
            tokens.push(Token::classify(&text[b..], col));
        }
        let end_column = first_column + text.trim_end().chars().count();
        Self {
            number,
            text: text.trim().to_string(),
            tokens,
            end_column,
        }
    }

    /// First token, if it is a word.
    pub fn first_word(&self) -> Option<&str> {
        self.tokens
            .first()
            .filter(|t| t.value == TokenValue::Word)
            .map(|t| t.text.as_str())
    }

    /// Tokens after a leading name and an optional `=`.
    pub fn values(&self) -> &[Token] {
        let rest = self.tokens.get(1..).unwrap_or(&[]);
        match rest.first() {
            Some(t) if t.text == "=" => &rest[1..],
            _ => rest,
        }
    }

    /// Text after a leading name and an optional `=`.
    pub fn value_text(&self) -> String {
        self.values()
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Read a triple starting at token `start`. A lone value is a triple
    /// with both bounds unavailable.
    pub fn triple(&self, start: usize) -> Option<TypMinMax> {
        read_triple(self.tokens.get(start..)?)
    }
}

fn read_triple(tokens: &[Token]) -> Option<TypMinMax> {
    let typ = tokens.first()?.number()?;
    let slot = |i: usize| tokens.get(i).and_then(Token::number);
    Some(TypMinMax {
        typ,
        min: slot(1),
        max: slot(2),
    })
}

/// An entry inside a keyword section.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Entry {
    Line(Line),
    Keyword(KeywordNode),
}

/// One `[Keyword]` section.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeywordNode {
    /// Canonical name, see [`canonical_name`].
    pub name: String,
    /// Name as written between the brackets.
    pub raw_name: String,
    /// Line of the keyword token.
    pub line: usize,
    /// Text following `]` on the keyword line.
    pub header: Line,
    /// Lines and nested keywords, in file order.
    pub entries: Vec<Entry>,
}

impl KeywordNode {
    /// Case- and separator-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        name_key(&self.name) == name_key(name)
    }

    /// Header text, e.g. the component name for `[Component] X`.
    pub fn value(&self) -> &str {
        &self.header.text
    }

    /// Header and every direct line, joined with newlines. Useful for
    /// free-text keywords such as `[Notes]`.
    pub fn text(&self) -> String {
        std::iter::once(self.header.text.as_str())
            .chain(self.lines().map(|l| l.text.as_str()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Direct data lines.
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Line(l) => Some(l),
            Entry::Keyword(_) => None,
        })
    }

    /// Nested keywords.
    pub fn subkeywords(&self) -> impl Iterator<Item = &KeywordNode> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Keyword(k) => Some(k),
            Entry::Line(_) => None,
        })
    }

    /// Nested keywords named `name`.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a KeywordNode> + 'a {
        self.subkeywords().filter(move |k| k.is(name))
    }

    /// First nested keyword named `name`.
    pub fn child<'a>(&'a self, name: &'a str) -> Option<&'a KeywordNode> {
        self.children(name).next()
    }

    /// First direct line whose leading word is `name`.
    pub fn param(&self, name: &str) -> Option<&Line> {
        let key = name_key(name);
        self.lines()
            .find(|l| l.first_word().is_some_and(|w| name_key(w) == key))
    }
}

/// A parsed model-description file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeywordDocument {
    pub nodes: Vec<KeywordNode>,
    /// Comment character in effect at the end of the file.
    pub comment_char: char,
}

impl Default for KeywordDocument {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            comment_char: DEFAULT_COMMENT_CHAR,
        }
    }
}

impl KeywordDocument {
    /// First top-level node named `name`.
    pub fn get(&self, name: &str) -> Option<&KeywordNode> {
        self.nodes.iter().find(|n| n.is(name))
    }

    /// All top-level nodes named `name`.
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a KeywordNode> + 'a {
        self.nodes.iter().filter(move |n| n.is(name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Parse model-description text into a keyword document.
pub fn parse(text: &str) -> ParseResult<KeywordDocument> {
    let mut parser = GrammarParser::new(text);
    for (idx, raw) in text.lines().enumerate() {
        parser.line(idx + 1, raw)?;
    }
    Ok(parser.finish())
}

struct GrammarParser {
    comment_char: char,
    doc: KeywordDocument,
    top: Option<KeywordNode>,
    sub: Option<KeywordNode>,
    ended: bool,
    last_line: usize,
    trailing_newline: bool,
}

impl GrammarParser {
    fn new(text: &str) -> Self {
        Self {
            comment_char: DEFAULT_COMMENT_CHAR,
            doc: KeywordDocument::default(),
            top: None,
            sub: None,
            ended: false,
            last_line: text.lines().count(),
            trailing_newline: text.ends_with('\n'),
        }
    }

    /// What a syntax error found when a line ran out.
    fn eol(&self, line: usize) -> &'static str {
        if line == self.last_line && !self.trailing_newline {
            "end of input"
        } else {
            "end of line"
        }
    }

    fn line(&mut self, number: usize, raw: &str) -> ParseResult<()> {
        let content = strip_comment(raw, self.comment_char);
        let trimmed = raw.trim_start();

        if self.ended {
            let (rest, first_column) = if trimmed.starts_with('[') {
                (trimmed, 1 + indent_of(raw))
            } else {
                (content, 1)
            };
            return match Line::tokenize(number, rest, first_column).tokens.first() {
                Some(t) if !rest.trim().is_empty() => Err(ParseError::syntax(
                    number,
                    t.column,
                    ["end of input"],
                    t.text.clone(),
                )),
                _ => Ok(()),
            };
        }

        if trimmed.starts_with('[') {
            return self.keyword(number, raw);
        }
        if content.trim().is_empty() {
            return Ok(());
        }

        let line = Line::tokenize(number, content, 1);
        let Some(owner) = self.sub.as_mut().or(self.top.as_mut()) else {
            let (column, found) = line
                .tokens
                .first()
                .map_or((1, String::new()), |t| (t.column, t.text.clone()));
            return Err(ParseError::syntax(number, column, ["["], found));
        };
        let owner_name = owner.name.clone();
        self.check_row(&line, &owner_name)?;
        if let Some(owner) = self.sub.as_mut().or(self.top.as_mut()) {
            owner.entries.push(Entry::Line(line));
        }
        Ok(())
    }

    fn keyword(&mut self, number: usize, raw: &str) -> ParseResult<()> {
        let indent = indent_of(raw);
        let open_col = indent + 1;
        let after_open = &raw.trim_start()[1..];

        let Some(close) = after_open.find(']') else {
            let column = open_col + 1 + after_open.trim_end().chars().count();
            return Err(ParseError::syntax(number, column, ["]"], self.eol(number)));
        };

        let raw_name = after_open[..close].trim();
        if raw_name.is_empty() {
            return Err(ParseError::syntax(number, open_col + 1, ["keyword name"], "]"));
        }
        let name = canonical_name(raw_name);

        let rest = &after_open[close + 1..];
        let rest_col = open_col + 1 + after_open[..close].chars().count() + 1;
        let header_text = if name == "comment_char" {
            rest
        } else {
            strip_comment(rest, self.comment_char)
        };
        let header = Line::tokenize(number, header_text, rest_col);

        if TRIPLE_HEADER_KEYWORDS.contains(&name.as_str()) {
            self.check_triple(&header, 0)?;
        }

        let node = KeywordNode {
            name: name.clone(),
            raw_name: raw_name.to_string(),
            line: number,
            header,
            entries: Vec::new(),
        };

        match name.as_str() {
            "end" => {
                self.flush_top();
                self.ended = true;
            }
            n if n.starts_with("end_") => {
                self.flush_sub();
            }
            n if TOP_LEVEL_KEYWORDS.contains(&n) => {
                if n == "comment_char" {
                    self.comment_char = comment_char_from(&node.header, self.eol(number))?;
                }
                if NAMED_KEYWORDS.contains(&n) && node.header.tokens.is_empty() {
                    return Err(ParseError::syntax(
                        number,
                        node.header.end_column,
                        [format!("{raw_name} name")],
                        self.eol(number),
                    ));
                }
                self.flush_top();
                tracing::trace!(keyword = %n, line = number, "top-level keyword");
                self.top = Some(node);
            }
            _ => {
                if self.top.is_none() {
                    return Err(ParseError::syntax(
                        number,
                        open_col,
                        ["top-level keyword"],
                        format!("[{raw_name}]"),
                    ));
                }
                self.flush_sub();
                self.sub = Some(node);
            }
        }
        Ok(())
    }

    /// Validate typed rows while they are read.
    fn check_row(&self, line: &Line, owner: &str) -> ParseResult<()> {
        if TABLE_KEYWORDS.contains(&owner) {
            self.expect_number(line, 0)?;
            return self.check_triple(line, 1);
        }
        let Some(word) = line.first_word() else {
            return Ok(());
        };
        let word = word.to_ascii_lowercase();
        if owner == "ramp" && word.starts_with("dv/dt") {
            return self.check_triple(line, 1);
        }
        if TRIPLE_PARAMS.contains(&word.as_str()) {
            let start = match line.tokens.get(1) {
                Some(t) if t.text == "=" => 2,
                _ => 1,
            };
            return self.check_triple(line, start);
        }
        Ok(())
    }

    fn expect_number(&self, line: &Line, index: usize) -> ParseResult<()> {
        match line.tokens.get(index) {
            Some(t) if t.number().is_some() => Ok(()),
            Some(t) => Err(ParseError::syntax(line.number, t.column, ["number"], t.text.clone())),
            None => Err(ParseError::syntax(
                line.number,
                line.end_column,
                ["number"],
                self.eol(line.number),
            )),
        }
    }

    /// A typical value, optionally followed by exactly two more slots that
    /// are each a number or `NA`.
    fn check_triple(&self, line: &Line, start: usize) -> ParseResult<()> {
        self.expect_number(line, start)?;
        if line.tokens.len() <= start + 1 {
            return Ok(());
        }
        for i in start + 1..start + 3 {
            match line.tokens.get(i) {
                Some(t) if t.number().is_some() || t.is_na() => {}
                Some(t) => {
                    return Err(ParseError::syntax(
                        line.number,
                        t.column,
                        ["number", "NA"],
                        t.text.clone(),
                    ))
                }
                None => {
                    return Err(ParseError::syntax(
                        line.number,
                        line.end_column,
                        ["number", "NA"],
                        self.eol(line.number),
                    ))
                }
            }
        }
        Ok(())
    }

    fn flush_sub(&mut self) {
        if let Some(sub) = self.sub.take() {
            if let Some(top) = self.top.as_mut() {
                top.entries.push(Entry::Keyword(sub));
            }
        }
    }

    fn flush_top(&mut self) {
        self.flush_sub();
        if let Some(top) = self.top.take() {
            self.doc.nodes.push(top);
        }
    }

    fn finish(mut self) -> KeywordDocument {
        self.flush_top();
        self.doc.comment_char = self.comment_char;
        tracing::debug!(nodes = self.doc.nodes.len(), "parsed keyword document");
        self.doc
    }
}

fn indent_of(raw: &str) -> usize {
    raw.chars().take_while(|c| c.is_whitespace()).count()
}

fn strip_comment(line: &str, comment_char: char) -> &str {
    match line.find(comment_char) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// `[Comment Char] #_char` selects `#`.
fn comment_char_from(header: &Line, eol: &str) -> ParseResult<char> {
    let Some(token) = header.tokens.first() else {
        return Err(ParseError::syntax(
            header.number,
            header.end_column,
            ["comment character"],
            eol,
        ));
    };
    match token.text.chars().next() {
        Some(c) if !c.is_alphanumeric() && c != '[' && c != ']' => Ok(c),
        _ => Err(ParseError::syntax(
            header.number,
            token.column,
            ["comment character"],
            token.text.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_and_component() {
        let doc = parse("[File Name] foo.ibs\n[Component] X").unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("FileName").map(KeywordNode::value), Some("foo.ibs"));
        assert_eq!(doc.get("Component").map(KeywordNode::value), Some("X"));
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_name("File  Name"), "file_name");
        assert_eq!(canonical_name("GND_Clamp"), "gnd_clamp");
        let doc = parse("[FILE_NAME] a.ibs\n").unwrap();
        assert!(doc.get("file name").is_some());
    }

    #[test]
    fn test_nested_keywords_and_comments() {
        let text = "\
| leading comment
[Model] TX | trailing comment
Model_type Output
[Voltage Range] 3.3V 3.0V 3.6V
[Pulldown]
| V I(typ) I(min) I(max)
-1.0 -10m -9m -11m
 0.0   0m  NA  NA
";
        let doc = parse(text).unwrap();
        let model = doc.get("model").unwrap();
        assert_eq!(model.value(), "TX");
        assert_eq!(model.param("model_type").unwrap().value_text(), "Output");

        let vr = model.child("Voltage Range").unwrap().header.triple(0).unwrap();
        assert_eq!(vr.typ, 3.3);
        assert_eq!(vr.min, Some(3.0));
        assert_eq!(vr.max, Some(3.6));

        let pd = model.child("pulldown").unwrap();
        let rows: Vec<_> = pd.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!((rows[0].triple(1).unwrap().typ + 10e-3).abs() < 1e-15);
        assert_eq!(rows[1].triple(1).unwrap().max, None);
    }

    #[test]
    fn test_triple_first_slot_must_be_concrete() {
        let err = parse("[Model] M\n[Voltage Range] NA 3.0 3.6\n").unwrap_err();
        match err {
            ParseError::Syntax {
                line,
                column,
                expected,
                found,
                ..
            } => {
                assert_eq!((line, column), (2, 17));
                assert_eq!(expected, vec!["number".to_string()]);
                assert_eq!(found, "NA");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_triple_with_two_values_fails_at_end_of_line() {
        let err = parse("[Model] M\n[Pullup]\n0.0 1m 2m\n").unwrap_err();
        match err {
            ParseError::Syntax {
                line,
                column,
                expected,
                found,
                ..
            } => {
                assert_eq!((line, column), (3, 10));
                assert_eq!(expected, vec!["number".to_string(), "NA".to_string()]);
                assert_eq!(found, "end of line");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unterminated_keyword() {
        let err = parse("[File Name] a.ibs\n[Comp").unwrap_err();
        match err {
            ParseError::Syntax {
                line,
                column,
                expected,
                found,
                ..
            } => {
                assert_eq!((line, column), (2, 6));
                assert_eq!(expected, vec!["]".to_string()]);
                assert_eq!(found, "end of input");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_text_before_first_keyword() {
        let err = parse("hello\n[File Name] a\n").unwrap_err();
        assert_eq!(err.position(), Some((1, 1)));
    }

    #[test]
    fn test_subkeyword_before_top_level() {
        let err = parse("[Pin] signal model\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, column: 1, .. }));
    }

    #[test]
    fn test_model_requires_name() {
        let err = parse("[Model]\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_end_and_trailing_text() {
        let doc = parse("[IBIS Ver] 7.0\n[End]\n\n| done\n").unwrap();
        assert_eq!(doc.len(), 1);

        let err = parse("[IBIS Ver] 7.0\n[End]\nstray\n").unwrap_err();
        match err {
            ParseError::Syntax { line, expected, .. } => {
                assert_eq!(line, 3);
                assert_eq!(expected, vec!["end of input".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_comment_char_switch() {
        let text = "[Comment Char] #_char\n[File Name] a.ibs # note | kept\n";
        let doc = parse(text).unwrap();
        assert_eq!(doc.comment_char, '#');
        assert_eq!(doc.get("file_name").unwrap().value(), "a.ibs");
    }

    #[test]
    fn test_free_text_keyword() {
        let doc = parse("[Notes] first\nsecond line\n[Date] today\n").unwrap();
        assert_eq!(doc.get("notes").unwrap().text(), "first\nsecond line");
    }

    #[test]
    fn test_ratio_tokens() {
        let doc = parse("[Model] M\n[Ramp]\ndV/dt_r 1.2/0.5n NA NA\nR_load = 50\n").unwrap();
        let ramp = doc.get("model").unwrap().child("ramp").unwrap();
        let r = ramp.param("dV/dt_r").unwrap().triple(1).unwrap();
        assert!((r.typ - 2.4e9).abs() < 1.0);
        assert_eq!(ramp.param("r_load").unwrap().values()[0].number(), Some(50.0));
    }
}
