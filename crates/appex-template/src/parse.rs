//! Parser for the mustache-style template syntax.
//!
//! Supported forms:
//!
//! - `{{path}}` escaped interpolation, `{{{path}}}` / `{{&path}}` raw
//! - `{{helper arg1 arg2}}` with path, string, number, boolean and null
//!   arguments
//! - `{{! comment }}` and `{{!-- comment --}}`
//! - `~` whitespace control on either side of a mustache
//! - `\{{` renders a literal `{{`
//!
//! Blocks, partials, hash arguments and sub-expressions are rejected.

use std::fmt;

use appex_error::{Error, Result};

use crate::value::Value;

/// Line (1-based) and column (0-based) of a character in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source range of one mustache, opening braces to closing braces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Mustache(Mustache),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mustache {
    /// HTML-escape the output.
    pub escaped: bool,
    pub head: PathExpr,
    pub params: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(PathExpr),
    Literal(Value),
}

/// A dotted lookup path. An empty segment list means the context itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub original: String,
    pub segments: Vec<String>,
}

impl PathExpr {
    /// A helper can only be named by a plain one-segment path.
    pub fn helper_name(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [name] if self.original == *name => Some(name),
            _ => None,
        }
    }
}

/// Parse `source` into a [`Template`].
pub fn parse(source: &str) -> Result<Template> {
    Parser::new(source).run()
}

struct Parser<'s> {
    src: &'s str,
    pos: usize,
    nodes: Vec<Node>,
    text: String,
    trim_next_text: bool,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: 0,
            nodes: Vec::new(),
            text: String::new(),
            trim_next_text: false,
        }
    }

    fn run(mut self) -> Result<Template> {
        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            if rest.starts_with("\\{{") {
                self.push_text("{{");
                self.pos += 3;
            } else if rest.starts_with("{{") {
                self.mustache()?;
            } else {
                let next = rest
                    .char_indices()
                    .skip(1)
                    .find(|(i, _)| rest[*i..].starts_with("{{") || rest[*i..].starts_with("\\{{"))
                    .map(|(i, _)| i)
                    .unwrap_or(rest.len());
                self.push_text(&rest[..next]);
                self.pos += next;
            }
        }
        self.flush_text();
        Ok(Template { nodes: self.nodes })
    }

    fn push_text(&mut self, s: &str) {
        if self.trim_next_text {
            let trimmed = s.trim_start();
            if trimmed.is_empty() {
                return;
            }
            self.trim_next_text = false;
            self.text.push_str(trimmed);
        } else {
            self.text.push_str(s);
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.nodes.push(Node::Text(std::mem::take(&mut self.text)));
        }
    }

    fn trim_previous_text(&mut self) {
        let kept = self.text.trim_end().len();
        self.text.truncate(kept);
    }

    fn pos_at(&self, offset: usize) -> Pos {
        let before = &self.src[..offset];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count(),
            None => before.chars().count(),
        };
        Pos { line, column }
    }

    fn syntax_error(&self, offset: usize, message: impl Into<String>) -> Error {
        let pos = self.pos_at(offset);
        Error::template_syntax(message)
            .with_operation("template::parse")
            .with_context("line", pos.line.to_string())
            .with_context("column", pos.column.to_string())
    }

    fn mustache(&mut self) -> Result<()> {
        let start = self.pos;
        let triple = self.src[start..].starts_with("{{{");
        let (open_len, close) = if triple { (3, "}}}") } else { (2, "}}") };

        let mut inner_start = start + open_len;
        let trim_before = self.src[inner_start..].starts_with('~');
        if trim_before {
            inner_start += 1;
        }

        let is_long_comment = !triple && self.src[inner_start..].starts_with("!--");
        let close_at = if is_long_comment {
            let body_start = inner_start + 3;
            let rest = &self.src[body_start..];
            [("--}}", 2), ("--~}}", 3)]
                .iter()
                .filter_map(|(pat, skip)| rest.find(pat).map(|i| body_start + i + skip))
                .min()
        } else {
            self.src[inner_start..].find(close).map(|i| i + inner_start)
        };
        let Some(close_at) = close_at else {
            return Err(self.syntax_error(
                start,
                format!("unclosed '{}'", &self.src[start..start + open_len]),
            ));
        };

        let mut inner_end = close_at;
        let mut trim_after = false;
        if inner_end > inner_start && self.src[..inner_end].ends_with('~') {
            inner_end -= 1;
            trim_after = true;
        }
        let end = close_at + close.len();
        let span = Span {
            start: self.pos_at(start),
            end: self.pos_at(end),
        };

        if trim_before {
            self.trim_previous_text();
        }
        let inner = &self.src[inner_start..inner_end];
        self.pos = end;

        if let Some(node) = self.mustache_node(inner, inner_start, triple, span)? {
            self.flush_text();
            self.nodes.push(node);
        }
        self.trim_next_text = trim_after;
        Ok(())
    }

    fn mustache_node(&self, inner: &str, offset: usize, triple: bool, span: Span) -> Result<Option<Node>> {
        let mut body = inner;
        let mut escaped = !triple;

        if !triple {
            match body.chars().next() {
                Some('!') => return Ok(None),
                Some('&') => {
                    escaped = false;
                    body = &body[1..];
                }
                Some(c @ ('#' | '/' | '^' | '>' | '*')) => {
                    return Err(Error::unsupported_syntax(format!("{{{{{}...}}}}", c))
                        .with_operation("template::parse")
                        .with_context("line", span.start.line.to_string())
                        .with_context("column", span.start.column.to_string()));
                }
                _ => {}
            }
        }

        let tokens = tokenize(body).map_err(|(at, msg)| self.syntax_error(offset + at, msg))?;
        let mut tokens = tokens.into_iter();
        let head = match tokens.next() {
            Some(Token::Path(p)) => p,
            Some(Token::Literal(_)) => {
                return Err(self.syntax_error(offset, "expected a path or helper name"));
            }
            None => return Err(self.syntax_error(offset, "empty mustache")),
        };
        if head.original == "else" {
            return Err(Error::unsupported_syntax("{{else}}").with_operation("template::parse"));
        }

        let params = tokens
            .map(|t| match t {
                Token::Path(p) => Expr::Path(p),
                Token::Literal(v) => Expr::Literal(v),
            })
            .collect();

        Ok(Some(Node::Mustache(Mustache {
            escaped,
            head,
            params,
            span,
        })))
    }
}

enum Token {
    Path(PathExpr),
    Literal(Value),
}

type TokenError = (usize, String);

fn tokenize(body: &str) -> std::result::Result<Vec<Token>, TokenError> {
    let mut tokens = Vec::new();
    let bytes = body.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => {
                let (lit, next) = string_literal(body, i)?;
                tokens.push(Token::Literal(Value::String(lit)));
                i = next;
            }
            b'(' | b')' => return Err((i, "sub-expressions are not supported".to_string())),
            _ => {
                let end = body[i..]
                    .find(|ch: char| ch.is_whitespace() || ch == '"' || ch == '\'' || ch == '(' || ch == ')')
                    .map(|n| n + i)
                    .unwrap_or(body.len());
                let word = &body[i..end];
                if word.contains('=') {
                    return Err((i, format!("hash argument '{}' is not supported", word)));
                }
                tokens.push(word_token(word).map_err(|msg| (i, msg))?);
                i = end;
            }
        }
    }
    Ok(tokens)
}

fn string_literal(body: &str, start: usize) -> std::result::Result<(String, usize), TokenError> {
    let quote = body.as_bytes()[start] as char;
    let mut out = String::new();
    let mut chars = body[start + 1..].char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            c if c == quote => return Ok((out, start + 1 + i + 1)),
            c => out.push(c),
        }
    }
    Err((start, "unterminated string literal".to_string()))
}

fn word_token(word: &str) -> std::result::Result<Token, String> {
    match word {
        "true" => return Ok(Token::Literal(Value::Bool(true))),
        "false" => return Ok(Token::Literal(Value::Bool(false))),
        "null" | "undefined" => return Ok(Token::Literal(Value::Null)),
        _ => {}
    }

    let numeric = word.strip_prefix('-').unwrap_or(word);
    if numeric.starts_with(|c: char| c.is_ascii_digit()) {
        if let Ok(n) = word.parse::<i64>() {
            return Ok(Token::Literal(Value::Int(n)));
        }
        if let Ok(f) = word.parse::<f64>() {
            return Ok(Token::Literal(Value::Float(f)));
        }
        return Err(format!("invalid number '{}'", word));
    }

    path_expr(word).map(Token::Path)
}

fn path_expr(word: &str) -> std::result::Result<PathExpr, String> {
    if word.starts_with("../") || word == ".." {
        return Err("parent context paths ('../') are not supported".to_string());
    }
    if word.starts_with('@') {
        return Err(format!("data variable '{}' is not supported", word));
    }

    let mut segments = Vec::new();
    let trimmed = word.strip_prefix("./").unwrap_or(word);
    if trimmed != "." && trimmed != "this" {
        for (i, segment) in trimmed.split(['.', '/']).enumerate() {
            if segment.is_empty() {
                return Err(format!("invalid path '{}'", word));
            }
            if i == 0 && segment == "this" {
                continue;
            }
            segments.push(segment.to_string());
        }
    }

    Ok(PathExpr {
        original: word.to_string(),
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use appex_error::ErrorKind;

    fn mustaches(t: &Template) -> Vec<&Mustache> {
        t.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Mustache(m) => Some(m),
                Node::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_is_one_node() {
        let t = parse("no mustaches here").unwrap();
        assert_eq!(t.nodes, vec![Node::Text("no mustaches here".into())]);
    }

    #[test]
    fn double_and_triple_mustaches() {
        let t = parse("a {{x.y}} b {{{z}}} c {{&w}}").unwrap();
        let m = mustaches(&t);
        assert_eq!(m.len(), 3);
        assert!(m[0].escaped);
        assert_eq!(m[0].head.segments, vec!["x", "y"]);
        assert!(!m[1].escaped);
        assert_eq!(m[1].head.segments, vec!["z"]);
        assert!(!m[2].escaped);
        assert_eq!(m[2].head.segments, vec!["w"]);
    }

    #[test]
    fn helper_params_cover_all_literal_kinds() {
        let t = parse(r#"{{pad-end 20 "x y" 'q' -3 1.5 true null self.id}}"#).unwrap();
        let m = mustaches(&t)[0];
        assert_eq!(m.head.helper_name(), Some("pad-end"));
        assert_eq!(
            m.params,
            vec![
                Expr::Literal(Value::Int(20)),
                Expr::Literal(Value::from("x y")),
                Expr::Literal(Value::from("q")),
                Expr::Literal(Value::Int(-3)),
                Expr::Literal(Value::Float(1.5)),
                Expr::Literal(Value::Bool(true)),
                Expr::Literal(Value::Null),
                Expr::Path(PathExpr {
                    original: "self.id".into(),
                    segments: vec!["self".into(), "id".into()],
                }),
            ]
        );
    }

    #[test]
    fn this_paths_resolve_to_context() {
        let t = parse("{{this}} {{this.a}} {{./b}}").unwrap();
        let m = mustaches(&t);
        assert!(m[0].head.segments.is_empty());
        assert_eq!(m[1].head.segments, vec!["a"]);
        assert_eq!(m[2].head.segments, vec!["b"]);
        assert_eq!(m[1].head.helper_name(), None);
    }

    #[test]
    fn comments_are_dropped() {
        let t = parse("a{{! short }}b{{!-- long }} still comment --}}c").unwrap();
        assert_eq!(t.nodes, vec![Node::Text("abc".into())]);
    }

    #[test]
    fn escaped_open_braces_are_literal() {
        let t = parse(r"\{{not a mustache}}").unwrap();
        assert_eq!(t.nodes, vec![Node::Text("{{not a mustache}}".into())]);
    }

    #[test]
    fn whitespace_control_trims_neighbours() {
        let t = parse("a   {{~x~}}   b").unwrap();
        assert_eq!(t.nodes.len(), 3);
        assert_eq!(t.nodes[0], Node::Text("a".into()));
        assert_eq!(t.nodes[2], Node::Text("b".into()));
    }

    #[test]
    fn span_reports_line_and_column() {
        let t = parse("line one\n  {{x}}").unwrap();
        let m = mustaches(&t)[0];
        assert_eq!(m.span.start, Pos { line: 2, column: 2 });
        assert_eq!(m.span.end, Pos { line: 2, column: 7 });
        assert_eq!(m.span.to_string(), "2:2 - 2:7");
    }

    #[test]
    fn unclosed_mustache_is_a_syntax_error() {
        let err = parse("hello {{name").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateSyntax);
        assert_eq!(err.context_value("line"), Some("1"));
        assert_eq!(err.context_value("column"), Some("6"));
    }

    #[test]
    fn empty_mustache_is_a_syntax_error() {
        assert_eq!(parse("{{ }}").unwrap_err().kind(), ErrorKind::TemplateSyntax);
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        assert_eq!(parse(r#"{{json "abc}}"#).unwrap_err().kind(), ErrorKind::TemplateSyntax);
    }

    #[test]
    fn block_and_partial_syntax_is_rejected() {
        for src in ["{{#if x}}y{{/if}}", "{{> partial}}", "{{^x}}", "{{else}}"] {
            let err = parse(src).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedSyntax, "source: {src}");
        }
    }

    #[test]
    fn hash_and_subexpressions_are_rejected() {
        assert_eq!(parse("{{h a=1}}").unwrap_err().kind(), ErrorKind::TemplateSyntax);
        assert_eq!(parse("{{h (g 1)}}").unwrap_err().kind(), ErrorKind::TemplateSyntax);
        assert_eq!(parse("{{a..b}}").unwrap_err().kind(), ErrorKind::TemplateSyntax);
        assert_eq!(parse("{{../a}}").unwrap_err().kind(), ErrorKind::TemplateSyntax);
    }
}
