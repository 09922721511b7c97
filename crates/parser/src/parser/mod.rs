use std::str::FromStr;

use bigdecimal::BigDecimal;
use dialect::ExpressionDialect;
use errors::SyntaxError;
use sqlparser::tokenizer::{Token, TokenWithLocation, Tokenizer};

use crate::ast::{Call, Expr, Ident, Literal, LogOp, Path, Span, UnOp, BinOp, ASSIGN_PRECEDENCE};

pub mod dialect;
pub mod errors;
pub mod recursion;

pub type SyntaxResult<T> = core::result::Result<T, SyntaxError>;

/// Limits applied while parsing an expression.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// The longest expression text accepted, in bytes.
    pub max_length: usize,
    /// The deepest nesting of sub-expressions accepted.
    pub recursion_limit: usize,
}

/// The maximum length of an expression in bytes.
pub const MAX_EXPRESSION_LENGTH: usize = 50_000;

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_length: MAX_EXPRESSION_LENGTH,
            recursion_limit: recursion::MAX_RECURSION_EXPR,
        }
    }
}

/// Parse an attribute expression with the default [ParseOptions].
pub fn parse_expr(text: &str) -> SyntaxResult<Expr> {
    parse_expr_with(text, ParseOptions::default())
}

/// Parse an attribute expression.
pub fn parse_expr_with(text: &str, options: ParseOptions) -> SyntaxResult<Expr> {
    if text.len() > options.max_length {
        return Err(SyntaxError::TooLong {
            len: text.len(),
            max: options.max_length,
        });
    }
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(SyntaxError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: text.len(),
        recursion_limit: options.recursion_limit,
    };
    let expr = parser.parse_top()?;
    tracing::trace!(expr = %expr, "parsed expression");
    Ok(expr)
}

/// Converts the tokenizer's 1-based line/column locations into byte offsets.
struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    fn offset(&self, line: u64, column: u64) -> usize {
        let Some(&start) = (line as usize).checked_sub(1).and_then(|l| self.starts.get(l)) else {
            return self.text.len();
        };
        self.text[start..]
            .char_indices()
            .nth((column as usize).saturating_sub(1))
            .map_or(self.text.len(), |(i, _)| start + i)
    }
}

/// Lex `text` into tokens paired with their byte spans, dropping whitespace.
fn tokenize(text: &str) -> SyntaxResult<Vec<(Token, Span)>> {
    let tokens = Tokenizer::new(&ExpressionDialect {}, text)
        .tokenize_with_location()
        .map_err(|e| SyntaxError::Tokenizer {
            message: e.to_string(),
            span: Span::new(0, text.len()),
        })?;
    let index = LineIndex::new(text);
    let starts = tokens
        .iter()
        .map(|TokenWithLocation { location, .. }| index.offset(location.line, location.column))
        .collect::<Vec<_>>();
    Ok(tokens
        .into_iter()
        .enumerate()
        .filter(|(_, t)| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .map(|(i, t)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            (t.token, Span::new(starts[i], end))
        })
        .collect())
}

fn is_word(token: &Token, kw: &str) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.value == kw)
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    depth: usize,
    /// Length of the text, used for errors at the end of input
    end: usize,
    recursion_limit: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, Span)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eof_span(&self) -> Span {
        Span::new(self.end, self.end)
    }

    fn unexpected(&self, expected: &'static str) -> SyntaxError {
        match self.tokens.get(self.pos) {
            Some((token, span)) => SyntaxError::Expect {
                expected,
                found: token.to_string(),
                span: *span,
            },
            None => SyntaxError::Eof {
                expected,
                span: self.eof_span(),
            },
        }
    }

    fn expect(&mut self, token: Token, expected: &'static str) -> SyntaxResult<Span> {
        match self.tokens.get(self.pos) {
            Some((t, span)) if *t == token => {
                let span = *span;
                self.pos += 1;
                Ok(span)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn parse_top(&mut self) -> SyntaxResult<Expr> {
        let expr = self.parse_expr(0)?;
        if self.pos < self.tokens.len() {
            return Err(self.unexpected("end of expression"));
        }
        Ok(expr)
    }

    /// The infix operator at the cursor, its precedence, and the number of tokens it spans.
    fn peek_infix(&self) -> Option<(Infix, u8, usize)> {
        let token = self.peek()?;
        let bin = |op: BinOp| Some((Infix::Bin(op), op.precedence(), 1));
        match token {
            Token::DoubleEq => bin(BinOp::Eq),
            Token::Neq => bin(BinOp::Ne),
            Token::Lt => bin(BinOp::Lt),
            Token::Gt => bin(BinOp::Gt),
            Token::LtEq => bin(BinOp::Lte),
            Token::GtEq => bin(BinOp::Gte),
            Token::Plus => bin(BinOp::Add),
            Token::Minus => bin(BinOp::Sub),
            Token::Mul => bin(BinOp::Mul),
            Token::Div => bin(BinOp::Div),
            Token::Eq => Some((Infix::Assign, ASSIGN_PRECEDENCE, 1)),
            t if is_word(t, "in") => bin(BinOp::In),
            t if is_word(t, "and") => Some((Infix::Log(LogOp::And), LogOp::And.precedence(), 1)),
            t if is_word(t, "or") => Some((Infix::Log(LogOp::Or), LogOp::Or.precedence(), 1)),
            t if is_word(t, "not") && self.peek_nth(1).is_some_and(|t| is_word(t, "in")) => {
                Some((Infix::Bin(BinOp::NotIn), BinOp::NotIn.precedence(), 2))
            }
            _ => None,
        }
    }

    /// Parse an expression whose operators all bind tighter than `min`.
    fn parse_expr(&mut self, min: u8) -> SyntaxResult<Expr> {
        recursion::guard(self.depth, self.recursion_limit, "parser::parse_expr")?;
        self.depth += 1;
        let result = self.parse_expr_inner(min);
        self.depth -= 1;
        result
    }

    fn parse_expr_inner(&mut self, min: u8) -> SyntaxResult<Expr> {
        let mut lhs = self.parse_prefix()?;
        while let Some((op, prec, len)) = self.peek_infix() {
            if prec <= min {
                break;
            }
            self.pos += len;
            lhs = match op {
                Infix::Bin(op) => {
                    let rhs = self.parse_expr(prec)?;
                    let span = lhs.span().to(rhs.span());
                    Expr::Bin(Box::new(lhs), Box::new(rhs), op, span)
                }
                Infix::Log(op) => {
                    let rhs = self.parse_expr(prec)?;
                    let span = lhs.span().to(rhs.span());
                    Expr::Log(Box::new(lhs), Box::new(rhs), op, span)
                }
                Infix::Assign => {
                    let Expr::Path(path) = lhs else {
                        return Err(SyntaxError::AssignTarget { span: lhs.span() });
                    };
                    // right associative
                    let rhs = self.parse_expr(prec - 1)?;
                    let span = path.span.to(rhs.span());
                    Expr::Assign(path, Box::new(rhs), span)
                }
            };
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> SyntaxResult<Expr> {
        let Some((token, span)) = self.next() else {
            return Err(SyntaxError::Eof {
                expected: "an expression",
                span: self.eof_span(),
            });
        };
        match token {
            Token::Word(w) if w.quote_style == Some('"') => Ok(Expr::Lit(Literal::Str(w.value.into()), span)),
            Token::SingleQuotedString(s) | Token::DoubleQuotedString(s) => Ok(Expr::Lit(Literal::Str(s.into()), span)),
            Token::Number(n, _) => Ok(Expr::Lit(parse_num(n, span)?, span)),
            Token::Minus => {
                // `-1` is a literal, `-x` is negation
                if let Some(Token::Number(..)) = self.peek() {
                    if let Some((Token::Number(n, _), num_span)) = self.next() {
                        let span = span.to(num_span);
                        return Ok(Expr::Lit(parse_num(format!("-{n}"), span)?, span));
                    }
                }
                let expr = self.parse_expr(UnOp::Neg.precedence())?;
                let span = span.to(expr.span());
                Ok(Expr::Unary(UnOp::Neg, Box::new(expr), span))
            }
            Token::LParen => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                let (elems, end) = self.parse_list(Token::RBracket, "']'")?;
                Ok(Expr::Array(elems, span.to(end)))
            }
            Token::Word(w) => match w.value.as_str() {
                "true" => Ok(Expr::Lit(Literal::Bool(true), span)),
                "false" => Ok(Expr::Lit(Literal::Bool(false), span)),
                "null" => Ok(Expr::Lit(Literal::Null, span)),
                "not" => {
                    let expr = self.parse_expr(UnOp::Not.precedence())?;
                    let span = span.to(expr.span());
                    Ok(Expr::Unary(UnOp::Not, Box::new(expr), span))
                }
                "and" | "or" | "in" => {
                    self.pos -= 1;
                    Err(self.unexpected("an expression"))
                }
                _ => self.parse_path_or_call(Ident { name: w.value, span }),
            },
            _ => {
                self.pos -= 1;
                Err(self.unexpected("an expression"))
            }
        }
    }

    /// Parse a comma separated list of expressions up to and including `close`.
    fn parse_list(&mut self, close: Token, expected: &'static str) -> SyntaxResult<(Vec<Expr>, Span)> {
        let mut elems = vec![];
        if self.peek() == Some(&close) {
            let end = self.expect(close, expected)?;
            return Ok((elems, end));
        }
        loop {
            elems.push(self.parse_expr(0)?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                _ => {
                    let end = self.expect(close, expected)?;
                    return Ok((elems, end));
                }
            }
        }
    }

    fn parse_ident(&mut self) -> SyntaxResult<Ident> {
        match self.tokens.get(self.pos) {
            Some((Token::Word(w), span)) if w.quote_style.is_none() => {
                let ident = Ident {
                    name: w.value.clone(),
                    span: *span,
                };
                self.pos += 1;
                Ok(ident)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn parse_path_or_call(&mut self, first: Ident) -> SyntaxResult<Expr> {
        let mut parts = vec![first];
        while self.peek() == Some(&Token::Period) {
            self.pos += 1;
            parts.push(self.parse_ident()?);
        }
        let mut expr = match self.peek() {
            Some(Token::LParen) => {
                let name = parts.pop().ok_or_else(|| self.unexpected("an identifier"))?;
                let target = (!parts.is_empty()).then(|| Box::new(Expr::Path(path_of(parts))));
                self.parse_call(target, name)?
            }
            _ => return Ok(Expr::Path(path_of(parts))),
        };
        // method calls chained onto a call, e.g. `UPPER(x).size()`
        while self.peek() == Some(&Token::Period) {
            self.pos += 1;
            let name = self.parse_ident()?;
            if self.peek() != Some(&Token::LParen) {
                return Err(self.unexpected("'('"));
            }
            expr = self.parse_call(Some(Box::new(expr)), name)?;
        }
        Ok(expr)
    }

    fn parse_call(&mut self, target: Option<Box<Expr>>, name: Ident) -> SyntaxResult<Expr> {
        self.expect(Token::LParen, "'('")?;
        let (args, end) = self.parse_list(Token::RParen, "')'")?;
        let start = target.as_ref().map_or(name.span, |t| t.span());
        Ok(Expr::Call(Call {
            target,
            name,
            args,
            span: start.to(end),
        }))
    }
}

enum Infix {
    Bin(BinOp),
    Log(LogOp),
    Assign,
}

fn path_of(parts: Vec<Ident>) -> Path {
    let span = parts
        .iter()
        .map(|p| p.span)
        .reduce(Span::to)
        .unwrap_or_default();
    Path { parts, span }
}

/// Validate a numeric literal, keeping its text as written
fn parse_num(n: String, span: Span) -> SyntaxResult<Literal> {
    match BigDecimal::from_str(&n) {
        Ok(_) => Ok(Literal::Num(n.into_boxed_str())),
        Err(_) => Err(SyntaxError::InvalidNumber { literal: n, span }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trip() {
        for text in [
            // literals
            "1",
            "-1",
            "1.5",
            "true",
            "false",
            "null",
            "\"hello\"",
            "\"say \"\"hi\"\"\"",
            // arrays
            "[]",
            "[1, 2, 3]",
            "[\"a\", \"b\"]",
            // comparisons
            "post.title == \"x\"",
            "post.title != \"x\"",
            "post.views < 10",
            "post.views <= 10",
            "post.views > 10",
            "post.views >= 10",
            // membership
            "post.status in [Status.Draft, Status.Published]",
            "post.status not in [Status.Draft]",
            "ctx.identity in post.editors.identity",
            // assignment
            "post.title = \"x\"",
            "post.views = post.views + 1",
            // logical combination
            "post.published and post.views > 10",
            "a or b and c",
            "(a or b) and c",
            "not post.published",
            "not (a and b)",
            "a and not b",
            // arithmetic and parentheses
            "a - (b - c)",
            "a - b - c",
            "(a + b) * c",
            "a + b * c",
            "-post.views",
            "a - -1",
            // calls
            "UPPER(post.title)",
            "post.title.size()",
            "SUM(invoice.items.price, invoice.items.paid)",
            "COUNT(order.items)",
        ] {
            let expr = parse_expr(text).unwrap_or_else(|e| panic!("{text}: {e}"));
            assert_eq!(expr.to_string(), text);
        }
    }

    #[test]
    fn normalization() {
        for (text, normalized) in [
            ("a==b", "a == b"),
            ("((a))", "a"),
            ("'single'", "\"single\""),
            ("a and (b and c)", "a and (b and c)"),
            ("(a and b) and c", "a and b and c"),
            ("not(a)", "not a"),
            ("a <> b", "a != b"),
            ("(a == b) == c", "a == b == c"),
            ("- - x", "-(-x)"),
        ] {
            let expr = parse_expr(text).unwrap();
            assert_eq!(expr.to_string(), normalized, "{text}");
            // printing is idempotent
            assert_eq!(parse_expr(normalized).unwrap().to_string(), normalized);
        }
    }

    #[test]
    fn spans() {
        let text = "post.title == \"hello\"";
        let Expr::Bin(lhs, rhs, BinOp::Eq, span) = parse_expr(text).unwrap() else {
            panic!("expected a comparison");
        };
        assert_eq!(span, Span::new(0, text.len()));
        assert_eq!(&text[std::ops::Range::from(lhs.span())], "post.title");
        assert_eq!(&text[std::ops::Range::from(rhs.span())], "\"hello\"");

        let text = "a and\n  post.naem";
        let Expr::Log(_, rhs, LogOp::And, _) = parse_expr(text).unwrap() else {
            panic!("expected a conjunction");
        };
        let Expr::Path(path) = *rhs else {
            panic!("expected a path");
        };
        assert_eq!(&text[std::ops::Range::from(path.parts[1].span)], "naem");
    }

    #[test]
    fn unsupported() {
        for text in [
            // empty
            "",
            "   ",
            // dangling operators
            "a ==",
            "== a",
            "a and",
            "not",
            // unbalanced brackets
            "(a",
            "[1, 2",
            "a)",
            // assignment to a non-path
            "1 = 2",
            // trailing input
            "a b",
            // bad method calls
            "UPPER(a).b",
            "a.",
        ] {
            assert!(parse_expr(text).is_err(), "{text:?} should not parse");
        }
    }

    #[test]
    fn limits() {
        let options = ParseOptions {
            max_length: 10,
            ..Default::default()
        };
        assert_eq!(
            parse_expr_with("post.title == \"x\"", options),
            Err(SyntaxError::TooLong { len: 17, max: 10 })
        );

        let deep = format!("{}a{}", "(".repeat(100), ")".repeat(100));
        let options = ParseOptions {
            recursion_limit: 50,
            ..Default::default()
        };
        assert!(matches!(parse_expr_with(&deep, options), Err(SyntaxError::Recursion(_))));
        assert!(parse_expr(&deep).is_ok());
    }
}
