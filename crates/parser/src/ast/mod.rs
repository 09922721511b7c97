use std::fmt::{self, Display};
use std::ops::Range;

/// A byte range into the expression text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}

/// A name in an expression, e.g. `post` or `title` in `post.title`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// A dotted path of identifiers, e.g. `post.author.name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub parts: Vec<Ident>,
    pub span: Span,
}

impl Path {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|p| p.name.as_str())
    }

    /// The path as written, e.g. `post.author.name`
    pub fn dotted(&self) -> String {
        self.names().collect::<Vec<_>>().join(".")
    }
}

/// A function or method call.
/// `UPPER(x)` has no target, `post.title.size()` has target `post.title`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub target: Option<Box<Expr>>,
    pub name: Ident,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// A constant expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Bool(bool),
    Null,
    /// An integer or decimal number, including its sign
    Num(Box<str>),
    Str(Box<str>),
}

impl Literal {
    pub fn is_decimal(&self) -> bool {
        matches!(self, Self::Num(n) if n.contains(['.', 'e', 'E']))
    }
}

/// Binary infix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Gt | Self::Lte | Self::Gte | Self::In | Self::NotIn
        )
    }

    pub fn precedence(self) -> u8 {
        match self {
            Self::Mul | Self::Div => 7,
            Self::Add | Self::Sub => 6,
            _ => 5,
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Gte => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        })
    }
}

/// Logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogOp {
    And,
    Or,
}

impl LogOp {
    pub fn precedence(self) -> u8 {
        match self {
            Self::And => 3,
            Self::Or => 2,
        }
    }
}

impl Display for LogOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "and",
            Self::Or => "or",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Not,
    Neg,
}

impl UnOp {
    pub fn precedence(self) -> u8 {
        match self {
            Self::Not => 4,
            Self::Neg => 8,
        }
    }
}

/// Precedence of the assignment operator `=`.
pub const ASSIGN_PRECEDENCE: u8 = 1;
/// Precedence of literals, paths, calls and anything in brackets.
pub const ATOM_PRECEDENCE: u8 = 9;

/// An expression as written in a schema attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant expression
    Lit(Literal, Span),
    /// A dotted identifier path
    Path(Path),
    /// A list literal, e.g. `[1, 2, 3]`
    Array(Vec<Expr>, Span),
    /// A prefix expression, `not x` or `-x`
    Unary(UnOp, Box<Expr>, Span),
    /// A binary infix expression
    Bin(Box<Expr>, Box<Expr>, BinOp, Span),
    /// A logical expression
    Log(Box<Expr>, Box<Expr>, LogOp, Span),
    Call(Call),
    /// An assignment `post.title = "x"`, allowed only at the top of `@set`
    Assign(Path, Box<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::Lit(_, span)
            | Self::Array(_, span)
            | Self::Unary(_, _, span)
            | Self::Bin(_, _, _, span)
            | Self::Log(_, _, _, span)
            | Self::Assign(_, _, span) => *span,
            Self::Path(path) => path.span,
            Self::Call(call) => call.span,
        }
    }

    /// How tightly this expression binds when printed.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Assign(..) => ASSIGN_PRECEDENCE,
            Self::Log(_, _, op, _) => op.precedence(),
            Self::Unary(op, ..) => op.precedence(),
            Self::Bin(_, _, op, _) => op.precedence(),
            Self::Lit(Literal::Num(n), _) if n.starts_with('-') => UnOp::Neg.precedence(),
            Self::Lit(..) | Self::Path(_) | Self::Array(..) | Self::Call(_) => ATOM_PRECEDENCE,
        }
    }

    /// Write `self`, bracketed if it binds looser than `min`.
    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
            Self::Num(n) => f.write_str(n),
            Self::Str(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
        }
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lit(lit, _) => write!(f, "{lit}"),
            Self::Path(path) => write!(f, "{path}"),
            Self::Array(elems, _) => {
                f.write_str("[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                f.write_str("]")
            }
            Self::Unary(UnOp::Not, expr, _) => {
                f.write_str("not ")?;
                expr.fmt_operand(f, UnOp::Not.precedence())
            }
            Self::Unary(UnOp::Neg, expr, _) => {
                f.write_str("-")?;
                // `--` would start a comment
                let operand = expr.to_string();
                if expr.precedence() < UnOp::Neg.precedence() || operand.starts_with('-') {
                    write!(f, "({operand})")
                } else {
                    f.write_str(&operand)
                }
            }
            Self::Bin(lhs, rhs, op, _) => {
                let p = op.precedence();
                lhs.fmt_operand(f, p)?;
                write!(f, " {op} ")?;
                rhs.fmt_operand(f, p + 1)
            }
            Self::Log(lhs, rhs, op, _) => {
                let p = op.precedence();
                lhs.fmt_operand(f, p)?;
                write!(f, " {op} ")?;
                rhs.fmt_operand(f, p + 1)
            }
            Self::Call(Call { target, name, args, .. }) => {
                if let Some(target) = target {
                    target.fmt_operand(f, ATOM_PRECEDENCE)?;
                    f.write_str(".")?;
                }
                write!(f, "{}(", name.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Assign(path, value, _) => {
                write!(f, "{path} = ")?;
                value.fmt_operand(f, ASSIGN_PRECEDENCE)
            }
        }
    }
}
