//! Token definitions for the binding language.

use std::fmt;

use num_bigint::BigInt;
use serde::Serialize;

/// Source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    /// Start byte offset.
    pub start: usize,
    /// End byte offset.
    pub end: usize,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }

    /// Merge two spans, keeping the position of the first.
    pub fn merge(self, other: Span) -> Self {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line,
            column: self.column,
        }
    }
}

/// One piece of a template literal.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text between substitutions, escapes already applied.
    Quasi(String),
    /// Tokens of one `${...}` substitution, terminated by `Eof`.
    Substitution(Vec<Token>),
}

/// Token types.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Number literal within the safe integer range, or any fractional value.
    Number(f64),
    /// Integer literal with an `n` suffix or beyond the safe integer range.
    BigInt(BigInt),
    /// String literal ("hello", 'world')
    String(String),
    /// Template literal (`hello ${name}`)
    Template(Vec<TemplatePart>),
    True,
    False,
    Null,
    Undefined,

    /// Identifier (variable name, function name, etc.)
    Identifier(String),

    // Keywords
    Break,
    Case,
    Catch,
    Const,
    Continue,
    Default,
    Delete,
    Do,
    Else,
    Export,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    Let,
    Return,
    Switch,
    Throw,
    Try,
    Typeof,
    Var,
    While,

    // Punctuators
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// .
    Dot,
    /// ...
    Ellipsis,
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// <
    LessThan,
    /// >
    GreaterThan,
    /// <=
    LessEqual,
    /// >=
    GreaterEqual,
    /// ==
    Equal,
    /// !=
    NotEqual,
    /// ===
    StrictEqual,
    /// !==
    StrictNotEqual,
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// **
    StarStar,
    /// ++
    PlusPlus,
    /// --
    MinusMinus,
    /// <<
    LeftShift,
    /// >>
    RightShift,
    /// >>>
    UnsignedRightShift,
    /// &
    Ampersand,
    /// |
    Pipe,
    /// ^
    Caret,
    /// !
    Bang,
    /// ~
    Tilde,
    /// &&
    AmpersandAmpersand,
    /// ||
    PipePipe,
    /// ??
    QuestionQuestion,
    /// ?
    Question,
    /// ?.
    QuestionDot,
    /// :
    Colon,
    /// =
    Assign,
    /// +=
    PlusAssign,
    /// -=
    MinusAssign,
    /// *=
    StarAssign,
    /// /=
    SlashAssign,
    /// %=
    PercentAssign,
    /// **=
    StarStarAssign,
    /// <<=
    LeftShiftAssign,
    /// >>=
    RightShiftAssign,
    /// >>>=
    UnsignedRightShiftAssign,
    /// &=
    AmpersandAssign,
    /// |=
    PipeAssign,
    /// ^=
    CaretAssign,
    /// &&=
    AmpersandAmpersandAssign,
    /// ||=
    PipePipeAssign,
    /// ??=
    QuestionQuestionAssign,
    /// =>
    Arrow,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Check if this is an assignment operator.
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::StarAssign
                | TokenKind::SlashAssign
                | TokenKind::PercentAssign
                | TokenKind::StarStarAssign
                | TokenKind::LeftShiftAssign
                | TokenKind::RightShiftAssign
                | TokenKind::UnsignedRightShiftAssign
                | TokenKind::AmpersandAssign
                | TokenKind::PipeAssign
                | TokenKind::CaretAssign
                | TokenKind::AmpersandAmpersandAssign
                | TokenKind::PipePipeAssign
                | TokenKind::QuestionQuestionAssign
        )
    }

    /// Get keyword from string.
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "break" => Some(TokenKind::Break),
            "case" => Some(TokenKind::Case),
            "catch" => Some(TokenKind::Catch),
            "const" => Some(TokenKind::Const),
            "continue" => Some(TokenKind::Continue),
            "default" => Some(TokenKind::Default),
            "delete" => Some(TokenKind::Delete),
            "do" => Some(TokenKind::Do),
            "else" => Some(TokenKind::Else),
            "export" => Some(TokenKind::Export),
            "finally" => Some(TokenKind::Finally),
            "for" => Some(TokenKind::For),
            "function" => Some(TokenKind::Function),
            "if" => Some(TokenKind::If),
            "import" => Some(TokenKind::Import),
            "in" => Some(TokenKind::In),
            "let" => Some(TokenKind::Let),
            "return" => Some(TokenKind::Return),
            "switch" => Some(TokenKind::Switch),
            "throw" => Some(TokenKind::Throw),
            "try" => Some(TokenKind::Try),
            "typeof" => Some(TokenKind::Typeof),
            "var" => Some(TokenKind::Var),
            "while" => Some(TokenKind::While),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "null" => Some(TokenKind::Null),
            "undefined" => Some(TokenKind::Undefined),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::BigInt(n) => write!(f, "{}n", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Template(_) => write!(f, "template literal"),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::Equal => write!(f, "=="),
            TokenKind::StrictEqual => write!(f, "==="),
            TokenKind::Eof => write!(f, "end of input"),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// A token with source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Source location.
    pub span: Span,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    /// Check if this is EOF.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
