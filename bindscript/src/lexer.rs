//! Lexer (tokenizer) for the binding language.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::error::{ScriptError, ScriptResult};
use crate::token::{Span, TemplatePart, Token, TokenKind};

/// Largest integer a number literal may hold before it becomes a BigInt.
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Lexer over one source string.
pub struct Lexer<'a> {
    /// Source code.
    source: &'a str,
    /// Current byte position.
    pos: usize,
    /// Current line (1-based).
    line: usize,
    /// Current column (1-based).
    column: usize,
    /// Start of current token.
    token_start: usize,
    /// Start line of current token.
    token_line: usize,
    /// Start column of current token.
    token_column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            pos: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_line: 1,
            token_column: 1,
        }
    }

    /// Tokenize the entire source.
    pub fn tokenize(&mut self) -> ScriptResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> ScriptResult<Token> {
        self.skip_whitespace_and_comments()?;

        self.token_start = self.pos;
        self.token_line = self.line;
        self.token_column = self.column;

        if self.is_eof() {
            return Ok(self.make_token(TokenKind::Eof));
        }

        let ch = self.current();

        if ch.is_ascii_digit() || (ch == '.' && self.peek().is_ascii_digit()) {
            return self.scan_number();
        }

        if ch == '"' || ch == '\'' {
            return self.scan_string(ch);
        }

        if ch == '`' {
            return self.scan_template();
        }

        if is_id_start(ch) {
            return self.scan_identifier();
        }

        self.scan_punctuator()
    }

    /// Skip whitespace and comments.
    fn skip_whitespace_and_comments(&mut self) -> ScriptResult<()> {
        loop {
            while !self.is_eof() && is_whitespace(self.current()) {
                self.advance();
            }

            if self.current() == '/' && self.peek() == '/' {
                while !self.is_eof() && self.current() != '\n' {
                    self.advance();
                }
                continue;
            }

            if self.current() == '/' && self.peek() == '*' {
                let open = self.here();
                self.advance(); // /
                self.advance(); // *
                loop {
                    if self.is_eof() {
                        return Err(ScriptError::syntax("Unterminated comment", open));
                    }
                    if self.current() == '*' && self.peek() == '/' {
                        self.advance(); // *
                        self.advance(); // /
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            return Ok(());
        }
    }

    /// Scan a run of digits in `radix`, dropping `_` separators.
    fn scan_digits(&mut self, radix: u32) -> ScriptResult<String> {
        let mut digits = String::new();
        let mut after_separator = false;

        while !self.is_eof() {
            let ch = self.current();
            if ch == '_' {
                if digits.is_empty() || after_separator {
                    return Err(self.error("Numeric separators are not allowed here"));
                }
                after_separator = true;
            } else if ch.is_digit(radix) {
                digits.push(ch);
                after_separator = false;
            } else {
                break;
            }
            self.advance();
        }

        if after_separator {
            return Err(self.error("Numeric separators are not allowed at the end of numeric literals"));
        }
        Ok(digits)
    }

    /// Scan a number literal.
    fn scan_number(&mut self) -> ScriptResult<Token> {
        if self.current() == '0' && matches!(self.peek(), 'x' | 'X' | 'o' | 'O' | 'b' | 'B') {
            self.advance(); // 0
            let radix = match self.current() {
                'x' | 'X' => 16,
                'o' | 'O' => 8,
                _ => 2,
            };
            self.advance();
            let digits = self.scan_digits(radix)?;
            if digits.is_empty() {
                return Err(self.error("Invalid or unexpected number literal"));
            }
            let suffix = self.consume_bigint_suffix();
            return self.integer_token(&digits, radix, suffix);
        }

        let integer = self.scan_digits(10)?;
        let mut text = if integer.is_empty() {
            String::from("0")
        } else {
            integer.clone()
        };
        let mut is_integer = true;

        // Fractional part
        if self.current() == '.' && self.peek().is_ascii_digit() {
            self.advance(); // .
            text.push('.');
            text.push_str(&self.scan_digits(10)?);
            is_integer = false;
        }

        // Exponent
        if matches!(self.current(), 'e' | 'E')
            && (self.peek().is_ascii_digit() || matches!(self.peek(), '+' | '-'))
        {
            self.advance();
            text.push('e');
            if matches!(self.current(), '+' | '-') {
                text.push(self.current());
                self.advance();
            }
            let exponent = self.scan_digits(10)?;
            if exponent.is_empty() {
                return Err(self.error("Invalid or unexpected number literal"));
            }
            text.push_str(&exponent);
            is_integer = false;
        }

        if self.current() == 'n' {
            if !is_integer {
                return Err(self.error("Invalid BigInt literal"));
            }
            self.advance();
            return self.integer_token(&integer, 10, true);
        }

        if is_id_start(self.current()) {
            return Err(self.error("Identifier starts immediately after numeric literal"));
        }

        if is_integer {
            return self.integer_token(&integer, 10, false);
        }

        let value = text
            .parse::<f64>()
            .map_err(|_| self.error("Invalid or unexpected number literal"))?;
        Ok(self.make_token(TokenKind::Number(value)))
    }

    fn consume_bigint_suffix(&mut self) -> bool {
        if self.current() == 'n' {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Build an integer token, promoting to BigInt past the safe integer range.
    fn integer_token(&self, digits: &str, radix: u32, bigint: bool) -> ScriptResult<Token> {
        let value = BigInt::parse_bytes(digits.as_bytes(), radix)
            .ok_or_else(|| self.error("Invalid or unexpected number literal"))?;

        let kind = if bigint || value > BigInt::from(MAX_SAFE_INTEGER) {
            TokenKind::BigInt(value)
        } else {
            TokenKind::Number(value.to_f64().unwrap_or(f64::NAN))
        };
        Ok(self.make_token(kind))
    }

    /// Scan a string literal.
    fn scan_string(&mut self, quote: char) -> ScriptResult<Token> {
        self.advance(); // Opening quote
        let mut value = String::new();

        while !self.is_eof() && self.current() != quote {
            match self.current() {
                '\\' => {
                    self.advance();
                    self.scan_escape(&mut value, false)?;
                }
                '\n' => return Err(self.error("Unterminated string literal")),
                ch => {
                    value.push(ch);
                    self.advance();
                }
            }
        }

        if self.is_eof() {
            return Err(self.error("Unterminated string literal"));
        }

        self.advance(); // Closing quote
        Ok(self.make_token(TokenKind::String(value)))
    }

    /// Decode one escape sequence; the backslash is already consumed.
    ///
    /// Unknown escapes keep their backslash.
    fn scan_escape(&mut self, value: &mut String, template: bool) -> ScriptResult<()> {
        if self.is_eof() {
            return Err(self.error("Invalid or unexpected token"));
        }
        let ch = self.current();
        match ch {
            'n' => value.push('\n'),
            'r' => value.push('\r'),
            't' => value.push('\t'),
            'b' => value.push('\u{8}'),
            'f' => value.push('\u{c}'),
            'v' => value.push('\u{b}'),
            '0' if !self.peek().is_ascii_digit() => value.push('\0'),
            '\\' | '\'' | '"' => value.push(ch),
            '`' | '$' if template => value.push(ch),
            '\n' => {}
            'x' => {
                self.advance();
                let code = self.scan_hex_digits(2)?;
                value.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                return Ok(());
            }
            'u' => {
                self.advance();
                let code = if self.current() == '{' {
                    self.advance();
                    let mut hex = String::new();
                    while !self.is_eof() && self.current() != '}' {
                        hex.push(self.current());
                        self.advance();
                    }
                    if self.is_eof() {
                        return Err(self.error("Invalid Unicode escape sequence"));
                    }
                    self.advance(); // }
                    u32::from_str_radix(&hex, 16)
                        .map_err(|_| self.error("Invalid Unicode escape sequence"))?
                } else {
                    self.scan_hex_digits(4)?
                };
                let decoded = char::from_u32(code)
                    .ok_or_else(|| self.error("Undefined Unicode code-point"))?;
                value.push(decoded);
                return Ok(());
            }
            other => {
                value.push('\\');
                value.push(other);
            }
        }
        self.advance();
        Ok(())
    }

    /// Scan a template literal, lexing every `${...}` substitution eagerly.
    fn scan_template(&mut self) -> ScriptResult<Token> {
        let start = Span::new(self.token_start, self.token_start, self.token_line, self.token_column);
        self.advance(); // `
        let mut parts = Vec::new();
        let mut text = String::new();

        loop {
            if self.is_eof() {
                return Err(ScriptError::syntax("Unterminated template literal", start));
            }
            match self.current() {
                '`' => {
                    self.advance();
                    break;
                }
                '\\' => {
                    self.advance();
                    self.scan_escape(&mut text, true)?;
                }
                '$' if self.peek() == '{' => {
                    self.advance(); // $
                    self.advance(); // {
                    parts.push(TemplatePart::Quasi(std::mem::take(&mut text)));
                    let tokens = self.scan_substitution(start)?;
                    parts.push(TemplatePart::Substitution(tokens));
                }
                ch => {
                    text.push(ch);
                    self.advance();
                }
            }
        }

        parts.push(TemplatePart::Quasi(text));
        Ok(Token::new(
            TokenKind::Template(parts),
            Span::new(start.start, self.pos, start.line, start.column),
        ))
    }

    /// Collect tokens up to the `}` balancing a `${`.
    fn scan_substitution(&mut self, template: Span) -> ScriptResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;

        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace if depth == 0 => {
                    tokens.push(Token::new(TokenKind::Eof, token.span));
                    return Ok(tokens);
                }
                TokenKind::RightBrace => depth -= 1,
                TokenKind::Eof => {
                    return Err(ScriptError::syntax("Unterminated template literal", template));
                }
                _ => {}
            }
            tokens.push(token);
        }
    }

    /// Scan an identifier or keyword.
    fn scan_identifier(&mut self) -> ScriptResult<Token> {
        let start = self.pos;

        while !self.is_eof() && is_id_continue(self.current()) {
            self.advance();
        }

        let text = &self.source[start..self.pos];
        let kind = TokenKind::keyword_from_str(text)
            .unwrap_or_else(|| TokenKind::Identifier(String::from(text)));

        Ok(self.make_token(kind))
    }

    /// Scan a punctuator.
    fn scan_punctuator(&mut self) -> ScriptResult<Token> {
        let ch = self.current();
        self.advance();

        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,

            '.' => {
                if self.current() == '.' && self.peek() == '.' {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }

            '?' => {
                if self.current() == '?' {
                    self.advance();
                    if self.eat('=') {
                        TokenKind::QuestionQuestionAssign
                    } else {
                        TokenKind::QuestionQuestion
                    }
                } else if self.current() == '.' && !self.peek().is_ascii_digit() {
                    self.advance();
                    TokenKind::QuestionDot
                } else {
                    TokenKind::Question
                }
            }

            '<' => {
                if self.eat('=') {
                    TokenKind::LessEqual
                } else if self.eat('<') {
                    if self.eat('=') {
                        TokenKind::LeftShiftAssign
                    } else {
                        TokenKind::LeftShift
                    }
                } else {
                    TokenKind::LessThan
                }
            }

            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEqual
                } else if self.eat('>') {
                    if self.eat('>') {
                        if self.eat('=') {
                            TokenKind::UnsignedRightShiftAssign
                        } else {
                            TokenKind::UnsignedRightShift
                        }
                    } else if self.eat('=') {
                        TokenKind::RightShiftAssign
                    } else {
                        TokenKind::RightShift
                    }
                } else {
                    TokenKind::GreaterThan
                }
            }

            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::StrictEqual
                    } else {
                        TokenKind::Equal
                    }
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }

            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::StrictNotEqual
                    } else {
                        TokenKind::NotEqual
                    }
                } else {
                    TokenKind::Bang
                }
            }

            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }

            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }

            '*' => {
                if self.eat('*') {
                    if self.eat('=') {
                        TokenKind::StarStarAssign
                    } else {
                        TokenKind::StarStar
                    }
                } else if self.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }

            '/' => {
                if self.eat('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }

            '%' => {
                if self.eat('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }

            '&' => {
                if self.eat('&') {
                    if self.eat('=') {
                        TokenKind::AmpersandAmpersandAssign
                    } else {
                        TokenKind::AmpersandAmpersand
                    }
                } else if self.eat('=') {
                    TokenKind::AmpersandAssign
                } else {
                    TokenKind::Ampersand
                }
            }

            '|' => {
                if self.eat('|') {
                    if self.eat('=') {
                        TokenKind::PipePipeAssign
                    } else {
                        TokenKind::PipePipe
                    }
                } else if self.eat('=') {
                    TokenKind::PipeAssign
                } else {
                    TokenKind::Pipe
                }
            }

            '^' => {
                if self.eat('=') {
                    TokenKind::CaretAssign
                } else {
                    TokenKind::Caret
                }
            }

            other => {
                return Err(ScriptError::syntax(
                    format!("Invalid or unexpected token '{}'", other),
                    self.token_span(),
                ))
            }
        };

        Ok(self.make_token(kind))
    }

    /// Scan exactly `count` hex digits.
    fn scan_hex_digits(&mut self, count: usize) -> ScriptResult<u32> {
        let mut value: u32 = 0;
        for _ in 0..count {
            let digit = self
                .current()
                .to_digit(16)
                .ok_or_else(|| self.error("Invalid hexadecimal escape sequence"))?;
            value = value * 16 + digit;
            self.advance();
        }
        Ok(value)
    }

    // Helper methods

    fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn current(&self) -> char {
        self.source[self.pos..].chars().next().unwrap_or('\0')
    }

    fn peek(&self) -> char {
        self.source[self.pos..].chars().nth(1).unwrap_or('\0')
    }

    fn advance(&mut self) {
        if let Some(ch) = self.source[self.pos..].chars().next() {
            self.pos += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn here(&self) -> Span {
        Span::new(self.pos, self.pos, self.line, self.column)
    }

    fn token_span(&self) -> Span {
        Span::new(self.token_start, self.pos, self.token_line, self.token_column)
    }

    fn error(&self, message: &str) -> ScriptError {
        ScriptError::syntax(message, self.here())
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.token_span())
    }
}

/// Check if character is whitespace.
fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r' | '\x0B' | '\x0C' | '\u{a0}' | '\u{feff}')
}

/// Check if character can start an identifier.
fn is_id_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

/// Check if character can continue an identifier.
fn is_id_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn single(source: &str) -> TokenKind {
        kinds(source).remove(0)
    }

    #[test]
    fn test_numeric_separators() {
        assert_eq!(single("1_000"), TokenKind::Number(1000.0));
        assert_eq!(single("0xFF_FF"), TokenKind::Number(65535.0));
        assert_eq!(single("0b1010_1010"), TokenKind::Number(170.0));
        assert_eq!(single("0o7_7"), TokenKind::Number(63.0));
        assert_eq!(single("1_0.2_5"), TokenKind::Number(10.25));
    }

    #[test]
    fn test_bad_separator_is_error() {
        assert!(Lexer::new("1__0").tokenize().is_err());
        assert!(Lexer::new("10_").tokenize().is_err());
    }

    #[test]
    fn test_large_integer_promotes_to_bigint() {
        assert_eq!(
            single("9007199254740991"),
            TokenKind::Number(9_007_199_254_740_991.0)
        );
        let expected: BigInt = "9007199254740993".parse().unwrap();
        assert_eq!(single("9007199254740993"), TokenKind::BigInt(expected));
        assert_eq!(single("0xFFFF_FFFF_FFFF_FFFF"), TokenKind::BigInt(BigInt::from(u64::MAX)));
        assert_eq!(single("12n"), TokenKind::BigInt(BigInt::from(12)));
    }

    #[test]
    fn test_fractions_and_exponents() {
        assert_eq!(single(".5"), TokenKind::Number(0.5));
        assert_eq!(single("1e3"), TokenKind::Number(1000.0));
        assert_eq!(single("2.5E-1"), TokenKind::Number(0.25));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(single(r#""a\nb\t\0""#), TokenKind::String("a\nb\t\0".into()));
        assert_eq!(single(r#"'\x41B\u{43}'"#), TokenKind::String("ABC".into()));
        assert_eq!(single(r#"'\q\d'"#), TokenKind::String("\\q\\d".into()));
        assert!(Lexer::new("'open").tokenize().is_err());
    }

    #[test]
    fn test_template_substitutions() {
        let TokenKind::Template(parts) = single("`a${x + 1}b${ `in${y}` }`") else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], TemplatePart::Quasi("a".into()));
        let TemplatePart::Substitution(tokens) = &parts[1] else {
            panic!("expected substitution");
        };
        assert_eq!(tokens[0].kind, TokenKind::Identifier("x".into()));
        assert!(tokens.last().unwrap().is_eof());
        let TemplatePart::Substitution(nested) = &parts[3] else {
            panic!("expected nested substitution");
        };
        assert!(matches!(nested[0].kind, TokenKind::Template(_)));
        assert_eq!(parts[4], TemplatePart::Quasi(String::new()));
    }

    #[test]
    fn test_template_with_object_literal() {
        let TokenKind::Template(parts) = single("`${ {a: 1}.a }`") else {
            panic!("expected template");
        };
        let TemplatePart::Substitution(tokens) = &parts[1] else {
            panic!("expected substitution");
        };
        assert_eq!(tokens[0].kind, TokenKind::LeftBrace);
        assert_eq!(tokens[4].kind, TokenKind::RightBrace);
    }

    #[test]
    fn test_keywords_and_punctuators() {
        assert_eq!(
            kinds("let x ??= undefined?.y"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier("x".into()),
                TokenKind::QuestionQuestionAssign,
                TokenKind::Undefined,
                TokenKind::QuestionDot,
                TokenKind::Identifier("y".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(single("a ? .5 : 1"), TokenKind::Identifier("a".into()));
        assert_eq!(kinds("a?.5:1")[1], TokenKind::Question);
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 3);
        assert_eq!(tokens[1].span.start, 4);
    }
}
