//! Recursive-descent parser for binding expressions, event handlers and modules.
//!
//! Binary operators are parsed by precedence climbing. Every node keeps the
//! exact source slice it came from. Parsing is eager: the first problem is
//! reported as a `SyntaxError` with line and column.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::*;
use crate::error::{ScriptError, ScriptResult};
use crate::lexer::Lexer;
use crate::token::{Span, TemplatePart, Token, TokenKind};

/// Parser settings.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Accept `import`/`export` and leave `var` checks to the module resolver.
    pub module: bool,
    /// Identifiers with these names resolve directly against the global container.
    pub global_names: HashSet<String>,
}

/// Control-flow context used to validate `break`/`continue`.
#[derive(Debug, Clone, Default)]
struct JumpContext {
    labels: Vec<String>,
    loops: usize,
    breakables: usize,
}

/// Parser over a token stream.
pub struct Parser {
    /// Tokens.
    tokens: Vec<Token>,
    /// Current position.
    pos: usize,
    /// Full source text, shared by every node's `SourceRef`.
    source: Rc<str>,
    options: Rc<ParseOptions>,
    /// Nesting depth of function bodies.
    function_depth: usize,
    /// Disallow `in` as a binary operator (for-loop heads).
    no_in: bool,
    jumps: JumpContext,
}

impl Parser {
    /// Create a parser for a script or expression.
    pub fn new(source: &str) -> ScriptResult<Self> {
        Self::with_options(source, ParseOptions::default())
    }

    /// Create a parser with explicit options.
    pub fn with_options(source: &str, options: ParseOptions) -> ScriptResult<Self> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;

        Ok(Parser {
            tokens,
            pos: 0,
            source: Rc::from(source),
            options: Rc::new(options),
            function_depth: 0,
            no_in: false,
            jumps: JumpContext::default(),
        })
    }

    /// Parser for the tokens of one template substitution.
    fn substitution(&self, tokens: Vec<Token>) -> Parser {
        Parser {
            tokens,
            pos: 0,
            source: self.source.clone(),
            options: self.options.clone(),
            function_depth: self.function_depth,
            no_in: false,
            jumps: self.jumps.clone(),
        }
    }

    /// Parse the whole input as a statement list.
    pub fn parse_statements(&mut self) -> ScriptResult<StmtList> {
        let mut body = Vec::new();
        while !self.is_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Rc::from(body))
    }

    /// Parse the whole input as a single expression.
    pub fn parse_expression_source(&mut self) -> ScriptResult<ExprRef> {
        let expr = self.parse_expression()?;
        if !self.is_eof() {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Parse a statement.
    pub fn parse_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        match &self.current().kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(self.finish_stmt(StmtKind::Empty, start))
            }
            TokenKind::LeftBrace => {
                let body = self.parse_block_body()?;
                Ok(self.finish_stmt(StmtKind::Block(body), start))
            }
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let decl = self.parse_variable_declaration(false)?;
                self.consume_semicolon()?;
                Ok(self.finish_stmt(StmtKind::Declaration(decl), start))
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::For => self.parse_for_statement(None),
            TokenKind::While => self.parse_while_statement(None),
            TokenKind::Do => self.parse_do_while_statement(None),
            TokenKind::Switch => self.parse_switch_statement(),
            TokenKind::Break => self.parse_break_statement(),
            TokenKind::Continue => self.parse_continue_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::Function => self.parse_function_declaration(false),
            TokenKind::Import => self.parse_import_declaration(),
            TokenKind::Export => self.parse_export_declaration(),
            TokenKind::Identifier(_) if self.peek_is(&TokenKind::Colon) => {
                self.parse_labeled_statement()
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(self.finish_stmt(StmtKind::Expression(expr), start))
            }
        }
    }

    /// Parse `{ statements }`.
    fn parse_block_body(&mut self) -> ScriptResult<StmtList> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.is_eof() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        self.advance(); // }
        Ok(Rc::from(body))
    }

    /// Parse a declaration without the trailing semicolon.
    fn parse_variable_declaration(&mut self, exported: bool) -> ScriptResult<VarDecl> {
        let kind = match self.current().kind {
            TokenKind::Var => VarKind::Var,
            TokenKind::Let => VarKind::Let,
            TokenKind::Const => VarKind::Const,
            _ => return Err(self.unexpected()),
        };
        if kind == VarKind::Var && self.function_depth > 0 && !self.options.module {
            return Err(self.error_here("'var' declarations are not allowed inside functions"));
        }
        self.advance();

        let mut declarators = Vec::new();
        loop {
            let pattern_span = self.current_span();
            let pattern = self.parse_binding_pattern()?;
            let init = if self.check(&TokenKind::Assign) {
                self.advance();
                Some(self.parse_assignment_expression()?)
            } else {
                None
            };
            let for_each_head = declarators.is_empty()
                && init.is_none()
                && (self.check(&TokenKind::In) || self.check_contextual("of"));
            if init.is_none() && !for_each_head {
                if kind == VarKind::Const {
                    return Err(ScriptError::syntax(
                        "Missing initializer in const declaration",
                        pattern_span,
                    ));
                }
                if !matches!(pattern, Pattern::Identifier(_)) {
                    return Err(ScriptError::syntax(
                        "Missing initializer in destructuring declaration",
                        pattern_span,
                    ));
                }
            }
            declarators.push(Declarator {
                pattern: Rc::new(pattern),
                init,
            });
            if for_each_head || !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        Ok(VarDecl {
            kind,
            declarators,
            exported,
        })
    }

    /// Parse if statement.
    fn parse_if_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        self.expect(&TokenKind::If)?;
        let test = self.parse_parenthesized()?;
        let consequent = self.parse_statement()?;
        let alternate = if self.check(&TokenKind::Else) {
            self.advance();
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(self.finish_stmt(
            StmtKind::If(IfStmt {
                test,
                consequent,
                alternate,
            }),
            start,
        ))
    }

    /// Parse a loop body with the jump context of a loop.
    fn parse_loop_body(&mut self) -> ScriptResult<StmtRef> {
        self.jumps.loops += 1;
        self.jumps.breakables += 1;
        let body = self.parse_statement();
        self.jumps.loops -= 1;
        self.jumps.breakables -= 1;
        body
    }

    /// Parse `for`, `for...in` and `for...of`.
    fn parse_for_statement(&mut self, start: Option<Span>) -> ScriptResult<StmtRef> {
        let start = start.unwrap_or_else(|| self.current_span());
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LeftParen)?;

        let mut init = None;
        if matches!(
            self.current().kind,
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) {
            let decl = self.with_no_in(|p| p.parse_variable_declaration(false))?;
            let each = decl.declarators.len() == 1
                && decl.declarators[0].init.is_none()
                && (self.check(&TokenKind::In) || self.check_contextual("of"));
            if each {
                let binding = ForBinding::Declared {
                    kind: decl.kind,
                    pattern: decl.declarators[0].pattern.clone(),
                };
                return self.parse_for_each_rest(start, binding);
            }
            init = Some(ForInit::Declaration(decl));
        } else if !self.check(&TokenKind::Semicolon) {
            let expr = self.with_no_in(|p| p.parse_expression())?;
            if self.check(&TokenKind::In) || self.check_contextual("of") {
                if !expr.is_place() {
                    return Err(ScriptError::syntax(
                        "Invalid left-hand side in for-loop",
                        expr.span,
                    ));
                }
                return self.parse_for_each_rest(start, ForBinding::Target(expr));
            }
            init = Some(ForInit::Expression(expr));
        }

        self.expect(&TokenKind::Semicolon)?;
        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RightParen)?;
        let body = self.parse_loop_body()?;

        Ok(self.finish_stmt(
            StmtKind::For(ForStmt {
                init,
                test,
                update,
                body,
            }),
            start,
        ))
    }

    /// Parse the remainder of a for-in/for-of loop after its binding.
    fn parse_for_each_rest(&mut self, start: Span, binding: ForBinding) -> ScriptResult<StmtRef> {
        let is_in = self.check(&TokenKind::In);
        self.advance(); // in / of
        let iterable = if is_in {
            self.parse_expression()?
        } else {
            self.parse_assignment_expression()?
        };
        self.expect(&TokenKind::RightParen)?;
        let body = self.parse_loop_body()?;
        let stmt = ForEachStmt {
            binding,
            iterable,
            body,
        };
        let kind = if is_in {
            StmtKind::ForIn(stmt)
        } else {
            StmtKind::ForOf(stmt)
        };
        Ok(self.finish_stmt(kind, start))
    }

    /// Parse while statement.
    fn parse_while_statement(&mut self, start: Option<Span>) -> ScriptResult<StmtRef> {
        let start = start.unwrap_or_else(|| self.current_span());
        self.expect(&TokenKind::While)?;
        let test = self.parse_parenthesized()?;
        let body = self.parse_loop_body()?;
        Ok(self.finish_stmt(StmtKind::While(WhileStmt { test, body }), start))
    }

    /// Parse do-while statement.
    fn parse_do_while_statement(&mut self, start: Option<Span>) -> ScriptResult<StmtRef> {
        let start = start.unwrap_or_else(|| self.current_span());
        self.expect(&TokenKind::Do)?;
        let body = self.parse_loop_body()?;
        self.expect(&TokenKind::While)?;
        let test = self.parse_parenthesized()?;
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }
        Ok(self.finish_stmt(StmtKind::DoWhile(WhileStmt { test, body }), start))
    }

    /// Parse switch statement.
    fn parse_switch_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        self.expect(&TokenKind::Switch)?;
        let discriminant = self.parse_parenthesized()?;
        self.expect(&TokenKind::LeftBrace)?;

        self.jumps.breakables += 1;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.check(&TokenKind::RightBrace) {
            let test = match self.current().kind {
                TokenKind::Case => {
                    self.advance();
                    Some(self.parse_expression()?)
                }
                TokenKind::Default => {
                    if seen_default {
                        return Err(self.error_here("More than one default clause in switch statement"));
                    }
                    seen_default = true;
                    self.advance();
                    None
                }
                _ => return Err(self.unexpected()),
            };
            self.expect(&TokenKind::Colon)?;

            let mut body = Vec::new();
            while !matches!(
                self.current().kind,
                TokenKind::Case | TokenKind::Default | TokenKind::RightBrace | TokenKind::Eof
            ) {
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase {
                test,
                body: Rc::from(body),
            });
        }
        self.jumps.breakables -= 1;
        self.advance(); // }

        Ok(self.finish_stmt(
            StmtKind::Switch(SwitchStmt {
                discriminant,
                cases: Rc::from(cases),
            }),
            start,
        ))
    }

    /// Label following `break`/`continue` on the same line.
    fn parse_jump_label(&mut self) -> ScriptResult<Option<String>> {
        if let TokenKind::Identifier(name) = &self.current().kind {
            if !self.newline_before() {
                let name = name.clone();
                if !self.jumps.labels.contains(&name) {
                    return Err(self.error_here(&format!("Undefined label '{}'", name)));
                }
                self.advance();
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    /// Parse break statement.
    fn parse_break_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        self.expect(&TokenKind::Break)?;
        let label = self.parse_jump_label()?;
        if label.is_none() && self.jumps.breakables == 0 {
            return Err(ScriptError::syntax("Illegal break statement", start));
        }
        self.consume_semicolon()?;
        Ok(self.finish_stmt(StmtKind::Break(label), start))
    }

    /// Parse continue statement.
    fn parse_continue_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        self.expect(&TokenKind::Continue)?;
        let label = self.parse_jump_label()?;
        if self.jumps.loops == 0 {
            return Err(ScriptError::syntax(
                "Illegal continue statement: no surrounding iteration statement",
                start,
            ));
        }
        self.consume_semicolon()?;
        Ok(self.finish_stmt(StmtKind::Continue(label), start))
    }

    /// Parse return statement.
    fn parse_return_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        self.expect(&TokenKind::Return)?;
        let argument = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;
        Ok(self.finish_stmt(StmtKind::Return(argument), start))
    }

    /// Parse throw statement.
    fn parse_throw_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        self.expect(&TokenKind::Throw)?;
        if self.newline_before() {
            return Err(self.error_here("Illegal newline after throw"));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(self.finish_stmt(StmtKind::Throw(argument), start))
    }

    /// Parse try statement.
    fn parse_try_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        self.expect(&TokenKind::Try)?;
        let block = self.parse_block_body()?;

        let handler = if self.check(&TokenKind::Catch) {
            self.advance();
            let param = if self.check(&TokenKind::LeftParen) {
                self.advance();
                let pattern = self.parse_binding_pattern()?;
                self.expect(&TokenKind::RightParen)?;
                Some(Rc::new(pattern))
            } else {
                None
            };
            let body = self.parse_block_body()?;
            Some(CatchClause { param, body })
        } else {
            None
        };

        let finalizer = if self.check(&TokenKind::Finally) {
            self.advance();
            Some(self.parse_block_body()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_here("Missing catch or finally after try"));
        }

        Ok(self.finish_stmt(
            StmtKind::Try(TryStmt {
                block,
                handler,
                finalizer,
            }),
            start,
        ))
    }

    /// Parse `function name(params) { body }`.
    fn parse_function_declaration(&mut self, exported: bool) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        self.expect(&TokenKind::Function)?;
        let name = self.parse_binding_identifier()?;
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        let function = Rc::new(ArrowFunction {
            name: Some(name.name.clone()),
            params,
            body: ArrowBody::Block(body),
        });
        Ok(self.finish_stmt(
            StmtKind::Function(FunctionDecl {
                name,
                function,
                exported,
            }),
            start,
        ))
    }

    /// Parse `import { a, b as c } from "module"`.
    fn parse_import_declaration(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        if !self.options.module {
            return Err(self.error_here("Cannot use import statement outside a module"));
        }
        if self.function_depth > 0 {
            return Err(self.error_here("Import declarations may only appear at top level"));
        }
        self.expect(&TokenKind::Import)?;
        self.expect(&TokenKind::LeftBrace)?;

        let mut specifiers = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let imported_span = self.current_span();
            let imported = self
                .identifier_name()
                .ok_or_else(|| self.unexpected())?;
            self.advance();
            let local = if self.check_contextual("as") {
                self.advance();
                self.parse_binding_identifier()?
            } else {
                BindingName {
                    name: imported.clone(),
                    span: imported_span,
                }
            };
            specifiers.push(ImportSpecifier { imported, local });
            if !self.check(&TokenKind::RightBrace) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.advance(); // }

        if !self.check_contextual("from") {
            return Err(self.error_here("Expected 'from' in import declaration"));
        }
        self.advance();
        let module = match &self.current().kind {
            TokenKind::String(module) => module.clone(),
            _ => return Err(self.error_here("Expected module name string")),
        };
        self.advance();
        self.consume_semicolon()?;

        Ok(self.finish_stmt(StmtKind::Import(ImportDecl { specifiers, module }), start))
    }

    /// Parse `export` before a declaration.
    fn parse_export_declaration(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        if !self.options.module {
            return Err(self.error_here("Unexpected token 'export'"));
        }
        self.expect(&TokenKind::Export)?;
        match self.current().kind {
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let decl = self.parse_variable_declaration(true)?;
                self.consume_semicolon()?;
                Ok(self.finish_stmt(StmtKind::Declaration(decl), start))
            }
            TokenKind::Function => {
                let stmt = self.parse_function_declaration(true)?;
                Ok(self.finish_stmt(stmt.kind.clone(), start))
            }
            _ => Err(self.error_here("Only declarations can be exported")),
        }
    }

    /// Parse `label: statement`.
    fn parse_labeled_statement(&mut self) -> ScriptResult<StmtRef> {
        let start = self.current_span();
        let label = match &self.current().kind {
            TokenKind::Identifier(name) => name.clone(),
            _ => return Err(self.unexpected()),
        };
        if self.jumps.labels.contains(&label) {
            return Err(self.error_here(&format!("Label '{}' has already been declared", label)));
        }
        self.advance(); // label
        self.advance(); // :

        self.jumps.labels.push(label.clone());
        let body = match self.current().kind {
            TokenKind::For => self.parse_for_statement(Some(start)),
            TokenKind::While => self.parse_while_statement(Some(start)),
            TokenKind::Do => self.parse_do_while_statement(Some(start)),
            _ => self.parse_statement(),
        };
        self.jumps.labels.pop();

        let body = body?;
        Ok(self.finish_stmt(StmtKind::Labeled(LabeledStmt { label, body }), start))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Parse expression (including the comma operator).
    pub fn parse_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        let first = self.parse_assignment_expression()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }

        let mut expressions = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            expressions.push(self.parse_assignment_expression()?);
        }
        Ok(self.finish_expr(ExprKind::Sequence(expressions), start))
    }

    /// Parse assignment expression.
    fn parse_assignment_expression(&mut self) -> ScriptResult<ExprRef> {
        if self.is_arrow_ahead() {
            return self.parse_arrow_function();
        }

        let start = self.current_span();
        if matches!(self.current().kind, TokenKind::LeftBracket | TokenKind::LeftBrace) {
            if let Some(pattern) = self.try_destructuring_target() {
                self.advance(); // =
                let value = self.parse_assignment_expression()?;
                return Ok(self.finish_expr(
                    ExprKind::Destructure(DestructureExpr {
                        pattern: Rc::new(pattern),
                        value,
                    }),
                    start,
                ));
            }
        }

        let left = self.parse_conditional_expression()?;

        if let Some(operator) = self.assignment_operator() {
            self.advance();
            let value = self.parse_assignment_expression()?;
            return Ok(self.finish_expr(
                ExprKind::Assignment(AssignmentExpr {
                    operator,
                    target: left,
                    value,
                }),
                start,
            ));
        }

        Ok(left)
    }

    /// Speculatively parse `pattern =`; rewinds and yields `None` otherwise.
    fn try_destructuring_target(&mut self) -> Option<Pattern> {
        let saved = self.pos;
        match self.parse_binding_pattern() {
            Ok(pattern) if self.check(&TokenKind::Assign) => Some(pattern),
            _ => {
                self.pos = saved;
                None
            }
        }
    }

    fn assignment_operator(&self) -> Option<AssignmentOp> {
        let op = match &self.current().kind {
            TokenKind::Assign => AssignmentOp::Assign,
            TokenKind::PlusAssign => AssignmentOp::Add,
            TokenKind::MinusAssign => AssignmentOp::Sub,
            TokenKind::StarAssign => AssignmentOp::Mul,
            TokenKind::SlashAssign => AssignmentOp::Div,
            TokenKind::PercentAssign => AssignmentOp::Mod,
            TokenKind::StarStarAssign => AssignmentOp::Exp,
            TokenKind::LeftShiftAssign => AssignmentOp::LeftShift,
            TokenKind::RightShiftAssign => AssignmentOp::RightShift,
            TokenKind::UnsignedRightShiftAssign => AssignmentOp::UnsignedRightShift,
            TokenKind::AmpersandAssign => AssignmentOp::BitAnd,
            TokenKind::PipeAssign => AssignmentOp::BitOr,
            TokenKind::CaretAssign => AssignmentOp::BitXor,
            TokenKind::AmpersandAmpersandAssign => AssignmentOp::And,
            TokenKind::PipePipeAssign => AssignmentOp::Or,
            TokenKind::QuestionQuestionAssign => AssignmentOp::Nullish,
            _ => return None,
        };
        Some(op)
    }

    /// Parse conditional expression.
    fn parse_conditional_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        let test = self.parse_binary_expression(0)?;

        if self.check(&TokenKind::Question) {
            self.advance();
            let consequent = self.with_in(|p| p.parse_assignment_expression())?;
            self.expect(&TokenKind::Colon)?;
            let alternate = self.parse_assignment_expression()?;

            return Ok(self.finish_expr(
                ExprKind::Conditional(ConditionalExpr {
                    test,
                    consequent,
                    alternate,
                }),
                start,
            ));
        }

        Ok(test)
    }

    /// Binary operator at the current token with its precedence.
    fn binary_operator(&self) -> Option<(BinaryOp, u8)> {
        let entry = match &self.current().kind {
            TokenKind::QuestionQuestion => (BinaryOp::Nullish, 1),
            TokenKind::PipePipe => (BinaryOp::Or, 2),
            TokenKind::AmpersandAmpersand => (BinaryOp::And, 3),
            TokenKind::Pipe => (BinaryOp::BitOr, 4),
            TokenKind::Caret => (BinaryOp::BitXor, 5),
            TokenKind::Ampersand => (BinaryOp::BitAnd, 6),
            TokenKind::Equal => (BinaryOp::Equal, 7),
            TokenKind::NotEqual => (BinaryOp::NotEqual, 7),
            TokenKind::StrictEqual => (BinaryOp::StrictEqual, 7),
            TokenKind::StrictNotEqual => (BinaryOp::StrictNotEqual, 7),
            TokenKind::LessThan => (BinaryOp::LessThan, 8),
            TokenKind::LessEqual => (BinaryOp::LessEqual, 8),
            TokenKind::GreaterThan => (BinaryOp::GreaterThan, 8),
            TokenKind::GreaterEqual => (BinaryOp::GreaterEqual, 8),
            TokenKind::In if !self.no_in => (BinaryOp::In, 8),
            TokenKind::LeftShift => (BinaryOp::LeftShift, 9),
            TokenKind::RightShift => (BinaryOp::RightShift, 9),
            TokenKind::UnsignedRightShift => (BinaryOp::UnsignedRightShift, 9),
            TokenKind::Plus => (BinaryOp::Add, 10),
            TokenKind::Minus => (BinaryOp::Sub, 10),
            TokenKind::Star => (BinaryOp::Mul, 11),
            TokenKind::Slash => (BinaryOp::Div, 11),
            TokenKind::Percent => (BinaryOp::Mod, 11),
            TokenKind::StarStar => (BinaryOp::Exp, 12),
            _ => return None,
        };
        Some(entry)
    }

    /// Parse binary expression with precedence climbing.
    fn parse_binary_expression(&mut self, min_prec: u8) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        let mut left = self.parse_unary_expression()?;

        while let Some((operator, prec)) = self.binary_operator() {
            if prec < min_prec {
                break;
            }
            self.advance();
            // `**` is right-associative.
            let next_prec = if operator == BinaryOp::Exp { prec } else { prec + 1 };
            let right = self.parse_binary_expression(next_prec)?;
            left = self.finish_expr(
                ExprKind::Binary(BinaryExpr {
                    operator,
                    left,
                    right,
                }),
                start,
            );
        }

        Ok(left)
    }

    /// Parse unary expression.
    fn parse_unary_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();

        let operator = match &self.current().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::Delete => UnaryOp::Delete,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let operator = if self.check(&TokenKind::PlusPlus) {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                self.advance();
                let argument = self.parse_unary_expression()?;
                return Ok(self.finish_expr(
                    ExprKind::Update(UpdateExpr {
                        operator,
                        prefix: true,
                        argument,
                    }),
                    start,
                ));
            }
            _ => return self.parse_postfix_expression(),
        };

        self.advance();
        let argument = self.parse_unary_expression()?;
        Ok(self.finish_expr(ExprKind::Unary(UnaryExpr { operator, argument }), start))
    }

    /// Parse postfix `++`/`--`.
    fn parse_postfix_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        let argument = self.parse_call_member_expression()?;

        let operator = match self.current().kind {
            TokenKind::PlusPlus if !self.newline_before() => UpdateOp::Increment,
            TokenKind::MinusMinus if !self.newline_before() => UpdateOp::Decrement,
            _ => return Ok(argument),
        };
        self.advance();
        Ok(self.finish_expr(
            ExprKind::Update(UpdateExpr {
                operator,
                prefix: false,
                argument,
            }),
            start,
        ))
    }

    /// Parse member access, calls and optional chains.
    fn parse_call_member_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        let mut expr = self.parse_primary_expression()?;
        let mut in_chain = false;

        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_property_identifier()?;
                    expr = self.finish_expr(
                        ExprKind::Member(MemberExpr {
                            object: expr,
                            property,
                            optional: in_chain,
                        }),
                        start,
                    );
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    in_chain = true;
                    expr = match self.current().kind {
                        TokenKind::LeftParen => {
                            let arguments = self.parse_arguments()?;
                            self.finish_expr(
                                ExprKind::Invocation(InvocationExpr {
                                    callee: expr,
                                    arguments,
                                    optional: true,
                                }),
                                start,
                            )
                        }
                        TokenKind::LeftBracket => {
                            let property = self.parse_computed_key()?;
                            self.finish_expr(
                                ExprKind::CalculatedMember(CalculatedMemberExpr {
                                    object: expr,
                                    property,
                                    optional: true,
                                }),
                                start,
                            )
                        }
                        _ => {
                            let property = self.parse_property_identifier()?;
                            self.finish_expr(
                                ExprKind::Member(MemberExpr {
                                    object: expr,
                                    property,
                                    optional: true,
                                }),
                                start,
                            )
                        }
                    };
                }
                TokenKind::LeftBracket => {
                    let property = self.parse_computed_key()?;
                    expr = self.finish_expr(
                        ExprKind::CalculatedMember(CalculatedMemberExpr {
                            object: expr,
                            property,
                            optional: in_chain,
                        }),
                        start,
                    );
                }
                TokenKind::LeftParen => {
                    let arguments = self.parse_arguments()?;
                    expr = self.finish_expr(
                        ExprKind::Invocation(InvocationExpr {
                            callee: expr,
                            arguments,
                            optional: in_chain,
                        }),
                        start,
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Parse `[expr]` after an object.
    fn parse_computed_key(&mut self) -> ScriptResult<ExprRef> {
        self.expect(&TokenKind::LeftBracket)?;
        let key = self.with_in(|p| p.parse_expression())?;
        self.expect(&TokenKind::RightBracket)?;
        Ok(key)
    }

    /// Parse call arguments.
    fn parse_arguments(&mut self) -> ScriptResult<Vec<ExprRef>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut arguments = Vec::new();
        while !self.check(&TokenKind::RightParen) {
            arguments.push(self.with_in(|p| p.parse_spread_or_assignment())?);
            if !self.check(&TokenKind::RightParen) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.advance(); // )
        Ok(arguments)
    }

    fn parse_spread_or_assignment(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        if self.check(&TokenKind::Ellipsis) {
            self.advance();
            let argument = self.parse_assignment_expression()?;
            return Ok(self.finish_expr(ExprKind::Spread(argument), start));
        }
        self.parse_assignment_expression()
    }

    /// Parse primary expression.
    fn parse_primary_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();

        let literal = match &self.current().kind {
            TokenKind::Number(n) => Literal::Number(*n),
            TokenKind::BigInt(n) => Literal::BigInt(n.clone()),
            TokenKind::String(s) => Literal::String(s.clone()),
            TokenKind::True => Literal::Boolean(true),
            TokenKind::False => Literal::Boolean(false),
            TokenKind::Null => Literal::Null,
            TokenKind::Undefined => Literal::Undefined,
            TokenKind::Identifier(name) => {
                let identifier = Identifier {
                    name: name.clone(),
                    global: self.options.global_names.contains(name),
                };
                self.advance();
                return Ok(self.finish_expr(ExprKind::Identifier(identifier), start));
            }
            TokenKind::Template(parts) => {
                let parts = parts.clone();
                self.advance();
                return self.parse_template(parts, start);
            }
            TokenKind::LeftParen => return self.parse_parenthesized(),
            TokenKind::LeftBracket => return self.parse_array_expression(),
            TokenKind::LeftBrace => return self.parse_object_expression(),
            TokenKind::Function => return self.parse_function_expression(),
            _ => return Err(self.unexpected()),
        };

        self.advance();
        Ok(self.finish_expr(ExprKind::Literal(literal), start))
    }

    /// Parse `( expr )`.
    fn parse_parenthesized(&mut self) -> ScriptResult<ExprRef> {
        self.expect(&TokenKind::LeftParen)?;
        let expr = self.with_in(|p| p.parse_expression())?;
        self.expect(&TokenKind::RightParen)?;
        Ok(expr)
    }

    /// Build a template node, parsing each substitution with its own parser.
    fn parse_template(&mut self, parts: Vec<TemplatePart>, start: Span) -> ScriptResult<ExprRef> {
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();

        for part in parts {
            match part {
                TemplatePart::Quasi(text) => quasis.push(text),
                TemplatePart::Substitution(tokens) => {
                    let mut parser = self.substitution(tokens);
                    if parser.is_eof() {
                        return Err(ScriptError::syntax(
                            "Empty template substitution",
                            parser.current_span(),
                        ));
                    }
                    expressions.push(parser.parse_expression_source()?);
                }
            }
        }

        Ok(self.finish_expr(
            ExprKind::Template(TemplateExpr {
                quasis,
                expressions,
            }),
            start,
        ))
    }

    /// Parse array literal.
    fn parse_array_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        self.expect(&TokenKind::LeftBracket)?;

        let mut elements = Vec::new();
        while !self.check(&TokenKind::RightBracket) {
            if self.check(&TokenKind::Comma) {
                let hole = self.current_span();
                self.advance();
                elements.push(Expr::new(
                    ExprKind::Literal(Literal::Undefined),
                    hole,
                    SourceRef::new(self.source.clone(), hole.start, hole.start),
                ));
                continue;
            }
            elements.push(self.with_in(|p| p.parse_spread_or_assignment())?);
            if !self.check(&TokenKind::RightBracket) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.advance(); // ]

        Ok(self.finish_expr(ExprKind::Array(elements), start))
    }

    /// Parse object literal.
    fn parse_object_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;

        let mut properties = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let entry_start = self.current_span();
            if self.check(&TokenKind::Ellipsis) {
                self.advance();
                let argument = self.with_in(|p| p.parse_assignment_expression())?;
                properties.push(ObjectProperty::Spread(argument));
            } else {
                let shorthand = match &self.current().kind {
                    TokenKind::Identifier(name) => Some(name.clone()),
                    _ => None,
                };
                let key = self.parse_property_name()?;

                let value = if self.check(&TokenKind::Colon) {
                    self.advance();
                    self.with_in(|p| p.parse_assignment_expression())?
                } else if self.check(&TokenKind::LeftParen) {
                    let name = match &key {
                        PropertyName::Static(name) => Some(name.clone()),
                        PropertyName::Computed(_) => None,
                    };
                    self.parse_function_rest(name, entry_start)?
                } else if let Some(name) = shorthand {
                    let global = self.options.global_names.contains(&name);
                    self.finish_expr(ExprKind::Identifier(Identifier { name, global }), entry_start)
                } else {
                    return Err(self.unexpected());
                };
                properties.push(ObjectProperty::Property { key, value });
            }

            if !self.check(&TokenKind::RightBrace) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.advance(); // }

        Ok(self.finish_expr(ExprKind::Object(properties), start))
    }

    /// Parse an object literal key.
    fn parse_property_name(&mut self) -> ScriptResult<PropertyName> {
        let name = match &self.current().kind {
            TokenKind::String(s) => s.clone(),
            TokenKind::Number(n) => crate::value::number_to_string(*n),
            TokenKind::BigInt(n) => n.to_string(),
            TokenKind::LeftBracket => {
                return Ok(PropertyName::Computed(self.parse_computed_key()?));
            }
            _ => self.identifier_name().ok_or_else(|| self.unexpected())?,
        };
        self.advance();
        Ok(PropertyName::Static(name))
    }

    /// Parse `function [name](params) { body }` in expression position.
    fn parse_function_expression(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        self.expect(&TokenKind::Function)?;
        let name = match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        self.parse_function_rest(name, start)
    }

    /// Parse parameters and body of a function expression or method.
    fn parse_function_rest(&mut self, name: Option<String>, start: Span) -> ScriptResult<ExprRef> {
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(self.finish_expr(
            ExprKind::Arrow(Rc::new(ArrowFunction {
                name,
                params,
                body: ArrowBody::Block(body),
            })),
            start,
        ))
    }

    /// Whether an arrow function starts at the current token.
    fn is_arrow_ahead(&self) -> bool {
        match self.current().kind {
            TokenKind::Identifier(_) => self.peek_is(&TokenKind::Arrow),
            TokenKind::LeftParen => {
                let mut depth = 0usize;
                for (index, token) in self.tokens.iter().enumerate().skip(self.pos) {
                    match token.kind {
                        TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => {
                            depth += 1
                        }
                        TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                return matches!(
                                    self.tokens.get(index + 1).map(|t| &t.kind),
                                    Some(TokenKind::Arrow)
                                );
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                }
                false
            }
            _ => false,
        }
    }

    /// Parse an arrow function.
    fn parse_arrow_function(&mut self) -> ScriptResult<ExprRef> {
        let start = self.current_span();
        let params = if self.check(&TokenKind::LeftParen) {
            self.parse_params()?
        } else {
            let name = self.parse_binding_identifier()?;
            vec![Param {
                pattern: Pattern::Identifier(name),
                rest: false,
            }]
        };
        if self.newline_before() {
            return Err(self.error_here("Line terminator before arrow"));
        }
        self.expect(&TokenKind::Arrow)?;

        let body = if self.check(&TokenKind::LeftBrace) {
            ArrowBody::Block(self.parse_function_body()?)
        } else {
            self.function_depth += 1;
            let saved = std::mem::take(&mut self.jumps);
            let body = self.with_in(|p| p.parse_assignment_expression());
            self.jumps = saved;
            self.function_depth -= 1;
            ArrowBody::Expression(body?)
        };

        Ok(self.finish_expr(
            ExprKind::Arrow(Rc::new(ArrowFunction {
                name: None,
                params,
                body,
            })),
            start,
        ))
    }

    /// Parse `(a, [b, c], {d}, ...rest)`.
    fn parse_params(&mut self) -> ScriptResult<Vec<Param>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            if self.check(&TokenKind::Ellipsis) {
                let span = self.current_span();
                self.advance();
                let pattern = self.parse_binding_pattern()?;
                if !matches!(pattern, Pattern::Identifier(_)) || !self.check(&TokenKind::RightParen) {
                    return Err(ScriptError::syntax("invalid rest argument", span));
                }
                params.push(Param {
                    pattern,
                    rest: true,
                });
                break;
            }

            params.push(Param {
                pattern: self.parse_binding_pattern()?,
                rest: false,
            });
            if !self.check(&TokenKind::RightParen) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    /// Parse a function body with a fresh jump context.
    fn parse_function_body(&mut self) -> ScriptResult<StmtList> {
        self.function_depth += 1;
        let saved_jumps = std::mem::take(&mut self.jumps);
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let body = self.parse_block_body();
        self.no_in = saved_no_in;
        self.jumps = saved_jumps;
        self.function_depth -= 1;
        body
    }

    // ========================================================================
    // Patterns
    // ========================================================================

    /// Parse a binding pattern.
    fn parse_binding_pattern(&mut self) -> ScriptResult<Pattern> {
        match self.current().kind {
            TokenKind::Identifier(_) => Ok(Pattern::Identifier(self.parse_binding_identifier()?)),
            TokenKind::LeftBracket => self.parse_array_pattern(),
            TokenKind::LeftBrace => self.parse_object_pattern(),
            _ => Err(self.error_here("Invalid destructuring target")),
        }
    }

    /// Parse `[a, , b, ...rest]`.
    fn parse_array_pattern(&mut self) -> ScriptResult<Pattern> {
        self.expect(&TokenKind::LeftBracket)?;
        let mut elements = Vec::new();
        let mut rest = None;

        while !self.check(&TokenKind::RightBracket) {
            if self.check(&TokenKind::Comma) {
                self.advance();
                elements.push(None);
                continue;
            }
            if self.check(&TokenKind::Ellipsis) {
                self.advance();
                rest = Some(self.parse_binding_identifier()?);
                break;
            }
            elements.push(Some(self.parse_binding_pattern()?));
            if !self.check(&TokenKind::RightBracket) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.expect(&TokenKind::RightBracket)?;

        Ok(Pattern::Array(ArrayPattern { elements, rest }))
    }

    /// Parse `{ a, b: alias, c: { d }, ...rest }`.
    fn parse_object_pattern(&mut self) -> ScriptResult<Pattern> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut properties = Vec::new();
        let mut rest = None;

        while !self.check(&TokenKind::RightBrace) {
            if self.check(&TokenKind::Ellipsis) {
                self.advance();
                rest = Some(self.parse_binding_identifier()?);
                break;
            }

            let key_span = self.current_span();
            let shorthand = matches!(self.current().kind, TokenKind::Identifier(_));
            let key = match &self.current().kind {
                TokenKind::String(s) => s.clone(),
                TokenKind::Number(n) => crate::value::number_to_string(*n),
                _ => self.identifier_name().ok_or_else(|| self.unexpected())?,
            };
            self.advance();

            let value = if self.check(&TokenKind::Colon) {
                self.advance();
                self.parse_binding_pattern()?
            } else if shorthand {
                Pattern::Identifier(BindingName {
                    name: key.clone(),
                    span: key_span,
                })
            } else {
                return Err(self.unexpected());
            };
            properties.push(PatternProperty { key, value });

            if !self.check(&TokenKind::RightBrace) {
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Pattern::Object(ObjectPattern { properties, rest }))
    }

    /// Parse a plain identifier being bound.
    fn parse_binding_identifier(&mut self) -> ScriptResult<BindingName> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let binding = BindingName {
                    name: name.clone(),
                    span: self.current_span(),
                };
                self.advance();
                Ok(binding)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Identifier or keyword used as a property name.
    fn parse_property_identifier(&mut self) -> ScriptResult<String> {
        let name = self.identifier_name().ok_or_else(|| self.unexpected())?;
        self.advance();
        Ok(name)
    }

    /// The current token as an identifier name, keywords included.
    fn identifier_name(&self) -> Option<String> {
        let token = self.current();
        match &token.kind {
            TokenKind::Identifier(name) => Some(name.clone()),
            kind if is_word(kind) => self
                .source
                .get(token.span.start..token.span.end)
                .map(String::from),
            _ => None,
        }
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    fn current(&self) -> &Token {
        // The token list always ends with Eof.
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn current_span(&self) -> Span {
        self.current().span
    }

    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current_span()
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len() || matches!(self.current().kind, TokenKind::Eof)
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn check_contextual(&self, word: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Identifier(name) if name == word)
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
            .unwrap_or(false)
    }

    fn newline_before(&self) -> bool {
        self.pos > 0 && self.current().span.line > self.prev_span().line
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        ) || self.newline_before()
    }

    fn expect(&mut self, kind: &TokenKind) -> ScriptResult<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ScriptError::syntax(
                format!("Expected {}, got {}", kind, self.current().kind),
                self.current_span(),
            ))
        }
    }

    fn consume_semicolon(&mut self) -> ScriptResult<()> {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
            return Ok(());
        }
        // Automatic semicolon insertion
        if self.at_statement_end() {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn with_no_in<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.no_in, true);
        let result = f(self);
        self.no_in = saved;
        result
    }

    fn with_in<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = f(self);
        self.no_in = saved;
        result
    }

    fn unexpected(&self) -> ScriptError {
        let token = self.current();
        let message = if token.is_eof() {
            String::from("Unexpected end of input")
        } else {
            format!("Unexpected token {}", token.kind)
        };
        ScriptError::syntax(message, token.span)
    }

    fn error_here(&self, message: &str) -> ScriptError {
        ScriptError::syntax(message, self.current_span())
    }

    fn node_span(&self, start: Span) -> Span {
        let end = self.prev_span();
        if end.end < start.start {
            start
        } else {
            start.merge(end)
        }
    }

    fn finish_expr(&self, kind: ExprKind, start: Span) -> ExprRef {
        let span = self.node_span(start);
        Expr::new(kind, span, SourceRef::new(self.source.clone(), span.start, span.end))
    }

    fn finish_stmt(&self, kind: StmtKind, start: Span) -> StmtRef {
        let span = self.node_span(start);
        Stmt::new(kind, span, SourceRef::new(self.source.clone(), span.start, span.end))
    }
}

/// Keywords and word literals usable as property names.
fn is_word(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::Undefined
            | TokenKind::Break
            | TokenKind::Case
            | TokenKind::Catch
            | TokenKind::Const
            | TokenKind::Continue
            | TokenKind::Default
            | TokenKind::Delete
            | TokenKind::Do
            | TokenKind::Else
            | TokenKind::Export
            | TokenKind::Finally
            | TokenKind::For
            | TokenKind::Function
            | TokenKind::If
            | TokenKind::Import
            | TokenKind::In
            | TokenKind::Let
            | TokenKind::Return
            | TokenKind::Switch
            | TokenKind::Throw
            | TokenKind::Try
            | TokenKind::Typeof
            | TokenKind::Var
            | TokenKind::While
    )
}

/// Parse a single expression.
pub fn parse_expression(source: &str) -> ScriptResult<ExprRef> {
    Parser::new(source)?.parse_expression_source()
}

/// Parse an event-handler style statement list.
pub fn parse_statements(source: &str) -> ScriptResult<StmtList> {
    Parser::new(source)?.parse_statements()
}

/// Parse a module source (imports and exports allowed).
pub fn parse_module(source: &str) -> ScriptResult<StmtList> {
    let options = ParseOptions {
        module: true,
        ..ParseOptions::default()
    };
    Parser::with_options(source, options)?.parse_statements()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> ExprRef {
        parse_expression(source).unwrap()
    }

    fn syntax_message(result: ScriptResult<StmtList>) -> String {
        match result {
            Err(ScriptError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn test_precedence() {
        let e = expr("1 + 2 * 3");
        let ExprKind::Binary(add) = &e.kind else {
            panic!("expected binary");
        };
        assert_eq!(add.operator, BinaryOp::Add);
        assert_eq!(add.right.source(), "2 * 3");
    }

    #[test]
    fn test_logical_operators_keep_identity() {
        let e = expr("a ?? b || c");
        let ExprKind::Binary(outer) = &e.kind else {
            panic!("expected binary");
        };
        assert_eq!(outer.operator, BinaryOp::Nullish);
        let ExprKind::Binary(inner) = &outer.right.kind else {
            panic!("expected binary");
        };
        assert_eq!(inner.operator, BinaryOp::Or);
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let e = expr("2 ** 3 ** 2");
        let ExprKind::Binary(outer) = &e.kind else {
            panic!("expected binary");
        };
        assert_eq!(outer.left.source(), "2");
        assert_eq!(outer.right.source(), "3 ** 2");
    }

    #[test]
    fn test_source_is_preserved() {
        let e = expr("foo( a.b , `x${ y }` )");
        let ExprKind::Invocation(call) = &e.kind else {
            panic!("expected call");
        };
        assert_eq!(e.source(), "foo( a.b , `x${ y }` )");
        assert_eq!(call.arguments[0].source(), "a.b");
        let ExprKind::Template(template) = &call.arguments[1].kind else {
            panic!("expected template");
        };
        assert_eq!(template.expressions[0].source(), "y");
    }

    #[test]
    fn test_nested_template() {
        let e = expr("`a${ `b${ c + 1 }` }d`");
        let ExprKind::Template(outer) = &e.kind else {
            panic!("expected template");
        };
        assert_eq!(outer.quasis, vec!["a".to_string(), "d".to_string()]);
        assert!(matches!(outer.expressions[0].kind, ExprKind::Template(_)));
    }

    #[test]
    fn test_arrow_parameters() {
        let e = expr("(a, [b, c], {d, e: f}, ...rest) => a + rest.length");
        let ExprKind::Arrow(arrow) = &e.kind else {
            panic!("expected arrow");
        };
        assert_eq!(arrow.params.len(), 4);
        assert!(arrow.params[3].rest);
        assert!(matches!(arrow.params[1].pattern, Pattern::Array(_)));
        let names: Vec<_> = arrow.params[2]
            .pattern
            .bound_names()
            .into_iter()
            .map(|b| b.name.clone())
            .collect();
        assert_eq!(names, vec!["d", "f"]);

        assert!(matches!(expr("x => x * 2").kind, ExprKind::Arrow(_)));
        assert!(matches!(expr("() => {}").kind, ExprKind::Arrow(_)));
    }

    #[test]
    fn test_invalid_rest_argument() {
        for source in ["(...a, b) => a", "(...[a]) => a", "(...{a}) => a"] {
            let err = parse_expression(source).unwrap_err();
            assert_eq!(err.message(), "invalid rest argument", "{}", source);
        }
    }

    #[test]
    fn test_for_loop_forms() {
        let stmts = parse_statements(
            "for (let k in o) {} for (const v of list) {} for (x of list) {} for (var i = 0; i < 3; i++) {}",
        )
        .unwrap();
        assert!(matches!(stmts[0].kind, StmtKind::ForIn(_)));
        let StmtKind::ForOf(of) = &stmts[2].kind else {
            panic!("expected for-of");
        };
        assert!(matches!(of.binding, ForBinding::Target(_)));
        assert!(matches!(stmts[3].kind, StmtKind::For(_)));
    }

    #[test]
    fn test_try_with_optional_catch_binding() {
        let stmts = parse_statements("try { f() } catch { g() } finally { h() }").unwrap();
        let StmtKind::Try(stmt) = &stmts[0].kind else {
            panic!("expected try");
        };
        assert!(stmt.handler.as_ref().unwrap().param.is_none());
        assert!(stmt.finalizer.is_some());
    }

    #[test]
    fn test_switch_cases() {
        let stmts =
            parse_statements("switch (x) { case 1: case 2: y = 1; break; default: y = 2 }").unwrap();
        let StmtKind::Switch(switch) = &stmts[0].kind else {
            panic!("expected switch");
        };
        assert_eq!(switch.cases.len(), 3);
        assert!(switch.cases[0].body.is_empty());
        assert!(switch.cases[2].test.is_none());
    }

    #[test]
    fn test_var_rejected_inside_function() {
        let message = syntax_message(parse_statements("const f = () => { var x = 1; }"));
        assert!(message.contains("not allowed inside functions"));
        assert!(parse_statements("var x = 1;").is_ok());
    }

    #[test]
    fn test_destructuring_assignment() {
        let e = expr("[a, b] = [b, a]");
        assert!(matches!(e.kind, ExprKind::Destructure(_)));
        let e = expr("[a, b]");
        assert!(matches!(e.kind, ExprKind::Array(_)));
    }

    #[test]
    fn test_optional_chain_marks_following_links() {
        let e = expr("a?.b.c");
        let ExprKind::Member(outer) = &e.kind else {
            panic!("expected member");
        };
        assert!(outer.optional);
    }

    #[test]
    fn test_illegal_jumps() {
        assert!(parse_statements("break;").is_err());
        assert!(parse_statements("while (x) { () => { break; } }").is_err());
        assert!(parse_statements("outer: while (x) { while (y) { continue outer; } }").is_ok());
        assert!(parse_statements("while (x) { continue missing; }").is_err());
    }

    #[test]
    fn test_import_only_in_modules() {
        assert!(parse_statements("import { a } from 'm';").is_err());
        let stmts = parse_module("import { a, b as c } from 'm'; export const d = a;").unwrap();
        let StmtKind::Import(import) = &stmts[0].kind else {
            panic!("expected import");
        };
        assert_eq!(import.specifiers[1].local.name, "c");
        let StmtKind::Declaration(decl) = &stmts[1].kind else {
            panic!("expected declaration");
        };
        assert!(decl.exported);
    }

    #[test]
    fn test_error_position() {
        let err = parse_statements("let a = 1;\nlet b = ;").unwrap_err();
        let span = err.span().unwrap();
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 9);
    }

    #[test]
    fn test_missing_semicolon_is_error() {
        assert!(parse_statements("let x = 1 2").is_err());
        assert!(parse_statements("let x = 1\nlet y = 2").is_ok());
    }

    #[test]
    fn test_global_names_are_marked() {
        let options = ParseOptions {
            global_names: ["Math".to_string()].into_iter().collect(),
            ..ParseOptions::default()
        };
        let e = Parser::with_options("Math.max(a)", options)
            .unwrap()
            .parse_expression_source()
            .unwrap();
        let ExprKind::Invocation(call) = &e.kind else {
            panic!("expected call");
        };
        let ExprKind::Member(member) = &call.callee.kind else {
            panic!("expected member");
        };
        assert!(member.object.as_identifier().unwrap().global);
    }
}
